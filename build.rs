use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

// The crate version in Cargo.toml is a placeholder; the real one comes from
// the closest git tag at build time.
fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    println!(
        "cargo:rustc-env=COMPOSER_BRIDGE_VERSION={}",
        describe_version()
    );
}

fn describe_version() -> String {
    let described = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string());

    match described {
        Some(tag) if !tag.is_empty() => {
            let version = tag.strip_prefix('v').unwrap_or(&tag);
            if version.ends_with("-dirty") {
                format!("{}-{}", version, timestamp())
            } else {
                version.to_string()
            }
        }
        _ => format!("0.0.0-unknown-{}", timestamp()),
    }
}

fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
