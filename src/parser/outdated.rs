//! Extraction of version diffs from `composer update --dry-run` output.

use std::collections::HashSet;

/// A package a real update would change, with the old and new versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutdatedPackage {
    pub package: String,
    /// The version the update would install.
    pub version: String,
    /// The currently installed version.
    pub old_version: String,
}

/// Collect `- Updating` / `- Upgrading` lines into version diffs.
///
/// Composer has emitted two formats over the years and both stay supported:
///
/// ```text
/// - Updating vendor/pkg (1.0.0 => 1.1.0)
/// - Updating vendor/pkg (1.0.0) to vendor/pkg (1.1.0)
/// ```
///
/// The first line seen for a package wins; later duplicates are discarded.
pub fn parse_dry_run_updates(lines: &[String]) -> Vec<OutdatedPackage> {
    let mut seen = HashSet::new();
    let mut updates = Vec::new();

    for line in lines {
        if !line.contains("- Updating") && !line.contains("- Upgrading") {
            continue;
        }

        let line = line
            .trim()
            .replace("- Updating ", "")
            .replace("- Upgrading ", "");

        let parsed = if line.contains(" => ") {
            parse_arrow_form(&line)
        } else {
            parse_to_form(&line)
        };

        let Some(update) = parsed else {
            continue;
        };

        if seen.insert(update.package.clone()) {
            updates.push(update);
        }
    }

    updates
}

/// `vendor/pkg (1.0.0 => 1.1.0)`
fn parse_arrow_form(line: &str) -> Option<OutdatedPackage> {
    let (package, versions) = line.split_once(" (")?;
    let versions = versions.replace(')', "");

    let old_version = versions.split(' ').next()?.trim_matches(version_padding);

    let new_part = versions.split(" => ").nth(1)?;
    let new_version = match new_part.find(' ') {
        Some(space) => &new_part[..space],
        None => new_part,
    };
    let new_version = new_version.trim_matches(version_padding);

    Some(OutdatedPackage {
        package: package.trim().to_string(),
        version: new_version.to_string(),
        old_version: old_version.to_string(),
    })
}

/// `vendor/pkg (1.0.0) to vendor/pkg (1.1.0)`
fn parse_to_form(line: &str) -> Option<OutdatedPackage> {
    let (old_part, new_part) = line.split_once(" to ")?;

    let space = new_part.find(' ')?;
    let package = new_part[..space].trim().to_string();
    let new_version = new_part[space..].trim_matches(version_padding).to_string();

    let space = old_part.find(' ')?;
    let mut old_version = old_part[space..].trim_matches(version_padding).to_string();

    // Chatter (`Reading ...` and friends) occasionally gets glued onto the
    // front of the line. A clean version token never contains a space, so
    // recover by reslicing from the package name.
    if old_version.contains(' ') {
        if let Some(start) = old_part.find(package.as_str()) {
            let resliced = &old_part[start..];
            if let Some(space) = resliced.find(' ') {
                old_version = resliced[space..].trim_matches(version_padding).to_string();
            }
        }
    }

    Some(OutdatedPackage {
        package,
        version: new_version,
        old_version,
    })
}

fn version_padding(character: char) -> bool {
    matches!(character, '(' | ')' | ' ')
}
