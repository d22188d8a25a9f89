//! Parsing of Composer's human-readable output lines.
//!
//! Composer interleaves progress chatter, locale- and version-drifting
//! diagnostics and genuine package lines in a single stream. There is no
//! grammar to lean on, so everything here is an ordered heuristic: known
//! noise is filtered first, and a line that still does not fit is skipped
//! rather than reported as an error.

mod outdated;

pub use outdated::{OutdatedPackage, parse_dry_run_updates};

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::output::BACKSPACE;

/// A `name version` pair extracted from one output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub package: String,
    /// Version with any leading `v` prefix stripped.
    pub version: String,
}

/// One entry of `composer why`: a dependent package and the constraint it
/// places on the queried package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhyEntry {
    pub package: String,
    pub version: String,
    pub constraint: String,
}

/// Markers Composer prints when a fatal exception surfaces in its output,
/// even when the status code does not distinguish it.
const EXCEPTION_MARKERS: &[&str] = &[
    "[RuntimeException]",
    "[Symfony\\Component\\Console\\Exception\\InvalidArgumentException]",
    "[ErrorException]",
];

/// Diagnostic prefixes that never carry package data.
const CHATTER_PREFIXES: &[&str] = &[
    "Reading ",
    "Failed to",
    "Executing command ",
    "Executing branch ",
    "Importing branch ",
    "Loading config file ",
    "Changed CWD to ",
    "Checked CA file ",
    "Loading plugin ",
    "Running ",
];

/// Chatter checks shared by the record-bearing listings (`outdated`, `why`).
pub fn is_noise_line(line: &str) -> bool {
    line.contains("<warning>You")
        || line.starts_with("Reading")
        || line.starts_with("Failed")
        || line.starts_with("Importing")
}

/// Parse one output line into a package record.
///
/// Handles lines like
/// `vendor/pkg               dev-dev 0572859      dev-dev 5dcea72    A modular based management`:
/// the first whitespace run separates the name, the second bounds the
/// version. A line with no whitespace at all cannot be a `name version` pair
/// and yields no record.
pub fn parse_package_line(line: &str) -> Option<PackageRecord> {
    let line = line.replace(BACKSPACE, "");
    let line = line.trim();

    if line.is_empty() || is_noise_line(line) {
        return None;
    }

    let space = line.find(char::is_whitespace)?;
    let package = line[..space].trim();
    let remainder = line[space..].trim();

    // No further whitespace: the whole remainder is the version token.
    let version = match remainder.find(char::is_whitespace) {
        Some(next) => &remainder[..next],
        None => remainder,
    };
    let version = version.trim().trim_start_matches('v');

    Some(PackageRecord {
        package: package.to_string(),
        version: version.to_string(),
    })
}

/// Split a search result line into `(name, description)`, dropping chatter.
pub fn parse_search_line(line: &str) -> Option<(String, String)> {
    let line = line.replace(BACKSPACE, "").replace("- Updating ", "");
    let line = line.trim();

    if is_search_chatter(line) {
        return None;
    }

    let (name, description) = line.split_once(' ')?;
    if name.is_empty() {
        return None;
    }

    Some((name.to_string(), description.trim().to_string()))
}

fn is_search_chatter(line: &str) -> bool {
    CHATTER_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
        || (line.starts_with("Writing ") && line.contains("into cache"))
}

/// Extract the leading package name from a `show` listing line.
///
/// Indented continuation lines collapse to an empty first token and are
/// dropped, as are `Reading` chatter and backspace-redrawn progress lines.
pub fn parse_show_line(line: &str) -> Option<String> {
    let collapsed = collapse_spaces(line.trim_end());
    let first = collapsed.split(' ').next()?;

    if first.is_empty() || first.starts_with(BACKSPACE) || first == "Reading" {
        return None;
    }

    Some(first.to_string())
}

/// Parse `show --installed` lines into a package -> version map.
pub fn parse_installed_versions(lines: &[String]) -> BTreeMap<String, String> {
    let mut versions = BTreeMap::new();

    for line in lines {
        if line.starts_with("<warning>") {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let (Some(name), Some(version)) = (tokens.next(), tokens.next()) else {
            continue;
        };

        versions.insert(name.to_string(), version.to_string());
    }

    versions
}

/// Parse one line of `composer why` output, e.g.
/// `vendor/app  1.2.0  requires  vendor/pkg  (^2.0)`.
pub fn parse_why_line(line: &str) -> Option<WhyEntry> {
    if is_noise_line(line) {
        return None;
    }

    static WHY: OnceLock<Regex> = OnceLock::new();
    let pattern = WHY.get_or_init(|| {
        Regex::new(r"(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s+\((\S+)\)").expect("why pattern is valid")
    });

    let captures = pattern.captures(line)?;

    Some(WhyEntry {
        package: captures[1].to_string(),
        version: captures[2].to_string(),
        constraint: captures[5].to_string(),
    })
}

/// Scan captured output for an exception marker and return the detail line
/// Composer printed right after it.
pub fn find_exception_detail(lines: &[String]) -> Option<String> {
    for (index, line) in lines.iter().enumerate() {
        if EXCEPTION_MARKERS.iter().any(|marker| line.contains(marker)) {
            let detail = lines
                .get(index + 1)
                .map(|next| next.trim().to_string())
                .unwrap_or_default();
            return Some(detail);
        }
    }

    None
}

/// Collapse runs of spaces into a single space (tabs are left alone, matching
/// the column layout Composer emits).
fn collapse_spaces(line: &str) -> String {
    let mut collapsed = String::with_capacity(line.len());
    let mut previous_was_space = false;

    for character in line.chars() {
        if character == ' ' {
            if !previous_was_space {
                collapsed.push(character);
            }
            previous_was_space = true;
        } else {
            previous_was_space = false;
            collapsed.push(character);
        }
    }

    collapsed
}
