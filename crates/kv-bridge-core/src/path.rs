// crates/kv-bridge-core/src/path.rs
// ============================================================================
// Module: Path Normalizer
// Description: Pure helpers turning logical keys into canonical remote paths.
// Purpose: Keep file names, extensions, and directory prefixes canonical.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Canonical paths have a trimmed, lower-cased file name with exactly one
//! correctly placed extension, under a directory prefix that ends in exactly
//! one slash. [`fix_extension`] and [`fix_directory`] are idempotent.
//!
//! [`scoped_path`] confines a key under a root folder and rejects parent
//! directory segments so no key can escape the root.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::backend::StorageError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a single path segment.
const MAX_SEGMENT_LENGTH: usize = 255;

// ============================================================================
// SECTION: Normalizers
// ============================================================================

/// Lower-cases `name` and makes sure it ends with `.ext` exactly once.
///
/// Surrounding whitespace and dots are stripped from `ext` and whitespace from
/// `name`. A name shorter than the suffix simply gets the suffix appended. An
/// empty extension leaves the trimmed, lower-cased name as is.
#[must_use]
pub fn fix_extension(name: &str, ext: &str) -> String {
    let ext = ext.trim_matches(|ch: char| ch == '.' || ch.is_whitespace()).to_lowercase();
    let name = name.trim().to_lowercase();
    if ext.is_empty() {
        return name;
    }
    let suffix = format!(".{ext}");
    if name.ends_with(&suffix) { name } else { format!("{name}{suffix}") }
}

/// Strips trailing slashes and whitespace from `path` and appends one `/`.
#[must_use]
pub fn fix_directory(path: &str) -> String {
    let trimmed = path.trim_end_matches(|ch: char| ch == '/' || ch.is_whitespace());
    format!("{trimmed}/")
}

/// Joins a normalized directory and a normalized file name.
#[must_use]
pub fn make_path(name: &str, dir: &str, ext: &str) -> String {
    let mut path = fix_directory(dir);
    path.push_str(&fix_extension(name, ext));
    path
}

/// Resolves `key` relative to `root`.
///
/// Empty and `.` segments are dropped and a leading `/` is read relative to
/// the root. The root itself is returned without a trailing slash; an empty
/// root means `.`.
///
/// # Errors
///
/// Returns [`StorageError::Invalid`] when a segment is `..`, contains a
/// backslash or NUL, or exceeds the segment length limit.
pub fn scoped_path(root: &str, key: &str) -> Result<String, StorageError> {
    let root = root.trim().trim_end_matches('/');
    let mut path = if root.is_empty() { ".".to_string() } else { root.to_string() };
    for segment in key.split('/') {
        let segment = segment.trim();
        if segment.is_empty() || segment == "." {
            continue;
        }
        validate_segment(segment)?;
        path.push('/');
        path.push_str(segment);
    }
    Ok(path)
}

/// Validates a single key segment.
///
/// # Errors
///
/// Returns [`StorageError::Invalid`] for `..`, over-long segments, and
/// segments containing a backslash or NUL.
pub fn validate_segment(segment: &str) -> Result<(), StorageError> {
    if segment == ".." {
        return Err(StorageError::Invalid(
            "parent directory segments are not allowed in keys".to_string(),
        ));
    }
    if segment.len() > MAX_SEGMENT_LENGTH {
        return Err(StorageError::Invalid("key segment exceeds length limit".to_string()));
    }
    if segment.contains(['\\', '\0']) {
        return Err(StorageError::Invalid("key segment contains invalid characters".to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test-only assertions are permitted.")]

    use super::*;

    #[test]
    fn fix_extension_appends_missing_suffix() {
        assert_eq!(fix_extension(" Report ", " .CSV "), "report.csv");
    }

    #[test]
    fn fix_extension_keeps_existing_suffix() {
        assert_eq!(fix_extension("Report.CSV", "csv"), "report.csv");
    }

    #[test]
    fn fix_extension_handles_names_shorter_than_suffix() {
        assert_eq!(fix_extension("a", "parquet"), "a.parquet");
        assert_eq!(fix_extension("", "csv"), ".csv");
    }

    #[test]
    fn fix_extension_does_not_match_bare_suffix_without_dot() {
        assert_eq!(fix_extension("datacsv", "csv"), "datacsv.csv");
    }

    #[test]
    fn fix_directory_collapses_trailing_slashes() {
        assert_eq!(fix_directory("./data// "), "./data/");
        assert_eq!(fix_directory("data"), "data/");
    }

    #[test]
    fn make_path_combines_both() {
        assert_eq!(make_path("Model", "./data/", "csv"), "./data/model.csv");
    }

    #[test]
    fn scoped_path_rejects_parent_segments() {
        assert!(scoped_path("root", "a/../b").is_err());
        assert!(scoped_path("root", "..").is_err());
    }

    #[test]
    fn scoped_path_stays_under_root() {
        assert_eq!(scoped_path("root/", "/a/./b").expect("path"), "root/a/b");
        assert_eq!(scoped_path("", "a").expect("path"), "./a");
        assert_eq!(scoped_path("root", "").expect("path"), "root");
    }
}
