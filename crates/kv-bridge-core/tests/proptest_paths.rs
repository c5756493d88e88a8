// crates/kv-bridge-core/tests/proptest_paths.rs
// ============================================================================
// Module: Path Normalizer Property-Based Tests
// Description: Idempotence and shape checks for key normalization.
// Purpose: Ensure canonical paths are stable and never escape the root.
// ============================================================================

//! Idempotence and shape checks for key normalization.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use kv_bridge_core::fix_directory;
use kv_bridge_core::fix_extension;
use kv_bridge_core::make_path;
use kv_bridge_core::scoped_path;
use proptest::prelude::*;

proptest! {
    #[test]
    fn fix_extension_is_idempotent(name in "[ a-zA-Z0-9._-]{0,24}", ext in "[ .a-zA-Z0-9]{0,8}") {
        let once = fix_extension(&name, &ext);
        prop_assert_eq!(fix_extension(&once, &ext), once);
    }

    #[test]
    fn fix_extension_ends_with_clean_suffix(
        name in "[ a-zA-Z0-9._-]{0,24}",
        ext in "[a-zA-Z0-9]{1,8}",
    ) {
        let fixed = fix_extension(&name, &ext);
        let suffix = format!(".{}", ext.to_lowercase());
        prop_assert!(fixed.ends_with(&suffix));
        prop_assert_eq!(fixed.clone(), fixed.to_lowercase());
    }

    #[test]
    fn fix_directory_is_idempotent(path in "[ a-z0-9./]{0,24}") {
        let once = fix_directory(&path);
        prop_assert_eq!(fix_directory(&once), once.clone());
        prop_assert!(once.ends_with('/'));
        prop_assert!(!once.ends_with("//"));
    }

    #[test]
    fn make_path_is_idempotent_on_its_output(
        name in "[a-zA-Z0-9_-]{1,12}",
        dir in "[a-z0-9./]{0,16}",
        ext in "[a-z]{1,6}",
    ) {
        let path = make_path(&name, &dir, &ext);
        let (dir_part, file_part) = path.rsplit_once('/').unwrap();
        prop_assert_eq!(make_path(file_part, dir_part, &ext), path.clone());
    }

    #[test]
    fn scoped_path_never_contains_parent_segments(key in "[a-z./]{0,24}") {
        if let Ok(path) = scoped_path("root", &key) {
            prop_assert!(path.starts_with("root"));
            prop_assert!(!path.split('/').any(|segment| segment == ".."));
        }
    }
}
