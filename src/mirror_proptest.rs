//! Property-based tests for mirror naming, quoting and manifest expansion.

#[cfg(test)]
mod proptest_tests {
    use crate::git::{mirror_dir_name, shell_quote};
    use crate::manifest::desired_paths;
    use proptest::prelude::*;
    use std::path::{Path, PathBuf};

    proptest! {
        /// Property: mirror_dir_name never produces path separators or colons
        #[test]
        fn mirror_dir_name_is_single_component(input in ".*") {
            let result = mirror_dir_name(&input);
            prop_assert!(!result.contains('/'));
            prop_assert!(!result.contains(':'));
        }

        /// Property: mirror_dir_name is deterministic
        #[test]
        fn mirror_dir_name_is_deterministic(input in ".*") {
            prop_assert_eq!(mirror_dir_name(&input), mirror_dir_name(&input));
        }

        /// Property: characters are replaced 1:1
        #[test]
        fn mirror_dir_name_preserves_char_count(input in ".+") {
            prop_assert_eq!(
                mirror_dir_name(&input).chars().count(),
                input.chars().count()
            );
        }

        /// Property: names without '/' or ':' pass through unchanged
        #[test]
        fn mirror_dir_name_keeps_alphanumerics(input in "[a-zA-Z0-9._-]+") {
            prop_assert_eq!(mirror_dir_name(&input), input);
        }

        /// Property: quoted values are either untouched safe words or wrapped
        /// in single quotes
        #[test]
        fn shell_quote_wraps_unsafe_values(input in ".*") {
            let quoted = shell_quote(&input);
            if quoted != input {
                prop_assert!(quoted.starts_with('\''));
                prop_assert!(quoted.ends_with('\''));
            } else {
                prop_assert!(!input
                    .contains(|c: char| c.is_whitespace() || "'\"$`;&|<>*?~".contains(c)));
            }
        }

        /// Property: every ancestor of every listed file is desired
        #[test]
        fn desired_paths_cover_ancestors(
            files in prop::collection::vec("[a-z]{1,4}(/[a-z]{1,4}){0,3}", 0..8)
        ) {
            let target = Path::new("/T");
            let paths = desired_paths(
                target,
                &target.join(".latest_commit"),
                files.iter().map(String::as_str),
            );
            for file in &files {
                let mut current = target.join(file);
                while current != target {
                    prop_assert!(paths.contains(&current), "missing {:?}", current);
                    current = current.parent().map(PathBuf::from).unwrap();
                }
            }
        }
    }
}
