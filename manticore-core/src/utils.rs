//! Utility functions shared by the route mapper and controller declarations.

/// Path normalization utilities
pub mod path {
    /// Normalizes a route path.
    ///
    /// Ensures the path begins with a `/` and collapses runs of repeated
    /// slashes into one. When `allow_trailing` is false a trailing `/` is
    /// stripped, so the root path `/` normalizes to the empty string; this
    /// is the form used for controller path prefixes, which are later
    /// concatenated with action paths.
    ///
    /// # Examples
    ///
    /// ```
    /// use manticore_core::utils::path::norm_path;
    ///
    /// assert_eq!(norm_path("widgets//{id}", true), "/widgets/{id}");
    /// assert_eq!(norm_path("/api/v1/", false), "/api/v1");
    /// assert_eq!(norm_path("/", false), "");
    /// ```
    pub fn norm_path(path: &str, allow_trailing: bool) -> String {
        let mut result = String::with_capacity(path.len() + 1);
        if !path.starts_with('/') {
            result.push('/');
        }

        let mut last_was_slash = false;
        for ch in path.chars() {
            if ch == '/' {
                if last_was_slash {
                    continue;
                }
                last_was_slash = true;
            } else {
                last_was_slash = false;
            }
            result.push(ch);
        }

        if !allow_trailing && result.ends_with('/') {
            result.pop();
        }

        result
    }

    /// Joins a normalized prefix and an action path.
    pub fn join(prefix: &str, path: &str) -> String {
        norm_path(&format!("{}{}", prefix, path), true)
    }
}

/// Whitespace-separated list handling for configuration values
pub mod list {
    use std::collections::HashSet;

    /// Splits a whitespace-separated list, dropping repeats and keeping the
    /// first occurrence of each entry.
    ///
    /// ```
    /// use manticore_core::utils::list::split_unique;
    ///
    /// assert_eq!(split_unique("audit tags  audit"), vec!["audit", "tags"]);
    /// ```
    pub fn split_unique(value: &str) -> Vec<&str> {
        let mut seen = HashSet::new();
        value
            .split_whitespace()
            .filter(|item| seen.insert(*item))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    mod path_tests {
        use super::super::path::*;

        #[test]
        fn test_norm_path_adds_leading_slash() {
            assert_eq!(norm_path("widgets", true), "/widgets");
            assert_eq!(norm_path("", true), "/");
        }

        #[test]
        fn test_norm_path_collapses_slashes() {
            assert_eq!(norm_path("//a///b//", true), "/a/b/");
            assert_eq!(norm_path("//a///b//", false), "/a/b");
        }

        #[test]
        fn test_norm_path_prefix_root() {
            assert_eq!(norm_path("/", false), "");
            assert_eq!(norm_path("/", true), "/");
        }

        #[test]
        fn test_join() {
            assert_eq!(join("/api", "/widgets/{id}"), "/api/widgets/{id}");
            assert_eq!(join("", "/widgets"), "/widgets");
        }
    }

    mod list_tests {
        use super::super::list::*;

        #[test]
        fn test_split_unique_preserves_order() {
            assert_eq!(split_unique("c b a b c"), vec!["c", "b", "a"]);
            assert!(split_unique("   ").is_empty());
        }
    }
}
