//! Path collaborators: results-directory resolution and safe-path encoding.

use crate::JobId;
use std::path::{Path, PathBuf};

/// Resolves the results directory for a job. Pure: must not fail for a
/// valid job id.
pub trait JobResultsResolver: Send + Sync {
    /// The directory under which the job's per-task results live.
    fn get_results_dir(&self, job_id: &JobId) -> PathBuf;
}

/// Resolver that lays job results out under a fixed base directory.
#[derive(Debug, Clone)]
pub struct BaseDirResolver {
    base: PathBuf,
}

impl BaseDirResolver {
    /// Create a resolver rooted at `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl JobResultsResolver for BaseDirResolver {
    fn get_results_dir(&self, job_id: &JobId) -> PathBuf {
        self.base.join(job_id.as_str())
    }
}

/// Maximum length of a safe path component.
const SAFE_PATH_MAX: usize = 255;

/// Encode an arbitrary identifier into a filesystem-safe path component.
///
/// Deterministic: a leading `.` becomes `_`, path separators and NUL bytes
/// are replaced by `_`, and the result is truncated to 255 bytes at a char
/// boundary.
pub fn string_to_safe_path(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(SAFE_PATH_MAX));
    for (i, ch) in input.chars().enumerate() {
        if out.len() + ch.len_utf8() > SAFE_PATH_MAX {
            break;
        }
        let safe = match ch {
            '.' if i == 0 => '_',
            '/' | '\\' | '\0' => '_',
            c => c,
        };
        out.push(safe);
    }
    out
}

/// Expand a leading `~` to the current user's home directory, as named by
/// `$HOME`. Paths without the prefix, and environments without `$HOME`,
/// pass through unchanged.
pub fn expand_user(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if rest.is_empty() || rest.starts_with('/') {
            if let Ok(home) = std::env::var("HOME") {
                let rest = rest.trim_start_matches('/');
                if rest.is_empty() {
                    return PathBuf::from(home);
                }
                return Path::new(&home).join(rest);
            }
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolver_joins_job_id() {
        let resolver = BaseDirResolver::new("/var/lib/isorun");
        let dir = resolver.get_results_dir(&JobId::new("job-7"));
        assert_eq!(dir, PathBuf::from("/var/lib/isorun/job-7"));
    }

    #[test]
    fn test_safe_path_replaces_separators() {
        assert_eq!(string_to_safe_path("1-suite/case;x"), "1-suite_case;x");
        assert_eq!(string_to_safe_path("a\\b"), "a_b");
    }

    #[test]
    fn test_safe_path_leading_dot() {
        assert_eq!(string_to_safe_path(".hidden"), "_hidden");
        assert_eq!(string_to_safe_path("not.hidden"), "not.hidden");
    }

    #[test]
    fn test_safe_path_deterministic_and_bounded() {
        let long = "x".repeat(400);
        let a = string_to_safe_path(&long);
        let b = string_to_safe_path(&long);
        assert_eq!(a, b);
        assert!(a.len() <= 255);
    }

    #[test]
    fn test_expand_user_passthrough() {
        assert_eq!(expand_user("/tmp/data"), PathBuf::from("/tmp/data"));
    }

    #[test]
    fn test_expand_user_home() {
        // HOME is set in any environment these tests run in; fall back to
        // passthrough semantics if it is not.
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(expand_user("~/out"), Path::new(&home).join("out"));
            assert_eq!(expand_user("~"), PathBuf::from(home));
        }
    }
}
