//! =============================================================================
//! Utility Helpers
//! =============================================================================
//!
//! Path/URL conversions, language-id inference, and version-string handling.
//! Both the suggestion service and the installation check reuse these, so they
//! live here instead of being reimplemented per module.

use std::cmp::Ordering;
use std::path::Path;

use url::Url;

/// Converts a `file://` URL into a filesystem path string. Returns `None` for
/// non-file schemes; callers fall back to the URL text itself.
pub fn url_to_file_path(url: &Url) -> Option<String> {
    url.to_file_path()
        .ok()
        .map(|p| p.to_string_lossy().into_owned())
}

/// Computes `path` relative to the project root. Files outside the root keep
/// their absolute path unchanged.
pub fn relative_path(root: &Path, path: &str) -> String {
    Path::new(path)
        .strip_prefix(root)
        .map(|rel| rel.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string())
}

/// Resolves the language identifier the backend expects from a file extension.
pub fn language_id_for_path(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");
    match extension {
        "rs" => "rust",
        "go" => "go",
        "ts" => "typescript",
        "tsx" => "typescriptreact",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "javascriptreact",
        "py" => "python",
        "swift" => "swift",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "java" => "java",
        "kt" => "kotlin",
        "rb" => "ruby",
        "php" => "php",
        "cs" => "csharp",
        "sh" | "bash" => "shellscript",
        "md" => "markdown",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "html" => "html",
        "css" => "css",
        "sql" => "sql",
        _ => "plaintext",
    }
}

/// Normalizes a version string to exactly three dot-separated numeric
/// segments. Short versions are padded with zeros, extra segments and
/// non-numeric suffixes are dropped (`"13.4"` -> `"13.4.0"`,
/// `"1.2.3-beta.1"` -> `"1.2.3"`).
pub fn normalize_version(raw: &str) -> String {
    let mut segments: Vec<String> = raw
        .split('.')
        .take(3)
        .map(|segment| {
            let digits: String = segment.chars().take_while(char::is_ascii_digit).collect();
            if digits.is_empty() {
                "0".to_string()
            } else {
                digits
            }
        })
        .collect();
    while segments.len() < 3 {
        segments.push("0".to_string());
    }
    segments.join(".")
}

/// Compares two dotted version strings numerically, treating missing segments
/// as zero.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = version_segments(a);
    let right = version_segments(b);
    let len = left.len().max(right.len());
    for idx in 0..len {
        let lhs = left.get(idx).copied().unwrap_or(0);
        let rhs = right.get(idx).copied().unwrap_or(0);
        match lhs.cmp(&rhs) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn version_segments(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|segment| {
            segment
                .chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>()
                .parse()
                .unwrap_or(0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn relative_path_strips_project_root() {
        let root = PathBuf::from("/a/b");
        assert_eq!(relative_path(&root, "/a/b/c/d.go"), "c/d.go");
    }

    #[test]
    fn relative_path_keeps_files_outside_root_absolute() {
        let root = PathBuf::from("/a/b");
        assert_eq!(relative_path(&root, "/x/y.go"), "/x/y.go");
    }

    #[test]
    fn language_id_covers_common_extensions() {
        assert_eq!(language_id_for_path("/src/main.rs"), "rust");
        assert_eq!(language_id_for_path("/pkg/server.go"), "go");
        assert_eq!(language_id_for_path("/app/view.tsx"), "typescriptreact");
        assert_eq!(language_id_for_path("/notes/LICENSE"), "plaintext");
    }

    #[test]
    fn normalize_version_pads_and_truncates() {
        assert_eq!(normalize_version("13.4"), "13.4.0");
        assert_eq!(normalize_version("7"), "7.0.0");
        assert_eq!(normalize_version("1.2.3.4"), "1.2.3");
        assert_eq!(normalize_version("1.2.3-beta.1"), "1.2.3");
        assert_eq!(normalize_version(""), "0.0.0");
    }

    #[test]
    fn compare_versions_is_numeric_not_lexicographic() {
        assert_eq!(compare_versions("1.10.0", "1.9.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare_versions("0.9.1", "1.0.0"), Ordering::Less);
    }

    #[test]
    fn url_to_file_path_handles_file_scheme_only() {
        let url = Url::parse("file:///tmp/sample.rs").unwrap();
        assert_eq!(url_to_file_path(&url).as_deref(), Some("/tmp/sample.rs"));
        let remote = Url::parse("https://example.com/sample.rs").unwrap();
        assert!(url_to_file_path(&remote).is_none());
    }
}
