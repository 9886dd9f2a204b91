//! Shared utility helpers.

pub mod ffmpeg;
pub mod logger;
pub mod temp;

use std::path::Path;

/// Sanitize an identifier for use as a storage object name. Lowercases
/// and replaces anything outside `[a-z0-9]` with underscores, collapsing
/// runs, capped at 50 characters.
pub fn sanitize_filename(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_underscore = false;
    for c in input.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            result.push(c);
            last_was_underscore = false;
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }
    result.chars().take(50).collect()
}

/// Check that a file exists and has non-zero size.
pub async fn check_file_exists_and_valid(path: &Path) -> bool {
    if let Ok(metadata) = tokio::fs::metadata(path).await {
        if metadata.is_file() && metadata.len() > 0 {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Hello World"), "hello_world");
        assert_eq!(sanitize_filename("A//B::C"), "a_b_c");
        assert_eq!(sanitize_filename("UPPER case 42"), "upper_case_42");
        assert_eq!(sanitize_filename(&"x".repeat(100)).len(), 50);
    }

    #[tokio::test]
    async fn test_check_file_exists_and_valid() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.bin");
        std::fs::File::create(&empty).unwrap();
        assert!(!check_file_exists_and_valid(&empty).await);

        let full = dir.path().join("full.bin");
        let mut f = std::fs::File::create(&full).unwrap();
        f.write_all(b"data").unwrap();
        assert!(check_file_exists_and_valid(&full).await);

        assert!(!check_file_exists_and_valid(&dir.path().join("missing")).await);
    }
}
