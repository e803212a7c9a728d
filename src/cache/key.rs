//! Canonical cache key derivation and directory fan-out.
//!
//! The key is the sole cache identity shared by every backend: a SHA-256
//! digest (lower-case hex) over a canonical rendering of the options.
//! Because the source path is normalized and the digest is hex, the result
//! is case-insensitive and safe as a file or blob name regardless of how
//! the original request was cased or delimited.

use crate::options::{normalize_source_path, TransformOptions};
use sha2::{Digest, Sha256};

/// Deterministic cache key for `options`. Identical options always yield the
/// identical key, across processes and time.
pub fn cache_key(options: &TransformOptions) -> String {
    let mut canonical = format!(
        "path={}&w={}&h={}&mode={}&format={}&q={}&filter={}",
        normalize_source_path(&options.source_path),
        options.width,
        options.height,
        options.resize_mode,
        options.format,
        options.quality,
        options.filter_quality,
    );
    if let Some(focal) = options.focal_point {
        canonical.push_str(&format!("&fx={}&fy={}", focal.x, focal.y));
    }

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Full stored name of an entry: key plus the target extension.
pub fn cache_file_name(options: &TransformOptions) -> String {
    format!("{}.{}", cache_key(options), options.format.extension())
}

/// Map a stored name onto a nested relative path, bounding directory
/// fan-out for the disk and blob backends. Pure and independent of any I/O:
/// `"abcdef...jpg"` becomes `"ab/cd/abcdef...jpg"`.
pub fn fan_out_relative_path(file_name: &str) -> String {
    if file_name.len() < 4 || !file_name.is_char_boundary(2) || !file_name.is_char_boundary(4) {
        return file_name.to_string();
    }
    format!("{}/{}/{}", &file_name[..2], &file_name[2..4], file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{ImageFormat, ResizeMode};

    fn options() -> TransformOptions {
        TransformOptions::new("/images/logo.png", 50, 50, ResizeMode::Crop, ImageFormat::Jpeg)
    }

    #[test]
    fn key_is_deterministic() {
        assert_eq!(cache_key(&options()), cache_key(&options()));
    }

    #[test]
    fn key_ignores_path_casing_and_separators() {
        let upper = TransformOptions::new(
            "\\Images\\Logo.PNG",
            50,
            50,
            ResizeMode::Crop,
            ImageFormat::Jpeg,
        );
        assert_eq!(cache_key(&options()), cache_key(&upper));
    }

    #[test]
    fn key_changes_with_any_option() {
        let base = cache_key(&options());

        let mut wider = options();
        wider.width = 51;
        assert_ne!(base, cache_key(&wider));

        let requality = options().with_quality(10);
        assert_ne!(base, cache_key(&requality));

        let refocused = options().with_focal_point(0.5, 0.5);
        assert_ne!(base, cache_key(&refocused));
    }

    #[test]
    fn key_is_filesystem_safe() {
        let key = cache_key(&options());
        assert_eq!(key.len(), 64);
        assert!(key.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(key, key.to_ascii_lowercase());
    }

    #[test]
    fn file_name_carries_target_extension() {
        assert!(cache_file_name(&options()).ends_with(".jpg"));
    }

    #[test]
    fn fan_out_nests_two_levels() {
        assert_eq!(fan_out_relative_path("abcdef.jpg"), "ab/cd/abcdef.jpg");
        assert_eq!(fan_out_relative_path("ab"), "ab");
    }
}
