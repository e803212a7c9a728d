//! Virtual-path codec for transformation requests.
//!
//! A transformed image is addressed by a self-describing path:
//!
//! ```text
//! /{prefix}/{width}/{height}/{resizeMode}/{originalExt}/{...sourceSegments}[@Nx].{targetExt}
//! ```
//!
//! [`encode`] produces such a path from [`TransformOptions`]; [`decode`]
//! parses one back, distinguishing paths that are malformed
//! ([`DecodeOutcome::Invalid`]) from paths that simply belong to another
//! handler ([`DecodeOutcome::Skip`]).

use crate::options::{normalize_source_path, ImageFormat, ResizeMode, TransformOptions};

/// Result of decoding a virtual path.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// The path belongs to this handler and parsed cleanly.
    Success(TransformOptions),
    /// The path does not start with the configured prefix; not an error.
    Skip,
    /// The path starts with the prefix (or fails the extension fast-reject)
    /// but is malformed. Client error, never retried.
    Invalid,
}

impl DecodeOutcome {
    pub fn into_options(self) -> Option<TransformOptions> {
        match self {
            DecodeOutcome::Success(options) => Some(options),
            _ => None,
        }
    }
}

/// Build the virtual path for `options` under `prefix`.
///
/// The original extension of the source path becomes its own segment and the
/// tail carries the *target* format's extension, so the decoded request knows
/// both the stored format and the requested one.
pub fn encode(prefix: &str, options: &TransformOptions) -> String {
    let source = normalize_source_path(&options.source_path);
    let target_ext = options.format.extension();
    let (stem, original_ext) = match split_extension(&source) {
        Some((stem, ext)) => (stem.to_string(), ext.to_string()),
        // Extension-less sources are degenerate; carry the target extension
        // so the path still round-trips.
        None => (source.clone(), target_ext.to_string()),
    };

    let mut out = String::from("/");
    out.push_str(&prefix_segments(prefix).join("/"));
    out.push('/');
    out.push_str(&options.width.to_string());
    out.push('/');
    out.push_str(&options.height.to_string());
    out.push('/');
    out.push_str(options.resize_mode.token());
    out.push('/');
    out.push_str(&original_ext);
    out.push('/');
    out.push_str(stem.trim_start_matches('/'));
    out.push('.');
    out.push_str(target_ext);
    out
}

/// Parse a virtual path produced by [`encode`].
///
/// `override_format` forces the target format regardless of the tail
/// extension (used when content negotiation already picked one).
pub fn decode(prefix: &str, path: &str, override_format: Option<ImageFormat>) -> DecodeOutcome {
    let path = path.trim().to_ascii_lowercase().replace('\\', "/");

    // Fast reject before any prefix work: a request without a file
    // extension can never be an image request.
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some(last) = segments.last() else {
        return DecodeOutcome::Invalid;
    };
    if split_extension(last).is_none() {
        return DecodeOutcome::Invalid;
    }

    let prefix = prefix_segments(prefix);
    if segments.len() < prefix.len() || segments[..prefix.len()] != prefix[..] {
        return DecodeOutcome::Skip;
    }

    // width / height / mode / originalExt / at least one source segment
    let rest = &segments[prefix.len()..];
    if rest.len() < 5 {
        return DecodeOutcome::Invalid;
    }

    let Some(width) = parse_positive(rest[0]) else {
        return DecodeOutcome::Invalid;
    };
    let Some(height) = parse_positive(rest[1]) else {
        return DecodeOutcome::Invalid;
    };
    let Ok(resize_mode) = rest[2].parse::<ResizeMode>() else {
        return DecodeOutcome::Invalid;
    };
    let original_ext = rest[3];
    if original_ext.is_empty() || original_ext.contains('.') {
        return DecodeOutcome::Invalid;
    }

    let tail = rest[4..].join("/");
    let Some((tail_stem, target_ext)) = split_extension(&tail) else {
        return DecodeOutcome::Invalid;
    };
    let format = match override_format {
        Some(format) => format,
        None => match ImageFormat::from_extension(target_ext) {
            Some(format) => format,
            None => return DecodeOutcome::Invalid,
        },
    };

    // Recover the logical source path by swapping the target extension back
    // for the original one, then peel off any pixel-density suffix.
    let mut source_stem = tail_stem.to_string();
    let mut width = width;
    let mut height = height;
    if let Some((bare_stem, density)) = split_density_suffix(&source_stem) {
        source_stem = bare_stem;
        let (Some(w), Some(h)) = (width.checked_mul(density), height.checked_mul(density)) else {
            return DecodeOutcome::Invalid;
        };
        width = w;
        height = h;
    }

    let source_path = format!("/{}.{}", source_stem, original_ext);
    DecodeOutcome::Success(TransformOptions::new(
        source_path,
        width,
        height,
        resize_mode,
        format,
    ))
}

fn parse_positive(segment: &str) -> Option<u32> {
    match segment.parse::<u32>() {
        Ok(n) if n > 0 => Some(n),
        _ => None,
    }
}

/// Lower-cased, slash-trimmed prefix segments. The prefix may span multiple
/// segments ("media/resized") and is matched case-insensitively.
fn prefix_segments(prefix: &str) -> Vec<String> {
    prefix
        .trim()
        .to_ascii_lowercase()
        .replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split `name` at its final dot into (stem, extension). Returns `None` when
/// there is no extension: no dot, an empty extension ("photo.") or a bare
/// dot-file (".gitignore").
fn split_extension(name: &str) -> Option<(&str, &str)> {
    let idx = name.rfind('.')?;
    let (stem, ext) = (&name[..idx], &name[idx + 1..]);
    let last_segment_stem = stem.rsplit('/').next().unwrap_or(stem);
    if ext.is_empty() || last_segment_stem.is_empty() || ext.contains('/') {
        return None;
    }
    Some((stem, ext))
}

/// Detect a `@Nx` pixel-density marker at the end of a path stem. Returns the
/// stem with the marker removed plus the multiplier.
fn split_density_suffix(stem: &str) -> Option<(String, u32)> {
    let at = stem.rfind('@')?;
    let suffix = &stem[at + 1..];
    let digits = suffix.strip_suffix('x')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n = digits.parse::<u32>().ok().filter(|&n| n > 0)?;
    // The marker must sit on the file name, not an intermediate directory.
    if stem[..at].ends_with('/') || stem[at..].contains('/') {
        return None;
    }
    Some((stem[..at].to_string(), n))
}
