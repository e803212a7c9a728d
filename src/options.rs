use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default output quality when a request does not specify one.
pub const DEFAULT_QUALITY: u8 = 75;

/// Supported output image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    WebP,
}

impl ImageFormat {
    /// File extension used on the wire and in cache file names, no leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
            ImageFormat::WebP => "webp",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::WebP => "image/webp",
        }
    }

    /// Infer a format from a file extension (without the dot), case-insensitive.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "gif" => Some(ImageFormat::Gif),
            "bmp" => Some(ImageFormat::Bmp),
            "webp" => Some(ImageFormat::WebP),
            _ => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageFormat::from_extension(s).ok_or_else(|| format!("invalid image format: {}", s))
    }
}

/// Policy for reconciling the source aspect ratio with the requested
/// target dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    Crop,
    Fill,
    Uniform,
    UniformFill,
    UseWidth,
    UseHeight,
}

impl ResizeMode {
    /// Lower-case wire token for the virtual path segment.
    pub fn token(self) -> &'static str {
        match self {
            ResizeMode::Crop => "crop",
            ResizeMode::Fill => "fill",
            ResizeMode::Uniform => "uniform",
            ResizeMode::UniformFill => "uniformfill",
            ResizeMode::UseWidth => "usewidth",
            ResizeMode::UseHeight => "useheight",
        }
    }
}

impl fmt::Display for ResizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for ResizeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "crop" => Ok(ResizeMode::Crop),
            "fill" => Ok(ResizeMode::Fill),
            "uniform" => Ok(ResizeMode::Uniform),
            "uniformfill" => Ok(ResizeMode::UniformFill),
            "usewidth" => Ok(ResizeMode::UseWidth),
            "useheight" => Ok(ResizeMode::UseHeight),
            _ => Err(format!("invalid resize mode: {}", s)),
        }
    }
}

/// Resampling filter quality passed through to the resize operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterQuality {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for FilterQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterQuality::Low => write!(f, "low"),
            FilterQuality::Medium => write!(f, "medium"),
            FilterQuality::High => write!(f, "high"),
        }
    }
}

/// Normalized focal point for crop positioning, both coordinates in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocalPoint {
    pub x: f32,
    pub y: f32,
}

impl FocalPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x: x.clamp(0.0, 1.0),
            y: y.clamp(0.0, 1.0),
        }
    }
}

/// Immutable description of one transformation request.
///
/// Two instances with identical fields are interchangeable for caching and
/// allow-list purposes; the source path is normalized at construction so
/// that differently-cased or differently-delimited raw input compares equal.
///
/// `width` and `height` are always carried (the wire format requires both
/// segments); under [`ResizeMode::UseWidth`] / [`ResizeMode::UseHeight`] the
/// unused dimension is ignored by the resize operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformOptions {
    pub source_path: String,
    pub width: u32,
    pub height: u32,
    pub resize_mode: ResizeMode,
    pub format: ImageFormat,
    pub quality: u8,
    pub filter_quality: FilterQuality,
    pub focal_point: Option<FocalPoint>,
}

impl TransformOptions {
    pub fn new(
        source_path: impl Into<String>,
        width: u32,
        height: u32,
        resize_mode: ResizeMode,
        format: ImageFormat,
    ) -> Self {
        Self {
            source_path: normalize_source_path(&source_path.into()),
            width,
            height,
            resize_mode,
            format,
            quality: DEFAULT_QUALITY,
            filter_quality: FilterQuality::default(),
            focal_point: None,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.min(100);
        self
    }

    pub fn with_filter_quality(mut self, filter_quality: FilterQuality) -> Self {
        self.filter_quality = filter_quality;
        self
    }

    pub fn with_focal_point(mut self, x: f32, y: f32) -> Self {
        self.focal_point = Some(FocalPoint::new(x, y));
        self
    }
}

impl fmt::Display for TransformOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}x{} {} {} q{}",
            self.source_path, self.width, self.height, self.resize_mode, self.format, self.quality
        )
    }
}

/// Canonical form of a logical source path: lower-case, forward slashes,
/// exactly one leading slash.
pub(crate) fn normalize_source_path(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase().replace('\\', "/");
    let trimmed = lowered.trim_start_matches('/');
    format!("/{}", trimmed)
}
