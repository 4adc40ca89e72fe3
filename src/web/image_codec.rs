use image::{DynamicImage, ImageError, ImageFormat, ImageReader, Limits, codecs::jpeg::JpegEncoder};
use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Quality used when re-encoding HEIC/HEIF uploads for the printer.
pub const TRANSCODE_JPEG_QUALITY: u8 = 85;

// Bounds for decoding untrusted uploads. A 48 MP phone photo is 8064x6048.
pub const MAX_DECODE_DIMENSION: u32 = 12_000;
pub const MAX_DECODE_ALLOC: u64 = 256 * 1024 * 1024;

pub fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_DECODE_DIMENSION);
    limits.max_image_height = Some(MAX_DECODE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    limits
}

/// Image formats accepted for upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    WebP,
    Heic,
    Heif,
}

impl ImageKind {
    pub fn name(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpeg",
            ImageKind::Png => "png",
            ImageKind::Gif => "gif",
            ImageKind::WebP => "webp",
            ImageKind::Heic => "heic",
            ImageKind::Heif => "heif",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Gif => "image/gif",
            ImageKind::WebP => "image/webp",
            ImageKind::Heic => "image/heic",
            ImageKind::Heif => "image/heif",
        }
    }

    fn from_decoded(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            ImageFormat::Png => Some(ImageKind::Png),
            ImageFormat::Gif => Some(ImageKind::Gif),
            ImageFormat::WebP => Some(ImageKind::WebP),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Signature {
    /// Bytes the data must start with.
    Prefix(&'static [u8]),
    /// Bytes that must occur somewhere inside the first `window` bytes.
    Within {
        needle: &'static [u8],
        window: usize,
    },
}

impl Signature {
    pub fn matches(&self, data: &[u8]) -> bool {
        match *self {
            Signature::Prefix(prefix) => data.starts_with(prefix),
            Signature::Within { needle, window } => {
                let head = &data[..data.len().min(window)];
                head.windows(needle.len()).any(|w| w == needle)
            }
        }
    }
}

const HEIF_BRAND_WINDOW: usize = 32;

/// Checked in order; the first match wins.
pub const SIGNATURES: &[(Signature, ImageKind)] = &[
    (Signature::Prefix(b"\xFF\xD8\xFF"), ImageKind::Jpeg),
    (Signature::Prefix(b"\x89PNG\r\n\x1a\n"), ImageKind::Png),
    (Signature::Prefix(b"GIF87a"), ImageKind::Gif),
    (Signature::Prefix(b"GIF89a"), ImageKind::Gif),
    (
        Signature::Within {
            needle: b"WEBP",
            window: 16,
        },
        ImageKind::WebP,
    ),
    (heif_brand(b"ftypheic"), ImageKind::Heic),
    (heif_brand(b"ftypheix"), ImageKind::Heic),
    (heif_brand(b"ftyphevc"), ImageKind::Heic),
    (heif_brand(b"ftypheim"), ImageKind::Heic),
    (heif_brand(b"ftypheis"), ImageKind::Heic),
    (heif_brand(b"ftyphevm"), ImageKind::Heic),
    (heif_brand(b"ftyphevs"), ImageKind::Heic),
    (heif_brand(b"ftypmif1"), ImageKind::Heif),
    (heif_brand(b"ftypmsf1"), ImageKind::Heif),
];

const fn heif_brand(needle: &'static [u8]) -> Signature {
    Signature::Within {
        needle,
        window: HEIF_BRAND_WINDOW,
    }
}

/// Decides whether `data` is an accepted image.
///
/// The `image` crate gets the first attempt: the format is guessed from the
/// content and the whole image must decode. Anything it cannot handle (HEIC
/// containers, truncated files) is then matched against [`SIGNATURES`].
pub fn detect_image_format(data: &[u8]) -> Option<ImageKind> {
    decode_format(data).or_else(|| sniff_signature(data))
}

fn decode_format(data: &[u8]) -> Option<ImageKind> {
    decode_format_with(data, decode_limits())
}

fn decode_format_with(data: &[u8], limits: Limits) -> Option<ImageKind> {
    let mut reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?;
    reader.limits(limits);
    let format = reader.format()?;

    match reader.decode() {
        Ok(_) => ImageKind::from_decoded(format),
        Err(e) => {
            debug!("Decoding as {:?} failed: {}", format, e);
            None
        }
    }
}

pub fn sniff_signature(data: &[u8]) -> Option<ImageKind> {
    SIGNATURES
        .iter()
        .find(|(signature, _)| signature.matches(data))
        .map(|(_, kind)| *kind)
}

pub fn is_heic_filename(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    lower.ends_with(".heic") || lower.ends_with(".heif")
}

/// Sibling of `path` with the extension swapped for `jpg`.
pub fn transcoded_path(path: &Path) -> PathBuf {
    path.with_extension("jpg")
}

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode JPEG {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl TranscodeError {
    /// True when no decoder in this build understands the file.
    pub fn is_unsupported_format(&self) -> bool {
        matches!(
            self,
            TranscodeError::Decode {
                source: ImageError::Unsupported(_),
                ..
            }
        )
    }
}

/// Re-encodes `src` as a three-channel JPEG at `dst`. Blocking.
pub fn transcode_to_jpeg(src: &Path, dst: &Path) -> Result<(), TranscodeError> {
    let mut reader = ImageReader::open(src)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|source| TranscodeError::Io {
            path: src.to_path_buf(),
            source,
        })?;
    reader.limits(decode_limits());
    let decoded = reader.decode().map_err(|source| TranscodeError::Decode {
        path: src.to_path_buf(),
        source,
    })?;

    let rgb = match decoded {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => other.to_rgb8(),
    };

    let io_error = |source| TranscodeError::Io {
        path: dst.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(File::create(dst).map_err(io_error)?);
    JpegEncoder::new_with_quality(&mut writer, TRANSCODE_JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|source| TranscodeError::Encode {
            path: dst.to_path_buf(),
            source,
        })?;
    writer.flush().map_err(io_error)?;

    debug!("Transcoded {} to {}", src.display(), dst.display());
    Ok(())
}
