use bytes::Bytes;
use image::{
    DynamicImage,
    codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder},
};
use jpeg_encoder::ColorType;

use crate::{error::TranscodeError, source::ImageKind};

/// One output encoding for a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderType {
    /// Progressive JPEG with optimized Huffman tables.
    Jpeg { quality: u8 },
    /// Best zlib level, then lossless reductions (palette, bit depth, color type).
    Png(Settings),
    /// Lossy WebP.
    Webp { quality: u8 },
}

impl EncoderType {
    /// Encoder that writes `kind` back in its own format.
    pub fn same_format(kind: ImageKind, quality_jpg: u8) -> Self {
        match kind {
            ImageKind::Jpeg => EncoderType::Jpeg {
                quality: quality_jpg,
            },
            ImageKind::Png => EncoderType::Png(Settings::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EncoderType::Jpeg { .. } => "jpeg",
            EncoderType::Png(_) => "png",
            EncoderType::Webp { .. } => "webp",
        }
    }

    /// Encodes pixels only; nothing from the source container (EXIF, ICC,
    /// text chunks) is carried into the output.
    pub fn encode(&self, frame: &DynamicImage) -> Result<Bytes, TranscodeError> {
        match *self {
            EncoderType::Jpeg { quality } => encode_jpeg(frame, quality),
            EncoderType::Png(settings) => encode_png(frame, &settings),
            EncoderType::Webp { quality } => encode_webp(frame, quality),
        }
    }
}

/// PNG optimizer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// oxipng preset, 0..=6.
    pub preset: u8,
    pub palette_reduction: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            preset: 6,
            palette_reduction: true,
        }
    }
}

fn encode_jpeg(frame: &DynamicImage, quality: u8) -> Result<Bytes, TranscodeError> {
    let width = u16::try_from(frame.width())
        .map_err(|_| TranscodeError::encode("jpeg", "width exceeds 65535"))?;
    let height = u16::try_from(frame.height())
        .map_err(|_| TranscodeError::encode("jpeg", "height exceeds 65535"))?;

    let rgb;
    let (pixels, color_type) = match frame {
        DynamicImage::ImageLuma8(gray) => (gray.as_raw().as_slice(), ColorType::Luma),
        other => {
            rgb = other.to_rgb8();
            (rgb.as_raw().as_slice(), ColorType::Rgb)
        }
    };

    let mut buf = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut buf, quality);
    encoder.set_progressive(true);
    encoder.set_optimized_huffman_tables(true);
    encoder
        .encode(pixels, width, height, color_type)
        .map_err(|e| TranscodeError::encode("jpeg", e))?;

    Ok(Bytes::from(buf))
}

fn encode_png(frame: &DynamicImage, settings: &Settings) -> Result<Bytes, TranscodeError> {
    let mut raw = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut raw, CompressionType::Best, PngFilter::Adaptive);
    frame
        .write_with_encoder(encoder)
        .map_err(|e| TranscodeError::encode("png", e))?;

    let mut options = oxipng::Options::from_preset(settings.preset);
    options.palette_reduction = settings.palette_reduction;
    options.strip = oxipng::StripChunks::Safe;
    let optimized =
        oxipng::optimize_from_memory(&raw, &options).map_err(|e| TranscodeError::encode("png", e))?;

    if optimized.len() < raw.len() {
        Ok(Bytes::from(optimized))
    } else {
        Ok(Bytes::from(raw))
    }
}

fn encode_webp(frame: &DynamicImage, quality: u8) -> Result<Bytes, TranscodeError> {
    let (width, height) = (frame.width(), frame.height());
    let pixels = if frame.color().has_alpha() {
        frame.to_rgba8().into_raw()
    } else {
        frame.to_rgb8().into_raw()
    };
    let encoder = if frame.color().has_alpha() {
        webp::Encoder::from_rgba(&pixels, width, height)
    } else {
        webp::Encoder::from_rgb(&pixels, width, height)
    };
    let encoded = encoder
        .encode_simple(false, quality as f32)
        .map_err(|e| TranscodeError::encode("webp", format!("{:?}", e)))?;

    Ok(Bytes::copy_from_slice(&encoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Rgba, RgbaImage};

    #[test]
    fn test_same_format() {
        assert_eq!(
            EncoderType::same_format(ImageKind::Jpeg, 60),
            EncoderType::Jpeg { quality: 60 }
        );
        assert_eq!(
            EncoderType::same_format(ImageKind::Png, 60),
            EncoderType::Png(Settings::default())
        );
    }

    #[test]
    fn test_jpeg_grayscale_roundtrip_dimensions() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_fn(64, 32, |x, y| {
            image::Luma([((x + y) % 255) as u8])
        }));
        let bytes = EncoderType::Jpeg { quality: 80 }.encode(&gray).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded =
            image::load_from_memory_with_format(&bytes, image::ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 32));
    }

    #[test]
    fn test_png_keeps_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(20, 10, |x, _| {
            Rgba([255, 0, 0, if x < 10 { 0 } else { 255 }])
        }));
        let bytes = EncoderType::Png(Settings::default()).encode(&img).unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 10));
        assert_eq!(decoded.to_rgba8().get_pixel(0, 0)[3], 0);
        assert_eq!(decoded.to_rgba8().get_pixel(15, 0)[3], 255);
    }

    #[test]
    fn test_png_fast_settings() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(24, 24, |x, y| {
            Rgba([(x * 10) as u8, (y * 10) as u8, 0, 255])
        }));
        let fast = Settings {
            preset: 1,
            palette_reduction: false,
        };
        let bytes = EncoderType::Png(fast).encode(&img).unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png).unwrap();
        assert_eq!(decoded.to_rgba8().get_pixel(3, 5).0, [30, 50, 0, 255]);
    }

    #[test]
    fn test_webp_header() {
        let img = DynamicImage::new_rgb8(16, 16);
        let bytes = EncoderType::Webp { quality: 75 }.encode(&img).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }
}
