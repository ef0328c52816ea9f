//! Deterministic image fixtures for tests.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

use crate::source::ImageSource;

/// Gradient with some high-frequency detail so encoders have work to do.
pub fn rgb_pattern(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        let noise = ((x * 7 + y * 13) % 17) as u8;
        Rgb([
            ((x * 255) / width.max(1)) as u8 ^ noise,
            ((y * 255) / height.max(1)) as u8,
            (((x + y) * 3) % 256) as u8,
        ])
    }))
}

pub fn rgba_pattern(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            (x % 256) as u8,
            (y % 256) as u8,
            128,
            if x < width / 2 { 0 } else { 255 },
        ])
    }))
}

/// Baseline JPEG at quality 95, larger than anything the pipeline emits.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 95);
    rgb_pattern(width, height)
        .write_with_encoder(encoder)
        .unwrap();
    out
}

/// PNG written at the fastest compression level.
pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn jpeg_source(name: &str, width: u32, height: u32) -> ImageSource {
    ImageSource::from_bytes(name, jpeg_bytes(width, height)).unwrap()
}

/// Has a JPEG name and JPEG magic but no decodable content.
pub fn corrupt_source(name: &str) -> ImageSource {
    ImageSource::from_bytes(name, vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46]).unwrap()
}
