use std::path::Path;

use bytes::Bytes;

use crate::{
    archive::ArchiveEntry,
    config::TranscodeConfig,
    encoder::EncoderType,
    error::TranscodeError,
    scaler::Scaler,
    source::{ImageKind, ImageSource},
};

/// Output of one successful transcode.
#[derive(Debug, Clone)]
pub struct TranscodeResult {
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
    pub resized: bool,
    pub optimized: Bytes,
    pub webp: Bytes,
}

impl TranscodeResult {
    pub fn optimized_len(&self) -> u64 {
        self.optimized.len() as u64
    }

    pub fn webp_len(&self) -> u64 {
        self.webp.len() as u64
    }

    /// The two archive entries for `filename`: the optimized original under
    /// the same name and the WebP under the same stem.
    pub fn into_entries(self, filename: &str) -> [ArchiveEntry; 2] {
        [
            ArchiveEntry::new(filename, self.optimized),
            ArchiveEntry::new(webp_name(filename), self.webp),
        ]
    }
}

/// `photo.JPG` -> `photo.webp`
pub fn webp_name(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    format!("{}.webp", stem)
}

/// Decode, downscale to `max_width` if wider, and re-encode as the original
/// format plus WebP. Blocking and CPU heavy; call from a blocking thread.
pub fn transcode(
    source: &ImageSource,
    config: &TranscodeConfig,
) -> Result<TranscodeResult, TranscodeError> {
    let data = source.read()?;
    let decoded = image::load_from_memory_with_format(&data, source.kind().image_format())?;
    drop(data);

    let scaler = Scaler::new(config.max_width());
    let resized = scaler.run(&decoded);
    let resized_flag = resized.is_some();
    let frame = match resized {
        Some(frame) => frame,
        None => decoded,
    };

    let optimized = EncoderType::same_format(source.kind(), config.quality_jpg()).encode(&frame)?;
    let webp = EncoderType::Webp {
        quality: config.quality_webp(),
    }
    .encode(&frame)?;

    Ok(TranscodeResult {
        kind: source.kind(),
        width: frame.width(),
        height: frame.height(),
        resized: resized_flag,
        optimized,
        webp,
    })
}

#[cfg(test)]
#[path = "transcoder_test.rs"]
mod transcoder_test;
