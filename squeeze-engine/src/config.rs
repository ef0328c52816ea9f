use std::ops::RangeInclusive;

use crate::error::ValidationError;

pub const DEFAULT_MAX_WIDTH: u32 = 1600;
pub const DEFAULT_QUALITY_JPG: u8 = 75;
pub const DEFAULT_QUALITY_WEBP: u8 = 75;

pub const QUALITY_RANGE: RangeInclusive<i64> = 1..=100;

/// Per-job transcode settings. Only constructible through [`TranscodeConfig::new`],
/// so holding one means the values are in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeConfig {
    max_width: u32,
    quality_jpg: u8,
    quality_webp: u8,
}

impl TranscodeConfig {
    pub fn new(
        max_width: i64,
        quality_jpg: i64,
        quality_webp: i64,
    ) -> Result<Self, ValidationError> {
        let max_width = u32::try_from(max_width)
            .ok()
            .filter(|w| *w > 0)
            .ok_or(ValidationError::MaxWidth(max_width))?;
        if !QUALITY_RANGE.contains(&quality_jpg) {
            return Err(ValidationError::QualityJpg(quality_jpg));
        }
        if !QUALITY_RANGE.contains(&quality_webp) {
            return Err(ValidationError::QualityWebp(quality_webp));
        }

        Ok(Self {
            max_width,
            quality_jpg: quality_jpg as u8,
            quality_webp: quality_webp as u8,
        })
    }

    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    pub fn quality_jpg(&self) -> u8 {
        self.quality_jpg
    }

    pub fn quality_webp(&self) -> u8 {
        self.quality_webp
    }
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            quality_jpg: DEFAULT_QUALITY_JPG,
            quality_webp: DEFAULT_QUALITY_WEBP,
        }
    }
}

impl std::fmt::Display for TranscodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "maxWidth={}, qualityJpg={}, qualityWebp={}",
            self.max_width, self.quality_jpg, self.quality_webp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = TranscodeConfig::new(800, 1, 100).unwrap();
        assert_eq!(config.max_width(), 800);
        assert_eq!(config.quality_jpg(), 1);
        assert_eq!(config.quality_webp(), 100);
    }

    #[test]
    fn test_default_matches_constants() {
        let config = TranscodeConfig::default();
        assert_eq!(config, TranscodeConfig::new(1600, 75, 75).unwrap());
    }

    #[test]
    fn test_rejects_non_positive_width() {
        assert!(matches!(
            TranscodeConfig::new(0, 75, 75),
            Err(ValidationError::MaxWidth(0))
        ));
        assert!(matches!(
            TranscodeConfig::new(-10, 75, 75),
            Err(ValidationError::MaxWidth(-10))
        ));
        assert!(matches!(
            TranscodeConfig::new(i64::from(u32::MAX) + 1, 75, 75),
            Err(ValidationError::MaxWidth(_))
        ));
    }

    #[test]
    fn test_rejects_quality_out_of_range() {
        assert!(matches!(
            TranscodeConfig::new(1600, 0, 75),
            Err(ValidationError::QualityJpg(0))
        ));
        assert!(matches!(
            TranscodeConfig::new(1600, 101, 75),
            Err(ValidationError::QualityJpg(101))
        ));
        assert!(matches!(
            TranscodeConfig::new(1600, 75, 0),
            Err(ValidationError::QualityWebp(0))
        ));
        assert!(matches!(
            TranscodeConfig::new(1600, 75, 250),
            Err(ValidationError::QualityWebp(250))
        ));
    }
}
