use image::{DynamicImage, imageops::FilterType};

/// Width-bounded proportional downscaler. Never enlarges.
pub struct Scaler {
    max_width: u32,
    filter: FilterType,
}

impl Scaler {
    pub fn new(max_width: u32) -> Self {
        Self {
            max_width,
            filter: FilterType::Lanczos3,
        }
    }

    /// Output dimensions for an image of `width` x `height`.
    pub fn target_size(&self, width: u32, height: u32) -> (u32, u32) {
        if width <= self.max_width {
            return (width, height);
        }
        let scaled = (height as f64 * self.max_width as f64 / width as f64).round();
        (self.max_width, (scaled as u32).max(1))
    }

    /// Returns the resized image, or `None` when the input already fits.
    pub fn run(&self, frame: &DynamicImage) -> Option<DynamicImage> {
        let (width, height) = (frame.width(), frame.height());
        let (dst_w, dst_h) = self.target_size(width, height);
        if (dst_w, dst_h) == (width, height) {
            return None;
        }
        Some(frame.resize_exact(dst_w, dst_h, self.filter))
    }
}
