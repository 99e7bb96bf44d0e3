//! Image Transforms for Fine-Tuning
//!
//! Phase-specific preprocessing applied to every decoded image:
//!
//! - **Train**: random resized crop to `size x size`, then a random
//!   horizontal flip
//! - **Val**: resize the shorter side to `size`, then a centre crop
//!
//! Both phases end with a CHW float buffer scaled to `[0, 1]`. ImageNet
//! normalisation is applied by the batcher on the device.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use super::Phase;

/// ImageNet channel means
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet channel standard deviations
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Parameters of the random resized crop and flip
#[derive(Clone, Debug)]
pub struct TransformConfig {
    /// Range of the crop area as a fraction of the source area
    pub scale: (f32, f32),
    /// Range of the crop aspect ratio (width / height)
    pub ratio: (f32, f32),
    /// Probability of a horizontal flip
    pub horizontal_flip_prob: f32,
    /// Sampling attempts before falling back to a centre crop
    pub max_attempts: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            scale: (0.08, 1.0),
            ratio: (3.0 / 4.0, 4.0 / 3.0),
            horizontal_flip_prob: 0.5,
            max_attempts: 10,
        }
    }
}

/// Crop window in source pixel coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Transform pipeline for one phase
#[derive(Clone, Debug)]
pub struct ImageTransform {
    phase: Phase,
    size: u32,
    config: TransformConfig,
}

impl ImageTransform {
    /// Training transform (random resized crop + horizontal flip)
    pub fn train(size: u32) -> Self {
        Self {
            phase: Phase::Train,
            size,
            config: TransformConfig::default(),
        }
    }

    /// Validation transform (resize + centre crop)
    pub fn val(size: u32) -> Self {
        Self {
            phase: Phase::Val,
            size,
            config: TransformConfig::default(),
        }
    }

    /// Transform matching a phase
    pub fn for_phase(phase: Phase, size: u32) -> Self {
        match phase {
            Phase::Train => Self::train(size),
            Phase::Val => Self::val(size),
        }
    }

    /// Output side length
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Phase this transform belongs to
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Apply the geometric part of the pipeline
    pub fn apply(&self, img: DynamicImage, rng: &mut ChaCha8Rng) -> DynamicImage {
        match self.phase {
            Phase::Train => {
                let (width, height) = img.dimensions();
                let window = random_resized_crop_window(width, height, &self.config, rng);
                let cropped = img
                    .crop_imm(window.x, window.y, window.width, window.height)
                    .resize_exact(self.size, self.size, FilterType::Triangle);

                if rng.gen::<f32>() < self.config.horizontal_flip_prob {
                    cropped.fliph()
                } else {
                    cropped
                }
            }
            Phase::Val => center_crop(&resize_shorter_side(&img, self.size), self.size),
        }
    }

    /// Apply the pipeline and convert to a `[3, size, size]` buffer in `[0, 1]`
    pub fn preprocess(&self, img: DynamicImage, rng: &mut ChaCha8Rng) -> Vec<f32> {
        to_chw_unit(&self.apply(img, rng))
    }
}

/// Sample a crop window the way `RandomResizedCrop` does
pub fn random_resized_crop_window(
    width: u32,
    height: u32,
    config: &TransformConfig,
    rng: &mut ChaCha8Rng,
) -> CropWindow {
    let area = (width as f32) * (height as f32);
    let log_ratio = (config.ratio.0.ln(), config.ratio.1.ln());

    for _ in 0..config.max_attempts {
        let target_area = area * rng.gen_range(config.scale.0..=config.scale.1);
        let aspect_ratio = rng.gen_range(log_ratio.0..=log_ratio.1).exp();

        let w = (target_area * aspect_ratio).sqrt().round() as u32;
        let h = (target_area / aspect_ratio).sqrt().round() as u32;

        if w > 0 && h > 0 && w <= width && h <= height {
            let x = rng.gen_range(0..=width - w);
            let y = rng.gen_range(0..=height - h);
            return CropWindow {
                x,
                y,
                width: w,
                height: h,
            };
        }
    }

    // Fallback to central crop
    let in_ratio = width as f32 / height as f32;
    let (w, h) = if in_ratio < config.ratio.0 {
        let h = ((width as f32) / config.ratio.0).round() as u32;
        (width, h.clamp(1, height))
    } else if in_ratio > config.ratio.1 {
        let w = ((height as f32) * config.ratio.1).round() as u32;
        (w.clamp(1, width), height)
    } else {
        (width, height)
    };

    CropWindow {
        x: (width - w) / 2,
        y: (height - h) / 2,
        width: w,
        height: h,
    }
}

/// Resize so the shorter side equals `size`, keeping the aspect ratio
pub fn resize_shorter_side(img: &DynamicImage, size: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    let (new_w, new_h) = if width <= height {
        let h = ((size as u64 * height as u64) / width.max(1) as u64) as u32;
        (size, h.max(size))
    } else {
        let w = ((size as u64 * width as u64) / height.max(1) as u64) as u32;
        (w.max(size), size)
    };

    if (new_w, new_h) == (width, height) {
        return img.clone();
    }
    img.resize_exact(new_w, new_h, FilterType::Triangle)
}

/// Crop the central `size x size` region
pub fn center_crop(img: &DynamicImage, size: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width < size || height < size {
        return img.resize_exact(size, size, FilterType::Triangle);
    }

    let x = ((width - size) as f32 / 2.0).round() as u32;
    let y = ((height - size) as f32 / 2.0).round() as u32;
    img.crop_imm(x, y, size, size)
}

/// Convert an image to a CHW float buffer scaled to `[0, 1]`
pub fn to_chw_unit(img: &DynamicImage) -> Vec<f32> {
    let rgb = img.to_rgb8();
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let plane = width * height;
    let mut tensor = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let idx = y as usize * width + x as usize;
        tensor[idx] = pixel[0] as f32 / 255.0;
        tensor[plane + idx] = pixel[1] as f32 / 255.0;
        tensor[2 * plane + idx] = pixel[2] as f32 / 255.0;
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use rand::SeedableRng;

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128u8])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_train_output_size() {
        let transform = ImageTransform::train(32);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let out = transform.apply(create_test_image(100, 60), &mut rng);
        assert_eq!(out.dimensions(), (32, 32));
    }

    #[test]
    fn test_val_output_size() {
        let transform = ImageTransform::val(32);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let out = transform.apply(create_test_image(100, 60), &mut rng);
        assert_eq!(out.dimensions(), (32, 32));
    }

    #[test]
    fn test_crop_window_within_bounds() {
        let config = TransformConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..100 {
            let w = random_resized_crop_window(120, 80, &config, &mut rng);
            assert!(w.width > 0 && w.height > 0);
            assert!(w.x + w.width <= 120);
            assert!(w.y + w.height <= 80);
        }
    }

    #[test]
    fn test_crop_window_fallback_for_extreme_aspect() {
        let config = TransformConfig {
            max_attempts: 0,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let w = random_resized_crop_window(400, 10, &config, &mut rng);
        assert_eq!(w.height, 10);
        assert_eq!(w.width, 13);
        assert_eq!(w.x, (400 - 13) / 2);
    }

    #[test]
    fn test_resize_shorter_side_keeps_aspect() {
        let out = resize_shorter_side(&create_test_image(200, 100), 50);
        assert_eq!(out.dimensions(), (100, 50));

        let out = resize_shorter_side(&create_test_image(100, 300), 50);
        assert_eq!(out.dimensions(), (50, 150));
    }

    #[test]
    fn test_center_crop_region() {
        let img = create_test_image(10, 6);
        let out = center_crop(&img, 4);
        assert_eq!(out.dimensions(), (4, 4));
        // Left offset is 3, top offset is 1
        assert_eq!(out.to_rgb8().get_pixel(0, 0)[0], 3);
        assert_eq!(out.to_rgb8().get_pixel(0, 0)[1], 1);
    }

    #[test]
    fn test_chw_layout_and_range() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_fn(2, 2, |_, _| Rgb([255u8, 0, 51])));
        let data = to_chw_unit(&img);
        assert_eq!(data.len(), 12);
        assert!(data[..4].iter().all(|&v| (v - 1.0).abs() < 1e-6));
        assert!(data[4..8].iter().all(|&v| v == 0.0));
        assert!(data[8..].iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_train_transform_is_seeded() {
        let transform = ImageTransform::train(16);
        let a = transform.preprocess(create_test_image(64, 48), &mut ChaCha8Rng::seed_from_u64(3));
        let b = transform.preprocess(create_test_image(64, 48), &mut ChaCha8Rng::seed_from_u64(3));
        assert_eq!(a, b);
    }
}
