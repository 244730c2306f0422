//! Image preprocessing for OCR: grayscale, non-local-means denoising and
//! adaptive Gaussian thresholding.

use image::{DynamicImage, GenericImageView, GrayImage, Luma};
use tracing::debug;

use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// Image preprocessor for the local OCR pipeline.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    /// Maximum image dimension.
    max_size: u32,
    /// Non-local-means filter strength (`h`).
    denoise_strength: f32,
    /// Non-local-means patch size.
    template_window: u32,
    /// Non-local-means search window size.
    search_window: u32,
    /// Adaptive threshold neighbourhood size.
    block_size: u32,
    /// Constant subtracted from the weighted local mean.
    offset: f32,
}

impl ImagePreprocessor {
    /// Create a new preprocessor with default settings.
    pub fn new() -> Self {
        Self::from_config(&OcrConfig::default())
    }

    /// Create a preprocessor from OCR configuration.
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            max_size: config.max_image_size,
            denoise_strength: config.denoise_strength,
            template_window: config.denoise_template_window,
            search_window: config.denoise_search_window,
            block_size: config.threshold_block_size,
            offset: config.threshold_offset,
        }
    }

    /// Set maximum image dimension.
    pub fn with_max_size(mut self, size: u32) -> Self {
        self.max_size = size;
        self
    }

    /// Set the non-local-means filter strength.
    pub fn with_denoise_strength(mut self, strength: f32) -> Self {
        self.denoise_strength = strength;
        self
    }

    /// Run the full chain: downscale, grayscale, denoise, binarize.
    pub fn prepare(&self, image: &DynamicImage) -> Result<GrayImage, OcrError> {
        self.check_params()?;

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(OcrError::Preprocessing("image has no pixels".to_string()));
        }

        let (new_width, new_height) = self.calculate_resize_dimensions(width, height);
        let gray = if (new_width, new_height) != (width, height) {
            debug!(
                "Downscaling {}x{} -> {}x{}",
                width, height, new_width, new_height
            );
            image
                .resize_exact(new_width, new_height, image::imageops::FilterType::Lanczos3)
                .to_luma8()
        } else {
            image.to_luma8()
        };

        let denoised = self.denoise(&gray);
        Ok(self.binarize(&denoised))
    }

    /// Non-local-means denoising.
    ///
    /// Every pixel becomes a weighted mean of the pixels in its search
    /// window, weighted by `exp(-d / h^2)` where `d` is the mean squared
    /// difference between the two surrounding patches. Patch distances are
    /// computed per search offset with an integral image, so the cost is
    /// independent of the patch size.
    pub fn denoise(&self, image: &GrayImage) -> GrayImage {
        let (width, height) = image.dimensions();
        if self.denoise_strength <= 0.0 || width == 0 || height == 0 {
            return image.clone();
        }

        let (w, h) = (width as usize, height as usize);
        let r = (self.template_window / 2) as usize;
        let big_r = (self.search_window / 2) as usize;
        let pad = r + big_r;
        let pw = w + 2 * pad;
        let ph = h + 2 * pad;

        let mut padded = vec![0f32; pw * ph];
        for py in 0..ph {
            let sy = mirror(py as isize - pad as isize, h);
            for px in 0..pw {
                let sx = mirror(px as isize - pad as isize, w);
                padded[py * pw + px] = image.get_pixel(sx as u32, sy as u32)[0] as f32;
            }
        }

        let patch_area = ((2 * r + 1) * (2 * r + 1)) as f64;
        let h2 = (self.denoise_strength as f64) * (self.denoise_strength as f64);

        // Squared differences cover every patch around every output pixel
        let dw = w + 2 * r;
        let dh = h + 2 * r;
        let mut integral = vec![0f64; (dw + 1) * (dh + 1)];
        let mut weight_sum = vec![0f64; w * h];
        let mut value_sum = vec![0f64; w * h];

        let span = big_r as isize;
        for dy in -span..=span {
            for dx in -span..=span {
                for y in 0..dh {
                    let mut row = 0f64;
                    let base_y = y + big_r;
                    let shifted_y = (base_y as isize + dy) as usize;
                    for x in 0..dw {
                        let base_x = x + big_r;
                        let shifted_x = (base_x as isize + dx) as usize;
                        let diff = padded[base_y * pw + base_x] - padded[shifted_y * pw + shifted_x];
                        row += (diff * diff) as f64;
                        integral[(y + 1) * (dw + 1) + x + 1] = integral[y * (dw + 1) + x + 1] + row;
                    }
                }

                for y in 0..h {
                    for x in 0..w {
                        let (x0, y0, x1, y1) = (x, y, x + 2 * r + 1, y + 2 * r + 1);
                        let sum = integral[y1 * (dw + 1) + x1] - integral[y0 * (dw + 1) + x1]
                            - integral[y1 * (dw + 1) + x0]
                            + integral[y0 * (dw + 1) + x0];
                        let weight = (-(sum / patch_area) / h2).exp();

                        let sx = (x + pad) as isize + dx;
                        let sy = (y + pad) as isize + dy;
                        let value = padded[sy as usize * pw + sx as usize] as f64;

                        weight_sum[y * w + x] += weight;
                        value_sum[y * w + x] += weight * value;
                    }
                }
            }
        }

        GrayImage::from_fn(width, height, |x, y| {
            let idx = y as usize * w + x as usize;
            // The zero offset always contributes weight 1
            let value = value_sum[idx] / weight_sum[idx];
            Luma([value.round().clamp(0.0, 255.0) as u8])
        })
    }

    /// Adaptive Gaussian threshold: a pixel turns white when it is brighter
    /// than the Gaussian-weighted mean of its neighbourhood minus the offset.
    pub fn binarize(&self, image: &GrayImage) -> GrayImage {
        let (width, height) = image.dimensions();
        let mean = gaussian_blur(image, self.block_size);

        GrayImage::from_fn(width, height, |x, y| {
            let idx = y as usize * width as usize + x as usize;
            let threshold = mean[idx] - self.offset;
            let value = image.get_pixel(x, y)[0] as f32;
            Luma([if value > threshold { 255 } else { 0 }])
        })
    }

    fn check_params(&self) -> Result<(), OcrError> {
        for (name, size) in [
            ("template window", self.template_window),
            ("search window", self.search_window),
            ("threshold block size", self.block_size),
        ] {
            if size == 0 || size % 2 == 0 {
                return Err(OcrError::Preprocessing(format!(
                    "{} must be odd and positive, got {}",
                    name, size
                )));
            }
        }
        Ok(())
    }

    fn calculate_resize_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let max_dim = width.max(height);

        if self.max_size == 0 || max_dim <= self.max_size {
            return (width, height);
        }

        let scale = self.max_size as f32 / max_dim as f32;
        let new_width = (width as f32 * scale) as u32;
        let new_height = (height as f32 * scale) as u32;

        (new_width.max(1), new_height.max(1))
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Reflect an out-of-range index back into `0..n` without repeating the
/// edge pixel.
fn mirror(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let period = 2 * (n - 1);
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i as usize
}

/// 1-D Gaussian kernel for an odd `size`, normalized to sum 1.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as i32;
    let mut kernel: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= total);
    kernel
}

/// Separable Gaussian blur with replicated borders.
fn gaussian_blur(image: &GrayImage, size: u32) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    let kernel = gaussian_kernel(size);
    let half = (size / 2) as isize;

    let mut horizontal = vec![0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = (x as isize + k as isize - half).clamp(0, w as isize - 1) as u32;
                acc += weight * image.get_pixel(sx, y as u32)[0] as f32;
            }
            horizontal[y * w + x] = acc;
        }
    }

    let mut blurred = vec![0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = (y as isize + k as isize - half).clamp(0, h as isize - 1) as usize;
                acc += weight * horizontal[sy * w + x];
            }
            blurred[y * w + x] = acc;
        }
    }

    blurred
}
