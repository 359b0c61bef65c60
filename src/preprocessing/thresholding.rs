//! # Image Thresholding Module
//!
//! Binary thresholding for grain segmentation. Grains are assumed to be darker than
//! the background, so the mask is inverted: pixels at or below the Otsu level become
//! foreground (255) and everything brighter becomes background (0).

use image::{DynamicImage, GrayImage, Luma};

use super::types::{PreprocessingError, ThresholdedImageResult};

/// Manual threshold historically passed alongside Otsu mode.
///
/// Otsu's method recomputes the level from the histogram, so this value never
/// influences the mask. It is kept to document that behavior.
pub const IGNORED_MANUAL_THRESHOLD: u8 = 120;

/// Value written for foreground pixels in the binary mask.
pub const FOREGROUND: u8 = 255;

/// BT.601 luma weights in 14-bit fixed point (R, G, B), summing to `1 << 14`.
const BT601_WEIGHTS: [u32; 3] = [4899, 9617, 1868];

/// Converts to grayscale with BT.601 luma weights (0.299, 0.587, 0.114).
///
/// Uses the same 14-bit fixed-point rounding as common computer vision libraries,
/// so gray inputs map to themselves exactly.
pub fn to_grayscale_bt601(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = r as u32 * BT601_WEIGHTS[0]
            + g as u32 * BT601_WEIGHTS[1]
            + b as u32 * BT601_WEIGHTS[2];
        Luma([((luma + (1 << 13)) >> 14) as u8])
    })
}

/// Applies inverted binary thresholding with an Otsu-selected level.
///
/// The input is converted to grayscale first ([`to_grayscale_bt601`]). The returned
/// mask holds 255 where the grayscale intensity is `<= threshold` and 0 elsewhere.
///
/// # Examples
///
/// ```no_run
/// use rice_inspector::preprocessing::apply_inverted_otsu_threshold;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let img = image::open("grains.jpg")?;
/// let thresholded = apply_inverted_otsu_threshold(&img)?;
/// println!("Otsu threshold: {}", thresholded.threshold);
/// # Ok(())
/// # }
/// ```
pub fn apply_inverted_otsu_threshold(
    image: &DynamicImage,
) -> Result<ThresholdedImageResult, PreprocessingError> {
    let start_time = std::time::Instant::now();

    let gray = to_grayscale_bt601(image);
    if gray.width() == 0 || gray.height() == 0 {
        return Err(PreprocessingError::EmptyImage {
            width: gray.width(),
            height: gray.height(),
        });
    }

    let histogram = grayscale_histogram(&gray);
    let total_pixels = (gray.width() as f64) * (gray.height() as f64);
    let threshold = find_otsu_threshold(&histogram, total_pixels)?;

    let mut foreground_pixels = 0u64;
    let mask = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] <= threshold {
            foreground_pixels += 1;
            Luma([FOREGROUND])
        } else {
            Luma([0])
        }
    });

    let processing_time = start_time.elapsed();

    tracing::debug!(
        target: "grain_preprocessing",
        "Inverted Otsu thresholding completed in {:.2}ms: threshold={}, foreground={}, dimensions={}x{}",
        processing_time.as_millis(),
        threshold,
        foreground_pixels,
        gray.width(),
        gray.height()
    );

    Ok(ThresholdedImageResult {
        mask,
        threshold,
        foreground_pixels,
        processing_time_ms: processing_time.as_millis() as u32,
    })
}

/// Builds the 256-bin intensity histogram of a grayscale image.
pub fn grayscale_histogram(gray: &GrayImage) -> [u32; 256] {
    let mut histogram = [0u32; 256];
    for pixel in gray.pixels() {
        histogram[pixel[0] as usize] += 1;
    }
    histogram
}

/// Finds the Otsu threshold by maximizing between-class variance.
///
/// Class 0 holds intensities `<= t`, class 1 the rest. The first level reaching the
/// maximum variance wins. When no level splits the histogram into two non-empty
/// classes (a uniform image) the threshold is 0.
pub fn find_otsu_threshold(
    histogram: &[u32; 256],
    total_pixels: f64,
) -> Result<u8, PreprocessingError> {
    if total_pixels <= 0.0 {
        return Err(PreprocessingError::ProcessingFailed {
            message: "histogram is empty".to_string(),
        });
    }

    let mut cumulative_sums = [0f64; 256];
    let mut cumulative_weighted_sums = [0f64; 256];
    let mut cumulative_sum = 0f64;
    let mut cumulative_weighted_sum = 0f64;

    for (i, &count) in histogram.iter().enumerate() {
        let pixel_count = count as f64;
        cumulative_sum += pixel_count;
        cumulative_weighted_sum += (i as f64) * pixel_count;

        cumulative_sums[i] = cumulative_sum;
        cumulative_weighted_sums[i] = cumulative_weighted_sum;
    }

    let total_weighted_sum = cumulative_weighted_sums[255];
    let mut max_variance = 0f64;
    let mut optimal_threshold = 0u8;

    for threshold in 0..256usize {
        let w0 = cumulative_sums[threshold] / total_pixels;
        let w1 = 1.0 - w0;

        if w0 < f64::EPSILON || w1 < f64::EPSILON {
            continue;
        }

        let mu0 = cumulative_weighted_sums[threshold] / cumulative_sums[threshold];
        let mu1 = (total_weighted_sum - cumulative_weighted_sums[threshold])
            / (total_pixels - cumulative_sums[threshold]);

        let variance = w0 * w1 * (mu0 - mu1).powi(2);

        if variance > max_variance {
            max_variance = variance;
            optimal_threshold = threshold as u8;
        }
    }

    Ok(optimal_threshold)
}
