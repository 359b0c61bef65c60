//! # Grain Classifier
//!
//! Segments rice grains in a photograph, measures each one and marks it as broken or
//! intact on an annotated copy of the image.
//!
//! The pipeline is:
//!
//! 1. decode the stored upload
//! 2. grayscale + inverted Otsu threshold ([`crate::preprocessing`])
//! 3. external contours ([`crate::contours`])
//! 4. drop contours whose area does not exceed the noise floor
//! 5. label each remaining grain by its bounding box and draw the box
//! 6. encode the annotated image as a new JPEG in the media root

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::config::ClassifierConfig;
use crate::contours::{find_external_contours, BoundingBox};
use crate::errors::{error_logging, AppError, AppResult};
use crate::preprocessing::apply_inverted_otsu_threshold;
use crate::storage::MediaStore;

/// Box colour for broken grains
pub const BROKEN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Box colour for intact grains
pub const INTACT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Verdict for a single grain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GrainLabel {
    Broken,
    Intact,
}

impl GrainLabel {
    /// Label a grain from its bounding box.
    ///
    /// A grain is broken when either side is strictly shorter than `max_side`.
    pub fn for_box(bbox: &BoundingBox, max_side: u32) -> Self {
        if bbox.width < max_side || bbox.height < max_side {
            GrainLabel::Broken
        } else {
            GrainLabel::Intact
        }
    }

    pub fn color(self) -> Rgb<u8> {
        match self {
            GrainLabel::Broken => BROKEN_COLOR,
            GrainLabel::Intact => INTACT_COLOR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GrainLabel::Broken => "broken",
            GrainLabel::Intact => "intact",
        }
    }
}

/// One detected grain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrainBox {
    pub bbox: BoundingBox,
    pub area: f64,
    pub label: GrainLabel,
}

/// Result of annotating an in-memory image
#[derive(Debug, Clone)]
pub struct Annotation {
    /// Copy of the input with grain boxes drawn on it
    pub image: RgbImage,
    /// Otsu level used for the mask
    pub threshold: u8,
    /// Grains that passed the area filter
    pub grains: Vec<GrainBox>,
}

/// Result of classifying a stored image
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    /// Name of the annotated JPEG inside the media root
    pub output_filename: String,
    pub threshold: u8,
    pub grains: Vec<GrainBox>,
}

impl ClassificationReport {
    pub fn broken_count(&self) -> usize {
        self.count(GrainLabel::Broken)
    }

    pub fn intact_count(&self) -> usize {
        self.count(GrainLabel::Intact)
    }

    fn count(&self, label: GrainLabel) -> usize {
        self.grains.iter().filter(|g| g.label == label).count()
    }
}

/// Classifies grains and writes annotated results into the media store.
#[derive(Debug, Clone)]
pub struct GrainClassifier {
    config: ClassifierConfig,
    store: MediaStore,
}

impl GrainClassifier {
    pub fn new(config: ClassifierConfig, store: MediaStore) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify the image stored at `image_path` and write the annotated copy.
    ///
    /// Fails with [`AppError::Load`] when the file cannot be read or decoded and with
    /// [`AppError::Storage`] when the output cannot be written. The input file is
    /// never modified.
    #[instrument(skip_all, fields(image_path = %image_path.display()))]
    pub fn classify(&self, image_path: &Path) -> AppResult<ClassificationReport> {
        let start = Instant::now();

        let image = load_image(image_path).inspect_err(|e| {
            error_logging::log_classification_error(
                e,
                "load_image",
                Some(&image_path.to_string_lossy()),
                Some(start.elapsed()),
            );
        })?;

        let annotation = self.annotate(&image)?;

        self.store.ensure_root()?;
        let output_filename = MediaStore::output_filename();
        let output_path = self.store.path_for(&output_filename);
        write_jpeg(&annotation.image, &output_path, self.config.jpeg_quality)?;

        let report = ClassificationReport {
            output_filename,
            threshold: annotation.threshold,
            grains: annotation.grains,
        };

        info!(
            output = %report.output_filename,
            threshold = report.threshold,
            broken = report.broken_count(),
            intact = report.intact_count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Grain classification completed"
        );

        Ok(report)
    }

    /// Detect, label and draw grains on a decoded image.
    pub fn annotate(&self, image: &DynamicImage) -> AppResult<Annotation> {
        let thresholded = apply_inverted_otsu_threshold(image)?;
        let contours = find_external_contours(&thresholded.mask);
        let found = contours.len();

        let grains: Vec<GrainBox> = contours
            .into_iter()
            .filter(|c| c.area > self.config.min_contour_area)
            .map(|c| GrainBox {
                bbox: c.bbox,
                area: c.area,
                label: GrainLabel::for_box(&c.bbox, self.config.broken_max_side),
            })
            .collect();

        debug!(
            threshold = thresholded.threshold,
            contours = found,
            grains = grains.len(),
            "Grain contours filtered"
        );

        let mut canvas = image.to_rgb8();
        for grain in &grains {
            draw_grain_box(
                &mut canvas,
                &grain.bbox,
                grain.label.color(),
                self.config.box_thickness,
            );
        }

        Ok(Annotation {
            image: canvas,
            threshold: thresholded.threshold,
            grains,
        })
    }
}

/// Decode an image file, sniffing the format from its content.
pub fn load_image(path: &Path) -> AppResult<DynamicImage> {
    ImageReader::open(path)
        .map_err(|e| AppError::load(path, e))?
        .with_guessed_format()
        .map_err(|e| AppError::load(path, e))?
        .decode()
        .map_err(|e| AppError::load(path, e))
}

/// Draw the outline of a grain box.
///
/// The outline covers the corners `(x, y)` and `(x + width, y + height)` inclusive and
/// grows inward by one pixel per unit of thickness.
pub fn draw_grain_box(canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    let outer_w = bbox.width + 1;
    let outer_h = bbox.height + 1;

    for inset in 0..thickness {
        let w = outer_w.saturating_sub(2 * inset);
        let h = outer_h.saturating_sub(2 * inset);
        if w == 0 || h == 0 {
            break;
        }

        let rect = Rect::at((bbox.x + inset) as i32, (bbox.y + inset) as i32).of_size(w, h);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

fn write_jpeg(image: &RgbImage, path: &Path, quality: u8) -> AppResult<()> {
    let storage_error = |e: &dyn std::fmt::Display| {
        error_logging::log_filesystem_error(
            &e.to_string(),
            "write_annotated_image",
            Some(&path.to_string_lossy()),
            None,
        );
        AppError::Storage(format!(
            "Could not write annotated image {}: {}",
            path.display(),
            e
        ))
    };

    let file = File::create(path).map_err(|e| storage_error(&e))?;
    let mut writer = BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(&mut writer, quality);
    image
        .write_with_encoder(encoder)
        .map_err(|e| storage_error(&e))?;
    writer.flush().map_err(|e| storage_error(&e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKGROUND: Rgb<u8> = Rgb([210, 205, 200]);
    const GRAIN: Rgb<u8> = Rgb([40, 35, 30]);

    fn scene(blobs: &[(u32, u32, u32, u32)]) -> DynamicImage {
        let img = RgbImage::from_fn(200, 150, |x, y| {
            let inside = blobs
                .iter()
                .any(|&(bx, by, bw, bh)| x >= bx && x < bx + bw && y >= by && y < by + bh);
            if inside {
                GRAIN
            } else {
                BACKGROUND
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    fn classifier() -> GrainClassifier {
        GrainClassifier::new(ClassifierConfig::default(), MediaStore::new("unused"))
    }

    #[test]
    fn test_label_boundaries() {
        let bbox = |width, height| BoundingBox {
            x: 0,
            y: 0,
            width,
            height,
        };
        assert_eq!(GrainLabel::for_box(&bbox(30, 30), 30), GrainLabel::Intact);
        assert_eq!(GrainLabel::for_box(&bbox(29, 80), 30), GrainLabel::Broken);
        assert_eq!(GrainLabel::for_box(&bbox(80, 29), 30), GrainLabel::Broken);
    }

    #[test]
    fn test_large_grain_is_intact_and_boxed_green() {
        let annotation = classifier()
            .annotate(&scene(&[(40, 40, 50, 50)]))
            .expect("annotation should succeed");

        assert_eq!(annotation.grains.len(), 1);
        let grain = &annotation.grains[0];
        assert_eq!(grain.label, GrainLabel::Intact);
        assert_eq!(
            grain.bbox,
            BoundingBox {
                x: 40,
                y: 40,
                width: 50,
                height: 50
            }
        );

        // Outer edge, inner edge of the 2px outline and the far corner
        assert_eq!(*annotation.image.get_pixel(40, 65), INTACT_COLOR);
        assert_eq!(*annotation.image.get_pixel(41, 65), INTACT_COLOR);
        assert_eq!(*annotation.image.get_pixel(90, 90), INTACT_COLOR);
        assert_eq!(*annotation.image.get_pixel(65, 65), GRAIN);
    }

    #[test]
    fn test_small_grain_is_broken_and_boxed_red() {
        let annotation = classifier()
            .annotate(&scene(&[(20, 20, 15, 40)]))
            .expect("annotation should succeed");

        assert_eq!(annotation.grains.len(), 1);
        assert_eq!(annotation.grains[0].label, GrainLabel::Broken);
        assert_eq!(*annotation.image.get_pixel(20, 30), BROKEN_COLOR);
    }

    #[test]
    fn test_specks_are_filtered_out() {
        // 8x8 speck has polygon area 49, well below the noise floor
        let annotation = classifier()
            .annotate(&scene(&[(40, 40, 50, 50), (150, 20, 8, 8)]))
            .expect("annotation should succeed");

        assert_eq!(annotation.grains.len(), 1);
        assert_eq!(*annotation.image.get_pixel(150, 24), GRAIN);
    }

    #[test]
    fn test_blank_image_has_no_grains() {
        let annotation = classifier()
            .annotate(&scene(&[]))
            .expect("annotation should succeed");

        assert!(annotation.grains.is_empty());
        assert_eq!(annotation.threshold, 0);
    }

    #[test]
    fn test_box_thickness_follows_config() {
        let mut config = ClassifierConfig::default();
        config.box_thickness = 1;
        let classifier = GrainClassifier::new(config, MediaStore::new("unused"));

        let annotation = classifier
            .annotate(&scene(&[(40, 40, 50, 50)]))
            .expect("annotation should succeed");

        assert_eq!(*annotation.image.get_pixel(40, 65), INTACT_COLOR);
        assert_eq!(*annotation.image.get_pixel(41, 65), GRAIN);
    }

    #[test]
    fn test_classify_missing_file_is_load_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let classifier =
            GrainClassifier::new(ClassifierConfig::default(), MediaStore::new(dir.path()));

        let err = classifier
            .classify(&dir.path().join("nope.png"))
            .expect_err("missing file must fail");
        assert!(matches!(err, AppError::Load { .. }));
    }
}
