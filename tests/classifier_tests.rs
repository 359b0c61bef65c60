//! # Classifier Tests
//!
//! Runs the full classification pipeline against synthetic grain photographs on disk
//! and checks the annotated JPEG written to the media root.


use rice_inspector::classifier::{GrainClassifier, GrainLabel};
use rice_inspector::config::ClassifierConfig;
use rice_inspector::errors::AppError;
use rice_inspector::storage::MediaStore;
use test_helpers::*;

fn classifier_in(dir: &std::path::Path) -> (GrainClassifier, MediaStore) {
    let store = MediaStore::new(dir.join("media"));
    (
        GrainClassifier::new(ClassifierConfig::default(), store.clone()),
        store,
    )
}

#[test]
fn test_single_large_grain_is_intact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (classifier, store) = classifier_in(dir.path());
    let input = write_fixture(dir.path(), "grain.png", &encode_png(&single_grain_scene()));

    let report = classifier.classify(&input).expect("classification should succeed");

    assert_eq!(report.intact_count(), 1);
    assert_eq!(report.broken_count(), 0);
    assert!(report.output_filename.ends_with(".jpg"));

    let output = image::open(store.path_for(&report.output_filename))
        .expect("annotated output should decode")
        .to_rgb8();
    assert_eq!(output.dimensions(), (160, 140));
    // Left edge of the box around the grain at x=40
    assert!(green_dominance(&output, 39..=42, 65) > 60);
    assert!(red_dominance(&output, 39..=42, 65) < 40);
}

#[test]
fn test_narrow_grain_is_broken() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (classifier, store) = classifier_in(dir.path());
    let scene = grain_scene(160, 140, &[(40, 40, 20, 60)]);
    let input = write_fixture(dir.path(), "broken.png", &encode_png(&scene));

    let report = classifier.classify(&input).expect("classification should succeed");

    assert_eq!(report.broken_count(), 1);
    assert_eq!(report.intact_count(), 0);
    assert_eq!(report.grains[0].label, GrainLabel::Broken);
    assert_eq!(report.grains[0].bbox.width, 20);
    assert_eq!(report.grains[0].bbox.height, 60);

    let output = image::open(store.path_for(&report.output_filename))
        .expect("annotated output should decode")
        .to_rgb8();
    assert!(red_dominance(&output, 39..=42, 70) > 60);
}

#[test]
fn test_mixed_grains_are_labelled_as_a_set() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (classifier, _) = classifier_in(dir.path());
    let scene = grain_scene(
        240,
        160,
        &[(10, 10, 50, 40), (100, 20, 12, 45), (150, 90, 60, 35), (20, 110, 25, 25)],
    );
    let input = write_fixture(dir.path(), "mixed.png", &encode_png(&scene));

    let report = classifier.classify(&input).expect("classification should succeed");

    let mut labels: Vec<&str> = report.grains.iter().map(|g| g.label.as_str()).collect();
    labels.sort_unstable();
    assert_eq!(labels, vec!["broken", "broken", "intact", "intact"]);
}

#[test]
fn test_grains_flush_against_each_edge_are_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (classifier, store) = classifier_in(dir.path());
    let scene = grain_scene(
        200,
        160,
        &[(0, 20, 40, 50), (70, 0, 50, 40), (160, 90, 40, 50), (70, 120, 50, 40)],
    );
    let input = write_fixture(dir.path(), "edges.png", &encode_png(&scene));

    let report = classifier.classify(&input).expect("classification should succeed");

    assert_eq!(report.intact_count(), 4);
    let mut boxes: Vec<(u32, u32, u32, u32)> = report
        .grains
        .iter()
        .map(|g| (g.bbox.x, g.bbox.y, g.bbox.width, g.bbox.height))
        .collect();
    boxes.sort_unstable();
    assert_eq!(
        boxes,
        vec![
            (0, 20, 40, 50),
            (70, 0, 50, 40),
            (70, 120, 50, 40),
            (160, 90, 40, 50)
        ]
    );

    // The box of the grain on the left edge starts in column 0
    let output = image::open(store.path_for(&report.output_filename))
        .expect("annotated output should decode")
        .to_rgb8();
    assert!(green_dominance(&output, 0..=2, 45) > 60);
}

#[test]
fn test_only_specks_yield_no_boxes_but_an_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (classifier, store) = classifier_in(dir.path());
    // 10x10 specks have polygon area 81, below the noise floor
    let scene = grain_scene(120, 90, &[(10, 10, 10, 10), (60, 40, 10, 10)]);
    let input = write_fixture(dir.path(), "specks.png", &encode_png(&scene));

    let report = classifier.classify(&input).expect("classification should succeed");

    assert!(report.grains.is_empty());
    let output = image::open(store.path_for(&report.output_filename))
        .expect("annotated output should decode");
    assert_eq!((output.width(), output.height()), (120, 90));
}

#[test]
fn test_repeated_runs_are_deterministic_with_distinct_names() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (classifier, store) = classifier_in(dir.path());
    let input = write_fixture(dir.path(), "grain.png", &encode_png(&single_grain_scene()));

    let first = classifier.classify(&input).expect("first run");
    let second = classifier.classify(&input).expect("second run");

    assert_ne!(first.output_filename, second.output_filename);
    assert_eq!(first.grains, second.grains);

    let a = image::open(store.path_for(&first.output_filename))
        .expect("first output")
        .to_rgb8();
    let b = image::open(store.path_for(&second.output_filename))
        .expect("second output")
        .to_rgb8();
    assert_eq!(a.as_raw(), b.as_raw());
}

#[test]
fn test_input_file_is_not_modified() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (classifier, _) = classifier_in(dir.path());
    let bytes = encode_png(&single_grain_scene());
    let input = write_fixture(dir.path(), "grain.png", &bytes);

    classifier.classify(&input).expect("classification should succeed");

    assert_eq!(std::fs::read(&input).expect("input still present"), bytes);
}

#[test]
fn test_jpeg_input_is_classified() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (classifier, _) = classifier_in(dir.path());
    let input = write_fixture(
        dir.path(),
        "grain.jpg",
        &encode_jpeg(&single_grain_scene(), 100),
    );

    let report = classifier.classify(&input).expect("classification should succeed");

    assert_eq!(report.intact_count(), 1);
    let bbox = report.grains[0].bbox;
    assert!((39..=41).contains(&bbox.x));
    assert!((49..=52).contains(&bbox.width));
}

#[test]
fn test_non_image_is_a_load_error_naming_the_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (classifier, store) = classifier_in(dir.path());
    let input = write_fixture(dir.path(), "notes.png", b"definitely not pixels");

    let err = classifier
        .classify(&input)
        .expect_err("text file must not classify");

    match &err {
        AppError::Load { path, .. } => assert_eq!(path, &input),
        other => panic!("expected a load error, got {:?}", other),
    }
    assert!(err.to_string().contains(&input.display().to_string()));
    // Nothing is written for a failed run
    assert!(list_files(store.root()).is_empty());
}
