//! Detector output decoding, measurements, annotation and enhancement filters.

mod common;

use common::*;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::contrast::{ThresholdType, threshold};
use rten_tensor::prelude::*;
use tumorscan::detection::filters;
use tumorscan::detection::postprocessing::{decode_output, nms};
use tumorscan::detection::preprocessing::{Letterbox, denoise, to_model_input};
use tumorscan::detection::steps::Enhancement;
use tumorscan::measure::{self, Annotator};
use tumorscan::{Measurement, Pipeline};

fn scored(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: u32) -> BoundingBox {
    BoundingBox {
        x1,
        y1,
        x2,
        y2,
        confidence,
        class_id,
    }
}

#[test]
fn test_measurements_follow_detector_order() {
    let boxes = vec![
        BoundingBox::new(10.0, 20.0, 60.0, 30.0),
        BoundingBox::new(0.0, 0.0, 5.0, 40.0),
        BoundingBox::new(7.0, 7.0, 7.0, 9.0),
    ];

    assert_eq!(measure::lengths(&boxes), vec![50.0, 5.0, 0.0]);
    assert_eq!(
        measure::extract(&boxes)[0],
        Measurement {
            length: 50.0,
            width: 10.0,
            area: 500.0
        }
    );
    // Degenerate boxes are kept
    assert_eq!(measure::extract(&boxes).len(), 3);
}

#[test]
fn test_nms_keeps_best_of_overlapping_boxes() {
    let kept = nms(
        vec![
            scored(0.0, 0.0, 100.0, 100.0, 0.6, 0),
            scored(5.0, 5.0, 105.0, 105.0, 0.9, 0),
            scored(300.0, 300.0, 350.0, 350.0, 0.5, 0),
            // Same place, other class
            scored(0.0, 0.0, 100.0, 100.0, 0.4, 1),
        ],
        0.45,
    );

    assert_eq!(kept.len(), 3);
    assert!(kept.iter().any(|b| b.confidence == 0.9));
    assert!(!kept.iter().any(|b| b.confidence == 0.6));
    assert!(kept.iter().any(|b| b.class_id == 1));
}

#[test]
fn test_decode_output_unmaps_letterbox() -> anyhow::Result<()> {
    // Two candidates, one class: [cx, cy, w, h, score] per column
    let num_boxes = 2;
    #[rustfmt::skip]
    let output = vec![
        320.0, 100.0, // cx
        320.0, 100.0, // cy
        64.0, 10.0,   // w
        32.0, 10.0,   // h
        0.8, 0.1,     // class 0
    ];
    // 1280x640 image scaled by 0.5 into 640, padded 160 vertically
    let letterbox = Letterbox {
        scale: 0.5,
        pad_x: 0.0,
        pad_y: 160.0,
    };

    let boxes = decode_output(&output, [1, 5, num_boxes], 0.25, 0.45, letterbox, 1280, 640)?;
    assert_eq!(boxes.len(), 1);
    let b = boxes[0];
    assert_eq!((b.x1, b.x2), (576.0, 704.0));
    assert_eq!((b.y1, b.y2), (288.0, 352.0));
    assert_eq!(b.confidence, 0.8);

    assert!(decode_output(&output, [2, 5, 1], 0.25, 0.45, letterbox, 1280, 640).is_err());
    assert!(decode_output(&output, [1, 4, 2], 0.25, 0.45, letterbox, 1280, 640).is_err());

    Ok(())
}

#[test]
fn test_model_input_is_square_and_normalized() {
    let img = create_test_image(200, 100);
    let (tensor, letterbox) = to_model_input(&img, 64);

    assert_eq!(tensor.shape(), [1, 3, 64, 64]);
    assert_eq!(letterbox.scale, 64.0 / 200.0);
    assert_eq!(letterbox.pad_x, 0.0);
    assert_eq!(letterbox.pad_y, 16.0);
    assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn test_denoise_keeps_dimensions() {
    let img = create_test_image(31, 17);
    let out = denoise(&img);
    assert_eq!((out.width(), out.height()), (31, 17));
}

#[test]
fn test_annotator_draws_boxes_only_inside_image() {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 40, Rgb([0, 0, 0])));
    let annotated = Annotator::boxes_only().annotate(
        &img,
        &[
            BoundingBox::new(5.0, 5.0, 20.0, 20.0),
            // Hangs off the edge, clamped
            BoundingBox::new(30.0, 30.0, 90.0, 90.0),
            // Zero width, skipped
            BoundingBox::new(10.0, 10.0, 10.0, 30.0),
        ],
    );

    assert_eq!(annotated.dimensions(), (40, 40));
    assert_eq!(annotated.get_pixel(5, 10).0, [0, 255, 0]);
    assert_eq!(annotated.get_pixel(6, 10).0, [0, 255, 0]);
    assert_eq!(annotated.get_pixel(12, 12).0, [0, 0, 0]);
    assert_eq!(annotated.get_pixel(30, 35).0, [0, 255, 0]);
    assert!(!Annotator::boxes_only().has_font());
}

#[test]
fn test_missing_font_file_is_an_error() {
    assert!(Annotator::from_font_file("/definitely/not/here.ttf").is_err());
}

#[test]
fn test_threshold_filters_are_binary() {
    let gray = GrayImage::from_fn(32, 32, |x, _| Luma([(x * 8) as u8]));

    let fixed = filters::binary_threshold(&gray, 127);
    assert_eq!(fixed.get_pixel(15, 0).0, [0]);
    assert_eq!(fixed.get_pixel(16, 0).0, [255]);
    assert_eq!(fixed, threshold(&gray, 127, ThresholdType::Binary));

    let adaptive = filters::adaptive_threshold(&gray, 5, 2);
    assert!(adaptive.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
}

#[test]
fn test_adaptive_threshold_compares_against_local_mean() {
    // Flat 100 field with one bright and one dark pixel
    let mut gray = GrayImage::from_pixel(20, 20, Luma([100]));
    gray.put_pixel(10, 10, Luma([200]));
    gray.put_pixel(3, 3, Luma([50]));

    let out = filters::adaptive_threshold(&gray, 2, 2);
    assert_eq!(out.dimensions(), (20, 20));
    // Flat pixels sit above mean - offset
    assert_eq!(out.get_pixel(0, 0).0, [255]);
    assert_eq!(out.get_pixel(19, 19).0, [255]);
    assert_eq!(out.get_pixel(10, 10).0, [255]);
    assert_eq!(out.get_pixel(3, 3).0, [0]);
    // 5x5 window holding the bright pixel has mean 104, so 100 > 102 fails
    assert_eq!(out.get_pixel(11, 11).0, [0]);

    // Negative offset raises the bar above a flat field
    let strict = filters::adaptive_threshold(&GrayImage::from_pixel(8, 8, Luma([90])), 3, -1);
    assert!(strict.pixels().all(|p| p.0[0] == 0));

    let empty = filters::adaptive_threshold(&GrayImage::new(0, 0), 5, 2);
    assert_eq!(empty.dimensions(), (0, 0));
}

#[test]
fn test_clahe_stretches_low_contrast() {
    let gray = GrayImage::from_fn(64, 64, |x, y| Luma([100 + ((x + y) % 8) as u8]));
    let out = filters::clahe(&gray, 2.0, 8);

    let range = |img: &GrayImage| {
        let min = img.pixels().map(|p| p.0[0]).min().unwrap();
        let max = img.pixels().map(|p| p.0[0]).max().unwrap();
        max - min
    };
    assert_eq!(out.dimensions(), (64, 64));
    assert!(range(&out) > range(&gray));
}

#[test]
fn test_contours_outline_bright_square() {
    // Grey background below the threshold
    let mut gray = GrayImage::from_pixel(40, 40, Luma([100]));
    for y in 10..30 {
        for x in 10..30 {
            gray.put_pixel(x, y, Luma([255]));
        }
    }
    let outlined = filters::draw_outer_contours(
        &DynamicImage::ImageLuma8(gray),
        127,
        Rgb([0, 255, 0]),
    );
    assert_eq!(outlined.get_pixel(10, 20).0, [0, 255, 0]);
    // Drawn on black, not over the scan
    assert_eq!(outlined.get_pixel(0, 0).0, [0, 0, 0]);
    assert_eq!(outlined.get_pixel(2, 2).0, [0, 0, 0]);
    assert_eq!(outlined.get_pixel(20, 20).0, [0, 0, 0]);
}

#[test]
fn test_pipeline_runs_every_enhancement() -> anyhow::Result<()> {
    let img = create_test_image(48, 48);
    let mut pipeline = Pipeline::new();
    for filter in [
        Enhancement::Denoise,
        Enhancement::Clahe,
        Enhancement::Threshold,
        Enhancement::Canny,
        Enhancement::Contours,
    ] {
        pipeline = pipeline.add_step(filter.step());
    }
    assert_eq!(
        pipeline.step_names(),
        vec![
            "Denoise",
            "CLAHE Enhancement",
            "Adaptive Thresholding",
            "Canny Edge Detection",
            "Contour Detection"
        ]
    );

    let each = pipeline.run_each(img.clone())?;
    assert_eq!(each.len(), 5);
    assert!(each.iter().all(|(_, out)| out.width() == 48 && out.height() == 48));

    let chained = pipeline.run(img)?;
    assert_eq!(chained.image.width(), 48);
    assert_eq!(chained.original.width(), 48);

    Ok(())
}

#[test]
fn test_pipeline_debug_output() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let debug_dir = dir.path().join("debug");
    let pipeline = Pipeline::new()
        .with_debug(debug_dir.clone())?
        .add_step(Enhancement::Canny.step());

    pipeline.run(create_test_image(16, 16))?;
    assert!(debug_dir.join("00_input").join("01.png").exists());
    assert!(debug_dir.join("01_canny_edge_detection").join("01.png").exists());

    // A non-empty directory is refused
    assert!(Pipeline::new().with_debug(debug_dir).is_err());

    Ok(())
}
