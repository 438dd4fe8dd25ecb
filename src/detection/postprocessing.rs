use std::collections::HashMap;

use anyhow::Result;

use crate::detection::preprocessing::Letterbox;
use crate::models::BoundingBox;

/// Per-class non-maximum suppression. Keeps the highest-confidence box of
/// every overlapping group.
pub fn nms(detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    if detections.is_empty() {
        return detections;
    }

    let mut class_groups: HashMap<u32, Vec<BoundingBox>> = HashMap::new();
    for detection in detections {
        class_groups
            .entry(detection.class_id)
            .or_default()
            .push(detection);
    }

    let mut all_results = Vec::new();

    for (_, mut class_detections) in class_groups {
        class_detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut suppressed = vec![false; class_detections.len()];
        for i in 0..class_detections.len() {
            if suppressed[i] {
                continue;
            }
            all_results.push(class_detections[i]);

            for j in (i + 1)..class_detections.len() {
                if !suppressed[j] && class_detections[i].iou(&class_detections[j]) > iou_threshold {
                    suppressed[j] = true;
                }
            }
        }
    }

    all_results
}

/// Decode a YOLO-style `[1, 4 + classes, boxes]` output into image-space boxes.
///
/// Boxes are centre/size encoded in model input pixels. Results are sorted by
/// descending confidence and clamped to the image.
pub fn decode_output(
    output: &[f32],
    shape: [usize; 3],
    confidence_threshold: f32,
    iou_threshold: f32,
    letterbox: Letterbox,
    img_width: u32,
    img_height: u32,
) -> Result<Vec<BoundingBox>> {
    let [batch, channels, num_boxes] = shape;
    if batch != 1 {
        anyhow::bail!("Expected a batch of 1, got {}", batch);
    }
    if channels < 5 {
        anyhow::bail!("Expected at least 5 output channels, got {}", channels);
    }
    if output.len() != channels * num_boxes {
        anyhow::bail!(
            "Output length {} does not match shape {:?}",
            output.len(),
            shape
        );
    }

    let at = |c: usize, i: usize| output[c * num_boxes + i];
    let num_classes = channels - 4;
    let mut detections = Vec::new();

    for i in 0..num_boxes {
        let mut best_confidence = 0.0f32;
        let mut best_class = 0u32;
        for class_idx in 0..num_classes {
            let confidence = at(4 + class_idx, i);
            if confidence > best_confidence {
                best_confidence = confidence;
                best_class = class_idx as u32;
            }
        }
        if best_confidence <= confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
        let (x1, y1) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);

        detections.push(BoundingBox {
            x1: x1.clamp(0.0, img_width as f32),
            y1: y1.clamp(0.0, img_height as f32),
            x2: x2.clamp(0.0, img_width as f32),
            y2: y2.clamp(0.0, img_height as f32),
            confidence: best_confidence,
            class_id: best_class,
        });
    }

    let mut kept = nms(detections, iou_threshold);
    kept.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    Ok(kept)
}
