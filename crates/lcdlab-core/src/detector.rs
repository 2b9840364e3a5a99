//! YOLOv5 object detector via ONNX Runtime.
//!
//! Expects a standard YOLOv5 export: one `[1, 3, 640, 640]` RGB input in
//! `0..1`, and one `[1, N, 5 + classes]` output whose rows are
//! `[cx, cy, w, h, objectness, class scores...]` in input-tensor pixels.

use crate::types::{BoundingBox, Detection};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const YOLO_INPUT_SIZE: usize = 640;
const YOLO_CONFIDENCE_THRESHOLD: f32 = 0.4;
const YOLO_SCORE_THRESHOLD: f32 = 0.2;
const YOLO_NMS_THRESHOLD: f32 = 0.4;
/// Box geometry plus objectness, ahead of the per-class scores.
const YOLO_ROW_PREFIX: usize = 5;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("failed to read class list {path}: {source}")]
    ClassList {
        path: String,
        source: std::io::Error,
    },
    #[error("class list {0} is empty")]
    NoClasses(String),
    #[error("invalid input frame: expected {expected} bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Read one class name per line. Blank lines are skipped.
pub fn load_class_list(path: &Path) -> Result<Vec<String>, DetectorError> {
    let text = std::fs::read_to_string(path).map_err(|source| DetectorError::ClassList {
        path: path.display().to_string(),
        source,
    })?;
    let classes: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    if classes.is_empty() {
        return Err(DetectorError::NoClasses(path.display().to_string()));
    }
    Ok(classes)
}

/// YOLOv5-based object detector.
pub struct ObjectDetector {
    session: Session,
    class_names: Vec<String>,
}

impl ObjectDetector {
    /// Load the ONNX model at `model_path` with the given class names.
    pub fn load(model_path: &Path, class_names: Vec<String>) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }
        if class_names.is_empty() {
            return Err(DetectorError::NoClasses(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            classes = class_names.len(),
            inputs = ?session.inputs().iter().map(|i| i.name().to_string()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name().to_string()).collect::<Vec<_>>(),
            "loaded YOLO model"
        );

        Ok(Self {
            session,
            class_names,
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Name for a detection's class, or `"?"` for an out-of-range id.
    pub fn class_name(&self, class_id: usize) -> &str {
        self.class_names.get(class_id).map_or("?", String::as_str)
    }

    /// Detect objects in a packed BGR frame. Boxes are in frame pixels,
    /// sorted by confidence.
    pub fn detect(
        &mut self,
        bgr: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, DetectorError> {
        let (width, height) = (width as usize, height as usize);
        let expected = width * height * 3;
        if bgr.len() != expected || expected == 0 {
            return Err(DetectorError::InvalidFrame {
                expected,
                actual: bgr.len(),
            });
        }

        let (input, factor) = preprocess(bgr, width, height);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, rows) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("output tensor: {e}")))?;

        let row_len = YOLO_ROW_PREFIX + self.class_names.len();
        if rows.len() % row_len != 0 {
            return Err(DetectorError::InferenceFailed(format!(
                "output length {} is not a multiple of row length {row_len}",
                rows.len()
            )));
        }

        let candidates = decode_rows(
            rows,
            self.class_names.len(),
            factor,
            YOLO_CONFIDENCE_THRESHOLD,
            YOLO_SCORE_THRESHOLD,
        );
        let result = nms(candidates, YOLO_NMS_THRESHOLD);
        tracing::debug!(count = result.len(), "detections after NMS");
        Ok(result)
    }
}

/// Pad the frame to a square anchored top-left, resize to the network
/// input, and pack RGB in `0..1` as NCHW. Returns the tensor and the
/// factor mapping network pixels back to frame pixels.
fn preprocess(bgr: &[u8], width: usize, height: usize) -> (Array4<f32>, f32) {
    let side = width.max(height);
    let factor = side as f32 / YOLO_INPUT_SIZE as f32;

    // Padded pixels read as black.
    let sample = |x: usize, y: usize, c: usize| -> f32 {
        if x < width && y < height {
            bgr[(y * width + x) * 3 + c] as f32
        } else {
            0.0
        }
    };

    let mut tensor = Array4::<f32>::zeros((1, 3, YOLO_INPUT_SIZE, YOLO_INPUT_SIZE));

    for y in 0..YOLO_INPUT_SIZE {
        let src_y = (y as f32 + 0.5) * factor - 0.5;
        let y0 = (src_y.floor() as i64).clamp(0, side as i64 - 1) as usize;
        let y1 = (y0 + 1).min(side - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..YOLO_INPUT_SIZE {
            let src_x = (x as f32 + 0.5) * factor - 0.5;
            let x0 = (src_x.floor() as i64).clamp(0, side as i64 - 1) as usize;
            let x1 = (x0 + 1).min(side - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            // BGR source channel 2-c lands in RGB plane c.
            for c in 0..3 {
                let src_c = 2 - c;
                let val = sample(x0, y0, src_c) * (1.0 - fx) * (1.0 - fy)
                    + sample(x1, y0, src_c) * fx * (1.0 - fy)
                    + sample(x0, y1, src_c) * (1.0 - fx) * fy
                    + sample(x1, y1, src_c) * fx * fy;
                tensor[[0, c, y, x]] = val / 255.0;
            }
        }
    }

    (tensor, factor)
}

/// Turn raw output rows into candidate detections.
///
/// A row survives when its objectness is at least `confidence_threshold`
/// and its best class score exceeds `score_threshold`.
fn decode_rows(
    rows: &[f32],
    num_classes: usize,
    factor: f32,
    confidence_threshold: f32,
    score_threshold: f32,
) -> Vec<Detection> {
    let row_len = YOLO_ROW_PREFIX + num_classes;
    let mut detections = Vec::new();

    for row in rows.chunks_exact(row_len) {
        let confidence = row[4];
        if confidence < confidence_threshold {
            continue;
        }

        let Some((class_id, &score)) = row[YOLO_ROW_PREFIX..]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        else {
            continue;
        };
        if score <= score_threshold {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        detections.push(Detection {
            class_id,
            confidence,
            bbox: BoundingBox {
                x: (cx - 0.5 * w) * factor,
                y: (cy - 0.5 * h) * factor,
                width: w * factor,
                height: h * factor,
            },
        });
    }

    detections
}

/// Non-Maximum Suppression across all classes.
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| k.bbox.iou(&det.bbox) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cx: f32, cy: f32, w: f32, h: f32, obj: f32, classes: &[f32]) -> Vec<f32> {
        let mut r = vec![cx, cy, w, h, obj];
        r.extend_from_slice(classes);
        r
    }

    fn det(x: f32, y: f32, w: f32, h: f32, conf: f32) -> Detection {
        Detection {
            class_id: 0,
            confidence: conf,
            bbox: BoundingBox {
                x,
                y,
                width: w,
                height: h,
            },
        }
    }

    #[test]
    fn test_decode_scales_by_factor() {
        let rows = row(100.0, 50.0, 20.0, 10.0, 0.9, &[0.1, 0.8]);
        let dets = decode_rows(&rows, 2, 2.0, 0.4, 0.2);
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert_eq!(d.class_id, 1);
        assert!((d.confidence - 0.9).abs() < 1e-6);
        assert_eq!(
            d.bbox,
            BoundingBox {
                x: 180.0,
                y: 90.0,
                width: 40.0,
                height: 20.0
            }
        );
    }

    #[test]
    fn test_decode_filters_low_objectness() {
        let rows = row(10.0, 10.0, 5.0, 5.0, 0.39, &[0.9, 0.0]);
        assert!(decode_rows(&rows, 2, 1.0, 0.4, 0.2).is_empty());
    }

    #[test]
    fn test_decode_filters_low_class_score() {
        let mut rows = row(10.0, 10.0, 5.0, 5.0, 0.9, &[0.2, 0.1]);
        rows.extend(row(30.0, 30.0, 5.0, 5.0, 0.9, &[0.05, 0.25]));
        let dets = decode_rows(&rows, 2, 1.0, 0.4, 0.2);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
    }

    #[test]
    fn test_nms_suppresses_overlap() {
        let dets = vec![
            det(0.0, 0.0, 100.0, 100.0, 0.9),
            det(5.0, 5.0, 100.0, 100.0, 0.8),
            det(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let result = nms(dets, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_best_first() {
        let dets = vec![
            det(0.0, 0.0, 10.0, 10.0, 0.5),
            det(0.0, 0.0, 10.0, 10.0, 0.95),
        ];
        let result = nms(dets, 0.4);
        assert_eq!(result.len(), 1);
        assert!((result[0].confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_pads_top_left() {
        // 640x320 white frame: top half of the tensor is white, bottom is padding.
        let (w, h) = (640, 320);
        let bgr = vec![255u8; w * h * 3];
        let (tensor, factor) = preprocess(&bgr, w, h);
        assert!((factor - 1.0).abs() < 1e-6);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert!((tensor[[0, 0, 10, 10]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 2, 600, 10]].abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_swaps_to_rgb() {
        // Pure blue in BGR ends up in the last (B) plane of an RGB tensor.
        let (w, h) = (4, 4);
        let bgr: Vec<u8> = std::iter::repeat([255u8, 0, 0]).take(w * h).flatten().collect();
        let (tensor, factor) = preprocess(&bgr, w, h);
        assert!((factor - 4.0 / 640.0).abs() < 1e-6);
        assert!(tensor[[0, 0, 100, 100]].abs() < 1e-6);
        assert!((tensor[[0, 2, 100, 100]] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_load_missing_model() {
        let err = ObjectDetector::load(Path::new("/nonexistent/model.onnx"), vec!["a".into()]);
        assert!(matches!(err, Err(DetectorError::ModelNotFound(_))));
    }

    #[test]
    fn test_load_class_list() {
        let path = std::env::temp_dir().join(format!("lcdlab-classes-{}.txt", std::process::id()));
        std::fs::write(&path, "with_mask\r\nwithout_mask\n\n").unwrap();
        let classes = load_class_list(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(classes, vec!["with_mask", "without_mask"]);
    }

    #[test]
    fn test_load_empty_class_list() {
        let path = std::env::temp_dir().join(format!("lcdlab-noclasses-{}.txt", std::process::id()));
        std::fs::write(&path, "\n").unwrap();
        let result = load_class_list(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(DetectorError::NoClasses(_))));
    }
}
