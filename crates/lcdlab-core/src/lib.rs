//! lcdlab-core — Detection and recognition stages of the display demos.
//!
//! Uses a YOLOv5 ONNX export for object detection via ONNX Runtime, and a
//! pre-trained linear subspace (Fisherfaces) model for face recognition.

pub mod detector;
pub mod overlay;
pub mod recognizer;
pub mod types;

pub use detector::{load_class_list, DetectorError, ObjectDetector};
pub use recognizer::{FaceRecognizer, Prediction, ProjectionLog, RecognizerError};
pub use types::{BoundingBox, Detection};
