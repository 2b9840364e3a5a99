//! Subspace (Fisherfaces-style) face recognizer.
//!
//! Consumes an already-trained linear subspace: a mean face, a `d × k`
//! projection basis, and the labelled projections of the training set.
//! Faces are matched by nearest neighbour in the projected space.
//!
//! Accepted projections are appended to a plain-text log, one
//! `label,[v0, v1, ...]` line each. [`ProjectionLog`] reads that log back as a
//! second, "previously seen" predictor.

use image::{imageops, GrayImage, Rgb, RgbImage};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Face crop size fed to the model.
pub const FACE_WIDTH: u32 = 92;
pub const FACE_HEIGHT: u32 = 112;

/// Predictions further than this are shown as unknown.
const UNKNOWN_DISTANCE: f64 = 1000.0;
/// Predictions closer than this are appended to the projection log.
const RECORD_DISTANCE: f64 = 800.0;
/// A log entry within this distance is a match.
const LOG_MATCH_DISTANCE: f64 = 600.0;
const LOG_MAX_PER_LABEL: usize = 16;
const LOG_MAX_ENTRIES: usize = 51;
/// Number of components written by [`FaceRecognizer::dump`].
const DUMP_MAX_COMPONENTS: usize = 16;

const UNKNOWN_NAME: &str = "Unknown";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("invalid model: {0}")]
    InvalidModel(String),
    #[error("sample has {actual} pixels, model expects {expected}")]
    SampleSize { expected: usize, actual: usize },
    #[error("projection has {actual} components, expected {expected}")]
    ProjectionSize { expected: usize, actual: usize },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("model json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> RecognizerError + '_ {
    move |source| RecognizerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Serialized form of a trained subspace model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubspaceModel {
    /// Height of the training images; `mean.len() / image_height` is the width.
    pub image_height: u32,
    pub mean: Vec<f64>,
    /// `d` rows of `k` components each.
    pub eigenvectors: Vec<Vec<f64>>,
    pub eigenvalues: Vec<f64>,
    pub projections: Vec<Vec<f64>>,
    pub labels: Vec<i32>,
    #[serde(default)]
    pub names: BTreeMap<i32, String>,
}

/// Nearest-neighbour result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// `None` when the model has no training projections.
    pub label: Option<i32>,
    pub distance: f64,
}

impl Prediction {
    /// Whether this projection is close enough to be logged.
    pub fn should_record(&self) -> bool {
        self.label.is_some() && self.distance < RECORD_DISTANCE
    }
}

pub struct FaceRecognizer {
    model: SubspaceModel,
    mean: Array1<f64>,
    basis: Array2<f64>,
    training: Vec<(i32, Array1<f64>)>,
}

impl FaceRecognizer {
    /// Load a model saved as JSON.
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }
        let text = std::fs::read_to_string(model_path).map_err(io_err(model_path))?;
        let model: SubspaceModel = serde_json::from_str(&text)?;
        let recognizer = Self::from_model(model)?;

        tracing::info!(
            path = %model_path.display(),
            dim = recognizer.dimension(),
            components = recognizer.components(),
            samples = recognizer.training.len(),
            "loaded subspace model"
        );
        Ok(recognizer)
    }

    /// Validate shapes and build the matrices.
    pub fn from_model(model: SubspaceModel) -> Result<Self, RecognizerError> {
        let d = model.mean.len();
        if d == 0 {
            return Err(RecognizerError::InvalidModel("empty mean".into()));
        }
        if model.image_height == 0 || d % model.image_height as usize != 0 {
            return Err(RecognizerError::InvalidModel(format!(
                "mean length {d} is not a multiple of image height {}",
                model.image_height
            )));
        }
        if model.eigenvectors.len() != d {
            return Err(RecognizerError::InvalidModel(format!(
                "eigenvectors have {} rows, mean has {d}",
                model.eigenvectors.len()
            )));
        }
        let k = model.eigenvectors[0].len();
        if k == 0 || model.eigenvectors.iter().any(|row| row.len() != k) {
            return Err(RecognizerError::InvalidModel(
                "eigenvector rows must share a non-zero length".into(),
            ));
        }
        if model.projections.len() != model.labels.len() {
            return Err(RecognizerError::InvalidModel(format!(
                "{} projections but {} labels",
                model.projections.len(),
                model.labels.len()
            )));
        }
        if let Some(bad) = model.projections.iter().find(|p| p.len() != k) {
            return Err(RecognizerError::ProjectionSize {
                expected: k,
                actual: bad.len(),
            });
        }

        let flat: Vec<f64> = model.eigenvectors.iter().flatten().copied().collect();
        let basis = Array2::from_shape_vec((d, k), flat)
            .map_err(|e| RecognizerError::InvalidModel(e.to_string()))?;
        let mean = Array1::from(model.mean.clone());
        let training = model
            .labels
            .iter()
            .zip(&model.projections)
            .map(|(&label, p)| (label, Array1::from(p.clone())))
            .collect();

        Ok(Self {
            model,
            mean,
            basis,
            training,
        })
    }

    /// Pixels per sample.
    pub fn dimension(&self) -> usize {
        self.basis.nrows()
    }

    /// Length of a projection.
    pub fn components(&self) -> usize {
        self.basis.ncols()
    }

    pub fn model(&self) -> &SubspaceModel {
        &self.model
    }

    /// `(sample - mean) · W`.
    pub fn project(&self, sample: &[u8]) -> Result<Array1<f64>, RecognizerError> {
        if sample.len() != self.dimension() {
            return Err(RecognizerError::SampleSize {
                expected: self.dimension(),
                actual: sample.len(),
            });
        }
        let centered = sample.iter().map(|&p| p as f64).collect::<Array1<f64>>() - &self.mean;
        Ok(centered.dot(&self.basis))
    }

    /// Nearest training projection to `sample`.
    pub fn predict(&self, sample: &[u8]) -> Result<(Prediction, Array1<f64>), RecognizerError> {
        let projection = self.project(sample)?;
        let prediction = self
            .training
            .iter()
            .map(|(label, p)| (*label, l2_distance(p.view(), projection.view())))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map_or(
                Prediction {
                    label: None,
                    distance: f64::INFINITY,
                },
                |(label, distance)| Prediction {
                    label: Some(label),
                    distance,
                },
            );
        Ok((prediction, projection))
    }

    /// Name to draw for a prediction.
    pub fn display_name(&self, prediction: &Prediction) -> &str {
        if prediction.distance > UNKNOWN_DISTANCE {
            return UNKNOWN_NAME;
        }
        prediction
            .label
            .and_then(|label| self.model.names.get(&label))
            .map_or(UNKNOWN_NAME, String::as_str)
    }

    /// Write `eigenValue.txt`, one `fisherface_<i>.png` per leading
    /// component, and `model.json` into `dir`.
    pub fn dump(&self, dir: &Path) -> Result<(), RecognizerError> {
        std::fs::create_dir_all(dir).map_err(io_err(dir))?;
        let shown = self.components().min(DUMP_MAX_COMPONENTS);

        let mut text = String::new();
        for value in self.model.eigenvalues.iter().take(shown) {
            text.push_str(&format!("eigenValue:\n{value}\n"));
        }
        let path = dir.join("eigenValue.txt");
        std::fs::write(&path, text).map_err(io_err(&path))?;

        let height = self.model.image_height;
        let width = (self.dimension() / height as usize) as u32;
        for i in 0..shown {
            let pixels = normalize_to_u8(self.basis.column(i));
            let gray = GrayImage::from_raw(width, height, pixels).ok_or_else(|| {
                RecognizerError::InvalidModel(format!("component {i} does not fit {width}x{height}"))
            })?;
            let img = RgbImage::from_fn(width, height, |x, y| bone(gray.get_pixel(x, y)[0]));
            img.save(dir.join(format!("fisherface_{i}.png")))?;
        }

        let path = dir.join("model.json");
        let json = serde_json::to_string_pretty(&self.model)?;
        std::fs::write(&path, json).map_err(io_err(&path))?;

        tracing::info!(dir = %dir.display(), components = shown, "dumped model");
        Ok(())
    }
}

/// Resize a grayscale face crop to the model's `FACE_WIDTH × FACE_HEIGHT`.
pub fn prepare_face(gray: &[u8], width: u32, height: u32) -> Result<Vec<u8>, RecognizerError> {
    let expected = width as usize * height as usize;
    let img = GrayImage::from_raw(width, height, gray.to_vec())
        .filter(|_| expected > 0)
        .ok_or(RecognizerError::SampleSize {
            expected,
            actual: gray.len(),
        })?;
    Ok(imageops::resize(&img, FACE_WIDTH, FACE_HEIGHT, imageops::FilterType::CatmullRom).into_raw())
}

fn l2_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Min-max stretch to `0..=255`. A flat vector maps to zeros.
fn normalize_to_u8(values: ArrayView1<f64>) -> Vec<u8> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    values
        .iter()
        .map(|&v| {
            if range > 0.0 {
                ((v - min) / range * 255.0).round() as u8
            } else {
                0
            }
        })
        .collect()
}

/// Bone colour map: seven parts gray to one part reversed "hot", so dark
/// values lean blue and bright values approach white.
fn bone(value: u8) -> Rgb<u8> {
    let x = value as f64 / 255.0;
    let hot_r = (x / 0.375).min(1.0);
    let hot_g = ((x - 0.375) / 0.375).clamp(0.0, 1.0);
    let hot_b = ((x - 0.75) / 0.25).clamp(0.0, 1.0);
    let mix = |hot: f64| ((7.0 * x + hot) / 8.0 * 255.0).round() as u8;
    Rgb([mix(hot_b), mix(hot_g), mix(hot_r)])
}

/// One log line: `label,[v0, v1, ...]`.
pub fn format_projection_line(label: i32, projection: &[f64]) -> String {
    let values: Vec<String> = projection.iter().map(|v| v.to_string()).collect();
    format!("{label},[{}]", values.join(", "))
}

/// Append one projection to the log at `path`, creating it if needed.
pub fn append_projection(path: &Path, label: i32, projection: &[f64]) -> Result<(), RecognizerError> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err(path))?;
    writeln!(file, "{}", format_projection_line(label, projection)).map_err(io_err(path))
}

/// Parse a log line; `None` if it is malformed.
fn parse_projection_line(line: &str) -> Option<(i32, Vec<f64>)> {
    let (label, rest) = line.trim().split_once(',')?;
    let label = label.trim().parse::<i32>().ok()?;
    let inner = rest.trim().strip_prefix('[')?.strip_suffix(']')?;
    let values = inner
        .split(',')
        .map(|v| v.trim().parse::<f64>().ok())
        .collect::<Option<Vec<f64>>>()?;
    Some((label, values))
}

/// Previously logged projections, used as a secondary predictor.
#[derive(Debug, Default)]
pub struct ProjectionLog {
    entries: Vec<(i32, Array1<f64>)>,
}

impl ProjectionLog {
    /// Parse log text, keeping entries with `dim` components.
    ///
    /// Malformed lines are skipped. At most 16 entries are kept per label
    /// and 51 overall; reading stops once the overall cap is reached.
    pub fn parse(text: &str, dim: usize) -> Self {
        let mut per_label: HashMap<i32, usize> = HashMap::new();
        let mut entries = Vec::new();
        let mut skipped = 0usize;

        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let Some((label, values)) = parse_projection_line(line).filter(|(_, v)| v.len() == dim)
            else {
                skipped += 1;
                continue;
            };

            let seen = per_label.entry(label).or_insert(0);
            *seen += 1;
            if *seen > LOG_MAX_PER_LABEL {
                continue;
            }
            if entries.len() == LOG_MAX_ENTRIES {
                break;
            }
            entries.push((label, Array1::from(values)));
        }

        if skipped > 0 {
            tracing::debug!(skipped, "ignored malformed projection log lines");
        }
        Self { entries }
    }

    /// Read the log at `path`. A missing file is an empty log.
    pub fn load(path: &Path, dim: usize) -> Result<Self, RecognizerError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no projection log yet");
                return Ok(Self::default());
            }
            Err(e) => return Err(io_err(path)(e)),
        };
        let log = Self::parse(&text, dim);
        tracing::info!(path = %path.display(), entries = log.len(), "loaded projection log");
        Ok(log)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First logged entry (in file order) within the match distance.
    pub fn predict(&self, projection: &Array1<f64>) -> Option<(i32, f64)> {
        self.entries.iter().find_map(|(label, p)| {
            let distance = l2_distance(p.view(), projection.view());
            (distance < LOG_MATCH_DISTANCE).then_some((*label, distance))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// 2x2 images, basis picks out the first two pixels.
    fn tiny_model() -> SubspaceModel {
        SubspaceModel {
            image_height: 2,
            mean: vec![1.0, 1.0, 1.0, 1.0],
            eigenvectors: vec![
                vec![1.0, 0.0],
                vec![0.0, 1.0],
                vec![0.0, 0.0],
                vec![0.0, 0.0],
            ],
            eigenvalues: vec![3.5, 1.25],
            projections: vec![vec![0.0, 0.0], vec![100.0, 100.0]],
            labels: vec![0, 1],
            names: BTreeMap::from([(1, "alice".to_string())]),
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lcdlab-{name}-{}", std::process::id()))
    }

    #[test]
    fn test_project() {
        let rec = FaceRecognizer::from_model(tiny_model()).unwrap();
        assert_eq!(rec.project(&[3, 5, 1, 1]).unwrap(), array![2.0, 4.0]);
    }

    #[test]
    fn test_project_rejects_wrong_size() {
        let rec = FaceRecognizer::from_model(tiny_model()).unwrap();
        assert!(matches!(
            rec.project(&[1, 2, 3]),
            Err(RecognizerError::SampleSize { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn test_predict_nearest() {
        let rec = FaceRecognizer::from_model(tiny_model()).unwrap();
        let (pred, projection) = rec.predict(&[91, 91, 0, 0]).unwrap();
        assert_eq!(projection, array![90.0, 90.0]);
        assert_eq!(pred.label, Some(1));
        assert!((pred.distance - 200f64.sqrt()).abs() < 1e-9);
        assert!(pred.should_record());
        assert_eq!(rec.display_name(&pred), "alice");
    }

    #[test]
    fn test_display_name_unknown() {
        let rec = FaceRecognizer::from_model(tiny_model()).unwrap();
        // Label 0 has no name.
        let unnamed = Prediction { label: Some(0), distance: 10.0 };
        assert_eq!(rec.display_name(&unnamed), "Unknown");
        let far = Prediction { label: Some(1), distance: 1000.5 };
        assert_eq!(rec.display_name(&far), "Unknown");
        assert!(!far.should_record());
    }

    #[test]
    fn test_predict_without_training_data() {
        let mut model = tiny_model();
        model.projections.clear();
        model.labels.clear();
        let rec = FaceRecognizer::from_model(model).unwrap();
        let (pred, _) = rec.predict(&[0, 0, 0, 0]).unwrap();
        assert_eq!(pred.label, None);
        assert!(!pred.should_record());
        assert_eq!(rec.display_name(&pred), "Unknown");
    }

    #[test]
    fn test_from_model_validates_shapes() {
        let mut model = tiny_model();
        model.eigenvectors.pop();
        assert!(matches!(
            FaceRecognizer::from_model(model),
            Err(RecognizerError::InvalidModel(_))
        ));

        let mut model = tiny_model();
        model.labels.pop();
        assert!(FaceRecognizer::from_model(model).is_err());

        let mut model = tiny_model();
        model.projections[0].push(1.0);
        assert!(matches!(
            FaceRecognizer::from_model(model),
            Err(RecognizerError::ProjectionSize { expected: 2, actual: 3 })
        ));

        let mut model = tiny_model();
        model.image_height = 3;
        assert!(FaceRecognizer::from_model(model).is_err());
    }

    #[test]
    fn test_load_missing_model() {
        assert!(matches!(
            FaceRecognizer::load(Path::new("/nonexistent/model.json")),
            Err(RecognizerError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_format_and_parse_line() {
        let line = format_projection_line(3, &[1.5, -2.0, 0.25]);
        assert_eq!(line, "3,[1.5, -2, 0.25]");
        assert_eq!(parse_projection_line(&line), Some((3, vec![1.5, -2.0, 0.25])));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(parse_projection_line("x,[1, 2]"), None);
        assert_eq!(parse_projection_line("1,1, 2"), None);
        assert_eq!(parse_projection_line("1,[1, two]"), None);
        assert_eq!(parse_projection_line("no comma"), None);
    }

    #[test]
    fn test_log_ignores_malformed_and_wrong_dimension() {
        let text = "0,[1, 2]\ngarbage\n1,[1, 2, 3]\n\n2,[5, 6]\n";
        let log = ProjectionLog::parse(text, 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_log_caps_per_label() {
        let text: String = (0..20).map(|_| "7,[0, 0]\n").collect();
        let log = ProjectionLog::parse(&text, 2);
        assert_eq!(log.len(), 16);
    }

    #[test]
    fn test_log_caps_total() {
        let text: String = (0..100).map(|i| format!("{i},[0, 0]\n")).collect();
        let log = ProjectionLog::parse(&text, 2);
        assert_eq!(log.len(), 51);
    }

    #[test]
    fn test_log_predicts_first_match_in_file_order() {
        // Both entries are within range; the first one wins even though
        // the second is closer.
        let log = ProjectionLog::parse("4,[500, 0]\n9,[1, 0]\n", 2);
        let (label, distance) = log.predict(&array![0.0, 0.0]).unwrap();
        assert_eq!(label, 4);
        assert!((distance - 500.0).abs() < 1e-9);

        assert_eq!(log.predict(&array![5000.0, 5000.0]), None);
    }

    #[test]
    fn test_append_then_load() {
        let path = temp_path("projections.txt");
        let _ = std::fs::remove_file(&path);
        append_projection(&path, 2, &[10.0, 20.0]).unwrap();
        append_projection(&path, 3, &[30.0, 40.0]).unwrap();

        let log = ProjectionLog::load(&path, 2).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.predict(&array![30.0, 41.0]).map(|(l, _)| l), Some(3));
    }

    #[test]
    fn test_load_missing_log_is_empty() {
        let log = ProjectionLog::load(Path::new("/nonexistent/faceProjection.txt"), 2).unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn test_dump_writes_artifacts() {
        let dir = temp_path("dump");
        let _ = std::fs::remove_dir_all(&dir);
        let rec = FaceRecognizer::from_model(tiny_model()).unwrap();
        rec.dump(&dir).unwrap();

        let eigen = std::fs::read_to_string(dir.join("eigenValue.txt")).unwrap();
        assert_eq!(eigen, "eigenValue:\n3.5\neigenValue:\n1.25\n");

        let face = image::open(dir.join("fisherface_0.png")).unwrap().to_rgb8();
        assert_eq!(face.dimensions(), (2, 2));
        assert_eq!(face.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(face.get_pixel(1, 0).0, [0, 0, 0]);
        assert_eq!(face.get_pixel(1, 1).0, [0, 0, 0]);
        assert!(dir.join("fisherface_1.png").exists());

        let reloaded = FaceRecognizer::load(&dir.join("model.json")).unwrap();
        assert_eq!(reloaded.components(), 2);
        assert_eq!(reloaded.model().names.get(&1).map(String::as_str), Some("alice"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_bone_map_tints_midtones_blue() {
        assert_eq!(bone(0).0, [0, 0, 0]);
        assert_eq!(bone(255).0, [255, 255, 255]);
        let [r, g, b] = bone(128).0;
        assert!(b > g && g > r, "midtone {r},{g},{b}");
    }

    #[test]
    fn test_prepare_face_size() {
        let face = prepare_face(&vec![128; 40 * 50], 40, 50).unwrap();
        assert_eq!(face.len(), (FACE_WIDTH * FACE_HEIGHT) as usize);
        assert!(face.iter().all(|&p| (127..=129).contains(&p)));
        assert!(prepare_face(&[1, 2, 3], 2, 2).is_err());
    }
}
