//! Live camera demos: plain preview, object detection, face recognition.

use crate::config::Config;
use crate::display::{self, Controls, Shown};
use anyhow::{bail, Context, Result};
use lcdlab_core::overlay::{self, LabelFont};
use lcdlab_core::recognizer::{self, FACE_HEIGHT, FACE_WIDTH};
use lcdlab_core::{FaceRecognizer, ObjectDetector, ProjectionLog};
use lcdlab_fb::Placement;
use lcdlab_hw::{Camera, Frame, FrameSlot, MjpegRecorder, SnapshotHandle, SnapshotSaver};
use std::path::PathBuf;

/// Per-frame processing applied before display.
pub enum Stage {
    Preview,
    Detect(ObjectDetector),
    Recognize(Box<FaceStage>),
}

impl Stage {
    fn process(&mut self, frame: &mut Frame, font: &LabelFont) -> Result<()> {
        match self {
            Stage::Preview => Ok(()),
            Stage::Detect(detector) => {
                let detections = detector.detect(&frame.data, frame.width, frame.height)?;
                for det in &detections {
                    tracing::debug!(
                        class = detector.class_name(det.class_id),
                        confidence = det.confidence,
                        bbox = ?det.bbox,
                        "detection"
                    );
                    overlay::draw_box(
                        &mut frame.data,
                        frame.width,
                        frame.height,
                        &det.bbox,
                        overlay::CYAN,
                        2,
                    );
                    let (x, y, _, _) = det.bbox.to_rect();
                    overlay::draw_label(
                        &mut frame.data,
                        frame.width,
                        frame.height,
                        font,
                        (x, y),
                        &detection_caption(detector.class_name(det.class_id), det.confidence),
                        overlay::BLACK,
                        Some(overlay::WHITE),
                    );
                }
                Ok(())
            }
            Stage::Recognize(stage) => stage.process(frame, font),
        }
    }
}

/// `"<class> <score>%"` caption for a detection.
pub fn detection_caption(class: &str, confidence: f32) -> String {
    format!("{class} {:.0}%", confidence * 100.0)
}

/// Face detection followed by subspace recognition.
pub struct FaceStage {
    detector: ObjectDetector,
    recognizer: FaceRecognizer,
    previous: ProjectionLog,
    log_path: PathBuf,
}

impl FaceStage {
    /// Dump the model into `config.model_dir` and load earlier projections.
    pub fn new(detector: ObjectDetector, recognizer: FaceRecognizer, config: &Config) -> Result<Self> {
        let expected = (FACE_WIDTH * FACE_HEIGHT) as usize;
        if recognizer.dimension() != expected {
            bail!(
                "recognizer expects {} pixels per face, crops are {FACE_WIDTH}x{FACE_HEIGHT} = {expected}",
                recognizer.dimension()
            );
        }

        recognizer
            .dump(&config.model_dir)
            .with_context(|| format!("failed to dump model into {}", config.model_dir.display()))?;

        let log_path = config.projection_log_path();
        let previous = ProjectionLog::load(&log_path, recognizer.components())?;

        Ok(Self {
            detector,
            recognizer,
            previous,
            log_path,
        })
    }

    fn process(&mut self, frame: &mut Frame, font: &LabelFont) -> Result<()> {
        let faces = self.detector.detect(&frame.data, frame.width, frame.height)?;

        for face in &faces {
            let (x, y, w, h) = face.bbox.to_rect();
            let crop = frame.crop(x.max(0) as u32, y.max(0) as u32, w.max(0) as u32, h.max(0) as u32);
            if crop.is_empty() {
                continue;
            }

            let sample = recognizer::prepare_face(&crop.to_gray(), crop.width, crop.height)?;
            let (prediction, projection) = self.recognizer.predict(&sample)?;
            let name = self.recognizer.display_name(&prediction);
            let seen_before = self.previous.predict(&projection);

            tracing::info!(
                name,
                label = ?prediction.label,
                distance = prediction.distance,
                seen_before = ?seen_before.map(|(label, _)| label),
                "face"
            );

            if let (true, Some(label)) = (prediction.should_record(), prediction.label) {
                recognizer::append_projection(&self.log_path, label, &projection.to_vec())?;
            }

            overlay::draw_box(
                &mut frame.data,
                frame.width,
                frame.height,
                &face.bbox,
                overlay::YELLOW,
                2,
            );
            overlay::draw_label(
                &mut frame.data,
                frame.width,
                frame.height,
                font,
                (x, y),
                &name,
                overlay::YELLOW,
                None,
            );
        }
        Ok(())
    }
}

/// Camera → stage → panel until the camera stops or the operator quits.
/// `c` saves the current frame into the screenshot directory.
pub fn run(config: &Config, mut stage: Stage) -> Result<()> {
    let font = LabelFont::embedded().context("cannot load label font")?;
    let mut fb = display::open_panel(&config.fb_device)?;
    let panel_height = fb.geometry().yres_virtual;

    let camera = Camera::open(&config.camera())
        .with_context(|| format!("cannot open camera {}", config.camera_index))?;
    let mut stream = camera.stream()?;

    let slot = FrameSlot::new();
    let saver = SnapshotSaver::new(&config.screenshot_dir)?;
    let snapshots = SnapshotHandle::spawn(slot.clone(), saver)?;
    let mut recorder = config
        .record_path
        .as_deref()
        .map(MjpegRecorder::create)
        .transpose()?;
    let mut controls = Controls::start()?;

    tracing::info!(
        camera = %camera.device_path,
        width = camera.width,
        height = camera.height,
        panel_height,
        "live view started (c: snapshot, q: quit)"
    );

    let mut shown = 0u64;
    let mut skipped = 0u64;
    loop {
        let requests = controls.poll();
        if requests.quit {
            tracing::info!("quit requested");
            break;
        }
        for _ in 0..requests.captures {
            if !snapshots.request() {
                tracing::warn!("snapshot queue full; request dropped");
            }
        }

        let mut frame = match stream.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::info!(error = %e, "camera stopped delivering frames");
                break;
            }
        };

        if let Err(e) = stage.process(&mut frame, &font) {
            tracing::warn!(error = %e, "frame processing failed");
        }

        let fitted = frame.fit_to_height(panel_height);
        if let Some(rec) = recorder.as_mut() {
            if let Err(e) = rec.write(&frame) {
                tracing::warn!(error = %e, "recording failed; recording stopped");
                recorder = None;
            }
        }
        slot.publish(frame);

        match display::present_or_skip(&mut fb, &fitted, Placement::Centered)? {
            Shown::Bytes(_) => shown += 1,
            Shown::Skipped => skipped += 1,
        }
    }

    drop(controls);
    snapshots.finish();
    if let Some(rec) = recorder {
        rec.finish()?;
    }
    tracing::info!(shown, skipped, "live view finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_caption_rounds_percent() {
        assert_eq!(detection_caption("person", 0.874), "person 87%");
        assert_eq!(detection_caption("cat", 1.0), "cat 100%");
    }
}
