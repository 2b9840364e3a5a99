//! One-shot demos on a still image: panel info, show, mask detection.

use crate::display;
use crate::live::detection_caption;
use anyhow::{Context, Result};
use lcdlab_core::overlay::{self, LabelFont};
use lcdlab_core::ObjectDetector;
use lcdlab_fb::Placement;
use lcdlab_hw::{Camera, Frame};
use std::path::Path;

/// Print the panel geometry and the capture devices present.
pub fn info(device: &str) -> Result<()> {
    let fb = display::open_panel(device)?;
    let geometry = fb.geometry();
    println!("device:          {}", fb.path());
    println!("bits per pixel:  {}", geometry.bits_per_pixel);
    println!("xres_virtual:    {}", geometry.xres_virtual);
    println!("yres_virtual:    {}", geometry.yres_virtual);
    println!("row stride:      {} bytes", geometry.row_stride());
    println!("format:          {:?}", fb.format()?);

    for camera in Camera::list_devices() {
        println!("camera:          {} ({}, {})", camera.path, camera.name, camera.driver);
    }
    Ok(())
}

fn load(image: &Path) -> Result<Frame> {
    Frame::load(image).with_context(|| format!("cannot read image {}", image.display()))
}

/// Show an image once, centred unless a fixed offset is given.
pub fn show(device: &str, image: &Path, x_offset: Option<i64>) -> Result<()> {
    let mut fb = display::open_panel(device)?;
    let frame = load(image)?;
    let placement = x_offset.map_or(Placement::Centered, Placement::Fixed);

    let bytes = fb
        .present(&frame.data, frame.width, frame.height, placement)
        .with_context(|| format!("cannot show {}x{} image", frame.width, frame.height))?;
    tracing::info!(image = %image.display(), bytes, "image shown");
    Ok(())
}

/// Detect objects in one image, save the annotated copy, then show it at
/// the left edge of the panel.
pub fn mask(device: &str, image: &Path, mut detector: ObjectDetector, output: &Path) -> Result<()> {
    let font = LabelFont::embedded().context("cannot load label font")?;
    let mut frame = load(image)?;
    let detections = detector.detect(&frame.data, frame.width, frame.height)?;

    for det in &detections {
        tracing::info!(
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
            overlay::mask_class_color(det.class_id),
            2,
        );
        let (x, y, _, _) = det.bbox.to_rect();
        overlay::draw_label(
            &mut frame.data,
            frame.width,
            frame.height,
            &font,
            (x, y),
            &detection_caption(detector.class_name(det.class_id), det.confidence),
            overlay::BLACK,
            Some(overlay::WHITE),
        );
    }

    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    }
    frame
        .save(output)
        .with_context(|| format!("cannot write {}", output.display()))?;
    println!("{} detections, written to {}", detections.len(), output.display());

    let mut fb = display::open_panel(device)?;
    fb.present(&frame.data, frame.width, frame.height, Placement::Fixed(0))
        .context("cannot show annotated image")?;
    Ok(())
}
