use anyhow::Result;
use clap::{Parser, Subcommand};
use lcdlab_core::{load_class_list, FaceRecognizer, ObjectDetector};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod display;
mod live;
mod scroll;
mod still;

use config::Config;

#[derive(Parser)]
#[command(name = "lcdlab", about = "Camera, detection and recognition demos on a framebuffer LCD")]
struct Cli {
    /// Framebuffer device (overrides LCDLAB_FB_DEVICE)
    #[arg(long, global = true)]
    fb: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the framebuffer geometry
    Info,
    /// Show a still image, centred unless an offset is given
    Show {
        image: PathBuf,
        /// Fixed horizontal offset in pixels
        #[arg(long, allow_negative_numbers = true)]
        x_offset: Option<i64>,
    },
    /// Scroll an image endlessly across the panel (j/l: direction, q: quit)
    Scroll {
        image: PathBuf,
        /// Pixels per frame (overrides LCDLAB_SCROLL_STEP)
        #[arg(long)]
        step: Option<i64>,
        /// Delay between frames in milliseconds
        #[arg(long, default_value_t = 30)]
        interval_ms: u64,
    },
    /// Live camera view scaled to the panel height (c: snapshot, q: quit)
    Camera {
        #[command(flatten)]
        camera: CameraArgs,
    },
    /// Live camera view with YOLO detection boxes
    Detect {
        #[command(flatten)]
        camera: CameraArgs,
        #[command(flatten)]
        model: DetectorArgs,
    },
    /// Detect objects in one image, save the annotated copy and show it
    Mask {
        image: PathBuf,
        #[command(flatten)]
        model: DetectorArgs,
        /// Where to write the annotated image
        #[arg(long, default_value = "example/output.png")]
        output: PathBuf,
    },
    /// Live face recognition with projection logging
    Recognize {
        #[command(flatten)]
        camera: CameraArgs,
        #[command(flatten)]
        detector: DetectorArgs,
        /// Trained subspace model (JSON)
        #[arg(long)]
        recognizer: PathBuf,
        /// Output directory for the model dump and projection log
        /// (overrides LCDLAB_MODEL_DIR)
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct CameraArgs {
    /// Camera index, opened as /dev/video<N> (overrides LCDLAB_CAMERA_INDEX)
    #[arg(long)]
    camera: Option<u32>,
    /// Snapshot directory (overrides LCDLAB_SCREENSHOT_DIR)
    #[arg(long)]
    screenshot_dir: Option<PathBuf>,
    /// Record the displayed frames to a Motion-JPEG file
    #[arg(long)]
    record: Option<PathBuf>,
}

impl CameraArgs {
    fn apply(self, config: &mut Config) {
        if let Some(index) = self.camera {
            config.camera_index = index;
        }
        if let Some(dir) = self.screenshot_dir {
            config.screenshot_dir = dir;
        }
        if let Some(path) = self.record {
            config.record_path = Some(path);
        }
    }
}

#[derive(clap::Args)]
struct DetectorArgs {
    /// YOLOv5 ONNX model
    #[arg(long)]
    model: PathBuf,
    /// Class names, one per line
    #[arg(long)]
    classes: PathBuf,
}

impl DetectorArgs {
    fn load(&self) -> Result<ObjectDetector> {
        let classes = load_class_list(&self.classes)?;
        Ok(ObjectDetector::load(&self.model, classes)?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(fb) = cli.fb {
        config.fb_device = fb;
    }

    // Demo loops block on the camera and the framebuffer.
    tokio::task::spawn_blocking(move || run(cli.command, config)).await?
}

fn run(command: Commands, mut config: Config) -> Result<()> {
    match command {
        Commands::Info => still::info(&config.fb_device),
        Commands::Show { image, x_offset } => still::show(&config.fb_device, &image, x_offset),
        Commands::Scroll {
            image,
            step,
            interval_ms,
        } => scroll::run(
            &config.fb_device,
            &image,
            step.unwrap_or(config.scroll_step),
            Duration::from_millis(interval_ms),
        ),
        Commands::Camera { camera } => {
            camera.apply(&mut config);
            live::run(&config, live::Stage::Preview)
        }
        Commands::Detect { camera, model } => {
            camera.apply(&mut config);
            let detector = model.load()?;
            live::run(&config, live::Stage::Detect(detector))
        }
        Commands::Mask {
            image,
            model,
            output,
        } => {
            let detector = model.load()?;
            still::mask(&config.fb_device, &image, detector, &output)
        }
        Commands::Recognize {
            camera,
            detector,
            recognizer,
            log_dir,
        } => {
            camera.apply(&mut config);
            if let Some(dir) = log_dir {
                config.model_dir = dir;
            }
            let stage = live::FaceStage::new(
                detector.load()?,
                load_recognizer(&recognizer)?,
                &config,
            )?;
            live::run(&config, live::Stage::Recognize(Box::new(stage)))
        }
    }
}

fn load_recognizer(path: &Path) -> Result<FaceRecognizer> {
    Ok(FaceRecognizer::load(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_show_with_negative_offset() {
        let cli = Cli::try_parse_from(["lcdlab", "show", "a.png", "--x-offset", "-5"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Show { x_offset: Some(-5), .. }
        ));
    }

    #[test]
    fn test_parse_recognize() {
        let cli = Cli::try_parse_from([
            "lcdlab",
            "--fb",
            "/dev/fb1",
            "recognize",
            "--model",
            "face.onnx",
            "--classes",
            "face.txt",
            "--recognizer",
            "fisher.json",
            "--camera",
            "0",
        ])
        .unwrap();
        assert_eq!(cli.fb.as_deref(), Some("/dev/fb1"));
        match cli.command {
            Commands::Recognize {
                camera, recognizer, ..
            } => {
                assert_eq!(camera.camera, Some(0));
                assert_eq!(recognizer, PathBuf::from("fisher.json"));
            }
            _ => panic!("expected recognize"),
        }
    }

    #[test]
    fn test_record_flag_sets_config() {
        let cli = Cli::try_parse_from(["lcdlab", "camera", "--record", "out.mjpeg"]).unwrap();
        let Commands::Camera { camera } = cli.command else {
            panic!("expected camera");
        };
        let mut config = Config::from_env();
        camera.apply(&mut config);
        assert_eq!(config.record_path, Some(PathBuf::from("out.mjpeg")));
    }
}
