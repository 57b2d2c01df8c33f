use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;

use photobooth::booth::{Booth, BoothNotification, BoothOutputs};
use photobooth::camera::{self, Camera};
use photobooth::config::{self, Settings};
use photobooth::storage;
use photobooth::upload::{UploadClient, UploadJob, UploadPolicy};

/// Parse and validate countdown length (1-10 seconds)
fn parse_countdown(s: &str) -> Result<u32, String> {
    let seconds: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number of seconds", s))?;
    if !(1..=10).contains(&seconds) {
        return Err(format!(
            "Countdown must be between 1 and 10 seconds, got {}",
            seconds
        ));
    }
    Ok(seconds)
}

/// Parse and validate review duration (1-30 seconds)
fn parse_review(s: &str) -> Result<u32, String> {
    let seconds: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number of seconds", s))?;
    if !(1..=30).contains(&seconds) {
        return Err(format!(
            "Review duration must be between 1 and 30 seconds, got {}",
            seconds
        ));
    }
    Ok(seconds)
}

/// Parse and validate preview frame rate (5-30 fps)
fn parse_fps(s: &str) -> Result<u32, String> {
    let fps: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid frame rate", s))?;
    if !(5..=30).contains(&fps) {
        return Err(format!("Preview rate must be between 5 and 30 fps, got {}", fps));
    }
    Ok(fps)
}

/// photobooth: self-service photo kiosk
#[derive(Parser)]
#[command(name = "photobooth")]
#[command(version, about = "Self-service photo kiosk")]
#[command(long_about = "Runs a touch-style photo booth: live camera preview, a countdown \
    to each shot, a short review of the result, local storage and optional \
    background upload to a REST endpoint.")]
#[command(after_help = "EXAMPLES:
    # Run the booth with the default config
    photobooth run

    # Run without camera hardware
    photobooth run --synthetic-camera

    # Faster countdown, custom photo directory
    photobooth run --countdown 2 --photos-dir ./shots

    # Take a single photo and exit
    photobooth capture --output test.jpg

    # Re-upload a saved photo
    photobooth upload shots/photo_20240307_140509.jpg

    # Show the camera's configurable options
    photobooth list-configs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the booth until Ctrl+C
    #[command(after_help = "CONTROLS (while running):
    Enter   Take a photo
    q       Quit
    Ctrl+C  Quit")]
    Run {
        /// Use the synthetic camera instead of hardware
        #[arg(long)]
        synthetic_camera: bool,

        /// Countdown length in seconds (1-10)
        #[arg(long, short = 'n', value_parser = parse_countdown)]
        countdown: Option<u32>,

        /// Review duration in seconds (1-30)
        #[arg(long, value_parser = parse_review)]
        review: Option<u32>,

        /// Preview frame rate (5-30 fps)
        #[arg(long, value_parser = parse_fps)]
        fps: Option<u32>,

        /// Directory for locally saved photos
        #[arg(long)]
        photos_dir: Option<PathBuf>,

        /// Disable uploads even if the config enables them
        #[arg(long)]
        no_upload: bool,

        /// Custom config file path (default: ~/.config/photobooth/config.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Take a single photo and exit
    Capture {
        /// Use the synthetic camera instead of hardware
        #[arg(long)]
        synthetic_camera: bool,

        /// Write the photo to this exact path instead of the photos directory
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Custom config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Upload a photo file to the configured endpoint
    Upload {
        /// Path to the JPEG file to upload
        file: PathBuf,

        /// Override the upload URL from the config
        #[arg(long)]
        url: Option<String>,

        /// Custom config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// List the camera's configurable options
    ListConfigs {
        /// Use the synthetic camera instead of hardware
        #[arg(long)]
        synthetic_camera: bool,

        /// Custom config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

/// Display formatted startup status showing the active settings
fn print_startup_status(settings: &Settings) {
    let camera_kind = if settings.camera.use_synthetic {
        "synthetic".to_string()
    } else {
        format!("hardware (device {})", settings.camera.device)
    };
    let upload = if settings.upload.enabled && !settings.upload.url.is_empty() {
        settings.upload.url.clone()
    } else {
        "disabled".to_string()
    };
    let storage_line = if settings.storage.save_locally {
        settings.storage.photos_dir.display().to_string()
    } else {
        "disabled".to_string()
    };

    println!();
    println!("┌─────────────────────────────────────────────┐");
    println!("│            photobooth v{}                │", env!("CARGO_PKG_VERSION"));
    println!("├─────────────────────────────────────────────┤");
    println!("│  Camera:    {:<31}│", camera_kind);
    println!("│  Preview:   {:<31}│", format!("{} fps", settings.camera.preview_fps));
    println!("│  Countdown: {:<31}│", format!("{} s", settings.timing.countdown_seconds));
    println!("│  Review:    {:<31}│", format!("{} s", settings.timing.review_seconds));
    println!("│  Photos:    {:<31}│", storage_line);
    println!("│  Upload:    {:<31}│", upload);
    println!("├─────────────────────────────────────────────┤");
    println!("│  CONTROLS                                   │");
    println!("│    Enter   Take a photo                     │");
    println!("│    q       Quit                             │");
    println!("│    Ctrl+C  Quit                             │");
    println!("└─────────────────────────────────────────────┘");
    println!();
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings, String> {
    Settings::load(path.map(|p| p.as_path())).map_err(|e| e.to_string())
}

#[allow(clippy::too_many_arguments)]
fn run_booth(
    synthetic_camera: bool,
    countdown: Option<u32>,
    review: Option<u32>,
    fps: Option<u32>,
    photos_dir: Option<PathBuf>,
    no_upload: bool,
    config_path: Option<PathBuf>,
) -> Result<(), String> {
    // Merge settings: CLI args > config file > built-in defaults
    let mut settings = load_settings(config_path.as_ref())?;
    if synthetic_camera {
        settings.camera.use_synthetic = true;
    }
    if let Some(countdown) = countdown {
        settings.timing.countdown_seconds = countdown;
    }
    if let Some(review) = review {
        settings.timing.review_seconds = review;
    }
    if let Some(fps) = fps {
        settings.camera.preview_fps = fps;
    }
    if let Some(photos_dir) = photos_dir {
        settings.storage.photos_dir = photos_dir;
    }
    if no_upload {
        settings.upload.enabled = false;
    }

    if !settings.camera.use_synthetic {
        match camera::hardware::list_devices() {
            Ok(devices) if devices.is_empty() => {
                log::warn!("No camera devices found; captures will fail")
            }
            Ok(devices) => {
                for d in &devices {
                    log::info!("Camera {}: {}", d.index, d.name);
                }
            }
            Err(e) => log::warn!("Device query failed: {e}"),
        }
    }

    print_startup_status(&settings);

    let persist_path = config_path.clone().or_else(|| Some(config::default_path()));

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create async runtime: {}", e))?;

    rt.block_on(async {
        let camera = camera::create_camera(&settings);
        let (booth, handle, outputs) = Booth::start(settings, camera, persist_path);
        let BoothOutputs {
            mut notifications,
            mut frames,
        } = outputs;

        let ctrlc_handle = handle.clone();
        if let Err(e) = ctrlc::set_handler(move || ctrlc_handle.shutdown()) {
            eprintln!("Warning: Could not set up Ctrl+C handler: {}", e);
        }

        // Line input stands in for the touch screen's buttons
        let input_handle = handle.clone();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match line.trim() {
                    "q" | "quit" => {
                        input_handle.shutdown();
                        break;
                    }
                    _ => input_handle.request_capture(),
                }
            }
        });

        tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                report_notification(&notification);
            }
        });

        // Headless: consume routed frames so the booth keeps routing
        tokio::spawn(async move {
            while let Some(routed) = frames.recv().await {
                log::trace!(
                    "Preview frame {}x{} (blur: {})",
                    routed.frame.width,
                    routed.frame.height,
                    routed.blur
                );
            }
        });

        booth.run().await;
        Ok::<(), String>(())
    })
}

fn report_notification(notification: &BoothNotification) {
    match notification {
        BoothNotification::ScreenChanged(screen) => log::info!("Screen: {:?}", screen),
        BoothNotification::CountdownTick(0) => println!("Smile!"),
        BoothNotification::CountdownTick(n) => println!("{}...", n),
        BoothNotification::PhotoCaptured(image) => {
            println!("Photo captured ({} KB)", image.len() / 1024)
        }
        BoothNotification::CaptureFailed(message) => eprintln!("Capture failed: {}", message),
        BoothNotification::PhotoSaved(path) => println!("Saved to {}", path.display()),
        BoothNotification::SaveFailed(message) => eprintln!("Save failed: {}", message),
        BoothNotification::SettingsApplied(_) => log::info!("Settings applied"),
    }
}

fn run_capture(
    synthetic_camera: bool,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<(), String> {
    let mut settings = load_settings(config_path.as_ref())?;
    if synthetic_camera {
        settings.camera.use_synthetic = true;
    }

    let mut camera = camera::create_camera(&settings);
    if !camera.connect() {
        return Err("Failed to connect to camera".to_string());
    }

    let result = camera.capture_photo();
    camera.disconnect();

    let image = match (result.success, result.image) {
        (true, Some(image)) => image,
        _ => {
            return Err(format!(
                "Capture failed: {}",
                result.error.unwrap_or_else(|| "unknown error".to_string())
            ))
        }
    };

    let path = match output {
        Some(path) => {
            std::fs::write(&path, &image).map_err(|e| format!("Failed to write photo: {}", e))?;
            path
        }
        None => storage::save_photo(
            &settings.storage.photos_dir,
            &settings.storage.filename_pattern,
            &image,
        )
        .map_err(|e| format!("Failed to save photo: {}", e))?,
    };

    println!("Photo saved: {} ({} KB)", path.display(), image.len() / 1024);
    Ok(())
}

fn run_upload(
    file: PathBuf,
    url: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<(), String> {
    let settings = load_settings(config_path.as_ref())?;

    let mut policy = UploadPolicy::from(&settings.upload);
    if let Some(url) = url {
        policy.url = url;
    }
    if policy.url.is_empty() {
        return Err("No upload URL configured. Set [upload] url or pass --url.".to_string());
    }

    let image = std::fs::read(&file)
        .map_err(|e| format!("Failed to read '{}': {}", file.display(), e))?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "photo.jpg".to_string());

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create async runtime: {}", e))?;

    let outcome = rt.block_on(async {
        let client = UploadClient::new(policy).map_err(|e| e.to_string())?;
        let mut job = UploadJob::new(image.into(), filename);
        Ok::<_, String>(client.run_job(&mut job).await)
    })?;

    if outcome.success {
        println!(
            "Uploaded {} (HTTP {}, {:.1}s)",
            outcome.filename,
            outcome.status.unwrap_or(0),
            outcome.elapsed.as_secs_f64()
        );
        Ok(())
    } else {
        Err(outcome
            .error
            .unwrap_or_else(|| "Upload failed".to_string()))
    }
}

fn run_list_configs(synthetic_camera: bool, config_path: Option<PathBuf>) -> Result<(), String> {
    let mut settings = load_settings(config_path.as_ref())?;
    if synthetic_camera {
        settings.camera.use_synthetic = true;
    }

    let mut camera = camera::create_camera(&settings);
    if !camera.connect() {
        eprintln!("Warning: camera not connected; showing offline defaults.\n");
    }

    println!("Camera options:\n");
    for name in camera.list_config_names() {
        let Some(option) = camera.get_config(&name) else {
            continue;
        };
        let choices = if option.choices.is_empty() {
            String::new()
        } else {
            format!("  [{}]", option.choices.join(", "))
        };
        let read_only = if option.read_only { "  (read-only)" } else { "" };
        println!(
            "  {:<14} {} = {}{}{}",
            option.name, option.label, option.current, choices, read_only
        );
    }

    camera.disconnect();
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Capture {
            synthetic_camera,
            output,
            config,
        }) => {
            if let Err(e) = run_capture(synthetic_camera, output, config) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Upload { file, url, config }) => {
            if let Err(e) = run_upload(file, url, config) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::ListConfigs {
            synthetic_camera,
            config,
        }) => {
            if let Err(e) = run_list_configs(synthetic_camera, config) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run {
            synthetic_camera,
            countdown,
            review,
            fps,
            photos_dir,
            no_upload,
            config,
        }) => {
            if let Err(e) = run_booth(
                synthetic_camera,
                countdown,
                review,
                fps,
                photos_dir,
                no_upload,
                config,
            ) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            // Bare invocation runs the booth with config defaults
            if let Err(e) = run_booth(false, None, None, None, None, false, None) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_countdown_valid() {
        assert_eq!(parse_countdown("3"), Ok(3));
        assert_eq!(parse_countdown("1"), Ok(1));
        assert_eq!(parse_countdown("10"), Ok(10));
    }

    #[test]
    fn test_parse_countdown_invalid() {
        assert!(parse_countdown("0").is_err());
        assert!(parse_countdown("11").is_err());
        assert!(parse_countdown("abc").is_err());
    }

    #[test]
    fn test_parse_review_range() {
        assert_eq!(parse_review("5"), Ok(5));
        assert!(parse_review("0").is_err());
        assert!(parse_review("31").is_err());
    }

    #[test]
    fn test_parse_fps_range() {
        assert_eq!(parse_fps("10"), Ok(10));
        assert_eq!(parse_fps("30"), Ok(30));
        assert!(parse_fps("4").is_err());
        assert!(parse_fps("60").is_err());
        assert!(parse_fps("fast").is_err());
    }
}
