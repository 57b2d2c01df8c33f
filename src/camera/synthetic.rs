//! Synthetic camera backend.
//!
//! Renders animated test frames instead of talking to hardware, so the
//! whole kiosk can run on a development machine without a camera attached.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use super::types::{CameraOption, CaptureResult, PreviewFrame};
use super::Camera;

const PREVIEW_WIDTH: u32 = 800;
const PREVIEW_HEIGHT: u32 = 480;
const CAPTURE_WIDTH: u32 = 1920;
const CAPTURE_HEIGHT: u32 = 1280;
const JPEG_QUALITY: u8 = 92;

/// Camera stand-in that renders a drifting color gradient with a moving
/// highlight, plus a static high-resolution card for captures.
pub struct SyntheticCamera {
    connected: bool,
    frame_count: u64,
    options: Vec<CameraOption>,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self {
            connected: false,
            frame_count: 0,
            options: default_options(),
        }
    }

    fn render_preview(&self) -> PreviewFrame {
        let w = PREVIEW_WIDTH as usize;
        let h = PREVIEW_HEIGHT as usize;
        let t = self.frame_count as f32 * 0.08;
        let mut data = vec![0u8; w * h * 3];

        for y in 0..h {
            let v = y as f32 / h as f32;
            for x in 0..w {
                let u = x as f32 / w as f32;
                let idx = (y * w + x) * 3;
                data[idx] = (128.0 + 100.0 * (u * 6.0 + t).sin()) as u8;
                data[idx + 1] = (128.0 + 100.0 * (v * 4.0 - t * 0.7).sin()) as u8;
                data[idx + 2] = (128.0 + 100.0 * ((u + v) * 3.0 + t * 0.5).cos()) as u8;
            }
        }

        // Moving highlight so motion is visible at any preview rate
        let cx = ((0.5 + 0.35 * t.cos()) * w as f32) as i32;
        let cy = ((0.5 + 0.35 * (t * 1.3).sin()) * h as f32) as i32;
        let radius = 24i32;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy > radius * radius {
                    continue;
                }
                let (px, py) = (cx + dx, cy + dy);
                if px >= 0 && py >= 0 && (px as usize) < w && (py as usize) < h {
                    let idx = (py as usize * w + px as usize) * 3;
                    data[idx] = 255;
                    data[idx + 1] = 255;
                    data[idx + 2] = 255;
                }
            }
        }

        PreviewFrame {
            data,
            width: PREVIEW_WIDTH,
            height: PREVIEW_HEIGHT,
        }
    }

    fn render_capture(&self) -> RgbImage {
        let cx = CAPTURE_WIDTH as f32 / 2.0;
        let cy = CAPTURE_HEIGHT as f32 / 2.0;

        RgbImage::from_fn(CAPTURE_WIDTH, CAPTURE_HEIGHT, |x, y| {
            let u = x as f32 / CAPTURE_WIDTH as f32;
            let v = y as f32 / CAPTURE_HEIGHT as f32;

            // Target ring in the middle of the test card
            let dist = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
            if (dist - 320.0).abs() < 12.0 {
                return Rgb([255, 255, 255]);
            }

            Rgb([
                (40.0 + 180.0 * u) as u8,
                (40.0 + 180.0 * v) as u8,
                (220.0 - 160.0 * u * v) as u8,
            ])
        })
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

fn default_options() -> Vec<CameraOption> {
    vec![
        CameraOption {
            name: "iso".to_string(),
            label: "ISO".to_string(),
            current: "auto".to_string(),
            choices: ["auto", "100", "200", "400", "800", "1600"]
                .map(String::from)
                .to_vec(),
            read_only: false,
        },
        CameraOption {
            name: "aperture".to_string(),
            label: "Aperture".to_string(),
            current: "auto".to_string(),
            choices: ["auto", "2.8", "4.0", "5.6", "8.0", "11", "16"]
                .map(String::from)
                .to_vec(),
            read_only: false,
        },
        CameraOption {
            name: "shutterspeed".to_string(),
            label: "Shutter speed".to_string(),
            current: "auto".to_string(),
            choices: ["auto", "1/30", "1/60", "1/125", "1/250", "1/500"]
                .map(String::from)
                .to_vec(),
            read_only: false,
        },
        CameraOption {
            name: "imageformat".to_string(),
            label: "Image format".to_string(),
            current: "JPEG Fine".to_string(),
            choices: ["JPEG Fine", "JPEG Normal", "RAW"].map(String::from).to_vec(),
            read_only: false,
        },
        CameraOption {
            name: "serialnumber".to_string(),
            label: "Serial number".to_string(),
            current: "SYNTH-0001".to_string(),
            choices: Vec::new(),
            read_only: true,
        },
    ]
}

impl Camera for SyntheticCamera {
    fn connect(&mut self) -> bool {
        if self.connected {
            return true;
        }
        self.connected = true;
        log::info!("Synthetic camera connected");
        true
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            log::info!("Synthetic camera disconnected");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn get_preview_frame(&mut self) -> Option<PreviewFrame> {
        if !self.connected {
            return None;
        }
        self.frame_count += 1;
        Some(self.render_preview())
    }

    fn capture_photo(&mut self) -> CaptureResult {
        if !self.connected {
            return CaptureResult::failed("camera not connected");
        }

        let img = self.render_capture();
        let mut encoded = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY);
        if let Err(e) = encoder.encode_image(&img) {
            return CaptureResult::failed(format!("JPEG encoding failed: {e}"));
        }

        log::debug!("Synthetic capture produced {} bytes", encoded.len());
        CaptureResult::ok(Bytes::from(encoded))
    }

    fn get_config(&self, name: &str) -> Option<CameraOption> {
        self.options.iter().find(|o| o.name == name).cloned()
    }

    fn set_config(&mut self, name: &str, value: &str) -> bool {
        let Some(option) = self.options.iter_mut().find(|o| o.name == name) else {
            log::warn!("Unknown camera option: {name}");
            return false;
        };
        if option.read_only {
            log::warn!("Camera option '{name}' is read-only");
            return false;
        }
        if !option.choices.is_empty() && !option.choices.iter().any(|c| c == value) {
            log::warn!("Invalid value '{value}' for camera option '{name}'");
            return false;
        }
        option.current = value.to_string();
        log::debug!("Camera option '{name}' set to '{value}'");
        true
    }

    fn list_config_names(&self) -> Vec<String> {
        self.options.iter().map(|o| o.name.clone()).collect()
    }
}
