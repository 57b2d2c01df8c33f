//! Hardware camera backend built on nokhwa.
//!
//! The device is owned by a dedicated grabber thread that streams decoded
//! frames into a small buffer. Preview and capture read from that buffer
//! with a bounded wait, so a hung driver can never stall the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat as NokhwaFrameFormat, RequestedFormat,
    RequestedFormatType, Resolution,
};
use nokhwa::{query, Camera as NokhwaCamera};

use super::types::{CameraError, CameraOption, CaptureResult, PreviewFrame};
use super::Camera;

const PREVIEW_WIDTH: u32 = 1280;
const PREVIEW_HEIGHT: u32 = 720;
const PREVIEW_FPS: u32 = 30;
const DEFAULT_JPEG_QUALITY: u8 = 90;

const FRAME_BUFFER: usize = 2;
/// Longest a preview grab may wait; roughly one stream interval.
const PREVIEW_GRAB_TIMEOUT: Duration = Duration::from_millis(1000 / PREVIEW_FPS as u64);
/// Captures may wait a little longer for a fresh frame.
const CAPTURE_GRAB_TIMEOUT: Duration = Duration::from_secs(2);
/// Device open plus the format fallback attempts.
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Basic information about an attached camera device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: u32,
    pub name: String,
    pub description: String,
}

/// List all available camera devices on the system.
///
/// Returns an empty vector (not an error) when no cameras are present.
pub fn list_devices() -> Result<Vec<DeviceInfo>, CameraError> {
    let devices = query(ApiBackend::Auto).map_err(|e| CameraError::QueryFailed(e.to_string()))?;

    Ok(devices
        .into_iter()
        .map(|d| DeviceInfo {
            index: d.index().as_index().unwrap_or(0),
            name: d.human_name(),
            description: d.description().to_string(),
        })
        .collect())
}

/// Real camera backend. A grabber thread streams frames from the device;
/// preview and capture both read from its buffer.
pub struct HardwareCamera {
    device_index: u32,
    grabber: Option<Grabber>,
    options: Vec<CameraOption>,
}

/// Handle to the frame grabber thread.
struct Grabber {
    thread: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    frames: Receiver<PreviewFrame>,
}

impl Grabber {
    /// Newest buffered frame, or wait up to `timeout` for the next one.
    fn latest(&self, timeout: Duration) -> Option<PreviewFrame> {
        let mut newest = None;
        while let Ok(frame) = self.frames.try_recv() {
            newest = Some(frame);
        }
        if newest.is_some() {
            return newest;
        }
        match self.frames.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Discard buffered frames and wait up to `timeout` for the next one
    /// off the sensor.
    fn fresh(&self, timeout: Duration) -> Option<PreviewFrame> {
        while self.frames.try_recv().is_ok() {}
        self.frames.recv_timeout(timeout).ok()
    }
}

impl Drop for Grabber {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Join only if the thread has already exited. A driver hung in a
        // frame grab must not wedge shutdown; the thread leaves on its
        // own once the grab returns or the channel closes.
        if let Some(handle) = self.thread.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

impl HardwareCamera {
    pub fn new(device_index: u32) -> Self {
        Self {
            device_index,
            grabber: None,
            options: default_options(),
        }
    }

    fn jpeg_quality(&self) -> u8 {
        self.options
            .iter()
            .find(|o| o.name == "jpegquality")
            .and_then(|o| o.current.parse().ok())
            .unwrap_or(DEFAULT_JPEG_QUALITY)
    }

    fn mirror_enabled(&self) -> bool {
        self.options
            .iter()
            .find(|o| o.name == "mirror")
            .map(|o| o.current == "on")
            .unwrap_or(false)
    }
}

/// Try to open a camera with multiple format fallback strategies.
fn open_camera_with_fallback(index: &CameraIndex) -> Result<NokhwaCamera, CameraError> {
    // In order of preference:
    // 1. Closest match with NV12 (common on macOS)
    // 2. Closest match with MJPEG (widely supported)
    // 3. Highest resolution available (let camera decide format)
    let format_attempts: Vec<RequestedFormat> = vec![
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            Resolution::new(PREVIEW_WIDTH, PREVIEW_HEIGHT),
            NokhwaFrameFormat::NV12,
            PREVIEW_FPS,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            Resolution::new(PREVIEW_WIDTH, PREVIEW_HEIGHT),
            NokhwaFrameFormat::MJPEG,
            PREVIEW_FPS,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution),
    ];

    let mut last_error = None;

    for requested in format_attempts {
        match NokhwaCamera::new(index.clone(), requested) {
            Ok(cam) => return Ok(cam),
            Err(e) => {
                last_error = Some(e);
                continue;
            }
        }
    }

    match last_error {
        Some(e) => Err(CameraError::OpenFailed {
            index: match index {
                CameraIndex::Index(i) => *i,
                CameraIndex::String(_) => 0,
            },
            message: e.to_string(),
        }),
        None => Err(CameraError::NoDevices),
    }
}

/// Own the device for the lifetime of the connection. Reports the open
/// result on `ready`, then streams decoded frames until stopped.
fn grab_loop(
    device_index: u32,
    stop: Arc<AtomicBool>,
    ready: mpsc::Sender<Result<String, CameraError>>,
    frames: SyncSender<PreviewFrame>,
) {
    let index = CameraIndex::Index(device_index);
    let mut camera = match open_camera_with_fallback(&index) {
        Ok(cam) => cam,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(CameraError::StreamFailed(e.to_string())));
        return;
    }

    let name = camera.info().human_name();
    let res = camera.resolution();
    log::info!(
        "Hardware camera connected: {} ({}x{} @ {} fps)",
        name,
        res.width(),
        res.height(),
        camera.frame_rate()
    );
    let _ = ready.send(Ok(name));

    while !stop.load(Ordering::Relaxed) {
        let buffer = match camera.frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                log::debug!("Frame grab failed: {e}");
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
        };
        let resolution = buffer.resolution();
        let Ok(decoded) = buffer.decode_image::<RgbFormat>() else {
            continue;
        };

        let frame = PreviewFrame {
            data: decoded.into_raw(),
            width: resolution.width(),
            height: resolution.height(),
        };
        match frames.try_send(frame) {
            // A full buffer means nobody is reading; drop the frame
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => break,
        }
    }

    let _ = camera.stop_stream();
    log::debug!("Frame grabber exited");
}

fn default_options() -> Vec<CameraOption> {
    vec![
        CameraOption {
            name: "mirror".to_string(),
            label: "Mirror preview".to_string(),
            current: "off".to_string(),
            choices: ["on", "off"].map(String::from).to_vec(),
            read_only: false,
        },
        CameraOption {
            name: "jpegquality".to_string(),
            label: "JPEG quality".to_string(),
            current: DEFAULT_JPEG_QUALITY.to_string(),
            choices: ["70", "80", "90", "95"].map(String::from).to_vec(),
            read_only: false,
        },
        CameraOption {
            name: "devicename".to_string(),
            label: "Device".to_string(),
            current: String::new(),
            choices: Vec::new(),
            read_only: true,
        },
    ]
}

impl Camera for HardwareCamera {
    fn connect(&mut self) -> bool {
        if self.grabber.is_some() {
            return true;
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let (frame_tx, frame_rx) = mpsc::sync_channel(FRAME_BUFFER);
        let stop = Arc::new(AtomicBool::new(false));

        let thread_stop = Arc::clone(&stop);
        let device_index = self.device_index;
        let thread = std::thread::spawn(move || {
            grab_loop(device_index, thread_stop, ready_tx, frame_tx);
        });

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(name)) => {
                if let Some(opt) = self.options.iter_mut().find(|o| o.name == "devicename") {
                    opt.current = name;
                }
                self.grabber = Some(Grabber {
                    thread: Some(thread),
                    stop,
                    frames: frame_rx,
                });
                true
            }
            Ok(Err(e)) => {
                log::warn!("Camera connect failed: {e}");
                let _ = thread.join();
                false
            }
            Err(_) => {
                // Device stuck mid-open; the thread exits on its own
                // whenever the driver lets go.
                stop.store(true, Ordering::SeqCst);
                log::warn!("Camera connect timed out after {OPEN_TIMEOUT:?}");
                false
            }
        }
    }

    fn disconnect(&mut self) {
        if self.grabber.take().is_some() {
            log::info!("Hardware camera disconnected");
        }
    }

    fn is_connected(&self) -> bool {
        self.grabber.is_some()
    }

    fn get_preview_frame(&mut self) -> Option<PreviewFrame> {
        let mirror = self.mirror_enabled();
        let grabber = self.grabber.as_ref()?;

        let mut frame = grabber.latest(PREVIEW_GRAB_TIMEOUT)?;
        if mirror {
            frame.mirror_horizontal();
        }
        Some(frame)
    }

    fn capture_photo(&mut self) -> CaptureResult {
        let quality = self.jpeg_quality();
        let Some(grabber) = self.grabber.as_ref() else {
            return CaptureResult::failed("camera not connected");
        };

        // Focus and exposure are handled by the driver on the open
        // stream; discard buffered preview frames so the shot is taken
        // now, not whenever the oldest unread frame was grabbed.
        let Some(frame) = grabber.fresh(CAPTURE_GRAB_TIMEOUT) else {
            return CaptureResult::failed("frame grab timed out");
        };

        let Some(img) = RgbImage::from_raw(frame.width, frame.height, frame.data) else {
            return CaptureResult::failed("frame size mismatch");
        };

        let mut encoded = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut encoded, quality);
        if let Err(e) = encoder.encode_image(&img) {
            return CaptureResult::failed(format!("JPEG encoding failed: {e}"));
        }

        log::debug!("Hardware capture produced {} bytes", encoded.len());
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

impl Drop for HardwareCamera {
    fn drop(&mut self) {
        self.disconnect();
    }
}
