//! Camera backends and the capability surface shared between them.

pub mod hardware;
pub mod synthetic;
pub mod types;

use std::sync::{Arc, Mutex};

pub use hardware::HardwareCamera;
pub use synthetic::SyntheticCamera;
pub use types::{CameraError, CameraOption, CaptureResult, PreviewFrame};

use crate::config::Settings;

/// Capability surface every camera backend implements.
///
/// Backends are driven from a single control thread at a time; the trait
/// therefore takes `&mut self` for anything that touches the device.
pub trait Camera: Send {
    /// Establish a session with the device. Idempotent: connecting an
    /// already-connected camera reports success without side effects.
    fn connect(&mut self) -> bool;

    /// Release the device. Safe to call when already disconnected.
    /// Stops any in-progress preview streaming.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Grab a low-resolution frame for live preview.
    ///
    /// Returns `None` when disconnected or when no frame is available
    /// within roughly one preview interval. Must not block indefinitely.
    fn get_preview_frame(&mut self) -> Option<PreviewFrame>;

    /// Take a full-resolution photo and return it as encoded JPEG bytes.
    /// Failures are reported in-band via `CaptureResult`, never panics.
    fn capture_photo(&mut self) -> CaptureResult;

    /// Look up a single configuration parameter by name.
    fn get_config(&self, name: &str) -> Option<CameraOption>;

    /// Set a configuration parameter. Returns `false` for unknown names,
    /// read-only parameters, or values outside the parameter's choices.
    fn set_config(&mut self, name: &str, value: &str) -> bool;

    /// Names of all parameters this backend exposes, in stable order.
    fn list_config_names(&self) -> Vec<String>;
}

/// Camera handle shared between the preview thread and the control loop.
/// The mutex serializes preview grabs against full-resolution captures,
/// which most devices cannot interleave.
pub type SharedCamera = Arc<Mutex<Box<dyn Camera>>>;

/// Build the camera backend selected by the settings.
pub fn create_camera(settings: &Settings) -> Box<dyn Camera> {
    if settings.camera.use_synthetic {
        log::info!("Using synthetic camera");
        Box::new(SyntheticCamera::new())
    } else {
        log::info!("Using hardware camera (device {})", settings.camera.device);
        Box::new(HardwareCamera::new(settings.camera.device))
    }
}

pub fn shared(camera: Box<dyn Camera>) -> SharedCamera {
    Arc::new(Mutex::new(camera))
}
