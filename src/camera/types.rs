//! Shared camera types.

use bytes::Bytes;

/// A single RGB preview frame as delivered by a camera backend.
///
/// Pixel data is tightly packed RGB, 3 bytes per pixel, row-major,
/// top-left origin.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl PreviewFrame {
    pub fn bytes_per_pixel(&self) -> usize {
        3
    }

    /// Expected length of `data` for the frame's dimensions.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel()
    }

    /// Mirror the frame horizontally (flip left-right) for selfie-style preview.
    pub fn mirror_horizontal(&mut self) {
        let width = self.width as usize;
        let height = self.height as usize;
        let bpp = self.bytes_per_pixel();

        for y in 0..height {
            let row_start = y * width * bpp;
            let row = &mut self.data[row_start..row_start + width * bpp];

            for x in 0..width / 2 {
                let left = x * bpp;
                let right = (width - 1 - x) * bpp;
                for i in 0..bpp {
                    row.swap(left + i, right + i);
                }
            }
        }
    }
}

/// Result of a full-resolution capture attempt.
///
/// `image` holds encoded JPEG bytes on success. `Bytes` keeps the photo
/// cheaply shareable between local save, review display and the upload queue.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub success: bool,
    pub image: Option<Bytes>,
    pub error: Option<String>,
}

impl CaptureResult {
    pub fn ok(image: Bytes) -> Self {
        Self {
            success: true,
            image: Some(image),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            image: None,
            error: Some(message.into()),
        }
    }
}

/// One configurable camera parameter, described generically so the UI
/// and CLI can render any backend's options without knowing them ahead
/// of time.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraOption {
    /// Stable identifier, e.g. "iso".
    pub name: String,
    /// Human-readable label, e.g. "ISO".
    pub label: String,
    pub current: String,
    /// Accepted values. Empty means free-form or informational.
    pub choices: Vec<String>,
    pub read_only: bool,
}

/// Errors raised by camera backends while opening or streaming.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("No camera devices found")]
    NoDevices,
    #[error("Failed to open camera {index}: {message}")]
    OpenFailed { index: u32, message: String },
    #[error("Failed to start camera stream: {0}")]
    StreamFailed(String),
    #[error("Failed to query camera devices: {0}")]
    QueryFailed(String),
}
