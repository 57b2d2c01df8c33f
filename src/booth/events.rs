//! Booth screens, input events and outbound notifications.

use std::path::PathBuf;

use bytes::Bytes;

use crate::camera::PreviewFrame;
use crate::config::Settings;

/// The four kiosk screens. The booth is always on exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoothScreen {
    Idle,
    Countdown,
    Review,
    SettingsOpen,
}

/// Input events driving the booth, from buttons, keys or the CLI.
#[derive(Debug)]
pub enum BoothEvent {
    /// The big photo button.
    CaptureRequested,
    /// Open the settings screen.
    SettingsRequested,
    /// Settings screen closed with save.
    SettingsSaved(Settings),
    /// Settings screen closed without saving.
    SettingsCancelled,
    /// Stop the booth and release all resources.
    Shutdown,
}

/// Notifications the booth emits for whatever front end is attached.
#[derive(Debug, Clone)]
pub enum BoothNotification {
    ScreenChanged(BoothScreen),
    /// Seconds remaining; 0 is sent right before the shutter fires.
    CountdownTick(u32),
    /// JPEG bytes of the photo now showing on the review screen.
    PhotoCaptured(Bytes),
    CaptureFailed(String),
    PhotoSaved(PathBuf),
    SaveFailed(String),
    /// New settings are active (already clamped).
    SettingsApplied(Settings),
}

/// A preview frame routed to the active screen. The flag asks the
/// renderer to blur (idle attract mode shows a softened preview).
#[derive(Debug, Clone)]
pub struct RoutedFrame {
    pub frame: PreviewFrame,
    pub blur: bool,
}
