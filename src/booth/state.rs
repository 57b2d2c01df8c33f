//! Booth orchestration: screen state machine, countdown and review
//! timers, capture, local save and upload hand-off.

use std::path::PathBuf;

use chrono::Local;
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tokio::time::{sleep_until, Duration, Instant};

use super::events::{BoothEvent, BoothNotification, BoothScreen, RoutedFrame};
use crate::camera::{self, Camera, CaptureResult, PreviewFrame, SharedCamera};
use crate::config::Settings;
use crate::preview::PreviewLoop;
use crate::storage;
use crate::upload::{UploadCallbacks, UploadPolicy, UploadWorker};

const FRAME_CHANNEL_CAPACITY: usize = 8;
const UPLOAD_FILENAME_PATTERN: &str = "photo_{timestamp}.jpg";

/// Cloneable sender half for driving the booth from input sources.
#[derive(Clone)]
pub struct BoothHandle {
    events_tx: UnboundedSender<BoothEvent>,
}

impl BoothHandle {
    pub fn request_capture(&self) {
        let _ = self.events_tx.send(BoothEvent::CaptureRequested);
    }

    pub fn open_settings(&self) {
        let _ = self.events_tx.send(BoothEvent::SettingsRequested);
    }

    pub fn save_settings(&self, settings: Settings) {
        let _ = self.events_tx.send(BoothEvent::SettingsSaved(settings));
    }

    pub fn cancel_settings(&self) {
        let _ = self.events_tx.send(BoothEvent::SettingsCancelled);
    }

    pub fn shutdown(&self) {
        let _ = self.events_tx.send(BoothEvent::Shutdown);
    }
}

/// Receiver halves for whatever front end renders the booth.
pub struct BoothOutputs {
    pub notifications: UnboundedReceiver<BoothNotification>,
    pub frames: Receiver<RoutedFrame>,
}

/// The booth itself. Owns the camera, the preview pump and the upload
/// worker; all state transitions happen on the task running [`Booth::run`],
/// so captures and timer expiries can never race each other.
pub struct Booth {
    settings: Settings,
    screen: BoothScreen,
    camera: SharedCamera,
    preview: PreviewLoop,
    uploader: Option<UploadWorker>,
    notify_tx: UnboundedSender<BoothNotification>,
    frames_out: Sender<RoutedFrame>,
    events_rx: Option<UnboundedReceiver<BoothEvent>>,
    frames_rx: Option<Receiver<PreviewFrame>>,
    /// Where accepted settings are persisted. `None` disables persistence.
    persist_path: Option<PathBuf>,
    countdown_remaining: u32,
    countdown_deadline: Option<Instant>,
    review_deadline: Option<Instant>,
}

impl Booth {
    /// Connect the camera, start the preview pump and (if configured)
    /// the upload worker, and hand back the booth with its channels.
    ///
    /// A camera that fails to connect is not fatal: the booth runs,
    /// preview stays dark and captures report failure.
    pub fn start(
        settings: Settings,
        camera: Box<dyn Camera>,
        persist_path: Option<PathBuf>,
    ) -> (Self, BoothHandle, BoothOutputs) {
        let settings = settings.clamped();
        let camera = camera::shared(camera);

        match camera.lock() {
            Ok(mut cam) => {
                if cam.connect() {
                    apply_camera_options(cam.as_mut(), &settings);
                } else {
                    log::warn!("Camera connection failed, continuing without preview");
                }
            }
            Err(_) => log::warn!("Camera unavailable"),
        }

        let (frames_in_tx, frames_in_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let preview = PreviewLoop::start(
            SharedCamera::clone(&camera),
            settings.camera.preview_fps,
            frames_in_tx,
        );

        let uploader = if upload_active(&settings) {
            log::info!("Upload endpoint: {}", settings.upload.url);
            Some(UploadWorker::spawn(
                UploadPolicy::from(&settings.upload),
                UploadCallbacks::default(),
            ))
        } else {
            None
        };

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (frames_out_tx, frames_out_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let booth = Self {
            settings,
            screen: BoothScreen::Idle,
            camera,
            preview,
            uploader,
            notify_tx,
            frames_out: frames_out_tx,
            events_rx: Some(events_rx),
            frames_rx: Some(frames_in_rx),
            persist_path,
            countdown_remaining: 0,
            countdown_deadline: None,
            review_deadline: None,
        };
        let handle = BoothHandle { events_tx };
        let outputs = BoothOutputs {
            notifications: notify_rx,
            frames: frames_out_rx,
        };
        (booth, handle, outputs)
    }

    pub fn screen(&self) -> BoothScreen {
        self.screen
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Drive the booth until a `Shutdown` event arrives (or every handle
    /// is dropped), then release camera, preview and upload resources.
    pub async fn run(mut self) {
        let Some(mut events_rx) = self.events_rx.take() else {
            return;
        };
        let Some(mut frames_rx) = self.frames_rx.take() else {
            return;
        };
        let mut frames_open = true;

        loop {
            let countdown_at = self.countdown_deadline;
            let review_at = self.review_deadline;

            tokio::select! {
                event = events_rx.recv() => {
                    match event {
                        None | Some(BoothEvent::Shutdown) => break,
                        Some(event) => self.handle_event(event),
                    }
                }
                frame = frames_rx.recv(), if frames_open => {
                    match frame {
                        Some(frame) => self.route_frame(frame),
                        None => frames_open = false,
                    }
                }
                _ = sleep_until_opt(countdown_at), if countdown_at.is_some() => {
                    self.on_countdown_tick();
                }
                _ = sleep_until_opt(review_at), if review_at.is_some() => {
                    self.on_review_expired();
                }
            }
        }

        self.finish().await;
    }

    pub(crate) fn handle_event(&mut self, event: BoothEvent) {
        match event {
            BoothEvent::CaptureRequested => self.on_capture_requested(),
            BoothEvent::SettingsRequested => self.on_settings_requested(),
            BoothEvent::SettingsSaved(new) => self.on_settings_saved(new),
            BoothEvent::SettingsCancelled => self.on_settings_cancelled(),
            // Handled by the run loop
            BoothEvent::Shutdown => {}
        }
    }

    fn on_capture_requested(&mut self) {
        if self.screen != BoothScreen::Idle {
            log::debug!("Capture request ignored on {:?} screen", self.screen);
            return;
        }
        self.countdown_remaining = self.settings.timing.countdown_seconds;
        self.set_screen(BoothScreen::Countdown);
        self.notify(BoothNotification::CountdownTick(self.countdown_remaining));
        self.countdown_deadline = Some(Instant::now() + Duration::from_secs(1));
    }

    fn on_settings_requested(&mut self) {
        if self.screen != BoothScreen::Idle {
            log::debug!("Settings request ignored on {:?} screen", self.screen);
            return;
        }
        self.set_screen(BoothScreen::SettingsOpen);
    }

    pub(crate) fn on_countdown_tick(&mut self) {
        // A transition away from Countdown clears the deadline, but guard
        // anyway so a stale tick can never fire the shutter.
        if self.screen != BoothScreen::Countdown {
            self.countdown_deadline = None;
            return;
        }
        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        self.notify(BoothNotification::CountdownTick(self.countdown_remaining));

        if self.countdown_remaining > 0 {
            self.countdown_deadline = Some(Instant::now() + Duration::from_secs(1));
            return;
        }
        self.countdown_deadline = None;
        self.fire_capture();
    }

    fn fire_capture(&mut self) {
        log::info!("Countdown finished, capturing photo");
        let result = match self.camera.lock() {
            Ok(mut cam) => cam.capture_photo(),
            Err(_) => CaptureResult::failed("camera unavailable"),
        };

        let image = match (result.success, result.image) {
            (true, Some(image)) => image,
            _ => {
                let message = result.error.unwrap_or_else(|| "capture failed".to_string());
                log::warn!("Capture failed: {message}");
                self.notify(BoothNotification::CaptureFailed(message));
                self.set_screen(BoothScreen::Idle);
                return;
            }
        };

        if self.settings.storage.save_locally {
            match storage::save_photo(
                &self.settings.storage.photos_dir,
                &self.settings.storage.filename_pattern,
                &image,
            ) {
                Ok(path) => self.notify(BoothNotification::PhotoSaved(path)),
                Err(e) => {
                    log::warn!("Failed to save photo: {e}");
                    self.notify(BoothNotification::SaveFailed(e.to_string()));
                }
            }
        }

        if upload_active(&self.settings) && self.settings.upload.upload_on_capture {
            if let Some(uploader) = &self.uploader {
                let filename = storage::expand_filename(UPLOAD_FILENAME_PATTERN, Local::now());
                uploader.enqueue(image.clone(), filename);
            }
        }

        self.notify(BoothNotification::PhotoCaptured(image));
        self.set_screen(BoothScreen::Review);
        self.review_deadline =
            Some(Instant::now() + Duration::from_secs(u64::from(self.settings.timing.review_seconds)));
    }

    pub(crate) fn on_review_expired(&mut self) {
        self.review_deadline = None;
        if self.screen == BoothScreen::Review {
            self.set_screen(BoothScreen::Idle);
        }
    }

    fn on_settings_saved(&mut self, new: Settings) {
        if self.screen != BoothScreen::SettingsOpen {
            log::debug!("Settings save ignored on {:?} screen", self.screen);
            return;
        }
        self.apply_settings(new);
        self.set_screen(BoothScreen::Idle);
    }

    fn on_settings_cancelled(&mut self) {
        if self.screen == BoothScreen::SettingsOpen {
            self.set_screen(BoothScreen::Idle);
        }
    }

    fn apply_settings(&mut self, new: Settings) {
        let new = new.clamped();

        self.preview.set_rate(new.camera.preview_fps);
        if let Ok(mut cam) = self.camera.lock() {
            apply_camera_options(cam.as_mut(), &new);
        }

        // Reconfigure rather than rebuild the worker so queued jobs survive
        match (&self.uploader, upload_active(&new)) {
            (Some(worker), true) => worker.reconfigure(UploadPolicy::from(&new.upload)),
            (None, true) => {
                log::info!("Upload endpoint: {}", new.upload.url);
                self.uploader = Some(UploadWorker::spawn(
                    UploadPolicy::from(&new.upload),
                    UploadCallbacks::default(),
                ));
            }
            // Existing queue keeps draining; nothing new gets enqueued
            (Some(_), false) | (None, false) => {}
        }

        if self.persist_path.is_some() {
            if let Err(e) = new.save(self.persist_path.as_deref()) {
                log::warn!("Failed to persist settings: {e}");
            }
        }

        log::info!(
            "Settings applied: countdown={}s, review={}s, preview={}fps",
            new.timing.countdown_seconds,
            new.timing.review_seconds,
            new.camera.preview_fps
        );
        self.settings = new.clone();
        self.notify(BoothNotification::SettingsApplied(new));
    }

    pub(crate) fn route_frame(&mut self, frame: PreviewFrame) {
        let blur = match self.screen {
            BoothScreen::Idle => true,
            BoothScreen::Countdown => false,
            // Review shows the captured photo, settings shows no preview
            BoothScreen::Review | BoothScreen::SettingsOpen => return,
        };
        // A full channel means the renderer is behind; drop the frame
        let _ = self.frames_out.try_send(RoutedFrame { frame, blur });
    }

    fn set_screen(&mut self, screen: BoothScreen) {
        if screen == self.screen {
            return;
        }
        log::debug!("Screen {:?} -> {:?}", self.screen, screen);
        self.screen = screen;
        self.notify(BoothNotification::ScreenChanged(screen));
    }

    fn notify(&self, notification: BoothNotification) {
        let _ = self.notify_tx.send(notification);
    }

    async fn finish(mut self) {
        log::info!("Shutting down booth");
        self.preview.stop();

        if let Some(mut worker) = self.uploader.take() {
            worker.shutdown(true).await;
            let stats = worker.stats();
            log::info!(
                "Upload stats: {} total, {} successful, {} failed",
                stats.total,
                stats.successful,
                stats.failed
            );
        }

        if let Ok(mut cam) = self.camera.lock() {
            cam.disconnect();
        }
    }
}

fn upload_active(settings: &Settings) -> bool {
    settings.upload.enabled && !settings.upload.url.is_empty()
}

/// Push the exposure-related settings into the camera, skipping options
/// the backend does not expose.
fn apply_camera_options(camera: &mut dyn Camera, settings: &Settings) {
    let values = [
        ("iso", settings.camera.iso.as_str()),
        ("aperture", settings.camera.aperture.as_str()),
        ("shutterspeed", settings.camera.shutter_speed.as_str()),
    ];
    for (name, value) in values {
        if camera.get_config(name).is_some() && !camera.set_config(name, value) {
            log::warn!("Camera rejected {name}={value}");
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraOption, SyntheticCamera};
    use bytes::Bytes;
    use tokio::sync::mpsc::error::TryRecvError;

    fn test_settings(countdown: u32) -> Settings {
        let mut settings = Settings::default();
        settings.timing.countdown_seconds = countdown;
        settings.camera.use_synthetic = true;
        settings.storage.save_locally = false;
        settings.upload.enabled = false;
        settings
    }

    fn test_booth(countdown: u32) -> (Booth, BoothOutputs) {
        let (booth, _handle, outputs) = Booth::start(
            test_settings(countdown),
            Box::new(SyntheticCamera::new()),
            None,
        );
        (booth, outputs)
    }

    fn drain(outputs: &mut BoothOutputs) -> Vec<BoothNotification> {
        let mut all = Vec::new();
        while let Ok(n) = outputs.notifications.try_recv() {
            all.push(n);
        }
        all
    }

    /// Camera whose captures always fail, for the failure path.
    struct BrokenCamera {
        connected: bool,
    }

    impl Camera for BrokenCamera {
        fn connect(&mut self) -> bool {
            self.connected = true;
            true
        }
        fn disconnect(&mut self) {
            self.connected = false;
        }
        fn is_connected(&self) -> bool {
            self.connected
        }
        fn get_preview_frame(&mut self) -> Option<PreviewFrame> {
            None
        }
        fn capture_photo(&mut self) -> CaptureResult {
            CaptureResult::failed("shutter jammed")
        }
        fn get_config(&self, _name: &str) -> Option<CameraOption> {
            None
        }
        fn set_config(&mut self, _name: &str, _value: &str) -> bool {
            false
        }
        fn list_config_names(&self) -> Vec<String> {
            Vec::new()
        }
    }

    #[test]
    fn test_capture_request_starts_countdown() {
        let (mut booth, mut outputs) = test_booth(3);
        booth.handle_event(BoothEvent::CaptureRequested);

        assert_eq!(booth.screen(), BoothScreen::Countdown);
        let notifications = drain(&mut outputs);
        assert!(matches!(
            notifications[0],
            BoothNotification::ScreenChanged(BoothScreen::Countdown)
        ));
        assert!(matches!(notifications[1], BoothNotification::CountdownTick(3)));
    }

    #[test]
    fn test_countdown_ticks_then_captures() {
        let (mut booth, mut outputs) = test_booth(2);
        booth.handle_event(BoothEvent::CaptureRequested);
        drain(&mut outputs);

        booth.on_countdown_tick();
        let notifications = drain(&mut outputs);
        assert!(matches!(notifications[0], BoothNotification::CountdownTick(1)));
        assert_eq!(booth.screen(), BoothScreen::Countdown);

        booth.on_countdown_tick();
        let notifications = drain(&mut outputs);
        assert!(matches!(notifications[0], BoothNotification::CountdownTick(0)));
        assert!(notifications
            .iter()
            .any(|n| matches!(n, BoothNotification::PhotoCaptured(_))));
        assert_eq!(booth.screen(), BoothScreen::Review);
        assert!(booth.review_deadline.is_some());
        assert!(booth.countdown_deadline.is_none());
    }

    #[test]
    fn test_capture_request_ignored_during_countdown() {
        let (mut booth, mut outputs) = test_booth(3);
        booth.handle_event(BoothEvent::CaptureRequested);
        drain(&mut outputs);

        booth.handle_event(BoothEvent::CaptureRequested);
        assert!(drain(&mut outputs).is_empty());
        assert_eq!(booth.countdown_remaining, 3);
    }

    #[test]
    fn test_settings_request_ignored_outside_idle() {
        let (mut booth, _outputs) = test_booth(3);
        booth.handle_event(BoothEvent::CaptureRequested);
        booth.handle_event(BoothEvent::SettingsRequested);
        assert_eq!(booth.screen(), BoothScreen::Countdown);
    }

    #[test]
    fn test_review_expiry_returns_to_idle() {
        let (mut booth, mut outputs) = test_booth(1);
        booth.handle_event(BoothEvent::CaptureRequested);
        booth.on_countdown_tick();
        assert_eq!(booth.screen(), BoothScreen::Review);
        drain(&mut outputs);

        booth.on_review_expired();
        assert_eq!(booth.screen(), BoothScreen::Idle);
        assert!(booth.review_deadline.is_none());
    }

    #[test]
    fn test_failed_capture_returns_to_idle() {
        let (mut booth, _handle, mut outputs) = Booth::start(
            test_settings(1),
            Box::new(BrokenCamera { connected: false }),
            None,
        );
        booth.handle_event(BoothEvent::CaptureRequested);
        booth.on_countdown_tick();

        assert_eq!(booth.screen(), BoothScreen::Idle);
        let notifications = drain(&mut outputs);
        assert!(notifications.iter().any(|n| matches!(
            n,
            BoothNotification::CaptureFailed(msg) if msg == "shutter jammed"
        )));
    }

    #[test]
    fn test_capture_saves_photo_locally() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = test_settings(1);
        settings.storage.save_locally = true;
        settings.storage.photos_dir = dir.path().to_path_buf();

        let (mut booth, _handle, mut outputs) =
            Booth::start(settings, Box::new(SyntheticCamera::new()), None);
        booth.handle_event(BoothEvent::CaptureRequested);
        booth.on_countdown_tick();

        let notifications = drain(&mut outputs);
        let saved = notifications.iter().find_map(|n| match n {
            BoothNotification::PhotoSaved(path) => Some(path.clone()),
            _ => None,
        });
        let captured = notifications.iter().find_map(|n| match n {
            BoothNotification::PhotoCaptured(bytes) => Some(bytes.clone()),
            _ => None,
        });
        let path = saved.expect("expected PhotoSaved");
        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(Bytes::from(on_disk), captured.unwrap());
    }

    #[test]
    fn test_frames_route_by_screen() {
        let (mut booth, mut outputs) = test_booth(3);
        let frame = PreviewFrame {
            data: vec![0; 3],
            width: 1,
            height: 1,
        };

        booth.route_frame(frame.clone());
        let routed = outputs.frames.try_recv().unwrap();
        assert!(routed.blur);

        booth.handle_event(BoothEvent::CaptureRequested);
        booth.route_frame(frame.clone());
        let routed = outputs.frames.try_recv().unwrap();
        assert!(!routed.blur);

        // Review and SettingsOpen drop frames entirely
        booth.screen = BoothScreen::Review;
        booth.route_frame(frame.clone());
        assert!(matches!(outputs.frames.try_recv(), Err(TryRecvError::Empty)));

        booth.screen = BoothScreen::SettingsOpen;
        booth.route_frame(frame);
        assert!(matches!(outputs.frames.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_settings_saved_applies_clamped_values() {
        let (mut booth, mut outputs) = test_booth(3);
        booth.handle_event(BoothEvent::SettingsRequested);
        assert_eq!(booth.screen(), BoothScreen::SettingsOpen);
        drain(&mut outputs);

        let mut new = test_settings(99);
        new.timing.review_seconds = 2;
        booth.handle_event(BoothEvent::SettingsSaved(new));

        assert_eq!(booth.screen(), BoothScreen::Idle);
        assert_eq!(booth.settings().timing.countdown_seconds, 10);
        assert_eq!(booth.settings().timing.review_seconds, 2);

        let notifications = drain(&mut outputs);
        assert!(notifications.iter().any(|n| matches!(
            n,
            BoothNotification::SettingsApplied(s) if s.timing.countdown_seconds == 10
        )));
    }

    #[test]
    fn test_settings_cancel_returns_to_idle_unchanged() {
        let (mut booth, _outputs) = test_booth(3);
        let before = booth.settings().clone();
        booth.handle_event(BoothEvent::SettingsRequested);
        booth.handle_event(BoothEvent::SettingsCancelled);
        assert_eq!(booth.screen(), BoothScreen::Idle);
        assert_eq!(booth.settings(), &before);
    }
}
