//! Background preview frame pump.
//!
//! Pulls frames from the camera at a configurable rate and pushes them
//! into a bounded channel. A slow consumer causes frames to be dropped,
//! never to pile up.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

use crate::camera::{Camera, PreviewFrame, SharedCamera};

const MIN_FPS: u32 = 1;
const MAX_FPS: u32 = 60;

/// Handle to the preview thread.
///
/// The thread grabs one frame per cycle while holding the shared camera
/// lock, so captures triggered elsewhere interleave cleanly between
/// preview grabs. `stop()` joins the thread; once it returns, no more
/// frames will be sent.
pub struct PreviewLoop {
    thread: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    fps: Arc<AtomicU32>,
}

impl std::fmt::Debug for PreviewLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewLoop")
            .field("fps", &self.fps.load(Ordering::Relaxed))
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl PreviewLoop {
    /// Spawn the preview thread.
    pub fn start(camera: SharedCamera, fps: u32, frames: Sender<PreviewFrame>) -> Self {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let fps = Arc::new(AtomicU32::new(fps.clamp(MIN_FPS, MAX_FPS)));

        let stop = Arc::clone(&stop_signal);
        let rate = Arc::clone(&fps);
        let thread = std::thread::spawn(move || {
            run_preview_loop(camera, stop, rate, frames);
        });

        Self {
            thread: Some(thread),
            stop_signal,
            fps,
        }
    }

    /// Change the target frame rate. Takes effect on the next cycle
    /// without restarting the thread.
    pub fn set_rate(&self, fps: u32) {
        let fps = fps.clamp(MIN_FPS, MAX_FPS);
        self.fps.store(fps, Ordering::Relaxed);
        log::debug!("Preview rate set to {fps} fps");
    }

    /// Stop the preview thread and wait for it to finish.
    ///
    /// When this returns the loop has fully exited and will not deliver
    /// another frame.
    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for PreviewLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_preview_loop(
    camera: SharedCamera,
    stop: Arc<AtomicBool>,
    fps: Arc<AtomicU32>,
    frames: Sender<PreviewFrame>,
) {
    while !stop.load(Ordering::Relaxed) {
        let cycle_start = Instant::now();
        let interval = Duration::from_millis(1000 / u64::from(fps.load(Ordering::Relaxed).max(1)));

        // Hold the camera lock only for the grab itself
        let frame = match camera.lock() {
            Ok(mut cam) => cam.get_preview_frame(),
            Err(_) => break,
        };

        if let Some(frame) = frame {
            match frames.try_send(frame) {
                Ok(()) => {}
                // Consumer busy: drop this frame and keep pacing
                Err(TrySendError::Full(_)) => {}
                // Consumer gone: nothing left to do
                Err(TrySendError::Closed(_)) => break,
            }
        }

        // Sleep out the rest of the interval in small slices so stop()
        // stays responsive
        let deadline = cycle_start + interval;
        while !stop.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(5)));
        }
    }
}
