//! Photo upload: wire client and background queue worker.

pub mod client;
pub mod worker;

pub use client::{UploadClient, UploadError, UploadJob, UploadOutcome, UploadPolicy};
pub use worker::{OutcomeCallback, UploadCallbacks, UploadStats, UploadWorker};
