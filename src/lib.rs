//! Photo booth kiosk core: camera backends, live preview, capture
//! countdown, local storage and a retrying background uploader.

pub mod booth;
pub mod camera;
pub mod config;
pub mod preview;
pub mod storage;
pub mod upload;
