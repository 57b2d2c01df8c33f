//! Local photo storage.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Expand `{timestamp}` in a filename pattern to the capture time,
/// formatted as YYYYMMDD_HHMMSS. Patterns without the placeholder pass
/// through unchanged.
pub fn expand_filename(pattern: &str, when: DateTime<Local>) -> String {
    pattern.replace("{timestamp}", &when.format("%Y%m%d_%H%M%S").to_string())
}

/// Write photo bytes into `dir` using the filename pattern, creating the
/// directory (and parents) if needed. Returns the full path written.
pub fn save_photo(dir: &Path, pattern: &str, image: &[u8]) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(expand_filename(pattern, Local::now()));
    std::fs::write(&path, image)?;
    log::info!("Photo saved: {}", path.display());
    Ok(path)
}
