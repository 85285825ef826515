//! JSON persistence for the data directory.
//!
//! Every document is read whole into memory and written back whole. Reads
//! are forgiving: a missing or malformed file becomes the type's default.
//! Writes are pretty-printed, newline-terminated, and go through a temporary
//! file in the same directory followed by a rename.
//!
//! # Output Structure
//!
//! ```text
//! data_dir/
//! ├── prefetched-news.json   # aggregate document
//! ├── url-cache.json         # redirect resolutions
//! └── custom-sections.json   # editor-curated sections
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

pub const AGGREGATE_FILE: &str = "prefetched-news.json";
pub const CACHE_FILE: &str = "url-cache.json";
pub const SECTIONS_FILE: &str = "custom-sections.json";

/// Read and parse a JSON file, falling back to `T::default()`.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn read_json_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "File absent; starting empty");
            return T::default();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "File unreadable; starting empty");
            return T::default();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed JSON; starting empty");
            T::default()
        }
    }
}

/// Serialize `value` to `path` via a temporary sibling file and a rename.
///
/// The JSON is pretty-printed and newline-terminated. Missing parent
/// directories are created.
///
/// # Arguments
///
/// * `path` - Final file location
/// * `value` - Document to serialize
///
/// # Returns
///
/// `Ok(())` once the rename has replaced the previous file.
///
/// # Errors
///
/// Returns an error if serialization, the temporary write or the rename fails.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_json<T>(path: &Path, value: &T) -> Result<(), Box<dyn Error>>
where
    T: Serialize + ?Sized,
{
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).await?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.json".to_string());
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

    if let Err(e) = fs::write(&tmp_path, json.as_bytes()).await {
        error!(tmp = %tmp_path.display(), error = %e, "Failed writing temporary file");
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&tmp_path, path).await {
        error!(error = %e, "Failed to move temporary file into place");
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    debug!(bytes = json.len(), "Wrote JSON");
    Ok(())
}
