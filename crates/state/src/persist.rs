//! JSON files written through a temporary sibling and an atomic rename

use fman_errors::{Error, StateError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

fn persist_failed(path: &Path, message: impl std::fmt::Display) -> Error {
    StateError::PersistFailed {
        path: path.display().to_string(),
        message: message.to_string(),
    }
    .into()
}

/// Serialize `value` to `path` so readers never observe a partial file
pub(crate) async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    let payload = serde_json::to_vec_pretty(value).map_err(|e| persist_failed(path, e))?;
    let tmp_path = path.with_extension("json.tmp");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| persist_failed(parent, e))?;
    }

    fs::write(&tmp_path, payload)
        .await
        .map_err(|e| persist_failed(&tmp_path, e))?;
    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(persist_failed(path, e));
    }
    Ok(())
}

/// Read a JSON file; `Ok(None)` when it does not exist
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, Error> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io_with_path(&e, path)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| {
            StateError::StateCorrupted {
                message: format!("{}: {e}", path.display()),
            }
            .into()
        })
}

/// Delete a file, treating a missing file as already deleted
pub(crate) async fn remove_file(path: &Path) -> Result<(), Error> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io_with_path(&e, path)),
    }
}
