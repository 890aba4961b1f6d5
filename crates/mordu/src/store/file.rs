//! Collection file I/O

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::{MorduError, MorduResult};

/// Read a JSON array collection file.
///
/// Returns `Ok(None)` when the file does not exist. A file that exists but
/// does not parse is reported as corruption and never replaced.
pub async fn read_collection<T: DeserializeOwned>(path: &Path) -> MorduResult<Option<Vec<T>>> {
    read_json(path).await
}

/// Read any JSON document with the same missing/corrupt rules as collections
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> MorduResult<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice::<T>(&bytes)
        .map(Some)
        .map_err(|e| MorduError::Corruption {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Replace `path` with `bytes` via a synced sibling temp file and rename
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> MorduResult<()> {
    let temp_path = temp_path_for(path);

    let mut file = tokio::fs::File::create(&temp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}
