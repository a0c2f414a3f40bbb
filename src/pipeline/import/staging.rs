use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::ImportError;

/// Write upload bytes to `upload_dir/{uuid}{extension}`.
pub fn stage_upload(upload_dir: &Path, bytes: &[u8], extension: &str) -> Result<PathBuf, ImportError> {
    std::fs::create_dir_all(upload_dir)?;

    let target = upload_dir.join(format!("{}{}", Uuid::new_v4(), extension));
    std::fs::write(&target, bytes)?;

    tracing::debug!(path = %target.display(), size = bytes.len(), "Upload staged");
    Ok(target)
}

/// Best-effort removal of a staged upload. Failures are logged, not returned.
pub fn remove_staged(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Staged upload removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged upload"),
    }
}
