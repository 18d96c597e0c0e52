//! Recording of refused serve files

use crate::error::{Result, ServeDbError, ValidationError};
use crate::layout::StoreLayout;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use tracing::warn;

/// Move the staging file to `serves.rej` and describe why in `last_error`.
///
/// Neither file is flushed: losing them in a crash only loses diagnostics.
pub fn reject(layout: &StoreLayout, cause: &ValidationError) -> Result<()> {
    let staging = layout.staging_path();
    let rejected = layout.rejected_path();
    fs::rename(&staging, &rejected).map_err(|e| ServeDbError::io(&staging, e))?;

    let error_path = layout.error_path();
    // An earlier diagnostic is owner-read-only and cannot be truncated.
    remove_if_exists(&error_path).map_err(|e| ServeDbError::io(&error_path, e))?;
    write_diagnostic(&error_path, &format!("{cause}\n"))
        .map_err(|e| ServeDbError::io(&error_path, e))?;

    warn!(path = %rejected.display(), cause = %cause, "Rejected serve file");
    Ok(())
}

/// Best-effort removal of the rejection artifacts after a successful reload
pub fn clear(layout: &StoreLayout) {
    for path in [layout.error_path(), layout.rejected_path()] {
        if let Err(e) = remove_if_exists(&path) {
            warn!(path = %path.display(), error = %e, "Could not remove stale rejection file");
        }
    }
}

pub(crate) fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn write_diagnostic(path: &Path, text: &str) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o400);
    }

    let mut file = options.open(path)?;
    file.write_all(text.as_bytes())
}
