//! Crash-safe installation of an accepted serve file
//!
//! The accepted bytes are written to a temporary file in the store
//! directory, flushed, renamed over `serves.loaded`, and the rename is made
//! durable with a directory flush before the staging file is removed. A
//! crash after the rename but before the removal leaves the staging file in
//! place; the next poll validates it again and repeats the installation.

use crate::error::{Result, ServeDbError};
use crate::layout::{StoreLayout, TEMP_PREFIX};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use tempfile::{Builder, NamedTempFile};
use tracing::debug;

/// Durably install `contents` as the loaded serve file and consume the
/// staging file.
///
/// `contents` must already have been validated; it is written verbatim.
pub fn persist_loaded(layout: &StoreLayout, contents: &[u8]) -> Result<()> {
    let root = layout.root();

    // Needed for the flushes below; fail before touching anything else.
    let dir = File::open(root).map_err(|e| ServeDbError::io(root, e))?;

    let mut temp = Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(root)
        .map_err(|e| ServeDbError::io(root, e))?;

    if let Err(e) = write_synced(&mut temp, contents) {
        let err = ServeDbError::io(temp.path(), e);
        return Err(discard(temp, err));
    }

    let loaded = layout.loaded_path();
    if let Err(e) = temp.persist(&loaded) {
        let err = ServeDbError::io(&loaded, e.error);
        return Err(discard(e.file, err));
    }

    // The rename is visible but not yet durable.
    sync_dir(&dir, root)?;
    debug!(path = %loaded.display(), bytes = contents.len(), "Committed loaded serve file");

    let staging = layout.staging_path();
    fs::remove_file(&staging).map_err(|e| ServeDbError::io(&staging, e))?;
    sync_dir(&dir, root)?;

    Ok(())
}

fn write_synced(temp: &mut NamedTempFile, contents: &[u8]) -> io::Result<()> {
    temp.write_all(contents)?;
    temp.as_file().sync_all()
}

/// Remove an orphaned temporary file, nesting `err` under any removal failure
fn discard(temp: NamedTempFile, err: ServeDbError) -> ServeDbError {
    let path = temp.path().to_path_buf();
    match temp.close() {
        Ok(()) => err,
        Err(e) => ServeDbError::nested(ServeDbError::io(path, e), err),
    }
}

fn sync_dir(dir: &File, root: &Path) -> Result<()> {
    dir.sync_all().map_err(|e| ServeDbError::io(root, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_files(root: &Path) -> Vec<String> {
        fs::read_dir(root)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(TEMP_PREFIX))
            .collect()
    }

    #[test]
    fn test_persist_installs_and_consumes_staging() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());
        let contents = br#"{"serves":[], "owner": "deployer"}"#;
        fs::write(layout.staging_path(), contents).unwrap();

        persist_loaded(&layout, contents).unwrap();

        assert_eq!(fs::read(layout.loaded_path()).unwrap(), contents);
        assert!(!layout.staging_path().exists());
        assert!(temp_files(dir.path()).is_empty());
    }

    #[test]
    fn test_persist_replaces_previous_loaded_file() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());
        fs::write(layout.loaded_path(), b"old").unwrap();
        fs::write(layout.staging_path(), b"new").unwrap();

        persist_loaded(&layout, b"new").unwrap();

        assert_eq!(fs::read(layout.loaded_path()).unwrap(), b"new");
    }

    #[test]
    fn test_missing_staging_fails_after_commit() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());

        let err = persist_loaded(&layout, b"{}").unwrap_err();

        match err {
            ServeDbError::Io { path, source } => {
                assert_eq!(path, layout.staging_path());
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The rename already happened and stays committed.
        assert_eq!(fs::read(layout.loaded_path()).unwrap(), b"{}");
    }

    #[test]
    fn test_failed_rename_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path());
        fs::write(layout.staging_path(), b"{}").unwrap();
        // A non-empty directory where the loaded file belongs cannot be
        // replaced by a rename.
        fs::create_dir(layout.loaded_path()).unwrap();
        fs::write(layout.loaded_path().join("occupied"), b"").unwrap();

        let err = persist_loaded(&layout, b"{}").unwrap_err();

        assert!(matches!(err, ServeDbError::Io { ref path, .. } if *path == layout.loaded_path()));
        assert!(temp_files(dir.path()).is_empty());
        assert!(layout.staging_path().exists());
    }

    #[test]
    fn test_cleanup_failure_is_nested_under_primary() {
        let dir = TempDir::new().unwrap();
        let temp = Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(dir.path())
            .unwrap();
        // Someone else already removed it, so cleanup itself fails.
        fs::remove_file(temp.path()).unwrap();
        let primary = ServeDbError::io(
            dir.path().join("serves.loaded"),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );

        let err = discard(temp, primary);

        match err {
            ServeDbError::Nested { error, nested } => {
                match *error {
                    ServeDbError::Io { ref path, ref source } => {
                        assert!(path.starts_with(dir.path()));
                        assert_eq!(source.kind(), io::ErrorKind::NotFound);
                    }
                    ref other => panic!("unexpected cleanup error: {other:?}"),
                }
                match *nested {
                    ServeDbError::Io { ref source, .. } => {
                        assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
                    }
                    ref other => panic!("unexpected primary error: {other:?}"),
                }
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_successful_cleanup_keeps_primary() {
        let dir = TempDir::new().unwrap();
        let temp = Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(dir.path())
            .unwrap();
        let primary = ServeDbError::io(dir.path(), io::Error::from(io::ErrorKind::Other));

        let err = discard(temp, primary);

        assert!(matches!(err, ServeDbError::Io { .. }));
        assert!(temp_files(dir.path()).is_empty());
    }

    #[test]
    fn test_missing_store_directory() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path().join("absent"));

        let err = persist_loaded(&layout, b"{}").unwrap_err();
        assert!(matches!(err, ServeDbError::Io { ref path, .. } if path == layout.root()));
    }
}
