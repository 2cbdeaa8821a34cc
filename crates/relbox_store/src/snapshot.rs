//! Snapshot files for [`MemoryBackend`](crate::MemoryBackend).
//!
//! File layout:
//!
//! ```text
//! | "RBXS" | u16 version (LE) | CBOR-encoded tables |
//! ```

use crate::error::{StoreError, StoreResult};
use crate::tables::Tables;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for snapshot files.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"RBXS";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Writes `tables` to `path` atomically.
///
/// The data goes to a sibling temporary file which is synced and then
/// renamed over `path`.
///
/// # Errors
///
/// Returns `Io` or `Snapshot` on failure.
pub fn write_snapshot(path: &Path, tables: &Tables) -> StoreResult<()> {
    let temp_path = temp_path_for(path);
    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&SNAPSHOT_MAGIC)?;
        writer.write_all(&SNAPSHOT_VERSION.to_le_bytes())?;
        ciborium::into_writer(tables, &mut writer)
            .map_err(|e| StoreError::snapshot(format!("encode failed: {e}")))?;
        let file = writer
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)?;
    sync_parent(path)?;

    tracing::debug!(path = %path.display(), "snapshot written");
    Ok(())
}

/// Reads tables from a snapshot file.
///
/// # Errors
///
/// Returns `Io` if the file cannot be read, `Snapshot` if the magic,
/// version or body is invalid.
pub fn read_snapshot(path: &Path) -> StoreResult<Tables> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|_| StoreError::snapshot("file too short"))?;
    if magic != SNAPSHOT_MAGIC {
        return Err(StoreError::snapshot(format!("bad magic {magic:?}")));
    }

    let mut version = [0u8; 2];
    reader
        .read_exact(&mut version)
        .map_err(|_| StoreError::snapshot("file too short"))?;
    let version = u16::from_le_bytes(version);
    if version != SNAPSHOT_VERSION {
        return Err(StoreError::snapshot(format!(
            "unsupported snapshot version {version}, expected {SNAPSHOT_VERSION}"
        )));
    }

    let tables: Tables = ciborium::from_reader(reader)
        .map_err(|e| StoreError::snapshot(format!("decode failed: {e}")))?;
    validate(&tables)?;

    tracing::debug!(path = %path.display(), types = tables.entities.len(), "snapshot read");
    Ok(tables)
}

fn validate(tables: &Tables) -> StoreResult<()> {
    for (entity_type, table) in &tables.entities {
        if let Some((&max, _)) = table.rows.last_key_value() {
            if max > table.last_id {
                return Err(StoreError::corrupted(format!(
                    "type {entity_type}: row id {max} beyond last id {}",
                    table.last_id
                )));
            }
        }
        if table.rows.contains_key(&0) {
            return Err(StoreError::corrupted(format!(
                "type {entity_type}: row with id 0"
            )));
        }
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> StoreResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    fn sample() -> Tables {
        let mut tables = Tables::default();
        let id = tables.next_id(1, 0);
        tables.put(1, id, Bytes::from_static(b"record"));
        tables.add_link(9, id, 42);
        tables
    }

    #[test]
    fn write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.rbx");
        let tables = sample();

        write_snapshot(&path, &tables).unwrap();
        assert_eq!(read_snapshot(&path).unwrap(), tables);
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn overwrite_replaces_previous() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.rbx");
        write_snapshot(&path, &sample()).unwrap();
        write_snapshot(&path, &Tables::default()).unwrap();
        assert_eq!(read_snapshot(&path).unwrap(), Tables::default());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bogus");
        fs::write(&path, b"NOPE\x01\x00").unwrap();
        assert!(matches!(read_snapshot(&path), Err(StoreError::Snapshot(_))));
    }

    #[test]
    fn future_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("future");
        let mut data = SNAPSHOT_MAGIC.to_vec();
        data.extend_from_slice(&99u16.to_le_bytes());
        fs::write(&path, data).unwrap();
        let err = read_snapshot(&path).unwrap_err();
        assert!(err.to_string().contains("99"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            read_snapshot(&dir.path().join("absent")),
            Err(StoreError::Io(_))
        ));
    }
}
