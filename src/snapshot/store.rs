//! On-disk snapshot layout
//!
//! ```text
//! <snapshot_dir>/
//!     img<camera><serial>_<DD_MM_YYYY>T<HH_MM_SS>.jpg
//!     labels/        populated by the detection side, never by us
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::identity::FrameIdentity;

/// Subdirectory reserved for detection labels
pub const LABELS_DIR: &str = "labels";

#[derive(Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Open `dir`, creating it and its `labels/` subdirectory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let store = Self { dir: dir.into() };
        store.create_layout()?;
        Ok(store)
    }

    fn create_layout(&self) -> io::Result<()> {
        fs::create_dir_all(self.dir.join(LABELS_DIR))?;
        debug!("Snapshot directory {} ready", self.dir.display());
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, identity: &FrameIdentity) -> PathBuf {
        self.dir.join(identity.file_name())
    }

    /// Write a snapshot body under its identity.
    ///
    /// The body goes to a hidden temp file first and is renamed into place,
    /// so the `.jpg` is never visible half-written. An identity that is
    /// already stored is refused with [`io::ErrorKind::AlreadyExists`].
    pub fn write(&self, identity: &FrameIdentity, jpeg: &[u8]) -> io::Result<PathBuf> {
        let path = self.path_of(identity);
        if path.try_exists()? {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("snapshot {} already stored", identity),
            ));
        }
        let tmp = self.dir.join(format!(".{}.part", identity.file_name()));
        if let Err(e) = fs::write(&tmp, jpeg).and_then(|()| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(path)
    }

    /// All stored identities, optionally for one camera, in name order.
    pub fn list(&self, camera_id: Option<&str>) -> io::Result<Vec<FrameIdentity>> {
        let mut identities = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(identity) = name.to_str().and_then(FrameIdentity::parse) else {
                continue;
            };
            if camera_id.map_or(true, |id| identity.camera_id() == id) {
                identities.push(identity);
            }
        }
        identities.sort_by_cached_key(|id| id.to_string());
        Ok(identities)
    }

    /// Number of snapshots stored for `camera_id`.
    pub fn count(&self, camera_id: &str) -> io::Result<usize> {
        Ok(self.list(Some(camera_id))?.len())
    }

    /// Resolve an identity string (with or without `.jpg`) to a stored file.
    pub fn find(&self, identity: &str) -> Option<PathBuf> {
        let identity = FrameIdentity::parse(identity)?;
        let path = self.path_of(&identity);
        path.is_file().then_some(path)
    }

    /// Delete every snapshot and label, leaving an empty layout behind.
    pub fn wipe(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.create_layout()?;
        info!("Wiped snapshot directory {}", self.dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn identity(camera: &str, serial: u32) -> FrameIdentity {
        let t = NaiveDate::from_ymd_opt(2022, 11, 20)
            .unwrap()
            .and_hms_opt(2, 54, 24)
            .unwrap();
        FrameIdentity::new(camera, serial, t)
    }

    #[test]
    fn open_creates_labels_dir() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::open(tmp.path().join("input_data")).unwrap();
        assert!(store.dir().join(LABELS_DIR).is_dir());
    }

    #[test]
    fn write_leaves_only_the_final_file() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::open(tmp.path()).unwrap();
        let path = store.write(&identity("0001", 23), b"jpeg").unwrap();

        assert_eq!(
            path.file_name().unwrap(),
            "img00010000023_20_11_2022T02_54_24.jpg"
        );
        assert_eq!(fs::read(&path).unwrap(), b"jpeg");
        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 2, "{names:?}");
    }

    #[test]
    fn write_never_replaces_a_stored_snapshot() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::open(tmp.path()).unwrap();
        let id = identity("0002", 0);
        let path = store.write(&id, b"first").unwrap();

        let err = store.write(&id, b"second").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&path).unwrap(), b"first");
        assert_eq!(store.count("0002").unwrap(), 1);
    }

    #[test]
    fn list_and_count_filter_by_camera() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::open(tmp.path()).unwrap();
        for serial in [2, 0, 1] {
            store.write(&identity("0001", serial), b"x").unwrap();
        }
        store.write(&identity("0002", 0), b"x").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"ignored").unwrap();

        let serials: Vec<u32> = store
            .list(Some("0001"))
            .unwrap()
            .iter()
            .map(FrameIdentity::serial)
            .collect();
        assert_eq!(serials, vec![0, 1, 2]);
        assert_eq!(store.count("0002").unwrap(), 1);
        assert_eq!(store.list(None).unwrap().len(), 4);
    }

    #[test]
    fn find_resolves_stored_identities() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::open(tmp.path()).unwrap();
        let id = identity("0003", 9);
        let path = store.write(&id, b"x").unwrap();

        assert_eq!(store.find(&id.to_string()), Some(path.clone()));
        assert_eq!(store.find(&id.file_name()), Some(path));
        assert_eq!(store.find(&identity("0003", 10).to_string()), None);
        assert_eq!(store.find("../etc/passwd"), None);
    }

    #[test]
    fn wipe_recreates_empty_layout() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::open(tmp.path().join("data")).unwrap();
        store.write(&identity("0001", 0), b"x").unwrap();
        fs::write(store.dir().join(LABELS_DIR).join("a.txt"), b"0 0.5").unwrap();

        store.wipe().unwrap();
        assert_eq!(store.count("0001").unwrap(), 0);
        assert!(store.dir().join(LABELS_DIR).is_dir());
        assert_eq!(fs::read_dir(store.dir().join(LABELS_DIR)).unwrap().count(), 0);
    }
}
