//! Cached single-file reads keyed by a change signature.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

use super::ContentHash;

/// Signature of a file's last-observed state.
///
/// mtime + length act as a cheap prefilter; the content hash confirms a
/// real change, so a rewrite with identical bytes does not count as one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSignature {
    /// File does not exist (or vanished mid-read).
    Absent,
    /// File exists with the given stat signature and content hash.
    Present {
        mtime: Option<SystemTime>,
        len: u64,
        hash: ContentHash,
    },
}

struct Cached {
    sig: ChangeSignature,
    bytes: Option<Arc<[u8]>>,
}

/// Read wrapper around a single path that returns the same cached bytes
/// instance until the file's signature changes.
///
/// Callers rely on instance identity (`Arc::ptr_eq`) to skip work when the
/// content is unchanged, so the cached `Arc` is handed back as-is on the
/// fast path.
pub struct TrackedFile {
    path: PathBuf,
    cache: Mutex<Option<Cached>>,
}

impl TrackedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// The tracked path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file content, or `None` if the file is absent.
    ///
    /// Transient read errors (file deleted mid-read) are treated as absent,
    /// not as fatal errors; callers must tolerate flapping.
    pub fn current(&self) -> Option<Arc<[u8]>> {
        let mut cache = self.cache.lock();

        let Ok(meta) = fs::metadata(&self.path) else {
            *cache = Some(Cached {
                sig: ChangeSignature::Absent,
                bytes: None,
            });
            return None;
        };
        let mtime = meta.modified().ok();
        let len = meta.len();

        // Fast path: stat signature unchanged, skip the read entirely
        if let Some(cached) = cache.as_ref()
            && let ChangeSignature::Present {
                mtime: cached_mtime,
                len: cached_len,
                ..
            } = cached.sig
            && cached_mtime == mtime
            && cached_len == len
        {
            return cached.bytes.clone();
        }

        let Ok(bytes) = fs::read(&self.path) else {
            // Vanished between stat and read
            *cache = Some(Cached {
                sig: ChangeSignature::Absent,
                bytes: None,
            });
            return None;
        };
        let hash = ContentHash::of(&bytes);
        let sig = ChangeSignature::Present { mtime, len, hash };

        // Touched but byte-identical: refresh the stat signature, keep the
        // cached instance so identity comparison still short-circuits
        if let Some(cached) = cache.as_mut()
            && let ChangeSignature::Present {
                hash: cached_hash, ..
            } = cached.sig
            && cached_hash == hash
            && cached.bytes.is_some()
        {
            cached.sig = sig;
            return cached.bytes.clone();
        }

        let bytes: Arc<[u8]> = Arc::from(bytes);
        *cache = Some(Cached {
            sig,
            bytes: Some(Arc::clone(&bytes)),
        });
        Some(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_absent_file() {
        let dir = TempDir::new().unwrap();
        let tracked = TrackedFile::new(dir.path().join("missing.bin"));
        assert!(tracked.current().is_none());
        assert!(tracked.current().is_none());
    }

    #[test]
    fn test_same_instance_when_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.bin");
        fs::write(&path, b"content").unwrap();

        let tracked = TrackedFile::new(&path);
        let first = tracked.current().unwrap();
        let second = tracked.current().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(&*first, b"content");
    }

    #[test]
    fn test_new_bytes_on_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.bin");
        fs::write(&path, b"one").unwrap();

        let tracked = TrackedFile::new(&path);
        let first = tracked.current().unwrap();

        fs::write(&path, b"two!").unwrap();
        let second = tracked.current().unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(&*second, b"two!");
        // The old instance is still valid for holders of a prior reference
        assert_eq!(&*first, b"one");
    }

    #[test]
    fn test_transition_absent_to_present_and_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.bin");

        let tracked = TrackedFile::new(&path);
        assert!(tracked.current().is_none());

        fs::write(&path, b"appeared").unwrap();
        let bytes = tracked.current().unwrap();
        assert_eq!(&*bytes, b"appeared");

        fs::remove_file(&path).unwrap();
        assert!(tracked.current().is_none());
    }

    #[test]
    fn test_rewrite_with_identical_bytes_keeps_instance() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.bin");
        fs::write(&path, b"same").unwrap();

        let tracked = TrackedFile::new(&path);
        let first = tracked.current().unwrap();

        // Rewrite with identical content; mtime may or may not change
        fs::write(&path, b"same").unwrap();
        let second = tracked.current().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }
}
