//! Reload-on-change cache around the bundle file.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use super::{BundleLoader, HandlerRegistry};
use crate::error::ServerError;
use crate::freshness::TrackedFile;
use crate::log;

struct BundleCache {
    /// The exact bytes instance the registry was built from. Instance
    /// identity (not content equality) is the fast-path check.
    last_seen: Arc<[u8]>,
    registry: Arc<HandlerRegistry>,
}

/// Wraps the bundle file and rebuilds the handler registry only when the
/// bundle's bytes change.
///
/// Callable concurrently with request dispatch. Several dispatches racing a
/// rebuild may load the same bytes more than once; rebuilds happen only on
/// developer rebuilds and are idempotent apart from the wasted load, so no
/// rebuild mutex is held.
pub struct HotBundle {
    tracked: TrackedFile,
    loader: Box<dyn BundleLoader>,
    cache: ArcSwapOption<BundleCache>,
}

impl HotBundle {
    pub fn new(path: impl Into<std::path::PathBuf>, loader: Box<dyn BundleLoader>) -> Self {
        Self {
            tracked: TrackedFile::new(path),
            loader,
            cache: ArcSwapOption::empty(),
        }
    }

    /// The bundle path on disk.
    pub fn path(&self) -> &Path {
        self.tracked.path()
    }

    /// The current handler registry, rebuilding it first if the bundle
    /// changed.
    ///
    /// An absent bundle is a definite error: the build has not produced
    /// output yet, and a stale cache must not mask that. A failed reload
    /// propagates while the previously loaded registry stays cached, so a
    /// bad rebuild never takes down already-working handlers.
    pub fn current_handlers(&self) -> Result<Arc<HandlerRegistry>, ServerError> {
        let Some(bytes) = self.tracked.current() else {
            return Err(ServerError::BundleUnavailable {
                path: self.path().to_path_buf(),
            });
        };

        // Fast path: same bytes instance the cached registry was built from
        if let Some(cache) = self.cache.load_full()
            && Arc::ptr_eq(&cache.last_seen, &bytes)
        {
            return Ok(Arc::clone(&cache.registry));
        }

        let registry = self.loader.load(&bytes).map_err(|e| {
            ServerError::ReloadFailure {
                path: self.path().to_path_buf(),
                reason: format!("{e:#}"),
            }
        })?;
        let registry = Arc::new(registry);
        log!("bundle"; "loaded handler bundle ({} route(s))", registry.len());

        self.cache.store(Some(Arc::new(BundleCache {
            last_seen: bytes,
            registry: Arc::clone(&registry),
        })));
        Ok(registry)
    }
}
