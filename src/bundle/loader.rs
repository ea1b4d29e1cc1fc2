//! Bundle loading: bytes in, handler registry out.
//!
//! The default loader treats the bundle as a dynamic library and performs
//! one isolated load per reload: every changed bundle is materialized under
//! a fresh unique path and opened as a brand-new [`Library`], so symbols
//! from one reload never collide with or shadow a previous reload's. The
//! old library stays mapped for as long as any caller still holds the
//! registry it produced.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, ensure};
use libloading::{Library, Symbol};

use super::HandlerRegistry;

/// Exported factory symbol every handler bundle must define:
///
/// ```ignore
/// #[unsafe(no_mangle)]
/// pub extern "C" fn drydock_bundle_entry() -> *mut HandlerRegistry {
///     let mut registry = HandlerRegistry::new();
///     registry.insert("/", Arc::new(Index));
///     Box::into_raw(Box::new(registry))
/// }
/// ```
///
/// The registry crosses the library boundary by raw pointer, so bundles
/// must be built with the same compiler and drydock version as the server.
pub const BUNDLE_ENTRY_SYMBOL: &str = "drydock_bundle_entry";

type BundleEntryFn = unsafe extern "C" fn() -> *mut HandlerRegistry;

/// Turns bundle bytes into a handler registry.
///
/// A trait seam so the cache logic in [`super::HotBundle`] is testable
/// without compiling real dynamic libraries.
pub trait BundleLoader: Send + Sync {
    fn load(&self, bytes: &Arc<[u8]>) -> Result<HandlerRegistry>;
}

/// Production loader: materialize, dlopen, resolve the entry point.
pub struct DylibLoader;

impl BundleLoader for DylibLoader {
    fn load(&self, bytes: &Arc<[u8]>) -> Result<HandlerRegistry> {
        // Materialize under a unique name: the source file may be rewritten
        // by the build tool while the mapped copy must stay stable.
        let mut file = tempfile::Builder::new()
            .prefix("drydock-bundle-")
            .suffix(std::env::consts::DLL_SUFFIX)
            .tempfile()
            .context("failed to create bundle staging file")?;
        file.write_all(bytes)
            .and_then(|()| file.flush())
            .context("failed to stage bundle bytes")?;

        let library = unsafe { Library::new(file.path()) }
            .context("failed to load bundle as a dynamic library")?;

        let raw = {
            let entry: Symbol<BundleEntryFn> = unsafe {
                library
                    .get(BUNDLE_ENTRY_SYMBOL.as_bytes())
                    .with_context(|| format!("bundle does not export `{BUNDLE_ENTRY_SYMBOL}`"))?
            };
            unsafe { entry() }
        };
        ensure!(!raw.is_null(), "bundle entry point returned null");

        let mut registry = *unsafe { Box::from_raw(raw) };
        registry.attach_code(file, library);
        Ok(registry)
    }
}
