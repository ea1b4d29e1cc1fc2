//! Hot-reloadable handler bundle.
//!
//! The build tool compiles request handlers into a relocatable bundle (a
//! dynamic library). The server never restarts for a rebuild: each request
//! asks [`HotBundle::current_handlers`] for the current registry, which
//! reloads the bundle only when its bytes actually changed.

mod hot;
mod loader;
mod registry;

pub use hot::HotBundle;
pub use loader::{BUNDLE_ENTRY_SYMBOL, BundleLoader, DylibLoader};
pub use registry::{Handler, HandlerRegistry, HandlerRequest, HandlerResponse};
