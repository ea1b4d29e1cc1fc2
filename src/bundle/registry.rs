//! Request handler registry.

use std::sync::Arc;

use libloading::Library;
use rustc_hash::FxHashMap;
use tempfile::NamedTempFile;

/// A request as seen by bundle handlers.
#[derive(Debug, Clone, Copy)]
pub struct HandlerRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
}

/// A response produced by a bundle handler.
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl HandlerResponse {
    pub fn html(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8".to_string(),
            body: body.into(),
        }
    }

    pub fn text(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: "text/plain; charset=utf-8".to_string(),
            body: body.into(),
        }
    }

    pub fn json(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: "application/json".to_string(),
            body: body.into(),
        }
    }
}

/// A single request handler exported by a bundle.
pub trait Handler: Send + Sync {
    fn handle(&self, request: &HandlerRequest<'_>) -> HandlerResponse;
}

/// Route table produced by a bundle's factory entry point.
///
/// The registry owns the loaded code that backs its handlers. Callers
/// receive it behind an `Arc` and must never mutate it; a rebuild replaces
/// the whole registry instead.
pub struct HandlerRegistry {
    // Field order is load-bearing: handlers drop before the library they
    // were loaded from, and the library unloads before its backing file is
    // removed.
    routes: FxHashMap<String, Arc<dyn Handler>>,
    _library: Option<Library>,
    _bundle_file: Option<NamedTempFile>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            routes: FxHashMap::default(),
            _library: None,
            _bundle_file: None,
        }
    }

    /// Register a handler for an exact request path.
    pub fn insert(&mut self, route: impl Into<String>, handler: Arc<dyn Handler>) {
        self.routes.insert(route.into(), handler);
    }

    /// Look up the handler for a request path.
    pub fn get(&self, path: &str) -> Option<&Arc<dyn Handler>> {
        self.routes.get(path)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered routes, for diagnostics.
    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Attach the loaded code objects backing this registry's handlers.
    pub(crate) fn attach_code(&mut self, bundle_file: NamedTempFile, library: Library) {
        self._bundle_file = Some(bundle_file);
        self._library = Some(library);
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("loaded", &self._library.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl Handler for Fixed {
        fn handle(&self, _request: &HandlerRequest<'_>) -> HandlerResponse {
            HandlerResponse::text(self.0)
        }
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = HandlerRegistry::new();
        registry.insert("/hello", Arc::new(Fixed("hi")));

        assert_eq!(registry.len(), 1);
        assert!(registry.get("/hello").is_some());
        assert!(registry.get("/missing").is_none());

        let request = HandlerRequest {
            method: "GET",
            path: "/hello",
        };
        let response = registry.get("/hello").unwrap().handle(&request);
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"hi");
    }

    #[test]
    fn test_empty_registry() {
        let registry = HandlerRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.routes().count(), 0);
    }
}
