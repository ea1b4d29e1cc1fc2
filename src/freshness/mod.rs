//! Change detection: content-hash (blake3) signatures with an mtime prefilter.

mod hash;
mod tracked;

pub use hash::ContentHash;
pub use tracked::{ChangeSignature, TrackedFile};
