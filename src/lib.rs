//! Drydock - development server core for web build tools.
//!
//! One long-lived server process per project directory, commanded by
//! short-lived build/CLI invocations through on-disk files (no sockets, no
//! daemon RPC), serving requests through a hot-reloadable bundle of
//! compiled handlers.
//!
//! Handler bundles link against this crate for the [`bundle`] types and
//! export the factory entry point described at
//! [`bundle::BUNDLE_ENTRY_SYMBOL`].

pub mod bundle;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod freshness;
pub mod logger;
pub mod mailbox;
pub mod port;
pub mod record;
pub mod serve;
