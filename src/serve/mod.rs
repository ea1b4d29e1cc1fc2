//! Development server: bind, accept, dispatch.
//!
//! Startup order matters: singleton guard, port negotiation, bind, record
//! publication, coordinator thread, then the request loop. The record is on
//! disk before the first request is accepted, so external processes never
//! observe a serving-but-undiscoverable server.

mod response;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

use anyhow::{Context, Result};
use crossbeam::channel::{self, Sender};
use tiny_http::{Request, Server};

use crate::bundle::{DylibLoader, HandlerRequest, HotBundle};
use crate::config::ServerConfig;
use crate::coordinator::{Coordinator, RuntimeState};
use crate::error::ServerError;
use crate::record::ServerRecord;
use crate::{log, mailbox, port, record};

/// Shutdown has been requested (Stop command or Ctrl+C)
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// HTTP server reference for graceful shutdown
static SERVER: OnceLock<Arc<Server>> = OnceLock::new();

/// Shutdown signal sender for the coordinator thread
static SHUTDOWN_TX: OnceLock<Sender<()>> = OnceLock::new();

/// Setup the global Ctrl+C handler. Call once at program start, before any
/// blocking operation.
pub fn setup_shutdown_handler() -> Result<()> {
    ctrlc::set_handler(|| {
        if SERVER.get().is_none() {
            // Nothing bound yet; nothing to gracefully shut down
            std::process::exit(0);
        }
        log!("serve"; "shutting down...");
        request_shutdown();
    })
    .context("failed to set Ctrl+C handler")
}

/// Stop accepting connections and wake the coordinator.
///
/// Called from the Ctrl+C handler and from the coordinator once it reaches
/// its terminal state. Idempotent.
pub fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::SeqCst);
    if let Some(tx) = SHUTDOWN_TX.get() {
        let _ = tx.send(());
    }
    if let Some(server) = SERVER.get() {
        server.unblock();
    }
}

/// Check if shutdown has been requested
pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

/// Run the development server until stopped.
pub fn run_server(config: &ServerConfig) -> Result<()> {
    let environment = config.serve.environment;

    // Refuse to start while another live server owns this project
    record::guard_startup(&config.record_path(), &config.serve.interface.to_string())?;

    let port = port::negotiate(config.serve.interface, config.serve.port, environment)?;
    let addr = SocketAddr::new(config.serve.interface, port);
    let server = Server::http(addr)
        .map_err(|e| anyhow::anyhow!("failed to bind {addr}: {e}"))
        .map(Arc::new)?;

    let (shutdown_tx, shutdown_rx) = channel::unbounded::<()>();
    let _ = SERVER.set(Arc::clone(&server));
    let _ = SHUTDOWN_TX.set(shutdown_tx);

    // Publish the record only after the port is actually bound
    let server_record = ServerRecord::for_current_process(environment, port);
    record::write(&config.record_path(), &server_record)?;

    log!("serve"; "http://{} ({})", addr, environment);

    let state = Arc::new(RuntimeState::new());
    let bundle = Arc::new(HotBundle::new(config.bundle_path(), Box::new(DylibLoader)));

    let coordinator = Coordinator::new(
        config.mailbox_path(),
        config.record_path(),
        Arc::clone(&state),
    );
    let coordinator_handle = thread::spawn(move || coordinator.run(&shutdown_rx));

    run_request_loop(&server, &state, &bundle);
    wait_for_coordinator(coordinator_handle);
    Ok(())
}

fn run_request_loop(server: &Server, state: &Arc<RuntimeState>, bundle: &Arc<HotBundle>) {
    // Thread pool keeps a slow handler from blocking other requests
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .expect("failed to create thread pool");

    for request in server.incoming_requests() {
        let state = Arc::clone(state);
        let bundle = Arc::clone(bundle);
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &state, &bundle) {
                log!("serve"; "request error: {e}");
            }
        });
    }
}

/// Wait for the coordinator to finish its cleanup (max 2 seconds).
fn wait_for_coordinator(handle: thread::JoinHandle<()>) {
    for _ in 0..40 {
        if handle.is_finished() {
            let _ = handle.join();
            return;
        }
        thread::sleep(std::time::Duration::from_millis(50));
    }
}

/// Handle a single HTTP request
fn handle_request(request: Request, state: &RuntimeState, bundle: &HotBundle) -> Result<()> {
    // Early exit if shutdown requested
    if is_shutdown() {
        return response::respond_unavailable(request);
    }

    let path = request_path(request.url());

    // Runtime snapshot for live-reload/status clients
    if path == "/api/status" {
        return response::respond_status(request, &state.snapshot());
    }

    // Every dispatch re-checks the bundle; unchanged bytes short-circuit
    match bundle.current_handlers() {
        Ok(registry) => match registry.get(path) {
            Some(handler) => {
                let handler_request = HandlerRequest {
                    method: request.method().as_str(),
                    path,
                };
                let handler_response = handler.handle(&handler_request);
                response::respond_handler(request, handler_response)
            }
            None => response::respond_not_found(request),
        },
        Err(e @ ServerError::BundleUnavailable { .. }) => response::respond_waiting(request, &e),
        Err(e) => response::respond_reload_error(request, &e),
    }
}

/// Strip the query string from a request URL.
fn request_path(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// Enqueue a command addressed to the server owning this project directory.
///
/// Used by the short-lived CLI subcommands; the running server is not
/// required to exist (the command waits in the mailbox until one drains it).
pub fn send_command(config: &ServerConfig, command: &mailbox::Command) -> Result<()> {
    mailbox::enqueue(&config.mailbox_path(), command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_path_strips_query() {
        assert_eq!(request_path("/page?reload=1"), "/page");
        assert_eq!(request_path("/page"), "/page");
        assert_eq!(request_path("/"), "/");
    }
}
