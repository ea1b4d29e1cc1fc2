//! HTTP response helpers.

use anyhow::Result;
use tiny_http::{Header, Request, Response, StatusCode};

use crate::bundle::HandlerResponse;
use crate::coordinator::RuntimeSnapshot;
use crate::error::ServerError;

const HTML: &str = "text/html; charset=utf-8";
const PLAIN: &str = "text/plain; charset=utf-8";
const JSON: &str = "application/json";

/// Respond with whatever a bundle handler produced.
pub fn respond_handler(request: Request, response: HandlerResponse) -> Result<()> {
    let header = Header::from_bytes("Content-Type", response.content_type.as_bytes())
        .unwrap_or_else(|_| make_header("Content-Type", PLAIN));
    let http = Response::from_data(response.body)
        .with_status_code(StatusCode(response.status))
        .with_header(header);
    request.respond(http)?;
    Ok(())
}

/// Respond with the current runtime snapshot as JSON.
///
/// `Instant` deadlines are reported as remaining milliseconds so clients
/// need no clock agreement with the server.
pub fn respond_status(request: Request, snapshot: &RuntimeSnapshot) -> Result<()> {
    let now = std::time::Instant::now();
    let expires_in_ms = snapshot
        .status
        .expires_at
        .map(|at| at.saturating_duration_since(now).as_millis() as u64);

    let body = serde_json::json!({
        "version": snapshot.version,
        "status": {
            "text": snapshot.status.text,
            "is_error": snapshot.status.is_error,
            "expires_in_ms": expires_in_ms,
        },
        "broadcast_enabled": snapshot.broadcast_enabled,
    });
    send_body(request, 200, JSON, body.to_string().into_bytes())
}

/// Respond with 404 for a path no handler claims.
pub fn respond_not_found(request: Request) -> Result<()> {
    send_body(request, 404, PLAIN, b"404 Not Found".to_vec())
}

/// Respond with 503 Service Unavailable (server shutting down).
pub fn respond_unavailable(request: Request) -> Result<()> {
    send_body(request, 503, PLAIN, b"503 Service Unavailable".to_vec())
}

/// Respond with 503 while the build has not produced a handler bundle yet.
pub fn respond_waiting(request: Request, error: &ServerError) -> Result<()> {
    let body = format!(
        "<html><body><h1>Waiting for build output</h1><p>{error}</p>\
         <script>setTimeout(function(){{location.reload();}}, 1000);</script></body></html>"
    );
    send_body(request, 503, HTML, body.into_bytes())
}

/// Respond with 500 carrying the reload error, so the developer sees what
/// broke without switching to the terminal.
pub fn respond_reload_error(request: Request, error: &ServerError) -> Result<()> {
    let msg = escape_html(&error.to_string());
    let body = format!("<html><body><h1>Handler reload failed</h1><pre>{msg}</pre></body></html>");
    send_body(request, 500, HTML, body.into_bytes())
}

fn send_body(request: Request, status: u16, content_type: &'static str, body: Vec<u8>) -> Result<()> {
    let response = Response::from_data(body)
        .with_status_code(StatusCode(status))
        .with_header(make_header("Content-Type", content_type));
    request.respond(response)?;
    Ok(())
}

fn make_header(key: &'static str, value: &'static str) -> Header {
    Header::from_bytes(key, value).expect("static header is valid")
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
