//! Port negotiation at startup.
//!
//! Development probes successive ports so a second project (or a lingering
//! process) never blocks local work. Production binds exactly the configured
//! port: silently picking an alternate would make deployments
//! non-reproducible, so an occupied port is a startup failure there.

use std::net::{IpAddr, SocketAddr, TcpListener};

use crate::config::Environment;
use crate::error::ServerError;
use crate::log;

/// Maximum number of ports probed in development.
pub const MAX_PORT_PROBES: u16 = 64;

/// Decide which port the server will bind.
///
/// The chosen port is verified with a bind-and-drop test socket; the actual
/// server bind happens immediately after, so another process grabbing the
/// port in between surfaces as a bind error there.
pub fn negotiate(
    interface: IpAddr,
    base_port: u16,
    environment: Environment,
) -> Result<u16, ServerError> {
    match environment {
        Environment::Development => probe_from(interface, base_port),
        Environment::Production => {
            if port_is_free(interface, base_port) {
                Ok(base_port)
            } else {
                Err(ServerError::PortInUse { port: base_port })
            }
        }
    }
}

/// Probe successive ports starting at `base_port`, returning the first free
/// one.
fn probe_from(interface: IpAddr, base_port: u16) -> Result<u16, ServerError> {
    let mut last = base_port;
    for offset in 0..MAX_PORT_PROBES {
        let Some(port) = base_port.checked_add(offset) else {
            break;
        };
        last = port;
        if port_is_free(interface, port) {
            if offset > 0 {
                log!("serve"; "port {} in use, using {} instead", base_port, port);
            }
            return Ok(port);
        }
    }
    Err(ServerError::NoFreePort {
        start: base_port,
        end: last,
    })
}

/// Bind-and-immediately-release a test socket.
fn port_is_free(interface: IpAddr, port: u16) -> bool {
    TcpListener::bind(SocketAddr::new(interface, port)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

    /// Grab an ephemeral port and keep it occupied.
    fn occupy_port() -> (TcpListener, u16) {
        let listener = TcpListener::bind((LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn test_development_uses_free_base_port() {
        // Bind-and-release to learn a port that is (almost certainly) free
        let port = {
            let (listener, port) = occupy_port();
            drop(listener);
            port
        };
        let negotiated = negotiate(LOCALHOST, port, Environment::Development).unwrap();
        assert_eq!(negotiated, port);
    }

    #[test]
    fn test_development_probes_past_occupied_port() {
        let (_held, port) = occupy_port();

        let negotiated = negotiate(LOCALHOST, port, Environment::Development).unwrap();
        assert_ne!(negotiated, port);
        assert!(negotiated > port);
        assert!(negotiated < port.saturating_add(MAX_PORT_PROBES));
        // The negotiated port is actually bindable
        assert!(port_is_free(LOCALHOST, negotiated));
    }

    #[test]
    fn test_production_refuses_occupied_port() {
        let (_held, port) = occupy_port();

        let err = negotiate(LOCALHOST, port, Environment::Production).unwrap_err();
        match err {
            ServerError::PortInUse { port: reported } => assert_eq!(reported, port),
            other => panic!("expected PortInUse, got {other}"),
        }
    }

    #[test]
    fn test_production_uses_free_port() {
        let port = {
            let (listener, port) = occupy_port();
            drop(listener);
            port
        };
        let negotiated = negotiate(LOCALHOST, port, Environment::Production).unwrap();
        assert_eq!(negotiated, port);
    }
}
