//! Single-instance guard.
//!
//! Binds a localhost TCP port and keeps it for the life of the process; a
//! second copy fails to bind and knows one is already running.

use std::io;
use std::net::{Ipv4Addr, TcpListener};

use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error("another instance is already running (port {0} in use)")]
    AlreadyRunning(u16),

    #[error("instance check failed: {0}")]
    Io(#[from] io::Error),
}

/// Held until the process exits.
pub struct InstanceGuard {
    listener: TcpListener,
}

impl InstanceGuard {
    pub fn acquire(port: u16) -> Result<Self, InstanceError> {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
            Ok(listener) => {
                debug!("Holding instance port {port}");
                Ok(Self {
                    listener,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                Err(InstanceError::AlreadyRunning(port))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn port(&self) -> Option<u16> {
        self.listener.local_addr().ok().map(|a| a.port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_guard_on_same_port_fails() {
        // Port 0 picks a free port; then claim that exact port again.
        let first = InstanceGuard::acquire(0).unwrap();
        let port = first.port().unwrap();

        let second = InstanceGuard::acquire(port);
        assert!(matches!(second, Err(InstanceError::AlreadyRunning(p)) if p == port));

        drop(first);
        assert!(InstanceGuard::acquire(port).is_ok());
    }
}
