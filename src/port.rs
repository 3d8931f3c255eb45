//! Loopback port allocation for the backend server.

use crate::error::PortError;

/// Pick the port the backend will listen on.
///
/// `0` asks the OS for a free ephemeral port; any other value is checked by
/// binding it once. The listener is dropped before returning, so the port is
/// only known to be free at the moment of the check. No retries: the caller
/// decides whether to ask the user for another port.
pub async fn acquire(requested: u16) -> Result<u16, PortError> {
    let addr = format!("127.0.0.1:{requested}");

    match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => {
            let port = listener
                .local_addr()
                .map_err(|source| PortError::Bind {
                    port: requested,
                    source,
                })?
                .port();
            drop(listener);
            log::debug!("Port {port} is available");
            Ok(port)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            Err(PortError::AddressInUse(requested))
        }
        Err(source) => Err(PortError::Bind {
            port: requested,
            source,
        }),
    }
}
