use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Host value meaning "every interface".
pub const WILDCARD_HOST: &str = "*";

/// Binds the API listener. `*` listens on all interfaces, preferring an
/// IPv6 dual-stack socket and falling back to IPv4.
pub async fn create_listener(host: &str, port: u16) -> std::io::Result<(SocketAddr, TcpListener)> {
    if host == WILDCARD_HOST {
        return create_wildcard_listener(port);
    }

    let addr = format!("{}:{}", host, port);
    info!("Attempting to bind server to {}...", addr);

    let listener = TcpListener::bind(&addr).await?;
    Ok((listener.local_addr()?, listener))
}

fn create_wildcard_listener(port: u16) -> std::io::Result<(SocketAddr, TcpListener)> {
    let ipv6_addr = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));
    info!("Attempting to bind server to {}... (IPv6 + IPv4 dual-stack)", ipv6_addr);

    match bind_socket(ipv6_addr) {
        Ok(listener) => Ok((listener.local_addr()?, listener)),
        Err(e) => {
            warn!("Failed to bind IPv6 listener: {}. Attempting IPv4 only.", e);

            let ipv4_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
            info!("Attempting to bind server to {}... (IPv4)", ipv4_addr);

            let listener = bind_socket(ipv4_addr)?;
            Ok((listener.local_addr()?, listener))
        }
    }
}

fn bind_socket(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    if addr.is_ipv6() {
        // Some systems refuse dual-stack; an IPv6-only socket is still usable
        if let Err(e) = socket.set_only_v6(false) {
            warn!("Failed to set dual-stack mode for IPv6 socket: {}. Continuing anyway.", e);
        }
    }

    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;

    TcpListener::from_std(socket.into())
}
