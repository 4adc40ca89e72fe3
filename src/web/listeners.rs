use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::TcpListener;

const LISTEN_BACKLOG: i32 = 1024;

/// Binds the HTTP listener. `*` means every interface: an IPv6 dual-stack
/// socket when the host supports it, otherwise plain IPv4.
pub async fn create_listener(host: &str, port: u16) -> std::io::Result<(SocketAddr, TcpListener)> {
    if host != "*" {
        tracing::info!("Attempting to bind server to {}:{}...", host, port);
        let listener = TcpListener::bind((host, port)).await?;
        return Ok((listener.local_addr()?, listener));
    }

    let dual_stack = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));
    match bind_wildcard(dual_stack) {
        Ok(bound) => Ok(bound),
        Err(e) => {
            tracing::warn!("Failed to bind IPv6 listener ({}). Attempting IPv4 only.", e);
            bind_wildcard(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        }
    }
}

fn bind_wildcard(addr: SocketAddr) -> std::io::Result<(SocketAddr, TcpListener)> {
    tracing::info!("Attempting to bind server to {}...", addr);

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    if addr.is_ipv6() {
        // Some platforms refuse dual-stack; IPv6-only still serves.
        if let Err(e) = socket.set_only_v6(false) {
            tracing::warn!("Failed to enable dual-stack mode: {}. Continuing anyway.", e);
        }
    }

    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;

    let listener = TcpListener::from_std(socket.into())?;
    Ok((listener.local_addr()?, listener))
}
