//! Listener setup (§6): one TCP socket or one Unix-domain socket, bound
//! non-blocking and handed to the accept thread as an `mio` source.
//!
//! Backlog is capped at `SOMAXCONN` (§6 "TCP backlog is capped at the OS
//! max", §11 supplemented feature: `min(configured tcp_backlog, SOMAXCONN)`)
//! via `socket2`, which the teacher's own workspace already carries as a
//! dependency for listener setup.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixListener as StdUnixListener;
#[cfg(unix)]
use std::path::Path;

use mio::event::Source;
use mio::{Interest, Registry, Token};
use socket2::{Domain, Socket as RawSocket, Type};
use tritedb_common::config::Listener as ListenerConfig;

use crate::connection::Socket;

pub enum AnyListener {
    Tcp(mio::net::TcpListener),
    #[cfg(unix)]
    Unix(mio::net::UnixListener),
}

impl AnyListener {
    /// Accepts one pending connection, wrapping it as the `Socket` the I/O
    /// pool already knows how to register and read/write.
    pub fn accept(&self) -> io::Result<Socket> {
        match self {
            AnyListener::Tcp(listener) => listener.accept().map(|(s, _addr)| Socket::Tcp(s)),
            #[cfg(unix)]
            AnyListener::Unix(listener) => listener.accept().map(|(s, _addr)| Socket::Unix(s)),
        }
    }

    /// The bound TCP address, useful when the configured port was `0` and
    /// the OS picked one (tests only bind this way; production config
    /// always names an explicit port).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            AnyListener::Tcp(listener) => listener.local_addr(),
            #[cfg(unix)]
            AnyListener::Unix(_) => Err(io::Error::new(io::ErrorKind::Unsupported, "unix listener has no socket address")),
        }
    }
}

impl Source for AnyListener {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            AnyListener::Tcp(l) => l.register(registry, token, interests),
            #[cfg(unix)]
            AnyListener::Unix(l) => l.register(registry, token, interests),
        }
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            AnyListener::Tcp(l) => l.reregister(registry, token, interests),
            #[cfg(unix)]
            AnyListener::Unix(l) => l.reregister(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            AnyListener::Tcp(l) => l.deregister(registry),
            #[cfg(unix)]
            AnyListener::Unix(l) => l.deregister(registry),
        }
    }
}

/// Binds the listener described by `config`, applying `tcp_backlog` to TCP
/// sockets (Unix-domain sockets use the platform default).
pub fn bind(config: &ListenerConfig, tcp_backlog: i32) -> io::Result<AnyListener> {
    match config {
        ListenerConfig::Tcp { addr, port } => {
            let sockaddr = resolve(addr, *port)?;
            Ok(AnyListener::Tcp(bind_tcp(sockaddr, tcp_backlog)?))
        }
        #[cfg(unix)]
        ListenerConfig::Unix { path } => Ok(AnyListener::Unix(bind_unix(path)?)),
        #[cfg(not(unix))]
        ListenerConfig::Unix { .. } => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "unix-domain sockets are not supported on this platform",
        )),
    }
}

fn resolve(addr: &str, port: u16) -> io::Result<SocketAddr> {
    if let Ok(ip) = addr.parse() {
        return Ok(SocketAddr::new(ip, port));
    }
    (addr, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, format!("could not resolve '{addr}'")))
}

fn bind_tcp(addr: SocketAddr, backlog: i32) -> io::Result<mio::net::TcpListener> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = RawSocket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(effective_backlog(backlog))?;
    socket.set_nonblocking(true)?;
    let std_listener: std::net::TcpListener = socket.into();
    mio::net::TcpListener::from_std(std_listener)
}

#[cfg(unix)]
fn bind_unix(path: &Path) -> io::Result<mio::net::UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let std_listener = StdUnixListener::bind(path)?;
    std_listener.set_nonblocking(true)?;
    Ok(mio::net::UnixListener::from_std(std_listener))
}

fn effective_backlog(configured: i32) -> i32 {
    configured.clamp(1, libc::SOMAXCONN as i32)
}
