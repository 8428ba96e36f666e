//! A real socket round-trip through the full reactor (§4.6): accept thread,
//! I/O pool, worker pool, and the framing read loop in `connection.rs`, all
//! exercised end to end over an OS-assigned loopback TCP port and (on unix)
//! a temp-directory Unix-domain socket -- everything `dispatcher_scenarios.rs`
//! bypasses by calling `dispatch` directly.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use pretty_assertions::assert_eq;

use tritedb_common::config::{Config, Listener};
use tritedb_protocol::{encode_request, try_decode_response, Request, Response};
use tritedb_server::engine::Engine;
use tritedb_server::{listener as listener_mod, reactor};

fn connect_with_retry(addr: std::net::SocketAddr) -> TcpStream {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => return stream,
            Err(e) if Instant::now() < deadline => {
                let _ = e;
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => panic!("could not connect to reactor listener: {e}"),
        }
    }
}

fn read_one_response(stream: &mut impl Read) -> Response {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        if let Ok(Some((_, response))) = try_decode_response(&buf, u64::MAX) {
            return response;
        }
        let n = stream.read(&mut chunk).expect("read reply");
        assert!(n > 0, "connection closed before a full reply arrived");
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[test]
fn tcp_round_trip_through_the_full_reactor() {
    let config = Config::default();
    let bound = listener_mod::bind(
        &Listener::Tcp { addr: "127.0.0.1".to_string(), port: 0 },
        config.tcp_backlog,
    )
    .expect("bind an ephemeral loopback port");
    let addr = bound.local_addr().expect("bound listener has a local address");

    let engine = Arc::new(Engine::new(config));
    let stop = Arc::new(AtomicBool::new(false));

    let reactor_stop = stop.clone();
    let handle = thread::spawn(move || {
        reactor::run_with_listener(engine, bound, reactor_stop, 1, 1).expect("reactor run");
    });

    let mut stream = connect_with_retry(addr);
    stream.set_nodelay(true).ok();

    let mut out = BytesMut::new();
    encode_request(
        &mut out,
        &Request::Put { prefix: false, ttl: -1, key: b"hello".to_vec(), value: b"world".to_vec() },
    );
    stream.write_all(&out).expect("write PUT over the wire");
    assert_eq!(read_one_response(&mut stream), Response::ack(true));

    let mut out = BytesMut::new();
    encode_request(&mut out, &Request::Get { prefix: false, key: b"hello".to_vec() });
    stream.write_all(&out).expect("write GET over the wire");
    match read_one_response(&mut stream) {
        Response::Tuple(tuple) => {
            assert_eq!(tuple.ttl, -1);
            assert_eq!(tuple.key, b"hello");
            assert_eq!(tuple.value, b"world");
        }
        other => panic!("expected a tuple reply, got {other:?}"),
    }

    drop(stream);
    stop.store(true, Ordering::Relaxed);
    handle.join().expect("reactor thread panicked");
}

/// Same round-trip, over a Unix-domain socket at a `tempfile`-managed path
/// (SPEC_FULL §10.5: "`tempfile` ... for Unix socket path tests").
#[cfg(unix)]
#[test]
fn unix_socket_round_trip_through_the_full_reactor() {
    use std::os::unix::net::UnixStream;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tritedb.sock");

    let config = Config::default();
    let bound = listener_mod::bind(&Listener::Unix { path: path.clone() }, config.tcp_backlog)
        .expect("bind a unix-domain socket");

    let engine = Arc::new(Engine::new(config));
    let stop = Arc::new(AtomicBool::new(false));

    let reactor_stop = stop.clone();
    let handle = thread::spawn(move || {
        reactor::run_with_listener(engine, bound, reactor_stop, 1, 1).expect("reactor run");
    });

    let deadline = Instant::now() + Duration::from_secs(2);
    let mut stream = loop {
        match UnixStream::connect(&path) {
            Ok(stream) => break stream,
            Err(e) if Instant::now() < deadline => {
                let _ = e;
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => panic!("could not connect to unix listener: {e}"),
        }
    };

    let mut out = BytesMut::new();
    encode_request(
        &mut out,
        &Request::Put { prefix: false, ttl: -1, key: b"k".to_vec(), value: b"v".to_vec() },
    );
    stream.write_all(&out).expect("write PUT over the unix socket");
    assert_eq!(read_one_response(&mut stream), Response::ack(true));

    drop(stream);
    stop.store(true, Ordering::Relaxed);
    handle.join().expect("reactor thread panicked");
}
