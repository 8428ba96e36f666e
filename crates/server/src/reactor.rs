//! The I/O reactor (§4.6): an accept thread feeding a sharded I/O pool,
//! which frames and decodes packets and hands requests to a worker pool
//! that executes the dispatcher under the writer lock, plus a periodic
//! sweeper thread for TTL expiration (§4.3).
//!
//! `mio`'s `Poll` cannot itself be shared across threads the way a single
//! `epoll` fd can in the original C server (every worker `epoll_wait`-ing
//! the same fd); the idiomatic Rust equivalent is one `Poll` per I/O
//! worker, each owning a disjoint shard of connections, with the accept
//! thread round-robining new connections across shards. Observable
//! behavior (§5 ordering guarantees, at-most-one-in-flight-request per
//! connection) is unaffected by this internal sharding.

use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::BytesMut;
use mio::{Events, Interest, Poll, Token, Waker};
use slab::Slab;
use tracing::{debug, error, info, warn};

use tritedb_engine::now_epoch_secs;
use tritedb_protocol::{encode_response, try_decode_request};

use crate::client::Client;
use crate::connection::{ConnState, Connection, ReadOutcome, Socket};
use crate::dispatcher::{dispatch, HandlerSignal};
use crate::engine::Engine;
use crate::listener::{self, AnyListener};

const LISTENER_TOKEN: Token = Token(usize::MAX - 1);
const WAKE_TOKEN: Token = Token(usize::MAX);
const POLL_TIMEOUT: Duration = Duration::from_millis(200);
const SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Which I/O worker owns a connection, and its local slab token --
/// everything the worker pool needs to route a reply back (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ConnAddr {
    worker: usize,
    token: Token,
}

struct IoEvent {
    addr: ConnAddr,
    client: Client,
    request: tritedb_protocol::Request,
}

struct ReplyEvent {
    addr: ConnAddr,
    client: Client,
    signal: HandlerSignal,
}

/// One I/O worker's inbound channels: new sockets from the accept thread,
/// and finished replies from the worker pool.
struct IoChannels {
    register_tx: flume::Sender<Socket>,
    reply_tx: flume::Sender<ReplyEvent>,
    waker: Arc<Waker>,
}

/// Spawns the full reactor (accept thread, I/O pool, worker pool, TTL
/// sweeper) and blocks until `stop` is observed, at which point every
/// thread has been asked to drain and this returns.
pub fn run(engine: Arc<Engine>, stop: Arc<AtomicBool>, io_threads: usize, worker_threads: usize) -> io::Result<()> {
    let listener = listener::bind(&engine.config.listener, engine.config.tcp_backlog)?;
    run_with_listener(engine, listener, stop, io_threads, worker_threads)
}

/// Same as [`run`], but takes an already-bound listener. Split out so
/// tests can bind to an OS-assigned port (`:0`) and read it back before
/// the reactor starts accepting.
pub fn run_with_listener(
    engine: Arc<Engine>,
    listener: AnyListener,
    stop: Arc<AtomicBool>,
    io_threads: usize,
    worker_threads: usize,
) -> io::Result<()> {
    info!(io_threads, worker_threads, "starting tritedb reactor");

    let (event_tx, event_rx) = flume::unbounded::<IoEvent>();

    let mut io_channels = Vec::with_capacity(io_threads);
    let mut io_handles = Vec::with_capacity(io_threads);

    for worker in 0..io_threads {
        let mut poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        let (register_tx, register_rx) = flume::unbounded::<Socket>();
        let (reply_tx, reply_rx) = flume::unbounded::<ReplyEvent>();
        io_channels.push(IoChannels { register_tx, reply_tx, waker: waker.clone() });

        let event_tx = event_tx.clone();
        let engine = engine.clone();
        let stop = stop.clone();
        let handle = thread::Builder::new().name(format!("tritedb-io-{worker}")).spawn(move || {
            io_worker_loop(worker, &mut poll, register_rx, reply_rx, event_tx, &engine, &stop);
        })?;
        io_handles.push(handle);
    }

    let mut worker_handles = Vec::with_capacity(worker_threads);
    let reply_targets: Vec<(flume::Sender<ReplyEvent>, Arc<Waker>)> =
        io_channels.iter().map(|c| (c.reply_tx.clone(), c.waker.clone())).collect();
    for worker in 0..worker_threads {
        let event_rx = event_rx.clone();
        let reply_targets = reply_targets.clone();
        let engine = engine.clone();
        let stop = stop.clone();
        let handle = thread::Builder::new().name(format!("tritedb-worker-{worker}")).spawn(move || {
            worker_loop(&event_rx, &reply_targets, &engine, &stop);
        })?;
        worker_handles.push(handle);
    }

    let sweeper_engine = engine.clone();
    let sweeper_stop = stop.clone();
    let sweeper_handle =
        thread::Builder::new().name("tritedb-sweeper".to_string()).spawn(move || sweep_loop(&sweeper_engine, &sweeper_stop))?;

    let register_targets: Vec<(flume::Sender<Socket>, Arc<Waker>)> =
        io_channels.into_iter().map(|c| (c.register_tx, c.waker)).collect();
    let accept_stop = stop.clone();
    let accept_engine = engine.clone();
    let accept_handle = thread::Builder::new()
        .name("tritedb-accept".to_string())
        .spawn(move || accept_loop(listener, register_targets, &accept_engine, &accept_stop))?;

    let _ = accept_handle.join();
    for handle in io_handles {
        let _ = handle.join();
    }
    for handle in worker_handles {
        let _ = handle.join();
    }
    let _ = sweeper_handle.join();
    Ok(())
}

fn accept_loop(
    mut listener: AnyListener,
    register_targets: Vec<(flume::Sender<Socket>, Arc<Waker>)>,
    engine: &Arc<Engine>,
    stop: &AtomicBool,
) {
    let mut poll = match Poll::new() {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "accept thread failed to create its poll");
            return;
        }
    };
    if let Err(e) = poll.registry().register(&mut listener, LISTENER_TOKEN, Interest::READABLE) {
        error!(error = %e, "accept thread failed to register listener");
        return;
    }
    let mut events = Events::with_capacity(16);
    let mut next_worker = 0usize;

    while !stop.load(Ordering::Relaxed) {
        match poll.poll(&mut events, Some(POLL_TIMEOUT)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                error!(error = %e, "accept thread poll failed");
                continue;
            }
        }
        for event in events.iter() {
            if event.token() != LISTENER_TOKEN {
                continue;
            }
            loop {
                match listener.accept() {
                    Ok(socket) => {
                        let (register_tx, waker) = &register_targets[next_worker];
                        next_worker = (next_worker + 1) % register_targets.len();
                        if register_tx.send(socket).is_ok() {
                            let _ = waker.wake();
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        break;
                    }
                }
            }
        }
    }
    debug!("accept thread draining");
}

#[allow(clippy::too_many_arguments)]
fn io_worker_loop(
    worker: usize,
    poll: &mut Poll,
    register_rx: flume::Receiver<Socket>,
    reply_rx: flume::Receiver<ReplyEvent>,
    event_tx: flume::Sender<IoEvent>,
    engine: &Arc<Engine>,
    stop: &AtomicBool,
) {
    let mut conns: Slab<Connection> = Slab::new();
    let mut events = Events::with_capacity(256);

    while !stop.load(Ordering::Relaxed) {
        match poll.poll(&mut events, Some(POLL_TIMEOUT)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                error!(error = %e, worker, "io worker poll failed");
                continue;
            }
        }

        for event in events.iter() {
            if event.token() == WAKE_TOKEN {
                while let Ok(socket) = register_rx.try_recv() {
                    register_connection(worker, poll, &mut conns, socket, engine);
                }
                while let Ok(reply) = reply_rx.try_recv() {
                    handle_reply(poll, &mut conns, reply, engine);
                }
                continue;
            }
            let key = event.token().0;
            if !conns.contains(key) {
                continue;
            }
            if event.is_readable() {
                handle_readable(worker, key, poll, &mut conns, &event_tx, engine);
            }
            if conns.contains(key) && event.is_writable() {
                handle_writable(key, poll, &mut conns, engine);
            }
        }
    }
    debug!(worker, "io worker draining");
}

fn register_connection(
    worker: usize,
    poll: &mut Poll,
    conns: &mut Slab<Connection>,
    socket: Socket,
    engine: &Arc<Engine>,
) {
    let now = now_epoch_secs();
    let entry = conns.vacant_entry();
    let key = entry.key();
    let mut conn = Connection::new(socket, now);
    match poll.registry().register(&mut conn.socket, Token(key), Interest::READABLE) {
        Ok(()) => {
            entry.insert(conn);
            engine.stats.on_connect();
        }
        Err(e) => warn!(worker, error = %e, "failed to register accepted connection"),
    }
}

fn handle_readable(
    worker: usize,
    key: usize,
    poll: &mut Poll,
    conns: &mut Slab<Connection>,
    event_tx: &flume::Sender<IoEvent>,
    engine: &Arc<Engine>,
) {
    let max_request_size = engine.config.max_request_size;
    let outcome = {
        let conn = &mut conns[key];
        conn.read_available()
    };
    let closed = match outcome {
        Ok(ReadOutcome::Closed) => true,
        Ok(ReadOutcome::Data(_)) => false,
        Err(e) => {
            warn!(worker, error = %e, "connection read error");
            true
        }
    };

    let decoded = {
        let conn = &conns[key];
        try_decode_request(&conn.read_buf, max_request_size)
    };
    match decoded {
        Ok(Some((consumed, request))) => {
            let conn = &mut conns[key];
            conn.advance_read(consumed);
            conn.client.bytes_recv += consumed as u64;
            engine.stats.bytes_recv.fetch_add(consumed as u64, Ordering::Relaxed);
            conn.state = ConnState::AwaitingReply;
            let _ = poll.registry().deregister(&mut conn.socket);
            let addr = ConnAddr { worker, token: Token(key) };
            let client = conn.client.clone();
            let _ = event_tx.send(IoEvent { addr, client, request });
        }
        Ok(None) => {
            if closed {
                close_connection(key, poll, conns, engine);
            }
        }
        Err(e) => {
            debug!(worker, error = %e, "protocol error, dropping connection");
            close_connection(key, poll, conns, engine);
        }
    }
}

fn handle_reply(poll: &mut Poll, conns: &mut Slab<Connection>, reply: ReplyEvent, engine: &Arc<Engine>) {
    let key = reply.addr.token.0;
    if !conns.contains(key) {
        return;
    }
    conns[key].client = reply.client;

    match reply.signal {
        HandlerSignal::Close => close_connection(key, poll, conns, engine),
        HandlerSignal::Reply(response) => {
            let mut buf = BytesMut::new();
            encode_response(&mut buf, &response, false);
            let sent = buf.len() as u64;
            let conn = &mut conns[key];
            conn.queue_reply(buf);
            conn.client.bytes_sent += sent;
            engine.stats.on_request(0, sent);
            match conn.flush_pending() {
                Ok(true) => {
                    conn.state = ConnState::Active;
                    let _ = poll.registry().register(&mut conn.socket, Token(key), Interest::READABLE);
                }
                Ok(false) => {
                    conn.state = ConnState::Writing;
                    let _ = poll.registry().register(&mut conn.socket, Token(key), Interest::WRITABLE);
                }
                Err(_) => close_connection(key, poll, conns, engine),
            }
        }
    }
}

fn handle_writable(key: usize, poll: &mut Poll, conns: &mut Slab<Connection>, engine: &Arc<Engine>) {
    let conn = &mut conns[key];
    match conn.flush_pending() {
        Ok(true) => {
            conn.state = ConnState::Active;
            let _ = poll.registry().reregister(&mut conn.socket, Token(key), Interest::READABLE);
        }
        Ok(false) => {}
        Err(_) => close_connection(key, poll, conns, engine),
    }
}

fn close_connection(key: usize, poll: &mut Poll, conns: &mut Slab<Connection>, engine: &Arc<Engine>) {
    if conns.contains(key) {
        let mut conn = conns.remove(key);
        let _ = poll.registry().deregister(&mut conn.socket);
        engine.stats.on_disconnect();
    }
}

fn worker_loop(
    event_rx: &flume::Receiver<IoEvent>,
    reply_targets: &[(flume::Sender<ReplyEvent>, Arc<Waker>)],
    engine: &Arc<Engine>,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::Relaxed) {
        let event = match event_rx.recv_timeout(POLL_TIMEOUT) {
            Ok(event) => event,
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        };
        let mut client = event.client;
        let signal = dispatch(engine, &mut client, event.request);
        let (reply_tx, waker) = &reply_targets[event.addr.worker];
        if reply_tx.send(ReplyEvent { addr: event.addr, client, signal }).is_ok() {
            let _ = waker.wake();
        }
    }
}

fn sweep_loop(engine: &Arc<Engine>, stop: &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
        thread::sleep(SWEEP_INTERVAL);
        let swept = engine.registry.lock().sweep_now();
        if swept > 0 {
            debug!(swept, "ttl sweep");
        }
    }
}
