//! The network extension.
//!
//! The extension is a small connection state machine. A program either listens on its port and
//! waits for a peer to connect (to receive), or dials the same port on the target address (to
//! send). Connections are opened and torn down implicitly by the receive and flush operations,
//! and closed explicitly whenever the port changes.
//!
//! ```text
//!            listen              accept
//!   Idle ───────────► Listening ───────► Connected
//!    ▲  ╲                                  ▲   │
//!    │   ╲──────────── dial ───────────────╯   │
//!    ╰──────────────── reset ─────────────────╯
//! ```
//!
//! Incoming connections are accepted by a background thread that publishes the connection into
//! the shared state once. Everything mutable lives in a single [`NetworkState`] behind one mutex.

use std::{
    collections::VecDeque,
    io::{ErrorKind, Read, Write},
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex, MutexGuard, PoisonError, TryLockError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::NetworkOpts;

/// The port selected by a port byte of 0. A port byte `b` selects `NET_BASE_PORT + b`.
pub const NET_BASE_PORT: u16 = 42000;

/// The timeout selected by a timeout byte of 0.
///
/// With this timeout, flush and receive retry until they succeed, each attempt lasting up to this
/// long.
pub const NET_LONG_TIMEOUT: Duration = Duration::from_secs(60);

/// The timeout selected by a timeout byte of 1. A timeout byte `b` selects `b` times this.
pub const NET_TIMEOUT_UNIT: Duration = Duration::from_millis(100);

/// The timeout before any timeout byte is set.
pub const NET_DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// The maximum number of bytes handed to a single socket write.
pub const NET_MAX_CHUNK_SIZE: usize = 1024;

/// How often a pending receive checks whether a peer has connected.
const NET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long tearing down a listener waits to wake up its acceptor.
const NET_WAKE_TIMEOUT: Duration = Duration::from_millis(100);

/// How many times tearing down a listener tries to wake up its acceptor.
const NET_WAKE_ATTEMPTS: usize = 3;

/// The state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No listener and no connection.
    Idle,
    /// A listener is waiting for a peer.
    Listening,
    /// A connection is open.
    Connected,
}

/// The network extension of a program.
pub struct Network {
    /// The state shared with the acceptor thread.
    shared: Arc<Mutex<NetworkState>>,
    /// The addresses to listen on and to dial.
    opts: NetworkOpts,
}

/// The mutable state of the network extension.
///
/// At most one of `listener` and `conn` is set, and `state` always agrees with which one.
#[derive(Debug)]
struct NetworkState {
    state: ConnectionState,
    timeout: Duration,
    port: u16,
    listener: Option<ListenerHandle>,
    conn: Option<TcpStream>,
    send_queue: VecDeque<u8>,
}

/// A listener owned by its acceptor thread.
#[derive(Debug)]
struct ListenerHandle {
    /// The local address of the listener.
    addr: SocketAddr,
    /// Set when the listener is torn down; the acceptor must not publish after this.
    cancelled: Arc<AtomicBool>,
    acceptor: JoinHandle<()>,
}

impl Network {
    /// Create an idle network extension.
    #[must_use]
    pub fn new(opts: NetworkOpts) -> Self {
        let state = NetworkState {
            state: ConnectionState::Idle,
            timeout: NET_DEFAULT_TIMEOUT,
            port: NET_BASE_PORT,
            listener: None,
            conn: None,
            send_queue: VecDeque::new(),
        };
        Self { shared: Arc::new(Mutex::new(state)), opts }
    }

    /// The options this extension was created with.
    #[must_use]
    pub fn opts(&self) -> NetworkOpts {
        self.opts
    }

    /// The current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// The timeout of a single network attempt.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.lock().timeout
    }

    /// Returns `true` if network operations retry until they succeed.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.lock().is_blocking()
    }

    /// The port used to listen and to dial.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.lock().port
    }

    /// The number of bytes waiting to be flushed.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.lock().send_queue.len()
    }

    /// Set the timeout to `b` times 0.1 seconds.
    ///
    /// A `b` of 0 makes flush and receive block until they succeed.
    pub fn set_timeout(&self, b: u8) {
        let timeout = timeout_from_byte(b);
        tracing::debug!(?timeout, "setting network timeout");
        self.lock().timeout = timeout;
    }

    /// Set the port to `NET_BASE_PORT + b`.
    ///
    /// Closes any listener or connection and drops the send queue.
    pub fn set_port(&self, b: u8) {
        let port = port_from_byte(b);
        tracing::debug!(port, "setting network port");
        let mut state = self.lock();
        state.port = port;
        state.reset(true);
    }

    /// Add a byte to the send queue.
    pub fn queue_send(&self, b: u8) {
        self.lock().send_queue.push_back(b);
    }

    /// Close any listener or connection, keeping the send queue.
    pub fn reset(&self) {
        self.lock().reset(false);
    }

    /// Send the whole send queue to the target address on the current port, dialing it first if
    /// there is no connection.
    ///
    /// Returns `true` once the queue is empty. Bytes that could not be sent stay queued, in order.
    pub fn push(&self) -> bool {
        let mut state = self.lock();
        loop {
            if self.push_once(&mut state) {
                return true;
            }
            if !state.is_blocking() {
                return false;
            }
            thread::sleep(NET_POLL_INTERVAL);
        }
    }

    /// Receive one byte, listening on the current port for a peer if there is no connection.
    ///
    /// Returns 0 if nothing was received before the timeout.
    pub fn receive(&self) -> u8 {
        loop {
            if let Some(byte) = self.receive_once() {
                return byte;
            }
            if !self.is_blocking() {
                return 0;
            }
            thread::sleep(NET_POLL_INTERVAL);
        }
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try to flush the send queue once.
    fn push_once(&self, state: &mut NetworkState) -> bool {
        if state.state == ConnectionState::Connected && state.send() {
            return true;
        }
        if !self.setup_connection(state) {
            return false;
        }
        state.send()
    }

    /// Try to receive a byte once, waiting up to the timeout for a peer to connect.
    fn receive_once(&self) -> Option<u8> {
        let timeout = {
            let mut state = self.lock();
            if state.state == ConnectionState::Connected {
                if let Some(byte) = state.read_byte() {
                    return Some(byte);
                }
                state.reset(false);
            }
            if state.state == ConnectionState::Idle && !self.start_listening(&mut state) {
                return None;
            }
            state.timeout
        };

        // The lock is only held for short checks so the acceptor can publish its connection.
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            {
                let mut state = self.lock();
                match state.state {
                    ConnectionState::Idle => return None,
                    ConnectionState::Connected => {
                        let byte = state.read_byte();
                        if byte.is_none() {
                            state.reset(false);
                        }
                        return byte;
                    }
                    ConnectionState::Listening => {}
                }
            }
            thread::sleep(NET_POLL_INTERVAL);
        }
        tracing::debug!(?timeout, "timed out waiting for a peer");
        None
    }

    /// Dial the target address on the current port.
    fn setup_connection(&self, state: &mut NetworkState) -> bool {
        state.reset(false);
        let addr = SocketAddr::new(self.opts.target_addr, state.port);
        match TcpStream::connect_timeout(&addr, state.timeout) {
            Ok(conn) => {
                tracing::debug!(%addr, "connected");
                state.conn = Some(conn);
                state.state = ConnectionState::Connected;
                true
            }
            Err(err) => {
                tracing::debug!(%addr, "failed to connect: {err}");
                false
            }
        }
    }

    /// Listen on the current port and spawn the acceptor.
    ///
    /// Only returns once the acceptor is about to accept, so a peer can't connect before the
    /// listener is tracked.
    fn start_listening(&self, state: &mut NetworkState) -> bool {
        state.reset(false);
        let addr = SocketAddr::new(self.opts.listen_addr, state.port);
        let listener = match TcpListener::bind(addr) {
            Ok(listener) => listener,
            Err(err) => {
                tracing::debug!(%addr, "failed to listen: {err}");
                return false;
            }
        };
        let local_addr = listener.local_addr().unwrap_or(addr);

        let cancelled = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel(0);
        let spawned = thread::Builder::new().name(format!("tl-acceptor-{}", state.port)).spawn({
            let shared = Arc::clone(&self.shared);
            let cancelled = Arc::clone(&cancelled);
            move || accept_one(&listener, &shared, &cancelled, &ready_tx)
        });
        let acceptor = match spawned {
            Ok(acceptor) => acceptor,
            Err(err) => {
                tracing::warn!("failed to spawn the acceptor: {err}");
                return false;
            }
        };
        if ready_rx.recv().is_err() {
            return false;
        }

        tracing::debug!(addr = %local_addr, "listening");
        state.listener = Some(ListenerHandle { addr: local_addr, cancelled, acceptor });
        state.state = ConnectionState::Listening;
        true
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new(NetworkOpts::default())
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Network")
            .field("state", &state.state)
            .field("port", &state.port)
            .field("timeout", &state.timeout)
            .field("queued", &state.send_queue.len())
            .finish()
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        self.lock().reset(true);
    }
}

impl NetworkState {
    fn is_blocking(&self) -> bool {
        self.timeout == NET_LONG_TIMEOUT
    }

    /// Close the listener and the connection, if any.
    fn reset(&mut self, clear_queue: bool) {
        if let Some(listener) = self.listener.take() {
            listener.close();
        }
        if let Some(conn) = self.conn.take() {
            drop(conn);
            tracing::debug!("connection closed");
        }
        if clear_queue {
            self.send_queue.clear();
        }
        self.state = ConnectionState::Idle;
    }

    /// Write the send queue to the connection.
    fn send(&mut self) -> bool {
        let Some(conn) = self.conn.as_mut() else {
            return false;
        };
        if let Err(err) = conn.set_write_timeout(Some(self.timeout)) {
            tracing::warn!("failed to set the write timeout: {err}");
            return false;
        }
        write_queue(&mut self.send_queue, conn)
    }

    /// Read a single byte from the connection, waiting up to the timeout.
    fn read_byte(&mut self) -> Option<u8> {
        let conn = self.conn.as_mut()?;
        if let Err(err) = conn.set_read_timeout(Some(self.timeout)) {
            tracing::warn!("failed to set the read timeout: {err}");
            return None;
        }
        let mut buf = [0u8; 1];
        match conn.read(&mut buf) {
            Ok(1) => Some(buf[0]),
            Ok(_) => {
                tracing::debug!("connection closed by peer");
                None
            }
            Err(err) => {
                tracing::debug!("failed to receive: {err}");
                None
            }
        }
    }
}

impl ListenerHandle {
    /// Stop the acceptor and release the port.
    fn close(self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // The acceptor is blocked in `accept`: connecting is the portable way to wake it up.
        let addr = wake_addr(self.addr);
        for attempt in 1..=NET_WAKE_ATTEMPTS {
            match TcpStream::connect_timeout(&addr, NET_WAKE_TIMEOUT) {
                Ok(_) => {
                    if self.acceptor.join().is_err() {
                        tracing::warn!("the acceptor panicked");
                    }
                    tracing::debug!(addr = %self.addr, "listener closed");
                    return;
                }
                // The acceptor is already past `accept` and exits on its own.
                Err(err) if err.kind() == ErrorKind::ConnectionRefused => {
                    tracing::debug!(addr = %self.addr, "listener closed");
                    return;
                }
                Err(err) => {
                    tracing::warn!(%addr, attempt, "failed to wake the acceptor: {err}");
                    thread::sleep(NET_POLL_INTERVAL);
                }
            }
        }
        tracing::error!(
            addr = %self.addr,
            "the acceptor could not be woken up, port {} stays bound",
            self.addr.port()
        );
    }
}

/// The address to connect to in order to reach a listener bound to `addr`.
fn wake_addr(addr: SocketAddr) -> SocketAddr {
    let ip = match addr.ip() {
        ip if ip.is_unspecified() && ip.is_ipv4() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        ip if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, addr.port())
}

/// Accept a single connection on `listener` and publish it.
///
/// Exits without touching the state if the listener is torn down in the meantime.
fn accept_one(
    listener: &TcpListener,
    shared: &Mutex<NetworkState>,
    cancelled: &AtomicBool,
    ready: &mpsc::SyncSender<()>,
) {
    if ready.send(()).is_err() {
        return;
    }
    let accepted = listener.accept();
    if cancelled.load(Ordering::SeqCst) {
        return;
    }
    let conn = match accepted {
        Ok((conn, peer)) => {
            tracing::debug!(%peer, "accepted connection");
            Some(conn)
        }
        Err(err) => {
            tracing::warn!("failed to accept a connection: {err}");
            None
        }
    };

    // Spin instead of blocking: the lock may be held by a thread that is waiting for this one to
    // exit.
    loop {
        if cancelled.load(Ordering::SeqCst) {
            return;
        }
        let mut state = match shared.try_lock() {
            Ok(state) => state,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                thread::yield_now();
                continue;
            }
        };
        if cancelled.load(Ordering::SeqCst) {
            return;
        }
        state.listener = None;
        match conn {
            Some(conn) => {
                state.conn = Some(conn);
                state.state = ConnectionState::Connected;
            }
            None => state.state = ConnectionState::Idle,
        }
        return;
    }
}

/// Write `queue` to `conn` in chunks of at most [`NET_MAX_CHUNK_SIZE`] bytes.
///
/// On a short write the unsent part of the chunk is put back at the head of the queue, on an
/// error the whole chunk is.
fn write_queue(queue: &mut VecDeque<u8>, conn: &mut impl Write) -> bool {
    while !queue.is_empty() {
        let len = queue.len().min(NET_MAX_CHUNK_SIZE);
        let chunk = queue.drain(..len).collect::<Vec<_>>();
        match conn.write(&chunk) {
            Ok(written) if written == chunk.len() => {}
            Ok(written) => {
                tracing::debug!(written, len, "short write");
                requeue(queue, &chunk[written..]);
                return false;
            }
            Err(err) => {
                tracing::debug!("failed to send: {err}");
                requeue(queue, &chunk);
                return false;
            }
        }
    }
    true
}

fn requeue(queue: &mut VecDeque<u8>, bytes: &[u8]) {
    for &byte in bytes.iter().rev() {
        queue.push_front(byte);
    }
}

/// The timeout selected by the byte `b`.
#[must_use]
pub fn timeout_from_byte(b: u8) -> Duration {
    if b == 0 {
        NET_LONG_TIMEOUT
    } else {
        NET_TIMEOUT_UNIT * u32::from(b)
    }
}

/// The port selected by the byte `b`.
#[must_use]
pub fn port_from_byte(b: u8) -> u16 {
    NET_BASE_PORT + u16::from(b)
}

#[cfg(test)]
mod tests {
    use std::io;

    use serial_test::serial;

    use super::*;
    use crate::utils::setup_logger;

    #[test]
    fn defaults() {
        let network = Network::default();
        assert_eq!(network.state(), ConnectionState::Idle);
        assert_eq!(network.port(), 42000);
        assert_eq!(network.timeout(), Duration::from_secs(5));
        assert_eq!(network.queued(), 0);
        assert!(!network.is_blocking());
    }

    #[test]
    fn set_port_and_timeout() {
        let network = Network::default();
        network.set_port(1);
        network.set_port(11);
        assert_eq!(network.port(), 42011);
        network.set_timeout(23);
        assert_eq!(network.timeout(), Duration::from_millis(2300));
        network.set_timeout(0);
        assert_eq!(network.timeout(), NET_LONG_TIMEOUT);
        assert!(network.is_blocking());
    }

    #[test]
    fn byte_to_port() {
        for b in 0..=u8::MAX {
            assert_eq!(port_from_byte(b).to_string(), format!("{}", 42000 + u32::from(b)));
        }
    }

    #[test]
    fn set_port_drops_the_queue() {
        let network = Network::default();
        network.queue_send(1);
        network.queue_send(2);
        assert_eq!(network.queued(), 2);
        network.set_port(3);
        assert_eq!(network.queued(), 0);
    }

    #[test]
    fn requeue_preserves_order() {
        let mut queue = VecDeque::from([4, 5]);
        requeue(&mut queue, &[1, 2, 3]);
        assert_eq!(queue, [1, 2, 3, 4, 5]);
    }

    /// A connection that takes at most `accept` bytes per write and fails once `budget` writes
    /// have been made.
    struct FlakyConn {
        accept: usize,
        budget: usize,
        sent: Vec<u8>,
    }

    impl Write for FlakyConn {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::from(ErrorKind::ConnectionReset));
            }
            self.budget -= 1;
            let len = buf.len().min(self.accept);
            self.sent.extend_from_slice(&buf[..len]);
            Ok(len)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_chunks_are_resent_in_order() {
        let payload = (0..2500u32).map(|i| (i % 253) as u8).collect::<Vec<_>>();
        let mut queue = payload.iter().copied().collect::<VecDeque<_>>();

        // The first chunk is cut short.
        let mut conn = FlakyConn { accept: 600, budget: 1, sent: Vec::new() };
        assert!(!write_queue(&mut queue, &mut conn));
        let mut sent = conn.sent;
        assert_eq!(sent.len(), 600);
        assert_eq!(queue.len(), payload.len() - 600);

        // The next chunk goes out whole, then the connection resets under the one after it.
        let mut conn = FlakyConn { accept: usize::MAX, budget: 1, sent: Vec::new() };
        assert!(!write_queue(&mut queue, &mut conn));
        assert_eq!(conn.sent.len(), NET_MAX_CHUNK_SIZE);
        sent.extend(conn.sent);
        assert_eq!(queue.len(), payload.len() - 600 - NET_MAX_CHUNK_SIZE);

        // A healthy connection gets the rest, in order.
        let mut conn = FlakyConn { accept: usize::MAX, budget: usize::MAX, sent: Vec::new() };
        assert!(write_queue(&mut queue, &mut conn));
        assert!(queue.is_empty());
        sent.extend(conn.sent);
        assert_eq!(sent, payload);
    }

    #[test]
    fn wake_addr_targets_loopback() {
        let any_v4 = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 42000);
        assert_eq!(wake_addr(any_v4), SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 42000));
        let any_v6 = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 42001);
        assert_eq!(wake_addr(any_v6), SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 42001));
        let local = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2)), 42002);
        assert_eq!(wake_addr(local), local);
    }

    #[test]
    #[serial]
    fn blocking_push_waits_for_a_late_peer() {
        setup_logger();
        let start = Instant::now();
        let reader = thread::spawn(|| {
            thread::sleep(Duration::from_millis(300));
            let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port_from_byte(210))).unwrap();
            let (mut conn, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            conn.read_to_end(&mut received).unwrap();
            received
        });

        let network = Network::new(NetworkOpts::loopback());
        network.set_port(210);
        network.set_timeout(0);
        network.queue_send(9);
        assert!(network.push());
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_eq!(network.queued(), 0);

        drop(network);
        assert_eq!(reader.join().unwrap(), [9]);
    }

    #[test]
    #[serial]
    fn blocking_receive_waits_for_a_late_peer() {
        setup_logger();
        let network = Network::new(NetworkOpts::loopback());
        network.set_port(211);
        network.set_timeout(0);

        let start = Instant::now();
        let sender = thread::spawn(|| {
            thread::sleep(Duration::from_millis(300));
            let addr = (Ipv4Addr::LOCALHOST, port_from_byte(211));
            let mut conn = loop {
                match TcpStream::connect(addr) {
                    Ok(conn) => break conn,
                    Err(err) => {
                        tracing::debug!("retrying: {err}");
                        thread::sleep(Duration::from_millis(20));
                    }
                }
            };
            conn.write_all(&[42]).unwrap();
        });

        assert_eq!(network.receive(), 42);
        assert!(start.elapsed() >= Duration::from_millis(300));
        sender.join().unwrap();
    }

    #[test]
    #[serial]
    fn listener_on_any_address_is_released() {
        setup_logger();
        let opts = NetworkOpts {
            listen_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ..NetworkOpts::loopback()
        };
        let network = Network::new(opts);
        network.set_port(212);
        network.set_timeout(1);
        assert_eq!(network.receive(), 0);
        assert_eq!(network.state(), ConnectionState::Listening);

        network.reset();
        assert_eq!(network.state(), ConnectionState::Idle);
        assert!(TcpListener::bind((Ipv4Addr::UNSPECIFIED, port_from_byte(212))).is_ok());
    }

    #[test]
    #[serial]
    fn receive_without_peer_times_out() {
        setup_logger();
        let network = Network::new(NetworkOpts::loopback());
        network.set_port(201);
        network.set_timeout(3);

        let start = Instant::now();
        assert_eq!(network.receive(), 0);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "returned after {elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "returned after {elapsed:?}");

        // The listener is kept for the next attempt.
        assert_eq!(network.state(), ConnectionState::Listening);
        network.set_port(201);
        assert_eq!(network.state(), ConnectionState::Idle);
    }

    #[test]
    #[serial]
    fn push_without_peer_keeps_the_queue() {
        setup_logger();
        let network = Network::new(NetworkOpts::loopback());
        network.set_port(202);
        network.set_timeout(2);
        network.queue_send(7);
        network.queue_send(8);
        assert!(!network.push());
        assert_eq!(network.queued(), 2);
        assert_eq!(network.state(), ConnectionState::Idle);
    }

    #[test]
    #[serial]
    fn push_reaches_a_listening_peer() {
        setup_logger();
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port_from_byte(203))).unwrap();
        let reader = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            conn.read_to_end(&mut received).unwrap();
            received
        });

        let network = Network::new(NetworkOpts::loopback());
        network.set_port(203);
        network.set_timeout(10);
        let payload = (0..3000u32).map(|i| (i % 251) as u8).collect::<Vec<_>>();
        for &byte in &payload {
            network.queue_send(byte);
        }
        assert!(network.push());
        assert_eq!(network.queued(), 0);
        assert_eq!(network.state(), ConnectionState::Connected);

        // The connection is reused.
        network.queue_send(b'!');
        assert!(network.push());

        drop(network);
        let mut expected = payload;
        expected.push(b'!');
        assert_eq!(reader.join().unwrap(), expected);
    }

    #[test]
    #[serial]
    fn receive_accepts_a_peer() {
        setup_logger();
        let network = Network::new(NetworkOpts::loopback());
        network.set_port(204);
        network.set_timeout(30);

        let sender = thread::spawn(|| {
            let addr = (Ipv4Addr::LOCALHOST, port_from_byte(204));
            let start = Instant::now();
            let mut conn = loop {
                match TcpStream::connect(addr) {
                    Ok(conn) => break conn,
                    Err(err) if start.elapsed() < Duration::from_secs(3) => {
                        tracing::debug!("retrying: {err}");
                        thread::sleep(Duration::from_millis(20));
                    }
                    Err(err) => panic!("failed to connect: {err}"),
                }
            };
            conn.write_all(b"hi").unwrap();
        });

        assert_eq!(network.receive(), b'h');
        assert_eq!(network.state(), ConnectionState::Connected);
        assert_eq!(network.receive(), b'i');
        sender.join().unwrap();
    }

    #[test]
    #[serial]
    fn two_extensions_talk_over_loopback() {
        setup_logger();
        let receiver = thread::spawn(|| {
            let network = Network::new(NetworkOpts::loopback());
            network.set_port(205);
            network.set_timeout(30);
            (0..3).map(|_| network.receive()).collect::<Vec<_>>()
        });

        let network = Network::new(NetworkOpts::loopback());
        network.set_port(205);
        network.set_timeout(5);
        for byte in *b"abc" {
            network.queue_send(byte);
        }
        let start = Instant::now();
        while !network.push() {
            assert!(start.elapsed() < Duration::from_secs(3), "the receiver never listened");
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(receiver.join().unwrap(), b"abc");
    }

    #[test]
    #[serial]
    fn set_port_stops_a_listener() {
        setup_logger();
        let network = Network::new(NetworkOpts::loopback());
        network.set_port(206);
        network.set_timeout(1);
        assert_eq!(network.receive(), 0);
        assert_eq!(network.state(), ConnectionState::Listening);

        // The port is free again as soon as the listener is torn down.
        network.set_port(207);
        let rebound = TcpListener::bind((Ipv4Addr::LOCALHOST, port_from_byte(206)));
        assert!(rebound.is_ok());
    }
}
