//! TCP transport
//!
//! [`TcpPublisher`] listens for subscribers and copies every chunk into a
//! bounded per-subscriber queue; a writer task per subscriber drains its
//! queue onto the socket. [`TcpSubscriber`] keeps one connection to the
//! publisher alive, reconnecting after failures, and buffers inbound chunks
//! in a bounded queue. Chunks are length-prefixed envelopes (see
//! [`crate::protocol::chunk`]).
//!
//! Both ends own a small tokio runtime so that callers stay synchronous.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};

use crate::config::{ReceiverConfig, TransmitterConfig};
use crate::error::{InitError, Result, TransportError};
use crate::protocol::chunk::{read_chunk, WireChunk};
use crate::transport::{ChunkSink, ChunkSource, SendOutcome};

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Bytes>,
}

type SubscriberList = Arc<Mutex<Vec<Subscriber>>>;

fn lock(list: &SubscriberList) -> MutexGuard<'_, Vec<Subscriber>> {
    list.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn runtime(name: &str) -> std::result::Result<Runtime, InitError> {
    Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name(name)
        .enable_all()
        .build()
        .map_err(InitError::Runtime)
}

/// Publishing end: bound socket plus subscriber fan-out
pub struct TcpPublisher {
    local_addr: SocketAddr,
    subscribers: SubscriberList,
    runtime: Option<Runtime>,
}

impl TcpPublisher {
    /// Bind the listening socket and start accepting subscribers
    pub fn bind(config: &TransmitterConfig) -> std::result::Result<Self, InitError> {
        let runtime = runtime("avlink-publisher")?;
        let listener = runtime
            .block_on(TcpListener::bind(config.bind_addr))
            .map_err(InitError::Bind)?;
        let local_addr = listener.local_addr().map_err(InitError::Bind)?;
        tracing::info!(addr = %local_addr, "Publisher listening");

        let subscribers: SubscriberList = Arc::new(Mutex::new(Vec::new()));
        let acceptor = Acceptor {
            subscribers: Arc::clone(&subscribers),
            semaphore: (config.max_subscribers > 0)
                .then(|| Arc::new(Semaphore::new(config.max_subscribers))),
            high_water_mark: config.high_water_mark.max(1),
            tcp_nodelay: config.tcp_nodelay,
            next_id: 1,
        };
        runtime.spawn(acceptor.run(listener));

        Ok(Self {
            local_addr,
            subscribers,
            runtime: Some(runtime),
        })
    }

    /// Address subscribers connect to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl ChunkSink for TcpPublisher {
    fn send(&mut self, chunk: WireChunk) -> Result<SendOutcome> {
        let mut buf = BytesMut::with_capacity(chunk.encoded_len());
        chunk.encode(&mut buf);
        let envelope = buf.freeze();

        let mut subscribers = lock(&self.subscribers);
        if subscribers.is_empty() {
            return Ok(SendOutcome::NoPeers);
        }

        let mut delivered = false;
        subscribers.retain(|sub| match sub.tx.try_send(envelope.clone()) {
            Ok(()) => {
                delivered = true;
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::trace!(subscriber_id = sub.id, "Subscriber queue full, chunk dropped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });

        Ok(if delivered {
            SendOutcome::Delivered
        } else if subscribers.is_empty() {
            SendOutcome::NoPeers
        } else {
            SendOutcome::Dropped
        })
    }

    fn peer_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }
}

impl Drop for TcpPublisher {
    fn drop(&mut self) {
        lock(&self.subscribers).clear();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        tracing::info!(addr = %self.local_addr, "Publisher closed");
    }
}

impl std::fmt::Debug for TcpPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpPublisher")
            .field("local_addr", &self.local_addr)
            .field("subscribers", &self.peer_count())
            .finish()
    }
}

struct Acceptor {
    subscribers: SubscriberList,
    semaphore: Option<Arc<Semaphore>>,
    high_water_mark: usize,
    tcp_nodelay: bool,
    next_id: u64,
}

impl Acceptor {
    async fn run(mut self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }

    fn handle_connection(&mut self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check subscriber limit
        let permit = match self.semaphore {
            Some(ref sem) => match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Subscriber rejected: limit reached");
                    return;
                }
            },
            None => None,
        };

        if self.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = mpsc::channel(self.high_water_mark);
        lock(&self.subscribers).push(Subscriber { id, tx });
        tracing::info!(subscriber_id = id, peer = %peer_addr, "Subscriber connected");

        let subscribers = Arc::clone(&self.subscribers);
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = write_loop(socket, rx).await {
                tracing::debug!(subscriber_id = id, error = %e, "Subscriber write failed");
            }
            lock(&subscribers).retain(|sub| sub.id != id);
            tracing::info!(subscriber_id = id, peer = %peer_addr, "Subscriber disconnected");
        });
    }
}

async fn write_loop(mut socket: TcpStream, mut rx: mpsc::Receiver<Bytes>) -> std::io::Result<()> {
    while let Some(envelope) = rx.recv().await {
        socket.write_all(&envelope).await?;
    }
    socket.shutdown().await
}

/// Subscribing end: one reconnecting connection to a publisher
pub struct TcpSubscriber {
    rx: mpsc::Receiver<WireChunk>,
    peer_addr: SocketAddr,
    connected: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    runtime: Option<Runtime>,
}

impl TcpSubscriber {
    /// Start connecting to `config.connect_addr`.
    ///
    /// Returns immediately; the connection is established (and
    /// re-established) in the background.
    pub fn connect(config: &ReceiverConfig) -> std::result::Result<Self, InitError> {
        let runtime = runtime("avlink-subscriber")?;
        let (tx, rx) = mpsc::channel(config.high_water_mark.max(1));
        let connected = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicU64::new(0));

        let reader = Reader {
            addr: config.connect_addr,
            tx,
            connected: Arc::clone(&connected),
            dropped: Arc::clone(&dropped),
            reconnect_interval: config.reconnect_interval,
            tcp_nodelay: config.tcp_nodelay,
        };
        runtime.spawn(reader.run());

        Ok(Self {
            rx,
            peer_addr: config.connect_addr,
            connected,
            dropped,
            runtime: Some(runtime),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Whether a connection to the publisher is currently up
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Inbound chunks dropped at the high-water-mark
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ChunkSource for TcpSubscriber {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<WireChunk>> {
        let Some(runtime) = self.runtime.as_ref() else {
            return Err(TransportError::Closed.into());
        };
        // the timer must be created inside the runtime
        let rx = &mut self.rx;
        match runtime.block_on(async { tokio::time::timeout(timeout, rx.recv()).await }) {
            Ok(Some(chunk)) => Ok(Some(chunk)),
            Ok(None) => Err(TransportError::Closed.into()),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for TcpSubscriber {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        tracing::debug!(addr = %self.peer_addr, dropped = self.dropped(), "Subscriber closed");
    }
}

impl std::fmt::Debug for TcpSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSubscriber")
            .field("peer_addr", &self.peer_addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}

struct Reader {
    addr: SocketAddr,
    tx: mpsc::Sender<WireChunk>,
    connected: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    reconnect_interval: Duration,
    tcp_nodelay: bool,
}

impl Reader {
    async fn run(self) {
        while !self.tx.is_closed() {
            match TcpStream::connect(self.addr).await {
                Ok(stream) => {
                    if self.tcp_nodelay {
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!(error = %e, "Failed to configure socket");
                        }
                    }
                    tracing::info!(addr = %self.addr, "Connected to publisher");
                    self.connected.store(true, Ordering::Release);
                    let result = self.read_stream(stream).await;
                    self.connected.store(false, Ordering::Release);

                    match result {
                        Ok(()) => tracing::info!(addr = %self.addr, "Publisher connection closed"),
                        Err(e) => tracing::warn!(addr = %self.addr, error = %e, "Subscription failed"),
                    }
                }
                Err(e) => {
                    tracing::debug!(addr = %self.addr, error = %e, "Connect failed");
                }
            }

            if self.tx.is_closed() {
                break;
            }
            tokio::time::sleep(self.reconnect_interval).await;
        }
    }

    async fn read_stream(&self, stream: TcpStream) -> Result<()> {
        let mut reader = BufReader::new(stream);
        while let Some(chunk) = read_chunk(&mut reader).await? {
            match self.tx.try_send(chunk) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!("Inbound queue full, chunk dropped");
                }
                Err(TrySendError::Closed(_)) => return Ok(()),
            }
        }
        Ok(())
    }
}
