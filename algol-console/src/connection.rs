//! A single admin connection: framed reads into the dispatcher, serialized writes.

use crate::dispatcher::Dispatcher;
use crate::error::ConsoleError;
use crate::stream::AdminStream;
use algol_protocol::{Decoder, Encoder, Feedback, Message};
use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, mpsc};

/// Read buffer size (8 KiB).
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// How long a single frame write may stall before the peer is considered gone.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, not started.
    Idle,
    /// Read loop running.
    Reading,
    /// Terminal.
    Stopped,
}

type StopCallback = Box<dyn FnOnce(ConnectionId) + Send>;

/// An admin connection.
///
/// Inbound frames are decoded in arrival order and delivered to the
/// connection's own [`Dispatcher`]. Outbound messages are queued and written
/// by a single writer task, so concurrent senders never interleave frames.
pub struct Connection {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    state: Mutex<ConnectionState>,
    stream: Mutex<Option<AdminStream>>,
    dispatcher: Dispatcher,
    outbound_tx: mpsc::UnboundedSender<Message>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    shutdown: broadcast::Sender<()>,
    on_stop: Mutex<Option<StopCallback>>,
    write_timeout: Mutex<Duration>,
}

impl Connection {
    pub fn new(stream: impl Into<AdminStream>) -> Arc<Self> {
        let stream = stream.into();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = broadcast::channel(1);

        Arc::new(Self {
            id: ConnectionId::next(),
            peer_addr: stream.peer_addr(),
            state: Mutex::new(ConnectionState::Idle),
            stream: Mutex::new(Some(stream)),
            dispatcher: Dispatcher::new(),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            shutdown,
            on_stop: Mutex::new(None),
            write_timeout: Mutex::new(DEFAULT_WRITE_TIMEOUT),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == ConnectionState::Stopped
    }

    /// The dispatcher inbound messages are delivered to.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Registers the callback fired when the connection stops. It runs at most once.
    pub fn on_stop<F>(&self, callback: F)
    where
        F: FnOnce(ConnectionId) + Send + 'static,
    {
        *self.on_stop.lock() = Some(Box::new(callback));
    }

    /// Bounds each frame write, including the flush after a stop.
    pub fn set_write_timeout(&self, timeout: Duration) {
        *self.write_timeout.lock() = timeout;
    }

    pub fn write_timeout(&self) -> Duration {
        *self.write_timeout.lock()
    }

    /// Starts the read loop, the writer and the dispatcher drain.
    pub fn start(self: &Arc<Self>) -> Result<(), ConsoleError> {
        // Subscribed under the state lock so a concurrent stop() always reaches both loops.
        let (read_shutdown, write_shutdown) = {
            let mut state = self.state.lock();
            if *state != ConnectionState::Idle {
                return Err(ConsoleError::AlreadyStarted(self.id.as_u64()));
            }
            *state = ConnectionState::Reading;
            (self.shutdown.subscribe(), self.shutdown.subscribe())
        };

        let stream = self
            .stream
            .lock()
            .take()
            .ok_or(ConsoleError::AlreadyStarted(self.id.as_u64()))?;
        let outbound = self
            .outbound_rx
            .lock()
            .take()
            .ok_or(ConsoleError::AlreadyStarted(self.id.as_u64()))?;

        if let Err(e) = stream.set_nodelay() {
            tracing::debug!("[{}] Failed to set TCP_NODELAY: {}", self, e);
        }

        let (reader, writer) = tokio::io::split(stream);

        self.dispatcher.spawn_drain();
        tokio::spawn(self.clone().read_loop(reader, read_shutdown));
        tokio::spawn(self.clone().write_loop(writer, outbound, write_shutdown));

        tracing::debug!("[{}] Connection started", self);
        Ok(())
    }

    /// Queues a copy of `msg` for writing. Unassigned feedback goes out as `ok`.
    pub fn send(&self, msg: &Message) {
        if self.outbound_tx.send(msg.clone()).is_err() {
            tracing::debug!("[{}] Dropping '{}': connection closed", self, msg.identifier);
        }
    }

    /// Stops the connection. Both directions are shut down and the stop
    /// callback fires. Calling this again is a no-op.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == ConnectionState::Stopped {
                return;
            }
            *state = ConnectionState::Stopped;
        }

        let _ = self.shutdown.send(());
        self.stream.lock().take();

        tracing::debug!("[{}] Connection stopped", self);

        let callback = self.on_stop.lock().take();
        if let Some(callback) = callback {
            callback(self.id);
        }
    }

    async fn read_loop(
        self: Arc<Self>,
        mut reader: ReadHalf<AdminStream>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut decoder = Decoder::new();
        let mut buf = [0u8; READ_BUFFER_SIZE];

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                result = reader.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            tracing::debug!("[{}] Connection closed by peer", self);
                            break;
                        }
                        Ok(n) => {
                            tracing::trace!("[{}] Received {} bytes", self, n);
                            decoder.extend(&buf[..n]);
                        }
                        Err(e) => {
                            tracing::debug!("[{}] Read error: {}", self, e);
                            break;
                        }
                    }
                }
            }

            if !self.deliver_frames(&mut decoder) {
                break;
            }
        }

        self.stop();
    }

    /// Decodes and delivers every complete frame. Returns false on a malformed frame.
    fn deliver_frames(&self, decoder: &mut Decoder) -> bool {
        loop {
            match decoder.decode_message() {
                Ok(Some(msg)) => {
                    tracing::debug!("[{}] Request: {}", self, msg.identifier);
                    self.dispatcher.deliver(&msg, false);
                }
                Ok(None) => return true,
                Err(e) => {
                    tracing::error!("[{}] Malformed frame, dropping connection: {}", self, e);
                    return false;
                }
            }
        }
    }

    async fn write_loop(
        self: Arc<Self>,
        mut writer: WriteHalf<AdminStream>,
        mut outbound: mpsc::UnboundedReceiver<Message>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                msg = outbound.recv() => {
                    let Some(msg) = msg else { break };
                    if let Err(e) = self.write_message(&mut writer, msg).await {
                        tracing::debug!("[{}] Write error: {}", self, e);
                        self.stop();
                        return;
                    }
                }
            }
        }

        // Best effort: flush replies queued before the stop.
        while let Ok(msg) = outbound.try_recv() {
            if let Err(e) = self.write_message(&mut writer, msg).await {
                tracing::debug!("[{}] Abandoning flush: {}", self, e);
                break;
            }
        }

        match tokio::time::timeout(self.write_timeout(), writer.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::trace!("[{}] Shutdown error: {}", self, e),
            Err(_) => tracing::trace!("[{}] Shutdown timed out", self),
        }
    }

    async fn write_message(
        &self,
        writer: &mut WriteHalf<AdminStream>,
        mut msg: Message,
    ) -> Result<(), ConsoleError> {
        if msg.feedback == Feedback::Unassigned {
            msg.feedback = Feedback::Ok;
        }

        let frame = match Encoder::encode(&msg) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("[{}] Unable to encode '{}': {}", self, msg.identifier, e);
                return Ok(());
            }
        };

        tracing::trace!("[{}] Sending '{}': {} bytes", self, msg.identifier, frame.len());
        tokio::time::timeout(self.write_timeout(), writer.write_all(&frame))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "write timed out"))??;
        Ok(())
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peer_addr {
            Some(addr) => write!(f, "{} {}", self.id, addr),
            None => write!(f, "{}", self.id),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state())
            .finish()
    }
}
