//! The admin console: accepts connections and pairs each with a bot.

use crate::bot::{Bot, BotMaker, CommandHandler};
use crate::config::ConsoleConfig;
use crate::connection::{Connection, ConnectionId};
use crate::error::ConsoleError;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Listen backlog.
const LISTEN_BACKLOG: u32 = 1024;

/// Console lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleState {
    Created,
    Launched,
    Shutdown,
}

/// Console statistics.
#[derive(Debug, Default)]
pub struct ConsoleStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
}

struct LiveBot {
    connection: Arc<Connection>,
    handler: Box<dyn CommandHandler>,
}

/// State shared between the console handle and its serving task.
struct Registry {
    bot_maker: Mutex<BotMaker>,
    bots: DashMap<ConnectionId, LiveBot>,
    stats: ConsoleStats,
}

impl Registry {
    fn admit(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        closed: &mpsc::UnboundedSender<ConnectionId>,
    ) {
        let connection = Connection::new(stream);
        let id = connection.id();

        let closed = closed.clone();
        connection.on_stop(move |id| {
            let _ = closed.send(id);
        });

        let maker = self.bot_maker.lock().clone();
        let handler = maker(&connection);

        if let Err(e) = connection.start() {
            tracing::warn!("[{}] Unable to start connection: {}", addr, e);
            return;
        }
        handler.start();

        self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
        self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
        self.bots.insert(id, LiveBot { connection, handler });

        tracing::info!("Client connected: {} ({})", addr, id);
    }

    fn close(&self, id: ConnectionId) {
        let Some((_, live)) = self.bots.remove(&id) else {
            return;
        };

        live.handler.stop();
        // Breaks the dispatcher -> bot handler links before both are dropped.
        live.connection.dispatcher().reset();
        self.stats.connections_active.fetch_sub(1, Ordering::Relaxed);

        match live.connection.peer_addr() {
            Some(addr) => tracing::info!("Client disconnected: {} ({})", addr, id),
            None => tracing::info!("Client disconnected: {}", id),
        }
    }
}

/// The admin console.
///
/// Every accepted client gets its own [`Connection`] and a command handler
/// built by the registered [`BotMaker`]. Admission and reclamation of
/// connections run on a single serving task.
pub struct Console {
    config: Mutex<ConsoleConfig>,
    state: Mutex<ConsoleState>,
    registry: Arc<Registry>,
    shutdown: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<Result<(), ConsoleError>>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Console {
    pub fn new(config: ConsoleConfig) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        let default_maker: BotMaker = Arc::new(|connection: &Arc<Connection>| {
            Box::new(Bot::new(connection)) as Box<dyn CommandHandler>
        });

        Self {
            config: Mutex::new(config),
            state: Mutex::new(ConsoleState::Created),
            registry: Arc::new(Registry {
                bot_maker: Mutex::new(default_maker),
                bots: DashMap::new(),
                stats: ConsoleStats::default(),
            }),
            shutdown,
            task: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// Applies a configuration option. Takes effect on the next launch.
    pub fn set_option(&self, key: &str, value: &str) -> Result<(), ConsoleError> {
        self.config.lock().set_option(key, value)?;
        Ok(())
    }

    pub fn config(&self) -> ConsoleConfig {
        self.config.lock().clone()
    }

    /// Replaces the factory used to build a handler for each new connection.
    pub fn register_bot_maker<F>(&self, maker: F)
    where
        F: Fn(&Arc<Connection>) -> Box<dyn CommandHandler> + Send + Sync + 'static,
    {
        *self.registry.bot_maker.lock() = Arc::new(maker);
    }

    pub fn state(&self) -> ConsoleState {
        *self.state.lock()
    }

    /// Binds the configured interface and port and starts accepting.
    ///
    /// Returns the bound address.
    pub async fn launch(&self) -> Result<SocketAddr, ConsoleError> {
        match self.state() {
            ConsoleState::Created => {}
            ConsoleState::Launched => return Err(ConsoleError::AlreadyLaunched),
            ConsoleState::Shutdown => return Err(ConsoleError::ShutDown),
        }

        let config = self.config();
        let listener = bind(&config).await?;
        let local_addr = listener.local_addr()?;

        {
            let mut state = self.state.lock();
            if *state != ConsoleState::Created {
                return Err(ConsoleError::AlreadyLaunched);
            }
            *state = ConsoleState::Launched;
        }

        tracing::info!("Admin console listening on {}", local_addr);

        let task = tokio::spawn(serve(
            listener,
            self.registry.clone(),
            self.shutdown.subscribe(),
        ));
        *self.task.lock() = Some(task);
        *self.local_addr.lock() = Some(local_addr);

        Ok(local_addr)
    }

    /// Stops accepting and releases the listener. Live connections are left
    /// to close on their own.
    pub fn shutdown(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), ConsoleState::Shutdown);
        if previous == ConsoleState::Launched {
            tracing::info!("Admin console shutting down");
            let _ = self.shutdown.send(());
        }
    }

    /// Waits for the serving task to finish.
    ///
    /// Returns the accept failure that ended it, if any. Without a shutdown
    /// the task only ends on such a failure.
    pub async fn wait(&self) -> Result<(), ConsoleError> {
        let task = self.task.lock().take();
        match task {
            Some(task) => task
                .await
                .map_err(|e| ConsoleError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?,
            None => Ok(()),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Number of connections currently paired with a bot.
    pub fn live_bots(&self) -> usize {
        self.registry.bots.len()
    }

    pub fn stats(&self) -> &ConsoleStats {
        &self.registry.stats
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("config", &*self.config.lock())
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .field("live_bots", &self.live_bots())
            .finish()
    }
}

async fn bind(config: &ConsoleConfig) -> Result<TcpListener, ConsoleError> {
    let endpoint = config.endpoint();
    let addr = tokio::net::lookup_host(&endpoint)
        .await
        .map_err(|_| ConsoleError::Resolve(endpoint.clone()))?
        .next()
        .ok_or_else(|| ConsoleError::Resolve(endpoint.clone()))?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(LISTEN_BACKLOG)?)
}

async fn accept(listener: &Option<TcpListener>) -> std::io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

/// Accepts clients and reclaims closed ones until shut down and drained.
async fn serve(
    listener: TcpListener,
    registry: Arc<Registry>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ConsoleError> {
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();
    let mut listener = Some(listener);

    loop {
        if listener.is_none() && registry.bots.is_empty() {
            break;
        }

        tokio::select! {
            Some(id) = closed_rx.recv() => registry.close(id),
            _ = shutdown.recv(), if listener.is_some() => {
                listener = None;
                tracing::debug!("Listener released, {} connection(s) still live", registry.bots.len());
            }
            result = accept(&listener) => {
                match result {
                    Ok((stream, addr)) => registry.admit(stream, addr, &closed_tx),
                    Err(e) => {
                        tracing::error!("Unable to accept connection: {}", e);
                        return Err(ConsoleError::Accept(e));
                    }
                }
            }
        }
    }

    tracing::info!("Admin console stopped");
    Ok(())
}
