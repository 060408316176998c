//! Command bots.
//!
//! A [`Bot`] is paired with one [`Connection`]. It binds named commands on the
//! connection's dispatcher, keeps a description per command for the built-in
//! `help` listing, and offers the conventional reply shapes (`confirm`,
//! `reject`).
//!
//! Services add their own commands by implementing [`CommandHandler`] around a
//! `Bot` and registering a [`BotMaker`] with the console:
//!
//! ```no_run
//! use algol_console::{Bot, CommandHandler, Connection};
//! use std::sync::Arc;
//!
//! struct ServiceBot {
//!     bot: Bot,
//! }
//!
//! impl ServiceBot {
//!     fn new(connection: &Arc<Connection>) -> Self {
//!         let bot = Bot::new(connection);
//!         bot.bind("ping", "replies with pong", |bot, msg| bot.confirm(msg, "pong"));
//!         Self { bot }
//!     }
//! }
//!
//! impl CommandHandler for ServiceBot {
//!     fn bot(&self) -> &Bot {
//!         &self.bot
//!     }
//! }
//! ```

use crate::connection::Connection;
use algol_protocol::{
    Feedback, Message, MessageOptions, DATA_PROPERTY, ERROR_PROPERTY, STATUS_PROPERTY,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// Built-in command listing the bound commands.
pub const HELP_COMMAND: &str = "help";

/// Flag property requesting a machine-readable help listing.
pub const BRIEF_FLAG: &str = "--brief";

/// Column width of command names in the help listing.
const HELP_NAME_WIDTH: usize = 20;

/// Builds the command handler for a freshly accepted connection.
pub type BotMaker = Arc<dyn Fn(&Arc<Connection>) -> Box<dyn CommandHandler> + Send + Sync>;

/// The per-connection command servicing surface owned by the console.
pub trait CommandHandler: Send + Sync {
    /// The bot this handler registers commands through.
    fn bot(&self) -> &Bot;

    /// Called once the connection is accepted and reading.
    fn start(&self) {
        self.bot().start();
    }

    /// Called when the console reclaims the connection.
    fn stop(&self) {}
}

struct BotInner {
    connection: Arc<Connection>,
    commands: Mutex<BTreeMap<String, String>>,
}

/// Services commands arriving on one connection.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

impl Bot {
    /// Creates a bot for `connection` and binds the `help` command.
    pub fn new(connection: &Arc<Connection>) -> Self {
        let bot = Self {
            inner: Arc::new(BotInner {
                connection: connection.clone(),
                commands: Mutex::new(BTreeMap::new()),
            }),
        };
        bot.bind(HELP_COMMAND, "displays this help listing", |bot, msg| {
            bot.on_help(msg)
        });
        bot
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.inner.connection
    }

    /// Binds `handler` to `command` and records its description.
    ///
    /// A command name can only be bound once; later attempts are logged and
    /// ignored. Returns whether the binding took effect.
    pub fn bind<F>(&self, command: &str, description: &str, handler: F) -> bool
    where
        F: Fn(&Bot, &Message) + Send + Sync + 'static,
    {
        {
            let mut commands = self.inner.commands.lock();
            if commands.contains_key(command) {
                tracing::warn!(
                    "[{}] Command '{}' is already bound, ignoring",
                    self.inner.connection,
                    command
                );
                return false;
            }
            commands.insert(command.to_string(), description.to_string());
        }

        // The dispatcher outlives the bot; handlers must not keep it alive.
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .connection
            .dispatcher()
            .bind(command, move |msg: &Message| {
                if let Some(inner) = weak.upgrade() {
                    handler(&Bot { inner }, msg);
                }
            });
        true
    }

    /// Registered `(command, description)` pairs, sorted by command.
    pub fn commands(&self) -> Vec<(String, String)> {
        self.inner
            .commands
            .lock()
            .iter()
            .map(|(name, desc)| (name.clone(), desc.clone()))
            .collect()
    }

    pub fn start(&self) {
        match self.inner.connection.peer_addr() {
            Some(addr) => tracing::info!("Servicing administrator at {}", addr.ip()),
            None => tracing::info!("Servicing administrator on {}", self.inner.connection.id()),
        }
    }

    pub fn send(&self, msg: &Message) {
        self.inner.connection.send(msg);
    }

    /// Replies to `msg` with feedback `ok` and a "Status" property.
    pub fn confirm(&self, msg: &Message, status: &str) {
        let mut reply = msg.clone();
        reply.feedback = Feedback::Ok;
        reply.set_property(STATUS_PROPERTY, status);
        self.send(&reply);
    }

    /// Replies to `msg` with feedback `error` and an "Error" property.
    pub fn reject(&self, msg: &Message, error: &str) {
        self.reject_with(msg, error, Feedback::Error);
    }

    pub fn reject_with(&self, msg: &Message, error: &str, feedback: Feedback) {
        let mut reply = msg.clone();
        reply.feedback = feedback;
        reply.set_property(ERROR_PROPERTY, error);
        self.send(&reply);
    }

    /// Replies with the command listing as a raw "Data" payload.
    pub fn on_help(&self, msg: &Message) {
        let listing = self.help_listing(msg.has_property(BRIEF_FLAG));

        let mut reply = msg.clone();
        reply.options = MessageOptions::new().with_raw();
        reply.set_property(DATA_PROPERTY, listing);
        self.send(&reply);
    }

    fn help_listing(&self, brief: bool) -> String {
        let commands = self.inner.commands.lock();

        if brief {
            return commands
                .keys()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" ");
        }

        let mut listing = String::new();
        for (name, description) in commands.iter() {
            let _ = writeln!(
                listing,
                "  {:<width$}{}",
                name,
                description,
                width = HELP_NAME_WIDTH
            );
        }
        listing
    }
}

impl CommandHandler for Bot {
    fn bot(&self) -> &Bot {
        self
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("connection", &self.inner.connection.id())
            .field("commands", &self.inner.commands.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use algol_protocol::Decoder;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    struct Peer {
        stream: DuplexStream,
        decoder: Decoder,
    }

    impl Peer {
        async fn request(&mut self, msg: &Message) -> Message {
            let frame = algol_protocol::Encoder::encode(msg).unwrap();
            self.stream.write_all(&frame).await.unwrap();
            self.reply().await
        }

        async fn reply(&mut self) -> Message {
            let mut buf = [0u8; 4096];
            loop {
                if let Some(msg) = self.decoder.decode_message().unwrap() {
                    return msg;
                }
                let n = tokio::time::timeout(Duration::from_secs(2), self.stream.read(&mut buf))
                    .await
                    .unwrap()
                    .unwrap();
                assert!(n > 0, "connection closed before reply");
                self.decoder.extend(&buf[..n]);
            }
        }
    }

    fn started_bot() -> (Bot, Peer) {
        let (local, remote) = tokio::io::duplex(8192);
        let connection = Connection::new(local);
        let bot = Bot::new(&connection);
        connection.start().unwrap();
        (
            bot,
            Peer {
                stream: remote,
                decoder: Decoder::new(),
            },
        )
    }

    #[tokio::test]
    async fn test_help_listing() {
        let (bot, mut peer) = started_bot();
        assert!(bot.bind("svc-status", "reports service status", |_, _| {}));

        let reply = peer.request(&Message::new("help")).await;
        assert_eq!(reply.identifier, "help");
        assert!(reply.is_raw());
        assert_eq!(reply.feedback, Feedback::Ok);
        assert_eq!(
            reply.get(DATA_PROPERTY),
            format!(
                "  {:<20}displays this help listing\n  {:<20}reports service status\n",
                "help", "svc-status"
            )
        );
    }

    #[tokio::test]
    async fn test_brief_help_listing() {
        let (bot, mut peer) = started_bot();
        bot.bind("uptime", "seconds since launch", |_, _| {});
        bot.bind("svc-status", "reports service status", |_, _| {});

        let reply = peer
            .request(&Message::new("help").with_property(BRIEF_FLAG, "true"))
            .await;
        assert!(reply.is_raw());
        assert_eq!(reply.get(DATA_PROPERTY), "help svc-status uptime");
    }

    #[tokio::test]
    async fn test_confirm_and_reject_shapes() {
        let (bot, mut peer) = started_bot();
        bot.bind("svc-status", "reports service status", |bot, msg| {
            if msg.get("service") == "db" {
                bot.confirm(msg, "available");
            } else {
                bot.reject(msg, "bad arg");
            }
        });
        bot.bind("login", "authenticates", |bot, msg| {
            bot.reject_with(msg, "denied", Feedback::InvalidCredentials)
        });

        let ok = peer
            .request(&Message::new("svc-status").with_property("service", "db"))
            .await;
        assert_eq!(ok.identifier, "svc-status");
        assert_eq!(ok.feedback, Feedback::Ok);
        assert_eq!(ok.get(STATUS_PROPERTY), "available");
        assert_eq!(ok.get("service"), "db");

        let failed = peer
            .request(&Message::new("svc-status").with_property("service", "cache"))
            .await;
        assert_eq!(failed.feedback, Feedback::Error);
        assert_eq!(failed.get(ERROR_PROPERTY), "bad arg");
        assert!(!failed.has_property(STATUS_PROPERTY));

        let denied = peer.request(&Message::new("login")).await;
        assert_eq!(denied.feedback, Feedback::InvalidCredentials);
        assert_eq!(denied.get(ERROR_PROPERTY), "denied");
    }

    #[tokio::test]
    async fn test_duplicate_bind_keeps_first() {
        let (bot, mut peer) = started_bot();
        assert!(!bot.bind("help", "something else", |bot, msg| bot.confirm(msg, "hijacked")));

        let commands = bot.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].1, "displays this help listing");
        assert_eq!(bot.connection().dispatcher().handler_count("help"), 1);

        let reply = peer.request(&Message::new("help")).await;
        assert!(reply.is_raw());
        assert!(!reply.has_property(STATUS_PROPERTY));
    }

    #[tokio::test]
    async fn test_dropped_bot_ignores_queued_messages() {
        let (local, _remote) = tokio::io::duplex(1024);
        let connection = Connection::new(local);
        let bot = Bot::new(&connection);
        drop(bot);

        // The binding remains but the handler has nothing to act on.
        connection.dispatcher().deliver(&Message::new("help"), true);
        assert_eq!(connection.dispatcher().pending(), 0);
    }
}
