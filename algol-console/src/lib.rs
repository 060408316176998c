//! # algol-console
//!
//! Administrative console for algol services.
//!
//! This crate provides:
//! - A per-connection message dispatcher with FIFO draining
//! - Async TCP connection handling with pipelined frame parsing
//! - Command bots that bind named commands and reply in-band
//! - The console acceptor that pairs every client with a bot
//! - YAML + environment configuration

pub mod bot;
pub mod config;
pub mod connection;
pub mod console;
pub mod dispatcher;
pub mod error;
pub mod stream;

pub use bot::{Bot, BotMaker, CommandHandler, BRIEF_FLAG, HELP_COMMAND};
pub use config::{Config, ConfigError, ConsoleConfig, LoggingConfig, CONFIG_ENV};
pub use connection::{Connection, ConnectionId, ConnectionState, DEFAULT_WRITE_TIMEOUT};
pub use console::{Console, ConsoleState, ConsoleStats};
pub use dispatcher::{Dispatcher, MessageHandler, UNASSIGNED};
pub use error::ConsoleError;
pub use stream::AdminStream;
