//! algol - admin console daemon
//!
//! Serves the algol admin protocol with a service bot.

use algol_console::{Bot, CommandHandler, Config, Connection, Console, CONFIG_ENV};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Bot exposing the daemon's own status commands.
struct ServiceBot {
    bot: Bot,
}

impl ServiceBot {
    fn new(connection: &Arc<Connection>, started: Instant) -> Self {
        let bot = Bot::new(connection);

        bot.bind("svc-status", "reports whether the service is available", |bot, msg| {
            bot.confirm(msg, "available")
        });
        bot.bind("uptime", "seconds since the console was launched", move |bot, msg| {
            bot.confirm(msg, &started.elapsed().as_secs().to_string())
        });

        Self { bot }
    }
}

impl CommandHandler for ServiceBot {
    fn bot(&self) -> &Bot {
        &self.bot
    }

    fn stop(&self) {
        tracing::debug!("Service bot for {} released", self.bot.connection().id());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration (from file if ALGOL_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if std::env::var(CONFIG_ENV).is_ok() {
                eprintln!("Failed to load config: {}", e);
                return Err(e.into());
            }
            Config::default()
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        tracing::info!("Loaded config from {}", path);
    }

    tracing::info!("Starting algol admin console");
    tracing::info!("  Interface: {}", config.console.interface);
    tracing::info!("  Port: {}", config.console.port);

    let console = Console::new(config.console.clone());
    let started = Instant::now();
    console.register_bot_maker(move |connection: &Arc<Connection>| {
        Box::new(ServiceBot::new(connection, started)) as Box<dyn CommandHandler>
    });

    console.launch().await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping console...");
            console.shutdown();
        }
        result = console.wait() => {
            result?;
        }
    }

    tracing::info!("Console stopped");
    Ok(())
}
