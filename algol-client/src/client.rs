//! High-level client API.

use crate::connection::{self, ClientConfig};
use crate::error::ClientError;
use algol_console::{Connection, Dispatcher, BRIEF_FLAG, HELP_COMMAND, UNASSIGNED};
use algol_protocol::{Message, DATA_PROPERTY};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Requests awaiting a reply, keyed by identifier, oldest first.
type PendingReplies = Arc<Mutex<HashMap<String, VecDeque<oneshot::Sender<Message>>>>>;

/// Client for an algol admin console.
///
/// Replies are matched to requests by identifier: the console answers a
/// request with a message carrying the same identifier, and answers on one
/// connection in order.
pub struct Client {
    config: ClientConfig,
    connection: Arc<Connection>,
    pending: PendingReplies,
}

impl Client {
    /// Connects to the console.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let connection = connection::open(&config).await?;
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));

        {
            let pending = pending.clone();
            connection.dispatcher().bind(UNASSIGNED, move |msg: &Message| {
                let mut pending = pending.lock();
                let Some(waiters) = pending.get_mut(&msg.identifier) else {
                    return;
                };
                // Skip requests that gave up waiting.
                while let Some(waiter) = waiters.pop_front() {
                    if waiter.send(msg.clone()).is_ok() {
                        break;
                    }
                }
            });
        }

        {
            let pending = pending.clone();
            connection.on_stop(move |_| {
                // Dropping the senders fails every outstanding request.
                pending.lock().clear();
            });
        }

        connection.start()?;

        Ok(Self {
            config,
            connection,
            pending,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns whether the connection is still up.
    pub fn is_connected(&self) -> bool {
        !self.connection.is_stopped()
    }

    /// The dispatcher replies and unsolicited messages are delivered to.
    pub fn dispatcher(&self) -> &Dispatcher {
        self.connection.dispatcher()
    }

    /// Sends a message without waiting for a reply.
    pub fn send(&self, msg: &Message) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.connection.send(msg);
        Ok(())
    }

    /// Sends `msg` and waits for the next reply carrying its identifier.
    pub async fn request(&self, msg: &Message) -> Result<Message, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .entry(msg.identifier.clone())
            .or_default()
            .push_back(tx);

        tracing::debug!("Sending request: {}", msg.identifier);
        self.connection.send(msg);

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                tracing::debug!("Request '{}' timed out", msg.identifier);
                self.forget_abandoned(&msg.identifier);
                Err(ClientError::Timeout)
            }
        }
    }

    /// Drops waiters whose request gave up, and the identifier entry once empty.
    fn forget_abandoned(&self, identifier: &str) {
        let mut pending = self.pending.lock();
        if let Some(waiters) = pending.get_mut(identifier) {
            waiters.retain(|waiter| !waiter.is_closed());
            if waiters.is_empty() {
                pending.remove(identifier);
            }
        }
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().values().map(VecDeque::len).sum()
    }

    /// Lists the commands the console's bot supports.
    pub async fn commands(&self) -> Result<Vec<String>, ClientError> {
        let reply = self
            .request(&Message::new(HELP_COMMAND).with_property(BRIEF_FLAG, "true"))
            .await?;
        Ok(reply
            .get(DATA_PROPERTY)
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }

    /// Closes the connection.
    pub fn close(&self) {
        self.connection.stop();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.connection.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use algol_console::{Bot, CommandHandler, Console, ConsoleConfig};
    use algol_protocol::{Feedback, ERROR_PROPERTY, STATUS_PROPERTY};
    use std::time::Duration;

    struct TestBot {
        bot: Bot,
    }

    impl CommandHandler for TestBot {
        fn bot(&self) -> &Bot {
            &self.bot
        }
    }

    async fn console() -> (Console, ClientConfig) {
        let console = Console::new(ConsoleConfig::new("127.0.0.1", 0));
        console.register_bot_maker(|connection: &Arc<Connection>| {
            let bot = Bot::new(connection);
            bot.bind("svc-status", "reports service status", |bot, msg| {
                match msg.property("service") {
                    Some("db") => bot.confirm(msg, "available"),
                    _ => bot.reject(msg, "bad arg"),
                }
            });
            bot.bind("silent", "never answers", |_, _| {});
            bot.bind("quit", "closes the connection", |bot, _| bot.connection().stop());
            bot.bind("notify", "answers under another identifier", |bot, _| {
                bot.send(&Message::new("event").with_property("kind", "notice"));
            });
            Box::new(TestBot { bot }) as Box<dyn CommandHandler>
        });
        let addr = console.launch().await.unwrap();
        let config = ClientConfig::new("127.0.0.1", addr.port())
            .with_request_timeout(Duration::from_millis(300));
        (console, config)
    }

    #[tokio::test]
    async fn test_request_reply() {
        let (_console, config) = console().await;
        let client = Client::connect(config).await.unwrap();
        assert!(client.is_connected());

        let ok = client
            .request(&Message::new("svc-status").with_property("service", "db"))
            .await
            .unwrap();
        assert_eq!(ok.feedback, Feedback::Ok);
        assert_eq!(ok.get(STATUS_PROPERTY), "available");

        let failed = client
            .request(&Message::new("svc-status").with_property("service", "mq"))
            .await
            .unwrap();
        assert_eq!(failed.feedback, Feedback::Error);
        assert_eq!(failed.get(ERROR_PROPERTY), "bad arg");
    }

    #[tokio::test]
    async fn test_commands() {
        let (_console, config) = console().await;
        let client = Client::connect(config).await.unwrap();

        let commands = client.commands().await.unwrap();
        assert_eq!(commands, vec!["help", "notify", "quit", "silent", "svc-status"]);
    }

    #[tokio::test]
    async fn test_concurrent_requests_same_identifier() {
        let (_console, config) = console().await;
        let client = Client::connect(config).await.unwrap();

        let db = Message::new("svc-status").with_property("service", "db");
        let mq = Message::new("svc-status").with_property("service", "mq");
        let (first, second) = tokio::join!(client.request(&db), client.request(&mq));

        assert_eq!(first.unwrap().get(STATUS_PROPERTY), "available");
        assert_eq!(second.unwrap().get(ERROR_PROPERTY), "bad arg");
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let (_console, config) = console().await;
        let client = Client::connect(config).await.unwrap();

        let result = client.request(&Message::new("silent")).await;
        assert!(matches!(result, Err(ClientError::Timeout)));
        assert_eq!(client.pending_requests(), 0);
        assert!(client.pending.lock().is_empty());

        // The connection survives a timed out request.
        assert!(client.is_connected());
        assert_eq!(client.commands().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_unsolicited_messages_reach_dispatcher() {
        let (_console, config) = console().await;
        let client = Client::connect(config).await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        client.dispatcher().bind("event", move |msg| {
            let _ = tx.send(msg.get("kind").to_string());
        });

        client.send(&Message::new("notify")).unwrap();
        let kind = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kind, "notice");
    }

    #[tokio::test]
    async fn test_close() {
        let (console, config) = console().await;
        let client = Client::connect(config).await.unwrap();
        client.commands().await.unwrap();

        client.close();
        assert!(!client.is_connected());
        assert!(matches!(
            client.request(&Message::new("help")).await,
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            client.send(&Message::new("help")),
            Err(ClientError::NotConnected)
        ));

        tokio::time::timeout(Duration::from_secs(2), async {
            while console.live_bots() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_server_close_fails_pending_request() {
        let (_console, config) = console().await;
        let client = Client::connect(config.with_request_timeout(Duration::from_secs(5)))
            .await
            .unwrap();

        let result = client.request(&Message::new("quit")).await;
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
        assert!(!client.is_connected());
    }
}
