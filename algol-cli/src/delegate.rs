//! Target delegates: turn command lines into messages and render replies.

use algol_protocol::{Message, DATA_PROPERTY, ERROR_PROPERTY, STATUS_PROPERTY};
use colored::Colorize;

/// How replies are rendered.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Append `[ OK ]` / `[ FAILED ]` tags.
    pub print_status: bool,
    /// Rendering for an interactive session rather than one-shot evaluation.
    pub interactive: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            print_status: true,
            interactive: false,
        }
    }
}

impl RenderOptions {
    fn prefix(&self) -> &'static str {
        if self.interactive {
            " -> "
        } else {
            "algol-sh: "
        }
    }
}

/// A client-side personality for one kind of console target.
pub trait Delegate: Send + Sync {
    /// Target name selected on the command line.
    fn target(&self) -> &str;

    /// Builds the outbound message for a command line, or `None` if it is invalid.
    fn on_feed(&self, feed: &str, tokens: &[String]) -> Option<Message>;

    /// Renders a reply.
    fn on_response(&self, msg: &Message, options: &RenderOptions) -> String;
}

/// Talks to any console using the conventional reply shapes.
#[derive(Debug, Default)]
pub struct GenericDelegate;

impl Delegate for GenericDelegate {
    fn target(&self) -> &str {
        "generic"
    }

    fn on_feed(&self, _feed: &str, tokens: &[String]) -> Option<Message> {
        let (command, args) = tokens.split_first()?;
        if command.is_empty() {
            return None;
        }

        let mut msg = Message::new(command.as_str());
        for arg in args {
            match arg.split_once('=') {
                Some((key, value)) if !key.is_empty() => msg.set_property(key, value),
                _ => msg.set_property(arg.as_str(), "true"),
            }
        }
        Some(msg)
    }

    fn on_response(&self, msg: &Message, options: &RenderOptions) -> String {
        if msg.is_raw() {
            return format!("\n{}\n", msg.get(DATA_PROPERTY));
        }

        if !msg.feedback.is_ok() && msg.has_property(ERROR_PROPERTY) {
            let mut out = format!("{}{}", options.prefix(), msg.get(ERROR_PROPERTY));
            if options.print_status {
                out.push_str(&format!(" [ {} ]", "FAILED".red()));
            }
            return out;
        }

        if msg.has_property(STATUS_PROPERTY) {
            let mut out = format!("{}{}", options.prefix(), msg.get(STATUS_PROPERTY));
            if options.print_status {
                out.push_str(&format!(" [ {} ]", "OK".green()));
            }
            return out;
        }

        format!("Unknown message format, dumping:\n{}", msg.dump())
    }
}

/// Every supported target.
pub fn supported() -> Vec<Box<dyn Delegate>> {
    vec![Box::new(GenericDelegate)]
}

/// Looks up the delegate for `target`.
pub fn find(target: &str) -> Option<Box<dyn Delegate>> {
    supported().into_iter().find(|d| d.target() == target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use algol_protocol::{Feedback, MessageOptions};

    fn tokens(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    fn plain() -> RenderOptions {
        colored::control::set_override(false);
        RenderOptions::default()
    }

    #[test]
    fn test_feed() {
        let delegate = GenericDelegate;

        let msg = delegate
            .on_feed("help --brief", &tokens("help --brief"))
            .unwrap();
        assert_eq!(msg.identifier, "help");
        assert_eq!(msg.get("--brief"), "true");

        let msg = delegate
            .on_feed("svc-status service=db", &tokens("svc-status service=db"))
            .unwrap();
        assert_eq!(msg.identifier, "svc-status");
        assert_eq!(msg.get("service"), "db");

        assert!(delegate.on_feed("", &[]).is_none());
    }

    #[test]
    fn test_render_raw() {
        let msg = Message::new("help")
            .with_options(MessageOptions::new().with_raw())
            .with_property(DATA_PROPERTY, "help svc-status");
        assert_eq!(
            GenericDelegate.on_response(&msg, &plain()),
            "\nhelp svc-status\n"
        );
    }

    #[test]
    fn test_render_status_and_error() {
        let options = plain();

        let ok = Message::new("svc-status")
            .with_feedback(Feedback::Ok)
            .with_property(STATUS_PROPERTY, "available");
        assert_eq!(
            GenericDelegate.on_response(&ok, &options),
            "algol-sh: available [ OK ]"
        );

        let failed = Message::new("svc-status")
            .with_feedback(Feedback::Error)
            .with_property(ERROR_PROPERTY, "bad arg");
        assert_eq!(
            GenericDelegate.on_response(&failed, &options),
            "algol-sh: bad arg [ FAILED ]"
        );

        let quiet = RenderOptions {
            print_status: false,
            interactive: true,
        };
        assert_eq!(GenericDelegate.on_response(&ok, &quiet), " -> available");
    }

    #[test]
    fn test_render_unknown_shape() {
        let msg = Message::new("svc-status").with_property("x", "y");
        let out = GenericDelegate.on_response(&msg, &plain());
        assert!(out.starts_with("Unknown message format, dumping:\n"));
        assert!(out.contains("uid: svc-status"));
    }

    #[test]
    fn test_find() {
        assert_eq!(find("generic").unwrap().target(), "generic");
        assert!(find("dakapi").is_none());
        assert_eq!(supported().len(), 1);
    }
}
