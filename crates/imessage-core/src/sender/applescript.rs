//! Delivery through Messages.app via `osascript`.

use std::fmt;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use super::MessageSender;
use crate::{Error, Result};

/// Bound on the whole strategy chain.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// One way of addressing a recipient in Messages.app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStrategy {
    /// `buddy` of the iMessage service.
    ServiceBuddy,
    /// `participant` of an existing chat that contains the recipient.
    ExistingChatParticipant,
    /// `participant` of the iMessage account, starting a new conversation.
    AccountParticipant,
}

impl DeliveryStrategy {
    /// All strategies in the order they are tried.
    pub const CHAIN: [Self; 3] = [
        Self::ServiceBuddy,
        Self::ExistingChatParticipant,
        Self::AccountParticipant,
    ];

    /// AppleScript source for sending `text` to `recipient`.
    #[must_use]
    pub fn script(self, recipient: &str, text: &str) -> String {
        let recipient = escape(recipient);
        let text = escape(text);
        match self {
            Self::ServiceBuddy => format!(
                r#"tell application "Messages"
    set targetService to 1st service whose service type = iMessage
    set targetBuddy to buddy "{recipient}" of targetService
    send "{text}" to targetBuddy
end tell"#
            ),
            Self::ExistingChatParticipant => format!(
                r#"tell application "Messages"
    send "{text}" to participant "{recipient}" of (1st chat whose participants contains participant "{recipient}")
end tell"#
            ),
            Self::AccountParticipant => format!(
                r#"tell application "Messages"
    set targetAccount to 1st account whose service type = iMessage
    set targetParticipant to participant "{recipient}" of targetAccount
    send "{text}" to targetParticipant
end tell"#
            ),
        }
    }
}

impl fmt::Display for DeliveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ServiceBuddy => "service buddy",
            Self::ExistingChatParticipant => "existing chat participant",
            Self::AccountParticipant => "account participant",
        };
        f.write_str(name)
    }
}

/// Escapes backslashes and double quotes for an AppleScript string literal.
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Sends messages by scripting Messages.app.
#[derive(Debug, Clone)]
pub struct AppleScriptSender {
    program: String,
    strategies: Vec<DeliveryStrategy>,
    timeout: Duration,
}

impl Default for AppleScriptSender {
    fn default() -> Self {
        Self {
            program: "osascript".to_string(),
            strategies: DeliveryStrategy::CHAIN.to_vec(),
            timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

impl AppleScriptSender {
    /// Creates a sender using `osascript` and the full strategy chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bound on the whole strategy chain.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Uses a different script runner. It is invoked as `<program> -e <script>`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Whether Messages.app is currently running.
    ///
    /// Any failure to ask, including a probe that takes longer than ten
    /// seconds, reports `false`.
    pub async fn is_messages_running(&self) -> bool {
        let script = r#"tell application "System Events"
    return (name of processes) contains "Messages"
end tell"#;
        let probe = Command::new(&self.program)
            .arg("-e")
            .arg(script)
            .kill_on_drop(true)
            .output();
        match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
            Ok(Ok(output)) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout)
                    .trim()
                    .eq_ignore_ascii_case("true")
            }
            Ok(Ok(_)) => false,
            Ok(Err(err)) => {
                debug!(error = %err, "Could not run Messages probe");
                false
            }
            Err(_) => {
                debug!("Messages probe timed out");
                false
            }
        }
    }

    async fn run(&self, script: &str) -> Result<()> {
        let output = Command::new(&self.program)
            .arg("-e")
            .arg(script)
            .kill_on_drop(true)
            .output()
            .await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        Err(Error::SendFailed(if detail.is_empty() {
            format!("{} exited with {}", self.program, output.status)
        } else {
            detail
        }))
    }

    async fn deliver(&self, recipient: &str, text: &str) -> Result<()> {
        let mut last_error = Error::SendFailed("no delivery strategy configured".to_string());
        for strategy in &self.strategies {
            match self.run(&strategy.script(recipient, text)).await {
                Ok(()) => {
                    info!(%strategy, "Message handed to Messages");
                    return Ok(());
                }
                Err(err) => {
                    debug!(%strategy, error = %err, "Delivery strategy failed");
                    last_error = err;
                }
            }
        }
        Err(match last_error {
            Error::SendFailed(reason) => Error::SendFailed(reason),
            other => Error::SendFailed(other.to_string()),
        })
    }
}

impl MessageSender for AppleScriptSender {
    async fn send(&self, recipient: &str, text: &str) -> Result<()> {
        if recipient.trim().is_empty() {
            return Err(Error::SendFailed("no recipient".to_string()));
        }
        match tokio::time::timeout(self.timeout, self.deliver(recipient, text)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.timeout, "Send timed out; Messages may still deliver it");
                Err(Error::Timeout {
                    operation: "send",
                    after: self.timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"say "hi""#), r#"say \"hi\""#);
        assert_eq!(escape(r"C:\path"), r"C:\\path");
    }

    #[test]
    fn test_scripts_embed_escaped_values() {
        let script = DeliveryStrategy::ServiceBuddy.script("+15551234567", r#"a "quote""#);
        assert!(script.contains(r#"buddy "+15551234567""#));
        assert!(script.contains(r#"send "a \"quote\"""#));

        let script = DeliveryStrategy::ExistingChatParticipant.script("bob@example.com", "hi");
        assert_eq!(script.matches("bob@example.com").count(), 2);

        let script = DeliveryStrategy::AccountParticipant.script("+1555", "hi");
        assert!(script.contains("1st account whose service type = iMessage"));
    }

    #[tokio::test]
    async fn test_empty_recipient_rejected() {
        let sender = AppleScriptSender::new().with_program("true");
        assert!(matches!(
            sender.send(" ", "hello").await,
            Err(Error::SendFailed(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let sender = AppleScriptSender::new().with_program("true");
        assert!(sender.send("+15551234567", "hello").await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_all_strategies_failing_is_send_failed() {
        let sender = AppleScriptSender::new().with_program("false");
        assert!(matches!(
            sender.send("+15551234567", "hello").await,
            Err(Error::SendFailed(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_reports_false_on_failure() {
        let sender = AppleScriptSender::new().with_program("false");
        assert!(!sender.is_messages_running().await);
    }
}
