use std::io::Write;
use std::process::{Command, Stdio};

use crate::config::MailSettings;
use crate::error::DeliveryError;

/// Delivers one message to one recipient.
pub trait Notifier {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DeliveryError>;
}

/// Pipes a plain-text message into a sendmail-compatible command.
#[derive(Debug, Clone)]
pub struct SendmailNotifier {
    settings: MailSettings,
}

impl SendmailNotifier {
    pub fn new(settings: MailSettings) -> Self {
        Self { settings }
    }

    fn render(&self, recipient: &str, subject: &str, body: &str) -> String {
        let mut message = format!("To: {}\n", single_line(recipient));
        if let Some(from) = &self.settings.from {
            message.push_str(&format!("From: {}\n", single_line(from)));
        }
        message.push_str(&format!("Subject: {}\n", single_line(subject)));
        message.push_str("Content-Type: text/plain; charset=utf-8\n\n");
        message.push_str(body);
        message
    }
}

impl Notifier for SendmailNotifier {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let Some((program, args)) = self.settings.sendmail_command.split_first() else {
            return Err(DeliveryError::Rejected {
                recipient: recipient.to_string(),
                reason: "no mail command configured".to_string(),
            });
        };
        let command = self.settings.sendmail_command.join(" ");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| DeliveryError::Spawn { command, source })?;

        let message = self.render(recipient, subject, body);
        if let Some(mut stdin) = child.stdin.take()
            && let Err(err) = stdin.write_all(message.as_bytes())
        {
            drop(stdin);
            let _ = child.wait();
            return Err(DeliveryError::Pipe(err));
        }
        let status = child.wait().map_err(DeliveryError::Pipe)?;
        if !status.success() {
            return Err(DeliveryError::Exit {
                recipient: recipient.to_string(),
                status: status.to_string(),
            });
        }
        tracing::info!(recipient, subject, "message handed to mail command");
        Ok(())
    }
}

/// Dry-run notifier: records the send in the log and succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        tracing::info!(recipient, subject, body_len = body.len(), "dry run: message not sent");
        Ok(())
    }
}

/// Header values must not smuggle extra header lines.
fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
