//! Delivery of sign-in codes
//!
//! With an SMTP host configured codes go out through lettre; otherwise they
//! are written to the log so a local install can still sign in.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::MailConfig;

/// Sends a one-time code to an email address
#[async_trait]
pub trait CodeMailer: Send + Sync {
    async fn send_code(&self, to_email: &str, code: &str) -> Result<()>;
}

/// SMTP delivery
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(host: &str, config: &MailConfig) -> Result<Self> {
        let credentials = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .context("Failed to create SMTP transport")?
            .credentials(credentials)
            .port(config.smtp_port)
            .build();

        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl CodeMailer for SmtpMailer {
    async fn send_code(&self, to_email: &str, code: &str) -> Result<()> {
        let email = Message::builder()
            .from(self.from.parse().map_err(|e| anyhow!("Invalid from address: {}", e))?)
            .to(to_email.parse().map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject("Your newsdesk sign-in code")
            .header(ContentType::TEXT_PLAIN)
            .body(format!(
                "Your sign-in code is {}.\n\nIt expires in a few minutes. If you did not ask to sign in, ignore this email.",
                code
            ))
            .context("Failed to build email")?;

        self.transport
            .send(email)
            .await
            .context("Failed to send email")?;
        Ok(())
    }
}

/// Writes codes to the log instead of mailing them
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl CodeMailer for LogMailer {
    async fn send_code(&self, to_email: &str, code: &str) -> Result<()> {
        tracing::info!(email = to_email, code, "Sign-in code (no SMTP host configured)");
        Ok(())
    }
}

/// Keeps sent codes in memory
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    /// Most recent code sent to an address
    pub fn last_code(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| code.clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl CodeMailer for RecordingMailer {
    async fn send_code(&self, to_email: &str, code: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((to_email.to_string(), code.to_string()));
        Ok(())
    }
}

/// Pick the mailer for the configuration
pub fn create_mailer(config: &MailConfig) -> Result<Arc<dyn CodeMailer>> {
    match config.smtp_host.as_deref().filter(|host| !host.trim().is_empty()) {
        Some(host) => Ok(Arc::new(SmtpMailer::new(host, config)?)),
        None => {
            tracing::warn!("No SMTP host configured; sign-in codes will be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}
