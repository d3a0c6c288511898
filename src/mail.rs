//! Outbound mail relay check.

use failure::Fail;
use lettre::address::AddressError;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::info;

use crate::config::SmtpConfig;

#[derive(Debug, Fail)]
pub enum MailError {
    #[fail(display = "SMTP_SERVER is not configured")]
    NotConfigured,
    #[fail(display = "Invalid address: {}", _0)]
    Address(AddressError),
    #[fail(display = "Could not build message: {}", _0)]
    Build(lettre::error::Error),
    #[fail(display = "SMTP error: {}", _0)]
    Smtp(lettre::transport::smtp::Error),
}

impl From<AddressError> for MailError {
    fn from(err: AddressError) -> Self {
        MailError::Address(err)
    }
}

impl From<lettre::error::Error> for MailError {
    fn from(err: lettre::error::Error) -> Self {
        MailError::Build(err)
    }
}

impl From<lettre::transport::smtp::Error> for MailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        MailError::Smtp(err)
    }
}

/// The message sent by `mail-check`.
pub fn check_message(smtp: &SmtpConfig, to: &str) -> Result<Message, MailError> {
    let from: Mailbox = smtp.from.parse()?;
    let to: Mailbox = to.parse()?;
    let message = Message::builder()
        .from(from)
        .to(to)
        .subject("posture-face mail relay check")
        .body(String::from(
            "This message confirms that the posture-face backend can reach its mail relay.",
        ))?;
    Ok(message)
}

/// Send one message to `to` through the configured relay using STARTTLS.
pub fn send_check(smtp: Option<&SmtpConfig>, to: &str) -> Result<(), MailError> {
    let smtp = smtp.ok_or(MailError::NotConfigured)?;
    let message = check_message(smtp, to)?;

    let mailer = SmtpTransport::starttls_relay(&smtp.server)?
        .port(smtp.port)
        .credentials(Credentials::new(
            smtp.username.clone(),
            smtp.password.clone(),
        ))
        .build();

    info!("Sending relay check to {} via {}:{}", to, smtp.server, smtp.port);
    mailer.send(&message)?;
    Ok(())
}

#[cfg(test)]
pub mod test {
    use super::*;

    fn smtp() -> SmtpConfig {
        SmtpConfig {
            server: "smtp.example.com".to_string(),
            port: 587,
            username: "mailer".to_string(),
            password: "hunter2".to_string(),
            from: "noreply@example.com".to_string(),
        }
    }

    #[test]
    fn test_not_configured() {
        assert!(matches!(
            send_check(None, "ops@example.com"),
            Err(MailError::NotConfigured)
        ));
    }

    #[test]
    fn test_bad_recipient() {
        assert!(matches!(
            check_message(&smtp(), "not an address"),
            Err(MailError::Address(_))
        ));
    }

    #[test]
    fn test_message_headers() {
        let message = check_message(&smtp(), "ops@example.com").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("From: noreply@example.com"));
        assert!(raw.contains("To: ops@example.com"));
    }
}
