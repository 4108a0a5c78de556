//! Email service for account and overdue notifications

use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use std::str::FromStr;

use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
};

/// One overdue line in a reminder
pub struct OverdueLine {
    pub title: String,
    pub barcode: String,
    pub due_date: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone)]
pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Send the temporary password of a new account
    pub async fn send_welcome(&self, to: &str, name: &str, login: &str, password: &str) -> AppResult<()> {
        let subject = "Your library account";
        let body = welcome_body(name, login, password);
        self.send_email(to, subject, &body).await
    }

    /// Send an overdue reminder listing every late item
    pub async fn send_overdue_notice(&self, to: &str, name: &str, lines: &[OverdueLine]) -> AppResult<()> {
        let subject = "Overdue library loans";
        let body = overdue_body(name, lines);
        self.send_email(to, subject, &body).await
    }

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        if !self.config.enabled {
            tracing::debug!(to, subject, "Email disabled, message not sent");
            return Ok(());
        }

        let from_name = self
            .config
            .smtp_from_name
            .as_deref()
            .unwrap_or("Campus Library");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AppError::Validation(format!("Invalid email address {}: {}", to, e)))?;

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(format!(
                                r#"<html><body><pre>{}</pre></body></html>"#,
                                body.replace('\n', "<br>")
                            )),
                    ),
            )
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))?;

        let mailer_builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AppError::Internal(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer_builder = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer_builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer_builder
        };

        let mailer = mailer_builder.build();

        // SmtpTransport is blocking
        tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::Internal(format!("Email task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Failed to send email: {}", e)))?;

        tracing::info!(to, subject, "Email sent");
        Ok(())
    }
}

fn welcome_body(name: &str, login: &str, password: &str) -> String {
    format!(
        r#"
Hello {name},

An account has been created for you at the campus library.

Login: {login}
Temporary password: {password}

Please change this password after your first sign-in.
"#
    )
}

fn overdue_body(name: &str, lines: &[OverdueLine]) -> String {
    let items: Vec<String> = lines
        .iter()
        .map(|l| format!("  - {} ({}), due {}", l.title, l.barcode, l.due_date.format("%Y-%m-%d")))
        .collect();

    format!(
        r#"
Hello {name},

The following items are overdue:

{items}

Please return them to the library as soon as possible.
"#,
        items = items.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_overdue_body_lists_items() {
        let lines = vec![
            OverdueLine {
                title: "Germinal".to_string(),
                barcode: "B000001-001".to_string(),
                due_date: chrono::Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            },
            OverdueLine {
                title: "Nana".to_string(),
                barcode: "B000002-001".to_string(),
                due_date: chrono::Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap(),
            },
        ];
        let body = overdue_body("Jane", &lines);
        assert!(body.contains("Hello Jane"));
        assert!(body.contains("  - Germinal (B000001-001), due 2024-03-01"));
        assert!(body.contains("  - Nana (B000002-001), due 2024-03-05"));
    }

    #[test]
    fn test_disabled_service_skips_sending() {
        let service = EmailService::new(EmailConfig::default());
        assert!(!service.is_enabled());
        let result = tokio_test::block_on(service.send_welcome("jane@example.org", "Jane", "jane", "secret"));
        assert!(result.is_ok());
    }
}
