//! Email notifications for domain events. Sends are fire-and-forget: a
//! failure is logged and never surfaces to the request that triggered it.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{self, AppConfig};

#[derive(Clone)]
pub struct Mailer {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: String,
}

impl Mailer {
    /// Build the mailer from config. Returns `None` when SMTP is not
    /// configured, which disables notifications cleanly.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        let host = config.smtp.host.as_deref()?;
        let from = config.smtp.from.as_deref()?.to_string();
        let port = config.smtp.port;

        let transport = if config.smtp.starttls {
            let b = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host).ok()?;
            let b = b.port(port);
            let b = if let (Some(u), Some(p)) = (&config.smtp.username, &config.smtp.password) {
                b.credentials(Credentials::new(u.clone(), p.clone()))
            } else {
                b
            };
            info!(host = %host, port = port, "Mailer initialized (SMTP with STARTTLS)");
            b.build()
        } else {
            let b = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port);
            let b = if let (Some(u), Some(p)) = (&config.smtp.username, &config.smtp.password) {
                b.credentials(Credentials::new(u.clone(), p.clone()))
            } else {
                b
            };
            info!(host = %host, port = port, "Mailer initialized (SMTP)");
            b.build()
        };

        Some(Self {
            transport: Arc::new(transport),
            from,
        })
    }

    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), String> {
        let to_addr: Mailbox = to.parse().map_err(|_| format!("Invalid recipient: {}", to))?;
        let from_addr: Mailbox = self
            .from
            .parse()
            .map_err(|e| format!("Invalid SMTP_FROM: {}", e))?;

        let email = Message::builder()
            .from(from_addr)
            .to(to_addr)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| e.to_string())?;

        self.transport.send(email).await.map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Queue a send without waiting on the result
    pub fn send_detached(&self, to: String, subject: String, body: String) {
        let mailer = self.clone();
        tokio::spawn(async move {
            match mailer.send(&to, &subject, &body).await {
                Ok(()) => info!(to = %to, subject = %subject, "Notification email sent"),
                Err(e) => warn!(to = %to, subject = %subject, "Notification email failed: {}", e),
            }
        });
    }
}

/// Process-wide mailer, built once from config. `None` when SMTP is unset.
pub fn mailer() -> Option<&'static Mailer> {
    use std::sync::OnceLock;
    static MAILER: OnceLock<Option<Mailer>> = OnceLock::new();
    MAILER
        .get_or_init(|| Mailer::from_config(config::config()))
        .as_ref()
}

pub fn notify_registration(email: &str, first_name: &str, org_name: &str) {
    if let Some(mailer) = mailer() {
        mailer.send_detached(
            email.to_string(),
            format!("Welcome to {}", org_name),
            format!(
                "Hi {},\n\nYour patient account at {} has been created. \
                 You can now log in and book appointments.\n",
                first_name, org_name
            ),
        );
    }
}

pub fn notify_appointment_requested(doctor_email: &str, patient_name: &str, scheduled_at: &str) {
    if let Some(mailer) = mailer() {
        mailer.send_detached(
            doctor_email.to_string(),
            "New appointment request".to_string(),
            format!(
                "{} has requested an appointment on {}. \
                 Please approve or decline it from your dashboard.\n",
                patient_name, scheduled_at
            ),
        );
    }
}

pub fn notify_appointment_status(email: &str, status: &str, scheduled_at: &str) {
    if let Some(mailer) = mailer() {
        mailer.send_detached(
            email.to_string(),
            format!("Appointment {}", status.to_lowercase()),
            format!(
                "Your appointment on {} is now {}.\n",
                scheduled_at, status
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn mailer_disabled_without_smtp_host() {
        let config = AppConfig::from_env();
        if config.smtp.host.is_none() || config.smtp.from.is_none() {
            assert!(Mailer::from_config(&config).is_none());
        }
    }
}
