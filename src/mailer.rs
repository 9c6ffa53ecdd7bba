use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::SmtpConfig;

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// External mail transport. Delivery failures are reported to the caller,
/// which decides whether they are fatal (for password reset they are not).
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .context("smtp relay")?
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid from address: {e}"))?;
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email
                .to
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid to address: {e}"))?)
            .subject(email.subject)
            .multipart(MultiPart::alternative_plain_html(email.text, email.html))
            .context("build email")?;

        self.transport.send(message).await.context("smtp send")?;
        Ok(())
    }
}

/// Builds the password-reset email for a freshly issued token.
pub fn reset_password_email(to: &str, base_url: &str, token: &str) -> OutgoingEmail {
    let link = format!("{base_url}/resetPassword/{token}");
    OutgoingEmail {
        to: to.to_string(),
        subject: "Password Change Request".to_string(),
        text: format!("Paste this link in your browser {link}"),
        html: format!(r#"<p>Click on link: <a href="{link}">{link}</a></p>"#),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_email_embeds_link_with_token() {
        let email = reset_password_email("alice@x.com", "http://localhost:3000", "tok123");
        assert_eq!(email.to, "alice@x.com");
        assert!(email.text.contains("http://localhost:3000/resetPassword/tok123"));
        assert!(email.html.contains("http://localhost:3000/resetPassword/tok123"));
    }
}
