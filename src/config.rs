use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ResetTokenConfig {
    pub secret: String,
    pub ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Public base URL used when building reset links in emails.
    pub base_url: String,
    pub upload_dir: String,
    pub reset: ResetTokenConfig,
    pub smtp: SmtpConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let base_url =
            std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:3000".into());
        let upload_dir =
            std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "public/images/uploads".into());
        let reset = ResetTokenConfig {
            secret: std::env::var("RESET_TOKEN_SECRET")?,
            ttl_hours: std::env::var("RESET_TOKEN_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(24),
        };
        let smtp = SmtpConfig {
            host: std::env::var("SMTP_HOST")?,
            username: std::env::var("SMTP_USERNAME")?,
            password: std::env::var("SMTP_PASSWORD")?,
            from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "no-reply@localhost".into()),
        };
        Ok(Self {
            database_url,
            base_url,
            upload_dir,
            reset,
            smtp,
        })
    }
}
