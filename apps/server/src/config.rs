use std::env;

/// Chat-completion provider used by the storefront chat widget.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

/// Third-party push service used for admin notifications.
#[derive(Debug, Clone)]
pub struct PushConfig {
    pub api_url: String,
    pub app_id: String,
    pub api_key: String,
}

impl PushConfig {
    pub fn enabled(&self) -> bool {
        !(self.app_id.trim().is_empty() || self.api_key.trim().is_empty())
    }
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Public catalog reads are served from built-in demo data.
    pub demo_mode: bool,
    pub admin_user: String,
    pub admin_password: String,
    pub session_secret: String,
    pub session_ttl_secs: i64,
    pub webapp_url: Option<String>,
    pub chat: ChatConfig,
    pub push: PushConfig,
}

const DEV_ADMIN_PASSWORD: &str = "change-me";
const DEV_SESSION_SECRET: &str = "dev-session-secret";

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:sparkles.db?mode=rwc".into(),
            host: "0.0.0.0".into(),
            port: 3000,
            demo_mode: false,
            admin_user: "admin".into(),
            admin_password: DEV_ADMIN_PASSWORD.into(),
            session_secret: DEV_SESSION_SECRET.into(),
            session_ttl_secs: 12 * 3600,
            webapp_url: None,
            chat: ChatConfig {
                api_url: "https://api.openai.com/v1/chat/completions".into(),
                api_key: None,
                model: "gpt-4o-mini".into(),
            },
            push: PushConfig {
                api_url: "https://onesignal.com/api/v1/notifications".into(),
                app_id: String::new(),
                api_key: String::new(),
            },
        }
    }
}

impl Config {
    /// Build the configuration from environment variables (after `.env` is loaded).
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a number, got {raw:?}"))?,
            Err(_) => defaults.port,
        };
        let session_ttl_secs = match env::var("SESSION_TTL_SECS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("SESSION_TTL_SECS must be a number, got {raw:?}"))?,
            Err(_) => defaults.session_ttl_secs,
        };

        let demo_mode = env::var("DEMO_MODE").map(|v| parse_flag(&v)).unwrap_or(false);
        let admin_password = secret(
            "ADMIN_PASSWORD",
            env::var("ADMIN_PASSWORD").ok(),
            demo_mode,
            &defaults.admin_password,
        )?;
        let session_secret = secret(
            "SESSION_SECRET",
            env::var("SESSION_SECRET").ok(),
            demo_mode,
            &defaults.session_secret,
        )?;

        let config = Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            host: env::var("HOST").unwrap_or(defaults.host),
            port,
            demo_mode,
            admin_user: env::var("ADMIN_USER").unwrap_or(defaults.admin_user),
            admin_password,
            session_secret,
            session_ttl_secs,
            webapp_url: non_empty(env::var("WEBAPP_URL").ok()),
            chat: ChatConfig {
                api_url: env::var("CHAT_API_URL").unwrap_or(defaults.chat.api_url),
                api_key: non_empty(env::var("CHAT_API_KEY").ok()),
                model: env::var("CHAT_MODEL").unwrap_or(defaults.chat.model),
            },
            push: PushConfig {
                api_url: env::var("PUSH_API_URL").unwrap_or(defaults.push.api_url),
                app_id: env::var("PUSH_APP_ID").unwrap_or_default(),
                api_key: env::var("PUSH_API_KEY").unwrap_or_default(),
            },
        };

        Ok(config)
    }

    /// Log every setting that silently degrades behaviour.
    pub fn warn_on_defaults(&self) {
        if self.admin_password == DEV_ADMIN_PASSWORD {
            tracing::warn!("ADMIN_PASSWORD not set, demo mode uses the development password");
        }
        if self.session_secret == DEV_SESSION_SECRET {
            tracing::warn!("SESSION_SECRET not set, demo mode signs sessions with a development key");
        }
        if self.chat.api_key.is_none() {
            tracing::warn!("CHAT_API_KEY not set, chat widget answers with a canned reply");
        }
        if !self.push.enabled() {
            tracing::warn!("PUSH_APP_ID/PUSH_API_KEY not set, admin notifications disabled");
        }
        if self.demo_mode {
            tracing::warn!("DEMO_MODE enabled, storefront catalog is served from built-in demo data");
        }
    }
}

/// Admin credentials have no production fallback. Only demo mode may run
/// on the development values.
fn secret(name: &str, value: Option<String>, demo_mode: bool, dev_value: &str) -> anyhow::Result<String> {
    match non_empty(value) {
        Some(value) => Ok(value),
        None if demo_mode => Ok(dev_value.to_string()),
        None => anyhow::bail!("{name} must be set (or enable DEMO_MODE for a local demo)"),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
