use crate::auth::jwt::JwtConfig;

/// Fallback webhook secret used only in mock mode.
const DEV_WEBHOOK_SECRET: &str = "dev-webhook-secret";

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development except
/// the secrets. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// JWT verification settings for caller identity.
    pub jwt: JwtConfig,
    /// Shared secret expected from scheduled sweep triggers.
    pub cron_secret: String,
    /// In-process reaper settings.
    pub reaper: ReaperConfig,
    /// Payment gateway settings.
    pub payment: PaymentConfig,
}

/// Settings for the in-process reaper loop.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

/// Payment gateway settings.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Deployment environment; only `production` talks to a live gateway.
    pub app_env: String,
    pub gateway_url: Option<String>,
    pub merchant_id: Option<String>,
    pub merchant_key: Option<String>,
    /// HMAC key for callback signatures.
    pub webhook_secret: String,
    pub currency: String,
    pub callback_url: String,
    /// Pending-payment bookings older than this are abandoned.
    pub timeout_mins: i64,
}

impl PaymentConfig {
    /// Whether the live gateway is used. Requires production plus a full set
    /// of credentials; anything else runs in mock mode.
    pub fn is_live(&self) -> bool {
        self.app_env == "production"
            && self.gateway_url.is_some()
            && self.merchant_id.is_some()
            && self.merchant_key.is_some()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                                        |
    /// |--------------------------|------------------------------------------------|
    /// | `HOST`                   | `0.0.0.0`                                      |
    /// | `PORT`                   | `3000`                                         |
    /// | `CORS_ORIGINS`           | `http://localhost:5173`                        |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                                           |
    /// | `CRON_SECRET`            | **required**                                   |
    /// | `REAPER_ENABLED`         | `true`                                         |
    /// | `REAPER_INTERVAL_SECS`   | `60`                                           |
    /// | `APP_ENV`                | `development`                                  |
    /// | `PAYMENT_GATEWAY_URL`    | unset                                          |
    /// | `PAYMENT_MERCHANT_ID`    | unset                                          |
    /// | `PAYMENT_MERCHANT_KEY`   | unset                                          |
    /// | `PAYMENT_WEBHOOK_SECRET` | merchant key, or a dev value in mock mode      |
    /// | `PAYMENT_CURRENCY`       | `INR`                                          |
    /// | `PAYMENT_CALLBACK_URL`   | `http://localhost:3000/api/v1/payments/webhook`|
    /// | `PAYMENT_TIMEOUT_MINS`   | `30`                                           |
    ///
    /// # Panics
    ///
    /// Panics on unparseable values, a missing `CRON_SECRET`, or a live
    /// gateway without a webhook secret. Misconfiguration fails fast.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let cron_secret =
            std::env::var("CRON_SECRET").expect("CRON_SECRET must be set in the environment");
        assert!(!cron_secret.is_empty(), "CRON_SECRET must not be empty");

        let reaper = ReaperConfig {
            enabled: std::env::var("REAPER_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            interval_secs: std::env::var("REAPER_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".into())
                .parse()
                .expect("REAPER_INTERVAL_SECS must be a valid u64"),
        };

        let payment = PaymentConfig::from_env();
        let jwt = JwtConfig::from_env();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            jwt,
            cron_secret,
            reaper,
            payment,
        }
    }
}

impl PaymentConfig {
    fn from_env() -> Self {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let mut config = Self {
            app_env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
            gateway_url: non_empty("PAYMENT_GATEWAY_URL"),
            merchant_id: non_empty("PAYMENT_MERCHANT_ID"),
            merchant_key: non_empty("PAYMENT_MERCHANT_KEY"),
            webhook_secret: String::new(),
            currency: std::env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "INR".into()),
            callback_url: std::env::var("PAYMENT_CALLBACK_URL")
                .unwrap_or_else(|_| "http://localhost:3000/api/v1/payments/webhook".into()),
            timeout_mins: std::env::var("PAYMENT_TIMEOUT_MINS")
                .unwrap_or_else(|_| "30".into())
                .parse()
                .expect("PAYMENT_TIMEOUT_MINS must be a valid i64"),
        };

        config.webhook_secret = match non_empty("PAYMENT_WEBHOOK_SECRET")
            .or_else(|| config.merchant_key.clone())
        {
            Some(secret) => secret,
            None if !config.is_live() => DEV_WEBHOOK_SECRET.to_string(),
            None => panic!("PAYMENT_WEBHOOK_SECRET must be set for the live gateway"),
        };

        config
    }
}
