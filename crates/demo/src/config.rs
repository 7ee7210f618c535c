//! Demo configuration loaded from environment variables.

use std::str::FromStr;

use domain::UserKey;

const DEFAULT_USER_KEY: &str = "Fuller Gonzalez";
const DEFAULT_CHECKOUTS: usize = 1000;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Demo configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `DEMO_USER_KEY` — key every checkout is submitted for (default: `"Fuller Gonzalez"`)
/// - `DEMO_CHECKOUTS` — number of concurrent checkouts (default: `1000`)
/// - `DEMO_LOG_FORMAT` — `text` or `json` (default: `text`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    pub user_key: UserKey,
    pub checkouts: usize,
    pub log_format: LogFormat,
    pub log_level: String,
}

impl DemoConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            user_key: var("DEMO_USER_KEY")
                .filter(|k| !k.trim().is_empty())
                .map(UserKey::from)
                .unwrap_or_else(|| UserKey::new(DEFAULT_USER_KEY)),
            checkouts: var("DEMO_CHECKOUTS")
                .and_then(|n| n.trim().parse().ok())
                .unwrap_or(DEFAULT_CHECKOUTS),
            log_format: var("DEMO_LOG_FORMAT")
                .and_then(|f| f.parse().ok())
                .unwrap_or_default(),
            log_level: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            user_key: UserKey::new(DEFAULT_USER_KEY),
            checkouts: DEFAULT_CHECKOUTS,
            log_format: LogFormat::default(),
            log_level: "info".to_string(),
        }
    }
}
