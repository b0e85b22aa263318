use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Environment variable selecting [`LogFormat`].
pub const LOG_FORMAT_ENV: &str = "MEDIARY_LOG_FORMAT";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "plain" => Ok(Self::Text),
            other => Err(anyhow::anyhow!("unknown log format `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives; `None` reads `RUST_LOG` (default `info`).
    pub filter: Option<String>,
    pub with_target: bool,
}

impl ObservabilityConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_filter(mut self, directives: impl Into<String>) -> Self {
        self.filter = Some(directives.into());
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Read [`LOG_FORMAT_ENV`]; unknown values keep JSON.
    pub fn from_env() -> Self {
        let format = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();
        Self::default().with_format(format)
    }
}
