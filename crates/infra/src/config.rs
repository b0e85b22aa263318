//! Runtime configuration for the unit of work and the demo handlers.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use mediary_core::EntityId;

/// Environment variable read by [`UnitOfWorkConfig::from_env`].
pub const PUBLISH_POLICY_ENV: &str = "MEDIARY_PUBLISH_POLICY";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown publish policy `{0}` (expected `publish-then-persist` or `persist-then-publish`)")]
    UnknownPublishPolicy(String),
}

/// Where the persistence write sits relative to publishing drained events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishPolicy {
    /// Drain, publish every event, then persist.
    ///
    /// Handlers may observe state that is not durable yet; a failed write is
    /// compensated by rolling back the surrounding transaction.
    #[default]
    PublishThenPersist,
    /// Drain, persist, then publish.
    PersistThenPublish,
}

impl PublishPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublishThenPersist => "publish-then-persist",
            Self::PersistThenPublish => "persist-then-publish",
        }
    }
}

impl core::fmt::Display for PublishPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "publish-then-persist" => Ok(Self::PublishThenPersist),
            "persist-then-publish" => Ok(Self::PersistThenPublish),
            other => Err(ConfigError::UnknownPublishPolicy(other.to_string())),
        }
    }
}

/// Unit-of-work configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOfWorkConfig {
    pub publish_policy: PublishPolicy,
}

impl UnitOfWorkConfig {
    pub fn with_publish_policy(mut self, policy: PublishPolicy) -> Self {
        self.publish_policy = policy;
        self
    }

    /// Read [`PUBLISH_POLICY_ENV`]; unset or unknown values keep the default.
    pub fn from_env() -> Self {
        Self::from_value(std::env::var(PUBLISH_POLICY_ENV).ok().as_deref())
    }

    fn from_value(value: Option<&str>) -> Self {
        let Some(raw) = value else {
            return Self::default();
        };
        match raw.parse() {
            Ok(policy) => Self::default().with_publish_policy(policy),
            Err(error) => {
                warn!(
                    variable = PUBLISH_POLICY_ENV,
                    error = %error,
                    fallback = %PublishPolicy::default(),
                    "ignoring publish policy"
                );
                Self::default()
            }
        }
    }
}

/// Which records the demo handlers work on.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Order reworked by `CreateOrder`.
    pub order_id: EntityId,
    /// Buyer touched when an order is created.
    pub buyer_id: EntityId,
    /// Buyer touched when that buyer update is announced.
    pub cascade_buyer_id: EntityId,
    pub acknowledge_delay: Duration,
    /// Time `DoWork` and its notification handler each spend working.
    pub work_delay: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            order_id: EntityId::new(3),
            buyer_id: EntityId::new(3),
            cascade_buyer_id: EntityId::new(2),
            acknowledge_delay: Duration::from_millis(500),
            work_delay: Duration::from_millis(500),
        }
    }
}

impl HandlerConfig {
    pub fn with_order(mut self, id: EntityId) -> Self {
        self.order_id = id;
        self
    }

    pub fn with_buyers(mut self, buyer_id: EntityId, cascade_buyer_id: EntityId) -> Self {
        self.buyer_id = buyer_id;
        self.cascade_buyer_id = cascade_buyer_id;
        self
    }

    pub fn with_acknowledge_delay(mut self, delay: Duration) -> Self {
        self.acknowledge_delay = delay;
        self
    }

    pub fn with_work_delay(mut self, delay: Duration) -> Self {
        self.work_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_its_own_display() {
        for policy in [PublishPolicy::PublishThenPersist, PublishPolicy::PersistThenPublish] {
            assert_eq!(policy.to_string().parse::<PublishPolicy>(), Ok(policy));
        }
        assert_eq!(
            " Persist-Then-Publish ".parse::<PublishPolicy>(),
            Ok(PublishPolicy::PersistThenPublish)
        );
    }

    #[test]
    fn unknown_policy_is_an_error() {
        assert_eq!(
            "eventually".parse::<PublishPolicy>(),
            Err(ConfigError::UnknownPublishPolicy("eventually".to_string()))
        );
    }

    #[test]
    fn env_value_falls_back_to_default() {
        assert_eq!(UnitOfWorkConfig::from_value(None), UnitOfWorkConfig::default());
        assert_eq!(
            UnitOfWorkConfig::from_value(Some("sometimes")).publish_policy,
            PublishPolicy::PublishThenPersist
        );
        assert_eq!(
            UnitOfWorkConfig::from_value(Some("persist-then-publish")).publish_policy,
            PublishPolicy::PersistThenPublish
        );
    }

    #[test]
    fn policy_serializes_kebab_case() {
        let json = serde_json::to_string(&UnitOfWorkConfig::default()).unwrap();
        assert_eq!(json, r#"{"publish_policy":"publish-then-persist"}"#);
    }

    #[test]
    fn handler_defaults_point_at_the_demo_records() {
        let config = HandlerConfig::default();
        assert_eq!(config.order_id, EntityId::new(3));
        assert_eq!(config.buyer_id, EntityId::new(3));
        assert_eq!(config.cascade_buyer_id, EntityId::new(2));
        assert_eq!(config.acknowledge_delay, Duration::from_millis(500));

        let config = config.with_acknowledge_delay(Duration::ZERO);
        assert_eq!(config.acknowledge_delay, Duration::ZERO);
    }
}
