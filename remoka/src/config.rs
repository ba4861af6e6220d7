//! Cache configuration types and the external property surface.

use std::time::Duration;

use serde::Deserialize;
use smol_str::SmolStr;

use crate::error::ConfigError;
use crate::format::ValueFormat;
use crate::local::MokaSpec;

/// Default channel for invalidation messages.
pub const DEFAULT_SYNC_CHANNEL: &str = "remoka:sync:channel";

/// Computes the physical key prefix for a cache name.
///
/// Every stored key is `<prefix(name)>:<key>`; the same logical key
/// always maps to the same physical key in every process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyPrefix {
    /// The cache name itself.
    Simple,
    /// `<prefix>:<name>`.
    Prefixed(SmolStr),
}

impl KeyPrefix {
    /// The prefix for `name` under this strategy.
    pub fn compute(&self, name: &str) -> String {
        match self {
            KeyPrefix::Simple => name.to_owned(),
            KeyPrefix::Prefixed(prefix) => format!("{prefix}:{name}"),
        }
    }
}

/// Per-cache configuration template.
///
/// Immutable value type; the `with`-style combinators return a modified
/// copy, so a default template can be shared and specialized per name.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// TTL applied to shared-store writes; `None` stores without expiry.
    pub(crate) store_ttl: Option<Duration>,
    /// Whether an explicit null is representable as a cache entry.
    pub(crate) allow_null_values: bool,
    pub(crate) key_prefix: KeyPrefix,
    pub(crate) value_format: ValueFormat,
    /// Declarative configuration for the local bounded cache.
    pub(crate) moka_spec: Option<MokaSpec>,
    pub(crate) sync_channel: SmolStr,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            store_ttl: None,
            allow_null_values: true,
            key_prefix: KeyPrefix::Simple,
            value_format: ValueFormat::default(),
            moka_spec: None,
            sync_channel: SmolStr::new_static(DEFAULT_SYNC_CHANNEL),
        }
    }
}

impl CacheConfig {
    /// Set the shared-store TTL. A zero duration stores without expiry.
    pub fn store_ttl(mut self, ttl: Duration) -> Self {
        self.store_ttl = Some(ttl);
        self
    }

    /// Prefix physical keys with `<prefix>:<name>` instead of `<name>`.
    pub fn prefix_keys_with(mut self, prefix: impl Into<SmolStr>) -> Self {
        self.key_prefix = KeyPrefix::Prefixed(prefix.into());
        self
    }

    /// Reject null values instead of storing the null sentinel.
    pub fn disable_null_values(mut self) -> Self {
        self.allow_null_values = false;
        self
    }

    /// Set the wire format for cached values.
    pub fn value_format(mut self, format: ValueFormat) -> Self {
        self.value_format = format;
        self
    }

    /// Configure the local bounded cache.
    pub fn moka_spec(mut self, spec: MokaSpec) -> Self {
        self.moka_spec = Some(spec);
        self
    }

    /// Publish invalidations on `channel` instead of the default.
    pub fn sync_channel(mut self, channel: impl Into<SmolStr>) -> Self {
        self.sync_channel = channel.into();
        self
    }
}

/// Externally-bound configuration properties.
///
/// Mirrors what a deployment would put in its configuration file; see
/// [`CacheRegistry::from_properties`](crate::CacheRegistry::from_properties)
/// for the wiring. `lock_sleep_ms` and `node_id` are consumed by the
/// store-writer and registry construction respectively.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RemokaProperties {
    /// Invalidation channel; defaults to [`DEFAULT_SYNC_CHANNEL`].
    pub channel: Option<String>,
    /// Extra key prefix in front of every cache name.
    pub prefix: Option<String>,
    /// Local bounded-cache spec string, e.g.
    /// `"max_capacity=10000,time_to_live=10m"`.
    pub moka_spec: Option<String>,
    /// Shared-store TTL as `<amount><unit>`, unit one of `d h m s`.
    pub redis_ttl: Option<String>,
    /// Comma-separated cache names created eagerly at startup.
    pub initial_caches: Option<String>,
    /// Whether null values are representable; defaults to `true`.
    pub allow_null_values: bool,
    /// Whether unseen cache names may be created on first access;
    /// defaults to `true`.
    pub allow_runtime_creation: bool,
    /// Advisory-lock poll interval in milliseconds; zero disables
    /// locking entirely.
    pub lock_sleep_ms: Option<u64>,
    /// Overrides the detected node identity.
    pub node_id: Option<String>,
}

impl Default for RemokaProperties {
    fn default() -> Self {
        Self {
            channel: None,
            prefix: None,
            moka_spec: None,
            redis_ttl: None,
            initial_caches: None,
            allow_null_values: true,
            allow_runtime_creation: true,
            lock_sleep_ms: None,
            node_id: None,
        }
    }
}

impl RemokaProperties {
    /// Names from `initial_caches`, trimmed, empty entries dropped.
    pub fn initial_cache_names(&self) -> Vec<SmolStr> {
        self.initial_caches
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(SmolStr::new)
            .collect()
    }

    /// Build the default [`CacheConfig`] these properties describe.
    pub fn cache_config(&self) -> Result<CacheConfig, ConfigError> {
        let mut config = CacheConfig::default();
        if let Some(prefix) = self.prefix.as_deref().filter(|p| !p.is_empty()) {
            config = config.prefix_keys_with(prefix);
        }
        if let Some(channel) = self.channel.as_deref().filter(|c| !c.is_empty()) {
            config = config.sync_channel(channel);
        }
        if let Some(spec) = self.moka_spec.as_deref().filter(|s| !s.is_empty()) {
            config = config.moka_spec(MokaSpec::parse(spec)?);
        }
        if let Some(ttl) = self.redis_ttl.as_deref().filter(|t| !t.is_empty()) {
            config = config.store_ttl(parse_duration("redis_ttl", ttl)?);
        }
        if !self.allow_null_values {
            config = config.disable_null_values();
        }
        Ok(config)
    }
}

/// Parse a `<amount><unit>` duration token, unit one of `d h m s`
/// (case-insensitive). `context` names the cache or property the token
/// came from, for error reporting.
pub fn parse_duration(context: &str, token: &str) -> Result<Duration, ConfigError> {
    let Some(unit) = token.chars().next_back() else {
        return Err(ConfigError::InvalidDurationUnit {
            context: SmolStr::new(context),
            token: token.to_owned(),
        });
    };
    let amount: u64 = token[..token.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| ConfigError::InvalidDurationAmount {
            context: SmolStr::new(context),
            token: token.to_owned(),
        })?;
    let seconds = match unit.to_ascii_lowercase() {
        'd' => amount * 86_400,
        'h' => amount * 3_600,
        'm' => amount * 60,
        's' => amount,
        _ => {
            return Err(ConfigError::InvalidDurationUnit {
                context: SmolStr::new(context),
                token: token.to_owned(),
            });
        }
    };
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(
            parse_duration("t", "2d").unwrap(),
            Duration::from_secs(2 * 86_400)
        );
        assert_eq!(parse_duration("t", "2H").unwrap(), Duration::from_secs(7_200));
        assert_eq!(parse_duration("t", "10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("t", "45s").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn parse_duration_bad_unit() {
        let error = parse_duration("orders#L10x#R2h", "10x").unwrap_err();
        match error {
            ConfigError::InvalidDurationUnit { context, token } => {
                assert_eq!(context, "orders#L10x#R2h");
                assert_eq!(token, "10x");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parse_duration_bad_amount() {
        assert!(matches!(
            parse_duration("t", "h"),
            Err(ConfigError::InvalidDurationAmount { .. })
        ));
        assert!(matches!(
            parse_duration("t", ""),
            Err(ConfigError::InvalidDurationUnit { .. })
        ));
    }

    #[test]
    fn key_prefix_compute() {
        assert_eq!(KeyPrefix::Simple.compute("orders"), "orders");
        assert_eq!(
            KeyPrefix::Prefixed(SmolStr::new_static("app")).compute("orders"),
            "app:orders"
        );
    }

    #[test]
    fn properties_defaults() {
        let properties: RemokaProperties = serde_json::from_str("{}").unwrap();
        assert!(properties.allow_null_values);
        assert!(properties.allow_runtime_creation);
        assert!(properties.initial_cache_names().is_empty());
    }

    #[test]
    fn properties_initial_names_split() {
        let properties = RemokaProperties {
            initial_caches: Some("orders, sessions,,users".to_owned()),
            ..RemokaProperties::default()
        };
        assert_eq!(
            properties.initial_cache_names(),
            vec!["orders", "sessions", "users"]
        );
    }

    #[test]
    fn properties_build_config() {
        let properties = RemokaProperties {
            prefix: Some("app".to_owned()),
            redis_ttl: Some("2h".to_owned()),
            allow_null_values: false,
            ..RemokaProperties::default()
        };
        let config = properties.cache_config().unwrap();
        assert_eq!(config.store_ttl, Some(Duration::from_secs(7_200)));
        assert!(!config.allow_null_values);
        assert_eq!(config.key_prefix.compute("orders"), "app:orders");
    }
}
