//! Declarative configuration for the local bounded cache.

use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use moka::policy::EvictionPolicy;

use crate::config::parse_duration;
use crate::error::ConfigError;

/// Eviction policy of the local cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Eviction {
    /// Pure least-recently-used.
    Lru,
    /// LRU eviction with LFU admission.
    TinyLfu,
}

/// Parsed form of a local-cache spec string.
///
/// The spec is a comma-separated `key=value` list:
///
/// ```
/// use remoka::MokaSpec;
///
/// let spec = MokaSpec::parse("max_capacity=10000,time_to_live=10m,eviction=lru").unwrap();
/// assert_eq!(spec.max_capacity, Some(10_000));
/// ```
///
/// Durations use the same `<amount><unit>` tokens as cache-name TTL
/// overrides. Unknown keys and malformed entries are configuration
/// errors naming the offending token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MokaSpec {
    /// Maximum number of entries; unbounded when absent.
    pub max_capacity: Option<u64>,
    /// Expiry after write.
    pub time_to_live: Option<Duration>,
    /// Expiry after last access.
    pub time_to_idle: Option<Duration>,
    /// Eviction policy; Moka's default when absent.
    pub eviction: Option<Eviction>,
}

impl MokaSpec {
    /// Parse a spec string.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let mut parsed = Self::default();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((key, value)) = entry.split_once('=') else {
                return Err(ConfigError::InvalidLocalSpec {
                    token: entry.to_owned(),
                });
            };
            let value = value.trim();
            match key.trim() {
                "max_capacity" => {
                    parsed.max_capacity =
                        Some(value.parse().map_err(|_| ConfigError::InvalidLocalSpec {
                            token: entry.to_owned(),
                        })?);
                }
                "time_to_live" => {
                    parsed.time_to_live = Some(parse_duration("time_to_live", value)?);
                }
                "time_to_idle" => {
                    parsed.time_to_idle = Some(parse_duration("time_to_idle", value)?);
                }
                "eviction" => {
                    parsed.eviction = Some(match value {
                        "lru" => Eviction::Lru,
                        "tiny_lfu" => Eviction::TinyLfu,
                        _ => {
                            return Err(ConfigError::InvalidLocalSpec {
                                token: entry.to_owned(),
                            });
                        }
                    });
                }
                _ => {
                    return Err(ConfigError::InvalidLocalSpec {
                        token: entry.to_owned(),
                    });
                }
            }
        }
        Ok(parsed)
    }

    /// Build the Moka cache this spec describes. Local entries are
    /// keyed by physical key and hold the serialized value bytes.
    pub(crate) fn build(&self) -> moka::future::Cache<String, Bytes> {
        let mut builder = moka::future::Cache::builder();
        if let Some(capacity) = self.max_capacity {
            builder = builder.max_capacity(capacity);
        }
        if let Some(ttl) = self.time_to_live {
            builder = builder.time_to_live(ttl);
        }
        if let Some(tti) = self.time_to_idle {
            builder = builder.time_to_idle(tti);
        }
        if let Some(eviction) = self.eviction {
            builder = builder.eviction_policy(match eviction {
                Eviction::Lru => EvictionPolicy::lru(),
                Eviction::TinyLfu => EvictionPolicy::tiny_lfu(),
            });
        }
        builder.build()
    }
}

impl FromStr for MokaSpec {
    type Err = ConfigError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        Self::parse(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_spec() {
        let spec =
            MokaSpec::parse("max_capacity=500, time_to_live=10m, time_to_idle=2m, eviction=tiny_lfu")
                .unwrap();
        assert_eq!(spec.max_capacity, Some(500));
        assert_eq!(spec.time_to_live, Some(Duration::from_secs(600)));
        assert_eq!(spec.time_to_idle, Some(Duration::from_secs(120)));
        assert_eq!(spec.eviction, Some(Eviction::TinyLfu));
    }

    #[test]
    fn parse_empty_spec() {
        assert_eq!(MokaSpec::parse("").unwrap(), MokaSpec::default());
    }

    #[test]
    fn parse_rejects_unknown_key() {
        let error = MokaSpec::parse("weigher=bytes").unwrap_err();
        assert!(matches!(
            error,
            ConfigError::InvalidLocalSpec { token } if token == "weigher=bytes"
        ));
    }

    #[test]
    fn parse_rejects_missing_value() {
        assert!(MokaSpec::parse("max_capacity").is_err());
        assert!(MokaSpec::parse("max_capacity=many").is_err());
        assert!(MokaSpec::parse("eviction=fifo").is_err());
    }

    #[test]
    fn from_str_delegates() {
        let spec: MokaSpec = "max_capacity=10".parse().unwrap();
        assert_eq!(spec.max_capacity, Some(10));
    }
}
