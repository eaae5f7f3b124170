use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("rate must be a finite number greater than zero, got {0}")]
    InvalidRate(f64),
    #[error("burst_size must be at least 1")]
    InvalidBurstSize,
    #[error("stale_ttl_seconds ({stale_ttl}) must be >= ttl_seconds ({ttl})")]
    StaleTtlBelowTtl { ttl: u32, stale_ttl: u32 },
    #[error("cache_capacity must be at least 1")]
    InvalidCapacity,
    #[error("failure_threshold must be at least 1")]
    InvalidFailureThreshold,
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

// Gateway configuration. Defaults match the upstream API's documented
// budget: 2 requests per second with a burst of 10, a 5 minute fresh
// window and a 24 hour stale-fallback window.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    // Tokens added per second.
    pub rate: f64,
    // Maximum tokens accumulated in the bucket.
    pub burst_size: u32,
    // Fresh window in seconds. Zero makes every get a cache miss.
    pub ttl_seconds: u32,
    // Serve an expired-but-retained value when a refresh fails.
    pub stale_serving_enabled: bool,
    // Retention window in seconds, measured from the store time.
    pub stale_ttl_seconds: u32,
    // Maximum cached entries; least-recently-stored is evicted beyond this.
    pub cache_capacity: usize,
    // Consecutive refresh failures before the circuit opens.
    pub failure_threshold: u32,
    // Seconds the circuit stays open before closing again.
    pub reset_timeout_seconds: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            rate: 2.0,
            burst_size: 10,
            ttl_seconds: 300,
            stale_serving_enabled: true,
            stale_ttl_seconds: 86_400,
            cache_capacity: 1024,
            failure_threshold: 3,
            reset_timeout_seconds: 30,
        }
    }
}

impl GatewayConfig {
    // Rejects invalid parameters up front so misconfiguration surfaces at
    // construction, never at call time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(ConfigError::InvalidRate(self.rate));
        }
        if self.burst_size < 1 {
            return Err(ConfigError::InvalidBurstSize);
        }
        if self.stale_serving_enabled && self.stale_ttl_seconds < self.ttl_seconds {
            return Err(ConfigError::StaleTtlBelowTtl {
                ttl: self.ttl_seconds,
                stale_ttl: self.stale_ttl_seconds,
            });
        }
        if self.cache_capacity < 1 {
            return Err(ConfigError::InvalidCapacity);
        }
        if self.failure_threshold < 1 {
            return Err(ConfigError::InvalidFailureThreshold);
        }
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let config: GatewayConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.ttl_seconds))
    }

    // The retention window the cache actually uses: with stale serving
    // disabled it collapses to the fresh window.
    pub fn effective_stale_ttl(&self) -> Duration {
        if self.stale_serving_enabled {
            Duration::from_secs(u64::from(self.stale_ttl_seconds))
        } else {
            self.ttl()
        }
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.reset_timeout_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_nonpositive_rate() {
        let config = GatewayConfig {
            rate: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRate(_))
        ));

        let config = GatewayConfig {
            rate: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_burst() {
        let config = GatewayConfig {
            burst_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBurstSize)
        ));
    }

    #[test]
    fn rejects_stale_ttl_below_ttl() {
        let config = GatewayConfig {
            ttl_seconds: 300,
            stale_ttl_seconds: 60,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::StaleTtlBelowTtl { .. })
        ));
    }

    #[test]
    fn short_stale_ttl_is_fine_when_stale_serving_is_off() {
        let config = GatewayConfig {
            ttl_seconds: 300,
            stale_ttl_seconds: 60,
            stale_serving_enabled: false,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_stale_ttl(), config.ttl());
    }

    #[test]
    fn loads_partial_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"rate": 4.0, "burst_size": 20, "ttl_seconds": 60}}"#
        )
        .unwrap();

        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.rate, 4.0);
        assert_eq!(config.burst_size, 20);
        assert_eq!(config.ttl_seconds, 60);
        // Unspecified fields keep their defaults.
        assert_eq!(config.stale_ttl_seconds, 86_400);
    }

    #[test]
    fn file_with_invalid_values_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"rate": -1.0}}"#).unwrap();
        assert!(GatewayConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn file_with_unknown_fields_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"rte": 2.0}}"#).unwrap();
        assert!(matches!(
            GatewayConfig::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
