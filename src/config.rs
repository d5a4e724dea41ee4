//! Application configuration loaded from environment variables.
//!
//! The trading account **must** be provided via `DEX_ACCOUNT`. Everything
//! else has a default:
//! - `DEX_GATEWAY_URL`: WebSocket endpoint of the ledger gateway
//! - `DEX_REQUEST_TIMEOUT_SECS`: per-request timeout
//! - `DEX_TRADE_HISTORY_LIMIT`: trades kept per subscription
//! - `DEX_RESUBSCRIBE_MAX_ATTEMPTS`: retries before a dropped feed is given up

use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;

use crate::error::MirrorError;

/// Default gateway endpoint (a local node).
const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:8546/dex";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const DEFAULT_TRADE_HISTORY_LIMIT: usize = 1000;

const DEFAULT_RESUBSCRIBE_MAX_ATTEMPTS: u32 = 10;

/// Initial backoff duration between resubscription attempts.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Maximum backoff duration between resubscription attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub account: Address,
    pub gateway: GatewayConfig,
    pub sync: SyncSettings,
}

/// Connection settings for the ledger gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    pub request_timeout: Duration,
}

/// Tuning for the synchronization core.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Most recent trades kept per subscription; older ones are evicted.
    pub trade_history_limit: usize,
    pub feed: FeedSettings,
}

/// Recovery policy for dropped trade feeds.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            trade_history_limit: DEFAULT_TRADE_HISTORY_LIMIT,
            feed: FeedSettings::default(),
        }
    }
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
            max_attempts: DEFAULT_RESUBSCRIBE_MAX_ATTEMPTS,
        }
    }
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`MirrorError::Config`] if `DEX_ACCOUNT` is missing or any
/// variable holds a value that cannot be parsed.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let account = non_empty_var("DEX_ACCOUNT")
        .ok_or_else(|| MirrorError::Config("DEX_ACCOUNT is not set".to_string()))?;
    let account = Address::from_str(&account)
        .map_err(|e| MirrorError::Config(format!("DEX_ACCOUNT is not an address: {e}")))?;

    let url = non_empty_var("DEX_GATEWAY_URL").unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());

    let timeout_secs = parse_var("DEX_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
    let trade_history_limit = parse_var("DEX_TRADE_HISTORY_LIMIT", DEFAULT_TRADE_HISTORY_LIMIT)?;
    if trade_history_limit == 0 {
        return Err(MirrorError::Config(
            "DEX_TRADE_HISTORY_LIMIT must be greater than zero".to_string(),
        ));
    }
    let max_attempts = parse_var(
        "DEX_RESUBSCRIBE_MAX_ATTEMPTS",
        DEFAULT_RESUBSCRIBE_MAX_ATTEMPTS,
    )?;

    Ok(AppConfig {
        account,
        gateway: GatewayConfig {
            url,
            request_timeout: Duration::from_secs(timeout_secs),
        },
        sync: SyncSettings {
            trade_history_limit,
            feed: FeedSettings {
                max_attempts,
                ..FeedSettings::default()
            },
        },
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Parses an optional environment variable, falling back to `default`.
fn parse_var<T>(name: &str, default: T) -> crate::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| MirrorError::Config(format!("{name}={raw}: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: &str = "0x90F8bf6A479f320ead074411a4B0e7944Ea8c9C1";

    /// Serializes tests that touch the process environment.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    /// Helper that temporarily sets env vars, runs `f`, then restores originals.
    ///
    /// # Safety
    ///
    /// Callers are serialized through [`ENV_LOCK`]; nothing else in the
    /// crate reads these variables.
    fn with_env<F: FnOnce()>(vars: &[(&str, Option<&str>)], f: F) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let originals: Vec<(&str, Option<String>)> = vars
            .iter()
            .map(|(k, _)| (*k, std::env::var(k).ok()))
            .collect();

        for (k, v) in vars {
            // SAFETY: ENV_LOCK is held for the whole read-modify-restore cycle.
            unsafe {
                match v {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }

        f();

        for (k, original) in originals {
            // SAFETY: restoring original values, same single-threaded context.
            unsafe {
                match original {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn defaults_with_only_account() {
        with_env(
            &[
                ("DEX_ACCOUNT", Some(ACCOUNT)),
                ("DEX_GATEWAY_URL", None),
                ("DEX_REQUEST_TIMEOUT_SECS", None),
                ("DEX_TRADE_HISTORY_LIMIT", None),
                ("DEX_RESUBSCRIBE_MAX_ATTEMPTS", None),
            ],
            || {
                let config = fetch_config().unwrap();
                assert_eq!(config.account, Address::from_str(ACCOUNT).unwrap());
                assert_eq!(config.gateway.url, DEFAULT_GATEWAY_URL);
                assert_eq!(config.gateway.request_timeout, Duration::from_secs(30));
                assert_eq!(config.sync.trade_history_limit, 1000);
                assert_eq!(config.sync.feed.max_attempts, 10);
            },
        );
    }

    #[test]
    fn missing_account_is_rejected() {
        with_env(&[("DEX_ACCOUNT", None)], || {
            let err = fetch_config().unwrap_err();
            assert!(err.to_string().contains("DEX_ACCOUNT is not set"));
        });
    }

    #[test]
    fn malformed_account_is_rejected() {
        with_env(&[("DEX_ACCOUNT", Some("not-an-address"))], || {
            let err = fetch_config().unwrap_err();
            assert!(err.to_string().contains("DEX_ACCOUNT is not an address"));
        });
    }

    #[test]
    fn overrides_from_env() {
        with_env(
            &[
                ("DEX_ACCOUNT", Some(ACCOUNT)),
                ("DEX_GATEWAY_URL", Some("wss://ledger.example.com/dex")),
                ("DEX_REQUEST_TIMEOUT_SECS", Some("5")),
                ("DEX_TRADE_HISTORY_LIMIT", Some("250")),
                ("DEX_RESUBSCRIBE_MAX_ATTEMPTS", Some("3")),
            ],
            || {
                let config = fetch_config().unwrap();
                assert_eq!(config.gateway.url, "wss://ledger.example.com/dex");
                assert_eq!(config.gateway.request_timeout, Duration::from_secs(5));
                assert_eq!(config.sync.trade_history_limit, 250);
                assert_eq!(config.sync.feed.max_attempts, 3);
            },
        );
    }

    #[test]
    fn zero_history_limit_is_rejected() {
        with_env(
            &[
                ("DEX_ACCOUNT", Some(ACCOUNT)),
                ("DEX_TRADE_HISTORY_LIMIT", Some("0")),
            ],
            || {
                let err = fetch_config().unwrap_err();
                assert!(err.to_string().contains("must be greater than zero"));
            },
        );
    }

    #[test]
    fn unparsable_number_is_rejected() {
        with_env(
            &[
                ("DEX_ACCOUNT", Some(ACCOUNT)),
                ("DEX_TRADE_HISTORY_LIMIT", None),
                ("DEX_REQUEST_TIMEOUT_SECS", Some("soon")),
            ],
            || {
                let err = fetch_config().unwrap_err();
                assert!(err.to_string().contains("DEX_REQUEST_TIMEOUT_SECS=soon"));
            },
        );
    }
}
