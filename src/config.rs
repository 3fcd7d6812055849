use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_NUMBERS_URL: &str =
    "https://www.dhlottery.co.kr/common.do?method=getLottoNumber";
pub const DEFAULT_SHOPS_URL: &str =
    "https://www.dhlottery.co.kr/store.do?method=topStore&pageGubun=L645";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome Safari";

/// Lower bound on the pause between two calls to the lottery site.
pub const MIN_REQUEST_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub shop_ttl_days: i64,
    pub request_delay: Duration,
    pub http_timeout: Duration,
    pub numbers_url: String,
    pub shops_url: String,
    pub user_agent: String,
    pub dump_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/lotto.db"),
            shop_ttl_days: 30,
            request_delay: MIN_REQUEST_DELAY,
            http_timeout: Duration::from_secs(10),
            numbers_url: DEFAULT_NUMBERS_URL.to_string(),
            shops_url: DEFAULT_SHOPS_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            dump_dir: None,
        }
    }
}

impl Config {
    /// Builds a config from any key lookup. `load` passes the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(path) = lookup("LOTTO_DB_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup("LOTTO_SHOP_TTL_DAYS") {
            let days: i64 = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid LOTTO_SHOP_TTL_DAYS '{raw}'"))?;
            if days < 0 {
                anyhow::bail!("LOTTO_SHOP_TTL_DAYS must not be negative, got {days}");
            }
            config.shop_ttl_days = days;
        }
        if let Some(raw) = lookup("LOTTO_REQUEST_DELAY_MS") {
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid LOTTO_REQUEST_DELAY_MS '{raw}'"))?;
            config.request_delay = Duration::from_millis(ms).max(MIN_REQUEST_DELAY);
        }
        if let Some(raw) = lookup("LOTTO_HTTP_TIMEOUT_SECS") {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid LOTTO_HTTP_TIMEOUT_SECS '{raw}'"))?;
            if secs == 0 {
                anyhow::bail!("LOTTO_HTTP_TIMEOUT_SECS must be at least 1");
            }
            config.http_timeout = Duration::from_secs(secs);
        }
        if let Some(url) = lookup("LOTTO_NUMBERS_URL") {
            config.numbers_url = url;
        }
        if let Some(url) = lookup("LOTTO_SHOPS_URL") {
            config.shops_url = url;
        }
        if let Some(ua) = lookup("LOTTO_USER_AGENT") {
            config.user_agent = ua;
        }
        config.dump_dir = lookup("LOTTO_DUMP_DIR")
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from);

        Ok(config)
    }
}

pub fn load() -> Result<Config> {
    Config::from_lookup(|key| env::var(key).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_env_is_empty() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.database_path, PathBuf::from("data/lotto.db"));
        assert_eq!(config.shop_ttl_days, 30);
        assert_eq!(config.request_delay, MIN_REQUEST_DELAY);
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert!(config.dump_dir.is_none());
    }

    #[test]
    fn test_request_delay_is_clamped() {
        let config = Config::from_lookup(lookup_from(&[("LOTTO_REQUEST_DELAY_MS", "50")])).unwrap();
        assert_eq!(config.request_delay, MIN_REQUEST_DELAY);

        let config =
            Config::from_lookup(lookup_from(&[("LOTTO_REQUEST_DELAY_MS", "1000")])).unwrap();
        assert_eq!(config.request_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        assert!(Config::from_lookup(lookup_from(&[("LOTTO_SHOP_TTL_DAYS", "abc")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("LOTTO_SHOP_TTL_DAYS", "-1")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("LOTTO_HTTP_TIMEOUT_SECS", "0")])).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("LOTTO_DB_PATH", "/tmp/x.db"),
            ("LOTTO_SHOP_TTL_DAYS", "7"),
            ("LOTTO_DUMP_DIR", "logs/shops"),
        ]))
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.shop_ttl_days, 7);
        assert_eq!(config.dump_dir, Some(PathBuf::from("logs/shops")));
    }
}
