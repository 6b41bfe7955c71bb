use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use ipnetwork::IpNetwork;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::random;

/// Published Cloudflare edge ranges, used when no proxy range is configured.
const DEFAULT_PROXY_RANGES: &[&str] = &[
    "173.245.48.0/20",
    "103.21.244.0/22",
    "103.22.200.0/22",
    "103.31.4.0/22",
    "141.101.64.0/18",
    "108.162.192.0/18",
    "190.93.240.0/20",
    "188.114.96.0/20",
    "197.234.240.0/22",
    "198.41.128.0/17",
    "162.158.0.0/15",
    "104.16.0.0/13",
    "104.24.0.0/14",
    "172.64.0.0/13",
    "131.0.72.0/22",
];

/// Deployment mode. Production hides diagnostic detail from clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

/// The four HMAC keys used to sign session claims.
#[derive(Clone)]
pub struct SigningSecrets {
    pub access: Zeroizing<Vec<u8>>,
    pub refresh: Zeroizing<Vec<u8>>,
    pub bind_csrf: Zeroizing<Vec<u8>>,
    pub bind_rsp: Zeroizing<Vec<u8>>,
}

/// Operator trust list consulted by the rate limiter.
#[derive(Clone, Debug, Default)]
pub struct TrustConfig {
    /// Exact domains; subdomains of these are trusted too.
    pub domains: Vec<String>,
    /// Hosting platform suffixes such as `.onrender.com`.
    pub host_suffixes: Vec<String>,
    /// Known mobile bundle identifiers sent in `X-App-Bundle`.
    pub app_bundles: Vec<String>,
    /// Reverse-proxy ranges whose forwarded client IP header is honoured.
    pub proxy_ranges: Vec<IpNetwork>,
    /// Header carrying the real client IP when the peer is a trusted proxy.
    pub client_ip_header: String,
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    pub app_env: AppEnv,
    pub bind_addr: SocketAddr,
    /// The URL of the PostgreSQL database. Users live in memory when unset.
    pub database_url: Option<String>,
    /// The URL of the Redis server. Single-request CSRF tokens live in memory when unset.
    pub redis_url: Option<String>,
    pub secrets: SigningSecrets,
    pub token_issuer: String,
    /// Key for fingerprint HMACs. Plain SHA-256 is used when absent.
    pub rate_limit_secret: Option<Zeroizing<Vec<u8>>>,
    pub rate_limit_window: Duration,
    pub rate_limit_cleanup_interval: Duration,
    pub secret_rotation_interval: Duration,
    pub revocation_sweep_interval: Duration,
    pub trust: TrustConfig,
    pub cors_origins: Vec<String>,
    /// Upper bound for every user-store call.
    pub db_timeout: Duration,
    /// Account seeded into the in-memory user store when no database is configured.
    pub dev_user: Option<(String, Zeroizing<String>)>,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        let app_env = match env::var("APP_ENV").as_deref() {
            Ok("production") => AppEnv::Production,
            _ => AppEnv::Development,
        };

        let secrets = SigningSecrets {
            access: signing_secret("ACCESS_TOKEN_SECRET", app_env)?,
            refresh: signing_secret("REFRESH_TOKEN_SECRET", app_env)?,
            bind_csrf: signing_secret("BIND_CSRF_SECRET", app_env)?,
            bind_rsp: signing_secret("BIND_RSP_SECRET", app_env)?,
        };

        let rate_limit_secret = match env::var("RATE_LIMIT_SECRET") {
            Ok(mut raw) if !raw.is_empty() => {
                let bytes = Zeroizing::new(raw.as_bytes().to_vec());
                raw.zeroize();
                Some(bytes)
            }
            _ => None,
        };

        let proxy_ranges = match env::var("TRUSTED_PROXY_RANGES") {
            Ok(raw) => parse_ranges(&split_list(&raw))?,
            Err(_) => parse_ranges(
                &DEFAULT_PROXY_RANGES
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>(),
            )?,
        };

        Ok(Self {
            app_env,
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
                .parse()
                .context("Invalid BIND_ADDR")?,
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            secrets,
            token_issuer: env::var("TOKEN_ISSUER").unwrap_or_else(|_| "magic899".to_string()),
            rate_limit_secret,
            rate_limit_window: secs_var("RATE_LIMIT_WINDOW_SECS", 5 * 3600)?,
            rate_limit_cleanup_interval: secs_var("RATE_LIMIT_CLEANUP_SECS", 12 * 3600)?,
            secret_rotation_interval: secs_var("SECRET_ROTATION_SECS", 15 * 60)?,
            revocation_sweep_interval: secs_var("REVOCATION_SWEEP_SECS", 5)?,
            trust: TrustConfig {
                domains: list_var("TRUSTED_DOMAINS", "magic899.com"),
                host_suffixes: list_var("TRUSTED_HOST_SUFFIXES", ".onrender.com"),
                app_bundles: list_var("TRUSTED_APP_BUNDLES", "com.magic899.app"),
                proxy_ranges,
                client_ip_header: env::var("CLIENT_IP_HEADER")
                    .unwrap_or_else(|_| "CF-Connecting-IP".to_string()),
            },
            cors_origins: list_var("CORS_ORIGINS", "http://localhost:3000"),
            db_timeout: Duration::from_millis(
                env::var("DB_TIMEOUT_MS")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .context("Invalid DB_TIMEOUT_MS")?,
            ),
            dev_user: match (env::var("DEV_USER_EMAIL"), env::var("DEV_USER_PASSWORD")) {
                (Ok(email), Ok(password)) if app_env == AppEnv::Development => {
                    Some((email.to_lowercase(), Zeroizing::new(password)))
                }
                _ => None,
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env == AppEnv::Production
    }

    /// A development configuration with random secrets and no external stores.
    pub fn for_tests() -> Self {
        let random_secret = || Zeroizing::new(random::random_bytes(32));
        Self {
            app_env: AppEnv::Development,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: None,
            redis_url: None,
            secrets: SigningSecrets {
                access: random_secret(),
                refresh: random_secret(),
                bind_csrf: random_secret(),
                bind_rsp: random_secret(),
            },
            token_issuer: "magic899".to_string(),
            rate_limit_secret: Some(random_secret()),
            rate_limit_window: Duration::from_secs(5 * 3600),
            rate_limit_cleanup_interval: Duration::from_secs(12 * 3600),
            secret_rotation_interval: Duration::from_secs(15 * 60),
            revocation_sweep_interval: Duration::from_secs(5),
            trust: TrustConfig {
                domains: vec!["magic899.com".to_string()],
                host_suffixes: vec![".onrender.com".to_string()],
                app_bundles: vec!["com.magic899.app".to_string()],
                proxy_ranges: Vec::new(),
                client_ip_header: "CF-Connecting-IP".to_string(),
            },
            cors_origins: vec!["http://localhost:3000".to_string()],
            db_timeout: Duration::from_secs(3),
            dev_user: None,
        }
    }
}

/// Reads a hex-encoded signing secret. Development falls back to a random per-process key.
fn signing_secret(name: &str, app_env: AppEnv) -> Result<Zeroizing<Vec<u8>>> {
    match env::var(name) {
        Ok(mut hex_value) => {
            let bytes = hex::decode(&hex_value)
                .with_context(|| format!("{} must be valid hexadecimal", name))?;
            hex_value.zeroize();
            if bytes.len() < 32 {
                anyhow::bail!("{} must be at least 32 bytes (64 hex characters)", name);
            }
            Ok(Zeroizing::new(bytes))
        }
        Err(_) if app_env == AppEnv::Production => {
            anyhow::bail!("{} must be set in production (generate with: openssl rand -hex 32)", name)
        }
        Err(_) => {
            tracing::warn!("⚠️  {} not set, using a random per-process key", name);
            Ok(Zeroizing::new(random::random_bytes(32)))
        }
    }
}

fn secs_var(name: &str, default: u64) -> Result<Duration> {
    let secs: u64 = env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {}", name))?;
    Ok(Duration::from_secs(secs))
}

fn list_var(name: &str, default: &str) -> Vec<String> {
    split_list(&env::var(name).unwrap_or_else(|_| default.to_string()))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_ranges(ranges: &[String]) -> Result<Vec<IpNetwork>> {
    ranges
        .iter()
        .map(|r| {
            r.parse::<IpNetwork>()
                .with_context(|| format!("Invalid proxy range: {}", r))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_proxy_ranges_parse() {
        let ranges: Vec<String> = DEFAULT_PROXY_RANGES.iter().map(|s| s.to_string()).collect();
        assert_eq!(parse_ranges(&ranges).unwrap().len(), DEFAULT_PROXY_RANGES.len());
    }

    #[test]
    fn lists_are_trimmed_and_keep_case() {
        assert_eq!(
            split_list(" com.Magic899.App, ,demo.magic899.com "),
            vec!["com.Magic899.App".to_string(), "demo.magic899.com".to_string()]
        );
    }

    #[test]
    fn mixed_case_bundle_from_env_is_trusted() {
        use axum::http::{HeaderMap, HeaderValue};

        use crate::ratelimit::trust::{TrustPolicy, APP_BUNDLE_HEADER};

        // Only test in this crate that touches the process environment.
        unsafe {
            env::set_var("TRUSTED_APP_BUNDLES", "com.Magic899.App");
            env::set_var("TRUSTED_DOMAINS", "Magic899.com");
        }
        let config = Config::from_env().unwrap();
        unsafe {
            env::remove_var("TRUSTED_APP_BUNDLES");
            env::remove_var("TRUSTED_DOMAINS");
        }
        assert_eq!(config.trust.app_bundles, vec!["com.Magic899.App".to_string()]);

        let policy = TrustPolicy::from_config(&config.trust);
        for bundle in ["com.Magic899.App", "com.magic899.app"] {
            let mut headers = HeaderMap::new();
            headers.insert(APP_BUNDLE_HEADER, HeaderValue::from_static(bundle));
            assert!(policy.is_trusted(&headers), "{} not trusted", bundle);
        }

        let mut origin = HeaderMap::new();
        origin.insert("origin", HeaderValue::from_static("https://www.magic899.com"));
        assert!(policy.is_trusted(&origin));
    }
}
