use std::net::IpAddr;

use axum::http::{header, HeaderMap};
use url::Url;

use crate::config::TrustConfig;

/// Header naming the calling mobile app.
pub const APP_BUNDLE_HEADER: &str = "x-app-bundle";

/// Decides whether a request comes from an operator-approved front end and
/// may skip the fingerprint limiter.
#[derive(Clone, Debug, Default)]
pub struct TrustPolicy {
    domains: Vec<String>,
    host_suffixes: Vec<String>,
    app_bundles: Vec<String>,
}

impl TrustPolicy {
    pub fn new(domains: Vec<String>, host_suffixes: Vec<String>, app_bundles: Vec<String>) -> Self {
        Self {
            domains: domains.into_iter().map(|d| d.to_lowercase()).collect(),
            host_suffixes: host_suffixes
                .into_iter()
                .map(|s| {
                    let s = s.to_lowercase();
                    if s.starts_with('.') { s } else { format!(".{}", s) }
                })
                .collect(),
            app_bundles,
        }
    }

    pub fn from_config(config: &TrustConfig) -> Self {
        Self::new(
            config.domains.clone(),
            config.host_suffixes.clone(),
            config.app_bundles.clone(),
        )
    }

    /// True when Origin or Referer names a trusted host, or the app bundle
    /// header carries a known bundle id.
    pub fn is_trusted(&self, headers: &HeaderMap) -> bool {
        let header_str = |name: header::HeaderName| headers.get(name).and_then(|v| v.to_str().ok());

        header_str(header::ORIGIN).is_some_and(|o| self.is_trusted_host(o))
            || header_str(header::REFERER).is_some_and(|r| self.is_trusted_host(r))
            || header_str(header::HeaderName::from_static(APP_BUNDLE_HEADER))
                .is_some_and(|b| self.app_bundles.iter().any(|known| known.eq_ignore_ascii_case(b.trim())))
    }

    /// Accepts a full URL (`https://a.b/c`) or a bare host.
    pub fn is_trusted_host(&self, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }

        let host = match Url::parse(value) {
            Ok(url) => match url.host_str() {
                Some(host) => host.to_lowercase(),
                None => return false,
            },
            Err(_) => value.to_lowercase(),
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');

        if host == "localhost" || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback()) {
            return true;
        }

        if self
            .domains
            .iter()
            .any(|d| host == d || host.strip_suffix(d.as_str()).is_some_and(|rest| rest.ends_with('.')))
        {
            return true;
        }

        self.host_suffixes.iter().any(|suffix| host.ends_with(suffix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn policy() -> TrustPolicy {
        TrustPolicy::new(
            vec!["magic899.com".into(), "demo-test.magic899.com".into()],
            vec![".onrender.com".into()],
            vec!["com.magic899.app".into()],
        )
    }

    #[test]
    fn domains_and_subdomains_are_trusted() {
        let policy = policy();
        assert!(policy.is_trusted_host("https://magic899.com"));
        assert!(policy.is_trusted_host("https://www.Magic899.com/charts?week=3"));
        assert!(policy.is_trusted_host("magic899.com"));
        assert!(!policy.is_trusted_host("https://evilmagic899.com"));
        assert!(!policy.is_trusted_host("https://magic899.com.evil.net"));
    }

    #[test]
    fn loopback_and_platform_suffixes_are_trusted() {
        let policy = policy();
        assert!(policy.is_trusted_host("http://localhost:3000"));
        assert!(policy.is_trusted_host("http://127.0.0.1:5173"));
        assert!(policy.is_trusted_host("http://[::1]:8080"));
        assert!(policy.is_trusted_host("https://magic-web.onrender.com"));
        assert!(!policy.is_trusted_host("https://onrender.com.attacker.io"));
        assert!(!policy.is_trusted_host(""));
    }

    #[test]
    fn headers_are_consulted() {
        let policy = policy();

        let mut headers = HeaderMap::new();
        assert!(!policy.is_trusted(&headers));

        headers.insert(header::REFERER, HeaderValue::from_static("https://magic899.com/news"));
        assert!(policy.is_trusted(&headers));

        let mut headers = HeaderMap::new();
        headers.insert(APP_BUNDLE_HEADER, HeaderValue::from_static("com.magic899.app"));
        assert!(policy.is_trusted(&headers));

        headers.insert(APP_BUNDLE_HEADER, HeaderValue::from_static("com.other.app"));
        assert!(!policy.is_trusted(&headers));
    }
}
