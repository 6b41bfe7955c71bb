use std::net::IpAddr;

use axum::http::{header, HeaderMap, Method};
use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// The request attributes that identify an anonymous client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintInputs {
    pub client_ip: String,
    pub user_agent: String,
    pub accept_language: String,
    pub client_hint: String,
    pub origin: String,
    pub referer: String,
    pub device_id: String,
    pub app_bundle: String,
    pub path: String,
    pub method: String,
}

impl FingerprintInputs {
    pub fn from_request(client_ip: IpAddr, method: &Method, path: &str, headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };

        Self {
            client_ip: client_ip.to_string(),
            user_agent: get(header::USER_AGENT.as_str()),
            accept_language: get(header::ACCEPT_LANGUAGE.as_str()),
            client_hint: get("sec-ch-ua"),
            origin: get(header::ORIGIN.as_str()),
            referer: get(header::REFERER.as_str()),
            device_id: get("x-device-id"),
            app_bundle: get("x-app-bundle"),
            path: path.to_string(),
            method: method.as_str().to_string(),
        }
    }

    /// `|`-joined in a fixed order so equal inputs always give equal keys.
    pub fn joined(&self) -> String {
        [
            self.client_ip.as_str(),
            self.user_agent.as_str(),
            self.accept_language.as_str(),
            self.client_hint.as_str(),
            self.origin.as_str(),
            self.referer.as_str(),
            self.device_id.as_str(),
            self.app_bundle.as_str(),
            self.path.as_str(),
            self.method.as_str(),
        ]
        .join("|")
    }
}

/// Turns fingerprints into store keys.
#[derive(Clone)]
pub struct FingerprintHasher {
    secret: Option<Zeroizing<Vec<u8>>>,
}

impl FingerprintHasher {
    pub fn new(secret: Option<Zeroizing<Vec<u8>>>) -> Self {
        if secret.is_none() {
            tracing::warn!("⚠️  RATE_LIMIT_SECRET not set, fingerprints are plain SHA-256");
        }
        Self { secret }
    }

    pub fn is_keyed(&self) -> bool {
        self.secret.is_some()
    }

    /// HMAC-SHA256 under the operator secret, or plain SHA-256 without one,
    /// encoded as unpadded URL-safe base64.
    pub fn key(&self, inputs: &FingerprintInputs) -> String {
        let fingerprint = inputs.joined();
        let digest = match self
            .secret
            .as_ref()
            .and_then(|secret| HmacSha256::new_from_slice(secret).ok())
        {
            Some(mut mac) => {
                mac.update(fingerprint.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
            None => Sha256::digest(fingerprint.as_bytes()).to_vec(),
        };
        general_purpose::URL_SAFE_NO_PAD.encode(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn inputs(ua: &str) -> FingerprintInputs {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_str(ua).unwrap());
        headers.insert("x-device-id", HeaderValue::from_static("device-1"));
        FingerprintInputs::from_request(
            "203.0.113.5".parse().unwrap(),
            &Method::GET,
            "/api/v1/status",
            &headers,
        )
    }

    #[test]
    fn join_order_is_fixed() {
        assert_eq!(
            inputs("curl/8").joined(),
            "203.0.113.5|curl/8|||||device-1||/api/v1/status|GET"
        );
    }

    #[test]
    fn keyed_and_plain_keys_differ_but_are_stable() {
        let keyed = FingerprintHasher::new(Some(Zeroizing::new(b"operator-secret".to_vec())));
        let plain = FingerprintHasher::new(None);
        let a = inputs("curl/8");

        assert_eq!(keyed.key(&a), keyed.key(&a.clone()));
        assert_ne!(keyed.key(&a), plain.key(&a));
        assert_ne!(keyed.key(&a), keyed.key(&inputs("curl/9")));
        assert_eq!(plain.key(&a).len(), 43);
    }
}
