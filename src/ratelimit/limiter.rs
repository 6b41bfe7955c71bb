use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, Method};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::ratelimit::fingerprint::{FingerprintHasher, FingerprintInputs};
use crate::ratelimit::trust::TrustPolicy;

/// Outcome of one fingerprint check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Blocked { retry_after: Duration },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Single-shot window per fingerprint key.
///
/// The first request of a window opens it; every later request before the
/// window closes is refused. A closed window is replaced, not extended.
#[derive(Clone, Default)]
pub struct FingerprintLimiter {
    windows: Arc<DashMap<String, Instant>>,
}

impl FingerprintLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, key: &str, window: Duration, now: Instant) -> Decision {
        match self.windows.entry(key.to_string()) {
            Entry::Occupied(open) if *open.get() > now => Decision::Blocked {
                retry_after: open.get().saturating_duration_since(now),
            },
            Entry::Occupied(mut expired) => {
                expired.insert(now + window);
                Decision::Allowed
            }
            Entry::Vacant(slot) => {
                slot.insert(now + window);
                Decision::Allowed
            }
        }
    }

    pub fn allow(&self, key: &str, window: Duration) -> bool {
        self.check(key, window, Instant::now()).is_allowed()
    }

    /// Drops closed windows. Returns how many went.
    pub fn cleanup(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.windows.len())
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// What the limiter decided for a request.
#[derive(Debug)]
pub enum Verdict {
    /// Trusted front end, not counted.
    Trusted,
    /// First request of the window.
    Allowed { key: String },
    Blocked {
        retry_after_secs: u64,
        inputs: FingerprintInputs,
    },
}

/// Trust bypass in front of the fingerprint limiter.
#[derive(Clone)]
pub struct AdaptiveRateLimiter {
    trust: TrustPolicy,
    hasher: FingerprintHasher,
    limiter: FingerprintLimiter,
    window: Duration,
}

impl AdaptiveRateLimiter {
    pub fn new(trust: TrustPolicy, hasher: FingerprintHasher, window: Duration) -> Self {
        Self {
            trust,
            hasher,
            limiter: FingerprintLimiter::new(),
            window,
        }
    }

    pub fn limiter(&self) -> &FingerprintLimiter {
        &self.limiter
    }

    pub fn evaluate(
        &self,
        client_ip: std::net::IpAddr,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
        now: Instant,
    ) -> Verdict {
        if self.trust.is_trusted(headers) {
            return Verdict::Trusted;
        }

        let inputs = FingerprintInputs::from_request(client_ip, method, path, headers);
        let key = self.hasher.key(&inputs);

        match self.limiter.check(&key, self.window, now) {
            Decision::Allowed => Verdict::Allowed { key },
            Decision::Blocked { retry_after } => Verdict::Blocked {
                retry_after_secs: ceil_secs(retry_after),
                inputs,
            },
        }
    }
}

/// Whole seconds, rounded up, never below one.
fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue};

    const WINDOW: Duration = Duration::from_secs(5 * 3600);

    #[test]
    fn one_request_per_window() {
        let limiter = FingerprintLimiter::new();
        let start = Instant::now();

        assert_eq!(limiter.check("fp", WINDOW, start), Decision::Allowed);
        for offset in [1, 60, 3600, WINDOW.as_secs() - 1] {
            let decision = limiter.check("fp", WINDOW, start + Duration::from_secs(offset));
            assert_eq!(
                decision,
                Decision::Blocked {
                    retry_after: WINDOW - Duration::from_secs(offset)
                }
            );
        }

        assert!(limiter.check("fp", WINDOW, start + WINDOW).is_allowed());
        assert!(!limiter.check("fp", WINDOW, start + WINDOW + Duration::from_secs(1)).is_allowed());
    }

    #[test]
    fn fingerprints_are_independent() {
        let limiter = FingerprintLimiter::new();
        assert!(limiter.allow("a", WINDOW));
        assert!(limiter.allow("b", WINDOW));
        assert!(!limiter.allow("a", WINDOW));
    }

    #[test]
    fn cleanup_only_drops_closed_windows() {
        let limiter = FingerprintLimiter::new();
        let start = Instant::now();
        limiter.check("short", Duration::from_secs(1), start);
        limiter.check("long", WINDOW, start);

        assert_eq!(limiter.cleanup(start + Duration::from_secs(2)), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(ceil_secs(Duration::from_millis(1)), 1);
        assert_eq!(ceil_secs(Duration::from_millis(1500)), 2);
        assert_eq!(ceil_secs(Duration::from_secs(7)), 7);
        assert_eq!(ceil_secs(Duration::ZERO), 1);
    }

    #[test]
    fn trusted_origin_is_never_counted() {
        let adaptive = AdaptiveRateLimiter::new(
            TrustPolicy::new(vec!["magic899.com".into()], vec![], vec![]),
            FingerprintHasher::new(None),
            WINDOW,
        );
        let ip = "203.0.113.5".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://magic899.com"));

        for _ in 0..100 {
            let verdict = adaptive.evaluate(ip, &Method::GET, "/api/v1/status", &headers, Instant::now());
            assert!(matches!(verdict, Verdict::Trusted));
        }
        assert!(adaptive.limiter().is_empty());

        let anonymous = HeaderMap::new();
        let now = Instant::now();
        assert!(matches!(
            adaptive.evaluate(ip, &Method::GET, "/api/v1/status", &anonymous, now),
            Verdict::Allowed { .. }
        ));
        match adaptive.evaluate(ip, &Method::GET, "/api/v1/status", &anonymous, now) {
            Verdict::Blocked { retry_after_secs, inputs } => {
                assert_eq!(retry_after_secs, WINDOW.as_secs());
                assert_eq!(inputs.path, "/api/v1/status");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
