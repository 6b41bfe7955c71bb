//! Fingerprint-based limiter for anonymous traffic.

pub mod fingerprint;
pub mod ip;
pub mod limiter;
pub mod trust;

pub use ip::{ClientIp, ClientIpResolver};
pub use limiter::{AdaptiveRateLimiter, Decision, FingerprintLimiter, Verdict};
pub use trust::TrustPolicy;
