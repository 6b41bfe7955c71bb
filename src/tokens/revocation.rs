use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Grace window for swept entries, slightly longer than the 5s bind-token TTL.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(10);

/// Concurrent set of revoked token strings.
///
/// `revoke`, `try_revoke` and `is_revoked` only ever insert or read; entries
/// disappear solely through [`RevocationRegistry::sweep`].
#[derive(Clone)]
pub struct RevocationRegistry {
    revoked: Arc<DashMap<String, Instant>>,
    grace: Duration,
}

impl RevocationRegistry {
    pub fn new(grace: Duration) -> Self {
        Self {
            revoked: Arc::new(DashMap::new()),
            grace,
        }
    }

    /// Marks `token` revoked. Revoking twice keeps the first timestamp.
    pub fn revoke(&self, token: &str) {
        if token.is_empty() {
            return;
        }
        self.revoked
            .entry(token.to_string())
            .or_insert_with(Instant::now);
    }

    /// Revokes `token` only if nobody else has, returning whether this call won.
    ///
    /// The shard lock held by the entry makes this the single linearisation
    /// point for concurrent validations of the same token.
    pub fn try_revoke(&self, token: &str) -> bool {
        match self.revoked.entry(token.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                true
            }
        }
    }

    pub fn is_revoked(&self, token: &str) -> bool {
        self.revoked.contains_key(token)
    }

    /// Drops entries revoked more than `grace` before `now`. Returns how many went.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.revoked.len();
        self.revoked
            .retain(|_, revoked_at| now.saturating_duration_since(*revoked_at) <= self.grace);
        before.saturating_sub(self.revoked.len())
    }

    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}

impl Default for RevocationRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revoked_tokens_stay_revoked_until_swept() {
        let registry = RevocationRegistry::default();
        registry.revoke("abc");
        assert!(registry.is_revoked("abc"));
        assert!(!registry.is_revoked("abd"));

        assert_eq!(registry.sweep(Instant::now()), 0);
        assert!(registry.is_revoked("abc"));

        assert_eq!(registry.sweep(Instant::now() + DEFAULT_GRACE + Duration::from_secs(1)), 1);
        assert!(!registry.is_revoked("abc"));
    }

    #[test]
    fn try_revoke_has_one_winner() {
        let registry = RevocationRegistry::default();
        assert!(registry.try_revoke("t"));
        assert!(!registry.try_revoke("t"));
    }

    #[test]
    fn empty_tokens_are_ignored() {
        let registry = RevocationRegistry::default();
        registry.revoke("");
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_try_revoke_has_one_winner() {
        let registry = RevocationRegistry::default();
        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.try_revoke("shared") as usize))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(winners, 1);
    }
}
