use std::sync::Arc;

use parking_lot::RwLock;

use crate::crypto::aes::{self, SecureKey};

/// Process-wide symmetric secret for sealed tokens.
///
/// Readers always get a copy, so a rotation never changes a key out from
/// under a seal/open already in progress.
#[derive(Clone)]
pub struct SecretStore {
    current: Arc<RwLock<SecureKey>>,
}

impl SecretStore {
    /// Creates a store holding a freshly generated secret.
    pub fn new() -> Self {
        Self {
            current: Arc::new(RwLock::new(aes::generate_key())),
        }
    }

    /// Returns a copy of the current secret.
    pub fn current(&self) -> SecureKey {
        self.current.read().clone()
    }

    /// Replaces the secret. Every outstanding sealed token stops opening.
    pub fn rotate(&self) {
        let fresh = aes::generate_key();
        *self.current.write() = fresh;
        tracing::info!("✅ Sealed-token secret rotated");
    }
}

impl Default for SecretStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotate_replaces_the_secret() {
        let store = SecretStore::new();
        let before = store.current();
        assert_eq!(before.as_bytes(), store.current().as_bytes());

        store.rotate();
        assert_ne!(before.as_bytes(), store.current().as_bytes());
    }

    #[test]
    fn clones_share_the_same_secret() {
        let store = SecretStore::new();
        let handle = store.clone();
        store.rotate();
        assert_eq!(store.current().as_bytes(), handle.current().as_bytes());
    }
}
