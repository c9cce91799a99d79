use tracing::{debug, warn};

use super::{PersistPolicy, StateCipher};
use crate::models::StateTree;

/// Encrypts the selected state tree on the way out and reverses it on the way in.
///
/// Neither direction returns an error: writes fall back to an empty string,
/// reads to `None`. A snapshot is either decoded whole or discarded.
#[derive(Clone)]
pub struct EncryptTransform {
    cipher: StateCipher,
    policy: PersistPolicy,
}

impl EncryptTransform {
    pub fn new(cipher: StateCipher, policy: PersistPolicy) -> Self {
        Self { cipher, policy }
    }

    pub fn policy(&self) -> &PersistPolicy {
        &self.policy
    }

    /// Ciphertext for `tree`, or `""` if it could not be produced.
    pub fn serialize(&self, tree: &StateTree) -> String {
        let selected = self.policy.select(tree);
        let json = match serde_json::to_vec(&selected) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize state for persistence");
                return String::new();
            }
        };
        match self.cipher.encrypt(&json) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to encrypt state for persistence");
                String::new()
            }
        }
    }

    pub fn deserialize(&self, text: &str) -> Option<StateTree> {
        if text.trim().is_empty() {
            return None;
        }
        let plaintext = match self.cipher.decrypt(text) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                debug!(error = %e, "Discarding undecryptable persisted state");
                return None;
            }
        };
        match serde_json::from_slice::<serde_json::Value>(&plaintext) {
            Ok(serde_json::Value::Object(tree)) => Some(self.policy.select(&tree)),
            Ok(_) => {
                debug!("Discarding persisted state that is not a JSON object");
                None
            }
            Err(e) => {
                debug!(error = %e, "Discarding unparsable persisted state");
                None
            }
        }
    }
}
