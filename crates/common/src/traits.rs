use anyhow::Result;

use crate::{Address, Event};

/// Supplies a recipient's KEM public key for a logical mail address.
///
/// Implemented over the identity registry service; the core only needs the
/// lookup capability and treats a `None` as "no key published".
pub trait KeyRegistry: Send + Sync {
    fn lookup(&self, address: &Address) -> Result<Option<Vec<u8>>>;
}

/// Opaque persistence for serialized envelopes.
///
/// The stored string is passed through verbatim; implementations must not
/// inspect or normalize it.
pub trait EnvelopeStore: Send + Sync {
    fn put(&self, message_id: &str, envelope: &str) -> Result<()>;

    fn get(&self, message_id: &str) -> Result<Option<String>>;
}

/// Receives audit events emitted by the key store.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: Event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MemoryStore {
        entries: Mutex<HashMap<String, String>>,
    }

    impl EnvelopeStore for MemoryStore {
        fn put(&self, message_id: &str, envelope: &str) -> Result<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(message_id.to_string(), envelope.to_string());
            Ok(())
        }

        fn get(&self, message_id: &str) -> Result<Option<String>> {
            Ok(self.entries.lock().unwrap().get(message_id).cloned())
        }
    }

    #[test]
    fn test_envelope_store_is_verbatim() {
        let store = MemoryStore {
            entries: Mutex::new(HashMap::new()),
        };
        let opaque = "{\"not\":\"inspected\"}  trailing-noise";
        store.put("m1", opaque).unwrap();
        assert_eq!(store.get("m1").unwrap().as_deref(), Some(opaque));
        assert_eq!(store.get("missing").unwrap(), None);
    }
}
