//! Credentials granted to clients

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ras_auth_broker_core::{ClientId, Credential};
use tracing::debug;

/// Thread-safe map of client → granted credential
///
/// Entries are only written on a successful terminal resolution and are never
/// expired here; credential lifetime belongs to whoever issued it.
#[derive(Debug, Default)]
pub struct AuthenticatedClientRegistry {
    credentials: DashMap<ClientId, Credential>,
}

impl AuthenticatedClientRegistry {
    pub fn new() -> Self {
        Self {
            credentials: DashMap::new(),
        }
    }

    pub fn is_authenticated(&self, client_id: &ClientId) -> bool {
        self.credentials.contains_key(client_id)
    }

    /// Insert `credential` only if the client holds none yet; returns whether it was inserted
    pub fn try_set_if_absent(&self, client_id: ClientId, credential: Credential) -> bool {
        match self.credentials.entry(client_id) {
            Entry::Occupied(_) => {
                debug!("Client {} already holds a credential", client_id);
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(credential);
                true
            }
        }
    }

    /// Get the credential held by a client
    pub fn credential(&self, client_id: &ClientId) -> Option<Credential> {
        self.credentials
            .get(client_id)
            .map(|entry| entry.value().clone())
    }

    /// Get the number of authenticated clients
    pub fn authenticated_count(&self) -> usize {
        self.credentials.len()
    }
}
