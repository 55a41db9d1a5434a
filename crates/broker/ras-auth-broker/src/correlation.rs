//! Registry of in-flight authentication attempts

use ras_auth_broker_core::{ClientId, CorrelationToken};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use thiserror::Error;

/// One outstanding delegated-authentication round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationAttempt {
    pub correlation_token: CorrelationToken,
    pub client_id: ClientId,
    /// Diagnostics only
    pub created_at: Instant,
}

impl AuthenticationAttempt {
    fn new(correlation_token: CorrelationToken, client_id: ClientId) -> Self {
        Self {
            correlation_token,
            client_id,
            created_at: Instant::now(),
        }
    }
}

/// Errors raised when registering an attempt
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("Correlation token {0} is already registered")]
    DuplicateToken(CorrelationToken),

    #[error("Client {client_id} already has an attempt in progress ({correlation_token})")]
    ClientAttemptInProgress {
        client_id: ClientId,
        correlation_token: CorrelationToken,
    },
}

#[derive(Debug, Default)]
struct Attempts {
    by_token: HashMap<CorrelationToken, AuthenticationAttempt>,
    active_by_client: HashMap<ClientId, CorrelationToken>,
}

/// Thread-safe store of live attempts keyed by correlation token
///
/// Both indices live behind one mutex so every operation is a single critical
/// section. `claim` is the only way an attempt leaves the store.
#[derive(Debug, Default)]
pub struct CorrelationStore {
    attempts: Mutex<Attempts>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Both indices are always updated together under one guard
    fn lock(&self) -> MutexGuard<'_, Attempts> {
        self.attempts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a new attempt for `client_id`
    pub fn register(
        &self,
        correlation_token: CorrelationToken,
        client_id: ClientId,
    ) -> Result<(), CorrelationError> {
        let mut attempts = self.lock();

        if let Some(&active) = attempts.active_by_client.get(&client_id) {
            return Err(CorrelationError::ClientAttemptInProgress {
                client_id,
                correlation_token: active,
            });
        }

        match attempts.by_token.entry(correlation_token) {
            Entry::Occupied(_) => Err(CorrelationError::DuplicateToken(correlation_token)),
            Entry::Vacant(slot) => {
                slot.insert(AuthenticationAttempt::new(correlation_token, client_id));
                attempts
                    .active_by_client
                    .insert(client_id, correlation_token);
                Ok(())
            }
        }
    }

    /// Atomically remove and return the attempt for `correlation_token`
    ///
    /// Whichever caller receives `Some` owns the terminal response for the attempt.
    pub fn claim(&self, correlation_token: &CorrelationToken) -> Option<AuthenticationAttempt> {
        let mut attempts = self.lock();
        let attempt = attempts.by_token.remove(correlation_token)?;
        attempts.active_by_client.remove(&attempt.client_id);
        Some(attempt)
    }

    /// Non-claiming lookup; never use the result to decide who resolves an attempt
    pub fn get(&self, correlation_token: &CorrelationToken) -> Option<AuthenticationAttempt> {
        self.lock().by_token.get(correlation_token).cloned()
    }

    /// Diagnostics only
    pub fn contains(&self, correlation_token: &CorrelationToken) -> bool {
        self.lock().by_token.contains_key(correlation_token)
    }

    pub fn len(&self) -> usize {
        self.lock().by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_register_then_claim_once() {
        let store = CorrelationStore::new();
        let token = CorrelationToken::new();
        let client = ClientId::new();

        store.register(token, client).unwrap();
        assert!(store.contains(&token));

        let attempt = store.claim(&token).unwrap();
        assert_eq!(attempt.client_id, client);
        assert_eq!(attempt.correlation_token, token);

        // Second claim finds nothing
        assert!(store.claim(&token).is_none());
        assert!(!store.contains(&token));
        assert!(store.is_empty());
    }

    #[test]
    fn test_claim_unknown_token() {
        let store = CorrelationStore::new();
        assert!(store.claim(&CorrelationToken::new()).is_none());
    }

    #[test]
    fn test_duplicate_token_rejected() {
        let store = CorrelationStore::new();
        let token = CorrelationToken::new();

        store.register(token, ClientId::new()).unwrap();
        let result = store.register(token, ClientId::new());
        assert_eq!(result, Err(CorrelationError::DuplicateToken(token)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_one_active_attempt_per_client() {
        let store = CorrelationStore::new();
        let client = ClientId::new();
        let first = CorrelationToken::new();

        store.register(first, client).unwrap();
        let result = store.register(CorrelationToken::new(), client);
        assert_eq!(
            result,
            Err(CorrelationError::ClientAttemptInProgress {
                client_id: client,
                correlation_token: first,
            })
        );

        // Once resolved, the client may start again
        store.claim(&first).unwrap();
        store.register(CorrelationToken::new(), client).unwrap();
    }

    #[test]
    fn test_get_does_not_claim() {
        let store = CorrelationStore::new();
        let token = CorrelationToken::new();
        let client = ClientId::new();
        store.register(token, client).unwrap();

        assert_eq!(store.get(&token).map(|a| a.client_id), Some(client));
        assert_eq!(store.get(&token).map(|a| a.client_id), Some(client));
        assert!(store.claim(&token).is_some());
        assert!(store.get(&token).is_none());
    }

    #[test]
    fn test_concurrent_claims_have_exactly_one_winner() {
        for _ in 0..200 {
            let store = Arc::new(CorrelationStore::new());
            let token = CorrelationToken::new();
            store.register(token, ClientId::new()).unwrap();

            let contenders = 8;
            let barrier = Arc::new(Barrier::new(contenders));
            let handles: Vec<_> = (0..contenders)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        store.claim(&token).is_some()
                    })
                })
                .collect();

            let winners = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(winners, 1);
        }
    }
}
