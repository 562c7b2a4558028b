use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, warn};

use super::{CancellationToken, EventHandler, Subscription};
use crate::payload::Payload;

#[derive(Clone)]
struct Entry {
    subscription: Subscription,
    handler: EventHandler,
}

/// Result of dispatching one payload to local subscribers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Subscription table of a protocol client, keyed by cancellation token.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<HashMap<CancellationToken, Entry>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CancellationToken, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a subscription under a random token unique among live entries.
    pub fn insert(&self, subscription: Subscription, handler: EventHandler) -> CancellationToken {
        let mut entries = self.lock();
        let token = loop {
            let candidate: CancellationToken = rand::random();
            if !entries.contains_key(&candidate) {
                break candidate;
            }
        };
        entries.insert(
            token,
            Entry {
                subscription,
                handler,
            },
        );
        token
    }

    pub fn remove(&self, token: CancellationToken) -> Option<Subscription> {
        self.lock().remove(&token).map(|e| e.subscription)
    }

    pub fn get(&self, token: CancellationToken) -> Option<Subscription> {
        self.lock().get(&token).map(|e| e.subscription.clone())
    }

    pub fn tokens(&self) -> Vec<CancellationToken> {
        self.lock().keys().copied().collect()
    }

    pub fn subscriptions(&self) -> Vec<(CancellationToken, Subscription)> {
        self.lock()
            .iter()
            .map(|(token, e)| (*token, e.subscription.clone()))
            .collect()
    }

    pub fn any<P>(&self, predicate: P) -> bool
    where
        P: Fn(&Subscription) -> bool,
    {
        self.lock().values().any(|e| predicate(&e.subscription))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Invokes the handler of every subscription satisfying `predicate`.
    ///
    /// Handlers run on a snapshot taken under the lock and released before the
    /// first call, so a handler may subscribe or unsubscribe. Handler errors
    /// and panics are logged and counted; they never stop the dispatch.
    pub fn invoke_on_message_received<P>(&self, payload: &Arc<Payload>, predicate: P) -> DispatchReport
    where
        P: Fn(&Subscription) -> bool,
    {
        let snapshot: Vec<(CancellationToken, Entry)> = self
            .lock()
            .iter()
            .filter(|(_, e)| predicate(&e.subscription))
            .map(|(token, e)| (*token, e.clone()))
            .collect();

        let mut report = DispatchReport::default();
        for (token, entry) in snapshot {
            let handler = entry.handler.clone();
            let payload = payload.clone();
            match catch_unwind(AssertUnwindSafe(move || handler(payload))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    warn!("subscriber {token} ({}) failed: {e}", entry.subscription);
                    report.failed += 1;
                }
                Err(_) => {
                    error!("subscriber {token} ({}) panicked", entry.subscription);
                    report.failed += 1;
                }
            }
        }
        report
    }
}
