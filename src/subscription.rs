//! # Subscription Registry
//!
//! Multiplexes one inbound event stream to N independently-filtered,
//! independently-failing consumers.
//!
//! Each callback invocation runs inside its own failure boundary: a failing
//! consumer is reported through its own error handler and never prevents
//! delivery to the rest, and never reaches the connection's read path.

use std::collections::HashSet;
use std::sync::RwLock;

use crate::errors::{FirehoseError, FirehoseResult};
use crate::event::Event;

/// Error produced by a consumer's event callback
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// Per-event consumer callback
pub type EventCallback = Box<dyn Fn(&Event) -> Result<(), SubscriberError> + Send + Sync>;

/// Optional observer invoked when a consumer's callback fails
pub type ErrorCallback = Box<dyn Fn(&Event, &SubscriberError) + Send + Sync>;

/// Registered interest of one logical consumer
pub struct Subscription {
    /// Caller-supplied id, unique among active subscriptions
    pub id: String,

    /// Collections to deliver; empty set matches everything
    pub collections: HashSet<String>,

    on_event: EventCallback,
    on_error: Option<ErrorCallback>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("collections", &self.collections)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Create a subscription delivering matching events to `on_event`.
    ///
    /// Callbacks are expected to be short and non-blocking; dispatch is
    /// sequential within one event, so a slow callback delays delivery to
    /// every other subscriber. Callbacks must not call back into the
    /// registry or client.
    pub fn new<I, F>(id: impl Into<String>, collections: I, on_event: F) -> Self
    where
        I: IntoIterator<Item = String>,
        F: Fn(&Event) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            collections: collections.into_iter().collect(),
            on_event: Box::new(on_event),
            on_error: None,
        }
    }

    /// Attach an error handler invoked when `on_event` fails
    pub fn with_error_handler<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&Event, &SubscriberError) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(on_error));
        self
    }

    /// Whether this subscription wants the event
    pub fn matches(&self, event: &Event) -> bool {
        if self.collections.is_empty() {
            return true;
        }

        event
            .collection
            .as_deref()
            .is_some_and(|c| self.collections.contains(c))
    }
}

/// Delivery accounting for one dispatched event
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Subscriptions whose filter matched
    pub matched: usize,
    /// Callbacks that completed without error
    pub delivered: usize,
    /// Callbacks that failed (isolated to their own subscription)
    pub failed: usize,
}

/// Registry of active subscriptions
///
/// Dispatch order follows registration order, and per-subscription delivery
/// order follows upstream arrival order. `unsubscribe` blocks on an
/// in-flight dispatch, so no callback runs after it returns.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    /// Register a subscription.
    ///
    /// # Errors
    ///
    /// [`FirehoseError::InvalidFilter`] for a blank id or blank collection
    /// name; [`FirehoseError::DuplicateSubscription`] when the id is
    /// already active. The existing subscription is left untouched.
    pub fn subscribe(&self, subscription: Subscription) -> FirehoseResult<()> {
        if subscription.id.trim().is_empty() {
            return Err(FirehoseError::InvalidFilter(
                "subscription id must not be blank".to_string(),
            ));
        }

        if subscription.collections.iter().any(|c| c.trim().is_empty()) {
            return Err(FirehoseError::InvalidFilter(
                "collection names must not be blank".to_string(),
            ));
        }

        let Ok(mut subs) = self.subscriptions.write() else {
            return Err(FirehoseError::Internal(
                "subscription registry lock poisoned".to_string(),
            ));
        };

        if subs.iter().any(|s| s.id == subscription.id) {
            return Err(FirehoseError::DuplicateSubscription(subscription.id));
        }

        subs.push(subscription);
        Ok(())
    }

    /// Remove a subscription. Returns false, not an error, when the id is
    /// not registered.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let Ok(mut subs) = self.subscriptions.write() else {
            return false;
        };

        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Remove every subscription (client shutdown)
    pub fn clear(&self) {
        if let Ok(mut subs) = self.subscriptions.write() {
            subs.clear();
        }
    }

    /// Deliver one event to every matching subscription, in registration
    /// order, isolating each callback failure to its own subscription.
    pub fn dispatch(&self, event: &Event) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        let Ok(subs) = self.subscriptions.read() else {
            return outcome;
        };

        for sub in subs.iter().filter(|s| s.matches(event)) {
            outcome.matched += 1;

            match (sub.on_event)(event) {
                Ok(()) => outcome.delivered += 1,
                Err(err) => {
                    outcome.failed += 1;
                    tracing::warn!(
                        subscription = %sub.id,
                        seq = event.seq,
                        error = %err,
                        "subscriber callback failed"
                    );
                    if let Some(on_error) = &sub.on_error {
                        on_error(event, &err);
                    }
                }
            }
        }

        outcome
    }

    /// Number of active subscriptions
    pub fn len(&self) -> usize {
        self.subscriptions.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Whether no subscriptions are active
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
