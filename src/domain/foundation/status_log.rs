//! Append-only record of status changes on an aggregate.

use serde::{Deserialize, Serialize};

use super::Timestamp;

/// A single status change with the reason it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange<S> {
    pub from: Option<S>,
    pub to: S,
    pub reason: Option<String>,
    pub at: Timestamp,
}

impl<S> StatusChange<S> {
    /// Creates a change entry stamped with the current time.
    pub fn new(from: Option<S>, to: S, reason: Option<String>) -> Self {
        Self {
            from,
            to,
            reason,
            at: Timestamp::now(),
        }
    }
}

/// Ordered history of status changes, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusLog<S>(Vec<StatusChange<S>>);

impl<S> Default for StatusLog<S> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<S: Clone> StatusLog<S> {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a change.
    pub fn record(&mut self, from: Option<S>, to: S, reason: Option<String>) {
        self.0.push(StatusChange::new(from, to, reason));
    }

    /// Returns the most recent change, if any.
    pub fn latest(&self) -> Option<&StatusChange<S>> {
        self.0.last()
    }

    /// Returns all changes, oldest first.
    pub fn entries(&self) -> &[StatusChange<S>] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
