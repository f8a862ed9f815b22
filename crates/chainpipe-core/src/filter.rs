//! Allowlist filters over fully-qualified type names.
//!
//! The same predicate shape serves events (matched on the event type) and
//! transaction sub-messages (matched on the `Any` type URL).

use std::collections::HashSet;

use crate::types::{trim_type_name, AbciEvent, AnyMessage};

/// Capability to decide whether an item should go through the pipeline.
pub trait Predicate<T: ?Sized>: Send + Sync {
    /// `None` (no event, no sub-message) always yields `false`.
    fn should_process(&self, item: Option<&T>) -> bool;
}

/// Exact-match, case-sensitive set of allowed type names.
#[derive(Debug, Clone, Default)]
pub struct TypeFilter {
    allowed: HashSet<String>,
}

impl TypeFilter {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    /// Check a candidate name after stripping one leading `/`.
    pub fn allows(&self, type_name: &str) -> bool {
        self.allowed.contains(trim_type_name(type_name))
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

impl Predicate<str> for TypeFilter {
    fn should_process(&self, item: Option<&str>) -> bool {
        item.map_or(false, |name| self.allows(name))
    }
}

/// Filters ABCI events by their `type`.
#[derive(Debug, Clone, Default)]
pub struct EventTypeFilter(TypeFilter);

impl EventTypeFilter {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(TypeFilter::new(allowed))
    }
}

impl Predicate<AbciEvent> for EventTypeFilter {
    fn should_process(&self, item: Option<&AbciEvent>) -> bool {
        item.map_or(false, |event| self.0.allows(&event.kind))
    }
}

/// Filters transaction sub-messages by their type URL.
#[derive(Debug, Clone, Default)]
pub struct TxMessageFilter(TypeFilter);

impl TxMessageFilter {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(TypeFilter::new(allowed))
    }
}

impl Predicate<AnyMessage> for TxMessageFilter {
    fn should_process(&self, item: Option<&AnyMessage>) -> bool {
        item.map_or(false, |msg| self.0.allows(&msg.type_url))
    }
}
