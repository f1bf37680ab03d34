//! Event filters for the streaming writers
//!
//! Filters gate which records an event configuration emits. They are
//! registered by name so writer configs can reference them as data.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A predicate over a projected record.
pub type EventFilter = Arc<dyn Fn(&BTreeMap<String, String>) -> bool + Send + Sync>;

/// Passes everything.
pub fn noop_filter() -> EventFilter {
    Arc::new(|_| true)
}

/// Passes records whose `field` value is one of `values`.
pub fn in_set_filter(field: impl Into<String>, values: Vec<String>) -> EventFilter {
    let field = field.into();
    Arc::new(move |record| {
        record
            .get(&field)
            .is_some_and(|v| values.iter().any(|candidate| candidate == v))
    })
}

/// Named filter registry consulted by config validation.
#[derive(Default)]
pub struct FilterRegistry {
    filters: HashMap<String, EventFilter>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, filter: EventFilter) {
        self.filters.insert(name.into(), filter);
    }

    pub fn get(&self, name: &str) -> Option<EventFilter> {
        self.filters.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }
}
