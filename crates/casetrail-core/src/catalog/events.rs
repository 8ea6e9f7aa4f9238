use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Every catalog mutation produces an event. Listeners subscribe by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CatalogEvent {
    #[serde(rename_all = "camelCase")]
    Initialized { modules: usize, badges: usize, at: DateTime<Utc> },
    #[serde(rename_all = "camelCase")]
    ModuleAdded { module_id: String, at: DateTime<Utc> },
    #[serde(rename_all = "camelCase")]
    ModuleUpdated { module_id: String, at: DateTime<Utc> },
    #[serde(rename_all = "camelCase")]
    ModuleRemoved { module_id: String, at: DateTime<Utc> },
    #[serde(rename_all = "camelCase")]
    ActivityAdded {
        module_id: String,
        activity_id: String,
        at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    ActivityRemoved {
        module_id: String,
        activity_id: String,
        at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    BadgeAdded { badge_id: String, at: DateTime<Utc> },
    #[serde(rename_all = "camelCase")]
    DataImported { modules: usize, badges: usize, at: DateTime<Utc> },
    /// A mutation was rejected.
    #[serde(rename_all = "camelCase")]
    Error { operation: String, message: String, at: DateTime<Utc> },
}

impl CatalogEvent {
    /// Name listeners subscribe with.
    pub fn name(&self) -> &'static str {
        match self {
            CatalogEvent::Initialized { .. } => "initialized",
            CatalogEvent::ModuleAdded { .. } => "moduleAdded",
            CatalogEvent::ModuleUpdated { .. } => "moduleUpdated",
            CatalogEvent::ModuleRemoved { .. } => "moduleRemoved",
            CatalogEvent::ActivityAdded { .. } => "activityAdded",
            CatalogEvent::ActivityRemoved { .. } => "activityRemoved",
            CatalogEvent::BadgeAdded { .. } => "badgeAdded",
            CatalogEvent::DataImported { .. } => "dataImported",
            CatalogEvent::Error { .. } => "error",
        }
    }
}

/// Subscribes to every event.
pub const ALL_EVENTS: &str = "*";

pub type CatalogListener = Box<dyn Fn(&CatalogEvent) -> Result<(), String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Synchronous observer list. A failing or panicking listener is logged and
/// skipped; the remaining listeners still run.
#[derive(Default)]
pub struct EventEmitter {
    listeners: Vec<(ListenerId, String, CatalogListener)>,
    next_id: u64,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, event: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&CatalogEvent) -> Result<(), String> + Send + Sync + 'static,
    {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push((id, event.into(), Box::new(listener)));
        id
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _, _)| *existing != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Returns how many listeners handled the event successfully.
    pub fn emit(&self, event: &CatalogEvent) -> usize {
        let name = event.name();
        let mut delivered = 0;
        for (id, filter, listener) in &self.listeners {
            if filter != name && filter != ALL_EVENTS {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(message)) => {
                    warn!(
                        listener = id.0,
                        event = name,
                        error = %message,
                        "catalog listener failed"
                    );
                }
                Err(_) => warn!(listener = id.0, event = name, "catalog listener panicked"),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn added() -> CatalogEvent {
        CatalogEvent::ModuleAdded {
            module_id: "m1".into(),
            at: Utc::now(),
        }
    }

    #[test]
    fn listeners_filter_by_name() {
        let mut emitter = EventEmitter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        emitter.on("moduleAdded", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        emitter.on("moduleRemoved", |_| Ok(()));
        assert_eq!(emitter.emit(&added()), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_listeners_do_not_break_the_emitter() {
        let mut emitter = EventEmitter::new();
        emitter.on(ALL_EVENTS, |_| Err("disk full".to_string()));
        emitter.on(ALL_EVENTS, |_| panic!("listener bug"));
        let ok = emitter.on(ALL_EVENTS, |_| Ok(()));
        assert_eq!(emitter.emit(&added()), 1);

        assert!(emitter.off(ok));
        assert!(!emitter.off(ok));
        assert_eq!(emitter.emit(&added()), 0);
    }

    #[test]
    fn events_serialize_with_camel_case_tag() {
        let json = serde_json::to_value(added()).unwrap();
        assert_eq!(json["type"], "moduleAdded");
        assert_eq!(json["moduleId"], "m1");
    }
}
