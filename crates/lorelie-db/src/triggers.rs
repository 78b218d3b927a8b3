//! Host-language triggers fired around engine operations.
//!
//! A trigger binds a callback to an event, optionally scoped to one table.
//! Unscoped triggers fire for every table. Database-level SQL triggers are
//! intentionally not managed here.

use lorelie_core::literal::Literal;

/// Engine events a trigger can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerEvent {
    PreInit,
    PostInit,
    BeforeCreate,
    AfterCreate,
    PreSave,
    PostSave,
    PreDelete,
    PostDelete,
}

/// The envelope handed to a trigger callback.
pub struct TriggerContext<'a> {
    pub event: TriggerEvent,
    /// The affected table.
    pub table: &'a str,
    /// The values involved in the operation, when any.
    pub values: &'a [(String, Literal)],
}

type TriggerFn = Box<dyn Fn(&TriggerContext<'_>) + Send>;

struct TriggerEntry {
    table: Option<String>,
    event: TriggerEvent,
    name: String,
    callback: TriggerFn,
}

/// Stores `(table-or-none, event, callback)` entries and runs the matching
/// ones exactly once per emission.
#[derive(Default)]
pub struct TriggerRegistry {
    entries: Vec<TriggerEntry>,
}

impl TriggerRegistry {
    /// Registers a trigger. `table` of `None` makes it fire for every table.
    pub fn register(
        &mut self,
        event: TriggerEvent,
        table: Option<&str>,
        name: impl Into<String>,
        callback: impl Fn(&TriggerContext<'_>) + Send + 'static,
    ) {
        self.entries.push(TriggerEntry {
            table: table.map(str::to_string),
            event,
            name: name.into(),
            callback: Box::new(callback),
        });
    }

    /// Runs every trigger whose `(table, event)` matches, plus all unlinked
    /// triggers for the event.
    pub fn run(&self, event: TriggerEvent, table: &str, values: &[(String, Literal)]) {
        let context = TriggerContext {
            event,
            table,
            values,
        };
        for entry in &self.entries {
            if entry.event != event {
                continue;
            }
            if entry.table.as_deref().is_some_and(|t| t != table) {
                continue;
            }
            (entry.callback)(&context);
        }
    }

    /// The registered trigger names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}

impl std::fmt::Debug for TriggerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn scoped_triggers_fire_for_their_table_only() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = TriggerRegistry::default();

        let seen = counter.clone();
        registry.register(
            TriggerEvent::AfterCreate,
            Some("celebrities"),
            "count_creations",
            move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
        );

        registry.run(TriggerEvent::AfterCreate, "celebrities", &[]);
        registry.run(TriggerEvent::AfterCreate, "followers", &[]);
        registry.run(TriggerEvent::PreDelete, "celebrities", &[]);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unlinked_triggers_fire_for_every_table() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = TriggerRegistry::default();

        let seen = counter.clone();
        registry.register(TriggerEvent::AfterCreate, None, "audit", move |ctx| {
            assert_eq!(ctx.event, TriggerEvent::AfterCreate);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        registry.run(TriggerEvent::AfterCreate, "celebrities", &[]);
        registry.run(TriggerEvent::AfterCreate, "followers", &[]);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
