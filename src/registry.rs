//! Static registry mapping task names to handlers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

use tracing::warn;

use crate::task::{Metadata, TaskHandler};

type Factory = Box<dyn Fn() -> Arc<dyn TaskHandler> + Send + Sync>;

/// How a registered handler is obtained.
enum Slot {
    Ready(Arc<dyn TaskHandler>),
    Lazy {
        factory: Factory,
        cell: OnceLock<Arc<dyn TaskHandler>>,
    },
}

struct Entry {
    identifier: &'static str,
    slot: Slot,
}

impl Entry {
    fn resolve(&self, name: &'static str) -> Arc<dyn TaskHandler> {
        match &self.slot {
            Slot::Ready(handler) => handler.clone(),
            Slot::Lazy { factory, cell } => cell
                .get_or_init(|| {
                    let handler = factory();
                    if handler.name() != name {
                        warn!(
                            registered = name,
                            reported = handler.name(),
                            "handler name differs from its registration key"
                        );
                    }
                    handler
                })
                .clone(),
        }
    }
}

/// Read-only mapping from task name to handler.
///
/// Built once through [`RegistryBuilder`] and never mutated afterwards.
/// Handlers registered lazily are constructed on first [`get`](Self::get) and
/// cached for the registry's lifetime.
pub struct TaskRegistry {
    entries: HashMap<&'static str, Entry>,
}

impl TaskRegistry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// True if a handler is registered under `name`. Never instantiates.
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Resolve the handler for `name`, or `None` if the name is unknown.
    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.entries
            .get_key_value(name)
            .map(|(key, entry)| entry.resolve(*key))
    }

    /// Resolve every registered handler.
    pub fn all(&self) -> BTreeMap<&'static str, Arc<dyn TaskHandler>> {
        self.entries
            .iter()
            .map(|(name, entry)| (*name, entry.resolve(*name)))
            .collect()
    }

    /// Name to identifier map, without instantiating anything.
    pub fn task_names(&self) -> BTreeMap<&'static str, &'static str> {
        self.entries
            .iter()
            .map(|(name, entry)| (*name, entry.identifier))
            .collect()
    }

    /// Metadata of every handler, for listings. Resolves handlers.
    pub fn describe(&self) -> BTreeMap<&'static str, Metadata> {
        self.all()
            .into_iter()
            .map(|(name, handler)| (name, handler.metadata()))
            .collect()
    }

    /// Names from `names` that have no registered handler, in input order.
    pub fn unknown<I, N>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        names
            .into_iter()
            .filter(|name| !self.has(name.as_ref()))
            .map(|name| name.as_ref().to_string())
            .collect()
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builder for constructing a [`TaskRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    entries: HashMap<&'static str, Entry>,
}

impl RegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already-constructed handler under its own name.
    pub fn register<H: TaskHandler + 'static>(mut self, handler: H) -> Self {
        let name = handler.name();
        self.insert(
            name,
            Entry {
                identifier: std::any::type_name::<H>(),
                slot: Slot::Ready(Arc::new(handler)),
            },
        );
        self
    }

    /// Register a handler constructed on first use.
    ///
    /// `name` must equal what the constructed handler's `name()` returns.
    pub fn register_lazy<H, F>(mut self, name: &'static str, factory: F) -> Self
    where
        H: TaskHandler + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.insert(
            name,
            Entry {
                identifier: std::any::type_name::<H>(),
                slot: Slot::Lazy {
                    factory: Box::new(move || Arc::new(factory()) as Arc<dyn TaskHandler>),
                    cell: OnceLock::new(),
                },
            },
        );
        self
    }

    fn insert(&mut self, name: &'static str, entry: Entry) {
        if self.entries.insert(name, entry).is_some() {
            warn!(task = name, "task registered twice, keeping the later handler");
        }
    }

    /// Finalize the registry.
    pub fn build(self) -> TaskRegistry {
        TaskRegistry {
            entries: self.entries,
        }
    }
}
