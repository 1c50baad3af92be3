//! The pre-definition store.
//!
//! Pre-definitions are macro values supplied by the embedding application
//! rather than shader source. Dynamic entries are diffed on every write and
//! change listeners fire only when a value actually changed, which is what
//! drives targeted recompilation. Static entries are injected into every
//! compile and never notify.

use crate::FastHashMap;
use parking_lot::{Mutex, RwLock};

type Listener = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct Values {
    /// `None` values are defined-without-value entries.
    dynamic: FastHashMap<String, Option<String>>,
    statics: FastHashMap<String, Option<String>>,
}

#[derive(Default)]
pub struct PreDefinitionStore {
    values: RwLock<Values>,
    listeners: Mutex<Vec<Listener>>,
}

impl PreDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a dynamic definition. Listeners fire only when the stored value
    /// changed.
    pub fn set(&self, name: &str, value: Option<&str>) {
        let changed = {
            let mut values = self.values.write();
            let new = value.map(str::to_string);
            if values.dynamic.get(name) == Some(&new) {
                false
            } else {
                values.dynamic.insert(name.to_string(), new);
                true
            }
        };
        if changed {
            self.notify(name);
        }
    }

    /// Sets a static definition, silently. Statics are baked into every
    /// compile and never trigger recompilation.
    pub fn set_static(&self, name: &str, value: Option<&str>) {
        self.values
            .write()
            .statics
            .insert(name.to_string(), value.map(str::to_string));
    }

    /// Removes a dynamic definition, notifying listeners if it existed.
    pub fn remove(&self, name: &str) {
        let removed = self.values.write().dynamic.remove(name).is_some();
        if removed {
            self.notify(name);
        }
    }

    /// The dynamic value for `name`: `None` when unset, `Some(None)` when
    /// defined without a value.
    pub fn get(&self, name: &str) -> Option<Option<String>> {
        self.values.read().dynamic.get(name).cloned()
    }

    /// Snapshot of every static definition, for seeding a compile.
    pub fn statics(&self) -> Vec<(String, Option<String>)> {
        self.values
            .read()
            .statics
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Registers a change listener, called with the name of every dynamic
    /// definition that changed value or was removed.
    pub fn on_change(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.listeners.lock().push(Box::new(listener));
    }

    fn notify(&self, name: &str) {
        for listener in self.listeners.lock().iter() {
            listener(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PreDefinitionStore;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn store_with_log() -> (PreDefinitionStore, Arc<Mutex<Vec<String>>>) {
        let store = PreDefinitionStore::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        store.on_change(move |name| sink.lock().push(name.to_string()));
        (store, log)
    }

    #[test]
    fn set_notifies_only_on_change() {
        let (store, log) = store_with_log();
        store.set("K", Some("1"));
        store.set("K", Some("1"));
        store.set("K", Some("2"));
        assert_eq!(*log.lock(), vec!["K", "K"]);
        assert_eq!(store.get("K"), Some(Some("2".to_string())));
    }

    #[test]
    fn define_without_value() {
        let (store, log) = store_with_log();
        store.set("FLAG", None);
        assert_eq!(store.get("FLAG"), Some(None));
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn remove_notifies_when_present() {
        let (store, log) = store_with_log();
        store.remove("K");
        assert!(log.lock().is_empty());
        store.set("K", Some("1"));
        store.remove("K");
        assert_eq!(*log.lock(), vec!["K", "K"]);
        assert_eq!(store.get("K"), None);
    }

    #[test]
    fn statics_are_silent() {
        let (store, log) = store_with_log();
        store.set_static("PLATFORM", Some("gl"));
        assert!(log.lock().is_empty());
        assert_eq!(
            store.statics(),
            vec![("PLATFORM".to_string(), Some("gl".to_string()))]
        );
        assert_eq!(store.get("PLATFORM"), None);
    }
}
