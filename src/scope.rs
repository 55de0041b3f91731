//! Scope builder: the identifiers visible to code compiled in a namespace.

use std::cell::RefCell;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::rc::{Rc, Weak};

use crate::builtins;
use crate::identifier::is_valid_identifier;
use crate::namespace::{normalize_path, NamespaceHandle, NamespaceTree, GLOBAL_NAMESPACE};
use crate::value::Value;

lazy_static::lazy_static! {
    pub static ref BUILTIN_NAMES: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert(builtins::ELEMENT_FACTORY);
        s.insert(builtins::FRAGMENT);
        s.insert(builtins::MARKDOWN);
        s.insert(builtins::NAMESPACE_NAME);
        s.insert(builtins::USE_NAMESPACE);
        s
    };
}

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(name)
}

pub enum ScopeEntry {
    Builtin(Value),
    /// Re-read from the tree on every access.
    Deferred { namespace: String, identifier: String },
}

/// Identifier → value mapping for one (namespace, evaluation) pair.
pub struct Scope {
    namespace: String,
    entries: BTreeMap<String, ScopeEntry>,
    tree: Weak<RefCell<NamespaceTree>>,
}

impl Scope {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn entry(&self, name: &str) -> Option<&ScopeEntry> {
        self.entries.get(name)
    }

    /// Reads `name`. Names registered after the scope was built are found by
    /// searching the same sources in the same order.
    pub fn get(&self, name: &str) -> Option<Value> {
        match self.entries.get(name) {
            Some(ScopeEntry::Builtin(value)) => Some(value.clone()),
            Some(ScopeEntry::Deferred {
                namespace,
                identifier,
            }) => Some(NamespaceHandle::new(self.tree.clone(), namespace).member(identifier)),
            None => self.get_late(name),
        }
    }

    fn get_late(&self, name: &str) -> Option<Value> {
        if !is_valid_identifier(name) {
            return None;
        }
        [self.namespace.as_str(), GLOBAL_NAMESPACE, ""]
            .into_iter()
            .map(|source| NamespaceHandle::new(self.tree.clone(), source))
            .find(|handle| handle.has(name))
            .map(|handle| handle.member(name))
    }
}

pub struct ScopeBuilder {
    tree: Rc<RefCell<NamespaceTree>>,
}

impl ScopeBuilder {
    pub fn new(tree: Rc<RefCell<NamespaceTree>>) -> Self {
        Self { tree }
    }

    /// Built-ins first, then the namespace itself, `Global`, and the root.
    /// A name already present is never overridden.
    pub fn build(&self, namespace: &str) -> Scope {
        let namespace = normalize_path(namespace);
        let weak = Rc::downgrade(&self.tree);
        let mut entries = BTreeMap::new();

        for (name, value) in builtins::scope_builtins(&namespace, weak.clone()) {
            entries.insert(name.to_string(), ScopeEntry::Builtin(value));
        }

        let tree = self.tree.borrow();
        for source in [namespace.as_str(), GLOBAL_NAMESPACE, ""] {
            let node = match tree.get(source) {
                Some(node) => node,
                None => continue,
            };
            let names = node.bindings.keys().chain(node.children.keys());
            for name in names {
                if is_builtin(name) || !is_valid_identifier(name) {
                    continue;
                }
                if let Entry::Vacant(slot) = entries.entry(name.clone()) {
                    slot.insert(ScopeEntry::Deferred {
                        namespace: node.name().to_string(),
                        identifier: name.clone(),
                    });
                }
            }
        }

        Scope {
            namespace,
            entries,
            tree: weak,
        }
    }
}
