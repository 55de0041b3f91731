//! Hierarchical namespace tree holding component bindings and sources.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::error::ComponentError;
use crate::value::{Callable, Value};

pub const GLOBAL_NAMESPACE: &str = "Global";
pub const SEPARATOR: char = '.';

/// Splits on the separator, trims segments and drops empty ones.
pub fn segments(path: &str) -> Vec<&str> {
    path.split(SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn normalize_path(path: &str) -> String {
    segments(path).join(".")
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILED VALUES & CODE ENTRIES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub enum CompiledValue {
    Pending,
    Ready(Value),
    Failed(ComponentError),
}

impl CompiledValue {
    /// The value code sees when it reads this binding.
    pub fn read(&self) -> Value {
        match self {
            CompiledValue::Pending => Value::Undefined,
            CompiledValue::Ready(value) => value.clone(),
            CompiledValue::Failed(error) => {
                Value::Function(Callable::Failure(Rc::new(error.clone())))
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, CompiledValue::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CompiledValue::Failed(_))
    }

    pub fn error(&self) -> Option<&ComponentError> {
        match self {
            CompiledValue::Failed(error) => Some(error),
            _ => None,
        }
    }
}

pub type WrapThunk = Rc<dyn Fn() -> String>;

/// One named component's compilation record.
pub struct CodeEntry {
    pub raw_source: String,
    /// Regenerates the wrapped text from `raw_source` and the current namespace.
    pub wrapped_source_thunk: WrapThunk,
    pub last_wrapped_source: Option<String>,
}

impl CodeEntry {
    pub fn new(raw_source: String, wrapped_source_thunk: WrapThunk) -> Self {
        Self {
            raw_source,
            wrapped_source_thunk,
            last_wrapped_source: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TREE
// ═══════════════════════════════════════════════════════════════════════════════

pub struct NamespaceNode {
    name: String,
    pub children: HashMap<String, NamespaceNode>,
    pub bindings: HashMap<String, CompiledValue>,
    pub source_registry: HashMap<String, CodeEntry>,
}

impl NamespaceNode {
    fn new(name: String) -> Self {
        Self {
            name,
            children: HashMap::new(),
            bindings: HashMap::new(),
            source_registry: HashMap::new(),
        }
    }

    /// Fully-qualified dotted path; empty for the root.
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct NamespaceTree {
    root: NamespaceNode,
}

impl Default for NamespaceTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceTree {
    pub fn new() -> Self {
        Self {
            root: NamespaceNode::new(String::new()),
        }
    }

    pub fn root(&self) -> &NamespaceNode {
        &self.root
    }

    /// Resolves `path`, creating missing segments.
    ///
    /// Returns `None` when a segment names a bound component: there is no
    /// namespace there.
    pub fn resolve_or_create(&mut self, path: &str) -> Option<&mut NamespaceNode> {
        let mut node = &mut self.root;
        for segment in segments(path) {
            if node.bindings.contains_key(segment) {
                return None;
            }
            let name = if node.name.is_empty() {
                segment.to_string()
            } else {
                format!("{}{}{}", node.name, SEPARATOR, segment)
            };
            node = node
                .children
                .entry(segment.to_string())
                .or_insert_with(|| NamespaceNode::new(name));
        }
        Some(node)
    }

    /// Resolves an existing path without creating anything.
    pub fn get(&self, path: &str) -> Option<&NamespaceNode> {
        let mut node = &self.root;
        for segment in segments(path) {
            node = node.children.get(segment)?;
        }
        Some(node)
    }

    /// Sets `bindings[identifier]`; false if the path is not a namespace or
    /// the identifier already names a child namespace.
    pub fn bind(&mut self, path: &str, identifier: &str, value: CompiledValue) -> bool {
        match self.resolve_or_create(path) {
            Some(node) if !node.children.contains_key(identifier) => {
                node.bindings.insert(identifier.to_string(), value);
                true
            }
            _ => false,
        }
    }

    pub fn lookup_source(&self, path: &str, identifier: &str) -> Option<&CodeEntry> {
        self.get(path)?.source_registry.get(identifier)
    }

    pub fn lookup_source_mut(&mut self, path: &str, identifier: &str) -> Option<&mut CodeEntry> {
        self.resolve_or_create(path)?
            .source_registry
            .get_mut(identifier)
    }

    pub fn binding(&self, path: &str, identifier: &str) -> Option<&CompiledValue> {
        self.get(path)?.bindings.get(identifier)
    }

    /// Every `(namespace, identifier)` with a source entry, sorted.
    pub fn components(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        collect_components(&self.root, &mut out);
        out.sort();
        out
    }
}

fn collect_components(node: &NamespaceNode, out: &mut Vec<(String, String)>) {
    for identifier in node.source_registry.keys() {
        out.push((node.name.clone(), identifier.clone()));
    }
    for child in node.children.values() {
        collect_components(child, out);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLES
// ═══════════════════════════════════════════════════════════════════════════════

/// A reference to a namespace, resolved against the tree at access time.
#[derive(Clone)]
pub struct NamespaceHandle {
    tree: Weak<RefCell<NamespaceTree>>,
    path: Rc<str>,
}

impl NamespaceHandle {
    pub fn new(tree: Weak<RefCell<NamespaceTree>>, path: &str) -> Self {
        Self {
            tree,
            path: Rc::from(normalize_path(path).as_str()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn child_path(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}{}{}", self.path, SEPARATOR, name)
        }
    }

    /// A binding's current value, a child namespace, or `undefined`.
    pub fn member(&self, name: &str) -> Value {
        let tree = match self.tree.upgrade() {
            Some(tree) => tree,
            None => return Value::Undefined,
        };
        let tree = tree.borrow();
        let node = match tree.get(&self.path) {
            Some(node) => node,
            None => return Value::Undefined,
        };
        if let Some(compiled) = node.bindings.get(name) {
            return compiled.read();
        }
        if node.children.contains_key(name) {
            return Value::Namespace(NamespaceHandle::new(
                self.tree.clone(),
                &self.child_path(name),
            ));
        }
        Value::Undefined
    }

    pub fn has(&self, name: &str) -> bool {
        self.tree
            .upgrade()
            .and_then(|tree| {
                let tree = tree.borrow();
                tree.get(&self.path)
                    .map(|node| node.bindings.contains_key(name) || node.children.contains_key(name))
            })
            .unwrap_or(false)
    }

    /// Binding and child names, sorted.
    pub fn keys(&self) -> Vec<String> {
        let tree = match self.tree.upgrade() {
            Some(tree) => tree,
            None => return Vec::new(),
        };
        let tree = tree.borrow();
        let mut keys: Vec<String> = match tree.get(&self.path) {
            Some(node) => node
                .bindings
                .keys()
                .chain(node.children.keys())
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_creates_intermediate_nodes() {
        let mut tree = NamespaceTree::new();
        let node = tree.resolve_or_create(" X . Y ").unwrap();
        assert_eq!(node.name(), "X.Y");
        assert_eq!(tree.get("X").unwrap().name(), "X");
        assert!(tree.get("X.Y").is_some());
        assert!(tree.get("Z").is_none());
    }

    #[test]
    fn test_name_is_stamped_once() {
        let mut tree = NamespaceTree::new();
        tree.resolve_or_create("A.B");
        tree.resolve_or_create("A.B.C");
        assert_eq!(tree.get("A.B").unwrap().name(), "A.B");
        assert_eq!(tree.get("A.B.C").unwrap().name(), "A.B.C");
    }

    #[test]
    fn test_bound_identifier_is_not_a_namespace() {
        let mut tree = NamespaceTree::new();
        assert!(tree.bind("Global", "Foo", CompiledValue::Ready(Value::Number(1.0))));
        assert!(tree.resolve_or_create("Global.Foo").is_none());
        assert!(tree.resolve_or_create("Global.Foo.Bar").is_none());
        assert!(tree.get("Global.Foo").is_none());
    }

    #[test]
    fn test_child_namespace_cannot_be_bound() {
        let mut tree = NamespaceTree::new();
        tree.resolve_or_create("Global.Widgets");
        assert!(!tree.bind("Global", "Widgets", CompiledValue::Pending));
    }

    #[test]
    fn test_failed_binding_reads_as_placeholder_callable() {
        let failed = CompiledValue::Failed(ComponentError::Compile {
            component: "Bad".to_string(),
            message: "Unexpected token".to_string(),
        });
        assert!(matches!(
            failed.read(),
            Value::Function(Callable::Failure(_))
        ));
        assert!(matches!(CompiledValue::Pending.read(), Value::Undefined));
    }

    #[test]
    fn test_handle_reads_live_bindings() {
        let tree = Rc::new(RefCell::new(NamespaceTree::new()));
        let handle = NamespaceHandle::new(Rc::downgrade(&tree), "X");
        assert!(matches!(handle.member("Foo"), Value::Undefined));

        tree.borrow_mut()
            .bind("X", "Foo", CompiledValue::Ready(Value::Number(1.0)));
        assert_eq!(handle.member("Foo").to_number(), 1.0);

        tree.borrow_mut()
            .bind("X", "Foo", CompiledValue::Ready(Value::Number(2.0)));
        assert_eq!(handle.member("Foo").to_number(), 2.0);

        tree.borrow_mut().resolve_or_create("X.Y");
        match handle.member("Y") {
            Value::Namespace(child) => assert_eq!(child.path(), "X.Y"),
            other => panic!("expected namespace, got {:?}", other),
        }
        assert_eq!(handle.keys(), vec!["Foo".to_string(), "Y".to_string()]);
    }

    #[test]
    fn test_components_are_listed_sorted() {
        let mut tree = NamespaceTree::new();
        let thunk: WrapThunk = Rc::new(String::new);
        for (path, name) in [("Global", "B"), ("X.Y", "A"), ("Global", "A")] {
            tree.resolve_or_create(path)
                .unwrap()
                .source_registry
                .insert(name.to_string(), CodeEntry::new(String::new(), thunk.clone()));
        }
        assert_eq!(
            tree.components(),
            vec![
                ("Global".to_string(), "A".to_string()),
                ("Global".to_string(), "B".to_string()),
                ("X.Y".to_string(), "A".to_string()),
            ]
        );
    }
}
