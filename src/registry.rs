//! Component registration with change detection and a debounced refresh.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, info, warn};

use crate::error::ComponentError;
use crate::evaluator::Evaluator;
use crate::identifier::is_valid_identifier;
use crate::namespace::{
    normalize_path, CodeEntry, CompiledValue, NamespaceTree, WrapThunk, GLOBAL_NAMESPACE,
};
use crate::refresh::RefreshNotifier;
use crate::scope::ScopeBuilder;
use crate::settings::RecompilePolicy;
use crate::transform::{to_executable, wrap_for_definition};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The name cannot be a binding; nothing was stored.
    Rejected,
    /// Wrapped text matched the last snapshot; nothing was compiled.
    Unchanged,
    Compiled { failed: bool },
}

/// Regenerates the definition wrapper for `raw` against the live tree.
fn definition_thunk(tree: Weak<RefCell<NamespaceTree>>, raw: String, namespace: String) -> WrapThunk {
    Rc::new(move || match tree.upgrade() {
        Some(tree) => wrap_for_definition(&raw, &ScopeBuilder::new(tree).build(&namespace)),
        None => String::new(),
    })
}

pub struct ComponentRegistry {
    tree: Rc<RefCell<NamespaceTree>>,
    evaluator: Rc<Evaluator>,
    notifier: RefreshNotifier,
    policy: RecompilePolicy,
}

impl ComponentRegistry {
    pub fn new(
        tree: Rc<RefCell<NamespaceTree>>,
        evaluator: Rc<Evaluator>,
        notifier: RefreshNotifier,
        policy: RecompilePolicy,
    ) -> Self {
        Self {
            tree,
            evaluator,
            notifier,
            policy,
        }
    }

    pub fn tree(&self) -> &Rc<RefCell<NamespaceTree>> {
        &self.tree
    }

    pub fn evaluator(&self) -> &Rc<Evaluator> {
        &self.evaluator
    }

    pub fn notifier(&self) -> &RefreshNotifier {
        &self.notifier
    }

    pub fn policy(&self) -> RecompilePolicy {
        self.policy
    }

    /// Full reload: drops every namespace, binding and source entry.
    pub fn rebuild(&self) {
        self.notifier.cancel_pending();
        *self.tree.borrow_mut() = NamespaceTree::new();
        info!("namespace tree rebuilt");
    }

    /// The value code currently sees for `path.identifier`.
    pub fn binding(&self, path: &str, identifier: &str) -> Option<Value> {
        self.tree
            .borrow()
            .binding(path, identifier)
            .map(CompiledValue::read)
    }

    pub fn compiled(&self, path: &str, identifier: &str) -> Option<CompiledValue> {
        self.tree.borrow().binding(path, identifier).cloned()
    }

    /// Last wrapped text compiled for `path.identifier`.
    pub fn snapshot(&self, path: &str, identifier: &str) -> Option<String> {
        self.tree
            .borrow()
            .lookup_source(path, identifier)
            .and_then(|entry| entry.last_wrapped_source.clone())
    }

    pub async fn register_component(
        &self,
        raw_source: &str,
        name: &str,
        namespace: &str,
    ) -> RegistrationOutcome {
        self.register(raw_source, name, namespace, true).await
    }

    /// Registers one component; `notify` controls whether a refresh is scheduled.
    pub async fn register(
        &self,
        raw_source: &str,
        name: &str,
        namespace: &str,
        notify: bool,
    ) -> RegistrationOutcome {
        if !is_valid_identifier(name) {
            let error = ComponentError::InvalidIdentifier {
                name: name.to_string(),
            };
            warn!(component = %name, code = error.code(), "{}", error);
            return RegistrationOutcome::Rejected;
        }

        let mut namespace = normalize_path(namespace);
        if namespace.is_empty() {
            namespace = GLOBAL_NAMESPACE.to_string();
        }

        let thunk = match self.upsert_entry(raw_source, name, &namespace) {
            Some(thunk) => thunk,
            None => return RegistrationOutcome::Rejected,
        };

        let wrapped = thunk();
        if self.snapshot(&namespace, name).as_deref() == Some(wrapped.as_str()) {
            debug!(namespace = %namespace, component = %name, "source unchanged, skipping compile");
            return RegistrationOutcome::Unchanged;
        }

        let failed = self.compile_and_bind(&namespace, name, wrapped).await;

        if self.policy == RecompilePolicy::All {
            self.recompile_others(&namespace, name).await;
        }

        if notify {
            self.notifier.schedule();
        }
        RegistrationOutcome::Compiled { failed }
    }

    /// Stores the raw source and returns the entry's wrap thunk.
    ///
    /// The identifier is bound `Pending` on first sight so its own name is part
    /// of the scope keys from the very first wrap.
    fn upsert_entry(&self, raw_source: &str, name: &str, namespace: &str) -> Option<WrapThunk> {
        let weak = Rc::downgrade(&self.tree);
        let mut tree = self.tree.borrow_mut();
        let node = match tree.resolve_or_create(namespace) {
            Some(node) => node,
            None => {
                warn!(namespace = %namespace, component = %name, "namespace path runs through a component");
                return None;
            }
        };
        if node.children.contains_key(name) {
            warn!(namespace = %namespace, component = %name, "name is already a namespace");
            return None;
        }

        let thunk = definition_thunk(weak, raw_source.to_string(), namespace.to_string());
        match node.source_registry.get_mut(name) {
            Some(entry) => {
                entry.raw_source = raw_source.to_string();
                entry.wrapped_source_thunk = thunk.clone();
            }
            None => {
                node.source_registry.insert(
                    name.to_string(),
                    CodeEntry::new(raw_source.to_string(), thunk.clone()),
                );
            }
        }
        node.bindings
            .entry(name.to_string())
            .or_insert(CompiledValue::Pending);
        Some(thunk)
    }

    /// Records the snapshot, compiles it and binds the result. True on failure.
    async fn compile_and_bind(&self, namespace: &str, name: &str, wrapped: String) -> bool {
        if let Some(entry) = self.tree.borrow_mut().lookup_source_mut(namespace, name) {
            entry.last_wrapped_source = Some(wrapped.clone());
        }

        let compiled = self.compile(&wrapped, namespace, name).await;
        let failed = compiled.is_failed();
        self.tree.borrow_mut().bind(namespace, name, compiled);
        failed
    }

    async fn compile(&self, wrapped: &str, namespace: &str, name: &str) -> CompiledValue {
        let result = match to_executable(wrapped) {
            Ok(executable) => self.evaluator.evaluate(&executable, namespace, name).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(value) => {
                info!(namespace = %namespace, component = %name, "component compiled");
                CompiledValue::Ready(value)
            }
            Err(err) => {
                let error = ComponentError::from_eval(name, &err);
                warn!(namespace = %namespace, component = %name, code = error.code(), "{}", error);
                CompiledValue::Failed(error)
            }
        }
    }

    async fn recompile_others(&self, namespace: &str, name: &str) {
        let others = self.tree.borrow().components();
        for (other_namespace, other_name) in others {
            if other_namespace == namespace && other_name == name {
                continue;
            }
            let thunk = match self.tree.borrow().lookup_source(&other_namespace, &other_name) {
                Some(entry) => entry.wrapped_source_thunk.clone(),
                None => continue,
            };
            let wrapped = thunk();
            self.compile_and_bind(&other_namespace, &other_name, wrapped)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Interpreter;

    fn registry(policy: RecompilePolicy) -> ComponentRegistry {
        let tree = Rc::new(RefCell::new(NamespaceTree::new()));
        let evaluator = Rc::new(Evaluator::new(tree.clone(), Rc::new(Interpreter::default())));
        ComponentRegistry::new(tree, evaluator, RefreshNotifier::default(), policy)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_invalid_name_is_rejected() {
        let registry = registry(RecompilePolicy::All);
        let outcome = registry.register("1", "not a name", "Global", false).await;
        assert_eq!(outcome, RegistrationOutcome::Rejected);
        assert!(registry.tree().borrow().components().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_name_of_child_namespace_is_rejected() {
        let registry = registry(RecompilePolicy::All);
        registry.tree().borrow_mut().resolve_or_create("Global.Cards");
        let outcome = registry.register("1", "Cards", "Global", false).await;
        assert_eq!(outcome, RegistrationOutcome::Rejected);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_empty_namespace_means_global() {
        let registry = registry(RecompilePolicy::All);
        registry.register("1", "One", "", false).await;
        assert!(registry.compiled("Global", "One").is_some());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_snapshot_tracks_wrapped_text() {
        let registry = registry(RecompilePolicy::All);
        registry.register("return 1;", "One", "Global", false).await;
        let snapshot = registry.snapshot("Global", "One").unwrap();
        assert!(snapshot.contains("const One = scope.One;"));
        assert!(snapshot.contains("return 1;"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_rebuild_discards_everything() {
        let registry = registry(RecompilePolicy::All);
        registry.register("1", "One", "Global", false).await;
        registry.rebuild();
        assert!(registry.compiled("Global", "One").is_none());
        assert!(registry.tree().borrow().get("Global").is_none());
    }
}
