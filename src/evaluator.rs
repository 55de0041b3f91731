//! Loads executable text as an in-memory module and runs its default export.

use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

use crate::error::{EvalError, EvalResult};
use crate::interpreter::Interpreter;
use crate::ir;
use crate::lowering::lower_module;
use crate::namespace::NamespaceTree;
use crate::scope::{Scope, ScopeBuilder};
use crate::transform::to_executable;
use crate::value::{Callable, GuardedComponent, Value};

pub fn compute_digest(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Native `transform` handed to inline wrappers.
fn transform_native() -> Value {
    Value::Function(Callable::native("transform", |_, args| match args.first() {
        Some(Value::String(source)) => to_executable(source).map(Value::from),
        Some(other) => Ok(other.clone()),
        None => Ok(Value::Undefined),
    }))
}

pub struct Evaluator {
    tree: Rc<RefCell<NamespaceTree>>,
    interpreter: Rc<Interpreter>,
    /// Parsed modules keyed by the digest of their text; session only.
    modules: RefCell<HashMap<String, Rc<ir::Module>>>,
}

impl Evaluator {
    pub fn new(tree: Rc<RefCell<NamespaceTree>>, interpreter: Rc<Interpreter>) -> Self {
        Self {
            tree,
            interpreter,
            modules: RefCell::new(HashMap::new()),
        }
    }

    pub fn interpreter(&self) -> &Rc<Interpreter> {
        &self.interpreter
    }

    pub fn scope(&self, namespace: &str) -> Scope {
        ScopeBuilder::new(self.tree.clone()).build(namespace)
    }

    pub fn module_count(&self) -> usize {
        self.modules.borrow().len()
    }

    async fn load(&self, executable: &str) -> EvalResult<Rc<ir::Module>> {
        let digest = compute_digest(executable);
        if let Some(module) = self.modules.borrow().get(&digest) {
            return Ok(module.clone());
        }

        // Module resolution is the one suspend point of an evaluation
        tokio::task::yield_now().await;

        let module = Rc::new(lower_module(executable)?);
        debug!(digest = %&digest[..12], "loaded module");
        self.modules.borrow_mut().insert(digest, module.clone());
        Ok(module)
    }

    /// Runs `executable` against the scope of `namespace`.
    ///
    /// A callable result is wrapped so failures at invocation time render a
    /// placeholder carrying `label` instead of propagating.
    pub async fn evaluate(&self, executable: &str, namespace: &str, label: &str) -> EvalResult<Value> {
        let module = self.load(executable).await?;
        let scope = Rc::new(self.scope(namespace));

        let export = self.interpreter.run_module(&module, scope.clone())?;
        let factory = export
            .as_callable()
            .ok_or_else(|| EvalError::type_error("default export is not a function"))?;

        let result = self
            .interpreter
            .call(factory, &[Value::Scope(scope), transform_native()])?;

        Ok(match result {
            Value::Function(inner) => Value::Function(Callable::Component(Rc::new(GuardedComponent {
                name: label.to_string(),
                inner: Value::Function(inner),
            }))),
            other => other,
        })
    }
}
