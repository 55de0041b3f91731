//! Tree-walking evaluation of the lowered IR.
//!
//! Environments are chains of frames. A module's root frame may carry the
//! [`Scope`] it was evaluated against: identifiers that are not bound
//! lexically resolve through that scope at access time, then through the
//! standard globals.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

use crate::builtins;
use crate::error::{ComponentError, EvalError, EvalResult};
use crate::ir::{self, ArrayItem, AssignOp, BinaryOp, Expr, LogicalOp, MemberKey, Pattern, Stmt, UnaryOp};
use crate::lowering;
use crate::scope::Scope;
use crate::value::{number_to_string, Callable, Closure, Element, ObjectMap, Value};

pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Native stack the outermost call may grow by before nested calls fail with
/// a `RangeError`. Half of a default 2 MiB thread stack.
pub const DEFAULT_STACK_BUDGET: usize = 1024 * 1024;

fn stack_position() -> usize {
    let marker = 0u8;
    std::hint::black_box(&marker) as *const u8 as usize
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENVIRONMENTS
// ═══════════════════════════════════════════════════════════════════════════════

struct Binding {
    value: Value,
    mutable: bool,
}

pub struct Frame {
    vars: HashMap<String, Binding>,
    parent: Option<Env>,
    fallback: Option<Rc<Scope>>,
}

pub type Env = Rc<RefCell<Frame>>;

impl Frame {
    /// A root frame; `fallback` resolves identifiers no frame binds.
    pub fn root(fallback: Option<Rc<Scope>>) -> Env {
        Rc::new(RefCell::new(Frame {
            vars: HashMap::new(),
            parent: None,
            fallback,
        }))
    }

    pub fn child(parent: &Env) -> Env {
        Rc::new(RefCell::new(Frame {
            vars: HashMap::new(),
            parent: Some(parent.clone()),
            fallback: None,
        }))
    }

    /// A sibling frame holding copies of this frame's bindings.
    fn copy_of(env: &Env) -> Env {
        let frame = env.borrow();
        let vars = frame
            .vars
            .iter()
            .map(|(name, b)| {
                (
                    name.clone(),
                    Binding {
                        value: b.value.clone(),
                        mutable: b.mutable,
                    },
                )
            })
            .collect();
        Rc::new(RefCell::new(Frame {
            vars,
            parent: frame.parent.clone(),
            fallback: frame.fallback.clone(),
        }))
    }
}

fn declare(env: &Env, name: &str, value: Value, mutable: bool) -> EvalResult<()> {
    let mut frame = env.borrow_mut();
    if frame.vars.contains_key(name) {
        return Err(EvalError::Syntax(format!(
            "Identifier '{}' has already been declared",
            name
        )));
    }
    frame.vars.insert(name.to_string(), Binding { value, mutable });
    Ok(())
}

enum Lookup {
    Found(Value),
    Missing(Option<Rc<Scope>>),
}

fn lookup(env: &Env, name: &str) -> Lookup {
    let mut current = Some(env.clone());
    let mut fallback = None;
    while let Some(frame_rc) = current {
        let frame = frame_rc.borrow();
        if let Some(binding) = frame.vars.get(name) {
            return Lookup::Found(binding.value.clone());
        }
        if fallback.is_none() {
            fallback = frame.fallback.clone();
        }
        current = frame.parent.clone();
    }
    Lookup::Missing(fallback)
}

fn assign_var(env: &Env, name: &str, value: Value) -> EvalResult<()> {
    let mut current = Some(env.clone());
    while let Some(frame_rc) = current {
        let mut frame = frame_rc.borrow_mut();
        if let Some(binding) = frame.vars.get_mut(name) {
            if !binding.mutable {
                return Err(EvalError::type_error("Assignment to constant variable."));
            }
            binding.value = value;
            return Ok(());
        }
        current = frame.parent.clone();
    }
    Err(EvalError::Reference {
        name: name.to_string(),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOST MODULES
// ═══════════════════════════════════════════════════════════════════════════════

/// Modules an import declaration may resolve to, keyed by specifier.
#[derive(Default, Clone)]
pub struct HostModules {
    modules: HashMap<String, ObjectMap>,
}

impl HostModules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, specifier: &str, exports: ObjectMap) {
        self.modules.insert(specifier.to_string(), exports);
    }

    pub fn get(&self, specifier: &str) -> Option<&ObjectMap> {
        self.modules.get(specifier)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERPRETER
// ═══════════════════════════════════════════════════════════════════════════════

enum Completion {
    Normal(Option<Value>),
    Return(Value),
    Break,
    Continue,
}

enum Place {
    Var(String),
    Prop(Value, String),
}

struct DepthGuard<'a> {
    depth: &'a Cell<usize>,
    stack_base: &'a Cell<Option<usize>>,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        let depth = self.depth.get().saturating_sub(1);
        self.depth.set(depth);
        if depth == 0 {
            self.stack_base.set(None);
        }
    }
}

pub struct Interpreter {
    globals: HashMap<String, Value>,
    modules: HostModules,
    max_call_depth: usize,
    stack_budget: usize,
    depth: Cell<usize>,
    /// Stack position of the outermost active call.
    stack_base: Cell<Option<usize>>,
    scripts: RefCell<HashMap<String, Rc<ir::Script>>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALL_DEPTH, HostModules::new())
    }
}

impl Interpreter {
    pub fn new(max_call_depth: usize, modules: HostModules) -> Self {
        Self {
            globals: builtins::std_globals(),
            modules,
            max_call_depth,
            stack_budget: DEFAULT_STACK_BUDGET,
            depth: Cell::new(0),
            stack_base: Cell::new(None),
            scripts: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_stack_budget(mut self, bytes: usize) -> Self {
        self.stack_budget = bytes;
        self
    }

    pub fn max_call_depth(&self) -> usize {
        self.max_call_depth
    }

    /// Fails once the call depth or the native stack used since the outermost
    /// call exceeds its limit.
    fn enter_call(&self) -> EvalResult<DepthGuard<'_>> {
        let here = stack_position();
        let base = match self.stack_base.get() {
            Some(base) => base,
            None => {
                self.stack_base.set(Some(here));
                here
            }
        };
        if self.depth.get() >= self.max_call_depth || base.abs_diff(here) > self.stack_budget {
            if self.depth.get() == 0 {
                self.stack_base.set(None);
            }
            return Err(EvalError::Range(
                "Maximum call stack size exceeded".to_string(),
            ));
        }
        self.depth.set(self.depth.get() + 1);
        Ok(DepthGuard {
            depth: &self.depth,
            stack_base: &self.stack_base,
        })
    }

    /// Instantiates a lowered module against `scope` and returns its default export.
    pub fn run_module(&self, module: &ir::Module, scope: Rc<Scope>) -> EvalResult<Value> {
        let env = Frame::root(Some(scope));

        for import in &module.imports {
            let exports = match self.modules.get(&import.source) {
                Some(exports) => exports,
                // Side-effect imports (stylesheets and the like) belong to the host
                None if import.bindings.is_empty() => {
                    debug!(module = %import.source, "side-effect import skipped");
                    continue;
                }
                None => return Err(EvalError::UnresolvedModule(import.source.clone())),
            };
            for binding in &import.bindings {
                let value = match &binding.imported {
                    None => Value::object(exports.clone()),
                    Some(name) => exports.get(name).cloned().ok_or_else(|| {
                        EvalError::UnresolvedModule(format!(
                            "{} (no export named '{}')",
                            import.source, name
                        ))
                    })?,
                };
                declare(&env, &binding.local, value, false)?;
            }
        }

        self.exec_stmts(&module.body, &env)?;

        match &module.default_export {
            Some(expr) => self.eval_expr(expr, &env),
            None => Err(EvalError::MissingDefaultExport),
        }
    }

    /// Runs a standalone program and returns its completion value.
    pub fn run_script(&self, text: &str, env: &Env) -> EvalResult<Value> {
        let script = self.script(text)?;
        let child = Frame::child(env);
        match self.exec_stmts(&script.body, &child)? {
            Completion::Normal(last) => Ok(last.unwrap_or_default()),
            Completion::Return(_) => Err(EvalError::Syntax("Illegal return statement".to_string())),
            Completion::Break | Completion::Continue => {
                Err(EvalError::Syntax("Illegal break or continue".to_string()))
            }
        }
    }

    fn script(&self, text: &str) -> EvalResult<Rc<ir::Script>> {
        if let Some(script) = self.scripts.borrow().get(text) {
            return Ok(script.clone());
        }
        let script = Rc::new(lowering::lower_script(text)?);
        self.scripts
            .borrow_mut()
            .insert(text.to_string(), script.clone());
        Ok(script)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Calls
    // ───────────────────────────────────────────────────────────────────────────

    pub fn call(&self, callable: &Callable, args: &[Value]) -> EvalResult<Value> {
        let _guard = self.enter_call()?;

        match callable {
            Callable::Native(native) => (native.func)(self, args),
            Callable::Closure(closure) => self.call_closure(closure, args),
            Callable::Method { receiver, name } => {
                builtins::call_method(self, receiver, name, args)
            }
            Callable::Component(guarded) => {
                let inner = match guarded.inner.as_callable() {
                    Some(inner) => inner,
                    None => return Ok(guarded.inner.clone()),
                };
                match self.call(inner, args) {
                    Ok(value) => Ok(value),
                    Err(err) => {
                        let error = ComponentError::Invocation {
                            component: guarded.name.clone(),
                            message: err.to_string(),
                        };
                        warn!(component = %guarded.name, code = error.code(), "{}", error);
                        Ok(Value::element(Element::placeholder(&error)))
                    }
                }
            }
            Callable::Failure(error) => Ok(Value::element(Element::placeholder(error))),
        }
    }

    fn call_closure(&self, closure: &Closure, args: &[Value]) -> EvalResult<Value> {
        let env = Frame::child(&closure.env);
        for (i, param) in closure.def.params.iter().enumerate() {
            let arg = args.get(i).cloned().unwrap_or_default();
            self.bind_pattern(param, arg, &env, true)?;
        }

        match self.exec_stmts(&closure.def.body, &env)? {
            Completion::Return(value) => Ok(value),
            Completion::Normal(last) if closure.def.completion => Ok(last.unwrap_or_default()),
            Completion::Normal(_) => Ok(Value::Undefined),
            Completion::Break | Completion::Continue => {
                Err(EvalError::Syntax("Illegal break or continue".to_string()))
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Statements
    // ───────────────────────────────────────────────────────────────────────────

    fn hoist(&self, stmts: &[Stmt], env: &Env) -> EvalResult<()> {
        for stmt in stmts {
            if let Stmt::Function(name, def) = stmt {
                let closure = Callable::Closure(Rc::new(Closure {
                    def: def.clone(),
                    env: env.clone(),
                }));
                declare(env, name, Value::Function(closure), true)?;
            }
        }
        Ok(())
    }

    fn exec_stmts(&self, stmts: &[Stmt], env: &Env) -> EvalResult<Completion> {
        self.hoist(stmts, env)?;
        let mut last = None;
        for stmt in stmts {
            match self.exec_stmt(stmt, env)? {
                Completion::Normal(Some(value)) => last = Some(value),
                Completion::Normal(None) => {}
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal(last))
    }

    /// Runs a loop body; `Some` carries a completion that ends the loop.
    fn exec_loop_body(
        &self,
        body: &Stmt,
        env: &Env,
        last: &mut Option<Value>,
    ) -> EvalResult<Option<Completion>> {
        match self.exec_stmt(body, env)? {
            Completion::Normal(value) => {
                if value.is_some() {
                    *last = value;
                }
                Ok(None)
            }
            Completion::Continue => Ok(None),
            Completion::Break => Ok(Some(Completion::Normal(last.take()))),
            ret @ Completion::Return(_) => Ok(Some(ret)),
        }
    }

    fn exec_stmt(&self, stmt: &Stmt, env: &Env) -> EvalResult<Completion> {
        match stmt {
            Stmt::Expr(expr) => Ok(Completion::Normal(Some(self.eval_expr(expr, env)?))),
            Stmt::Declare { kind, decls } => {
                for (pattern, init) in decls {
                    let value = match init {
                        Some(init) => self.eval_expr(init, env)?,
                        None => Value::Undefined,
                    };
                    self.bind_pattern(pattern, value, env, *kind == ir::DeclKind::Let)?;
                }
                Ok(Completion::Normal(None))
            }
            Stmt::Function(..) | Stmt::Empty => Ok(Completion::Normal(None)),
            Stmt::Return(expr) => Ok(Completion::Return(match expr {
                Some(expr) => self.eval_expr(expr, env)?,
                None => Value::Undefined,
            })),
            Stmt::If(test, consequent, alternate) => {
                if self.eval_expr(test, env)?.truthy() {
                    self.exec_stmt(consequent, env)
                } else if let Some(alternate) = alternate {
                    self.exec_stmt(alternate, env)
                } else {
                    Ok(Completion::Normal(None))
                }
            }
            Stmt::Block(stmts) => self.exec_stmts(stmts, &Frame::child(env)),
            Stmt::While(test, body) => {
                let mut last = None;
                while self.eval_expr(test, env)?.truthy() {
                    if let Some(done) = self.exec_loop_body(body, env, &mut last)? {
                        return Ok(done);
                    }
                }
                Ok(Completion::Normal(last))
            }
            Stmt::DoWhile(body, test) => {
                let mut last = None;
                loop {
                    if let Some(done) = self.exec_loop_body(body, env, &mut last)? {
                        return Ok(done);
                    }
                    if !self.eval_expr(test, env)?.truthy() {
                        break;
                    }
                }
                Ok(Completion::Normal(last))
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let mut iteration = Frame::child(env);
                if let Some(init) = init {
                    self.exec_stmt(init, &iteration)?;
                }
                let mut last = None;
                loop {
                    // Each iteration gets its own copy of the loop bindings
                    iteration = Frame::copy_of(&iteration);
                    if let Some(test) = test {
                        if !self.eval_expr(test, &iteration)?.truthy() {
                            break;
                        }
                    }
                    if let Some(done) = self.exec_loop_body(body, &iteration, &mut last)? {
                        return Ok(done);
                    }
                    if let Some(update) = update {
                        self.eval_expr(update, &iteration)?;
                    }
                }
                Ok(Completion::Normal(last))
            }
            Stmt::ForOf {
                kind,
                pattern,
                iterable,
                body,
            } => {
                let items = self.iterate(&self.eval_expr(iterable, env)?)?;
                self.exec_for_each(*kind, pattern, items, body, env)
            }
            Stmt::ForIn {
                kind,
                pattern,
                object,
                body,
            } => {
                let keys = builtins::own_keys(&self.eval_expr(object, env)?)
                    .into_iter()
                    .map(Value::from)
                    .collect();
                self.exec_for_each(*kind, pattern, keys, body, env)
            }
            Stmt::Break => Ok(Completion::Break),
            Stmt::Continue => Ok(Completion::Continue),
            Stmt::Throw(expr) => Err(EvalError::Thrown(self.eval_expr(expr, env)?)),
            Stmt::Try {
                block,
                param,
                handler,
                finalizer,
            } => {
                let mut result = self.exec_stmts(block, &Frame::child(env));
                if let (Err(err), Some(handler)) = (&result, handler) {
                    let catch_env = Frame::child(env);
                    if let Some(param) = param {
                        self.bind_pattern(param, err.clone().into_thrown_value(), &catch_env, true)?;
                    }
                    result = self.exec_stmts(handler, &catch_env);
                }
                if let Some(finalizer) = finalizer {
                    match self.exec_stmts(finalizer, &Frame::child(env))? {
                        Completion::Normal(_) => {}
                        abrupt => return Ok(abrupt),
                    }
                }
                result
            }
        }
    }

    fn exec_for_each(
        &self,
        kind: ir::DeclKind,
        pattern: &Pattern,
        items: Vec<Value>,
        body: &Stmt,
        env: &Env,
    ) -> EvalResult<Completion> {
        let mut last = None;
        for item in items {
            let iteration = Frame::child(env);
            self.bind_pattern(pattern, item, &iteration, kind == ir::DeclKind::Let)?;
            if let Some(done) = self.exec_loop_body(body, &iteration, &mut last)? {
                return Ok(done);
            }
        }
        Ok(Completion::Normal(last))
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Patterns
    // ───────────────────────────────────────────────────────────────────────────

    fn bind_pattern(&self, pattern: &Pattern, value: Value, env: &Env, mutable: bool) -> EvalResult<()> {
        match pattern {
            Pattern::Ident(name) => declare(env, name, value, mutable),
            Pattern::Default(inner, default) => {
                let value = if matches!(value, Value::Undefined) {
                    self.eval_expr(default, env)?
                } else {
                    value
                };
                self.bind_pattern(inner, value, env, mutable)
            }
            Pattern::Object { props, rest } => {
                if value.is_nullish() {
                    return Err(EvalError::type_error(format!(
                        "Cannot destructure '{}' as it is {}.",
                        value.display_string(),
                        value.display_string()
                    )));
                }
                let mut used = Vec::with_capacity(props.len());
                for (key, inner) in props {
                    let key = self.member_key(key, env)?;
                    let prop = self.get_property(&value, &key)?;
                    self.bind_pattern(inner, prop, env, mutable)?;
                    used.push(key);
                }
                if let Some(rest) = rest {
                    let mut remaining = ObjectMap::new();
                    if let Value::Object(map) = &value {
                        for (k, v) in map.borrow().iter() {
                            if !used.contains(k) {
                                remaining.insert(k.clone(), v.clone());
                            }
                        }
                    }
                    self.bind_pattern(rest, Value::object(remaining), env, mutable)?;
                }
                Ok(())
            }
            Pattern::Array { elements, rest } => {
                let items = self.iterate(&value)?;
                for (i, element) in elements.iter().enumerate() {
                    if let Some(element) = element {
                        let item = items.get(i).cloned().unwrap_or_default();
                        self.bind_pattern(element, item, env, mutable)?;
                    }
                }
                if let Some(rest) = rest {
                    let tail = items.get(elements.len()..).unwrap_or(&[]).to_vec();
                    self.bind_pattern(rest, Value::array(tail), env, mutable)?;
                }
                Ok(())
            }
        }
    }

    pub fn iterate(&self, value: &Value) -> EvalResult<Vec<Value>> {
        match value {
            Value::Array(items) => Ok(items.borrow().clone()),
            Value::String(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
            other => Err(EvalError::type_error(format!(
                "{} is not iterable",
                other.display_string()
            ))),
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Properties
    // ───────────────────────────────────────────────────────────────────────────

    fn member_key(&self, key: &MemberKey, env: &Env) -> EvalResult<String> {
        match key {
            MemberKey::Static(name) => Ok(name.clone()),
            MemberKey::Computed(expr) => Ok(property_key(&self.eval_expr(expr, env)?)),
        }
    }

    pub fn get_property(&self, object: &Value, key: &str) -> EvalResult<Value> {
        match object {
            Value::Undefined | Value::Null => Err(EvalError::type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                object.display_string(),
                key
            ))),
            Value::Object(map) => Ok(map.borrow().get(key).cloned().unwrap_or_default()),
            Value::Namespace(handle) => Ok(handle.member(key)),
            Value::Scope(scope) => Ok(scope.get(key).unwrap_or_default()),
            Value::Function(callable) => Ok(match key {
                "name" => Value::from(callable.name()),
                _ => Value::Undefined,
            }),
            Value::Element(element) => Ok(match key {
                "props" => {
                    let mut props = element.props.clone();
                    if !element.children.is_empty() {
                        props.insert("children".to_string(), Value::array(element.children.clone()));
                    }
                    Value::object(props)
                }
                _ => Value::Undefined,
            }),
            Value::Array(items) => {
                if key == "length" {
                    return Ok(Value::Number(items.borrow().len() as f64));
                }
                if let Ok(index) = key.parse::<usize>() {
                    return Ok(items.borrow().get(index).cloned().unwrap_or_default());
                }
                Ok(builtins::method(object, key))
            }
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                if let Ok(index) = key.parse::<usize>() {
                    return Ok(s
                        .chars()
                        .nth(index)
                        .map(|c| Value::from(c.to_string()))
                        .unwrap_or_default());
                }
                Ok(builtins::method(object, key))
            }
            Value::Number(_) | Value::Bool(_) => Ok(builtins::method(object, key)),
        }
    }

    pub fn set_property(&self, object: &Value, key: &str, value: Value) -> EvalResult<()> {
        match object {
            Value::Object(map) => {
                map.borrow_mut().insert(key.to_string(), value);
                Ok(())
            }
            Value::Array(items) => {
                let mut items = items.borrow_mut();
                if key == "length" {
                    let len = builtins::check_array_length(value.to_number())?;
                    items.resize(len, Value::Undefined);
                    return Ok(());
                }
                match key.parse::<u64>() {
                    Ok(index) if index < builtins::ARRAY_INDEX_LIMIT => {
                        let index = index as usize;
                        if index >= items.len() {
                            let len = builtins::check_array_length(index as f64 + 1.0)?;
                            items.resize(len, Value::Undefined);
                        }
                        items[index] = value;
                        Ok(())
                    }
                    _ => Err(EvalError::type_error(format!(
                        "Cannot set property '{}' on an array",
                        key
                    ))),
                }
            }
            other => Err(EvalError::type_error(format!(
                "Cannot set property '{}' of {}",
                key,
                other.display_string()
            ))),
        }
    }

    fn has_property(&self, object: &Value, key: &str) -> EvalResult<bool> {
        match object {
            Value::Object(map) => Ok(map.borrow().contains_key(key)),
            Value::Array(items) => Ok(key == "length"
                || key
                    .parse::<usize>()
                    .map(|i| i < items.borrow().len())
                    .unwrap_or(false)),
            Value::Namespace(handle) => Ok(handle.has(key)),
            Value::Scope(scope) => Ok(scope.contains(key)),
            other => Err(EvalError::type_error(format!(
                "Cannot use 'in' operator to search for '{}' in {}",
                key,
                other.display_string()
            ))),
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Expressions
    // ───────────────────────────────────────────────────────────────────────────

    fn resolve(&self, name: &str, env: &Env) -> Option<Value> {
        match lookup(env, name) {
            Lookup::Found(value) => Some(value),
            Lookup::Missing(fallback) => {
                if let Some(scope) = fallback {
                    if let Some(value) = scope.get(name) {
                        return Some(value);
                    }
                }
                self.globals.get(name).cloned()
            }
        }
    }

    fn eval_items(&self, items: &[ArrayItem], env: &Env) -> EvalResult<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ArrayItem::Item(expr) => out.push(self.eval_expr(expr, env)?),
                ArrayItem::Spread(expr) => {
                    let value = self.eval_expr(expr, env)?;
                    out.extend(self.iterate(&value)?);
                }
                ArrayItem::Hole => out.push(Value::Undefined),
            }
        }
        Ok(out)
    }

    fn call_value(&self, callee: &Value, args: &[Value], describe: &str) -> EvalResult<Value> {
        match callee.as_callable() {
            Some(callable) => self.call(callable, args),
            None => Err(EvalError::type_error(format!("{} is not a function", describe))),
        }
    }

    /// Evaluates inside an optional chain; `None` means the chain short-circuited.
    fn eval_chain(&self, expr: &Expr, env: &Env) -> EvalResult<Option<Value>> {
        match expr {
            Expr::Member {
                object,
                key,
                optional,
            } => {
                let object = match self.eval_chain(object, env)? {
                    Some(object) => object,
                    None => return Ok(None),
                };
                if *optional && object.is_nullish() {
                    return Ok(None);
                }
                let key = self.member_key(key, env)?;
                self.get_property(&object, &key).map(Some)
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => {
                let function = match self.eval_chain(callee, env)? {
                    Some(function) => function,
                    None => return Ok(None),
                };
                if *optional && function.is_nullish() {
                    return Ok(None);
                }
                let args = self.eval_items(args, env)?;
                self.call_value(&function, &args, &describe(callee)).map(Some)
            }
            other => self.eval_expr(other, env).map(Some),
        }
    }

    fn place(&self, target: &ir::Target, env: &Env) -> EvalResult<Place> {
        match target {
            ir::Target::Ident(name) => Ok(Place::Var(name.clone())),
            ir::Target::Member { object, key } => {
                let object = self.eval_expr(object, env)?;
                let key = self.member_key(key, env)?;
                Ok(Place::Prop(object, key))
            }
        }
    }

    fn read_place(&self, place: &Place, env: &Env) -> EvalResult<Value> {
        match place {
            Place::Var(name) => self.resolve(name, env).ok_or_else(|| EvalError::Reference {
                name: name.clone(),
            }),
            Place::Prop(object, key) => self.get_property(object, key),
        }
    }

    fn write_place(&self, place: &Place, value: Value, env: &Env) -> EvalResult<()> {
        match place {
            Place::Var(name) => assign_var(env, name, value),
            Place::Prop(object, key) => self.set_property(object, key, value),
        }
    }

    pub fn eval_expr(&self, expr: &Expr, env: &Env) -> EvalResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                ir::Literal::Undefined => Value::Undefined,
                ir::Literal::Null => Value::Null,
                ir::Literal::Bool(b) => Value::Bool(*b),
                ir::Literal::Number(n) => Value::Number(*n),
                ir::Literal::String(s) => Value::String(s.clone()),
            }),
            Expr::Template { quasis, exprs } => {
                let mut out = String::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(expr) = exprs.get(i) {
                        out.push_str(&self.eval_expr(expr, env)?.display_string());
                    }
                    builtins::check_string_length(out.len() as f64)?;
                }
                Ok(Value::from(out))
            }
            Expr::Ident(name) => self.resolve(name, env).ok_or_else(|| EvalError::Reference {
                name: name.clone(),
            }),
            Expr::Array(items) => Ok(Value::array(self.eval_items(items, env)?)),
            Expr::Object(props) => {
                let mut map = ObjectMap::new();
                for prop in props {
                    match prop {
                        ir::PropItem::Init(key, value) => {
                            map.insert(key.clone(), self.eval_expr(value, env)?);
                        }
                        ir::PropItem::Computed(key, value) => {
                            let key = property_key(&self.eval_expr(key, env)?);
                            map.insert(key, self.eval_expr(value, env)?);
                        }
                        ir::PropItem::Spread(expr) => {
                            let source = self.eval_expr(expr, env)?;
                            for key in builtins::own_keys(&source) {
                                let value = self.get_property(&source, &key)?;
                                map.insert(key, value);
                            }
                        }
                    }
                }
                Ok(Value::object(map))
            }
            Expr::Function(def) => Ok(Value::Function(Callable::Closure(Rc::new(Closure {
                def: def.clone(),
                env: env.clone(),
            })))),
            Expr::Member { object, key, .. } => {
                let object = self.eval_expr(object, env)?;
                let key = self.member_key(key, env)?;
                self.get_property(&object, &key)
            }
            Expr::Call { callee, args, .. } => {
                let function = self.eval_expr(callee, env)?;
                let args = self.eval_items(args, env)?;
                self.call_value(&function, &args, &describe(callee))
            }
            Expr::New { callee, args } => {
                let function = self.eval_expr(callee, env)?;
                let args = self.eval_items(args, env)?;
                match function.as_callable() {
                    Some(callable @ Callable::Native(_)) => self.call(callable, &args),
                    _ => Err(EvalError::type_error(format!(
                        "{} is not a constructor",
                        describe(callee)
                    ))),
                }
            }
            Expr::DirectEval(args) => {
                let args = self.eval_items(args, env)?;
                match args.into_iter().next() {
                    Some(Value::String(text)) => self.run_script(&text, env),
                    Some(other) => Ok(other),
                    None => Ok(Value::Undefined),
                }
            }
            Expr::Chain(inner) => Ok(self.eval_chain(inner, env)?.unwrap_or_default()),
            Expr::Unary(op, operand) => {
                if let (UnaryOp::TypeOf, Expr::Ident(name)) = (op, operand.as_ref()) {
                    let value = self.resolve(name, env).unwrap_or_default();
                    return Ok(Value::string(value.type_of()));
                }
                let value = self.eval_expr(operand, env)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::BitNot => Value::Number(!to_int32(value.to_number()) as f64),
                    UnaryOp::TypeOf => Value::string(value.type_of()),
                    UnaryOp::Void => Value::Undefined,
                })
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval_expr(left, env)?;
                let right = self.eval_expr(right, env)?;
                self.binary(*op, &left, &right)
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval_expr(left, env)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Coalesce => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval_expr(right, env)
                }
            }
            Expr::Conditional(test, consequent, alternate) => {
                if self.eval_expr(test, env)?.truthy() {
                    self.eval_expr(consequent, env)
                } else {
                    self.eval_expr(alternate, env)
                }
            }
            Expr::Assign { op, target, value } => {
                let place = self.place(target, env)?;
                let result = match op {
                    AssignOp::Assign => self.eval_expr(value, env)?,
                    AssignOp::Compound(bin) => {
                        let current = self.read_place(&place, env)?;
                        let rhs = self.eval_expr(value, env)?;
                        self.binary(*bin, &current, &rhs)?
                    }
                    AssignOp::Logical(logical) => {
                        let current = self.read_place(&place, env)?;
                        let keep = match logical {
                            LogicalOp::And => !current.truthy(),
                            LogicalOp::Or => current.truthy(),
                            LogicalOp::Coalesce => !current.is_nullish(),
                        };
                        if keep {
                            return Ok(current);
                        }
                        self.eval_expr(value, env)?
                    }
                };
                self.write_place(&place, result.clone(), env)?;
                Ok(result)
            }
            Expr::Update {
                increment,
                prefix,
                target,
            } => {
                let place = self.place(target, env)?;
                let old = self.read_place(&place, env)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.write_place(&place, Value::Number(new), env)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for expr in exprs {
                    last = self.eval_expr(expr, env)?;
                }
                Ok(last)
            }
        }
    }

    fn binary(&self, op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
        let num = |f: fn(f64, f64) -> f64| Value::Number(f(left.to_number(), right.to_number()));
        Ok(match op {
            BinaryOp::Add => match (left, right) {
                (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
                _ if is_string_like(left) || is_string_like(right) => {
                    let (left, right) = (left.display_string(), right.display_string());
                    builtins::check_string_length((left.len() + right.len()) as f64)?;
                    Value::from(left + &right)
                }
                _ => Value::Number(left.to_number() + right.to_number()),
            },
            BinaryOp::Sub => num(|a, b| a - b),
            BinaryOp::Mul => num(|a, b| a * b),
            BinaryOp::Div => num(|a, b| a / b),
            BinaryOp::Rem => num(|a, b| a % b),
            BinaryOp::Exp => num(f64::powf),
            BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
            BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
            BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
            BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
            BinaryOp::Lt => compare(left, right, |o| o.is_lt()),
            BinaryOp::LtEq => compare(left, right, |o| o.is_le()),
            BinaryOp::Gt => compare(left, right, |o| o.is_gt()),
            BinaryOp::GtEq => compare(left, right, |o| o.is_ge()),
            BinaryOp::BitAnd => {
                Value::Number((to_int32(left.to_number()) & to_int32(right.to_number())) as f64)
            }
            BinaryOp::BitOr => {
                Value::Number((to_int32(left.to_number()) | to_int32(right.to_number())) as f64)
            }
            BinaryOp::BitXor => {
                Value::Number((to_int32(left.to_number()) ^ to_int32(right.to_number())) as f64)
            }
            BinaryOp::Shl => Value::Number(
                to_int32(left.to_number()).wrapping_shl(to_uint32(right.to_number()) & 31) as f64,
            ),
            BinaryOp::Shr => Value::Number(
                to_int32(left.to_number()).wrapping_shr(to_uint32(right.to_number()) & 31) as f64,
            ),
            BinaryOp::UShr => Value::Number(
                to_uint32(left.to_number()).wrapping_shr(to_uint32(right.to_number()) & 31) as f64,
            ),
            BinaryOp::In => Value::Bool(self.has_property(right, &property_key(left))?),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn property_key(value: &Value) -> String {
    match value {
        Value::Number(n) => number_to_string(*n),
        other => other.display_string(),
    }
}

fn is_string_like(value: &Value) -> bool {
    !matches!(
        value,
        Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_)
    )
}

fn compare(left: &Value, right: &Value, accept: fn(std::cmp::Ordering) -> bool) -> Value {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return Value::Bool(accept(a.cmp(b)));
    }
    match left.to_number().partial_cmp(&right.to_number()) {
        Some(ordering) => Value::Bool(accept(ordering)),
        None => Value::Bool(false),
    }
}

fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    (n.trunc() % 4_294_967_296.0) as i64 as u32 as i32
}

fn to_uint32(n: f64) -> u32 {
    to_int32(n) as u32
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Member {
            object,
            key: MemberKey::Static(key),
            ..
        } => format!("{}.{}", describe(object), key),
        Expr::Chain(inner) => describe(inner),
        _ => "expression".to_string(),
    }
}
