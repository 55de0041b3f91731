//! Runtime values produced and consumed by the interpreter.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{ComponentError, EvalResult};
use crate::interpreter::{Env, Interpreter};
use crate::ir::FunctionDef;
use crate::namespace::NamespaceHandle;
use crate::scope::Scope;

pub type ObjectMap = IndexMap<String, Value>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<ObjectMap>>),
    Function(Callable),
    Element(Rc<Element>),
    /// A namespace node, resolved member-by-member at access time.
    Namespace(NamespaceHandle),
    /// The scope object handed to a module's default export.
    Scope(Rc<Scope>),
}

// ═══════════════════════════════════════════════════════════════════════════════
// CALLABLES
// ═══════════════════════════════════════════════════════════════════════════════

pub type NativeFn = dyn Fn(&Interpreter, &[Value]) -> EvalResult<Value>;

pub struct NativeFunction {
    pub name: String,
    pub func: Box<NativeFn>,
}

pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub env: Env,
}

/// A component callable whose invocation failures are contained.
pub struct GuardedComponent {
    pub name: String,
    pub inner: Value,
}

#[derive(Clone)]
pub enum Callable {
    Closure(Rc<Closure>),
    Native(Rc<NativeFunction>),
    /// A built-in method bound to its receiver, e.g. `items.map`.
    Method { receiver: Box<Value>, name: Rc<str> },
    Component(Rc<GuardedComponent>),
    /// Stand-in for a component that failed to compile or evaluate.
    Failure(Rc<ComponentError>),
}

impl Callable {
    pub fn native(
        name: &str,
        func: impl Fn(&Interpreter, &[Value]) -> EvalResult<Value> + 'static,
    ) -> Self {
        Callable::Native(Rc::new(NativeFunction {
            name: name.to_string(),
            func: Box::new(func),
        }))
    }

    pub fn name(&self) -> String {
        match self {
            Callable::Closure(c) => c.def.name.clone().unwrap_or_default(),
            Callable::Native(n) => n.name.clone(),
            Callable::Method { name, .. } => name.to_string(),
            Callable::Component(g) => g.name.clone(),
            Callable::Failure(e) => e.component().to_string(),
        }
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        match (self, other) {
            (Callable::Closure(a), Callable::Closure(b)) => Rc::ptr_eq(a, b),
            (Callable::Native(a), Callable::Native(b)) => Rc::ptr_eq(a, b),
            (Callable::Component(a), Callable::Component(b)) => Rc::ptr_eq(a, b),
            (Callable::Failure(a), Callable::Failure(b)) => Rc::ptr_eq(a, b),
            (
                Callable::Method {
                    receiver: ra,
                    name: na,
                },
                Callable::Method {
                    receiver: rb,
                    name: nb,
                },
            ) => na == nb && ra.strict_equals(rb),
            _ => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ELEMENTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub enum ElementKind {
    Intrinsic(String),
    Component(Callable),
    Fragment,
    Markdown,
    ErrorPlaceholder {
        component: String,
        message: String,
        detail: String,
    },
}

/// The result of `h(...)`: an unexpanded renderable.
#[derive(Clone)]
pub struct Element {
    pub kind: ElementKind,
    pub props: ObjectMap,
    pub children: Vec<Value>,
}

impl Element {
    pub fn placeholder(error: &ComponentError) -> Self {
        Element {
            kind: ElementKind::ErrorPlaceholder {
                component: error.component().to_string(),
                message: error.to_string(),
                detail: format!("[{}] {}", error.code(), error.message()),
            },
            props: ObjectMap::new(),
            children: Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONVERSIONS
// ═══════════════════════════════════════════════════════════════════════════════

impl Value {
    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(map: ObjectMap) -> Self {
        Value::Object(Rc::new(RefCell::new(map)))
    }

    pub fn element(element: Element) -> Self {
        Value::Element(Rc::new(element))
    }

    pub fn error_object(name: &str, message: &str) -> Self {
        let mut map = ObjectMap::new();
        map.insert("name".to_string(), Value::string(name));
        map.insert("message".to_string(), Value::string(message));
        Value::object(map)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            Value::Function(c) => Some(c),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            _ => "object",
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            Value::Array(items) => {
                let items = items.borrow();
                match items.len() {
                    0 => 0.0,
                    1 => items[0].to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    /// JavaScript `ToString`.
    pub fn display_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.to_string(),
            Value::Array(items) => items
                .borrow()
                .iter()
                .map(|v| {
                    if v.is_nullish() {
                        String::new()
                    } else {
                        v.display_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(map) => {
                let map = map.borrow();
                match (map.get("name"), map.get("message")) {
                    (Some(Value::String(name)), Some(Value::String(message))) => {
                        format!("{}: {}", name, message)
                    }
                    _ => "[object Object]".to_string(),
                }
            }
            Value::Function(c) => format!("function {}() {{ [code] }}", c.name()),
            Value::Element(_) => "[object Element]".to_string(),
            Value::Namespace(ns) => format!("[namespace {}]", ns.path()),
            Value::Scope(_) => "[object Scope]".to_string(),
        }
    }

    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Element(a), Value::Element(b)) => Rc::ptr_eq(a, b),
            (Value::Scope(a), Value::Scope(b)) => Rc::ptr_eq(a, b),
            (Value::Namespace(a), Value::Namespace(b)) => a.path() == b.path(),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => {
                if matches!(self, Value::Bool(_) | Value::Number(_) | Value::String(_))
                    && matches!(other, Value::Bool(_) | Value::Number(_) | Value::String(_))
                {
                    self.to_number() == other.to_number()
                } else {
                    self.strict_equals(other)
                }
            }
            _ => self.strict_equals(other),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s.as_str()))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Formats a number the way JavaScript prints it for common magnitudes.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            Value::Object(map) => f.debug_map().entries(map.borrow().iter()).finish(),
            Value::Element(el) => match &el.kind {
                ElementKind::Intrinsic(tag) => write!(f, "<{}>", tag),
                ElementKind::Component(c) => write!(f, "<{}>", c.name()),
                ElementKind::Fragment => write!(f, "<>"),
                ElementKind::Markdown => write!(f, "<Markdown>"),
                ElementKind::ErrorPlaceholder { message, .. } => write!(f, "<error {:?}>", message),
            },
            other => write!(f, "{}", other.display_string()),
        }
    }
}
