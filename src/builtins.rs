//! Built-in scope bindings and the engine's standard globals.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Weak;
use tracing::{debug, error, info, warn};

use crate::error::{EvalError, EvalResult};
use crate::interpreter::{property_key, Interpreter};
use crate::namespace::{NamespaceHandle, NamespaceTree};
use crate::value::{number_to_string, Callable, Element, ElementKind, ObjectMap, Value};

pub use crate::jsx_lowerer::{ELEMENT_FACTORY, FRAGMENT};

pub const MARKDOWN: &str = "Markdown";
pub const NAMESPACE_NAME: &str = "namespace";
pub const USE_NAMESPACE: &str = "useNamespace";

const CONSOLE_TARGET: &str = "live_components::console";

/// Longest string snippet code may build, in bytes.
pub const MAX_STRING_LENGTH: usize = 1 << 26;
/// Longest array snippet code may grow by assignment.
pub const MAX_ARRAY_LENGTH: usize = 1 << 20;
/// First integer that is not an array index.
pub const ARRAY_INDEX_LIMIT: u64 = u32::MAX as u64;

pub fn check_string_length(len: f64) -> EvalResult<usize> {
    if len.is_nan() || len <= 0.0 {
        return Ok(0);
    }
    if len > MAX_STRING_LENGTH as f64 {
        return Err(EvalError::Range("Invalid string length".to_string()));
    }
    Ok(len as usize)
}

pub fn check_array_length(len: f64) -> EvalResult<usize> {
    if len < 0.0 || len.fract() != 0.0 || len > MAX_ARRAY_LENGTH as f64 {
        return Err(EvalError::Range("Invalid array length".to_string()));
    }
    Ok(len as usize)
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE BUILT-INS
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed bindings every scope starts with.
pub fn scope_builtins(
    namespace: &str,
    tree: Weak<RefCell<NamespaceTree>>,
) -> Vec<(&'static str, Value)> {
    vec![
        (ELEMENT_FACTORY, Value::Function(Callable::native(ELEMENT_FACTORY, create_element))),
        (FRAGMENT, Value::Function(Callable::native(FRAGMENT, |_, args| {
            Ok(marker_element(ElementKind::Fragment, &arg(args, 0)))
        }))),
        (MARKDOWN, Value::Function(Callable::native(MARKDOWN, |_, args| {
            Ok(marker_element(ElementKind::Markdown, &arg(args, 0)))
        }))),
        (NAMESPACE_NAME, Value::string(namespace)),
        (USE_NAMESPACE, Value::Function(Callable::native(USE_NAMESPACE, move |_, args| {
            match arg(args, 0) {
                Value::String(path) => Ok(Value::Namespace(NamespaceHandle::new(tree.clone(), &path))),
                other => Err(EvalError::type_error(format!(
                    "useNamespace expects a dotted path, got {}",
                    other.display_string()
                ))),
            }
        }))),
    ]
}

fn is_marker(callable: &Callable, marker: &str) -> bool {
    matches!(callable, Callable::Native(native) if native.name == marker)
}

/// Element for a marker called directly with a props object.
fn marker_element(kind: ElementKind, props: &Value) -> Value {
    let mut props = match props {
        Value::Object(map) => map.borrow().clone(),
        _ => ObjectMap::new(),
    };
    let children = match props.shift_remove("children") {
        Some(Value::Array(items)) => items.borrow().clone(),
        Some(value) if !value.is_nullish() => vec![value],
        _ => Vec::new(),
    };
    Value::element(Element {
        kind,
        props,
        children,
    })
}

/// `h(tag, props, children)`.
fn create_element(_: &Interpreter, args: &[Value]) -> EvalResult<Value> {
    let kind = match arg(args, 0) {
        Value::String(tag) => ElementKind::Intrinsic(tag.to_string()),
        Value::Function(callable) if is_marker(&callable, FRAGMENT) => ElementKind::Fragment,
        Value::Function(callable) if is_marker(&callable, MARKDOWN) => ElementKind::Markdown,
        Value::Function(callable) => ElementKind::Component(callable),
        other => {
            return Err(EvalError::type_error(format!(
                "element type is invalid: expected a string or a component but got {}",
                other.type_of()
            )))
        }
    };

    let props = match arg(args, 1) {
        Value::Object(map) => map.borrow().clone(),
        value if value.is_nullish() => ObjectMap::new(),
        other => {
            return Err(EvalError::type_error(format!(
                "element props must be an object, got {}",
                other.type_of()
            )))
        }
    };

    let children = match arg(args, 2) {
        Value::Array(items) => items.borrow().clone(),
        value if value.is_nullish() => Vec::new(),
        other => vec![other],
    };

    Ok(Value::element(Element {
        kind,
        props,
        children,
    }))
}

// ═══════════════════════════════════════════════════════════════════════════════
// STANDARD GLOBALS
// ═══════════════════════════════════════════════════════════════════════════════

fn object_of(entries: Vec<(&str, Value)>) -> Value {
    let mut map = ObjectMap::new();
    for (key, value) in entries {
        map.insert(key.to_string(), value);
    }
    Value::object(map)
}

fn native(name: &str, func: impl Fn(&Interpreter, &[Value]) -> EvalResult<Value> + 'static) -> Value {
    Value::Function(Callable::native(name, func))
}

fn math_fn(name: &str, f: fn(f64) -> f64) -> Value {
    native(name, move |_, args| Ok(Value::Number(f(arg(args, 0).to_number()))))
}

fn error_constructor(name: &'static str) -> Value {
    native(name, move |_, args| {
        let message = match arg(args, 0) {
            Value::Undefined => String::new(),
            other => other.display_string(),
        };
        Ok(Value::error_object(name, &message))
    })
}

fn console_line(args: &[Value]) -> String {
    args.iter()
        .map(|v| match v {
            Value::String(s) => s.to_string(),
            other => format!("{:?}", other),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn std_globals() -> HashMap<String, Value> {
    let mut globals = HashMap::new();

    globals.insert("undefined".to_string(), Value::Undefined);
    globals.insert("NaN".to_string(), Value::Number(f64::NAN));
    globals.insert("Infinity".to_string(), Value::Number(f64::INFINITY));

    globals.insert(
        "Math".to_string(),
        object_of(vec![
            ("PI", Value::Number(std::f64::consts::PI)),
            ("E", Value::Number(std::f64::consts::E)),
            ("floor", math_fn("floor", f64::floor)),
            ("ceil", math_fn("ceil", f64::ceil)),
            ("round", math_fn("round", |n| (n + 0.5).floor())),
            ("abs", math_fn("abs", f64::abs)),
            ("sqrt", math_fn("sqrt", f64::sqrt)),
            ("trunc", math_fn("trunc", f64::trunc)),
            ("log", math_fn("log", f64::ln)),
            ("exp", math_fn("exp", f64::exp)),
            (
                "sign",
                math_fn("sign", |n| if n == 0.0 || n.is_nan() { n } else { n.signum() }),
            ),
            (
                "pow",
                native("pow", |_, args| {
                    Ok(Value::Number(arg(args, 0).to_number().powf(arg(args, 1).to_number())))
                }),
            ),
            (
                "min",
                native("min", |_, args| {
                    Ok(Value::Number(args.iter().fold(f64::INFINITY, |acc, v| {
                        let n = v.to_number();
                        if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.min(n) }
                    })))
                }),
            ),
            (
                "max",
                native("max", |_, args| {
                    Ok(Value::Number(args.iter().fold(f64::NEG_INFINITY, |acc, v| {
                        let n = v.to_number();
                        if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(n) }
                    })))
                }),
            ),
        ]),
    );

    globals.insert(
        "JSON".to_string(),
        object_of(vec![
            (
                "stringify",
                native("stringify", |_, args| {
                    let json = match to_json(&arg(args, 0)) {
                        Some(json) => json,
                        None => return Ok(Value::Undefined),
                    };
                    let pretty = !arg(args, 2).is_nullish();
                    let text = if pretty {
                        serde_json::to_string_pretty(&json)
                    } else {
                        serde_json::to_string(&json)
                    };
                    text.map(Value::from)
                        .map_err(|e| EvalError::type_error(e.to_string()))
                }),
            ),
            (
                "parse",
                native("parse", |_, args| {
                    let text = arg(args, 0).display_string();
                    serde_json::from_str::<serde_json::Value>(&text)
                        .map(|json| from_json(&json))
                        .map_err(|e| EvalError::Syntax(format!("JSON.parse: {}", e)))
                }),
            ),
        ]),
    );

    globals.insert(
        "Object".to_string(),
        object_of(vec![
            (
                "keys",
                native("keys", |_, args| {
                    Ok(Value::array(own_keys(&arg(args, 0)).into_iter().map(Value::from).collect()))
                }),
            ),
            (
                "values",
                native("values", |interp, args| {
                    let target = arg(args, 0);
                    let mut out = Vec::new();
                    for key in own_keys(&target) {
                        out.push(interp.get_property(&target, &key)?);
                    }
                    Ok(Value::array(out))
                }),
            ),
            (
                "entries",
                native("entries", |interp, args| {
                    let target = arg(args, 0);
                    let mut out = Vec::new();
                    for key in own_keys(&target) {
                        let value = interp.get_property(&target, &key)?;
                        out.push(Value::array(vec![Value::from(key), value]));
                    }
                    Ok(Value::array(out))
                }),
            ),
            (
                "assign",
                native("assign", |interp, args| {
                    let target = arg(args, 0);
                    for source in args.iter().skip(1) {
                        for key in own_keys(source) {
                            let value = interp.get_property(source, &key)?;
                            interp.set_property(&target, &key, value)?;
                        }
                    }
                    Ok(target)
                }),
            ),
            (
                "fromEntries",
                native("fromEntries", |interp, args| {
                    let mut map = ObjectMap::new();
                    for entry in interp.iterate(&arg(args, 0))? {
                        let pair = interp.iterate(&entry)?;
                        map.insert(property_key(&arg(&pair, 0)), arg(&pair, 1));
                    }
                    Ok(Value::object(map))
                }),
            ),
        ]),
    );

    globals.insert(
        "Array".to_string(),
        object_of(vec![
            (
                "isArray",
                native("isArray", |_, args| Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_))))),
            ),
            (
                "from",
                native("from", |interp, args| {
                    let items = interp.iterate(&arg(args, 0))?;
                    match arg(args, 1).as_callable() {
                        Some(map_fn) => {
                            let mut out = Vec::with_capacity(items.len());
                            for (i, item) in items.into_iter().enumerate() {
                                out.push(interp.call(map_fn, &[item, Value::Number(i as f64)])?);
                            }
                            Ok(Value::array(out))
                        }
                        None => Ok(Value::array(items)),
                    }
                }),
            ),
        ]),
    );

    globals.insert(
        "String".to_string(),
        native("String", |_, args| Ok(Value::from(arg(args, 0).display_string()))),
    );
    globals.insert(
        "Number".to_string(),
        native("Number", |_, args| Ok(Value::Number(arg(args, 0).to_number()))),
    );
    globals.insert(
        "Boolean".to_string(),
        native("Boolean", |_, args| Ok(Value::Bool(arg(args, 0).truthy()))),
    );
    globals.insert(
        "parseInt".to_string(),
        native("parseInt", |_, args| {
            let radix = match arg(args, 1) {
                Value::Undefined => 10,
                other => other.to_number() as u32,
            };
            Ok(Value::Number(parse_int(&arg(args, 0).display_string(), radix)))
        }),
    );
    globals.insert(
        "parseFloat".to_string(),
        native("parseFloat", |_, args| {
            Ok(Value::Number(parse_float(&arg(args, 0).display_string())))
        }),
    );
    globals.insert("Error".to_string(), error_constructor("Error"));
    globals.insert("TypeError".to_string(), error_constructor("TypeError"));
    globals.insert("RangeError".to_string(), error_constructor("RangeError"));

    globals.insert(
        "console".to_string(),
        object_of(vec![
            (
                "log",
                native("log", |_, args| {
                    info!(target: CONSOLE_TARGET, "{}", console_line(args));
                    Ok(Value::Undefined)
                }),
            ),
            (
                "info",
                native("info", |_, args| {
                    info!(target: CONSOLE_TARGET, "{}", console_line(args));
                    Ok(Value::Undefined)
                }),
            ),
            (
                "debug",
                native("debug", |_, args| {
                    debug!(target: CONSOLE_TARGET, "{}", console_line(args));
                    Ok(Value::Undefined)
                }),
            ),
            (
                "warn",
                native("warn", |_, args| {
                    warn!(target: CONSOLE_TARGET, "{}", console_line(args));
                    Ok(Value::Undefined)
                }),
            ),
            (
                "error",
                native("error", |_, args| {
                    error!(target: CONSOLE_TARGET, "{}", console_line(args));
                    Ok(Value::Undefined)
                }),
            ),
        ]),
    );

    globals
}

pub fn parse_int(text: &str, radix: u32) -> f64 {
    let mut s = text.trim();
    let mut sign = 1.0;
    if let Some(rest) = s.strip_prefix('-') {
        sign = -1.0;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }
    let mut radix = if radix == 0 { 10 } else { radix };
    if radix == 16 || radix == 10 {
        if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            if radix == 16 || text.trim_start().trim_start_matches(['-', '+']).len() > 1 {
                radix = 16;
                s = rest;
            }
        }
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let digits: String = s.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, d| acc * radix as f64 + d as f64);
    sign * value
}

pub fn parse_float(text: &str) -> f64 {
    let s = text.trim_start();
    if s.starts_with("Infinity") || s.starts_with("+Infinity") {
        return f64::INFINITY;
    }
    if s.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    let candidate: String = s
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        .collect();
    (1..=candidate.len())
        .rev()
        .find_map(|end| candidate[..end].parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

// ═══════════════════════════════════════════════════════════════════════════════
// JSON
// ═══════════════════════════════════════════════════════════════════════════════

/// `None` for values JSON omits (undefined, functions).
pub fn to_json(value: &Value) -> Option<serde_json::Value> {
    Some(match value {
        Value::Undefined | Value::Function(_) => return None,
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
            serde_json::Value::Number((*n as i64).into())
        }
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.to_string()),
        Value::Array(items) => serde_json::Value::Array(
            items
                .borrow()
                .iter()
                .map(|v| to_json(v).unwrap_or(serde_json::Value::Null))
                .collect(),
        ),
        Value::Object(map) => serde_json::Value::Object(
            map.borrow()
                .iter()
                .filter_map(|(k, v)| to_json(v).map(|json| (k.clone(), json)))
                .collect(),
        ),
        Value::Element(_) | Value::Namespace(_) | Value::Scope(_) => {
            serde_json::Value::Object(serde_json::Map::new())
        }
    })
}

pub fn from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::string(s),
        serde_json::Value::Array(items) => Value::array(items.iter().map(from_json).collect()),
        serde_json::Value::Object(map) => {
            Value::object(map.iter().map(|(k, v)| (k.clone(), from_json(v))).collect())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// METHODS
// ═══════════════════════════════════════════════════════════════════════════════

const STRING_METHODS: &[&str] = &[
    "toUpperCase", "toLowerCase", "trim", "trimStart", "trimEnd", "split", "includes",
    "startsWith", "endsWith", "indexOf", "slice", "substring", "replace", "replaceAll", "repeat",
    "padStart", "padEnd", "charAt", "concat", "at", "toString",
];

const ARRAY_METHODS: &[&str] = &[
    "map", "filter", "forEach", "reduce", "find", "findIndex", "some", "every", "includes",
    "indexOf", "join", "slice", "concat", "push", "pop", "shift", "unshift", "reverse", "sort",
    "flat", "flatMap", "at", "toString",
];

const NUMBER_METHODS: &[&str] = &["toFixed", "toString"];

/// A method bound to `receiver`, or `undefined` if it has none by that name.
pub fn method(receiver: &Value, name: &str) -> Value {
    let known = match receiver {
        Value::String(_) => STRING_METHODS,
        Value::Array(_) => ARRAY_METHODS,
        Value::Number(_) => NUMBER_METHODS,
        Value::Bool(_) => &["toString"][..],
        _ => &[][..],
    };
    if known.contains(&name) {
        Value::Function(Callable::Method {
            receiver: Box::new(receiver.clone()),
            name: name.into(),
        })
    } else {
        Value::Undefined
    }
}

/// Enumerable own keys, as `Object.keys` and `for...in` see them.
pub fn own_keys(value: &Value) -> Vec<String> {
    match value {
        Value::Object(map) => map.borrow().keys().cloned().collect(),
        Value::Array(items) => (0..items.borrow().len()).map(|i| i.to_string()).collect(),
        Value::String(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
        Value::Namespace(handle) => handle.keys(),
        Value::Scope(scope) => scope.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

/// Resolves a possibly negative relative index against `len`.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = value.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        (n as usize).min(len)
    }
}

pub fn call_method(
    interp: &Interpreter,
    receiver: &Value,
    name: &str,
    args: &[Value],
) -> EvalResult<Value> {
    match receiver {
        Value::String(s) => string_method(interp, s, name, args),
        Value::Array(_) => array_method(interp, receiver, name, args),
        Value::Number(n) => match name {
            "toFixed" => {
                let digits = arg(args, 0).to_number();
                let digits = if digits.is_nan() { 0 } else { digits as usize };
                if digits > 100 {
                    return Err(EvalError::Range("toFixed() digits out of range".to_string()));
                }
                Ok(Value::from(format!("{:.*}", digits, n)))
            }
            _ => Ok(Value::from(number_to_string(*n))),
        },
        other => Ok(Value::from(other.display_string())),
    }
}

fn string_method(interp: &Interpreter, s: &str, name: &str, args: &[Value]) -> EvalResult<Value> {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let text_arg = |i: usize| arg(args, i).display_string();

    Ok(match name {
        "toUpperCase" => Value::from(s.to_uppercase()),
        "toLowerCase" => Value::from(s.to_lowercase()),
        "trim" => Value::string(s.trim()),
        "trimStart" => Value::string(s.trim_start()),
        "trimEnd" => Value::string(s.trim_end()),
        "includes" => Value::Bool(s.contains(text_arg(0).as_str())),
        "startsWith" => Value::Bool(s.starts_with(text_arg(0).as_str())),
        "endsWith" => Value::Bool(s.ends_with(text_arg(0).as_str())),
        "indexOf" => Value::Number(match s.find(text_arg(0).as_str()) {
            Some(byte) => s[..byte].chars().count() as f64,
            None => -1.0,
        }),
        "slice" => {
            let start = relative_index(&arg(args, 0), len, 0);
            let end = relative_index(&arg(args, 1), len, len);
            Value::from(chars[start..end.max(start)].iter().collect::<String>())
        }
        "substring" => {
            let clamp = |v: Value, default: usize| {
                if matches!(v, Value::Undefined) {
                    return default;
                }
                let n = v.to_number();
                if n.is_nan() || n < 0.0 {
                    0
                } else {
                    (n as usize).min(len)
                }
            };
            let a = clamp(arg(args, 0), 0);
            let b = clamp(arg(args, 1), len);
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            Value::from(chars[start..end].iter().collect::<String>())
        }
        "split" => match arg(args, 0) {
            Value::Undefined => Value::array(vec![Value::string(s)]),
            sep => {
                let sep = sep.display_string();
                if sep.is_empty() {
                    Value::array(chars.iter().map(|c| Value::from(c.to_string())).collect())
                } else {
                    Value::array(s.split(sep.as_str()).map(Value::string).collect())
                }
            }
        },
        "replace" | "replaceAll" => {
            let pattern = text_arg(0);
            let replacement = arg(args, 1);
            let mut out = String::new();
            let mut rest = s;
            while let Some(pos) = rest.find(pattern.as_str()) {
                out.push_str(&rest[..pos]);
                let piece = match replacement.as_callable() {
                    Some(f) => interp.call(f, &[Value::string(&pattern)])?.display_string(),
                    None => replacement.display_string(),
                };
                out.push_str(&piece);
                rest = &rest[pos + pattern.len()..];
                if name == "replace" || pattern.is_empty() {
                    break;
                }
            }
            out.push_str(rest);
            Value::from(out)
        }
        "repeat" => {
            let count = arg(args, 0).to_number();
            if count < 0.0 || count.is_infinite() {
                return Err(EvalError::Range(format!("Invalid count value: {}", number_to_string(count))));
            }
            let count = if count.is_nan() || s.is_empty() { 0.0 } else { count.trunc() };
            check_string_length(count * s.len() as f64)?;
            Value::from(s.repeat(count as usize))
        }
        "padStart" | "padEnd" => {
            let target = arg(args, 0).to_number();
            let fill = match arg(args, 1) {
                Value::Undefined => " ".to_string(),
                other => other.display_string(),
            };
            let target = check_string_length(target)?;
            if target <= len || fill.is_empty() {
                Value::string(s)
            } else {
                let padding: String = fill.chars().cycle().take(target - len).collect();
                if name == "padStart" {
                    Value::from(format!("{}{}", padding, s))
                } else {
                    Value::from(format!("{}{}", s, padding))
                }
            }
        }
        "charAt" => {
            let i = arg(args, 0).to_number();
            let i = if i.is_nan() { 0.0 } else { i };
            if i < 0.0 {
                Value::string("")
            } else {
                chars
                    .get(i as usize)
                    .map(|c| Value::from(c.to_string()))
                    .unwrap_or_else(|| Value::string(""))
            }
        }
        "at" => {
            let i = arg(args, 0).to_number();
            let i = if i.is_nan() { 0.0 } else { i.trunc() };
            let index = if i < 0.0 { len as f64 + i } else { i };
            if index < 0.0 {
                Value::Undefined
            } else {
                chars
                    .get(index as usize)
                    .map(|c| Value::from(c.to_string()))
                    .unwrap_or_default()
            }
        }
        "concat" => {
            let mut out = s.to_string();
            for a in args {
                out.push_str(&a.display_string());
            }
            Value::from(out)
        }
        _ => Value::string(s),
    })
}

fn callback(args: &[Value], method: &str) -> EvalResult<Callable> {
    match args.first().and_then(Value::as_callable) {
        Some(f) => Ok(f.clone()),
        None => Err(EvalError::type_error(format!(
            "Array.prototype.{} expects a function",
            method
        ))),
    }
}

fn array_method(interp: &Interpreter, receiver: &Value, name: &str, args: &[Value]) -> EvalResult<Value> {
    let cell = match receiver {
        Value::Array(cell) => cell,
        _ => return Ok(Value::Undefined),
    };
    // Snapshot so callbacks may mutate the array
    let items = cell.borrow().clone();
    let len = items.len();
    let each = |f: &Callable, item: &Value, i: usize| {
        interp.call(f, &[item.clone(), Value::Number(i as f64), receiver.clone()])
    };

    Ok(match name {
        "map" => {
            let f = callback(args, name)?;
            let mut out = Vec::with_capacity(len);
            for (i, item) in items.iter().enumerate() {
                out.push(each(&f, item, i)?);
            }
            Value::array(out)
        }
        "filter" => {
            let f = callback(args, name)?;
            let mut out = Vec::new();
            for (i, item) in items.iter().enumerate() {
                if each(&f, item, i)?.truthy() {
                    out.push(item.clone());
                }
            }
            Value::array(out)
        }
        "forEach" => {
            let f = callback(args, name)?;
            for (i, item) in items.iter().enumerate() {
                each(&f, item, i)?;
            }
            Value::Undefined
        }
        "reduce" => {
            let f = callback(args, name)?;
            let mut iter = items.iter().enumerate();
            let mut acc = match args.get(1) {
                Some(initial) => initial.clone(),
                None => match iter.next() {
                    Some((_, first)) => first.clone(),
                    None => {
                        return Err(EvalError::type_error(
                            "Reduce of empty array with no initial value",
                        ))
                    }
                },
            };
            for (i, item) in iter {
                acc = interp.call(&f, &[acc, item.clone(), Value::Number(i as f64), receiver.clone()])?;
            }
            acc
        }
        "find" | "findIndex" => {
            let f = callback(args, name)?;
            for (i, item) in items.iter().enumerate() {
                if each(&f, item, i)?.truthy() {
                    return Ok(if name == "find" {
                        item.clone()
                    } else {
                        Value::Number(i as f64)
                    });
                }
            }
            if name == "find" {
                Value::Undefined
            } else {
                Value::Number(-1.0)
            }
        }
        "some" => {
            let f = callback(args, name)?;
            for (i, item) in items.iter().enumerate() {
                if each(&f, item, i)?.truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Value::Bool(false)
        }
        "every" => {
            let f = callback(args, name)?;
            for (i, item) in items.iter().enumerate() {
                if !each(&f, item, i)?.truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Value::Bool(true)
        }
        "includes" => {
            let needle = arg(args, 0);
            Value::Bool(items.iter().any(|v| {
                v.strict_equals(&needle)
                    || matches!((v, &needle), (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan())
            }))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            Value::Number(
                items
                    .iter()
                    .position(|v| v.strict_equals(&needle))
                    .map(|i| i as f64)
                    .unwrap_or(-1.0),
            )
        }
        "join" | "toString" => {
            let sep = match arg(args, 0) {
                Value::Undefined => ",".to_string(),
                other if name == "join" => other.display_string(),
                _ => ",".to_string(),
            };
            Value::from(
                items
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.display_string() })
                    .collect::<Vec<_>>()
                    .join(&sep),
            )
        }
        "slice" => {
            let start = relative_index(&arg(args, 0), len, 0);
            let end = relative_index(&arg(args, 1), len, len);
            Value::array(items[start..end.max(start)].to_vec())
        }
        "concat" => {
            let mut out = items;
            for a in args {
                match a {
                    Value::Array(other) => out.extend(other.borrow().iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Value::array(out)
        }
        "push" => {
            let mut target = cell.borrow_mut();
            target.extend(args.iter().cloned());
            Value::Number(target.len() as f64)
        }
        "pop" => cell.borrow_mut().pop().unwrap_or_default(),
        "shift" => {
            let mut target = cell.borrow_mut();
            if target.is_empty() {
                Value::Undefined
            } else {
                target.remove(0)
            }
        }
        "unshift" => {
            let mut target = cell.borrow_mut();
            for (i, a) in args.iter().enumerate() {
                target.insert(i, a.clone());
            }
            Value::Number(target.len() as f64)
        }
        "reverse" => {
            cell.borrow_mut().reverse();
            receiver.clone()
        }
        "sort" => {
            let sorted = match args.first().and_then(Value::as_callable) {
                Some(f) => merge_sort(items, &mut |a, b| {
                    Ok(interp.call(f, &[a.clone(), b.clone()])?.to_number() > 0.0)
                })?,
                None => {
                    let mut items = items;
                    items.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
                    items
                }
            };
            *cell.borrow_mut() = sorted;
            receiver.clone()
        }
        "flat" => {
            let depth = match arg(args, 0) {
                Value::Undefined => 1,
                other => other.to_number().max(0.0) as usize,
            };
            Value::array(flatten(&items, depth))
        }
        "flatMap" => {
            let f = callback(args, name)?;
            let mut mapped = Vec::with_capacity(len);
            for (i, item) in items.iter().enumerate() {
                mapped.push(each(&f, item, i)?);
            }
            Value::array(flatten(&mapped, 1))
        }
        "at" => {
            let i = arg(args, 0).to_number();
            let i = if i.is_nan() { 0.0 } else { i.trunc() };
            let index = if i < 0.0 { len as f64 + i } else { i };
            if index < 0.0 {
                Value::Undefined
            } else {
                items.get(index as usize).cloned().unwrap_or_default()
            }
        }
        _ => Value::Undefined,
    })
}

/// Default sort order: undefined last, everything else by string form.
fn sort_key(value: &Value) -> (bool, String) {
    (matches!(value, Value::Undefined), value.display_string())
}

fn flatten(items: &[Value], depth: usize) -> Vec<Value> {
    let mut out = Vec::new();
    for item in items {
        match item {
            Value::Array(inner) if depth > 0 => out.extend(flatten(&inner.borrow(), depth - 1)),
            other => out.push(other.clone()),
        }
    }
    out
}

/// Stable merge sort with a fallible "a goes after b" predicate.
fn merge_sort(
    items: Vec<Value>,
    after: &mut dyn FnMut(&Value, &Value) -> EvalResult<bool>,
) -> EvalResult<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let mut left = items;
    let right = left.split_off(left.len() / 2);
    let left = merge_sort(left, after)?;
    let right = merge_sort(right, after)?;

    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        let take_right = after(l, r)?;
        let next = if take_right { right.next() } else { left.next() };
        if let Some(value) = next {
            out.push(value);
        }
    }
    out.extend(left);
    out.extend(right);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("42px", 10), 42.0);
        assert_eq!(parse_int("  -7", 10), -7.0);
        assert_eq!(parse_int("ff", 16), 255.0);
        assert_eq!(parse_int("0x1A", 10), 26.0);
        assert!(parse_int("abc", 10).is_nan());
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float("3.5rem"), 3.5);
        assert_eq!(parse_float("1e3"), 1000.0);
        assert!(parse_float("x").is_nan());
    }

    #[test]
    fn test_json_roundtrip_drops_functions() {
        let mut map = ObjectMap::new();
        map.insert("a".to_string(), Value::Number(1.0));
        map.insert(
            "f".to_string(),
            Value::Function(Callable::native("f", |_, _| Ok(Value::Undefined))),
        );
        let json = to_json(&Value::object(map)).unwrap();
        assert_eq!(json.to_string(), r#"{"a":1}"#);
    }

    #[test]
    fn test_methods_are_resolved_by_receiver() {
        assert!(method(&Value::string("x"), "toUpperCase").is_callable());
        assert!(method(&Value::array(vec![]), "map").is_callable());
        assert!(matches!(method(&Value::array(vec![]), "toUpperCase"), Value::Undefined));
    }
}
