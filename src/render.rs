//! Expands evaluated values into a host-neutral render tree.

use std::fmt::Write as _;

use crate::error::ComponentError;
use crate::interpreter::Interpreter;
use crate::value::{number_to_string, Callable, Element, ElementKind, ObjectMap, Value};

const VOID_TAGS: &[&str] = &[
    "area", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

#[derive(Debug, Clone, PartialEq)]
pub enum RenderNode {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        children: Vec<RenderNode>,
    },
    Text(String),
    Fragment(Vec<RenderNode>),
    /// Markdown source for the surface to render.
    Markdown(String),
    /// Visible failure text; `detail` is surfaced on demand.
    Error {
        component: String,
        message: String,
        detail: String,
    },
}

impl RenderNode {
    pub fn empty() -> Self {
        RenderNode::Fragment(Vec::new())
    }

    /// Visible placeholder for a contained failure.
    pub fn from_error(error: &ComponentError) -> Self {
        RenderNode::Error {
            component: error.component().to_string(),
            message: error.to_string(),
            detail: format!("[{}] {}", error.code(), error.message()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RenderNode::Error { .. })
    }

    /// Every error node in document order.
    pub fn errors(&self) -> Vec<&RenderNode> {
        let mut out = Vec::new();
        self.collect_errors(&mut out);
        out
    }

    fn collect_errors<'a>(&'a self, out: &mut Vec<&'a RenderNode>) {
        match self {
            RenderNode::Error { .. } => out.push(self),
            RenderNode::Element { children, .. } | RenderNode::Fragment(children) => {
                for child in children {
                    child.collect_errors(out);
                }
            }
            _ => {}
        }
    }

    pub fn text_content(&self) -> String {
        match self {
            RenderNode::Text(text) | RenderNode::Markdown(text) => text.clone(),
            RenderNode::Element { children, .. } | RenderNode::Fragment(children) => {
                children.iter().map(RenderNode::text_content).collect()
            }
            RenderNode::Error { message, .. } => message.clone(),
        }
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            RenderNode::Element {
                tag,
                attributes,
                children,
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    let _ = write!(out, " {}=\"{}\"", name, escape_html(value));
                }
                out.push('>');
                if VOID_TAGS.contains(&tag.as_str()) {
                    return;
                }
                for child in children {
                    child.write_html(out);
                }
                let _ = write!(out, "</{}>", tag);
            }
            RenderNode::Text(text) => out.push_str(&escape_html(text)),
            RenderNode::Fragment(children) => {
                for child in children {
                    child.write_html(out);
                }
            }
            RenderNode::Markdown(source) => {
                let _ = write!(out, "<div data-markdown>{}</div>", escape_html(source));
            }
            RenderNode::Error {
                message, detail, ..
            } => {
                let _ = write!(
                    out,
                    "<span class=\"component-error\" title=\"{}\">{}</span>",
                    escape_html(detail),
                    escape_html(message)
                );
            }
        }
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPANSION
// ═══════════════════════════════════════════════════════════════════════════════

/// Renders an evaluated value. A callable at the root is invoked with empty props.
pub fn render(interp: &Interpreter, value: &Value) -> RenderNode {
    match value {
        Value::Function(callable) => {
            let props = Value::object(ObjectMap::new());
            match interp.call(callable, &[props]) {
                Ok(result) => render_value(interp, &result, 1),
                Err(err) => invocation_error(callable, &err.to_string()),
            }
        }
        other => render_value(interp, other, 0),
    }
}

fn invocation_error(callable: &Callable, message: &str) -> RenderNode {
    let component = callable.name();
    RenderNode::Error {
        message: format!("'{}' failed while rendering: {}", component, message),
        detail: message.to_string(),
        component,
    }
}

fn render_value(interp: &Interpreter, value: &Value, depth: usize) -> RenderNode {
    match value {
        Value::Undefined | Value::Null | Value::Bool(_) | Value::Function(_) => RenderNode::empty(),
        Value::Number(n) => RenderNode::Text(number_to_string(*n)),
        Value::String(s) => RenderNode::Text(s.to_string()),
        Value::Array(items) => {
            let items = items.borrow().clone();
            RenderNode::Fragment(render_children(interp, &items, depth))
        }
        Value::Element(element) => render_element(interp, element, depth),
        other => RenderNode::Text(other.display_string()),
    }
}

fn render_children(interp: &Interpreter, children: &[Value], depth: usize) -> Vec<RenderNode> {
    children
        .iter()
        .map(|child| render_value(interp, child, depth))
        .filter(|node| !matches!(node, RenderNode::Fragment(children) if children.is_empty()))
        .collect()
}

fn render_element(interp: &Interpreter, element: &Element, depth: usize) -> RenderNode {
    match &element.kind {
        ElementKind::Intrinsic(tag) => RenderNode::Element {
            tag: tag.clone(),
            attributes: attributes(&element.props),
            children: render_children(interp, &element.children, depth),
        },
        ElementKind::Fragment => {
            RenderNode::Fragment(render_children(interp, &element.children, depth))
        }
        ElementKind::Markdown => {
            let source = match element.props.get("src").or_else(|| element.props.get("text")) {
                Some(value) if !value.is_nullish() => value.display_string(),
                _ => render_children(interp, &element.children, depth)
                    .iter()
                    .map(RenderNode::text_content)
                    .collect(),
            };
            RenderNode::Markdown(source)
        }
        ElementKind::ErrorPlaceholder {
            component,
            message,
            detail,
        } => RenderNode::Error {
            component: component.clone(),
            message: message.clone(),
            detail: detail.clone(),
        },
        ElementKind::Component(callable) => {
            if depth >= interp.max_call_depth() {
                return invocation_error(callable, "maximum render depth exceeded");
            }
            let mut props = element.props.clone();
            match element.children.len() {
                0 => {}
                1 => {
                    props.insert("children".to_string(), element.children[0].clone());
                }
                _ => {
                    props.insert(
                        "children".to_string(),
                        Value::array(element.children.clone()),
                    );
                }
            }
            match interp.call(callable, &[Value::object(props)]) {
                Ok(result) => render_value(interp, &result, depth + 1),
                Err(err) => invocation_error(callable, &err.to_string()),
            }
        }
    }
}

fn attributes(props: &ObjectMap) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (name, value) in props {
        if matches!(name.as_str(), "children" | "key" | "ref") {
            continue;
        }
        let text = match value {
            Value::Undefined | Value::Null | Value::Function(_) | Value::Bool(false) => continue,
            Value::Bool(true) => String::new(),
            Value::Object(map) if name == "style" => style_text(&map.borrow()),
            other => other.display_string(),
        };
        let name = match name.as_str() {
            "className" => "class".to_string(),
            "htmlFor" => "for".to_string(),
            other => other.to_string(),
        };
        out.push((name, text));
    }
    out
}

fn style_text(style: &ObjectMap) -> String {
    style
        .iter()
        .filter(|(_, v)| !v.is_nullish())
        .map(|(k, v)| format!("{}: {};", kebab_case(k), v.display_string()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intrinsic(tag: &str, props: ObjectMap, children: Vec<Value>) -> Value {
        Value::element(Element {
            kind: ElementKind::Intrinsic(tag.to_string()),
            props,
            children,
        })
    }

    #[test]
    fn test_intrinsic_attributes() {
        let mut style = ObjectMap::new();
        style.insert("fontSize".to_string(), Value::string("12px"));
        let mut props = ObjectMap::new();
        props.insert("className".to_string(), Value::string("card"));
        props.insert("hidden".to_string(), Value::Bool(false));
        props.insert("disabled".to_string(), Value::Bool(true));
        props.insert("style".to_string(), Value::object(style));
        props.insert(
            "onClick".to_string(),
            Value::Function(Callable::native("f", |_, _| Ok(Value::Undefined))),
        );

        let interp = Interpreter::default();
        let node = render(&interp, &intrinsic("div", props, vec![Value::string("a<b")]));
        assert_eq!(
            node.to_html(),
            "<div class=\"card\" disabled=\"\" style=\"font-size: 12px;\">a&lt;b</div>"
        );
    }

    #[test]
    fn test_children_flatten_and_drop_empties() {
        let interp = Interpreter::default();
        let children = vec![
            Value::Null,
            Value::Bool(false),
            Value::Number(3.0),
            Value::array(vec![Value::string("x"), Value::Undefined]),
        ];
        let node = render(&interp, &intrinsic("p", ObjectMap::new(), children));
        assert_eq!(node.to_html(), "<p>3x</p>");
    }

    #[test]
    fn test_root_callable_is_invoked() {
        let interp = Interpreter::default();
        let component = Value::Function(Callable::native("Hello", |_, _| {
            Ok(Value::string("hello"))
        }));
        assert_eq!(render(&interp, &component).to_html(), "hello");
    }

    #[test]
    fn test_failing_component_renders_error_node() {
        let interp = Interpreter::default();
        let broken = Callable::native("Broken", |_, _| {
            Err(crate::error::EvalError::type_error("boom"))
        });
        let element = Value::element(Element {
            kind: ElementKind::Component(broken),
            props: ObjectMap::new(),
            children: vec![],
        });
        let node = render(&interp, &intrinsic("div", ObjectMap::new(), vec![element]));
        let errors = node.errors();
        assert_eq!(errors.len(), 1);
        match errors[0] {
            RenderNode::Error { component, .. } => assert_eq!(component, "Broken"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_void_tags_have_no_closing_tag() {
        let interp = Interpreter::default();
        let node = render(&interp, &intrinsic("br", ObjectMap::new(), vec![]));
        assert_eq!(node.to_html(), "<br>");
    }
}
