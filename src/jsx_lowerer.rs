//! Markup and type lowering for component source.

use oxc_allocator::{Allocator, Box as oxc_box, CloneIn};
use oxc_ast::ast::*;
use oxc_ast::AstBuilder;
use oxc_ast_visit::walk_mut::{
    walk_block_statement, walk_expression, walk_function_body, walk_program,
};
use oxc_ast_visit::VisitMut;
use oxc_span::SPAN;

/// Name of the element factory markup lowers to.
pub const ELEMENT_FACTORY: &str = "h";
/// Name of the fragment marker passed as the tag of `<>...</>`.
pub const FRAGMENT: &str = "Fragment";

// ═══════════════════════════════════════════════════════════════════════════════
// JSX LOWERER
// Transforms JSX elements into h(tag, props, children) calls
// ═══════════════════════════════════════════════════════════════════════════════

pub struct JsxLowerer<'a> {
    pub ast: AstBuilder<'a>,
}

impl<'a> JsxLowerer<'a> {
    pub fn new(allocator: &'a Allocator) -> Self {
        Self {
            ast: AstBuilder::new(allocator),
        }
    }

    fn lower_jsx_element(&mut self, element: &JSXElement<'a>) -> Expression<'a> {
        let tag = self.lower_tag(&element.opening_element.name);

        let mut current_obj_props = self.ast.vec();

        for item in &element.opening_element.attributes {
            match item {
                JSXAttributeItem::Attribute(attr) => {
                    let name_str = match &attr.name {
                        JSXAttributeName::Identifier(id) => id.name.to_string(),
                        JSXAttributeName::NamespacedName(ns) => {
                            format!("{}:{}", ns.namespace.name, ns.name.name)
                        }
                    };
                    let name_atom = self.ast.allocator.alloc_str(&name_str);
                    let name = PropertyKey::StaticIdentifier(
                        self.ast.alloc(self.ast.identifier_name(SPAN, name_atom)),
                    );

                    let value = match &attr.value {
                        Some(JSXAttributeValue::StringLiteral(s)) => {
                            let decoded = decode_entities(&s.value);
                            let atom = self.ast.allocator.alloc_str(&decoded);
                            self.ast.expression_string_literal(SPAN, atom, None)
                        }
                        Some(JSXAttributeValue::Element(el)) => self.lower_jsx_element(el),
                        Some(JSXAttributeValue::ExpressionContainer(container)) => {
                            self.lower_jsx_expression(&container.expression)
                        }
                        Some(JSXAttributeValue::Fragment(frag)) => self.lower_jsx_fragment(frag),
                        None => self.ast.expression_boolean_literal(SPAN, true),
                    };

                    current_obj_props.push(self.ast.object_property_kind_object_property(
                        SPAN,
                        PropertyKind::Init,
                        name,
                        value,
                        false,
                        false,
                        false,
                    ));
                }
                JSXAttributeItem::SpreadAttribute(spread) => {
                    let mut spread_expr = spread.argument.clone_in(self.ast.allocator);
                    self.visit_expression(&mut spread_expr);
                    current_obj_props.push(
                        self.ast
                            .object_property_kind_spread_property(SPAN, spread_expr),
                    );
                }
            }
        }

        let props_expr = if current_obj_props.is_empty() {
            self.ast.expression_null_literal(SPAN)
        } else {
            self.ast.expression_object(SPAN, current_obj_props)
        };

        let children_expr = self.lower_children(&element.children);
        self.factory_call(tag, props_expr, children_expr)
    }

    fn lower_jsx_fragment(&mut self, fragment: &JSXFragment<'a>) -> Expression<'a> {
        let tag = self.ast.expression_identifier(SPAN, FRAGMENT);
        let props_expr = self.ast.expression_null_literal(SPAN);
        let children_expr = self.lower_children(&fragment.children);
        self.factory_call(tag, props_expr, children_expr)
    }

    /// Children -> Array or Null
    fn lower_children(&mut self, children: &[JSXChild<'a>]) -> Expression<'a> {
        let mut children_vec = self.ast.vec();
        for child in children {
            match child {
                JSXChild::Text(t) => {
                    if let Some(text) = clean_jsx_text(&t.value) {
                        let text_atom = self.ast.allocator.alloc_str(&text);
                        children_vec.push(ArrayExpressionElement::from(
                            self.ast.expression_string_literal(SPAN, text_atom, None),
                        ));
                    }
                }
                JSXChild::Element(el) => {
                    children_vec.push(ArrayExpressionElement::from(self.lower_jsx_element(el)));
                }
                JSXChild::Fragment(frag) => {
                    children_vec.push(ArrayExpressionElement::from(self.lower_jsx_fragment(frag)));
                }
                JSXChild::ExpressionContainer(container) => {
                    // `{}` and `{/* comment */}` contribute nothing
                    if container.expression.as_expression().is_some() {
                        children_vec.push(ArrayExpressionElement::from(
                            self.lower_jsx_expression(&container.expression),
                        ));
                    }
                }
                JSXChild::Spread(spread) => {
                    let mut arg = spread.expression.clone_in(self.ast.allocator);
                    self.visit_expression(&mut arg);
                    children_vec.push(ArrayExpressionElement::from(arg));
                }
            }
        }

        if children_vec.is_empty() {
            self.ast.expression_null_literal(SPAN)
        } else {
            self.ast.expression_array(SPAN, children_vec)
        }
    }

    fn factory_call(
        &self,
        tag: Expression<'a>,
        props: Expression<'a>,
        children: Expression<'a>,
    ) -> Expression<'a> {
        let mut args = self.ast.vec();
        args.push(Argument::from(tag));
        args.push(Argument::from(props));
        args.push(Argument::from(children));

        self.ast.expression_call(
            SPAN,
            self.ast.expression_identifier(SPAN, ELEMENT_FACTORY),
            None::<oxc_box<TSTypeParameterInstantiation>>,
            args,
            false,
        )
    }

    /// Lowercase tags are intrinsic and become strings; anything else is a reference.
    fn lower_tag(&self, name: &JSXElementName<'a>) -> Expression<'a> {
        match name {
            JSXElementName::Identifier(id) => self.tag_from_name(&id.name),
            JSXElementName::IdentifierReference(id) => self.tag_from_name(&id.name),
            JSXElementName::NamespacedName(ns) => {
                let name = format!("{}:{}", ns.namespace.name, ns.name.name);
                let atom = self.ast.allocator.alloc_str(&name);
                self.ast.expression_string_literal(SPAN, atom, None)
            }
            JSXElementName::MemberExpression(me) => self.lower_member_tag(me),
            JSXElementName::ThisExpression(_) => self.ast.expression_this(SPAN),
        }
    }

    fn tag_from_name(&self, name: &str) -> Expression<'a> {
        let atom = self.ast.allocator.alloc_str(name);
        if is_intrinsic_tag(name) {
            self.ast.expression_string_literal(SPAN, atom, None)
        } else {
            self.ast.expression_identifier(SPAN, atom)
        }
    }

    fn lower_member_tag(&self, me: &JSXMemberExpression<'a>) -> Expression<'a> {
        let object = match &me.object {
            JSXMemberExpressionObject::IdentifierReference(id) => {
                let atom = self.ast.allocator.alloc_str(&id.name);
                self.ast.expression_identifier(SPAN, atom)
            }
            JSXMemberExpressionObject::MemberExpression(inner) => self.lower_member_tag(inner),
            JSXMemberExpressionObject::ThisExpression(_) => self.ast.expression_this(SPAN),
        };
        let property = self.ast.allocator.alloc_str(&me.property.name);
        Expression::from(self.ast.member_expression_static(
            SPAN,
            object,
            self.ast.identifier_name(SPAN, property),
            false,
        ))
    }

    fn lower_jsx_expression(&mut self, jsx_expr: &JSXExpression<'a>) -> Expression<'a> {
        if let Some(mut e) = jsx_expr
            .as_expression()
            .map(|e| e.clone_in(self.ast.allocator))
        {
            self.visit_expression(&mut e);
            e
        } else {
            self.ast.expression_identifier(SPAN, "undefined")
        }
    }
}

impl<'a> VisitMut<'a> for JsxLowerer<'a> {
    fn visit_expression(&mut self, expr: &mut Expression<'a>) {
        match expr {
            Expression::JSXElement(element) => {
                let lowered = self.lower_jsx_element(element);
                *expr = lowered;
            }
            Expression::JSXFragment(fragment) => {
                let lowered = self.lower_jsx_fragment(fragment);
                *expr = lowered;
            }
            _ => {
                walk_expression(self, expr);
            }
        }
    }
}

pub fn is_intrinsic_tag(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_lowercase()) || name.contains('-')
}

/// Whitespace handling for JSX text: lines are trimmed where they meet a
/// line break and blank lines vanish; the rest join with single spaces.
pub fn clean_jsx_text(raw: &str) -> Option<String> {
    let lines: Vec<&str> = raw.lines().collect();
    let last = lines.len().saturating_sub(1);
    let mut parts = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let mut line = *line;
        if i != 0 {
            line = line.trim_start();
        }
        if i != last {
            line = line.trim_end();
        }
        if !line.is_empty() {
            parts.push(line);
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(decode_entities(&parts.join(" ")))
    }
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

// ═══════════════════════════════════════════════════════════════════════════════
// TYPE ERASER
// Removes type-only declarations and assertion wrappers
// ═══════════════════════════════════════════════════════════════════════════════

pub struct TypeEraser<'a> {
    pub allocator: &'a Allocator,
}

impl<'a> TypeEraser<'a> {
    pub fn new(allocator: &'a Allocator) -> Self {
        Self { allocator }
    }

    fn is_ts_node(stmt: &Statement<'a>) -> bool {
        matches!(
            stmt,
            Statement::TSTypeAliasDeclaration(_)
                | Statement::TSInterfaceDeclaration(_)
                | Statement::TSEnumDeclaration(_)
                | Statement::TSModuleDeclaration(_)
                | Statement::TSImportEqualsDeclaration(_)
        )
    }
}

impl<'a> VisitMut<'a> for TypeEraser<'a> {
    fn visit_program(&mut self, program: &mut Program<'a>) {
        program.body.retain(|stmt| !Self::is_ts_node(stmt));
        walk_program(self, program);
    }

    fn visit_block_statement(&mut self, block: &mut BlockStatement<'a>) {
        block.body.retain(|stmt| !Self::is_ts_node(stmt));
        walk_block_statement(self, block);
    }

    fn visit_function_body(&mut self, body: &mut FunctionBody<'a>) {
        body.statements.retain(|stmt| !Self::is_ts_node(stmt));
        walk_function_body(self, body);
    }

    fn visit_expression(&mut self, expr: &mut Expression<'a>) {
        let inner = match expr {
            Expression::TSAsExpression(e) => Some(e.expression.clone_in(self.allocator)),
            Expression::TSNonNullExpression(e) => Some(e.expression.clone_in(self.allocator)),
            Expression::TSSatisfiesExpression(e) => Some(e.expression.clone_in(self.allocator)),
            Expression::TSTypeAssertion(e) => Some(e.expression.clone_in(self.allocator)),
            Expression::TSInstantiationExpression(e) => {
                Some(e.expression.clone_in(self.allocator))
            }
            _ => None,
        };
        if let Some(inner) = inner {
            *expr = inner;
            self.visit_expression(expr);
            return;
        }
        walk_expression(self, expr);
    }
}
