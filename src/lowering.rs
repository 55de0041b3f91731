//! Lowering of executable text into the owned IR.
//!
//! Executable text is plain code produced by [`crate::transform::to_executable`].
//! Type-only syntax that survived the conversion (annotations, `as`
//! expressions, interfaces) is dropped here; markup must already be lowered.

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_parser::Parser;
use oxc_span::SourceType;
use oxc_syntax::operator::{
    AssignmentOperator, BinaryOperator, LogicalOperator, UnaryOperator, UpdateOperator,
};
use std::rc::Rc;

use crate::error::{EvalError, EvalResult};
use crate::ir;
use crate::value::number_to_string;

/// Directive marking a function body that yields its completion value.
pub const COMPLETION_DIRECTIVE: &str = "use completion";

fn source_type() -> SourceType {
    SourceType::default()
        .with_typescript(true)
        .with_module(true)
        .with_jsx(true)
}

fn unsupported(construct: &str) -> EvalError {
    EvalError::Unsupported(format!("{} is not supported in components", construct))
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse and lower a module with hoisted imports and a default export.
pub fn lower_module(text: &str) -> EvalResult<ir::Module> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, text, source_type()).parse();
    if let Some(error) = ret.errors.first() {
        return Err(EvalError::Syntax(error.to_string()));
    }

    let mut imports = Vec::new();
    let mut body = Vec::new();
    let mut default_export = None;

    for stmt in &ret.program.body {
        match stmt {
            Statement::ImportDeclaration(decl) => {
                if let Some(import) = lower_import(decl) {
                    imports.push(import);
                }
            }
            Statement::ExportDefaultDeclaration(decl) => {
                let expr = match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                        ir::Expr::Function(lower_function(func)?)
                    }
                    kind => match kind.as_expression() {
                        Some(expr) => lower_expr(expr)?,
                        None => return Err(unsupported("this default export")),
                    },
                };
                default_export = Some(expr);
            }
            Statement::ExportNamedDeclaration(_) | Statement::ExportAllDeclaration(_) => {
                return Err(unsupported("named export"));
            }
            other => lower_stmt_into(other, &mut body)?,
        }
    }

    Ok(ir::Module {
        imports,
        body,
        default_export,
    })
}

/// Parse and lower an `eval` program.
pub fn lower_script(text: &str) -> EvalResult<ir::Script> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, text, source_type()).parse();
    if let Some(error) = ret.errors.first() {
        return Err(EvalError::Syntax(error.to_string()));
    }

    let mut body = Vec::new();
    for stmt in &ret.program.body {
        match stmt {
            Statement::ImportDeclaration(_)
            | Statement::ExportDefaultDeclaration(_)
            | Statement::ExportNamedDeclaration(_)
            | Statement::ExportAllDeclaration(_) => {
                return Err(unsupported("import/export inside an inline snippet"));
            }
            other => lower_stmt_into(other, &mut body)?,
        }
    }
    Ok(ir::Script { body })
}

fn lower_import(decl: &ImportDeclaration) -> Option<ir::ImportDecl> {
    if decl.import_kind.is_type() {
        return None;
    }

    let mut bindings = Vec::new();
    if let Some(specifiers) = &decl.specifiers {
        for specifier in specifiers {
            match specifier {
                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                    if s.import_kind.is_type() {
                        continue;
                    }
                    let imported = match &s.imported {
                        ModuleExportName::IdentifierName(id) => id.name.to_string(),
                        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
                        ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
                    };
                    bindings.push(ir::ImportBinding {
                        local: s.local.name.to_string(),
                        imported: Some(imported),
                    });
                }
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                    bindings.push(ir::ImportBinding {
                        local: s.local.name.to_string(),
                        imported: Some("default".to_string()),
                    });
                }
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                    bindings.push(ir::ImportBinding {
                        local: s.local.name.to_string(),
                        imported: None,
                    });
                }
            }
        }
    }

    Some(ir::ImportDecl {
        source: decl.source.value.to_string(),
        bindings,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATEMENTS
// ═══════════════════════════════════════════════════════════════════════════════

fn lower_stmts(stmts: &[Statement]) -> EvalResult<Vec<ir::Stmt>> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        lower_stmt_into(stmt, &mut out)?;
    }
    Ok(out)
}

fn lower_stmt_into(stmt: &Statement, out: &mut Vec<ir::Stmt>) -> EvalResult<()> {
    match lower_stmt(stmt)? {
        ir::Stmt::Empty => {}
        lowered => out.push(lowered),
    }
    Ok(())
}

fn lower_stmt(stmt: &Statement) -> EvalResult<ir::Stmt> {
    let lowered = match stmt {
        Statement::ExpressionStatement(s) => ir::Stmt::Expr(lower_expr(&s.expression)?),
        Statement::VariableDeclaration(decl) => lower_var_decl(decl)?,
        Statement::FunctionDeclaration(func) => {
            let name = match &func.id {
                Some(id) => id.name.to_string(),
                None => return Err(unsupported("anonymous function declaration")),
            };
            ir::Stmt::Function(name, lower_function(func)?)
        }
        Statement::ReturnStatement(ret) => ir::Stmt::Return(match &ret.argument {
            Some(arg) => Some(lower_expr(arg)?),
            None => None,
        }),
        Statement::IfStatement(s) => ir::Stmt::If(
            lower_expr(&s.test)?,
            Box::new(lower_stmt(&s.consequent)?),
            match &s.alternate {
                Some(alt) => Some(Box::new(lower_stmt(alt)?)),
                None => None,
            },
        ),
        Statement::BlockStatement(block) => ir::Stmt::Block(lower_stmts(&block.body)?),
        Statement::WhileStatement(s) => {
            ir::Stmt::While(lower_expr(&s.test)?, Box::new(lower_stmt(&s.body)?))
        }
        Statement::DoWhileStatement(s) => {
            ir::Stmt::DoWhile(Box::new(lower_stmt(&s.body)?), lower_expr(&s.test)?)
        }
        Statement::ForStatement(s) => {
            let init = match &s.init {
                Some(ForStatementInit::VariableDeclaration(decl)) => {
                    Some(Box::new(lower_var_decl(decl)?))
                }
                Some(init) => match init.as_expression() {
                    Some(expr) => Some(Box::new(ir::Stmt::Expr(lower_expr(expr)?))),
                    None => return Err(unsupported("this for-loop initializer")),
                },
                None => None,
            };
            ir::Stmt::For {
                init,
                test: match &s.test {
                    Some(test) => Some(lower_expr(test)?),
                    None => None,
                },
                update: match &s.update {
                    Some(update) => Some(lower_expr(update)?),
                    None => None,
                },
                body: Box::new(lower_stmt(&s.body)?),
            }
        }
        Statement::ForOfStatement(s) => {
            if s.r#await {
                return Err(unsupported("for await"));
            }
            let (kind, pattern) = lower_loop_left(&s.left)?;
            ir::Stmt::ForOf {
                kind,
                pattern,
                iterable: lower_expr(&s.right)?,
                body: Box::new(lower_stmt(&s.body)?),
            }
        }
        Statement::ForInStatement(s) => {
            let (kind, pattern) = lower_loop_left(&s.left)?;
            ir::Stmt::ForIn {
                kind,
                pattern,
                object: lower_expr(&s.right)?,
                body: Box::new(lower_stmt(&s.body)?),
            }
        }
        Statement::BreakStatement(s) => {
            if s.label.is_some() {
                return Err(unsupported("labelled break"));
            }
            ir::Stmt::Break
        }
        Statement::ContinueStatement(s) => {
            if s.label.is_some() {
                return Err(unsupported("labelled continue"));
            }
            ir::Stmt::Continue
        }
        Statement::ThrowStatement(s) => ir::Stmt::Throw(lower_expr(&s.argument)?),
        Statement::TryStatement(s) => {
            let (param, handler) = match &s.handler {
                Some(clause) => {
                    let param = match &clause.param {
                        Some(p) => Some(lower_pattern(&p.pattern)?),
                        None => None,
                    };
                    (param, Some(lower_stmts(&clause.body.body)?))
                }
                None => (None, None),
            };
            ir::Stmt::Try {
                block: lower_stmts(&s.block.body)?,
                param,
                handler,
                finalizer: match &s.finalizer {
                    Some(block) => Some(lower_stmts(&block.body)?),
                    None => None,
                },
            }
        }
        Statement::EmptyStatement(_) => ir::Stmt::Empty,
        // Type-only declarations are erased
        Statement::TSTypeAliasDeclaration(_)
        | Statement::TSInterfaceDeclaration(_)
        | Statement::TSModuleDeclaration(_) => ir::Stmt::Empty,
        Statement::ImportDeclaration(_) => return Err(unsupported("nested import")),
        Statement::ClassDeclaration(_) => return Err(unsupported("class declaration")),
        Statement::SwitchStatement(_) => return Err(unsupported("switch")),
        _ => return Err(unsupported("this statement")),
    };
    Ok(lowered)
}

fn decl_kind(kind: VariableDeclarationKind) -> ir::DeclKind {
    if kind == VariableDeclarationKind::Const {
        ir::DeclKind::Const
    } else {
        ir::DeclKind::Let
    }
}

fn lower_var_decl(decl: &VariableDeclaration) -> EvalResult<ir::Stmt> {
    let mut decls = Vec::with_capacity(decl.declarations.len());
    for d in &decl.declarations {
        let init = match &d.init {
            Some(init) => Some(lower_expr(init)?),
            None => None,
        };
        decls.push((lower_pattern(&d.id)?, init));
    }
    Ok(ir::Stmt::Declare {
        kind: decl_kind(decl.kind),
        decls,
    })
}

fn lower_loop_left(left: &ForStatementLeft) -> EvalResult<(ir::DeclKind, ir::Pattern)> {
    match left {
        ForStatementLeft::VariableDeclaration(decl) => match decl.declarations.first() {
            Some(d) => Ok((decl_kind(decl.kind), lower_pattern(&d.id)?)),
            None => Err(EvalError::Syntax("empty loop declaration".to_string())),
        },
        _ => Err(unsupported("assignment target in loop head")),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PATTERNS & FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

fn lower_pattern(pattern: &BindingPattern) -> EvalResult<ir::Pattern> {
    match pattern {
        BindingPattern::BindingIdentifier(id) => Ok(ir::Pattern::Ident(id.name.to_string())),
        BindingPattern::ObjectPattern(obj) => {
            let mut props = Vec::with_capacity(obj.properties.len());
            for prop in &obj.properties {
                let key = if prop.computed {
                    match prop.key.as_expression() {
                        Some(expr) => ir::MemberKey::Computed(Box::new(lower_expr(expr)?)),
                        None => return Err(unsupported("this computed key")),
                    }
                } else {
                    ir::MemberKey::Static(property_key_name(&prop.key)?)
                };
                props.push((key, lower_pattern(&prop.value)?));
            }
            let rest = match &obj.rest {
                Some(rest) => Some(Box::new(lower_pattern(&rest.argument)?)),
                None => None,
            };
            Ok(ir::Pattern::Object { props, rest })
        }
        BindingPattern::ArrayPattern(arr) => {
            let mut elements = Vec::with_capacity(arr.elements.len());
            for elem in &arr.elements {
                elements.push(match elem {
                    Some(p) => Some(lower_pattern(p)?),
                    None => None,
                });
            }
            let rest = match &arr.rest {
                Some(rest) => Some(Box::new(lower_pattern(&rest.argument)?)),
                None => None,
            };
            Ok(ir::Pattern::Array { elements, rest })
        }
        BindingPattern::AssignmentPattern(assign) => Ok(ir::Pattern::Default(
            Box::new(lower_pattern(&assign.left)?),
            Box::new(lower_expr(&assign.right)?),
        )),
    }
}

fn lower_params(params: &FormalParameters) -> EvalResult<Vec<ir::Pattern>> {
    if params.rest.is_some() {
        return Err(unsupported("rest parameter"));
    }
    let mut out = Vec::with_capacity(params.items.len());
    for param in &params.items {
        out.push(lower_pattern(&param.pattern)?);
    }
    Ok(out)
}

fn has_completion(directives: &[Directive]) -> bool {
    directives
        .iter()
        .any(|d| d.directive.as_str() == COMPLETION_DIRECTIVE)
}

fn lower_function(func: &Function) -> EvalResult<Rc<ir::FunctionDef>> {
    if func.r#async || func.generator {
        return Err(unsupported("async or generator function"));
    }
    let body = match &func.body {
        Some(body) => body,
        None => return Err(unsupported("function without a body")),
    };
    Ok(Rc::new(ir::FunctionDef {
        name: func.id.as_ref().map(|id| id.name.to_string()),
        params: lower_params(&func.params)?,
        body: lower_stmts(&body.statements)?,
        completion: has_completion(&body.directives),
    }))
}

fn lower_arrow(arrow: &ArrowFunctionExpression) -> EvalResult<Rc<ir::FunctionDef>> {
    if arrow.r#async {
        return Err(unsupported("async arrow function"));
    }
    let body = if arrow.expression {
        match arrow.body.statements.first() {
            Some(Statement::ExpressionStatement(s)) => {
                vec![ir::Stmt::Return(Some(lower_expr(&s.expression)?))]
            }
            _ => return Err(EvalError::Syntax("malformed arrow body".to_string())),
        }
    } else {
        lower_stmts(&arrow.body.statements)?
    };
    Ok(Rc::new(ir::FunctionDef {
        name: None,
        params: lower_params(&arrow.params)?,
        body,
        completion: has_completion(&arrow.body.directives),
    }))
}

fn property_key_name(key: &PropertyKey) -> EvalResult<String> {
    match key {
        PropertyKey::StaticIdentifier(id) => Ok(id.name.to_string()),
        PropertyKey::StringLiteral(lit) => Ok(lit.value.to_string()),
        PropertyKey::NumericLiteral(lit) => Ok(number_to_string(lit.value)),
        _ => Err(unsupported("this property key")),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSIONS
// ═══════════════════════════════════════════════════════════════════════════════

fn lower_exprs(exprs: &[Expression]) -> EvalResult<Vec<ir::Expr>> {
    exprs.iter().map(lower_expr).collect()
}

fn lower_arguments(args: &[Argument]) -> EvalResult<Vec<ir::ArrayItem>> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Argument::SpreadElement(spread) => {
                out.push(ir::ArrayItem::Spread(lower_expr(&spread.argument)?))
            }
            other => match other.as_expression() {
                Some(expr) => out.push(ir::ArrayItem::Item(lower_expr(expr)?)),
                None => return Err(unsupported("this argument")),
            },
        }
    }
    Ok(out)
}

fn lower_static_member(member: &StaticMemberExpression) -> EvalResult<ir::Expr> {
    Ok(ir::Expr::Member {
        object: Box::new(lower_expr(&member.object)?),
        key: ir::MemberKey::Static(member.property.name.to_string()),
        optional: member.optional,
    })
}

fn lower_computed_member(member: &ComputedMemberExpression) -> EvalResult<ir::Expr> {
    Ok(ir::Expr::Member {
        object: Box::new(lower_expr(&member.object)?),
        key: ir::MemberKey::Computed(Box::new(lower_expr(&member.expression)?)),
        optional: member.optional,
    })
}

fn lower_call(call: &CallExpression) -> EvalResult<ir::Expr> {
    let args = lower_arguments(&call.arguments)?;
    if let Expression::Identifier(id) = &call.callee {
        if id.name.as_str() == "eval" {
            return Ok(ir::Expr::DirectEval(args));
        }
    }
    Ok(ir::Expr::Call {
        callee: Box::new(lower_expr(&call.callee)?),
        args,
        optional: call.optional,
    })
}

fn lower_simple_target(target: &SimpleAssignmentTarget) -> EvalResult<ir::Target> {
    match target {
        SimpleAssignmentTarget::AssignmentTargetIdentifier(id) => {
            Ok(ir::Target::Ident(id.name.to_string()))
        }
        SimpleAssignmentTarget::StaticMemberExpression(member) => Ok(ir::Target::Member {
            object: Box::new(lower_expr(&member.object)?),
            key: ir::MemberKey::Static(member.property.name.to_string()),
        }),
        SimpleAssignmentTarget::ComputedMemberExpression(member) => Ok(ir::Target::Member {
            object: Box::new(lower_expr(&member.object)?),
            key: ir::MemberKey::Computed(Box::new(lower_expr(&member.expression)?)),
        }),
        _ => Err(unsupported("this assignment target")),
    }
}

fn lower_target(target: &AssignmentTarget) -> EvalResult<ir::Target> {
    match target {
        AssignmentTarget::AssignmentTargetIdentifier(id) => {
            Ok(ir::Target::Ident(id.name.to_string()))
        }
        AssignmentTarget::StaticMemberExpression(member) => Ok(ir::Target::Member {
            object: Box::new(lower_expr(&member.object)?),
            key: ir::MemberKey::Static(member.property.name.to_string()),
        }),
        AssignmentTarget::ComputedMemberExpression(member) => Ok(ir::Target::Member {
            object: Box::new(lower_expr(&member.object)?),
            key: ir::MemberKey::Computed(Box::new(lower_expr(&member.expression)?)),
        }),
        _ => Err(unsupported("destructuring assignment")),
    }
}

fn binary_op(op: BinaryOperator) -> EvalResult<ir::BinaryOp> {
    use ir::BinaryOp as B;
    Ok(match op {
        BinaryOperator::Addition => B::Add,
        BinaryOperator::Subtraction => B::Sub,
        BinaryOperator::Multiplication => B::Mul,
        BinaryOperator::Division => B::Div,
        BinaryOperator::Remainder => B::Rem,
        BinaryOperator::Exponential => B::Exp,
        BinaryOperator::Equality => B::Eq,
        BinaryOperator::Inequality => B::NotEq,
        BinaryOperator::StrictEquality => B::StrictEq,
        BinaryOperator::StrictInequality => B::StrictNotEq,
        BinaryOperator::LessThan => B::Lt,
        BinaryOperator::LessEqualThan => B::LtEq,
        BinaryOperator::GreaterThan => B::Gt,
        BinaryOperator::GreaterEqualThan => B::GtEq,
        BinaryOperator::BitwiseAnd => B::BitAnd,
        BinaryOperator::BitwiseOR => B::BitOr,
        BinaryOperator::BitwiseXOR => B::BitXor,
        BinaryOperator::ShiftLeft => B::Shl,
        BinaryOperator::ShiftRight => B::Shr,
        BinaryOperator::ShiftRightZeroFill => B::UShr,
        BinaryOperator::In => B::In,
        BinaryOperator::Instanceof => return Err(unsupported("instanceof")),
    })
}

fn logical_op(op: LogicalOperator) -> ir::LogicalOp {
    match op {
        LogicalOperator::And => ir::LogicalOp::And,
        LogicalOperator::Or => ir::LogicalOp::Or,
        LogicalOperator::Coalesce => ir::LogicalOp::Coalesce,
    }
}

fn assign_op(op: AssignmentOperator) -> ir::AssignOp {
    use ir::BinaryOp as B;
    match op {
        AssignmentOperator::Assign => ir::AssignOp::Assign,
        AssignmentOperator::Addition => ir::AssignOp::Compound(B::Add),
        AssignmentOperator::Subtraction => ir::AssignOp::Compound(B::Sub),
        AssignmentOperator::Multiplication => ir::AssignOp::Compound(B::Mul),
        AssignmentOperator::Division => ir::AssignOp::Compound(B::Div),
        AssignmentOperator::Remainder => ir::AssignOp::Compound(B::Rem),
        AssignmentOperator::Exponential => ir::AssignOp::Compound(B::Exp),
        AssignmentOperator::ShiftLeft => ir::AssignOp::Compound(B::Shl),
        AssignmentOperator::ShiftRight => ir::AssignOp::Compound(B::Shr),
        AssignmentOperator::ShiftRightZeroFill => ir::AssignOp::Compound(B::UShr),
        AssignmentOperator::BitwiseOR => ir::AssignOp::Compound(B::BitOr),
        AssignmentOperator::BitwiseXOR => ir::AssignOp::Compound(B::BitXor),
        AssignmentOperator::BitwiseAnd => ir::AssignOp::Compound(B::BitAnd),
        AssignmentOperator::LogicalAnd => ir::AssignOp::Logical(ir::LogicalOp::And),
        AssignmentOperator::LogicalOr => ir::AssignOp::Logical(ir::LogicalOp::Or),
        AssignmentOperator::LogicalNullish => ir::AssignOp::Logical(ir::LogicalOp::Coalesce),
    }
}

fn lower_expr(expr: &Expression) -> EvalResult<ir::Expr> {
    let lowered = match expr {
        Expression::BooleanLiteral(lit) => ir::Expr::Literal(ir::Literal::Bool(lit.value)),
        Expression::NullLiteral(_) => ir::Expr::Literal(ir::Literal::Null),
        Expression::NumericLiteral(lit) => ir::Expr::Literal(ir::Literal::Number(lit.value)),
        Expression::StringLiteral(lit) => {
            ir::Expr::Literal(ir::Literal::String(Rc::from(lit.value.as_str())))
        }
        Expression::TemplateLiteral(tpl) => ir::Expr::Template {
            quasis: tpl
                .quasis
                .iter()
                .map(|q| match &q.value.cooked {
                    Some(cooked) => cooked.to_string(),
                    None => q.value.raw.to_string(),
                })
                .collect(),
            exprs: lower_exprs(&tpl.expressions)?,
        },
        Expression::Identifier(id) => ir::Expr::Ident(id.name.to_string()),
        Expression::ArrayExpression(arr) => {
            let mut items = Vec::with_capacity(arr.elements.len());
            for elem in &arr.elements {
                items.push(match elem {
                    ArrayExpressionElement::SpreadElement(spread) => {
                        ir::ArrayItem::Spread(lower_expr(&spread.argument)?)
                    }
                    ArrayExpressionElement::Elision(_) => ir::ArrayItem::Hole,
                    other => match other.as_expression() {
                        Some(e) => ir::ArrayItem::Item(lower_expr(e)?),
                        None => return Err(unsupported("this array element")),
                    },
                });
            }
            ir::Expr::Array(items)
        }
        Expression::ObjectExpression(obj) => {
            let mut props = Vec::with_capacity(obj.properties.len());
            for prop in &obj.properties {
                match prop {
                    ObjectPropertyKind::ObjectProperty(p) => {
                        if p.kind != PropertyKind::Init {
                            return Err(unsupported("getter/setter"));
                        }
                        let value = lower_expr(&p.value)?;
                        if p.computed {
                            match p.key.as_expression() {
                                Some(key) => props.push(ir::PropItem::Computed(lower_expr(key)?, value)),
                                None => return Err(unsupported("this computed key")),
                            }
                        } else {
                            props.push(ir::PropItem::Init(property_key_name(&p.key)?, value));
                        }
                    }
                    ObjectPropertyKind::SpreadProperty(spread) => {
                        props.push(ir::PropItem::Spread(lower_expr(&spread.argument)?));
                    }
                }
            }
            ir::Expr::Object(props)
        }
        Expression::FunctionExpression(func) => ir::Expr::Function(lower_function(func)?),
        Expression::ArrowFunctionExpression(arrow) => ir::Expr::Function(lower_arrow(arrow)?),
        Expression::StaticMemberExpression(member) => lower_static_member(member)?,
        Expression::ComputedMemberExpression(member) => lower_computed_member(member)?,
        Expression::CallExpression(call) => lower_call(call)?,
        Expression::ChainExpression(chain) => {
            let inner = match &chain.expression {
                ChainElement::CallExpression(call) => lower_call(call)?,
                ChainElement::StaticMemberExpression(member) => lower_static_member(member)?,
                ChainElement::ComputedMemberExpression(member) => lower_computed_member(member)?,
                ChainElement::TSNonNullExpression(e) => lower_expr(&e.expression)?,
                _ => return Err(unsupported("this optional chain")),
            };
            ir::Expr::Chain(Box::new(inner))
        }
        Expression::UnaryExpression(unary) => {
            let op = match unary.operator {
                UnaryOperator::UnaryNegation => ir::UnaryOp::Neg,
                UnaryOperator::UnaryPlus => ir::UnaryOp::Plus,
                UnaryOperator::LogicalNot => ir::UnaryOp::Not,
                UnaryOperator::BitwiseNot => ir::UnaryOp::BitNot,
                UnaryOperator::Typeof => ir::UnaryOp::TypeOf,
                UnaryOperator::Void => ir::UnaryOp::Void,
                UnaryOperator::Delete => return Err(unsupported("delete")),
            };
            ir::Expr::Unary(op, Box::new(lower_expr(&unary.argument)?))
        }
        Expression::BinaryExpression(bin) => ir::Expr::Binary(
            binary_op(bin.operator)?,
            Box::new(lower_expr(&bin.left)?),
            Box::new(lower_expr(&bin.right)?),
        ),
        Expression::LogicalExpression(logical) => ir::Expr::Logical(
            logical_op(logical.operator),
            Box::new(lower_expr(&logical.left)?),
            Box::new(lower_expr(&logical.right)?),
        ),
        Expression::ConditionalExpression(cond) => ir::Expr::Conditional(
            Box::new(lower_expr(&cond.test)?),
            Box::new(lower_expr(&cond.consequent)?),
            Box::new(lower_expr(&cond.alternate)?),
        ),
        Expression::AssignmentExpression(assign) => ir::Expr::Assign {
            op: assign_op(assign.operator),
            target: lower_target(&assign.left)?,
            value: Box::new(lower_expr(&assign.right)?),
        },
        Expression::UpdateExpression(update) => ir::Expr::Update {
            increment: update.operator == UpdateOperator::Increment,
            prefix: update.prefix,
            target: lower_simple_target(&update.argument)?,
        },
        Expression::SequenceExpression(seq) => ir::Expr::Sequence(lower_exprs(&seq.expressions)?),
        Expression::ParenthesizedExpression(paren) => lower_expr(&paren.expression)?,
        // Type-only wrappers are erased
        Expression::TSAsExpression(e) => lower_expr(&e.expression)?,
        Expression::TSSatisfiesExpression(e) => lower_expr(&e.expression)?,
        Expression::TSNonNullExpression(e) => lower_expr(&e.expression)?,
        Expression::TSTypeAssertion(e) => lower_expr(&e.expression)?,
        Expression::TSInstantiationExpression(e) => lower_expr(&e.expression)?,
        Expression::JSXElement(_) | Expression::JSXFragment(_) => {
            return Err(EvalError::Syntax(
                "markup must be converted before execution".to_string(),
            ))
        }
        Expression::NewExpression(new) => ir::Expr::New {
            callee: Box::new(lower_expr(&new.callee)?),
            args: lower_arguments(&new.arguments)?,
        },
        Expression::AwaitExpression(_) => return Err(unsupported("await")),
        Expression::ThisExpression(_) => return Err(unsupported("this")),
        _ => return Err(unsupported("this expression")),
    };
    Ok(lowered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_with_default_export() {
        let module = lower_module("const a = 1;\nexport default (scope) => a;").unwrap();
        assert_eq!(module.body.len(), 1);
        assert!(matches!(module.default_export, Some(ir::Expr::Function(_))));
    }

    #[test]
    fn test_imports_are_collected() {
        let module =
            lower_module("import lib, { helper as h } from 'lib';\nexport default 1;").unwrap();
        assert_eq!(module.imports.len(), 1);
        let import = &module.imports[0];
        assert_eq!(import.source, "lib");
        assert_eq!(import.bindings.len(), 2);
        assert_eq!(import.bindings[0].imported.as_deref(), Some("default"));
        assert_eq!(import.bindings[1].local, "h");
        assert_eq!(import.bindings[1].imported.as_deref(), Some("helper"));
    }

    #[test]
    fn test_type_syntax_is_erased() {
        let script =
            lower_script("interface P { n: number }\nconst f = (p: P): number => p.n as number;\nf")
                .unwrap();
        assert_eq!(script.body.len(), 2);
    }

    #[test]
    fn test_completion_directive_is_detected() {
        let module =
            lower_module("export default () => { \"use completion\"; 1 + 1; };").unwrap();
        match module.default_export {
            Some(ir::Expr::Function(def)) => assert!(def.completion),
            other => panic!("unexpected export {:?}", other),
        }
    }

    #[test]
    fn test_raw_markup_is_rejected() {
        let err = lower_script("<div />").unwrap_err();
        assert!(matches!(err, EvalError::Syntax(_)));
    }

    #[test]
    fn test_syntax_errors_are_reported() {
        let err = lower_script("const = ;").unwrap_err();
        assert!(matches!(err, EvalError::Syntax(_)));
    }
}
