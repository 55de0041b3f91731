//! Error types for the component engine.
//!
//! Three layers, three enums:
//! - [`ComponentError`]: the contained failure kinds. They degrade a single
//!   component to an error placeholder and never escape a registration or
//!   render call.
//! - [`EvalError`]: faults raised while running executable code. These are
//!   folded into a [`ComponentError`] at the registry/render boundary.
//! - [`HostError`]: malformed input at the host boundary. These are the only
//!   errors returned to a host caller.

use std::path::PathBuf;
use thiserror::Error;

use crate::value::Value;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_INVALID_IDENTIFIER: &str = "LC-ERR-IDENT-001";
pub const ERR_COMPILE: &str = "LC-ERR-COMPILE-001";
pub const ERR_EVALUATION: &str = "LC-ERR-EVAL-001";
pub const ERR_INVOCATION: &str = "LC-ERR-INVOKE-001";

fn get_guarantee(code: &str) -> &'static str {
    match code {
        ERR_INVALID_IDENTIFIER => "Component names are usable as bindings in every namespace.",
        ERR_COMPILE => "A compile failure only affects the component that failed.",
        ERR_EVALUATION => "A failing module load never aborts sibling registrations.",
        ERR_INVOCATION => "A component that throws renders a placeholder, not a broken page.",
        _ => "Unknown error code.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENT ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComponentError {
    #[error("'{name}' is not a valid component name")]
    InvalidIdentifier { name: String },

    #[error("failed to compile '{component}': {message}")]
    Compile { component: String, message: String },

    #[error("failed to evaluate '{component}': {message}")]
    Evaluation { component: String, message: String },

    #[error("'{component}' failed while rendering: {message}")]
    Invocation { component: String, message: String },
}

impl ComponentError {
    pub fn code(&self) -> &'static str {
        match self {
            ComponentError::InvalidIdentifier { .. } => ERR_INVALID_IDENTIFIER,
            ComponentError::Compile { .. } => ERR_COMPILE,
            ComponentError::Evaluation { .. } => ERR_EVALUATION,
            ComponentError::Invocation { .. } => ERR_INVOCATION,
        }
    }

    pub fn guarantee(&self) -> &'static str {
        get_guarantee(self.code())
    }

    /// Name of the component the failure belongs to.
    pub fn component(&self) -> &str {
        match self {
            ComponentError::InvalidIdentifier { name } => name,
            ComponentError::Compile { component, .. }
            | ComponentError::Evaluation { component, .. }
            | ComponentError::Invocation { component, .. } => component,
        }
    }

    /// The underlying failure message without the component prefix.
    pub fn message(&self) -> String {
        match self {
            ComponentError::InvalidIdentifier { name } => {
                format!("'{}' is not a valid identifier", name)
            }
            ComponentError::Compile { message, .. }
            | ComponentError::Evaluation { message, .. }
            | ComponentError::Invocation { message, .. } => message.clone(),
        }
    }

    /// Folds an engine fault raised while loading/running a module.
    ///
    /// Syntax errors surface as compile failures; everything else is an
    /// evaluation failure.
    pub fn from_eval(component: &str, err: &EvalError) -> Self {
        match err {
            EvalError::Syntax(message) | EvalError::Unsupported(message) => {
                ComponentError::Compile {
                    component: component.to_string(),
                    message: message.clone(),
                }
            }
            other => ComponentError::Evaluation {
                component: component.to_string(),
                message: other.to_string(),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE FAULTS
// ═══════════════════════════════════════════════════════════════════════════════

pub type EvalResult<T> = Result<T, EvalError>;

#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("SyntaxError: {0}")]
    Syntax(String),

    #[error("unsupported syntax: {0}")]
    Unsupported(String),

    #[error("ReferenceError: {name} is not defined")]
    Reference { name: String },

    #[error("TypeError: {0}")]
    Type(String),

    #[error("RangeError: {0}")]
    Range(String),

    #[error("cannot resolve module '{0}'")]
    UnresolvedModule(String),

    #[error("module has no default export")]
    MissingDefaultExport,

    #[error("Uncaught {}", .0.display_string())]
    Thrown(Value),
}

impl EvalError {
    pub fn type_error(message: impl Into<String>) -> Self {
        EvalError::Type(message.into())
    }

    /// The value a `catch` clause binds for this fault.
    pub fn into_thrown_value(self) -> Value {
        match self {
            EvalError::Thrown(value) => value,
            other => Value::error_object(error_name(&other), &other.to_string()),
        }
    }
}

fn error_name(err: &EvalError) -> &'static str {
    match err {
        EvalError::Syntax(_) => "SyntaxError",
        EvalError::Reference { .. } => "ReferenceError",
        EvalError::Type(_) => "TypeError",
        EvalError::Range(_) => "RangeError",
        _ => "Error",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOST BOUNDARY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum HostError {
    #[error("folder '{}' does not exist", .0.display())]
    MissingFolder(PathBuf),

    #[error("'{0}' is not a markdown document")]
    NotMarkdown(String),

    #[error("document '{0}' not found")]
    DocumentNotFound(String),

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    Settings(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_guarantees() {
        let err = ComponentError::Compile {
            component: "Foo".to_string(),
            message: "Unexpected token".to_string(),
        };
        assert_eq!(err.code(), ERR_COMPILE);
        assert_eq!(err.component(), "Foo");
        assert!(err.guarantee().contains("only affects"));
        assert_eq!(err.to_string(), "failed to compile 'Foo': Unexpected token");
    }

    #[test]
    fn test_syntax_faults_fold_into_compile_errors() {
        let err = ComponentError::from_eval("Bar", &EvalError::Syntax("bad".to_string()));
        assert_eq!(err.code(), ERR_COMPILE);

        let err = ComponentError::from_eval(
            "Bar",
            &EvalError::Reference {
                name: "nope".to_string(),
            },
        );
        assert_eq!(err.code(), ERR_EVALUATION);
        assert_eq!(err.message(), "ReferenceError: nope is not defined");
    }
}
