//! # Live Components
//!
//! A namespace registry, compile pipeline and live re-render protocol for
//! small user-authored components embedded in markdown documents.
//!
//! ## Pipeline
//!
//! document text → snippet extraction → [`ComponentRegistry::register_component`]
//! → definition wrapper + [`Scope`] → [`to_executable`] → [`Evaluator`]
//! → binding in the [`NamespaceTree`] → debounced refresh → every live mount
//! re-renders.
//!
//! ## Invariants
//!
//! 1. **Built-ins win**: `h`, `Fragment`, `Markdown`, `namespace` and
//!    `useNamespace` can never be shadowed by a component.
//! 2. **Deferred references**: scopes hold `(namespace, identifier)` pairs, not
//!    values. A component always calls the current version of its siblings.
//! 3. **Change detection**: a registration whose wrapped text equals the last
//!    compiled snapshot compiles nothing and notifies nobody.
//! 4. **Containment**: compile, evaluation and invocation failures degrade one
//!    component to an error placeholder. Only [`HostError`] reaches a host.
//! 5. **Single thread**: all state is `Rc<RefCell<_>>`; async work runs on a
//!    tokio `LocalSet`.

mod builtins;
mod discovery;
mod document;
mod error;
mod evaluator;
mod identifier;
mod interpreter;
mod ir;
mod jsx_lowerer;
mod lowering;
mod mount;
mod namespace;
mod refresh;
mod registry;
mod render;
mod scope;
mod settings;
mod transform;
mod value;
mod workspace;

#[cfg(test)]
mod interpreter_tests;
#[cfg(test)]
mod mount_tests;
#[cfg(test)]
mod transform_tests;
#[cfg(test)]
mod workspace_tests;

pub use discovery::{document_stem, is_markdown, DocumentStore, FsDocumentStore, MemoryDocumentStore};
pub use document::{
    extract_snippets, parse_frontmatter, strip_frontmatter, Properties, Snippet, SnippetKind,
    COMPONENTS_NAMESPACE, DEFINES_COMPONENTS,
};
pub use error::{ComponentError, EvalError, EvalResult, HostError};
pub use evaluator::{compute_digest, Evaluator};
pub use identifier::is_valid_identifier;
pub use interpreter::{HostModules, Interpreter, DEFAULT_MAX_CALL_DEPTH};
pub use mount::{
    render_source, MountTracker, RecordingSurface, RenderContext, RenderSurface, SurfaceId,
    INLINE_LABEL,
};
pub use namespace::{
    CodeEntry, CompiledValue, NamespaceHandle, NamespaceNode, NamespaceTree, GLOBAL_NAMESPACE,
};
pub use refresh::{RefreshNotifier, SubscriberId, Subscription, DEFAULT_DEBOUNCE};
pub use registry::{ComponentRegistry, RegistrationOutcome};
pub use render::{render, RenderNode};
pub use scope::{Scope, ScopeBuilder, ScopeEntry, BUILTIN_NAMES};
pub use settings::{RecompilePolicy, Settings};
pub use transform::{extract_imports, to_executable, wrap_for_definition, wrap_for_inline_use, SplitSource};
pub use value::{Callable, Element, ElementKind, ObjectMap, Value};
pub use workspace::{DocumentEvent, Workspace};
