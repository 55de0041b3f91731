//! Host integration: wires a document store to the registry and mounts.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, info, warn};

use crate::discovery::{document_stem, is_markdown, DocumentStore};
use crate::document::{
    components_namespace, defines_components, extract_snippets, parse_frontmatter,
    strip_frontmatter, Properties, Snippet, SnippetKind,
};
use crate::error::HostError;
use crate::evaluator::{compute_digest, Evaluator};
use crate::interpreter::{HostModules, Interpreter};
use crate::mount::{MountTracker, RenderContext, RenderSurface};
use crate::namespace::NamespaceTree;
use crate::refresh::{RefreshNotifier, SubscriberId, Subscription};
use crate::registry::{ComponentRegistry, RegistrationOutcome};
use crate::settings::Settings;

/// File-change notification from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    Created(String),
    Modified(String),
    Renamed { from: String, to: String },
    MetadataChanged(String),
}

pub struct Workspace {
    settings: Settings,
    store: Rc<dyn DocumentStore>,
    registry: ComponentRegistry,
    mounts: MountTracker,
    /// Content digest of each document as last registered.
    digests: RefCell<HashMap<String, String>>,
}

impl Workspace {
    pub fn new(settings: Settings, store: Rc<dyn DocumentStore>) -> Self {
        Self::with_modules(settings, store, HostModules::new())
    }

    /// `modules` are the specifiers snippet imports may resolve against.
    pub fn with_modules(settings: Settings, store: Rc<dyn DocumentStore>, modules: HostModules) -> Self {
        let tree = Rc::new(RefCell::new(NamespaceTree::new()));
        let interpreter = Rc::new(Interpreter::new(settings.max_call_depth, modules));
        let evaluator = Rc::new(Evaluator::new(tree.clone(), interpreter));
        let notifier = RefreshNotifier::new(settings.debounce());
        let registry = ComponentRegistry::new(
            tree,
            evaluator.clone(),
            notifier.clone(),
            settings.recompile_policy,
        );
        let mounts = MountTracker::new(evaluator, notifier);

        Self {
            settings,
            store,
            registry,
            mounts,
            digests: RefCell::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn mounts(&self) -> &MountTracker {
        &self.mounts
    }

    pub fn notifier(&self) -> &RefreshNotifier {
        self.registry.notifier()
    }

    /// Subscribes to the process-wide `components-updated` event.
    pub fn on_components_updated(&self, listener: impl FnMut() + 'static) -> SubscriberId {
        let mut listener = listener;
        self.notifier().subscribe(move || {
            listener();
            Subscription::Keep
        })
    }

    fn components_folder(&self) -> Option<String> {
        self.settings.components_folder.as_ref().map(|folder| {
            folder
                .to_string_lossy()
                .replace('\\', "/")
                .trim_matches('/')
                .to_string()
        })
    }

    fn is_whole_file_component(&self, doc: &str) -> bool {
        match self.components_folder() {
            Some(folder) if folder.is_empty() => true,
            Some(folder) => doc.starts_with(&format!("{}/", folder)),
            None => false,
        }
    }

    fn namespace_for(&self, props: &Properties) -> String {
        components_namespace(props)
            .unwrap_or(self.settings.default_namespace.as_str())
            .to_string()
    }

    /// Namespace and document for rendering snippets found in `doc`.
    pub fn render_context(&self, doc: &str) -> Result<RenderContext, HostError> {
        let props = self.store.properties(doc)?;
        Ok(RenderContext::new(&self.namespace_for(&props)).with_document(doc))
    }

    /// Inline snippets of `doc`, ready to attach.
    pub fn inline_snippets(&self, doc: &str) -> Result<Vec<Snippet>, HostError> {
        let text = self.store.read_text(doc)?;
        Ok(extract_snippets(&text)
            .into_iter()
            .filter(|snippet| snippet.kind == SnippetKind::Inline)
            .collect())
    }

    pub async fn attach(&self, source: &str, surface: Rc<dyn RenderSurface>, context: RenderContext) {
        self.mounts.attach(source, surface, context).await;
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Registration
    // ───────────────────────────────────────────────────────────────────────────

    /// Discards every binding and registers all components from scratch,
    /// then fires a single refresh. Returns the number of components compiled.
    pub async fn load(&self) -> Result<usize, HostError> {
        // Listed first so a missing folder aborts before anything is discarded
        let whole_files = match self.components_folder() {
            Some(folder) => self.store.list_documents(&folder)?,
            None => Vec::new(),
        };
        let documents = self.store.list_documents("")?;

        self.registry.rebuild();
        self.digests.borrow_mut().clear();

        let mut compiled = 0;
        for doc in &documents {
            match self.register_document_components(doc, true).await {
                Ok(count) => compiled += count,
                Err(err) => warn!(document = %doc, "{}", err),
            }
        }
        for doc in &whole_files {
            match self.register_whole_file(doc, true).await {
                Ok(count) => compiled += count,
                Err(err) => warn!(document = %doc, "{}", err),
            }
        }

        info!(documents = documents.len(), components = compiled, "workspace loaded");
        self.notifier().notify_now();
        Ok(compiled)
    }

    /// Registers every component defined in `doc`.
    ///
    /// Documents without the `defines-components` marker contribute nothing.
    pub async fn register_document_components(
        &self,
        doc: &str,
        suppress_notification: bool,
    ) -> Result<usize, HostError> {
        let text = self.store.read_text(doc)?;
        self.remember(doc, &text);

        let (props, _) = parse_frontmatter(&text);
        if !defines_components(&props) {
            return Ok(0);
        }

        let namespace = self.namespace_for(&props);
        let mut compiled = 0;
        for snippet in extract_snippets(&text) {
            let name = match snippet.name() {
                Some(name) => name,
                None => continue,
            };
            let outcome = self
                .registry
                .register(&snippet.source, name, &namespace, !suppress_notification)
                .await;
            if matches!(outcome, RegistrationOutcome::Compiled { .. }) {
                compiled += 1;
            }
        }
        debug!(document = %doc, namespace = %namespace, compiled, "document registered");
        Ok(compiled)
    }

    /// Registers the whole text of `doc` under its file stem.
    pub async fn register_whole_file(
        &self,
        doc: &str,
        suppress_notification: bool,
    ) -> Result<usize, HostError> {
        let text = self.store.read_text(doc)?;
        self.remember(doc, &text);

        let name = document_stem(doc).unwrap_or_default();
        let outcome = self
            .registry
            .register(
                strip_frontmatter(&text),
                name,
                &self.settings.default_namespace,
                !suppress_notification,
            )
            .await;
        Ok(usize::from(matches!(outcome, RegistrationOutcome::Compiled { .. })))
    }

    fn remember(&self, doc: &str, text: &str) {
        self.digests
            .borrow_mut()
            .insert(doc.to_string(), compute_digest(text));
    }

    fn is_unchanged(&self, doc: &str, text: &str) -> bool {
        self.digests.borrow().get(doc) == Some(&compute_digest(text))
    }

    /// Reacts to a host file event. Ignored when auto-refresh is off.
    pub async fn handle_event(&self, event: DocumentEvent) -> Result<(), HostError> {
        if !self.settings.auto_refresh {
            debug!(?event, "auto refresh disabled, ignoring");
            return Ok(());
        }

        let doc = match &event {
            DocumentEvent::Created(doc)
            | DocumentEvent::Modified(doc)
            | DocumentEvent::MetadataChanged(doc) => doc.clone(),
            DocumentEvent::Renamed { from, to } => {
                self.digests.borrow_mut().remove(from);
                to.clone()
            }
        };

        if !is_markdown(&doc) {
            return Err(HostError::NotMarkdown(doc));
        }

        let text = self.store.read_text(&doc)?;
        if self.is_unchanged(&doc, &text) {
            debug!(document = %doc, "content unchanged");
            return Ok(());
        }

        self.register_document_components(&doc, false).await?;
        if self.is_whole_file_component(&doc) {
            self.register_whole_file(&doc, false).await?;
        }
        Ok(())
    }
}
