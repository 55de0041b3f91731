//! Live render targets and their re-render on refresh.
//!
//! Every attached surface is subscribed to the refresh notifier. A surface that
//! has left the visible document is dropped the next time a refresh arrives, or
//! by an explicit [`MountTracker::sweep_detached`].

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

use crate::error::ComponentError;
use crate::evaluator::Evaluator;
use crate::namespace::{normalize_path, GLOBAL_NAMESPACE};
use crate::refresh::{RefreshNotifier, SubscriberId, Subscription};
use crate::render::{render, RenderNode};
use crate::transform::{to_executable, wrap_for_inline_use};

/// Label used for failures of inline snippets.
pub const INLINE_LABEL: &str = "inline";

pub type SurfaceId = u64;

/// A host-owned place a rendering can be put into.
pub trait RenderSurface {
    fn id(&self) -> SurfaceId;

    /// False once the surface is no longer part of the visible document.
    fn is_attached(&self) -> bool;

    fn render(&self, node: RenderNode);

    /// Tears down whatever is currently rendered.
    fn clear(&self);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    pub namespace: String,
    /// Document the snippet came from, for diagnostics.
    pub document: Option<String>,
}

impl RenderContext {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            document: None,
        }
    }

    pub fn with_document(mut self, document: &str) -> Self {
        self.document = Some(document.to_string());
        self
    }
}

struct MountPoint {
    surface: Rc<dyn RenderSurface>,
    source: String,
    context: RenderContext,
    subscription: SubscriberId,
}

#[derive(Default)]
struct MountState {
    live: HashSet<SurfaceId>,
    mounts: HashMap<SurfaceId, MountPoint>,
}

impl MountState {
    fn forget(&mut self, id: SurfaceId) -> Option<MountPoint> {
        self.live.remove(&id);
        self.mounts.remove(&id)
    }
}

/// Evaluates inline-use `source` in `namespace` and renders the result.
pub async fn render_source(evaluator: &Evaluator, source: &str, namespace: &str) -> RenderNode {
    let mut namespace = normalize_path(namespace);
    if namespace.is_empty() {
        namespace = GLOBAL_NAMESPACE.to_string();
    }

    let wrapped = wrap_for_inline_use(source, &evaluator.scope(&namespace));
    let result = match to_executable(&wrapped) {
        Ok(executable) => {
            evaluator
                .evaluate(&executable, &namespace, INLINE_LABEL)
                .await
        }
        Err(err) => Err(err),
    };

    match result {
        Ok(value) => render(evaluator.interpreter(), &value),
        Err(err) => {
            let error = ComponentError::from_eval(INLINE_LABEL, &err);
            warn!(namespace = %namespace, code = error.code(), "{}", error);
            RenderNode::from_error(&error)
        }
    }
}

/// Evaluate first, then replace the surface's content in one step.
async fn refresh_surface(
    evaluator: &Evaluator,
    surface: &dyn RenderSurface,
    source: &str,
    context: &RenderContext,
) {
    let node = render_source(evaluator, source, &context.namespace).await;
    surface.clear();
    surface.render(node);
}

pub struct MountTracker {
    evaluator: Rc<Evaluator>,
    notifier: RefreshNotifier,
    state: Rc<RefCell<MountState>>,
}

impl MountTracker {
    pub fn new(evaluator: Rc<Evaluator>, notifier: RefreshNotifier) -> Self {
        Self {
            evaluator,
            notifier,
            state: Rc::new(RefCell::new(MountState::default())),
        }
    }

    pub fn live_count(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn is_live(&self, id: SurfaceId) -> bool {
        self.state.borrow().live.contains(&id)
    }

    /// Renders `source` into `surface` and keeps it live across refreshes.
    ///
    /// Re-attaching a tracked surface replaces its source and context.
    /// Must run inside a `LocalSet`: refreshes re-render on spawned tasks.
    pub async fn attach(
        &self,
        source: &str,
        surface: Rc<dyn RenderSurface>,
        context: RenderContext,
    ) {
        let id = surface.id();
        if let Some(previous) = self.state.borrow_mut().forget(id) {
            self.notifier.unsubscribe(previous.subscription);
        }

        refresh_surface(&self.evaluator, surface.as_ref(), source, &context).await;

        let subscription = self.notifier.subscribe(mount_subscriber(
            Rc::downgrade(&self.state),
            self.evaluator.clone(),
            surface.clone(),
        ));
        debug!(surface = id, namespace = %context.namespace, "surface attached");

        let mut state = self.state.borrow_mut();
        state.live.insert(id);
        state.mounts.insert(
            id,
            MountPoint {
                surface,
                source: source.to_string(),
                context,
                subscription,
            },
        );
    }

    /// Tears down and forgets every surface that is no longer attached.
    pub fn sweep_detached(&self) -> usize {
        let detached: Vec<MountPoint> = {
            let mut state = self.state.borrow_mut();
            let ids: Vec<SurfaceId> = state
                .mounts
                .iter()
                .filter(|(_, mount)| !mount.surface.is_attached())
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter().filter_map(|id| state.forget(id)).collect()
        };

        for mount in &detached {
            self.notifier.unsubscribe(mount.subscription);
            mount.surface.clear();
            debug!(surface = mount.surface.id(), "detached surface swept");
        }
        detached.len()
    }
}

fn mount_subscriber(
    state: Weak<RefCell<MountState>>,
    evaluator: Rc<Evaluator>,
    surface: Rc<dyn RenderSurface>,
) -> impl FnMut() -> Subscription {
    move || {
        let id = surface.id();
        let state = match state.upgrade() {
            Some(state) => state,
            None => return Subscription::Cancel,
        };

        if !surface.is_attached() {
            state.borrow_mut().forget(id);
            debug!(surface = id, "surface left the document, unsubscribing");
            return Subscription::Cancel;
        }

        let evaluator = evaluator.clone();
        let surface = surface.clone();
        tokio::task::spawn_local(async move {
            // Source and context are read when the re-render starts
            let current = state
                .borrow()
                .mounts
                .get(&id)
                .map(|mount| (mount.source.clone(), mount.context.clone()));
            if let Some((source, context)) = current {
                refresh_surface(&evaluator, surface.as_ref(), &source, &context).await;
            }
        });
        Subscription::Keep
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDING SURFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory surface that records what was rendered into it.
#[derive(Default)]
pub struct RecordingSurface {
    id: SurfaceId,
    attached: Cell<bool>,
    current: RefCell<Option<RenderNode>>,
    renders: Cell<usize>,
    clears: Cell<usize>,
}

impl RecordingSurface {
    pub fn new(id: SurfaceId) -> Rc<Self> {
        Rc::new(Self {
            id,
            attached: Cell::new(true),
            ..Self::default()
        })
    }

    pub fn detach(&self) {
        self.attached.set(false);
    }

    pub fn current(&self) -> Option<RenderNode> {
        self.current.borrow().clone()
    }

    pub fn html(&self) -> String {
        self.current
            .borrow()
            .as_ref()
            .map(RenderNode::to_html)
            .unwrap_or_default()
    }

    pub fn render_count(&self) -> usize {
        self.renders.get()
    }

    pub fn clear_count(&self) -> usize {
        self.clears.get()
    }
}

impl RenderSurface for RecordingSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn is_attached(&self) -> bool {
        self.attached.get()
    }

    fn render(&self, node: RenderNode) {
        let mut current = self.current.borrow_mut();
        debug_assert!(current.is_none(), "overlapping renderings");
        *current = Some(node);
        self.renders.set(self.renders.get() + 1);
    }

    fn clear(&self) {
        self.current.borrow_mut().take();
        self.clears.set(self.clears.get() + 1);
    }
}
