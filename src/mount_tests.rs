use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;
use tokio::time::advance;

use crate::evaluator::Evaluator;
use crate::interpreter::Interpreter;
use crate::mount::{MountTracker, RecordingSurface, RenderContext, INLINE_LABEL};
use crate::namespace::NamespaceTree;
use crate::refresh::RefreshNotifier;
use crate::registry::ComponentRegistry;
use crate::render::RenderNode;
use crate::settings::RecompilePolicy;

const WINDOW: Duration = Duration::from_millis(100);

fn setup() -> (ComponentRegistry, MountTracker) {
    let tree = Rc::new(RefCell::new(NamespaceTree::new()));
    let evaluator = Rc::new(Evaluator::new(tree.clone(), Rc::new(Interpreter::default())));
    let notifier = RefreshNotifier::new(WINDOW);
    let tracker = MountTracker::new(evaluator.clone(), notifier.clone());
    let registry = ComponentRegistry::new(tree, evaluator, notifier, RecompilePolicy::All);
    (registry, tracker)
}

fn global() -> RenderContext {
    RenderContext::new("Global")
}

async fn quiesce() {
    advance(WINDOW + Duration::from_millis(10)).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_attach_renders_immediately() {
    LocalSet::new()
        .run_until(async {
            let (registry, tracker) = setup();
            registry
                .register_component("<span>hi</span>", "Foo", "Global")
                .await;

            let surface = RecordingSurface::new(1);
            tracker.attach("<Foo />", surface.clone(), global()).await;
            assert_eq!(surface.html(), "<span>hi</span>");
            assert_eq!(surface.render_count(), 1);
            assert!(tracker.is_live(1));
            assert_eq!(tracker.live_count(), 1);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_bare_name_renders_like_the_component() {
    LocalSet::new()
        .run_until(async {
            let (registry, tracker) = setup();
            registry
                .register_component("<span>hi</span>", "Foo", "Global")
                .await;

            let by_name = RecordingSurface::new(1);
            let by_tag = RecordingSurface::new(2);
            tracker.attach("Foo", by_name.clone(), global()).await;
            tracker.attach("<Foo />", by_tag.clone(), global()).await;
            assert_eq!(by_name.html(), "<span>hi</span>");
            assert_eq!(by_name.html(), by_tag.html());
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_refresh_rerenders_with_new_source() {
    LocalSet::new()
        .run_until(async {
            let (registry, tracker) = setup();
            registry
                .register_component("<span>hi</span>", "Foo", "Global")
                .await;
            quiesce().await;

            let surface = RecordingSurface::new(7);
            tracker.attach("<div><Foo /></div>", surface.clone(), global()).await;
            assert_eq!(surface.html(), "<div><span>hi</span></div>");

            registry
                .register_component("<span>bye</span>", "Foo", "Global")
                .await;
            // Nothing changes until the refresh fires
            assert_eq!(surface.html(), "<div><span>hi</span></div>");

            quiesce().await;
            assert_eq!(surface.html(), "<div><span>bye</span></div>");
            assert_eq!(surface.render_count(), 2);
            // Each rendering is torn down before the next
            assert_eq!(surface.clear_count(), 2);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_detached_surface_unsubscribes_on_refresh() {
    LocalSet::new()
        .run_until(async {
            let (registry, tracker) = setup();
            registry.register_component("<i>a</i>", "Foo", "Global").await;
            quiesce().await;

            let surface = RecordingSurface::new(3);
            tracker.attach("<Foo />", surface.clone(), global()).await;
            assert_eq!(registry.notifier().subscriber_count(), 1);

            surface.detach();
            registry.register_component("<i>b</i>", "Foo", "Global").await;
            quiesce().await;

            assert!(!tracker.is_live(3));
            assert_eq!(tracker.live_count(), 0);
            assert_eq!(registry.notifier().subscriber_count(), 0);
            assert_eq!(surface.render_count(), 1);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_sweep_forgets_detached_surfaces() {
    LocalSet::new()
        .run_until(async {
            let (registry, tracker) = setup();
            registry.register_component("<i>a</i>", "Foo", "Global").await;

            let kept = RecordingSurface::new(1);
            let gone = RecordingSurface::new(2);
            tracker.attach("<Foo />", kept.clone(), global()).await;
            tracker.attach("<Foo />", gone.clone(), global()).await;
            gone.detach();

            assert_eq!(tracker.sweep_detached(), 1);
            assert_eq!(tracker.live_count(), 1);
            assert!(tracker.is_live(1));
            assert!(gone.current().is_none());
            assert_eq!(registry.notifier().subscriber_count(), 1);
            assert_eq!(tracker.sweep_detached(), 0);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_reattach_replaces_the_mount() {
    LocalSet::new()
        .run_until(async {
            let (registry, tracker) = setup();
            let surface = RecordingSurface::new(5);
            tracker.attach("<b>first</b>", surface.clone(), global()).await;
            tracker.attach("<b>second</b>", surface.clone(), global()).await;

            assert_eq!(tracker.live_count(), 1);
            assert_eq!(registry.notifier().subscriber_count(), 1);
            assert_eq!(surface.html(), "<b>second</b>");
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_inline_failures_render_placeholders() {
    LocalSet::new()
        .run_until(async {
            let (_registry, tracker) = setup();

            let broken = RecordingSurface::new(1);
            tracker.attach("<div>", broken.clone(), global()).await;
            match broken.current() {
                Some(RenderNode::Error { component, .. }) => assert_eq!(component, INLINE_LABEL),
                other => panic!("expected an error node, got {:?}", other),
            }

            let unknown = RecordingSurface::new(2);
            tracker.attach("<Nope />", unknown.clone(), global()).await;
            assert!(unknown.current().map_or(false, |node| node.is_error()));
            assert!(tracker.is_live(2));
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_context_namespace_selects_components() {
    LocalSet::new()
        .run_until(async {
            let (registry, tracker) = setup();
            registry.register_component("<em>x</em>", "Widget", "X.Y").await;

            let inside = RecordingSurface::new(1);
            tracker
                .attach("<Widget />", inside.clone(), RenderContext::new("X.Y"))
                .await;
            assert_eq!(inside.html(), "<em>x</em>");

            let outside = RecordingSurface::new(2);
            tracker.attach("<Widget />", outside.clone(), global()).await;
            assert!(outside.current().map_or(false, |node| node.is_error()));

            let via_path = RecordingSurface::new(3);
            tracker
                .attach("<X.Y.Widget />", via_path.clone(), global())
                .await;
            assert_eq!(via_path.html(), "<em>x</em>");
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_namespace_builtin_reflects_context() {
    LocalSet::new()
        .run_until(async {
            let (_registry, tracker) = setup();
            let surface = RecordingSurface::new(1);
            tracker
                .attach("<p>{namespace}</p>", surface.clone(), RenderContext::new(" Docs . Api "))
                .await;
            assert_eq!(surface.html(), "<p>Docs.Api</p>");
        })
        .await;
}
