use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;
use tokio::time::advance;

use crate::discovery::{FsDocumentStore, MemoryDocumentStore};
use crate::document::SnippetKind;
use crate::error::HostError;
use crate::mount::RecordingSurface;
use crate::render::render;
use crate::settings::Settings;
use crate::workspace::{DocumentEvent, Workspace};

const CARDS: &str = "---\ndefines-components: true\ncomponents-namespace: Docs\n---\n\
# Cards\n\n```jsx:component:Card\n<b>card</b>\n```\n\n```jsx:component:Pill\n<i><Card /></i>\n```\n";

const PLAIN: &str = "Some notes.\n\n```jsx:component:Ignored\n<b>x</b>\n```\n\n`jsx:<Card />` and `jsx::Pill hello`\n";

fn settings() -> Settings {
    Settings {
        components_folder: Some(PathBuf::from("components")),
        refresh_debounce_ms: 100,
        ..Settings::default()
    }
}

fn store() -> Rc<MemoryDocumentStore> {
    let store = Rc::new(MemoryDocumentStore::new());
    store.insert("notes/cards.md", CARDS);
    store.insert("notes/plain.md", PLAIN);
    store.insert("components/Badge.md", "<em>badge</em>\n");
    store.insert("components/readme.txt", "not a document");
    store
}

fn html(workspace: &Workspace, path: &str, name: &str) -> String {
    let value = workspace.registry().binding(path, name).expect("component is bound");
    render(workspace.registry().evaluator().interpreter(), &value).to_html()
}

async fn quiesce() {
    advance(Duration::from_millis(110)).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_load_registers_marked_documents_and_whole_files() {
    LocalSet::new()
        .run_until(async {
            let workspace = Workspace::new(settings(), store());
            assert_eq!(workspace.load().await.unwrap(), 3);

            assert_eq!(html(&workspace, "Docs", "Card"), "<b>card</b>");
            assert_eq!(html(&workspace, "Docs", "Pill"), "<i><b>card</b></i>");
            assert_eq!(html(&workspace, "Global", "Badge"), "<em>badge</em>");
            // Unmarked documents contribute nothing
            assert!(workspace.registry().binding("Global", "Ignored").is_none());

            // One notification for the whole load
            assert_eq!(workspace.notifier().fired(), 1);
            assert!(!workspace.notifier().pending());
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_load_discards_previous_bindings() {
    LocalSet::new()
        .run_until(async {
            let workspace = Workspace::new(settings(), store());
            workspace
                .registry()
                .register_component("<b>stale</b>", "Stale", "Global")
                .await;
            workspace.load().await.unwrap();
            assert!(workspace.registry().binding("Global", "Stale").is_none());
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_missing_components_folder_keeps_bindings() {
    LocalSet::new()
        .run_until(async {
            let settings = Settings {
                components_folder: Some(PathBuf::from("nowhere")),
                ..settings()
            };
            let workspace = Workspace::new(settings, store());
            workspace
                .registry()
                .register_component("<b>kept</b>", "Kept", "Global")
                .await;

            let err = workspace.load().await.unwrap_err();
            assert!(matches!(err, HostError::MissingFolder(_)));
            assert_eq!(html(&workspace, "Global", "Kept"), "<b>kept</b>");
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_unchanged_document_is_skipped() {
    LocalSet::new()
        .run_until(async {
            let workspace = Workspace::new(settings(), store());
            workspace.load().await.unwrap();

            workspace
                .handle_event(DocumentEvent::Modified("notes/cards.md".to_string()))
                .await
                .unwrap();
            assert!(!workspace.notifier().pending());
            quiesce().await;
            assert_eq!(workspace.notifier().fired(), 1);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_modified_document_reregisters_and_refreshes_mounts() {
    LocalSet::new()
        .run_until(async {
            let docs = store();
            let workspace = Workspace::new(settings(), docs.clone());
            workspace.load().await.unwrap();

            let context = workspace.render_context("notes/cards.md").unwrap();
            let surface = RecordingSurface::new(1);
            workspace.attach("<Pill />", surface.clone(), context).await;
            assert_eq!(surface.html(), "<i><b>card</b></i>");

            docs.insert("notes/cards.md", &CARDS.replace("<b>card</b>", "<b>CARD</b>"));
            workspace
                .handle_event(DocumentEvent::Modified("notes/cards.md".to_string()))
                .await
                .unwrap();
            assert!(workspace.notifier().pending());

            quiesce().await;
            assert_eq!(workspace.notifier().fired(), 2);
            assert_eq!(surface.html(), "<i><b>CARD</b></i>");
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_whole_file_component_follows_edits_and_renames() {
    LocalSet::new()
        .run_until(async {
            let docs = store();
            let workspace = Workspace::new(settings(), docs.clone());
            workspace.load().await.unwrap();

            docs.insert("components/Badge.md", "---\ntitle: x\n---\n<em>new</em>\n");
            workspace
                .handle_event(DocumentEvent::Modified("components/Badge.md".to_string()))
                .await
                .unwrap();
            assert_eq!(html(&workspace, "Global", "Badge"), "<em>new</em>");

            docs.rename("components/Badge.md", "components/Tag.md");
            workspace
                .handle_event(DocumentEvent::Renamed {
                    from: "components/Badge.md".to_string(),
                    to: "components/Tag.md".to_string(),
                })
                .await
                .unwrap();
            assert_eq!(html(&workspace, "Global", "Tag"), "<em>new</em>");

            // Outside the folder a file is not a component
            docs.insert("notes/Loose.md", "<b>loose</b>");
            workspace
                .handle_event(DocumentEvent::Created("notes/Loose.md".to_string()))
                .await
                .unwrap();
            assert!(workspace.registry().binding("Global", "Loose").is_none());
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_events_ignored_without_auto_refresh() {
    LocalSet::new()
        .run_until(async {
            let settings = Settings {
                auto_refresh: false,
                ..settings()
            };
            let docs = store();
            let workspace = Workspace::new(settings, docs.clone());
            workspace.load().await.unwrap();

            docs.insert("notes/cards.md", &CARDS.replace("card", "changed"));
            workspace
                .handle_event(DocumentEvent::Modified("notes/cards.md".to_string()))
                .await
                .unwrap();
            assert_eq!(html(&workspace, "Docs", "Card"), "<b>card</b>");
            assert!(!workspace.notifier().pending());
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_non_markdown_events_are_rejected() {
    LocalSet::new()
        .run_until(async {
            let workspace = Workspace::new(settings(), store());
            let err = workspace
                .handle_event(DocumentEvent::Created("components/readme.txt".to_string()))
                .await
                .unwrap_err();
            assert!(matches!(err, HostError::NotMarkdown(_)));

            let err = workspace
                .handle_event(DocumentEvent::Modified("notes/gone.md".to_string()))
                .await
                .unwrap_err();
            assert!(matches!(err, HostError::DocumentNotFound(_)));
        })
        .await;
}

#[test]
fn test_render_context_and_inline_snippets() {
    let workspace = Workspace::new(settings(), store());

    let context = workspace.render_context("notes/cards.md").unwrap();
    assert_eq!(context.namespace, "Docs");
    assert_eq!(context.document.as_deref(), Some("notes/cards.md"));
    assert_eq!(workspace.render_context("notes/plain.md").unwrap().namespace, "Global");

    let inline = workspace.inline_snippets("notes/plain.md").unwrap();
    assert_eq!(inline.len(), 2);
    assert!(inline.iter().all(|snippet| snippet.kind == SnippetKind::Inline));
    assert_eq!(inline[0].source, "<Card />");
    assert_eq!(inline[1].source, r#"<Pill src={"hello"} />"#);
}

#[test]
fn test_on_components_updated_listener() {
    let workspace = Workspace::new(settings(), store());
    let calls = Rc::new(std::cell::Cell::new(0));
    let seen = calls.clone();
    workspace.on_components_updated(move || seen.set(seen.get() + 1));
    workspace.notifier().notify_now();
    workspace.notifier().notify_now();
    assert_eq!(calls.get(), 2);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_load_from_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("notes")).unwrap();
    fs::create_dir_all(dir.path().join("components/nested")).unwrap();
    fs::write(dir.path().join("notes/cards.md"), CARDS).unwrap();
    fs::write(dir.path().join("components/nested/Chip.md"), "<u>chip</u>").unwrap();
    fs::write(dir.path().join("components/logo.svg"), "<svg/>").unwrap();

    LocalSet::new()
        .run_until(async {
            let store = Rc::new(FsDocumentStore::new(dir.path()));
            let workspace = Workspace::new(settings(), store);
            assert_eq!(workspace.load().await.unwrap(), 3);
            assert_eq!(html(&workspace, "Global", "Chip"), "<u>chip</u>");
            assert_eq!(html(&workspace, "Docs", "Card"), "<b>card</b>");
        })
        .await;
}
