//! Document stores: where snippet-bearing markdown comes from.
//!
//! Document ids are `/`-separated paths relative to the store root.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::document::{parse_frontmatter, Properties};
use crate::error::HostError;

pub fn is_markdown(doc: &str) -> bool {
    Path::new(doc)
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("md"))
}

/// File name without extension; the name of a whole-file component.
pub fn document_stem(doc: &str) -> Option<&str> {
    Path::new(doc).file_stem().and_then(|stem| stem.to_str())
}

pub trait DocumentStore {
    fn read_text(&self, doc: &str) -> Result<String, HostError>;

    /// Every markdown document under `folder`, sorted. An empty folder means
    /// the whole store.
    fn list_documents(&self, folder: &str) -> Result<Vec<String>, HostError>;

    fn properties(&self, doc: &str) -> Result<Properties, HostError> {
        let text = self.read_text(doc)?;
        Ok(parse_frontmatter(&text).0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILESYSTEM
// ═══════════════════════════════════════════════════════════════════════════════

pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_id(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

impl DocumentStore for FsDocumentStore {
    fn read_text(&self, doc: &str) -> Result<String, HostError> {
        if !is_markdown(doc) {
            return Err(HostError::NotMarkdown(doc.to_string()));
        }
        let path = self.root.join(doc);
        if !path.is_file() {
            return Err(HostError::DocumentNotFound(doc.to_string()));
        }
        fs::read_to_string(&path).map_err(|source| HostError::Io { path, source })
    }

    fn list_documents(&self, folder: &str) -> Result<Vec<String>, HostError> {
        let dir = self.root.join(folder);
        if !dir.is_dir() {
            return Err(HostError::MissingFolder(dir));
        }

        let mut docs = Vec::new();
        for entry in WalkDir::new(&dir).follow_links(true).into_iter().flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(id) = self.document_id(path) {
                if is_markdown(&id) {
                    docs.push(id);
                }
            }
        }
        docs.sort();
        Ok(docs)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: RefCell<BTreeMap<String, String>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, doc: &str, text: &str) {
        self.docs
            .borrow_mut()
            .insert(doc.to_string(), text.to_string());
    }

    pub fn remove(&self, doc: &str) -> Option<String> {
        self.docs.borrow_mut().remove(doc)
    }

    pub fn rename(&self, from: &str, to: &str) {
        let mut docs = self.docs.borrow_mut();
        if let Some(text) = docs.remove(from) {
            docs.insert(to.to_string(), text);
        }
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn read_text(&self, doc: &str) -> Result<String, HostError> {
        if !is_markdown(doc) {
            return Err(HostError::NotMarkdown(doc.to_string()));
        }
        self.docs
            .borrow()
            .get(doc)
            .cloned()
            .ok_or_else(|| HostError::DocumentNotFound(doc.to_string()))
    }

    fn list_documents(&self, folder: &str) -> Result<Vec<String>, HostError> {
        let folder = folder.trim_matches('/');
        let prefix = format!("{}/", folder);
        let docs = self.docs.borrow();
        let inside: Vec<&String> = docs
            .keys()
            .filter(|doc| folder.is_empty() || doc.starts_with(&prefix))
            .collect();
        if !folder.is_empty() && inside.is_empty() {
            return Err(HostError::MissingFolder(PathBuf::from(folder)));
        }
        Ok(inside
            .into_iter()
            .filter(|doc| is_markdown(doc))
            .cloned()
            .collect())
    }
}
