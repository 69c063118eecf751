//! Reference documents used to enrich oracle prompts.
//!
//! Documents live as JSON files in one directory. The store is optional: when
//! it is not configured, or cannot be read, prompts simply carry no reference
//! material.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// A stored reference document (man page, standard, advisory, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub content: String,
    pub source: String,
    pub doc_type: String,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub metadata: Value,
}

/// Supplies reference snippets for a query. Never fails: problems degrade to
/// an empty list.
pub trait ContextProvider {
    fn context_for(&self, query: &str) -> Vec<String>;
}

/// Provider used when no document store is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContext;

impl ContextProvider for NoContext {
    fn context_for(&self, _query: &str) -> Vec<String> {
        Vec::new()
    }
}

impl<C: ContextProvider + ?Sized> ContextProvider for &C {
    fn context_for(&self, query: &str) -> Vec<String> {
        (**self).context_for(query)
    }
}

impl<C: ContextProvider + ?Sized> ContextProvider for Box<C> {
    fn context_for(&self, query: &str) -> Vec<String> {
        (**self).context_for(query)
    }
}

/// Directory-backed document store.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    dir: PathBuf,
    max_snippets: usize,
    snippet_chars: usize,
}

impl DocumentStore {
    pub fn new(dir: impl Into<PathBuf>, max_snippets: usize, snippet_chars: usize) -> Self {
        Self {
            dir: dir.into(),
            max_snippets,
            snippet_chars,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load every `*.json` document, optionally filtered by `doc_type`.
    ///
    /// Files that do not parse as documents are skipped with a warning.
    pub fn list(&self, doc_type: Option<&str>) -> Result<Vec<Document>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)
            .with_context(|| format!("read document dir {}", self.dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut documents = Vec::new();
        for path in paths {
            match load_document(&path) {
                Ok(doc) => {
                    if doc_type.is_none_or(|wanted| doc.doc_type == wanted) {
                        documents.push(doc);
                    }
                }
                Err(err) => warn!(path = %path.display(), err = %err, "skipping document"),
            }
        }
        Ok(documents)
    }

    /// Rank documents by how many query terms appear in their title or content.
    ///
    /// Terms shorter than three characters are ignored. Ties keep file order.
    pub fn search(
        &self,
        query: &str,
        doc_type: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<Document>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let mut scored: Vec<(usize, Document)> = self
            .list(doc_type)?
            .into_iter()
            .filter_map(|doc| {
                let haystack = format!("{}\n{}", doc.title, doc.content).to_lowercase();
                let score = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
                (score > 0).then_some((score, doc))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(max_results)
            .map(|(_, doc)| doc)
            .collect())
    }

    /// Save a document as `<doc_type>_<title>.json`, returning its path.
    pub fn save(&self, document: &Document) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create document dir {}", self.dir.display()))?;
        let slug: String = document
            .title
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .take(50)
            .collect();
        let path = self.dir.join(format!("{}_{}.json", document.doc_type, slug));
        let mut buf = serde_json::to_string_pretty(document).context("serialize document")?;
        buf.push('\n');
        fs::write(&path, buf).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

impl ContextProvider for DocumentStore {
    fn context_for(&self, query: &str) -> Vec<String> {
        match self.search(query, None, self.max_snippets) {
            Ok(docs) => {
                debug!(query, matches = docs.len(), "reference documents matched");
                docs.iter()
                    .map(|doc| render_snippet(doc, self.snippet_chars))
                    .collect()
            }
            Err(err) => {
                warn!(err = %err, "document store unavailable, continuing without references");
                Vec::new()
            }
        }
    }
}

fn load_document(path: &Path) -> Result<Document> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in query
        .split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() >= 3)
    {
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

fn render_snippet(doc: &Document, max_chars: usize) -> String {
    let content = doc.content.trim();
    let body: String = content.chars().take(max_chars).collect();
    let ellipsis = if content.chars().count() > max_chars {
        "\n[...]"
    } else {
        ""
    };
    format!("[{} (source: {})]\n{body}{ellipsis}", doc.title, doc.source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(title: &str, content: &str, doc_type: &str) -> Document {
        Document {
            title: title.to_string(),
            content: content.to_string(),
            source: "local".to_string(),
            doc_type: doc_type.to_string(),
            timestamp: 0.0,
            metadata: Value::Null,
        }
    }

    #[test]
    fn search_ranks_by_matching_terms() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = DocumentStore::new(temp.path(), 3, 200);
        store
            .save(&doc("nmap", "Network exploration tool and port scanner", "kali_tool"))
            .expect("save");
        store
            .save(&doc("nikto", "Web server scanner for the http port", "kali_tool"))
            .expect("save");
        store
            .save(&doc("AC-2", "Account management", "nist"))
            .expect("save");

        let found = store
            .search("scan web port on target", None, 5)
            .expect("search");
        let titles: Vec<&str> = found.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["nikto", "nmap"]);

        let nist = store.search("account", Some("nist"), 5).expect("search");
        assert_eq!(nist.len(), 1);
    }

    #[test]
    fn context_for_renders_bounded_snippets() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = DocumentStore::new(temp.path(), 1, 10);
        store
            .save(&doc("hydra", "Parallelized login cracker supporting many protocols", "kali_tool"))
            .expect("save");

        let snippets = store.context_for("login brute force");
        assert_eq!(snippets.len(), 1);
        assert!(snippets[0].starts_with("[hydra (source: local)]"));
        assert!(snippets[0].ends_with("[...]"));
    }

    #[test]
    fn missing_directory_yields_no_context() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = DocumentStore::new(temp.path().join("absent"), 3, 100);
        assert!(store.context_for("anything at all").is_empty());
        assert!(NoContext.context_for("anything").is_empty());
    }

    #[test]
    fn unparseable_files_are_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("broken.json"), "not json").expect("write");
        let store = DocumentStore::new(temp.path(), 3, 100);
        store
            .save(&doc("smbclient", "SMB share access", "kali_tool"))
            .expect("save");
        assert_eq!(store.list(None).expect("list").len(), 1);
    }
}
