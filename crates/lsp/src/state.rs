// ==============================================================================
// Open documents
// ==============================================================================
//
// Each open document is parsed and scoped once per version. Requests take an
// `Arc` snapshot of the analysis, so an edit arriving mid-request replaces the
// stored entry without touching the snapshot in use.

use std::collections::HashMap;
use std::sync::Arc;

use lang_env::DocumentEnv;
use parking_lot::Mutex;
use tower_lsp::lsp_types::Url;

use crate::convert::LineIndex;

/// Analysis output for one version of a document.
pub struct DocumentAnalysis {
    pub version: i32,
    pub text: String,
    pub line_index: LineIndex,
    /// Cached parse result. Call `.tree()` to get an rnix::Root.
    /// The Parse (green tree) is Send; rnix::Root is not.
    pub parsed: rnix::Parse<rnix::Root>,
    pub env: DocumentEnv,
}

impl DocumentAnalysis {
    pub fn new(text: String, version: i32) -> Self {
        let line_index = LineIndex::new(&text);
        let parsed = rnix::Root::parse(&text);
        let env = DocumentEnv::build(&parsed.tree());
        Self {
            version,
            text,
            line_index,
            parsed,
            env,
        }
    }

    pub fn root(&self) -> rnix::Root {
        self.parsed.tree()
    }
}

#[derive(Default)]
pub struct DocumentStore {
    docs: Mutex<HashMap<Url, Arc<DocumentAnalysis>>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze `text` and make it the current version of `uri`, unless a
    /// newer version was stored in the meantime. Returns the stored entry.
    pub fn update(&self, uri: Url, text: String, version: i32) -> Arc<DocumentAnalysis> {
        // Analyze outside the lock.
        let analysis = Arc::new(DocumentAnalysis::new(text, version));
        log::debug!(
            "{uri} v{version}: {} envs, {} parse errors",
            analysis.env.len(),
            analysis.parsed.errors().len()
        );

        let mut docs = self.docs.lock();
        if let Some(current) = docs.get(&uri) {
            if current.version > version {
                log::debug!("{uri}: dropping v{version}, v{} is newer", current.version);
                return Arc::clone(current);
            }
        }
        docs.insert(uri, Arc::clone(&analysis));
        analysis
    }

    pub fn get(&self, uri: &Url) -> Option<Arc<DocumentAnalysis>> {
        self.docs.lock().get(uri).cloned()
    }

    pub fn remove(&self, uri: &Url) -> bool {
        self.docs.lock().remove(uri).is_some()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowan::ast::AstNode;

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///workspace/{name}")).unwrap()
    }

    #[test]
    fn snapshots_survive_edits() {
        let store = DocumentStore::new();
        store.update(uri("a.nix"), "let x = 1; in x".into(), 1);
        let snapshot = store.get(&uri("a.nix")).unwrap();

        store.update(uri("a.nix"), "let y = 2; in y".into(), 2);
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.text, "let x = 1; in x");
        assert_eq!(store.get(&uri("a.nix")).unwrap().version, 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn stale_versions_are_dropped() {
        let store = DocumentStore::new();
        store.update(uri("a.nix"), "let new = 1; in new".into(), 3);
        let kept = store.update(uri("a.nix"), "let old = 1; in old".into(), 2);
        assert_eq!(kept.version, 3);
        assert_eq!(store.get(&uri("a.nix")).unwrap().text, "let new = 1; in new");

        // A reopened document starts over.
        store.remove(&uri("a.nix"));
        store.update(uri("a.nix"), "1".into(), 1);
        assert_eq!(store.get(&uri("a.nix")).unwrap().version, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn updates_run_on_the_blocking_pool() {
        let store = Arc::new(DocumentStore::new());
        let handles: Vec<_> = (1..=4)
            .map(|version| {
                let store = Arc::clone(&store);
                tokio::task::spawn_blocking(move || {
                    store.update(uri("a.nix"), format!("let v{version} = 1; in v"), version)
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        let latest = store.get(&uri("a.nix")).unwrap();
        assert_eq!(latest.version, 4);
        assert_eq!(latest.text, "let v4 = 1; in v");
    }

    #[test]
    fn remove_forgets_the_document() {
        let store = DocumentStore::new();
        store.update(uri("a.nix"), "1".into(), 1);
        assert!(store.remove(&uri("a.nix")));
        assert!(!store.remove(&uri("a.nix")));
        assert!(store.get(&uri("a.nix")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn analysis_builds_scopes() {
        let doc = DocumentAnalysis::new("let x = 1; in rec { y = x; }".into(), 3);
        // Builtins, the let, and the rec set.
        assert_eq!(doc.env.len(), 3);
        assert!(doc.parsed.errors().is_empty());
        assert_eq!(doc.root().syntax().to_string(), doc.text);
    }
}
