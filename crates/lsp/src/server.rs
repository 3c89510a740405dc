// ==============================================================================
// tower-lsp LanguageServer implementation
// ==============================================================================
//
// Lifecycle (initialize/shutdown), document sync and completion dispatch.
// Documents are re-analyzed on every didOpen/didChange (full sync). The
// handler awaits the analysis, so later requests see the latest text.
//
// Parsing, completion and resolve all run on tokio's blocking pool via
// spawn_blocking; completion and resolve may also wait on the evaluator.
// The async side never blocks.

use std::sync::Arc;

use parking_lot::Mutex;
use tower_lsp::jsonrpc::{self, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::completion::{self, CompletionError};
use crate::config::ServerConfig;
use crate::evaluator::AttrSetChannel;
use crate::state::DocumentStore;

pub struct CompletionServer {
    client: Client,
    documents: Arc<DocumentStore>,
    config: Mutex<ServerConfig>,
    /// `None` when no evaluator was configured: local completions only.
    evaluator: Option<Arc<dyn AttrSetChannel>>,
}

impl CompletionServer {
    pub fn new(client: Client, evaluator: Option<Arc<dyn AttrSetChannel>>) -> Self {
        Self {
            client,
            documents: Arc::new(DocumentStore::new()),
            config: Mutex::new(ServerConfig::default()),
            evaluator,
        }
    }

    /// Parse and scope `text` off the async side and store it as `uri`.
    async fn analyze(&self, uri: Url, text: String, version: i32) {
        let documents = Arc::clone(&self.documents);
        let result = run_on_pool(move || {
            documents.update(uri, text, version);
            Ok(())
        })
        .await;
        if let Err(e) = result {
            log::error!("document analysis failed: {}", e.message);
        }
    }

    /// Point the evaluator at the package-set expression. Fire and forget:
    /// the outcome is only logged.
    fn load_package_set(&self, expr: String) {
        let Some(evaluator) = &self.evaluator else {
            return;
        };
        log::debug!("evalExpr: {expr}");
        evaluator.eval_expr(
            expr.clone(),
            Box::new(move |result| match result {
                Ok(()) => log::info!("evaluator loaded `{expr}`"),
                Err(e) => log::error!("evaluator failed to load `{expr}`: {e}"),
            }),
        );
    }
}

/// Run `f` on the blocking pool. A panicked or cancelled task becomes an
/// internal error.
async fn run_on_pool<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => {
            log::error!("blocking task failed: {e}");
            Err(jsonrpc::Error::internal_error())
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for CompletionServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        if let Some(ref info) = params.client_info {
            log::info!(
                "Client: {}{}",
                info.name,
                info.version
                    .as_deref()
                    .map_or(String::new(), |v| format!(" v{v}")),
            );
        }

        // Parse editor-provided settings from initializationOptions.
        if let Some(opts) = params.initialization_options {
            match serde_json::from_value::<ServerConfig>(opts) {
                Ok(init_config) => *self.config.lock() = init_config,
                Err(e) => log::warn!("Failed to parse initializationOptions: {e}"),
            }
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    // Full document sync: the editor sends the entire file on each change.
                    TextDocumentSyncKind::FULL,
                )),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![".".to_string()]),
                    resolve_provider: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "nixcomp-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let (expr, max_items) = {
            let config = self.config.lock();
            (config.nixpkgs.expr.clone(), config.completion.max_items)
        };
        let msg = match self.evaluator {
            Some(_) => format!("nixcomp-lsp ready, package set `{expr}`, max {max_items} items"),
            None => format!("nixcomp-lsp ready, no evaluator, max {max_items} items"),
        };
        log::info!("{msg}");
        self.client.log_message(MessageType::INFO, msg).await;

        self.load_package_set(expr);
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        self.analyze(doc.uri, doc.text, doc.version).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        // With FULL sync, the last content change holds the full text.
        if let Some(change) = params.content_changes.into_iter().last() {
            self.analyze(
                params.text_document.uri,
                change.text,
                params.text_document.version,
            )
            .await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.documents.remove(&params.text_document.uri);
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let new_config = match serde_json::from_value::<ServerConfig>(params.settings) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Failed to parse configuration: {e}");
                return;
            }
        };

        let expr_changed = {
            let mut config = self.config.lock();
            let changed = config.nixpkgs.expr != new_config.nixpkgs.expr;
            *config = new_config.clone();
            changed
        };

        if expr_changed {
            self.client
                .log_message(
                    MessageType::INFO,
                    format!("package set changed to `{}`", new_config.nixpkgs.expr),
                )
                .await;
            self.load_package_set(new_config.nixpkgs.expr);
        }
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let pos = params.text_document_position.position;

        let doc = self
            .documents
            .get(&uri)
            .ok_or(CompletionError::NotOpen(uri))?;
        let config = self.config.lock().completion.clone();
        let evaluator = self.evaluator.clone();

        let list = run_on_pool(move || {
            completion::complete(&doc, pos, evaluator.as_deref(), &config).map_err(Into::into)
        })
        .await?;
        Ok(Some(CompletionResponse::List(list)))
    }

    async fn completion_resolve(&self, item: CompletionItem) -> Result<CompletionItem> {
        let evaluator = self.evaluator.clone();
        run_on_pool(move || completion::resolve(item, evaluator.as_deref()).map_err(Into::into))
            .await
    }
}
