// ==============================================================================
// E2E LSP Test Harness
// ==============================================================================
//
// Exercises the full tower-lsp `Service` pipeline in-process: real
// `LanguageServer` trait impl, real document store, real blocking-pool
// dispatch, and a fake evaluator behind the `AttrSetChannel` seam, without
// any transport/framing overhead.
//
// `LspService::new()` returns `(LspService<S>, ClientSocket)`:
// - `LspService` implements `tower::Service<Request>`: we send JSON-RPC
//   requests to it directly.
// - `ClientSocket` implements `Stream<Item = Request>`: server-to-client
//   notifications (like `window/logMessage`) appear here.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::{Service, ServiceExt};
use tower_lsp::jsonrpc::{self, Request, Response};
use tower_lsp::lsp_types::*;
use tower_lsp::LspService;

use nixcomp_lsp::convert::LineIndex;
use nixcomp_lsp::evaluator::AttrSetChannel;
use nixcomp_lsp::server::CompletionServer;
use nixcomp_lsp::test_util::parse_markers;

/// Default timeout for waiting on notifications.
pub const TIMEOUT: Duration = Duration::from_secs(5);

#[allow(dead_code)]
pub struct LspTestHarness {
    service: LspService<CompletionServer>,
    /// Buffered server→client notifications, drained by a background task.
    notif_rx: mpsc::UnboundedReceiver<Request>,
    next_id: AtomicI64,
    /// Current text and version of each open document.
    texts: HashMap<String, (String, i32)>,
    pub capabilities: ServerCapabilities,
}

pub fn uri(name: &str) -> Url {
    Url::parse(&format!("file:///workspace/{name}")).unwrap()
}

#[allow(dead_code)]
impl LspTestHarness {
    pub async fn new(evaluator: Option<Arc<dyn AttrSetChannel>>) -> Self {
        Self::with_options(evaluator, json!({})).await
    }

    /// Create a harness, passing `init_options` as `initializationOptions`.
    pub async fn with_options(
        evaluator: Option<Arc<dyn AttrSetChannel>>,
        init_options: Value,
    ) -> Self {
        let (service, client_socket) =
            LspService::new(|client| CompletionServer::new(client, evaluator));

        // Spawn a background task to continuously drain the ClientSocket
        // stream into an unbounded channel. Without this, `Client::log_message()`
        // blocks on the internal mpsc(1) channel after the first notification.
        let (notif_tx, notif_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = client_socket;
            while let Some(msg) = stream.next().await {
                let _ = notif_tx.send(msg);
            }
        });

        let mut harness = LspTestHarness {
            service,
            notif_rx,
            next_id: AtomicI64::new(1),
            texts: HashMap::new(),
            capabilities: ServerCapabilities::default(),
        };

        // Send initialize + initialized to get the server running.
        let init_request = Request::build("initialize")
            .params(json!({
                "capabilities": {},
                "rootUri": "file:///workspace",
                "initializationOptions": init_options,
            }))
            .id(harness.next_id())
            .finish();

        let resp = harness
            .send_request(init_request)
            .await
            .expect("initialize must reply");
        let (_id, result) = resp.into_parts();
        let init: InitializeResult =
            serde_json::from_value(result.expect("initialize failed")).unwrap();
        harness.capabilities = init.capabilities;

        let initialized = Request::build("initialized").params(json!({})).finish();
        harness.send_notification(initialized).await;

        harness
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Low-level: send a JSON-RPC request and return the response.
    async fn send_request(&mut self, req: Request) -> Option<Response> {
        self.service
            .ready()
            .await
            .expect("service not ready")
            .call(req)
            .await
            .expect("service call failed")
    }

    /// Low-level: send a JSON-RPC notification (no response expected).
    async fn send_notification(&mut self, notif: Request) {
        let _ = self.service.ready().await.unwrap().call(notif).await;
    }

    async fn request_value(
        &mut self,
        method: &'static str,
        params: Value,
    ) -> Result<Value, jsonrpc::Error> {
        let req = Request::build(method)
            .params(params)
            .id(self.next_id())
            .finish();
        let resp = self.send_request(req).await.expect("request must reply");
        let (_id, result) = resp.into_parts();
        result
    }

    // ==========================================================================
    // Document lifecycle
    // ==========================================================================

    pub async fn open(&mut self, name: &str, text: &str) {
        self.texts.insert(name.to_string(), (text.to_string(), 1));

        let notif = Request::build("textDocument/didOpen")
            .params(json!({
                "textDocument": {
                    "uri": uri(name).as_str(),
                    "languageId": "nix",
                    "version": 1,
                    "text": text,
                }
            }))
            .finish();

        self.send_notification(notif).await;
    }

    /// Send a full-text change for a file.
    pub async fn edit(&mut self, name: &str, new_text: &str) {
        let version = self.texts.get(name).map_or(1, |(_, v)| v + 1);
        self.texts
            .insert(name.to_string(), (new_text.to_string(), version));

        let notif = Request::build("textDocument/didChange")
            .params(json!({
                "textDocument": { "uri": uri(name).as_str(), "version": version },
                "contentChanges": [{ "text": new_text }]
            }))
            .finish();

        self.send_notification(notif).await;
    }

    pub async fn close(&mut self, name: &str) {
        let notif = Request::build("textDocument/didClose")
            .params(json!({
                "textDocument": { "uri": uri(name).as_str() }
            }))
            .finish();

        self.send_notification(notif).await;
    }

    pub async fn change_configuration(&mut self, settings: Value) {
        let notif = Request::build("workspace/didChangeConfiguration")
            .params(json!({ "settings": settings }))
            .finish();
        self.send_notification(notif).await;
    }

    // ==========================================================================
    // LSP requests
    // ==========================================================================

    pub async fn complete(
        &mut self,
        name: &str,
        pos: Position,
    ) -> Result<CompletionList, jsonrpc::Error> {
        let value = self
            .request_value("textDocument/completion", completion_params(name, pos))
            .await?;
        Ok(into_list(value))
    }

    /// Complete at marker `^N` of an open document.
    pub async fn complete_at(
        &mut self,
        name: &str,
        marker: u32,
    ) -> Result<CompletionList, jsonrpc::Error> {
        let pos = self.markers(name)[&marker];
        self.complete(name, pos).await
    }

    /// Issue all completion requests before awaiting any of them.
    pub async fn complete_concurrently(
        &mut self,
        requests: &[(&str, Position)],
    ) -> Vec<Result<CompletionList, jsonrpc::Error>> {
        let mut calls = Vec::new();
        for (name, pos) in requests {
            let req = Request::build("textDocument/completion")
                .params(completion_params(name, *pos))
                .id(self.next_id())
                .finish();
            let service = self.service.ready().await.expect("service not ready");
            calls.push(service.call(req));
        }

        futures::future::join_all(calls)
            .await
            .into_iter()
            .map(|resp| {
                let resp = resp.expect("service call failed").expect("request must reply");
                let (_id, result) = resp.into_parts();
                result.map(into_list)
            })
            .collect()
    }

    pub async fn resolve(&mut self, item: CompletionItem) -> Result<CompletionItem, jsonrpc::Error> {
        let params = serde_json::to_value(item).unwrap();
        let value = self.request_value("completionItem/resolve", params).await?;
        Ok(serde_json::from_value(value).unwrap())
    }

    // ==========================================================================
    // Notifications
    // ==========================================================================

    /// Wait for a `window/logMessage` whose text contains `needle`. Skips
    /// other notifications. Returns `None` on timeout.
    pub async fn wait_for_log_message(&mut self, needle: &str, timeout: Duration) -> Option<String> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match tokio::time::timeout_at(deadline, self.notif_rx.recv()).await {
                Ok(Some(msg)) => {
                    if msg.method() == "window/logMessage" {
                        if let Some(params) = msg.params() {
                            if let Ok(params) =
                                serde_json::from_value::<LogMessageParams>(params.clone())
                            {
                                if params.message.contains(needle) {
                                    return Some(params.message);
                                }
                            }
                        }
                    }
                }
                Ok(None) => return None, // Channel closed.
                Err(_) => return None,   // Timeout.
            }
        }
    }

    // ==========================================================================
    // Markers
    // ==========================================================================

    /// Parse `# ^<num>` markers from an open document and return
    /// `BTreeMap<u32, Position>`.
    pub fn markers(&self, name: &str) -> BTreeMap<u32, Position> {
        let (text, _) = self.texts.get(name).expect("document not opened");
        let byte_offsets = parse_markers(text);
        let line_index = LineIndex::new(text);

        byte_offsets
            .into_iter()
            .map(|(id, offset)| (id, line_index.position(offset)))
            .collect()
    }

    // ==========================================================================
    // Shutdown
    // ==========================================================================

    /// Send shutdown + exit. Call this at the end of each test for clean
    /// teardown (avoids "server not shut down" warnings).
    pub async fn shutdown(&mut self) {
        let shutdown = Request::build("shutdown").id(self.next_id()).finish();
        self.send_request(shutdown).await;

        let exit = Request::build("exit").finish();
        // After exit, service may return ExitedError; that's fine.
        let _ = self.service.call(exit).await;
    }
}

fn completion_params(name: &str, pos: Position) -> Value {
    json!({
        "textDocument": { "uri": uri(name).as_str() },
        "position": { "line": pos.line, "character": pos.character }
    })
}

fn into_list(value: Value) -> CompletionList {
    match serde_json::from_value::<CompletionResponse>(value).unwrap() {
        CompletionResponse::List(list) => list,
        CompletionResponse::Array(items) => CompletionList {
            is_incomplete: false,
            items,
        },
    }
}

#[allow(dead_code)]
pub fn labels(list: &CompletionList) -> Vec<&str> {
    list.items.iter().map(|i| i.label.as_str()).collect()
}
