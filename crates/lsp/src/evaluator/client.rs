// ==============================================================================
// AttrSetClient: JSON-RPC client for the evaluator process
// ==============================================================================
//
// Messages use LSP-style `Content-Length` framing over the child's stdio.
// A writer task drains an unbounded queue; a reader task routes each reply
// to the callback registered under its request id. When the stream closes
// every outstanding callback fails with `EvalError::Exited`.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::process::{Child, Command};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use super::{
    AttrPathCompleteParams, AttrSetChannel, EvalError, PackageDescription, Reply,
    METHOD_ATTRPATH_COMPLETE, METHOD_ATTRPATH_INFO, METHOD_EVAL_EXPR,
};

type Pending = Box<dyn FnOnce(Result<Value, EvalError>) + Send>;

/// Upper bound on one message body; anything larger is a broken stream.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

pub struct AttrSetClient {
    inner: Arc<Inner>,
    /// Killed when the client is dropped.
    child: Option<Mutex<Child>>,
}

struct Inner {
    outgoing: mpsc::UnboundedSender<Value>,
    /// Callbacks are `Send` but not `Sync`; the mutex makes the table shareable.
    pending: DashMap<i64, Mutex<Pending>>,
    next_id: AtomicI64,
    exited: AtomicBool,
    timeout: Option<Duration>,
    runtime: Handle,
}

#[derive(Deserialize)]
struct RpcResponse {
    id: Option<i64>,
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl AttrSetClient {
    /// Start `program` and talk to it over its stdin/stdout. Must be called
    /// from inside a tokio runtime.
    pub fn spawn(program: &Path, args: &[String], timeout: Option<Duration>) -> io::Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("evaluator stdin was not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("evaluator stdout was not captured"))?;

        let mut client = Self::from_streams(stdout, stdin, timeout)?;
        client.child = Some(Mutex::new(child));
        Ok(client)
    }

    /// Run the protocol over arbitrary streams: `reader` carries replies
    /// from the evaluator, `writer` carries requests to it.
    pub fn from_streams<R, W>(reader: R, writer: W, timeout: Option<Duration>) -> io::Result<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(io::Error::other)?;
        let (outgoing, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            outgoing,
            pending: DashMap::new(),
            next_id: AtomicI64::new(1),
            exited: AtomicBool::new(false),
            timeout,
            runtime: runtime.clone(),
        });

        runtime.spawn(write_loop(writer, rx, Arc::downgrade(&inner)));
        runtime.spawn(read_loop(BufReader::new(reader), Arc::downgrade(&inner)));

        Ok(Self { inner, child: None })
    }

    pub fn has_exited(&self) -> bool {
        self.inner.exited.load(Ordering::SeqCst)
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.lock().id())
    }

    fn call<T>(&self, method: &'static str, params: Value, reply: Reply<T>)
    where
        T: DeserializeOwned + 'static,
    {
        self.inner.request(
            method,
            params,
            Box::new(move |result| {
                reply(result.and_then(|value| {
                    serde_json::from_value(value).map_err(|e| EvalError::Decode(e.to_string()))
                }))
            }),
        );
    }
}

impl AttrSetChannel for AttrSetClient {
    fn eval_expr(&self, expr: String, reply: Reply<()>) {
        // Whatever the evaluator puts in `result` is irrelevant here.
        self.inner.request(
            METHOD_EVAL_EXPR,
            Value::String(expr),
            Box::new(move |result| reply(result.map(|_| ()))),
        );
    }

    fn attrpath_complete(&self, params: AttrPathCompleteParams, reply: Reply<Vec<String>>) {
        match serde_json::to_value(&params) {
            Ok(params) => self.call(METHOD_ATTRPATH_COMPLETE, params, reply),
            Err(e) => reply(Err(EvalError::Transport(e.to_string()))),
        }
    }

    fn attrpath_info(&self, path: Vec<String>, reply: Reply<PackageDescription>) {
        self.call(METHOD_ATTRPATH_INFO, json!(path), reply);
    }
}

impl Inner {
    fn request(self: &Arc<Self>, method: &str, params: Value, reply: Pending) {
        if self.exited.load(Ordering::SeqCst) {
            reply(Err(EvalError::Exited));
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pending.insert(id, Mutex::new(reply));
        // `shut_down` may have drained the table between the check and the insert.
        if self.exited.load(Ordering::SeqCst) {
            self.fail(id, EvalError::Exited);
            return;
        }

        log::debug!("evaluator request {id}: {method}");
        let msg = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        if self.outgoing.send(msg).is_err() {
            self.fail(id, EvalError::Exited);
            return;
        }

        if let Some(timeout) = self.timeout {
            let inner = Arc::downgrade(self);
            self.runtime.spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(inner) = inner.upgrade() {
                    inner.fail(id, EvalError::Timeout(timeout));
                }
            });
        }
    }

    /// Fire the callback of `id` with `err`, if it is still waiting.
    fn fail(&self, id: i64, err: EvalError) {
        if let Some((_, reply)) = self.pending.remove(&id) {
            log::debug!("evaluator request {id} failed: {err}");
            (reply.into_inner())(Err(err));
        }
    }

    fn dispatch(&self, body: &[u8]) {
        let resp: RpcResponse = match serde_json::from_slice(body) {
            Ok(resp) => resp,
            Err(e) => {
                log::warn!("ignoring malformed evaluator message: {e}");
                return;
            }
        };
        let Some(id) = resp.id else {
            log::debug!("ignoring evaluator notification");
            return;
        };
        // Unknown ids are replies that already timed out.
        let Some((_, reply)) = self.pending.remove(&id) else {
            log::warn!("evaluator replied to unknown request {id}");
            return;
        };

        let result = match resp.error {
            Some(err) => Err(EvalError::Remote {
                code: err.code,
                message: err.message,
            }),
            None => Ok(resp.result.unwrap_or(Value::Null)),
        };
        (reply.into_inner())(result);
    }

    fn shut_down(&self) {
        self.exited.store(true, Ordering::SeqCst);
        let ids: Vec<i64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.fail(id, EvalError::Exited);
        }
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Value>, inner: Weak<Inner>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &msg).await {
            log::error!("failed to write to evaluator: {e}");
            if let Some(inner) = inner.upgrade() {
                inner.shut_down();
            }
            return;
        }
    }
}

async fn read_loop<R>(mut reader: R, inner: Weak<Inner>)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let frame = read_frame(&mut reader).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match frame {
            Ok(Some(body)) => inner.dispatch(&body),
            Ok(None) => {
                log::info!("evaluator closed its output");
                inner.shut_down();
                return;
            }
            Err(e) => {
                log::error!("failed to read from evaluator: {e}");
                inner.shut_down();
                return;
            }
        }
    }
}

/// Read one `Content-Length` framed message. `Ok(None)` on a clean EOF
/// between messages.
async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length = None;
    let mut line = String::new();
    let len = loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return match content_length {
                None => Ok(None),
                Some(_) => Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "eof inside message header",
                )),
            };
        }

        let header = line.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            match content_length {
                Some(len) => break len,
                None => continue,
            }
        }

        let (name, value) = header.split_once(':').ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed header {header:?}"),
            )
        })?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            let len = value
                .trim()
                .parse::<usize>()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            if len > MAX_FRAME_LEN {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("message of {len} bytes exceeds {MAX_FRAME_LEN}"),
                ));
            }
            content_length = Some(len);
        }
    };

    let mut body = vec![0; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

async fn write_frame<W>(writer: &mut W, msg: &Value) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(msg)?;
    writer
        .write_all(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes())
        .await?;
    writer.write_all(&body).await?;
    writer.flush().await
}
