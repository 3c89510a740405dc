// ==============================================================================
// External attribute-set evaluator
// ==============================================================================
//
// Package names and metadata come from a separate long-lived evaluator
// process (it evaluates nixpkgs and caches the result). Queries are
// callback-based: each method hands over a `Reply` that the channel
// implementation must invoke exactly once, from any thread.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod client;

pub use client::AttrSetClient;

pub type Reply<T> = Box<dyn FnOnce(Result<T, EvalError>) + Send>;

pub const METHOD_EVAL_EXPR: &str = "attrset/evalExpr";
pub const METHOD_ATTRPATH_COMPLETE: &str = "attrset/attrpathComplete";
pub const METHOD_ATTRPATH_INFO: &str = "attrset/attrpathInfo";

/// "Which names under `scope` start with `prefix`?"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttrPathCompleteParams {
    pub scope: Vec<String>,
    pub prefix: String,
    /// Upper bound on the number of names the evaluator should return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
}

/// Metadata of one package (`meta.*` plus name/version).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PackageDescription {
    pub name: Option<String>,
    #[serde(rename = "PName")]
    pub pname: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub long_description: Option<String>,
    pub position: Option<String>,
    pub homepage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("evaluator error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("no reply from evaluator within {0:?}")]
    Timeout(Duration),
    #[error("evaluator process exited")]
    Exited,
    #[error("evaluator dropped the request without replying")]
    Dropped,
    #[error("evaluator transport: {0}")]
    Transport(String),
    #[error("malformed evaluator reply: {0}")]
    Decode(String),
}

/// A thread-safe handle to the evaluator. Concurrent requests are allowed;
/// the implementation routes each reply to its own callback.
pub trait AttrSetChannel: Send + Sync {
    /// Set the expression the evaluator treats as the package set.
    fn eval_expr(&self, expr: String, reply: Reply<()>) {
        log::debug!("evaluator ignores evalExpr: {expr}");
        reply(Ok(()))
    }

    fn attrpath_complete(&self, params: AttrPathCompleteParams, reply: Reply<Vec<String>>);

    fn attrpath_info(&self, path: Vec<String>, reply: Reply<PackageDescription>);
}
