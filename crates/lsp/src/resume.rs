// ==============================================================================
// Resume tokens
// ==============================================================================
//
// A package completion item carries, in `CompletionItem.data`, enough to look
// the package up again on `completionItem/resolve`. The token is a versioned
// JSON object, serialized to a string so editors pass it through untouched:
//
//     "{\"v\":1,\"kind\":\"attrpath\",\"scope\":[\"python3Packages\"],\"prefix\":\"re\"}"

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::evaluator::AttrPathCompleteParams;

pub const TOKEN_VERSION: u32 = 1;
pub const KIND_ATTRPATH: &str = "attrpath";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeToken {
    pub v: u32,
    pub kind: String,
    pub scope: Vec<String>,
    pub prefix: String,
}

#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("completion item data is not a string")]
    NotAString,
    #[error("completion item data is not a valid token: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported token version {0}")]
    Version(u32),
    #[error("unsupported token kind {0:?}")]
    Kind(String),
}

impl ResumeToken {
    /// The token for an item produced by an `attrpathComplete` query.
    pub fn attrpath(params: &AttrPathCompleteParams) -> Self {
        Self {
            v: TOKEN_VERSION,
            kind: KIND_ATTRPATH.to_string(),
            scope: params.scope.clone(),
            prefix: params.prefix.clone(),
        }
    }

    pub fn params(&self) -> AttrPathCompleteParams {
        AttrPathCompleteParams {
            scope: self.scope.clone(),
            prefix: self.prefix.clone(),
            max_items: None,
        }
    }

    /// Serialize to the form stored in `CompletionItem.data`.
    pub fn encode(&self) -> Value {
        // A struct of strings always serializes.
        Value::String(serde_json::to_string(self).unwrap_or_default())
    }

    pub fn decode(data: &Value) -> Result<Self, ResumeError> {
        let Value::String(raw) = data else {
            return Err(ResumeError::NotAString);
        };
        let token: ResumeToken = serde_json::from_str(raw)?;
        if token.v != TOKEN_VERSION {
            return Err(ResumeError::Version(token.v));
        }
        if token.kind != KIND_ATTRPATH {
            return Err(ResumeError::Kind(token.kind));
        }
        Ok(token)
    }
}
