// ==============================================================================
// Completion request orchestration
// ==============================================================================
//
// `complete` finds the node under the cursor, runs the scope provider and,
// in a package-set context, the package provider. Both append into one
// `BoundedItems`; the first refused insertion ends collection and marks the
// list incomplete.
//
// `resolve` re-queries the evaluator for the one item the editor inspects,
// using the resume token stored in the item's `data`.
//
// Both may block on the evaluator and must run on the blocking pool.

use rowan::TextSize;
use serde_json::Value;
use thiserror::Error;
use tower_lsp::jsonrpc;
use tower_lsp::lsp_types::{CompletionItem, CompletionList, Position, Url};

use crate::collector::{BoundedItems, SizeExceeded};
use crate::config::CompletionConfig;
use crate::evaluator::AttrSetChannel;
use crate::package_provider::PackageProvider;
use crate::resume::{ResumeError, ResumeToken};
use crate::scope_provider;
use crate::state::DocumentAnalysis;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("cannot find corresponding node on given position")]
    NoNode,
    #[error("document not open: {0}")]
    NotOpen(Url),
    #[error("malformed completion item data: {0}")]
    MalformedData(#[from] ResumeError),
}

impl From<CompletionError> for jsonrpc::Error {
    fn from(e: CompletionError) -> Self {
        jsonrpc::Error::invalid_params(e.to_string())
    }
}

pub fn complete(
    doc: &DocumentAnalysis,
    pos: Position,
    channel: Option<&dyn AttrSetChannel>,
    config: &CompletionConfig,
) -> Result<CompletionList, CompletionError> {
    let offset = doc
        .line_index
        .checked_offset(pos)
        .ok_or(CompletionError::NoNode)?;
    let root = doc.root();
    let node = lang_env::node_at(&root, TextSize::from(offset)).ok_or(CompletionError::NoNode)?;
    log::debug!("completion at {offset}: {:?}", node.kind());

    let mut items = BoundedItems::new(config.max_items);
    let is_incomplete = collect(doc, &node, channel, &mut items).is_err();
    if is_incomplete {
        log::debug!("completion truncated at {} items", items.len());
    }

    let mut list = items.into_list();
    list.is_incomplete = is_incomplete;
    Ok(list)
}

fn collect(
    doc: &DocumentAnalysis,
    node: &lang_env::SyntaxNode,
    channel: Option<&dyn AttrSetChannel>,
    items: &mut BoundedItems,
) -> Result<(), SizeExceeded> {
    scope_provider::complete(&doc.env, node, items)?;

    if lang_env::have_package_scope(&doc.env, node) {
        match channel {
            Some(channel) => {
                let (scope, prefix) = lang_env::scope_and_prefix(&doc.env, node);
                PackageProvider::new(channel).complete_packages(scope, prefix, items)?;
            }
            None => log::debug!("no evaluator, skipping package completion"),
        }
    }
    Ok(())
}

/// Fill in the details of a package item. Items without data are returned
/// as they are.
pub fn resolve(
    item: CompletionItem,
    channel: Option<&dyn AttrSetChannel>,
) -> Result<CompletionItem, CompletionError> {
    let token = match item.data.as_ref() {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(data) => Some(ResumeToken::decode(data)?),
    };
    let Some(token) = token else {
        return Ok(item);
    };

    let Some(channel) = channel else {
        log::warn!("no evaluator, cannot resolve {:?}", item.label);
        return Ok(item);
    };

    let mut resolved = item.clone();
    PackageProvider::new(channel).resolve_package(token.scope, item.label, &mut resolved);
    Ok(resolved)
}
