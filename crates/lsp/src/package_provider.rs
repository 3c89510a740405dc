// ==============================================================================
// Package-set completion
// ==============================================================================
//
// Attribute-path names and package metadata come from the evaluator. Its
// channel is callback-based; these functions wait for the reply on the
// calling thread, so they must only run on the blocking pool.
//
// An evaluator failure never fails the request: completion falls back to
// local names only, resolution to an item with placeholder details.

use tokio::sync::oneshot;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, Documentation, MarkupContent, MarkupKind,
};

use crate::collector::{BoundedItems, SizeExceeded};
use crate::evaluator::{AttrPathCompleteParams, AttrSetChannel, EvalError, PackageDescription, Reply};
use crate::resume::ResumeToken;

pub struct PackageProvider<'a> {
    channel: &'a dyn AttrSetChannel,
}

impl<'a> PackageProvider<'a> {
    pub fn new(channel: &'a dyn AttrSetChannel) -> Self {
        Self { channel }
    }

    /// Append the names under `scope` that start with `prefix`, as `FIELD`
    /// items carrying a resume token.
    pub fn complete_packages(
        &self,
        scope: Vec<String>,
        prefix: String,
        items: &mut BoundedItems,
    ) -> Result<(), SizeExceeded> {
        // One more than fits, so a full answer still trips the bound.
        let room = items.limit().saturating_sub(items.len()).saturating_add(1);
        let params = AttrPathCompleteParams {
            scope,
            prefix,
            max_items: Some(room),
        };
        log::debug!(
            "package completion: scope={:?} prefix={:?}",
            params.scope,
            params.prefix
        );

        let query = params.clone();
        let names = match blocking_call(|reply| self.channel.attrpath_complete(query, reply)) {
            Ok(names) => names,
            Err(e) => {
                log::error!("package completion failed: {e}");
                return Ok(());
            }
        };

        let data = ResumeToken::attrpath(&params).encode();
        for name in names {
            if !name.starts_with(&params.prefix) {
                continue;
            }
            items.push(CompletionItem {
                label: name,
                kind: Some(CompletionItemKind::FIELD),
                data: Some(data.clone()),
                ..Default::default()
            })?;
        }
        Ok(())
    }

    /// Fill `detail` and `documentation` of the item for `scope.name`.
    pub fn resolve_package(&self, scope: Vec<String>, name: String, item: &mut CompletionItem) {
        let mut path = scope;
        path.push(name);
        log::debug!("resolving package {}", path.join("."));

        let desc = match blocking_call(|reply| self.channel.attrpath_info(path, reply)) {
            Ok(desc) => desc,
            Err(e) => {
                log::error!("package info failed: {e}");
                PackageDescription::default()
            }
        };

        let doc = format!(
            "{}\n\n{}",
            desc.description.unwrap_or_default(),
            desc.long_description.unwrap_or_default()
        );
        item.detail = Some(desc.version.unwrap_or_else(|| "?".to_string()));
        item.documentation = Some(Documentation::MarkupContent(MarkupContent {
            kind: MarkupKind::Markdown,
            value: doc,
        }));
    }
}

/// Issue a callback-style query and block until its reply fires.
fn blocking_call<T, F>(issue: F) -> Result<T, EvalError>
where
    T: Send + 'static,
    F: FnOnce(Reply<T>),
{
    let (tx, rx) = oneshot::channel();
    issue(Box::new(move |result| {
        // The receiver only goes away if the waiting thread is gone.
        let _ = tx.send(result);
    }));
    rx.blocking_recv().unwrap_or(Err(EvalError::Dropped))
}
