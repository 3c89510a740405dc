// ==============================================================================
// Cursor queries
// ==============================================================================
//
// Position -> node resolution and the syntactic predicates completion needs:
// "is this a variable reference", "is this a package-set attribute path", and
// "which attribute path and prefix does the cursor complete".

use rnix::ast;
use rowan::ast::AstNode;
use rowan::TextSize;
use smol_str::SmolStr;

use crate::env::{ident_text, static_attr_name};
use crate::{DocumentEnv, SyntaxNode};

/// The variable that names the package set (`pkgs.hello`, `with pkgs; ...`).
pub const PACKAGE_SET: &str = "pkgs";

/// Innermost node at `offset`.
///
/// Left-biased: with the cursor right after a token (`pkgs.|`, `hel|`), the
/// token before the cursor wins. Returns `None` for an empty document or an
/// offset past the end of the text.
pub fn node_at(root: &rnix::Root, offset: TextSize) -> Option<SyntaxNode> {
    let syntax = root.syntax();
    if offset > syntax.text_range().end() {
        return None;
    }
    let token = syntax.token_at_offset(offset).left_biased()?;
    token.parent()
}

/// If `node` is a variable reference, its name.
///
/// Identifiers used as attribute names or binding sites are not references.
pub fn identifier_reference(node: &SyntaxNode) -> Option<SmolStr> {
    let ident = ast::Ident::cast(node.clone())?;
    if let Some(parent) = node.parent() {
        let kind = parent.kind();
        if ast::Attrpath::can_cast(kind)
            || ast::PatEntry::can_cast(kind)
            || ast::PatBind::can_cast(kind)
            || ast::IdentParam::can_cast(kind)
        {
            return None;
        }
    }
    ident_text(&ident)
}

/// The text local completion filters by: the identifier under the cursor,
/// whether it is a variable reference or a segment of a select's attribute
/// path (`pkgs.hel` filters by `hel`). Empty anywhere else.
pub fn completion_prefix(node: &SyntaxNode) -> SmolStr {
    if let Some(name) = identifier_reference(node) {
        return name;
    }
    let in_select_path = node
        .parent()
        .filter(|p| ast::Attrpath::can_cast(p.kind()))
        .and_then(|p| p.parent())
        .is_some_and(|p| ast::Select::can_cast(p.kind()));
    if !in_select_path {
        return SmolStr::default();
    }
    ast::Ident::cast(node.clone())
        .and_then(|ident| ident_text(&ident))
        .unwrap_or_default()
}

/// Whether completion at `node` should also query the package set.
///
/// True for an attribute segment of a select rooted at `pkgs`
/// (`pkgs.python3Packages.req`) and for a variable reference inside
/// `with pkgs;`.
pub fn have_package_scope(env: &DocumentEnv, node: &SyntaxNode) -> bool {
    if package_select(node).is_some() {
        return true;
    }
    identifier_reference(node).is_some() && inside_package_with(env, node)
}

/// The attribute path already written before the cursor and the partial
/// segment being completed.
///
/// `pkgs.python3Packages.req|` gives `(["python3Packages"], "req")`;
/// `pkgs.|` gives `([], "")`; `with pkgs; [ hel| ]` gives `([], "hel")`.
/// Anything else gives `([], "")`.
pub fn scope_and_prefix(env: &DocumentEnv, node: &SyntaxNode) -> (Vec<String>, String) {
    if let Some((select, current)) = package_select(node) {
        let mut scope = Vec::new();
        if let Some(attrpath) = select.attrpath() {
            for attr in attrpath.attrs() {
                if let Some(current) = &current {
                    if attr.syntax().text_range().start() >= current.text_range().start() {
                        break;
                    }
                }
                match static_attr_name(&attr) {
                    Some(name) => scope.push(name.to_string()),
                    None => break,
                }
            }
        }
        let prefix = current
            .as_ref()
            .and_then(|n| ast::Ident::cast(n.clone()))
            .and_then(|ident| ident_text(&ident))
            .map(|s| s.to_string())
            .unwrap_or_default();
        return (scope, prefix);
    }

    if let Some(name) = identifier_reference(node) {
        if inside_package_with(env, node) {
            return (Vec::new(), name.to_string());
        }
    }

    (Vec::new(), String::new())
}

/// If `node` sits in the attrpath of `pkgs.<...>`, the select and the
/// segment under the cursor (`None` when the cursor follows a dot).
fn package_select(node: &SyntaxNode) -> Option<(ast::Select, Option<SyntaxNode>)> {
    // Error recovery may wrap a dangling `.` in an error node.
    let node = if node.kind() == rnix::SyntaxKind::NODE_ERROR {
        node.parent()?
    } else {
        node.clone()
    };

    let (select_node, current) = if ast::Select::can_cast(node.kind()) {
        (node.clone(), None)
    } else if ast::Attrpath::can_cast(node.kind()) {
        (node.parent()?, None)
    } else {
        // A segment: Ident (or string) -> Attrpath -> Select.
        let attrpath = node.parent().filter(|p| ast::Attrpath::can_cast(p.kind()))?;
        (attrpath.parent()?, Some(node.clone()))
    };

    let select = ast::Select::cast(select_node)?;
    match select.expr()? {
        ast::Expr::Ident(base) if ident_text(&base).as_deref() == Some(PACKAGE_SET) => {
            Some((select, current))
        }
        _ => None,
    }
}

fn inside_package_with(env: &DocumentEnv, node: &SyntaxNode) -> bool {
    env.ancestors(env.up_env(node))
        .any(|(_, data)| data.with_namespace().map(SmolStr::as_str) == Some(PACKAGE_SET))
}
