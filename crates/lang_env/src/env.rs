use std::collections::BTreeMap;
use std::{iter, ops};

use la_arena::{Arena, Idx};
use rnix::ast::{self, HasEntry};
use rowan::ast::{AstNode, SyntaxNodePtr};
use rowan::TextRange;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::builtins::all_builtins;
use crate::SyntaxNode;

pub type EnvId = Idx<EnvNode>;

type NodePtr = SyntaxNodePtr<rnix::NixLanguage>;

impl ops::Index<EnvId> for DocumentEnv {
    type Output = EnvNode;
    fn index(&self, index: EnvId) -> &Self::Output {
        &self.envs[index]
    }
}

/// One bound name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    is_builtin: bool,
    range: Option<TextRange>,
}

impl Definition {
    pub fn builtin() -> Self {
        Self {
            is_builtin: true,
            range: None,
        }
    }

    pub fn user(range: TextRange) -> Self {
        Self {
            is_builtin: false,
            range: Some(range),
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.is_builtin
    }

    /// Range of the binding site. `None` for builtins.
    pub fn range(&self) -> Option<TextRange> {
        self.range
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvKind {
    /// The root env holding the language builtins.
    Builtins,
    Let,
    RecAttrSet,
    /// A plain `{ ... }`. Its names are not in scope for evaluation, but are
    /// offered while writing the value of a sibling attribute.
    AttrSet,
    Lambda,
    /// `with ns; body`. Binds nothing statically; `namespace` is the text of
    /// `ns` when it is a plain identifier.
    With { namespace: Option<SmolStr> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvNode {
    parent: Option<EnvId>,
    defs: BTreeMap<SmolStr, Definition>,
    kind: EnvKind,
}

impl EnvNode {
    pub fn parent(&self) -> Option<EnvId> {
        self.parent
    }

    pub fn defs(&self) -> &BTreeMap<SmolStr, Definition> {
        &self.defs
    }

    pub fn kind(&self) -> &EnvKind {
        &self.kind
    }

    pub fn with_namespace(&self) -> Option<&SmolStr> {
        match &self.kind {
            EnvKind::With { namespace } => namespace.as_ref(),
            _ => None,
        }
    }
}

/// The lexical environments of one document version.
///
/// Envs live in an arena and point at their parent by index, so the chain
/// can be shared read-only across threads without any ownership cycles. Each
/// scope-introducing syntax node is mapped to the env that covers it; any
/// other node inherits the env of its nearest mapped ancestor.
#[derive(Debug, Clone)]
pub struct DocumentEnv {
    envs: Arena<EnvNode>,
    root: EnvId,
    env_by_node: FxHashMap<NodePtr, EnvId>,
}

impl DocumentEnv {
    pub fn build(root: &rnix::Root) -> Self {
        let mut envs = Arena::new();
        let root_env = envs.alloc(EnvNode {
            parent: None,
            defs: all_builtins()
                .map(|name| (SmolStr::from(name), Definition::builtin()))
                .collect(),
            kind: EnvKind::Builtins,
        });

        let mut this = DocumentEnv {
            envs,
            root: root_env,
            env_by_node: FxHashMap::default(),
        };

        // Preorder: every enclosing scope is registered before its children
        // look up their parent env.
        for node in root.syntax().descendants() {
            this.visit(&node);
        }

        log::trace!("built {} envs", this.envs.len());
        this
    }

    pub fn root(&self) -> EnvId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.envs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envs.is_empty()
    }

    /// The env visible at `node`: the one owned by the nearest enclosing
    /// scope-introducing ancestor (inclusive), or the root env.
    pub fn up_env(&self, node: &SyntaxNode) -> EnvId {
        node.ancestors()
            .find_map(|n| self.env_by_node.get(&NodePtr::new(&n)).copied())
            .unwrap_or(self.root)
    }

    /// Iterate from `env` out to the root, innermost first.
    pub fn ancestors(&self, env: EnvId) -> impl Iterator<Item = (EnvId, &'_ EnvNode)> + '_ {
        iter::successors(Some(env), |&id| self[id].parent).map(|id| (id, &self[id]))
    }

    fn visit(&mut self, node: &SyntaxNode) {
        let (owner, kind, defs) = if let Some(let_in) = ast::LetIn::cast(node.clone()) {
            (node.clone(), EnvKind::Let, entry_defs(&let_in))
        } else if let Some(set) = ast::AttrSet::cast(node.clone()) {
            if set.rec_token().is_none() {
                self.visit_plain_set(&set);
                return;
            }
            (node.clone(), EnvKind::RecAttrSet, entry_defs(&set))
        } else if let Some(lambda) = ast::Lambda::cast(node.clone()) {
            let defs = lambda_defs(&lambda);
            if defs.is_empty() {
                return;
            }
            (node.clone(), EnvKind::Lambda, defs)
        } else if let Some(with) = ast::With::cast(node.clone()) {
            // The namespace expression itself is evaluated outside the `with`.
            let Some(body) = with.body() else {
                return;
            };
            let namespace = match with.namespace() {
                Some(ast::Expr::Ident(ident)) => ident_text(&ident),
                _ => None,
            };
            (
                body.syntax().clone(),
                EnvKind::With { namespace },
                BTreeMap::new(),
            )
        } else {
            return;
        };

        // `owner` may already be registered (a `with` body that is itself a
        // `let`), in which case that env becomes the parent.
        let parent = self.up_env(&owner);
        let env = self.envs.alloc(EnvNode {
            parent: Some(parent),
            defs,
            kind,
        });
        self.env_by_node.insert(NodePtr::new(&owner), env);
    }

    /// One env shared by the values of the set's entries. The entries
    /// themselves (attribute names, nested sets at entry level) stay in the
    /// enclosing env.
    fn visit_plain_set(&mut self, set: &ast::AttrSet) {
        let values: Vec<SyntaxNode> = set
            .entries()
            .filter_map(|entry| match entry {
                ast::Entry::AttrpathValue(apv) => apv.value(),
                ast::Entry::Inherit(_) => None,
            })
            .map(|value| value.syntax().clone())
            .collect();
        let defs = entry_defs(set);
        if values.is_empty() || defs.is_empty() {
            return;
        }

        let parent = self.up_env(set.syntax());
        let env = self.envs.alloc(EnvNode {
            parent: Some(parent),
            defs,
            kind: EnvKind::AttrSet,
        });
        for value in values {
            self.env_by_node.insert(NodePtr::new(&value), env);
        }
    }
}

/// Static names bound by a `let` or an attribute set: the first segment of every
/// attrpath, plus every inherited name.
fn entry_defs(node: &impl HasEntry) -> BTreeMap<SmolStr, Definition> {
    let mut defs = BTreeMap::new();
    for entry in node.entries() {
        match entry {
            ast::Entry::AttrpathValue(apv) => {
                let Some(attr) = apv.attrpath().and_then(|path| path.attrs().next()) else {
                    continue;
                };
                if let Some(name) = static_attr_name(&attr) {
                    defs.entry(name)
                        .or_insert_with(|| Definition::user(attr.syntax().text_range()));
                }
            }
            ast::Entry::Inherit(inherit) => {
                for attr in inherit.attrs() {
                    if let Some(name) = static_attr_name(&attr) {
                        defs.entry(name)
                            .or_insert_with(|| Definition::user(attr.syntax().text_range()));
                    }
                }
            }
        }
    }
    defs
}

fn lambda_defs(lambda: &ast::Lambda) -> BTreeMap<SmolStr, Definition> {
    let mut defs = BTreeMap::new();
    let mut bind = |ident: ast::Ident| {
        if let Some(name) = ident_text(&ident) {
            defs.entry(name)
                .or_insert_with(|| Definition::user(ident.syntax().text_range()));
        }
    };

    match lambda.param() {
        Some(ast::Param::IdentParam(param)) => {
            if let Some(ident) = param.ident() {
                bind(ident);
            }
        }
        Some(ast::Param::Pattern(pattern)) => {
            if let Some(ident) = pattern.pat_bind().and_then(|b| b.ident()) {
                bind(ident);
            }
            for entry in pattern.pat_entries() {
                if let Some(ident) = entry.ident() {
                    bind(ident);
                }
            }
        }
        None => {}
    }
    defs
}

pub(crate) fn ident_text(ident: &ast::Ident) -> Option<SmolStr> {
    ident.ident_token().map(|t| SmolStr::from(t.text()))
}

/// The name of an attribute if it is known without evaluation.
pub(crate) fn static_attr_name(attr: &ast::Attr) -> Option<SmolStr> {
    let name = match attr {
        ast::Attr::Ident(ident) => ident_text(ident),
        ast::Attr::Str(s) => str_literal(s),
        ast::Attr::Dynamic(_) => None,
    };
    name.filter(|n| !n.is_empty())
}

/// A plain string literal (no interpolation).
fn str_literal(s: &ast::Str) -> Option<SmolStr> {
    let parts = s.normalized_parts();
    match parts.as_slice() {
        [ast::InterpolPart::Literal(lit)] => Some(SmolStr::from(lit.as_str())),
        _ => None,
    }
}
