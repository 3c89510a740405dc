//! Lexical environments of a Nix document, built from an `rnix` syntax tree,
//! plus the cursor queries completion runs against them.

#[cfg(feature = "proptest_support")]
pub mod arbitrary;
mod builtins;
mod env;
mod lookup;


pub use builtins::{all_builtins, lookup_builtin, GLOBAL_BUILTINS, INTERNAL_PRIMOPS};
pub use env::{Definition, DocumentEnv, EnvId, EnvKind, EnvNode};
pub use lookup::{
    completion_prefix, have_package_scope, identifier_reference, node_at, scope_and_prefix,
    PACKAGE_SET,
};

pub type SyntaxNode = rnix::SyntaxNode;
