use std::collections::BTreeSet;

use proptest::collection::{btree_set, vec};
use proptest::prelude::{Arbitrary, BoxedStrategy, Strategy};

/// Nix keywords that cannot be used as binding names.
const KEYWORDS: &[&str] = &[
    "assert", "else", "if", "in", "inherit", "let", "or", "rec", "then", "with",
];

/// A chain of nested `let` blocks ending in a list that holds the cursor.
///
/// Rendered as `let a = 0; in let b = 0; in [ <prefix> ]`, with the cursor
/// right after `<prefix>`. Names are unique within one block but may repeat
/// across blocks (shadowing), and some carry the internal `__` prefix.
#[derive(Debug, Clone)]
pub struct NestedLets {
    pub scopes: Vec<BTreeSet<String>>,
    pub prefix: String,
}

impl NestedLets {
    /// Source text and the byte offset of the cursor.
    pub fn render(&self) -> (String, u32) {
        let mut src = String::new();
        for scope in &self.scopes {
            src.push_str("let ");
            for name in scope {
                src.push_str(name);
                src.push_str(" = 0; ");
            }
            src.push_str("in ");
        }
        src.push_str("[ ");
        src.push_str(&self.prefix);
        let cursor = src.len() as u32;
        src.push_str(" ]");
        (src, cursor)
    }
}

fn arb_name() -> impl Strategy<Value = String> {
    "(__)?[a-d][a-d0-9]{0,3}".prop_filter("keyword", |s| !KEYWORDS.contains(&s.as_str()))
}

impl Arbitrary for NestedLets {
    type Parameters = ();
    type Strategy = BoxedStrategy<NestedLets>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        (vec(btree_set(arb_name(), 1..6), 1..5), "([a-d]{1,2})?")
            .prop_map(|(scopes, prefix)| NestedLets { scopes, prefix })
            .boxed()
    }
}
