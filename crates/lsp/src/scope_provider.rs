// ==============================================================================
// Lexical scope completion
// ==============================================================================
//
// Suggests every name bound in the env chain at the cursor, outermost env
// first. Shadowed names are not deduplicated: `let x = 1; in let x = 2; in x`
// offers `x` twice.

use lang_env::{Definition, DocumentEnv, EnvId, SyntaxNode};
use tower_lsp::lsp_types::{CompletionItem, CompletionItemKind};

use crate::collector::{BoundedItems, SizeExceeded};

/// Names with this prefix are Nix-internal primops (`__add`).
const INTERNAL_PREFIX: &str = "__";

/// Append the bindings visible at `node` whose name starts with the text of
/// the identifier under the cursor (any name, if the cursor is not on an
/// identifier).
pub fn complete(
    env: &DocumentEnv,
    node: &SyntaxNode,
    items: &mut BoundedItems,
) -> Result<(), SizeExceeded> {
    let prefix = lang_env::completion_prefix(node);
    log::debug!("scope completion: prefix={prefix:?}");
    collect_defs(env, Some(env.up_env(node)), &prefix, items)
}

/// Collect definitions of `id` and, before them, of all its ancestors.
fn collect_defs(
    env: &DocumentEnv,
    id: Option<EnvId>,
    prefix: &str,
    items: &mut BoundedItems,
) -> Result<(), SizeExceeded> {
    let Some(id) = id else {
        return Ok(());
    };
    collect_defs(env, env[id].parent(), prefix, items)?;

    for (name, def) in env[id].defs() {
        if name.starts_with(INTERNAL_PREFIX) {
            continue;
        }
        if name.starts_with(prefix) {
            items.push(CompletionItem {
                label: name.to_string(),
                kind: Some(completion_kind(def)),
                ..Default::default()
            })?;
        }
    }
    Ok(())
}

fn completion_kind(def: &Definition) -> CompletionItemKind {
    if def.is_builtin() {
        CompletionItemKind::KEYWORD
    } else {
        CompletionItemKind::VARIABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use lang_env::arbitrary::NestedLets;
    use lang_env::GLOBAL_BUILTINS;
    use proptest::prelude::*;
    use rowan::TextSize;

    use crate::test_util::parse_markers;

    fn complete_at(src: &str, offset: u32, limit: usize) -> (Vec<CompletionItem>, bool) {
        let root = rnix::Root::parse(src).tree();
        let env = DocumentEnv::build(&root);
        let node = lang_env::node_at(&root, TextSize::from(offset)).expect("no node at cursor");
        let mut items = BoundedItems::new(limit);
        let exceeded = complete(&env, &node, &mut items).is_err();
        (items.into_list().items, exceeded)
    }

    fn user_labels(items: &[CompletionItem]) -> Vec<&str> {
        items
            .iter()
            .filter(|i| i.kind == Some(CompletionItemKind::VARIABLE))
            .map(|i| i.label.as_str())
            .collect()
    }

    #[test]
    fn prefix_filters_and_kinds() {
        let src = indoc! {"
            let tru = 1; trap = 2; other = 3;
            in tr
            #    ^1
        "};
        let markers = parse_markers(src);
        let (items, exceeded) = complete_at(src, markers[&1], 30);
        assert!(!exceeded);

        let labels: Vec<_> = items.iter().map(|i| i.label.as_str()).collect();
        // Builtins (root env) come before the let bindings.
        assert_eq!(labels, ["true", "trap", "tru"]);
        assert_eq!(items[0].kind, Some(CompletionItemKind::KEYWORD));
        assert_eq!(items[1].kind, Some(CompletionItemKind::VARIABLE));
        assert!(items.iter().all(|i| i.data.is_none()));
    }

    #[test]
    fn internal_names_are_hidden() {
        let src = indoc! {"
            let __secret = 1; _visible = 2;
            in _
            #   ^1
        "};
        let markers = parse_markers(src);
        let (items, _) = complete_at(src, markers[&1], 30);
        let labels: Vec<_> = items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, ["_visible"]);
    }

    #[test]
    fn shadowed_names_appear_twice() {
        let src = indoc! {"
            let x = 1;
            in let x = 2;
            in [ ]
            #   ^1
        "};
        let markers = parse_markers(src);
        let (items, _) = complete_at(src, markers[&1], 30);
        assert_eq!(user_labels(&items), ["x", "x"]);
    }

    #[test]
    fn outer_scopes_first() {
        let src = indoc! {"
            outer: let mid = 1; in { inner }: [ ]
            #                                  ^1
        "};
        let markers = parse_markers(src);
        let (items, _) = complete_at(src, markers[&1], 30);
        assert_eq!(user_labels(&items), ["outer", "mid", "inner"]);
    }

    #[test]
    fn select_segment_is_the_prefix() {
        let src = indoc! {"
            let hex = 1; other = 2;
            in { pkgs }: pkgs.he
            #                   ^1
        "};
        let markers = parse_markers(src);
        let (items, exceeded) = complete_at(src, markers[&1], 30);
        assert!(!exceeded);
        let labels: Vec<_> = items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, ["hex"]);
    }

    #[test]
    fn stops_when_budget_is_spent() {
        let src = indoc! {"
            let a1 = 1; a2 = 2; a3 = 3;
            in a
            #   ^1
        "};
        let markers = parse_markers(src);
        // "abort" is the only builtin starting with `a`.
        let (items, exceeded) = complete_at(src, markers[&1], 3);
        assert!(exceeded);
        let labels: Vec<_> = items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, ["abort", "a1", "a2"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128, .. ProptestConfig::default()
        })]

        #[test]
        fn matches_nested_scopes(lets in any::<NestedLets>()) {
            let (src, cursor) = lets.render();
            let (items, exceeded) = complete_at(&src, cursor, usize::MAX);
            prop_assert!(!exceeded);

            let mut expected: Vec<String> = {
                let mut builtins: Vec<&str> = GLOBAL_BUILTINS
                    .iter()
                    .copied()
                    .filter(|b| b.starts_with(&lets.prefix))
                    .collect();
                builtins.sort_unstable();
                builtins.into_iter().map(String::from).collect()
            };
            for scope in &lets.scopes {
                expected.extend(
                    scope
                        .iter()
                        .filter(|n| !n.starts_with("__") && n.starts_with(&lets.prefix))
                        .cloned(),
                );
            }

            let labels: Vec<String> = items.into_iter().map(|i| i.label).collect();
            prop_assert_eq!(labels, expected);
        }
    }
}
