//! Expression rewriting ahead of index pushdown.

use log::Level;

use crate::ast::Expr;
use crate::logging::predicate_log;

/// Rebuilds `expr` bottom-up: every node is passed to `f` after its children
/// were rewritten, and replaced by what `f` returns.
pub fn rewrite_expr(expr: &Expr, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
    let rebuilt = match expr {
        Expr::Binary(b) => Expr::binary(b.op, rewrite_expr(&b.lhs, f), rewrite_expr(&b.rhs, f)),
        Expr::Paren(inner) => Expr::paren(rewrite_expr(inner, f)),
        Expr::VarRef(_) | Expr::Literal(_) => expr.clone(),
    };
    f(rebuilt)
}

/// Replaces every comparison on a field key (`_field`) or field value (`$`,
/// `::field`) with `true`.
///
/// The index only resolves tags, so the result is an over-approximation of
/// `expr` the index can evaluate; the field clauses are still checked while
/// scanning. Constant folding is left to [`crate::reduce::reduce`]. Applying
/// the rewrite twice gives the same result as applying it once.
pub fn rewrite_remove_field_key_and_value(expr: &Expr) -> Expr {
    let mut replaced = 0usize;
    let rewritten = rewrite_expr(expr, &mut |node| match node {
        Expr::Binary(b)
            if b.op.is_comparison() && (is_field_operand(&b.lhs) || is_field_operand(&b.rhs)) =>
        {
            replaced += 1;
            Expr::boolean(true)
        }
        other => other,
    });
    predicate_log!(
        Level::Debug,
        "remove_field_key_and_value",
        "replaced={} expr={}",
        replaced,
        rewritten
    );
    rewritten
}

fn is_field_operand(operand: &Expr) -> bool {
    match operand {
        Expr::VarRef(var) => var.is_field_key() || var.is_field_value(),
        Expr::Paren(inner) => is_field_operand(inner),
        Expr::Binary(_) | Expr::Literal(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use regex::Regex;

    use super::*;
    use crate::ast::{BinaryOp, DataType, Literal, RegexLiteral, VarRef};
    use crate::parser::parse_expr;

    fn rewrite(input: &str) -> String {
        rewrite_remove_field_key_and_value(&parse_expr(input).unwrap()).to_string()
    }

    #[test]
    fn test_field_clauses_become_true() {
        assert_eq!(
            rewrite(r#"host::tag = 'host1' AND _field::tag =~ /^us-west/ AND "$" = 0.5"#),
            "host::tag = 'host1' AND true AND true"
        );
        assert_eq!(rewrite("usage::field > 10 OR region = 'eu'"), "true OR region = 'eu'");
        assert_eq!(rewrite("_field = 'usage_idle'"), "true");
    }

    #[test]
    fn test_field_operand_on_either_side() {
        assert_eq!(rewrite(r#"0.5 < "$""#), "true");
        assert_eq!(rewrite("'f' = (_field)"), "true");
    }

    #[test]
    fn test_structure_is_kept() {
        assert_eq!(
            rewrite(r#"(a = '1' OR "$" > 2) AND NOT_A_FIELD = 'x'"#),
            "(a = '1' OR true) AND NOT_A_FIELD = 'x'"
        );
        assert_eq!(rewrite("a = '1' AND (b = '2' OR c = '3')"), "a = '1' AND (b = '2' OR c = '3')");
    }

    #[test]
    fn test_reference_to_reference_comparison() {
        assert_eq!(rewrite("a = b"), "a = b");
        assert_eq!(rewrite("a::tag = usage::field"), "true");
    }

    #[test]
    fn test_bare_references_are_not_comparisons() {
        assert_eq!(rewrite(r#""$""#), r#""$""#);
        assert_eq!(rewrite("_field"), "_field");
    }

    #[test]
    fn test_rewrite_expr_is_post_order() {
        let expr = parse_expr("a = '1' AND b = '2'").unwrap();
        let mut visited = Vec::new();
        rewrite_expr(&expr, &mut |node| {
            visited.push(node.to_string());
            node
        });
        assert_eq!(
            visited,
            vec!["a", "'1'", "a = '1'", "b", "'2'", "b = '2'", "a = '1' AND b = '2'"]
        );
    }

    fn arb_leaf() -> impl Strategy<Value = Expr> {
        let tag_key = prop::sample::select(vec!["host", "region", "cpu"]);
        let comparison = prop::sample::select(vec![
            BinaryOp::Eq,
            BinaryOp::NotEq,
            BinaryOp::Lt,
            BinaryOp::Gte,
        ]);
        prop_oneof![
            (tag_key, comparison, "[a-z]{1,4}").prop_map(|(key, op, value)| {
                Expr::binary(op, Expr::tag_ref(key), Expr::string(value))
            }),
            "[a-z]{1,3}".prop_map(|pattern| {
                let re = RegexLiteral(Regex::new(&pattern).unwrap());
                Expr::binary(BinaryOp::EqRegex, Expr::tag_ref("_field"), Expr::Literal(Literal::Regex(re)))
            }),
            any::<i32>().prop_map(|v| {
                Expr::binary(BinaryOp::Gt, Expr::var_ref("$"), Expr::Literal(Literal::Float(f64::from(v))))
            }),
            "[a-z]{1,4}".prop_map(|name| {
                Expr::binary(
                    BinaryOp::Lte,
                    Expr::VarRef(VarRef::new(name, Some(DataType::Field))),
                    Expr::Literal(Literal::Integer(1)),
                )
            }),
            "[a-z]{1,4}".prop_map(|m| Expr::binary(BinaryOp::Eq, Expr::var_ref("_name"), Expr::string(m))),
            any::<bool>().prop_map(Expr::boolean),
        ]
    }

    fn arb_expr() -> impl Strategy<Value = Expr> {
        arb_leaf().prop_recursive(5, 48, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::and(l, r)),
                (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::or(l, r)),
                inner.prop_map(Expr::paren),
            ]
        })
    }

    /// Rendered tag comparisons (tag key vs. literal), sorted.
    fn tag_comparisons(expr: &Expr) -> Vec<String> {
        let mut found = Vec::new();
        expr.walk(&mut |node| {
            if let Expr::Binary(b) = node {
                let is_tag = b
                    .lhs
                    .as_var_ref()
                    .is_some_and(|v| v.data_type == Some(DataType::Tag) && !v.is_field_key());
                if b.op.is_comparison() && is_tag {
                    found.push(node.to_string());
                }
            }
        });
        found.sort();
        found
    }

    proptest! {
        #[test]
        fn test_rewrite_is_idempotent(expr in arb_expr()) {
            let once = rewrite_remove_field_key_and_value(&expr);
            let twice = rewrite_remove_field_key_and_value(&once);
            prop_assert_eq!(twice, once);
        }

        #[test]
        fn test_rewrite_preserves_tag_comparisons(expr in arb_expr()) {
            let rewritten = rewrite_remove_field_key_and_value(&expr);
            prop_assert_eq!(tag_comparisons(&rewritten), tag_comparisons(&expr));
        }

        #[test]
        fn test_rewrite_leaves_no_field_comparison(expr in arb_expr()) {
            let rewritten = rewrite_remove_field_key_and_value(&expr);
            prop_assert!(!rewritten.any(&|node| matches!(
                node,
                Expr::Binary(b) if b.op.is_comparison() && (is_field_operand(&b.lhs) || is_field_operand(&b.rhs))
            )));
        }
    }
}
