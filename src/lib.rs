//! Predicate translation and rewriting for a time-series storage engine.
//!
//! A Filter Tree arrives over the storage-read protocol ([`node`]) and is
//! turned into a query-language expression ([`translate`]). The expression
//! can then be checked for a single pinned measurement ([`measurement`]),
//! stripped of field clauses the index cannot answer ([`rewrite`]) and
//! constant-folded ([`reduce`]).

pub mod ast;
pub mod config;
pub mod lexer;
mod logging;
pub mod measurement;
pub mod node;
pub mod parser;
pub mod reduce;
pub mod rewrite;
pub mod token;
pub mod translate;

pub use ast::{BinaryExpr, BinaryOp, DataType, Expr, Literal, RegexLiteral, VarRef};
pub use config::{ConfigError, PredicateConfig};
pub use measurement::has_single_measurement_no_or;
pub use node::{Comparison, Logical, Node, NodeType, NodeValue};
pub use parser::{parse_expr, ParseError};
pub use reduce::{reduce, Valuer};
pub use rewrite::{rewrite_expr, rewrite_remove_field_key_and_value};
pub use translate::{node_to_expr, TagRemap, TranslateError};

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::thread;

    use super::*;

    fn storage_filter() -> Node {
        Node::logical(
            Logical::And,
            vec![
                Node::comparison(Comparison::Equal, Node::tag_ref("host"), Node::string("host1")),
                Node::comparison(Comparison::Regex, Node::tag_ref("_field"), Node::regex("^us-west")),
                Node::comparison(Comparison::Equal, Node::field_ref("$"), Node::float(0.5)),
            ],
        )
    }

    #[test]
    fn test_translate_neutralize_reduce() {
        let expr = node_to_expr(&storage_filter(), Some(&TagRemap::storage_defaults())).unwrap();
        assert_eq!(
            expr.to_string(),
            r#"host::tag = 'host1' AND _field::tag =~ /^us-west/ AND "$" = 0.5"#
        );
        assert_eq!(parse_expr(&expr.to_string()).unwrap(), expr);

        let neutralized = rewrite_remove_field_key_and_value(&expr);
        assert_eq!(neutralized.to_string(), "host::tag = 'host1' AND true AND true");

        let tags = HashMap::from([("host".to_string(), "host1".to_string())]);
        assert_eq!(reduce(&neutralized, Some(&tags)).to_string(), "true");
        assert_eq!(reduce(&neutralized, None).to_string(), "host::tag = 'host1'");
    }

    #[test]
    fn test_filter_tree_from_json() {
        let json = r#"{
            "node_type": 0,
            "value": { "logical": 0 },
            "children": [
                { "node_type": 1, "value": { "comparison": 0 }, "children": [
                    { "node_type": 3, "value": { "tag_ref_value": "_measurement" } },
                    { "node_type": 4, "value": { "string_value": "cpu" } }
                ] },
                { "node_type": 1, "value": { "comparison": 7 }, "children": [
                    { "node_type": 5, "value": { "field_ref_value": "$" } },
                    { "node_type": 4, "value": { "float_value": 90.0 } }
                ] }
            ]
        }"#;
        let node: Node = serde_json::from_str(json).unwrap();
        let expr = node_to_expr(&node, Some(&PredicateConfig::default().tag_remap())).unwrap();
        assert_eq!(expr.to_string(), r#"_name::tag = 'cpu' AND "$" > 90.0"#);
        assert_eq!(has_single_measurement_no_or(&expr), Some("cpu"));
        assert_eq!(
            rewrite_remove_field_key_and_value(&expr).to_string(),
            "_name::tag = 'cpu' AND true"
        );
    }

    #[test]
    fn test_concurrent_translation() {
        let node = storage_filter();
        let remap = TagRemap::storage_defaults();
        let expected = node_to_expr(&node, Some(&remap)).unwrap();

        thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        let expr = node_to_expr(&node, Some(&remap)).unwrap();
                        let neutralized = rewrite_remove_field_key_and_value(&expr);
                        (expr, neutralized)
                    })
                })
                .collect();
            for handle in handles {
                let (expr, neutralized) = handle.join().unwrap();
                assert_eq!(expr, expected);
                assert_eq!(neutralized.to_string(), "host::tag = 'host1' AND true AND true");
            }
        });
    }

    #[test]
    fn test_public_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Expr>();
        assert_send_sync::<Node>();
        assert_send_sync::<TagRemap>();
        assert_send_sync::<TranslateError>();
        assert_send_sync::<ParseError>();
        assert_send_sync::<ConfigError>();
        assert_send_sync::<PredicateConfig>();
    }
}
