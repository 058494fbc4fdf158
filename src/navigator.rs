//! Walks a tree along a token sequence.
//!
//! Navigation is all-or-nothing: a failure at any token yields no node.

use crate::lexer::{Token, join_array, join_object};
use crate::node::{ConfigNode, NodeKind, NodeRef};
use crate::validation::{Validated, ValidationError};
use std::sync::Arc;

/// Follow `tokens` from `root`. An empty token list returns `root`.
pub fn navigate(root: &NodeRef, tokens: &[Token]) -> Validated<NodeRef> {
    let mut current = Arc::clone(root);
    let mut path = String::new();

    for token in tokens {
        let next = match (token, current.as_ref()) {
            (Token::Array(index), ConfigNode::Array { .. }) => {
                path = join_array(&path, *index);
                current
                    .get_index(*index)
                    .cloned()
                    .ok_or_else(|| ValidationError::NoResultsFoundForArrayNode {
                        path: path.clone(),
                        index: *index,
                    })
            }
            (Token::Object(name), ConfigNode::Map { .. }) => {
                path = join_object(&path, name);
                current.get_key(name).cloned().ok_or_else(|| {
                    ValidationError::NoResultsFoundForObjectNode {
                        path: path.clone(),
                        name: name.clone(),
                    }
                })
            }
            (Token::Array(_), node) => Err(ValidationError::MismatchedObjectNodeForPath {
                path: path.clone(),
                expected: NodeKind::Array,
                found: node.kind(),
            }),
            (Token::Object(_), node) => Err(ValidationError::MismatchedObjectNodeForPath {
                path: path.clone(),
                expected: NodeKind::Map,
                found: node.kind(),
            }),
        };

        match next {
            Ok(node) => current = node,
            Err(error) => return Validated::invalid(error),
        }
    }

    Validated::valid(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::PathLexer;

    fn tree() -> NodeRef {
        Arc::new(ConfigNode::map([
            (
                "db",
                ConfigNode::map([
                    ("name", ConfigNode::leaf("test")),
                    ("port", ConfigNode::leaf("3306")),
                ]),
            ),
            (
                "admin",
                ConfigNode::map([(
                    "user",
                    ConfigNode::sparse_array(vec![Some(Arc::new(ConfigNode::leaf("John"))), None]),
                )]),
            ),
        ]))
    }

    fn go(path: &str) -> Validated<NodeRef> {
        let tokens = PathLexer::default().tokenize(path).into_results().unwrap();
        navigate(&tree(), &tokens)
    }

    #[test]
    fn test_navigate_to_leaf() {
        let node = go("db.port").into_results().unwrap();
        assert_eq!(node.value(), Some("3306"));
    }

    #[test]
    fn test_navigate_array() {
        let node = go("admin.user[0]").into_results().unwrap();
        assert_eq!(node.value(), Some("John"));
    }

    #[test]
    fn test_missing_array_slot() {
        let result = go("admin.user[1]");
        assert!(!result.has_results());
        assert_eq!(
            result.errors(),
            &[ValidationError::NoResultsFoundForArrayNode {
                path: "admin.user[1]".to_string(),
                index: 1,
            }]
        );
    }

    #[test]
    fn test_missing_object() {
        let result = go("db.password");
        assert_eq!(
            result.errors(),
            &[ValidationError::NoResultsFoundForObjectNode {
                path: "db.password".to_string(),
                name: "password".to_string(),
            }]
        );
    }

    #[test]
    fn test_mismatched_kind() {
        let result = go("db[0]");
        assert!(matches!(
            result.errors()[0],
            ValidationError::MismatchedObjectNodeForPath {
                expected: NodeKind::Array,
                found: NodeKind::Map,
                ..
            }
        ));

        let result = go("db.port.value");
        assert!(matches!(
            result.errors()[0],
            ValidationError::MismatchedObjectNodeForPath {
                expected: NodeKind::Map,
                found: NodeKind::Leaf,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_tokens_returns_root() {
        let root = tree();
        let node = navigate(&root, &[]).into_results().unwrap();
        assert!(Arc::ptr_eq(&node, &root));
    }
}
