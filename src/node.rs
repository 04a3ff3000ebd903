//! Filter Tree nodes as carried by the storage-read protocol.
//!
//! Enumerations travel as raw `i32` wire codes so that a tree built by a
//! newer peer still deserializes; [`crate::translate`] rejects codes it does
//! not know instead of guessing a mapping.

use serde::{Deserialize, Serialize};

/// One node of a Filter Tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Wire code of a [`NodeType`].
    pub node_type: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<NodeValue>,
}

/// Payload of a node. Which variant is valid depends on the node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeValue {
    StringValue(String),
    BoolValue(bool),
    IntValue(i64),
    UintValue(u64),
    FloatValue(f64),
    RegexValue(String),
    /// Nanoseconds.
    DurationValue(i64),
    /// Tag keys are raw bytes on the wire. JSON accepts a string or a byte array.
    TagRefValue(#[serde(with = "tag_bytes")] Vec<u8>),
    FieldRefValue(String),
    /// Wire code of a [`Logical`].
    Logical(i32),
    /// Wire code of a [`Comparison`].
    Comparison(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum NodeType {
    LogicalExpression = 0,
    ComparisonExpression = 1,
    ParenExpression = 2,
    TagRef = 3,
    Literal = 4,
    FieldRef = 5,
}

impl TryFrom<i32> for NodeType {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, i32> {
        Ok(match code {
            0 => NodeType::LogicalExpression,
            1 => NodeType::ComparisonExpression,
            2 => NodeType::ParenExpression,
            3 => NodeType::TagRef,
            4 => NodeType::Literal,
            5 => NodeType::FieldRef,
            unknown => return Err(unknown),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Comparison {
    Equal = 0,
    NotEqual = 1,
    StartsWith = 2,
    Regex = 3,
    NotRegex = 4,
    Lt = 5,
    Lte = 6,
    Gt = 7,
    Gte = 8,
}

impl TryFrom<i32> for Comparison {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, i32> {
        Ok(match code {
            0 => Comparison::Equal,
            1 => Comparison::NotEqual,
            2 => Comparison::StartsWith,
            3 => Comparison::Regex,
            4 => Comparison::NotRegex,
            5 => Comparison::Lt,
            6 => Comparison::Lte,
            7 => Comparison::Gt,
            8 => Comparison::Gte,
            unknown => return Err(unknown),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Logical {
    And = 0,
    Or = 1,
}

impl TryFrom<i32> for Logical {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, i32> {
        match code {
            0 => Ok(Logical::And),
            1 => Ok(Logical::Or),
            unknown => Err(unknown),
        }
    }
}

impl Node {
    pub fn logical(op: Logical, children: Vec<Node>) -> Self {
        Self {
            node_type: NodeType::LogicalExpression as i32,
            children,
            value: Some(NodeValue::Logical(op as i32)),
        }
    }

    pub fn comparison(op: Comparison, lhs: Node, rhs: Node) -> Self {
        Self {
            node_type: NodeType::ComparisonExpression as i32,
            children: vec![lhs, rhs],
            value: Some(NodeValue::Comparison(op as i32)),
        }
    }

    pub fn paren(child: Node) -> Self {
        Self {
            node_type: NodeType::ParenExpression as i32,
            children: vec![child],
            value: None,
        }
    }

    pub fn tag_ref(name: impl AsRef<[u8]>) -> Self {
        Self {
            node_type: NodeType::TagRef as i32,
            children: Vec::new(),
            value: Some(NodeValue::TagRefValue(name.as_ref().to_vec())),
        }
    }

    pub fn field_ref(name: impl Into<String>) -> Self {
        Self {
            node_type: NodeType::FieldRef as i32,
            children: Vec::new(),
            value: Some(NodeValue::FieldRefValue(name.into())),
        }
    }

    pub fn literal(value: NodeValue) -> Self {
        Self {
            node_type: NodeType::Literal as i32,
            children: Vec::new(),
            value: Some(value),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::literal(NodeValue::StringValue(value.into()))
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self::literal(NodeValue::RegexValue(pattern.into()))
    }

    pub fn float(value: f64) -> Self {
        Self::literal(NodeValue::FloatValue(value))
    }

    /// Number of nodes in the tree, this one included. Iterative, so any
    /// depth is fine.
    pub fn size(&self) -> usize {
        let mut pending = vec![self];
        let mut size = 0;
        while let Some(node) = pending.pop() {
            size += 1;
            pending.extend(&node.children);
        }
        size
    }
}

mod tag_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(bytes) {
            Ok(text) => serializer.serialize_str(text),
            Err(_) => bytes.serialize(serializer),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Raw(Vec<u8>),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text.into_bytes(),
            Repr::Raw(bytes) => bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_from_json() {
        let json = r#"{
            "node_type": 1,
            "value": { "comparison": 0 },
            "children": [
                { "node_type": 3, "value": { "tag_ref_value": "host" } },
                { "node_type": 4, "value": { "string_value": "host1" } }
            ]
        }"#;
        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(
            node,
            Node::comparison(Comparison::Equal, Node::tag_ref("host"), Node::string("host1"))
        );
    }

    #[test]
    fn test_tag_ref_accepts_byte_array() {
        let json = r#"{ "node_type": 3, "value": { "tag_ref_value": [104, 111, 115, 116] } }"#;
        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(node, Node::tag_ref("host"));
    }

    #[test]
    fn test_non_utf8_tag_ref_serializes_as_bytes() {
        let node = Node::tag_ref([0xffu8, 0x00]);
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(json, r#"{"node_type":3,"value":{"tag_ref_value":[255,0]}}"#);
    }

    #[test]
    fn test_unknown_codes_still_deserialize() {
        let json = r#"{ "node_type": 42, "value": { "comparison": 99 } }"#;
        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(NodeType::try_from(node.node_type), Err(42));
        assert_eq!(node.value, Some(NodeValue::Comparison(99)));
        assert_eq!(Comparison::try_from(99), Err(99));
        assert_eq!(Logical::try_from(1), Ok(Logical::Or));
    }

    #[test]
    fn test_size() {
        let node = Node::logical(
            Logical::And,
            vec![
                Node::comparison(Comparison::Equal, Node::tag_ref("a"), Node::string("b")),
                Node::paren(Node::comparison(Comparison::Lt, Node::field_ref("$"), Node::float(1.0))),
            ],
        );
        assert_eq!(node.size(), 8);
    }

    #[test]
    fn test_size_of_deep_tree() {
        let mut node = Node::string("x");
        for _ in 0..100_000 {
            node = Node::paren(node);
        }
        assert_eq!(node.size(), 100_001);

        while let Some(child) = node.children.pop() {
            node = child;
        }
        assert_eq!(node.size(), 1);
    }
}
