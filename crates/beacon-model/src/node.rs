//! Node types for the discovery tree.
//!
//! A [`Node`] is a closed tagged union of the two tree shapes: grouping
//! levels ([`EnvironmentNode`]) and leaves ([`TargetNode`]). Node categories
//! (Universe, Realm, Namespace, JVM, ...) carry no behavior of their own, so
//! they are plain hierarchical string paths ([`NodeType`]) rather than types.

use crate::target::ServiceRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hierarchical category path of a node, e.g. `["Platform", "Kubernetes"]`.
///
/// The last segment is the node's kind. New categories are just new string
/// paths; no code change is required to introduce one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeType(Vec<String>);

impl NodeType {
    /// Creates a node type from a category path.
    pub fn new<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NodeType(path.into_iter().map(Into::into).collect())
    }

    /// The synthesized root kind. Exactly one Universe node exists per
    /// merged tree and it is never persisted.
    pub fn universe() -> Self {
        NodeType::new(["Universe"])
    }

    /// The kind of every plugin subtree root.
    pub fn realm() -> Self {
        NodeType::new(["Realm"])
    }

    /// The default kind for leaf target nodes.
    pub fn jvm() -> Self {
        NodeType::new(["JVM"])
    }

    /// Full category path.
    pub fn path(&self) -> &[String] {
        &self.0
    }

    /// Last path segment, the node's kind. Empty string for an empty path.
    pub fn kind(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }
}

/// A node in the discovery tree.
///
/// Deserialization discriminates on shape: an object with `children` is an
/// environment, an object with `target` is a leaf. An object carrying both
/// (a target-bearing node with children) matches neither variant and fails,
/// which is how structural errors are rejected at the wire boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    /// A grouping level owning child nodes.
    Environment(EnvironmentNode),
    /// A leaf wrapping exactly one discoverable target.
    Target(TargetNode),
}

impl Node {
    /// The node's display name.
    pub fn name(&self) -> &str {
        match self {
            Node::Environment(env) => &env.name,
            Node::Target(t) => &t.name,
        }
    }

    /// The node's server-assigned id, if one has been assigned.
    pub fn id(&self) -> Option<u64> {
        match self {
            Node::Environment(env) => env.id,
            Node::Target(t) => t.id,
        }
    }

    /// The node's category path.
    pub fn node_type(&self) -> &NodeType {
        match self {
            Node::Environment(env) => &env.node_type,
            Node::Target(t) => &t.node_type,
        }
    }
}

impl From<EnvironmentNode> for Node {
    fn from(env: EnvironmentNode) -> Self {
        Node::Environment(env)
    }
}

impl From<TargetNode> for Node {
    fn from(target: TargetNode) -> Self {
        Node::Target(target)
    }
}

/// An internal grouping node (Universe, Realm, Namespace, ...).
///
/// Children are an unordered set; [`EnvironmentNode::sort_recursive`] imposes
/// the deterministic name order used for every read of the merged tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentNode {
    /// Server-assigned id. Assigned at read time, never trusted from input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// Display name. For a realm root this equals the plugin's realm name.
    pub name: String,

    /// Category path.
    pub node_type: NodeType,

    /// Free-form labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Child nodes.
    #[serde(default)]
    pub children: Vec<Node>,
}

impl EnvironmentNode {
    /// Creates an empty environment node.
    pub fn new(name: impl Into<String>, node_type: NodeType) -> Self {
        EnvironmentNode {
            id: None,
            name: name.into(),
            node_type,
            labels: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Creates an environment node with the given children.
    pub fn with_children(
        name: impl Into<String>,
        node_type: NodeType,
        children: Vec<Node>,
    ) -> Self {
        EnvironmentNode {
            children,
            ..EnvironmentNode::new(name, node_type)
        }
    }

    /// Sorts children by name at every level, yielding the deterministic
    /// listing order promised to readers.
    pub fn sort_recursive(&mut self) {
        self.children.sort_by(|a, b| a.name().cmp(b.name()));
        for child in &mut self.children {
            if let Node::Environment(env) = child {
                env.sort_recursive();
            }
        }
    }
}

/// A leaf node wrapping one discoverable target.
///
/// Leaf-only by construction: there is no `children` field, so the
/// "every leaf is a target" invariant cannot be violated in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetNode {
    /// Server-assigned id. Assigned at read time, never trusted from input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// Display name, typically the target's alias or connect URI.
    pub name: String,

    /// Category path.
    pub node_type: NodeType,

    /// Free-form labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// The target this leaf describes.
    pub target: ServiceRef,
}

impl TargetNode {
    /// Creates a target node named after the target's alias (or connect URI
    /// when no alias is set).
    pub fn new(target: ServiceRef) -> Self {
        TargetNode {
            id: None,
            name: target.effective_alias().to_string(),
            node_type: NodeType::jvm(),
            labels: BTreeMap::new(),
            target,
        }
    }
}

/// Depth-first traversal collecting every leaf reachable from `node`.
///
/// A [`TargetNode`] yields itself; an [`EnvironmentNode`] recurses into all
/// children and concatenates their leaves in child order.
pub fn find_leaves(node: &Node) -> Vec<&TargetNode> {
    match node {
        Node::Target(t) => vec![t],
        Node::Environment(env) => env.children.iter().flat_map(find_leaves).collect(),
    }
}
