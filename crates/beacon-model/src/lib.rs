//! # Beacon Tree Model
//!
//! The discovery tree is the hierarchical inventory of monitorable JVM
//! targets. Plugins contribute subtrees; the registry merges them under a
//! synthesized "Universe" root and diffs successive versions to derive
//! discovery events.
//!
//! ## Structure
//!
//! ```text
//!                     Universe
//!                    ┌────┴─────┐
//!                 Realm A    Realm B          ← one per plugin registration
//!                ┌───┴───┐      │
//!            Namespace  JVM    JVM            ← EnvironmentNode / TargetNode
//!                │
//!               JVM
//! ```
//!
//! ## Invariants
//!
//! - Every reachable leaf is a [`TargetNode`]; every internal node is an
//!   [`EnvironmentNode`]. The closed [`Node`] enum makes any other shape
//!   unrepresentable in memory; malformed wire input fails deserialization
//!   and is rejected at the boundary.
//! - Nodes are never mutated in place once handed out. Updates replace whole
//!   subtrees, so concurrent readers always observe a consistent snapshot.
//! - Node `id`s are assigned at read/serialize time by the registry and are
//!   never trusted from input.

mod node;
mod target;

pub use node::{find_leaves, EnvironmentNode, Node, NodeType, TargetNode};
pub use target::{AnnotationKey, ServiceRef};

/// Label key stamped onto a plugin's subtree root at registration time,
/// carrying the owning plugin's id so any node can be traced back to its
/// registration.
pub const REALM_LABEL: &str = "REALM";
