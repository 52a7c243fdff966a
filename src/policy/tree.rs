//! Compiled policy tree.
//!
//! # Responsibilities
//! - Hold one compilation generation of fragments as an arena of nodes
//! - Resolve the most specific applicable node for a request
//!
//! # Design Decisions
//! - Immutable after construction; shared via `Arc` and replaced wholesale
//! - Children are arena indices in declaration order
//! - A disabled node short-circuits resolution for its whole subtree

use axum::http::Request;

use crate::matcher::RequestMatcher;
use crate::policy::fragment::{CorsSettings, PolicyFragment};

/// Index of a node inside its tree's arena.
pub type NodeId = usize;

/// A fragment after validation and inheritance.
#[derive(Debug, Clone)]
pub struct CompiledNode {
    fragment: PolicyFragment,
    children: Vec<NodeId>,
}

impl CompiledNode {
    pub(crate) fn new(fragment: PolicyFragment, children: Vec<NodeId>) -> Self {
        Self { fragment, children }
    }

    pub fn name(&self) -> Option<&str> {
        self.fragment.name.as_deref()
    }

    pub fn parent_name(&self) -> Option<&str> {
        self.fragment.parent_name.as_deref()
    }

    pub fn matcher(&self) -> &RequestMatcher {
        &self.fragment.matcher
    }

    pub fn is_enabled(&self) -> bool {
        self.fragment.enabled
    }

    pub fn is_abstract(&self) -> bool {
        self.fragment.is_abstract
    }

    /// Effective settings: local settings merged with every enabled ancestor.
    ///
    /// Nodes below a disabled ancestor only carry their local settings.
    pub fn settings(&self) -> &CorsSettings {
        &self.fragment.settings
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The compiled fragment value, with normalized parent and effective settings.
    pub fn fragment(&self) -> &PolicyFragment {
        &self.fragment
    }
}

/// One compilation generation of the policy tree.
#[derive(Debug, Clone)]
pub struct CompiledTree {
    nodes: Vec<CompiledNode>,
}

impl CompiledTree {
    /// Build from an arena whose node 0 is the root.
    pub(crate) fn from_nodes(nodes: Vec<CompiledNode>) -> Self {
        debug_assert!(!nodes.is_empty());
        Self { nodes }
    }

    /// The sentinel tree: a single disabled root matching nothing.
    pub fn disabled() -> Self {
        Self {
            nodes: vec![CompiledNode::new(PolicyFragment::disabled(), Vec::new())],
        }
    }

    pub fn root(&self) -> &CompiledNode {
        &self.nodes[0]
    }

    /// Whether the tree as a whole is enabled.
    pub fn is_enabled(&self) -> bool {
        self.root().is_enabled()
    }

    pub fn node(&self, id: NodeId) -> Option<&CompiledNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by fragment name.
    pub fn find(&self, name: &str) -> Option<&CompiledNode> {
        self.nodes.iter().find(|n| n.name() == Some(name))
    }

    /// Iterate nodes in depth-first order from the root.
    pub fn iter(&self) -> impl Iterator<Item = &CompiledNode> {
        self.nodes.iter()
    }

    /// Resolve the node that applies to a request.
    ///
    /// Returns `None` when the root does not match. A matching disabled node
    /// is returned as-is, without consulting its children. Otherwise the first
    /// child (in declaration order) that resolves wins, falling back to the
    /// node itself.
    pub fn resolve<B>(&self, req: &Request<B>) -> Option<&CompiledNode> {
        self.resolve_from(0, req)
    }

    fn resolve_from<B>(&self, id: NodeId, req: &Request<B>) -> Option<&CompiledNode> {
        let node = &self.nodes[id];

        if !node.matcher().matches(req) {
            return None;
        }

        if !node.is_enabled() {
            return Some(node);
        }

        node.children
            .iter()
            .find_map(|&child| self.resolve_from(child, req))
            .or(Some(node))
    }
}
