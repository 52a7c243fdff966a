//! Policy tree compilation.
//!
//! # Responsibilities
//! - Copy and index declared fragments by name
//! - Link children to parents, rejecting dangling parents and cycles
//! - Propagate effective settings from the root down
//!
//! # Design Decisions
//! - Pure function: `Option<&[PolicyFragment]>` → `CompiledTree`
//! - Structural problems never error; they are logged and degrade to a
//!   smaller tree or to the disabled sentinel
//! - First declaration of a name wins
//! - An invalid fragment takes its whole subtree with it; orphans are not
//!   reparented to the root

use std::collections::{HashMap, HashSet};

use crate::policy::fragment::{CorsSettings, PolicyFragment, ROOT_NAME};
use crate::policy::tree::{CompiledNode, CompiledTree};

/// Compile a list of fragments into a policy tree.
///
/// `None`, an empty list or a list without a `"root"` fragment all compile to
/// [`CompiledTree::disabled`].
pub fn compile(fragments: Option<&[PolicyFragment]>) -> CompiledTree {
    let fragments = match fragments {
        Some(fragments) if !fragments.is_empty() => fragments,
        _ => return CompiledTree::disabled(),
    };

    let mut compilation = Compilation::index(fragments);

    let Some(root) = compilation.by_name.get(ROOT_NAME).copied() else {
        tracing::warn!("There is no root CORS fragment. Assuming CORS disabled.");
        return CompiledTree::disabled();
    };

    compilation.build_tree();

    if !compilation.drafts[root].alive {
        tracing::warn!("The root CORS fragment was removed. Assuming CORS disabled.");
        return CompiledTree::disabled();
    }

    compilation.propagate(root);
    compilation.freeze(root)
}

#[derive(Debug, Default)]
struct Draft {
    fragment: PolicyFragment,
    children: Vec<usize>,
    alive: bool,
}

struct Compilation {
    drafts: Vec<Draft>,
    by_name: HashMap<String, usize>,
}

impl Compilation {
    fn index(fragments: &[PolicyFragment]) -> Self {
        let mut drafts = Vec::with_capacity(fragments.len());
        let mut by_name = HashMap::new();

        for fragment in fragments {
            let mut copy = fragment.clone();
            copy.parent_name = copy.effective_parent_name().map(str::to_string);

            if let Some(name) = &copy.name {
                if by_name.contains_key(name) {
                    tracing::warn!(
                        fragment = %name,
                        "Found same named CORS fragment. Ignoring duplicate."
                    );
                    continue;
                }
                by_name.insert(name.clone(), drafts.len());
            }

            drafts.push(Draft {
                fragment: copy,
                children: Vec::new(),
                alive: true,
            });
        }

        Self { drafts, by_name }
    }

    fn build_tree(&mut self) {
        let mut invalid = Vec::new();

        for id in 0..self.drafts.len() {
            let Some(parent_name) = self.drafts[id].fragment.parent_name.clone() else {
                continue;
            };

            let Some(parent) = self.by_name.get(&parent_name).copied() else {
                tracing::warn!(
                    fragment = %label(&self.drafts[id].fragment),
                    parent = %parent_name,
                    "CORS fragment references undefined parent. Ignoring it and all its descendants."
                );
                invalid.push(id);
                continue;
            };

            if !self.add_child(parent, id) {
                tracing::warn!(
                    fragment = %label(&self.drafts[id].fragment),
                    parent = %parent_name,
                    "CORS fragment would create a cycle if added to its parent. Ignoring it and all its descendants."
                );
                invalid.push(id);
            }
        }

        for id in invalid {
            self.remove_subtree(id);
        }
    }

    /// Link `child` below `parent` unless `parent` is `child` or one of its descendants.
    fn add_child(&mut self, parent: usize, child: usize) -> bool {
        if self.reaches(child, parent) {
            return false;
        }

        self.drafts[parent].children.push(child);
        true
    }

    /// Whether `target` is `from` itself or below it.
    fn reaches(&self, from: usize, target: usize) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];

        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if visited.insert(id) {
                stack.extend(self.drafts[id].children.iter().copied());
            }
        }

        false
    }

    fn remove_subtree(&mut self, id: usize) {
        let mut stack = vec![id];

        while let Some(id) = stack.pop() {
            let draft = &mut self.drafts[id];
            if !draft.alive {
                continue;
            }
            draft.alive = false;
            stack.extend(draft.children.iter().copied());
        }
    }

    fn propagate(&mut self, root: usize) {
        let mut stack: Vec<(usize, Option<CorsSettings>)> = vec![(root, None)];

        while let Some((id, inherited)) = stack.pop() {
            let draft = &mut self.drafts[id];

            // Below a disabled fragment only local settings apply.
            if !draft.fragment.enabled {
                continue;
            }

            if let Some(inherited) = inherited {
                draft.fragment.settings.inherit_from(&inherited);
            }

            for &child in &draft.children {
                stack.push((child, Some(draft.fragment.settings.clone())));
            }
        }
    }

    /// Lay the live nodes out in depth-first order, root first.
    fn freeze(mut self, root: usize) -> CompiledTree {
        let mut order = Vec::new();
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            order.push(id);
            for &child in self.drafts[id].children.iter().rev() {
                if self.drafts[child].alive {
                    stack.push(child);
                }
            }
        }

        let mut remap = vec![usize::MAX; self.drafts.len()];
        for (new_id, &old_id) in order.iter().enumerate() {
            remap[old_id] = new_id;
        }

        let nodes = order
            .iter()
            .map(|&old_id| {
                let draft = std::mem::take(&mut self.drafts[old_id]);
                let children = draft
                    .children
                    .iter()
                    .map(|&c| remap[c])
                    .filter(|&c| c != usize::MAX)
                    .collect();
                CompiledNode::new(draft.fragment, children)
            })
            .collect();

        let tree = CompiledTree::from_nodes(nodes);
        tracing::debug!(nodes = tree.len(), "CORS policy tree compiled");
        tree
    }
}

fn label(fragment: &PolicyFragment) -> String {
    match &fragment.name {
        Some(name) => name.clone(),
        None => format!("<unnamed {:?}>", fragment.matcher),
    }
}
