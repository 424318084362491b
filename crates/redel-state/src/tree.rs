//! Read-only tree snapshot of the kani delegation hierarchy.

use serde::Serialize;

use redel_core::RunState;

/// One node in a [`snapshot`](crate::SessionStore::snapshot_tree) of the
/// delegation tree, with children resolved into nested values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    /// Kani ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Run state at snapshot time.
    pub state: RunState,
    /// Depth in the tree (0 for the root).
    pub depth: u32,
    /// Resolved children, in the parent's declared order.
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Total number of nodes in this subtree, including `self`.
    #[must_use]
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TreeNode::size).sum::<usize>()
    }

    /// Depth-first pre-order iteration over all node IDs in this subtree.
    pub fn ids(&self) -> Vec<&str> {
        let mut out = Vec::with_capacity(self.size());
        self.collect_ids(&mut out);
        out
    }

    fn collect_ids<'a>(&'a self, out: &mut Vec<&'a str>) {
        out.push(&self.id);
        for child in &self.children {
            child.collect_ids(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: &str, depth: u32) -> TreeNode {
        TreeNode {
            id: id.into(),
            name: id.into(),
            state: RunState::Stopped,
            depth,
            children: vec![],
        }
    }

    #[test]
    fn size_counts_all_nodes() {
        let tree = TreeNode {
            children: vec![leaf("a", 1), leaf("b", 1)],
            ..leaf("root", 0)
        };
        assert_eq!(tree.size(), 3);
    }

    #[test]
    fn ids_are_preorder() {
        let tree = TreeNode {
            children: vec![
                TreeNode {
                    children: vec![leaf("a1", 2)],
                    ..leaf("a", 1)
                },
                leaf("b", 1),
            ],
            ..leaf("root", 0)
        };
        assert_eq!(tree.ids(), vec!["root", "a", "a1", "b"]);
    }
}
