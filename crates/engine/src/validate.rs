//! Tree validation: run this when loading an authored tree, before it is
//! executed.
//!
//! Rules enforced:
//! 1. Action ids are unique within the tree.
//! 2. Every child's `parent_id` points at the node that contains it.
//! 3. Every node belongs to the root's project.
//! 4. Every node's options parse into its step's configuration.
//! 5. The tree is no deeper than the configured maximum.
//!
//! The executor does not require any of this: a malformed node there is
//! simply a Failed step.

use std::collections::HashSet;

use activities::{ActionId, ActionNode};

use crate::EngineError;

/// Validate the tree and return the number of nodes in it.
///
/// # Errors
/// The first violated rule, in pre-order.
pub fn validate_tree(root: &ActionNode, max_depth: usize) -> Result<usize, EngineError> {
    let mut seen: HashSet<ActionId> = HashSet::new();
    let mut stack: Vec<(&ActionNode, usize)> = vec![(root, 0)];

    while let Some((node, depth)) = stack.pop() {
        if !seen.insert(node.id) {
            return Err(EngineError::DuplicateActionId(node.id));
        }
        if depth > max_depth {
            return Err(EngineError::TooDeep { action_id: node.id, max_depth });
        }
        if node.project_id != root.project_id {
            return Err(EngineError::ForeignProject {
                action_id: node.id,
                project_id: node.project_id,
                expected: root.project_id,
            });
        }
        node.config()
            .map_err(|source| EngineError::InvalidConfig { action_id: node.id, source })?;

        for child in node.children.iter().rev() {
            if child.parent_id != Some(node.id) {
                return Err(EngineError::BrokenParentLink {
                    action_id: child.id,
                    expected: node.id,
                    found: child.parent_id,
                });
            }
            stack.push((child, depth + 1));
        }
    }

    Ok(seen.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use activities::ActionType;
    use serde_json::json;

    fn tree() -> ActionNode {
        ActionNode::new(1, 1, ActionType::Sequence, "root").with_children([
            ActionNode::new(2, 1, ActionType::SetTags, "tag").with_options(json!({ "include": [4] })),
            ActionNode::new(3, 1, ActionType::Schedule, "later")
                .with_options(json!({ "offsetTime": "1.00:00" }))
                .with_children([ActionNode::new(4, 1, ActionType::Log, "log")]),
        ])
    }

    #[test]
    fn well_formed_tree_passes() {
        assert_eq!(validate_tree(&tree(), 64).unwrap(), 4);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut root = tree();
        root.children[1].children[0].id = 2;
        assert!(matches!(validate_tree(&root, 64), Err(EngineError::DuplicateActionId(2))));
    }

    #[test]
    fn broken_parent_link_is_rejected() {
        let mut root = tree();
        root.children[0].parent_id = Some(9);
        assert!(matches!(
            validate_tree(&root, 64),
            Err(EngineError::BrokenParentLink { action_id: 2, expected: 1, found: Some(9) })
        ));
    }

    #[test]
    fn foreign_project_is_rejected() {
        let mut root = tree();
        root.children[1].children[0].project_id = 2;
        assert!(matches!(validate_tree(&root, 64), Err(EngineError::ForeignProject { action_id: 4, .. })));
    }

    #[test]
    fn bad_config_is_rejected() {
        let mut root = tree();
        root.children[1].options = json!({ "offsetTime": "soon" });
        assert!(matches!(validate_tree(&root, 64), Err(EngineError::InvalidConfig { action_id: 3, .. })));
    }

    #[test]
    fn depth_limit_is_enforced() {
        assert!(matches!(validate_tree(&tree(), 1), Err(EngineError::TooDeep { action_id: 4, max_depth: 1 })));
    }
}
