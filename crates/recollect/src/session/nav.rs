//! Navigation tree: the record of clusters visited and the alternatives the
//! user could still take. Append-only during a session except on backtrack,
//! where nodes deeper than the restore point are discarded and the restored
//! node's siblings are preserved as branches to explore.

use serde::Serialize;

pub const ROOT_NODE_ID: &str = "root";

#[derive(Debug, Clone, Serialize)]
pub struct NavNode {
    pub node_id: String,
    pub label: String,
    pub depth: u32,
    pub parent_node_id: Option<String>,
    pub round: u32,
    pub cluster_id: Option<i32>,
    pub on_path: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NavTree {
    nodes: Vec<NavNode>,
    seq: u64,
}

impl NavTree {
    pub fn add_root(&mut self, label: &str) {
        self.nodes.push(NavNode {
            node_id: ROOT_NODE_ID.to_string(),
            label: label.to_string(),
            depth: 0,
            parent_node_id: None,
            round: 0,
            cluster_id: None,
            on_path: true,
        });
    }

    /// Insert one child per cluster under `parent_id`, none on-path yet.
    /// Ids are `c<cluster>-r<round>`; a collision (possible after re-entering
    /// a branch post-backtrack) gets a monotonic suffix.
    pub fn add_children(&mut self, parent_id: &str, round: u32, children: &[(i32, String)]) {
        let depth = self
            .get(parent_id)
            .map(|p| p.depth + 1)
            .unwrap_or(round);
        for (cluster_id, label) in children {
            let mut node_id = format!("c{}-r{}", cluster_id, round);
            if self.get(&node_id).is_some() {
                self.seq += 1;
                node_id = format!("{}-n{}", node_id, self.seq);
            }
            self.nodes.push(NavNode {
                node_id,
                label: label.clone(),
                depth,
                parent_node_id: Some(parent_id.to_string()),
                round,
                cluster_id: Some(*cluster_id),
                on_path: false,
            });
        }
    }

    pub fn get(&self, node_id: &str) -> Option<&NavNode> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    /// The child of `parent_id` created at `round` for `cluster_id`.
    pub fn child_for(&self, parent_id: &str, round: u32, cluster_id: i32) -> Option<&NavNode> {
        self.nodes.iter().find(|n| {
            n.round == round
                && n.cluster_id == Some(cluster_id)
                && n.parent_node_id.as_deref() == Some(parent_id)
        })
    }

    /// Mark a node on-path and its siblings off-path.
    pub fn mark_on_path(&mut self, node_id: &str) -> bool {
        let Some(target) = self.get(node_id) else {
            return false;
        };
        let parent = target.parent_node_id.clone();
        let round = target.round;
        for node in &mut self.nodes {
            if node.round == round && node.parent_node_id == parent {
                node.on_path = node.node_id == node_id;
            }
        }
        true
    }

    /// Drop every node deeper than `round`; at `round`, only `restore_id`
    /// stays on-path among its siblings.
    pub fn prune_beyond(&mut self, round: u32, restore_id: &str) {
        self.nodes.retain(|n| n.round <= round);
        let parent = self
            .get(restore_id)
            .and_then(|n| n.parent_node_id.clone());
        for node in &mut self.nodes {
            if node.round == round && node.parent_node_id == parent {
                node.on_path = node.node_id == restore_id;
            }
        }
    }

    pub fn nodes(&self) -> &[NavNode] {
        &self.nodes
    }
}
