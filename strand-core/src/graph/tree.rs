//! Dependency and observer trees for debugging.

use serde::Serialize;

use super::node::NodeId;
use super::store::DependencyGraph;

/// What a node reads, recursively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyTree {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyTree>,
}

/// Who reads a node, recursively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObserverTree {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub observers: Vec<ObserverTree>,
}

impl DependencyGraph {
    /// Build the dependency tree rooted at `node_id`.
    pub fn dependency_tree(&self, node_id: NodeId) -> Option<DependencyTree> {
        let mut path = Vec::new();
        self.dependency_subtree(node_id, &mut path)
    }

    fn dependency_subtree(&self, node_id: NodeId, path: &mut Vec<NodeId>) -> Option<DependencyTree> {
        let node = self.get(node_id)?;
        // Stop at a node already on the current path.
        if path.contains(&node_id) {
            return None;
        }
        path.push(node_id);
        let dependencies = node
            .dependencies()
            .iter()
            .filter_map(|dep| self.dependency_subtree(*dep, path))
            .collect();
        path.pop();

        Some(DependencyTree {
            name: node.name().to_string(),
            dependencies,
        })
    }

    /// Build the observer tree rooted at `node_id`.
    pub fn observer_tree(&self, node_id: NodeId) -> Option<ObserverTree> {
        let mut path = Vec::new();
        self.observer_subtree(node_id, &mut path)
    }

    fn observer_subtree(&self, node_id: NodeId, path: &mut Vec<NodeId>) -> Option<ObserverTree> {
        let node = self.get(node_id)?;
        if path.contains(&node_id) {
            return None;
        }
        path.push(node_id);
        let observers = node
            .observers()
            .iter()
            .filter_map(|obs| self.observer_subtree(*obs, path))
            .collect();
        path.pop();

        Some(ObserverTree {
            name: node.name().to_string(),
            observers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use indexmap::IndexSet;

    #[test]
    fn trees_follow_edges_both_ways() {
        let mut graph = DependencyGraph::new();
        let a = graph.insert(Node::atom("a"));
        let c = graph.insert(Node::computed("c"));
        let r = graph.insert(Node::reaction("r"));
        graph.reconcile(c, IndexSet::from([a]));
        graph.reconcile(r, IndexSet::from([c, a]));

        let deps = graph.dependency_tree(r).unwrap();
        assert_eq!(deps.name, "r");
        assert_eq!(deps.dependencies.len(), 2);
        assert_eq!(deps.dependencies[0].name, "c");
        assert_eq!(deps.dependencies[0].dependencies[0].name, "a");

        let observers = graph.observer_tree(a).unwrap();
        let names: Vec<&str> = observers.observers.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["c", "r"]);
        assert_eq!(observers.observers[0].observers[0].name, "r");
    }

    #[test]
    fn leaf_serializes_without_children() {
        let mut graph = DependencyGraph::new();
        let a = graph.insert(Node::atom("a"));
        let json = serde_json::to_string(&graph.dependency_tree(a).unwrap()).unwrap();
        assert_eq!(json, r#"{"name":"a"}"#);
    }
}
