use std::collections::HashSet;

use rand::prelude::IndexedRandom;
use rand::Rng;

use crate::error::{Error, Result};
use crate::job::JobInfo;
use crate::layered_graph::node::LayerNode;
use crate::scheduling::{GraphSnapshot, PathStep, SchedulingPolicy};

/// Walks from source to destination, at each step either running an unused
/// model on the current node or hopping to a random neighbor, until the
/// destination is reached with no unused model left to run there.
#[derive(Debug, Default)]
pub struct RandomSelection;

impl RandomSelection {
    pub fn new() -> Self {
        Self
    }

    fn random_neighbor(current: &LayerNode, graph: &GraphSnapshot) -> Result<LayerNode> {
        let neighbors: Vec<&LayerNode> = graph.neighbors(current).iter().filter(|candidate| *candidate != current).collect();
        let mut rng = rand::rng();
        neighbors.choose(&mut rng).map(|node| (*node).clone()).ok_or_else(|| Error::NoRoute(current.ip().to_string(), String::new()))
    }
}

impl SchedulingPolicy for RandomSelection {
    fn get_path(&self, job: &JobInfo, graph: &GraphSnapshot) -> Result<Vec<PathStep>> {
        let destination = LayerNode::new(job.terminal_destination.clone(), vec![]);
        let mut current = LayerNode::new(job.source_ip.clone(), vec![]);
        let mut used: HashSet<String> = HashSet::new();
        let mut path = Vec::new();
        let mut rng = rand::rng();

        loop {
            let current_node = graph.neighbors(&current).iter().find(|node| *node == &current).cloned().unwrap_or_else(|| current.clone());
            let unused: Vec<&String> = current_node.model_names().iter().filter(|name| !used.contains(*name)).collect();

            if unused.is_empty() {
                if current == destination {
                    break;
                }
                let next = Self::random_neighbor(&current, graph)?;
                path.push((current.clone(), next.clone(), String::new()));
                current = next;
                continue;
            }

            if rng.random_bool(0.5) {
                let model = (*unused.choose(&mut rng).expect("unused is non-empty")).clone();
                path.push((current.clone(), current.clone(), model.clone()));
                used.insert(model);
                continue;
            }

            if current == destination {
                break;
            }
            let next = Self::random_neighbor(&current, graph)?;
            path.push((current.clone(), next.clone(), String::new()));
            current = next;
        }

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn job(source: &str, destination: &str) -> JobInfo {
        JobInfo::new("j", "dnn", 10.0, source, destination, 1)
    }

    fn single_node_graph(ip: &str, models: Vec<&str>) -> GraphSnapshot {
        let node = LayerNode::new(ip, models.into_iter().map(String::from).collect());
        let mut adjacency = HashMap::new();
        adjacency.insert(node.clone(), vec![node]);
        GraphSnapshot::new(adjacency)
    }

    #[test]
    fn single_node_with_no_models_stops_immediately() {
        let policy = RandomSelection::new();
        let graph = single_node_graph("10.0.0.1", vec![]);
        let path = policy.get_path(&job("10.0.0.1", "10.0.0.1"), &graph).unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn single_node_runs_its_only_model_then_stops() {
        let policy = RandomSelection::new();
        let graph = single_node_graph("10.0.0.1", vec!["m"]);
        let path = policy.get_path(&job("10.0.0.1", "10.0.0.1"), &graph).unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].0, path[0].1);
        assert_eq!(path[0].2, "m");
    }

    #[test]
    fn path_endpoints_match_job_source_and_destination() {
        let a = LayerNode::new("10.0.0.1", vec!["m".to_string()]);
        let b = LayerNode::new("10.0.0.2", vec!["m".to_string()]);
        let mut adjacency = HashMap::new();
        adjacency.insert(a.clone(), vec![a.clone(), b.clone()]);
        adjacency.insert(b.clone(), vec![a.clone(), b.clone()]);
        let graph = GraphSnapshot::new(adjacency);

        let policy = RandomSelection::new();
        let path = policy.get_path(&job("10.0.0.1", "10.0.0.2"), &graph).unwrap();
        assert_eq!(path.first().unwrap().0.ip(), "10.0.0.1");
        assert_eq!(path.last().unwrap().1.ip(), "10.0.0.2");
    }
}
