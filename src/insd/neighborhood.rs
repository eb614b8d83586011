//! Neighbor topology
//!
//! Two nodes are neighbors when their ground distance is within the
//! configured radius. The table is symmetric and never lists a node as its
//! own neighbor.

use std::collections::HashMap;

use crate::config::defaults::EARTH_RADIUS_M;
use crate::types::Node;

/// Great-circle distance between two lat/lng points (m).
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

#[derive(Debug, Clone, Default)]
pub struct Neighborhood {
    radius_m: f64,
    neighbors: HashMap<String, Vec<String>>,
}

impl Neighborhood {
    pub fn new(radius_m: f64) -> Self {
        Self {
            radius_m,
            neighbors: HashMap::new(),
        }
    }

    /// Build the table for a node set.
    pub fn from_nodes(nodes: &[Node], radius_m: f64) -> Self {
        let mut hood = Self::new(radius_m);
        hood.rebuild(nodes);
        hood
    }

    /// Recompute every neighbor list. O(n²), run once per registry change.
    pub fn rebuild(&mut self, nodes: &[Node]) {
        self.neighbors.clear();
        for node in nodes {
            let mut near: Vec<String> = nodes
                .iter()
                .filter(|other| other.id != node.id)
                .filter(|other| {
                    haversine_m(node.lat, node.lng, other.lat, other.lng) <= self.radius_m
                })
                .map(|other| other.id.clone())
                .collect();
            near.sort();
            self.neighbors.insert(node.id.clone(), near);
        }
    }

    /// Neighbors of a node; empty for unknown nodes.
    pub fn neighbors_of(&self, node_id: &str) -> &[String] {
        self.neighbors.get(node_id).map_or(&[], Vec::as_slice)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.neighbors.contains_key(node_id)
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_one_millidegree_latitude() {
        // 0.001° of latitude ≈ 111 m
        let d = haversine_m(41.0, 28.0, 41.001, 28.0);
        assert!((d - 111.2).abs() < 0.5, "got {d}");
        assert_eq!(haversine_m(41.0, 28.0, 41.0, 28.0), 0.0);
    }

    #[test]
    fn test_neighbors_within_radius_symmetric() {
        let nodes = vec![
            Node::new("a", "A", 41.0280, 28.9450),
            Node::new("b", "B", 41.0290, 28.9450), // ~111 m north of a
            Node::new("c", "C", 41.0310, 28.9500), // far away
        ];
        let hood = Neighborhood::from_nodes(&nodes, 300.0);
        assert_eq!(hood.neighbors_of("a"), ["b".to_string()]);
        assert_eq!(hood.neighbors_of("b"), ["a".to_string()]);
        assert!(hood.neighbors_of("c").is_empty());
        assert!(hood.neighbors_of("unknown").is_empty());
    }
}
