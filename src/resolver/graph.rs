// src/resolver/graph.rs

//! Dependency ordering within a working set
//!
//! Nodes live in an arena indexed by insertion order. Edges are computed on
//! demand: a node depends on every other node in the set that satisfies one
//! of its declared dependencies. Nothing is looked up outside the set.

use crate::packages::spec::{Dependency, PackageSpec};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<PackageSpec>,
    lookup: HashMap<String, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a spec; returns false if its full name is already present
    pub fn add(&mut self, spec: PackageSpec) -> bool {
        let full_name = spec.full_name();
        if self.lookup.contains_key(&full_name) {
            return false;
        }
        self.lookup.insert(full_name, self.nodes.len());
        self.nodes.push(spec);
        true
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.lookup.contains_key(full_name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Specs in insertion order
    pub fn specs(&self) -> &[PackageSpec] {
        &self.nodes
    }

    fn edges(&self, index: usize) -> Vec<usize> {
        let mut targets = Vec::new();
        for dep in self.nodes[index].dependencies() {
            for (target, node) in self.nodes.iter().enumerate() {
                if target != index && dep.matches(node) && !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        targets
    }

    /// Dependencies before dependents, otherwise stable by insertion order.
    ///
    /// Each node is visited at most once, so cycles terminate; the order
    /// within a cycle is arbitrary and carries no guarantee.
    pub fn dependency_order(&self) -> Vec<&PackageSpec> {
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());

        for start in 0..self.nodes.len() {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            let mut stack = vec![(start, self.edges(start), 0usize)];

            while let Some((node, edges, next)) = stack.last_mut() {
                if let Some(&target) = edges.get(*next) {
                    *next += 1;
                    if !visited[target] {
                        visited[target] = true;
                        let target_edges = self.edges(target);
                        stack.push((target, target_edges, 0));
                    }
                } else {
                    order.push(&self.nodes[*node]);
                    stack.pop();
                }
            }
        }

        order
    }

    /// Declared dependencies that nothing in the set satisfies
    pub fn unmet_dependencies(&self) -> Vec<(&PackageSpec, &Dependency)> {
        self.nodes
            .iter()
            .flat_map(|spec| spec.dependencies().iter().map(move |dep| (spec, dep)))
            .filter(|(_, dep)| !self.nodes.iter().any(|node| dep.matches(node)))
            .collect()
    }

    /// True when every declared dependency is satisfied inside the set
    pub fn ok(&self) -> bool {
        self.unmet_dependencies().is_empty()
    }
}
