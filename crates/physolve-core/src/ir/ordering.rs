//! Module dependency graph and execution order
//!
//! Edges point from a dependency to its dependent. Among modules whose
//! dependencies are satisfied, the one with the lower domain priority runs
//! first, ties broken by id, so the order is deterministic.

use crate::error::IrError;
use crate::ir::types::Module;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

/// Dependency graph over module ids
///
/// # Invariants
///
/// - Every node id maps to exactly one module
/// - Dependencies on ids outside the graph are recorded, not added as edges
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
    priorities: HashMap<String, u8>,
    /// (module, missing dependency) pairs
    unknown: Vec<(String, String)>,
}

impl ModuleGraph {
    /// Build the graph for a set of modules
    pub fn from_modules(modules: &[Module]) -> Self {
        let mut graph = Self::default();
        for module in modules {
            let idx = graph.graph.add_node(module.id.clone());
            graph.node_map.insert(module.id.clone(), idx);
            graph
                .priorities
                .insert(module.id.clone(), module.kind.domain().priority());
        }

        for module in modules {
            let to = graph.node_map[&module.id];
            for dependency in &module.dependencies {
                match graph.node_map.get(dependency) {
                    Some(&from) => {
                        graph.graph.update_edge(from, to, ());
                    }
                    None => graph
                        .unknown
                        .push((module.id.clone(), dependency.clone())),
                }
            }
        }

        graph
    }

    /// Dependencies that named a module not in the graph
    pub fn unknown_dependencies(&self) -> &[(String, String)] {
        &self.unknown
    }

    /// Members of the first dependency cycle found, if any
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .find(|scc| {
                scc.len() > 1
                    || scc
                        .first()
                        .map(|&n| self.graph.contains_edge(n, n))
                        .unwrap_or(false)
            })
            .map(|scc| {
                let mut ids: Vec<String> = scc.iter().map(|&n| self.graph[n].clone()).collect();
                ids.sort();
                ids
            })
    }

    /// Deterministic topological order
    ///
    /// # Errors
    ///
    /// Returns [`IrError::CyclicDependency`] naming a module on the cycle.
    pub fn execution_order(&self) -> Result<Vec<String>, IrError> {
        toposort(&self.graph, None).map_err(|cycle| IrError::CyclicDependency {
            module: self.graph[cycle.node_id()].clone(),
        })?;

        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| (n, self.graph.neighbors_directed(n, Direction::Incoming).count()))
            .collect();

        let mut ready: BinaryHeap<Reverse<(u8, String)>> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&n, _)| Reverse(self.key(n)))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse((_, id))) = ready.pop() {
            let idx = self.node_map[&id];
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(d) = in_degree.get_mut(&next) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push(Reverse(self.key(next)));
                    }
                }
            }
            order.push(id);
        }

        Ok(order)
    }

    /// Modules grouped by dependency depth; members of a group are independent
    pub fn parallel_groups(&self) -> Result<Vec<Vec<String>>, IrError> {
        let order = self.execution_order()?;
        let mut depth: HashMap<NodeIndex, usize> = HashMap::new();
        let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();

        for id in order {
            let idx = self.node_map[&id];
            let level = self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .filter_map(|p| depth.get(&p))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(idx, level);
            groups.entry(level).or_default().push(id);
        }

        Ok(groups.into_values().collect())
    }

    fn key(&self, idx: NodeIndex) -> (u8, String) {
        let id = self.graph[idx].clone();
        let priority = self.priorities.get(&id).copied().unwrap_or(u8::MAX);
        (priority, id)
    }
}

/// Execution order for a set of modules
pub fn execution_order(modules: &[Module]) -> Result<Vec<String>, IrError> {
    ModuleGraph::from_modules(modules).execution_order()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::library::{generic_module, ModuleKind};
    use std::collections::BTreeMap as Map;

    fn module(kind: ModuleKind, deps: &[&str]) -> Module {
        let mut m = kind.template().unwrap().instantiate(&Map::new());
        m.dependencies = deps.iter().map(|d| d.to_string()).collect();
        m
    }

    fn custom(id: &str, deps: &[&str]) -> Module {
        let mut m = generic_module(&[]);
        m.id = id.to_string();
        m.kind = ModuleKind::Custom;
        m.dependencies = deps.iter().map(|d| d.to_string()).collect();
        m
    }

    #[test]
    fn test_dependencies_run_first() {
        let modules = vec![
            module(ModuleKind::Power, &["work_energy"]),
            module(ModuleKind::WorkEnergy, &["newton_second_law"]),
            module(ModuleKind::NewtonSecondLaw, &[]),
        ];
        let order = execution_order(&modules).unwrap();
        assert_eq!(order, vec!["newton_second_law", "work_energy", "power"]);
    }

    #[test]
    fn test_domain_priority_breaks_ties() {
        let modules = vec![
            module(ModuleKind::Refraction, &[]),
            module(ModuleKind::ElectricCircuit, &[]),
            module(ModuleKind::FreeFall, &[]),
            module(ModuleKind::NewtonSecondLaw, &[]),
        ];
        let order = execution_order(&modules).unwrap();
        assert_eq!(
            order,
            vec!["free_fall", "newton_second_law", "electric_circuit", "refraction"]
        );
    }

    #[test]
    fn test_order_is_deterministic() {
        let a = vec![custom("b", &[]), custom("a", &[]), custom("c", &["a"])];
        let b = vec![custom("c", &["a"]), custom("a", &[]), custom("b", &[])];
        assert_eq!(execution_order(&a).unwrap(), execution_order(&b).unwrap());
        assert_eq!(execution_order(&a).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let modules = vec![custom("a", &["b"]), custom("b", &["a"])];
        match execution_order(&modules) {
            Err(IrError::CyclicDependency { module }) => {
                assert!(module == "a" || module == "b");
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
        let graph = ModuleGraph::from_modules(&modules);
        assert_eq!(graph.detect_cycle(), Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let modules = vec![custom("solo", &["solo"])];
        assert!(execution_order(&modules).is_err());
        assert!(ModuleGraph::from_modules(&modules).detect_cycle().is_some());
    }

    #[test]
    fn test_unknown_dependencies_recorded() {
        let modules = vec![custom("a", &["ghost"])];
        let graph = ModuleGraph::from_modules(&modules);
        assert_eq!(
            graph.unknown_dependencies(),
            &[("a".to_string(), "ghost".to_string())]
        );
        assert_eq!(graph.execution_order().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_parallel_groups() {
        let modules = vec![
            custom("root", &[]),
            custom("left", &["root"]),
            custom("right", &["root"]),
            custom("join", &["left", "right"]),
        ];
        let groups = ModuleGraph::from_modules(&modules).parallel_groups().unwrap();
        assert_eq!(
            groups,
            vec![
                vec!["root".to_string()],
                vec!["left".to_string(), "right".to_string()],
                vec!["join".to_string()],
            ]
        );
    }
}
