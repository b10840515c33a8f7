// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Dependency Graph
//!
//! Service-to-service references (links, volumes-from, network namespace
//! sources, `depends_on`) form a directed graph. Lifecycle operations walk it
//! in layers: `up`/`create`/`start` visit dependencies before dependents,
//! `stop`/`kill`/`pause`/`down` visit dependents first.
//!
//! Cycles are rejected when the graph is built, before any engine call.

use crate::domain::error::ProjectError;
use crate::domain::project::Project;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// Order in which a plan is walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkDirection {
    /// Dependencies before dependents (`up`, `create`, `start`, `unpause`).
    DependenciesFirst,
    /// Dependents before dependencies (`stop`, `kill`, `pause`, `down`).
    DependentsFirst,
}

/// Layered execution order over a set of services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    layers: Vec<Vec<String>>,
    /// For each service, the services in this plan that must finish first.
    blockers: HashMap<String, Vec<String>>,
    direction: WalkDirection,
}

impl ExecutionPlan {
    pub fn layers(&self) -> &[Vec<String>] {
        &self.layers
    }

    pub fn direction(&self) -> WalkDirection {
        self.direction
    }

    /// Services in walk order.
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().flatten().map(String::as_str)
    }

    pub fn blockers(&self, service: &str) -> &[String] {
        self.blockers.get(service).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Directed graph with an edge `dependency -> dependent` for every reference.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
    /// Project declaration order, used for deterministic tie-breaking.
    order: HashMap<String, usize>,
}

impl DependencyGraph {
    /// Build the graph for a project.
    ///
    /// # Errors
    ///
    /// `DependencyCycle` when services reference each other circularly.
    pub fn build(project: &Project) -> Result<Self, ProjectError> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let mut order = HashMap::new();

        for (position, service) in project.services().iter().enumerate() {
            let idx = graph.add_node(service.name.clone());
            index.insert(service.name.clone(), idx);
            order.insert(service.name.clone(), position);
        }

        for service in project.services() {
            let dependent = index[&service.name];
            for dependency in service.dependency_names() {
                // Unknown names are rejected by Project validation.
                if let Some(&dependency) = index.get(dependency) {
                    graph.update_edge(dependency, dependent, ());
                }
            }
        }

        let built = Self {
            graph,
            index,
            order,
        };
        built.check_for_cycles()?;
        Ok(built)
    }

    fn check_for_cycles(&self) -> Result<(), ProjectError> {
        if toposort(&self.graph, None).is_ok() {
            return Ok(());
        }

        let mut components: Vec<Vec<NodeIndex>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .collect();
        components.sort_by_key(|scc| {
            scc.iter()
                .map(|idx| self.order[&self.graph[*idx]])
                .min()
                .unwrap_or(usize::MAX)
        });

        let cycle = components
            .first()
            .map(|scc| self.cycle_path(scc))
            .unwrap_or_default();
        Err(ProjectError::DependencyCycle(cycle))
    }

    /// Walk "depends on" edges inside a strongly connected component until we
    /// return to the start, producing e.g. `["web", "db", "web"]`.
    fn cycle_path(&self, scc: &[NodeIndex]) -> Vec<String> {
        let members: HashSet<NodeIndex> = scc.iter().copied().collect();
        let start = match scc.iter().min_by_key(|idx| self.order[&self.graph[**idx]]) {
            Some(start) => *start,
            None => return Vec::new(),
        };

        fn visit(
            graph: &DiGraph<String, ()>,
            members: &HashSet<NodeIndex>,
            start: NodeIndex,
            current: NodeIndex,
            path: &mut Vec<NodeIndex>,
        ) -> bool {
            for next in graph.neighbors_directed(current, Direction::Incoming) {
                if next == start {
                    return true;
                }
                if members.contains(&next) && !path.contains(&next) {
                    path.push(next);
                    if visit(graph, members, start, next, path) {
                        return true;
                    }
                    path.pop();
                }
            }
            false
        }

        let mut path = vec![start];
        visit(&self.graph, &members, start, start, &mut path);
        path.push(start);
        path.into_iter().map(|idx| self.graph[idx].clone()).collect()
    }

    /// Direct dependencies of `service`, in project order.
    pub fn dependencies(&self, service: &str) -> Vec<String> {
        self.neighbors(service, Direction::Incoming)
    }

    /// Direct dependents of `service`, in project order.
    pub fn dependents(&self, service: &str) -> Vec<String> {
        self.neighbors(service, Direction::Outgoing)
    }

    fn neighbors(&self, service: &str, direction: Direction) -> Vec<String> {
        let Some(&idx) = self.index.get(service) else {
            return Vec::new();
        };
        let mut names: Vec<String> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        names.sort_by_key(|name| self.order[name]);
        names.dedup();
        names
    }

    /// `targets` plus everything they transitively depend on, in project order.
    pub fn with_dependencies(&self, targets: &[&str]) -> Vec<String> {
        let mut included: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = targets.iter().map(|s| s.to_string()).collect();

        while let Some(name) = stack.pop() {
            if !self.index.contains_key(&name) || !included.insert(name.clone()) {
                continue;
            }
            stack.extend(self.dependencies(&name));
        }

        let mut result: Vec<String> = included.into_iter().collect();
        result.sort_by_key(|name| self.order[name]);
        result
    }

    /// Layer `services` so every service sits in a strictly later layer than
    /// any of its dependencies that are also in `services`. Services outside
    /// the set impose no ordering.
    pub fn plan(&self, services: &[String], direction: WalkDirection) -> ExecutionPlan {
        let selected: HashSet<&str> = services
            .iter()
            .map(String::as_str)
            .filter(|name| self.index.contains_key(*name))
            .collect();

        // Graph is acyclic once built, so toposort cannot fail here.
        let sorted = toposort(&self.graph, None).unwrap_or_default();

        let mut depth: HashMap<String, usize> = HashMap::new();
        for idx in sorted {
            let name = &self.graph[idx];
            if !selected.contains(name.as_str()) {
                continue;
            }
            let level = self
                .dependencies(name)
                .iter()
                .filter_map(|dep| depth.get(dep))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(name.clone(), level);
        }

        let layer_count = depth.values().max().map(|d| d + 1).unwrap_or(0);
        let mut layers: Vec<Vec<String>> = vec![Vec::new(); layer_count];
        for (name, level) in &depth {
            layers[*level].push(name.clone());
        }
        for layer in &mut layers {
            layer.sort_by_key(|name| self.order[name]);
        }

        let mut blockers = HashMap::new();
        for name in depth.keys() {
            let related = match direction {
                WalkDirection::DependenciesFirst => self.dependencies(name),
                WalkDirection::DependentsFirst => self.dependents(name),
            };
            let in_plan: Vec<String> = related
                .into_iter()
                .filter(|r| depth.contains_key(r))
                .collect();
            blockers.insert(name.clone(), in_plan);
        }

        if direction == WalkDirection::DependentsFirst {
            layers.reverse();
        }

        ExecutionPlan {
            layers,
            blockers,
            direction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::service::{AccessMode, Link, NetworkMode, Service, VolumeFromSpec};

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn sample_project() -> Project {
        Project::new(
            "shop",
            vec![
                Service::new("console", "busybox"),
                Service::new("data", "busybox"),
                Service::new("db", "busybox")
                    .with_volumes_from(VolumeFromSpec::service("data", AccessMode::ReadWrite)),
                Service::new("web", "busybox").with_link(Link::new("db")),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_transitive_dependencies() {
        let graph = DependencyGraph::build(&sample_project()).unwrap();
        assert_eq!(graph.with_dependencies(&["web"]), names(&["data", "db", "web"]));
        assert_eq!(graph.with_dependencies(&["console"]), names(&["console"]));
        assert_eq!(graph.dependents("db"), names(&["web"]));
    }

    #[test]
    fn test_layers_respect_dependencies() {
        let graph = DependencyGraph::build(&sample_project()).unwrap();
        let plan = graph.plan(
            &names(&["console", "data", "db", "web"]),
            WalkDirection::DependenciesFirst,
        );

        assert_eq!(
            plan.layers(),
            &[names(&["console", "data"]), names(&["db"]), names(&["web"])]
        );
        assert_eq!(plan.blockers("db"), names(&["data"]).as_slice());
        assert!(plan.blockers("console").is_empty());
    }

    #[test]
    fn test_reverse_walk_puts_dependents_first() {
        let graph = DependencyGraph::build(&sample_project()).unwrap();
        let plan = graph.plan(&names(&["data", "db", "web"]), WalkDirection::DependentsFirst);

        let order: Vec<&str> = plan.services().collect();
        assert_eq!(order, vec!["web", "db", "data"]);
        assert_eq!(plan.blockers("db"), names(&["web"]).as_slice());
    }

    #[test]
    fn test_plan_ignores_dependencies_outside_selection() {
        let graph = DependencyGraph::build(&sample_project()).unwrap();
        let plan = graph.plan(&names(&["db"]), WalkDirection::DependenciesFirst);

        assert_eq!(plan.layers(), &[names(&["db"])]);
        assert!(plan.blockers("db").is_empty());
    }

    #[test]
    fn test_cycle_is_rejected() {
        let project = Project::new(
            "shop",
            vec![
                Service::new("a", "busybox").with_link(Link::new("b")),
                Service::new("b", "busybox").with_depends_on("c"),
                Service::new("c", "busybox").with_network_mode(NetworkMode::Service("a".to_string())),
            ],
        )
        .unwrap();

        match DependencyGraph::build(&project) {
            Err(ProjectError::DependencyCycle(path)) => {
                assert_eq!(path, names(&["a", "b", "c", "a"]));
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let project = Project::new(
            "shop",
            vec![Service::new("a", "busybox").with_depends_on("a")],
        )
        .unwrap();

        assert!(matches!(
            DependencyGraph::build(&project),
            Err(ProjectError::DependencyCycle(path)) if path == names(&["a", "a"])
        ));
    }
}
