//! Dependency graph over task ids, used to spot cycles among waiting tasks.
//!
//! Ordered maps keep traversal order stable, so cycle reports come out
//! the same on every run.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{Task, TaskId};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// task -> tasks it depends on
    edges: BTreeMap<TaskId, BTreeSet<TaskId>>,
}

impl DependencyGraph {
    /// Graph of every `depends_on` edge among `tasks`.
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut graph = Self::default();
        for task in tasks {
            for dep in &task.depends_on {
                graph.add_dependency(task.task_id.clone(), dep.clone());
            }
        }
        graph
    }

    /// `task` waits for `depends_on`.
    fn add_dependency(&mut self, task: TaskId, depends_on: TaskId) {
        self.edges.entry(task).or_default().insert(depends_on);
    }

    /// Every cycle closed by a back edge of a depth-first walk.
    ///
    /// Each back edge is reported once, so a single cycle never shows up
    /// twice in the result.
    pub fn detect_cycles(&self) -> Vec<Vec<TaskId>> {
        let mut color: BTreeMap<&TaskId, Color> = BTreeMap::new();
        let mut cycles = Vec::new();

        for start in self.edges.keys() {
            if color.get(start).copied().unwrap_or(Color::White) != Color::White {
                continue;
            }
            // (node, 次に見る依存先の index)
            let mut stack: Vec<(&TaskId, usize)> = vec![(start, 0)];
            let mut path: Vec<&TaskId> = vec![start];
            color.insert(start, Color::Gray);

            while let Some((node, next)) = stack.last_mut() {
                let deps = self.edges.get(*node);
                let dep = deps.and_then(|d| d.iter().nth(*next));
                *next += 1;

                match dep {
                    Some(dep) => match color.get(dep).copied().unwrap_or(Color::White) {
                        Color::White => {
                            color.insert(dep, Color::Gray);
                            stack.push((dep, 0));
                            path.push(dep);
                        }
                        Color::Gray => {
                            if let Some(pos) = path.iter().position(|p| *p == dep) {
                                let mut cycle: Vec<TaskId> =
                                    path[pos..].iter().map(|id| (*id).clone()).collect();
                                cycle.push(dep.clone());
                                cycles.push(cycle);
                            }
                        }
                        Color::Black => {}
                    },
                    None => {
                        color.insert(*node, Color::Black);
                        stack.pop();
                        path.pop();
                    }
                }
            }
        }
        cycles
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewTask;
    use chrono::Utc;

    fn id(s: &str) -> TaskId {
        TaskId::new(s)
    }

    fn graph(edges: &[(&str, &str)]) -> DependencyGraph {
        let mut graph = DependencyGraph::default();
        for (task, dep) in edges {
            graph.add_dependency(id(task), id(dep));
        }
        graph
    }

    #[test]
    fn from_tasks_reads_depends_on() {
        let task = |name: &str, deps: &[&str]| {
            let draft = deps.iter().fold(NewTask::new("build"), |d, dep| d.depends_on(*dep));
            Task::from_new(draft, id(name), Utc::now())
        };
        let (a, b, c) = (task("A", &["B"]), task("B", &["A"]), task("C", &[]));

        let cycles = DependencyGraph::from_tasks([&a, &b, &c]).detect_cycles();
        assert_eq!(cycles, vec![vec![id("A"), id("B"), id("A")]]);
    }

    #[test]
    fn empty_graph_has_no_cycles() {
        assert!(DependencyGraph::default().detect_cycles().is_empty());
    }

    #[test]
    fn detect_self_dependency() {
        let cycles = graph(&[("A", "A")]).detect_cycles();
        assert_eq!(cycles, vec![vec![id("A"), id("A")]]);
    }

    #[test]
    fn detect_longer_cycle_only_once() {
        // B -> C -> D -> B, and B also waits for A
        let cycles = graph(&[("B", "A"), ("C", "B"), ("D", "C"), ("B", "D")]).detect_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 4);
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        assert!(graph(&[("B", "A"), ("C", "B"), ("C", "A")]).detect_cycles().is_empty());
    }

    #[test]
    fn cross_edges_are_not_cycles() {
        //     A
        //    / \
        //   B   C
        //   |\ /|
        //   | X |
        //   D   E
        let edges = [("B", "A"), ("C", "A"), ("D", "B"), ("E", "B"), ("D", "C"), ("E", "C")];
        assert!(graph(&edges).detect_cycles().is_empty());
    }
}
