//! Provisioning step graph
//!
//! Steps are declared once and ordered by their `depends_on` edges.
//! Dependencies may be forward references; a cycle is rejected as soon as
//! the step closing it is added, so the graph stays acyclic at all times.

use crate::error::{Error, Result};
use crate::step::Step;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Ordered set of provisioning steps
#[derive(Debug, Default, Clone)]
pub struct StepGraph {
    steps: Vec<Step>,
    index: HashMap<String, usize>,
}

impl StepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step, rejecting duplicate names and dependency cycles
    ///
    /// On error the graph is left unchanged.
    pub fn add_step(&mut self, step: Step) -> Result<()> {
        if self.index.contains_key(step.name()) {
            return Err(Error::DuplicateStep {
                name: step.name().to_string(),
            });
        }

        if let Some(cycle) = self.cycle_through(&step) {
            return Err(Error::CyclicDependency { cycle });
        }

        self.index.insert(step.name().to_string(), self.steps.len());
        self.steps.push(step);
        Ok(())
    }

    /// Check that every dependency names a declared step
    pub fn validate(&self) -> Result<()> {
        for step in &self.steps {
            for dep in step.depends_on() {
                if !self.index.contains_key(dep) {
                    return Err(Error::UnknownStep {
                        name: dep.clone(),
                        referenced_by: step.name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Step> {
        self.index.get(name).map(|&i| &self.steps[i])
    }

    /// Steps in declaration order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps in dependency order
    ///
    /// Independent steps come out in declaration order. The iterator is
    /// evaluated lazily; call again to restart.
    pub fn topological_order(&self) -> TopologicalOrder<'_> {
        let mut in_degree = vec![0usize; self.steps.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.steps.len()];

        for (i, step) in self.steps.iter().enumerate() {
            for dep in step.depends_on() {
                // Unknown dependencies are reported by validate()
                if let Some(&d) = self.index.get(dep) {
                    in_degree[i] += 1;
                    dependents[d].push(i);
                }
            }
        }

        let ready = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();

        TopologicalOrder {
            steps: &self.steps,
            in_degree,
            dependents,
            ready,
        }
    }

    /// Find a cycle that adding `step` would close, as a list of names
    fn cycle_through(&self, step: &Step) -> Option<Vec<String>> {
        let target = step.name();
        let mut visited = HashSet::new();

        for dep in step.depends_on() {
            let mut path = vec![target.to_string()];
            if dep == target {
                path.push(target.to_string());
                return Some(path);
            }
            if self.reaches(dep, target, &mut visited, &mut path) {
                return Some(path);
            }
        }
        None
    }

    /// Depth-first search along dependency edges from `from` to `target`
    fn reaches(
        &self,
        from: &str,
        target: &str,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> bool {
        path.push(from.to_string());

        if let Some(step) = self.get(from)
            && visited.insert(from.to_string())
        {
            for dep in step.depends_on() {
                if dep == target {
                    path.push(target.to_string());
                    return true;
                }
                if self.reaches(dep, target, visited, path) {
                    return true;
                }
            }
        }

        path.pop();
        false
    }
}

/// Lazy topological iterator over a [`StepGraph`]
#[derive(Debug, Clone)]
pub struct TopologicalOrder<'a> {
    steps: &'a [Step],
    in_degree: Vec<usize>,
    dependents: Vec<Vec<usize>>,
    ready: BTreeSet<usize>,
}

impl<'a> Iterator for TopologicalOrder<'a> {
    type Item = &'a Step;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.ready.pop_first()?;
        for &dependent in &self.dependents[next] {
            self.in_degree[dependent] -= 1;
            if self.in_degree[dependent] == 0 {
                self.ready.insert(dependent);
            }
        }
        Some(&self.steps[next])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.ready.len(), Some(self.steps.len()))
    }
}
