//! Immutable task DAG

use crate::error::ResearchError;
use crate::models::{Task, TaskInput};
use crate::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::Write;

/// Validated task graph. Tasks are stored in execution order: every
/// dependency of a task appears before it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskGraph {
    tasks: Vec<Task>,
}

impl TaskGraph {
    pub fn empty() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Validate and order `tasks`.
    ///
    /// Ordering is topological; among tasks that are ready at the same time
    /// the one added first goes first.
    pub fn new(tasks: Vec<Task>) -> Result<Self> {
        let mut ids = HashSet::with_capacity(tasks.len());
        for task in &tasks {
            if !ids.insert(task.id.as_str()) {
                return Err(ResearchError::DuplicateTask(task.id.clone()));
            }
        }

        for task in &tasks {
            if let Some(dependency) = task.depends_on.iter().find(|d| !ids.contains(d.as_str())) {
                return Err(ResearchError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dependency.clone(),
                });
            }

            for input in task.inputs.values() {
                if let TaskInput::Output { task_id, .. } = input {
                    if !task.depends_on.contains(task_id) {
                        return Err(ResearchError::UnresolvedReference {
                            task: task.id.clone(),
                            reference: task_id.clone(),
                        });
                    }
                }
            }
        }

        let mut remaining = tasks;
        let mut ordered: Vec<Task> = Vec::with_capacity(remaining.len());
        let mut emitted: HashSet<String> = HashSet::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let next = remaining
                .iter()
                .position(|t| t.depends_on.iter().all(|d| emitted.contains(d)));

            match next {
                Some(index) => {
                    let task = remaining.remove(index);
                    emitted.insert(task.id.clone());
                    ordered.push(task);
                }
                None => {
                    return Err(ResearchError::CycleDetected(
                        remaining.into_iter().map(|t| t.id).collect(),
                    ))
                }
            }
        }

        Ok(Self { tasks: ordered })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn task_ids(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.id.as_str()).collect()
    }

    /// SHA-256 over the serialized tasks. Equal plans give equal fingerprints.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();

        // Stream JSON straight into the hasher
        if serde_json::to_writer(&mut HashWriter(&mut hasher), &self.tasks).is_err() {
            return String::new();
        }

        hex::encode(hasher.finalize())
    }
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
