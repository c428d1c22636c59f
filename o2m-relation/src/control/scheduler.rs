//! Dependency-driven task scheduling with per-tick deduplication.
//! See [`Scheduler`] for more details.

use std::collections::{BTreeMap, BTreeSet};

/// Tracks which tasks must run because one of their inputs changed.
///
/// Each task declares the inputs it depends on once, up front. Writers call
/// [`Scheduler::notify`] for every input they change; any number of
/// notifications between two ticks collapse into at most one run per task.
/// [`Scheduler::take_tick`] hands out the tasks to run and starts a new tick.
pub struct Scheduler<Input, Task> {
    dependencies: BTreeMap<Task, BTreeSet<Input>>,
    dirty: BTreeSet<Input>,
    requested: BTreeSet<Task>,
}

impl<Input: Ord + Clone, Task: Ord + Clone> Scheduler<Input, Task> {
    pub fn new() -> Self {
        Scheduler {
            dependencies: BTreeMap::new(),
            dirty: BTreeSet::new(),
            requested: BTreeSet::new(),
        }
    }

    /// Declare that `task` must run whenever any of `inputs` changes.
    pub fn declare(&mut self, task: Task, inputs: impl IntoIterator<Item = Input>) {
        self.dependencies
            .entry(task)
            .or_default()
            .extend(inputs);
    }

    /// Record a change to `input`.
    pub fn notify(&mut self, input: Input) {
        self.dirty.insert(input);
    }

    /// Schedule `task` for the next tick regardless of its inputs.
    pub fn request(&mut self, task: Task) {
        self.requested.insert(task);
    }

    /// The tasks affected by the changes since the previous tick, in task
    /// order, each at most once. Clears the recorded changes.
    pub fn take_tick(&mut self) -> Vec<Task> {
        let tasks = self.take_preview();
        self.dirty.clear();
        self.requested.clear();
        tasks
    }

    fn take_preview(&self) -> Vec<Task> {
        let mut tasks = self.requested.clone();
        for (task, inputs) in &self.dependencies {
            if !inputs.is_disjoint(&self.dirty) {
                tasks.insert(task.clone());
            }
        }
        tasks.into_iter().collect()
    }
}

impl<Input: Ord + Clone, Task: Ord + Clone> Default for Scheduler<Input, Task> {
    fn default() -> Self {
        Self::new()
    }
}
