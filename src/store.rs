use crate::error::{KpiEngineError, Result};
use crate::narrative::NarrativeBlock;
use crate::run::{AnalysisRun, RunSummary};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Document store for analysis runs, one document per run.
pub trait RunStore {
    fn insert(&self, run: AnalysisRun) -> Result<Uuid>;

    fn get(&self, id: Uuid) -> Result<AnalysisRun>;

    /// Summaries of every stored run, newest first.
    fn list(&self) -> Result<Vec<RunSummary>>;

    fn delete(&self, id: Uuid) -> Result<()>;

    /// Removes every run with this name and returns how many were removed.
    fn delete_by_name(&self, name: &str) -> Result<usize>;

    fn append_narrative(&self, id: Uuid, block: NarrativeBlock) -> Result<()>;

    /// Stores a freshly seeded sample run, replacing any earlier run of the same name.
    fn replace_sample(&self, run: AnalysisRun) -> Result<Uuid> {
        self.delete_by_name(&run.name)?;
        self.insert(run)
    }
}

/// Process-local [`RunStore`]. Clones share the same runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRunStore {
    runs: Arc<Mutex<HashMap<Uuid, AnalysisRun>>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.with_runs(|runs| runs.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The map is left consistent by every operation, so a poisoned lock is still usable.
    fn with_runs<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut HashMap<Uuid, AnalysisRun>) -> R,
    {
        let mut guard = self
            .runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl RunStore for InMemoryRunStore {
    fn insert(&self, run: AnalysisRun) -> Result<Uuid> {
        let id = run.id;
        self.with_runs(|runs| runs.insert(id, run));
        Ok(id)
    }

    fn get(&self, id: Uuid) -> Result<AnalysisRun> {
        self.with_runs(|runs| runs.get(&id).cloned())
            .ok_or(KpiEngineError::RunNotFound(id))
    }

    fn list(&self) -> Result<Vec<RunSummary>> {
        let mut summaries: Vec<RunSummary> =
            self.with_runs(|runs| runs.values().map(AnalysisRun::summary).collect());
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(summaries)
    }

    fn delete(&self, id: Uuid) -> Result<()> {
        self.with_runs(|runs| runs.remove(&id))
            .map(|_| ())
            .ok_or(KpiEngineError::RunNotFound(id))
    }

    fn delete_by_name(&self, name: &str) -> Result<usize> {
        Ok(self.with_runs(|runs| {
            let before = runs.len();
            runs.retain(|_, run| run.name != name);
            before - runs.len()
        }))
    }

    fn append_narrative(&self, id: Uuid, block: NarrativeBlock) -> Result<()> {
        self.with_runs(|runs| match runs.get_mut(&id) {
            Some(run) => {
                run.add_narrative(block);
                Ok(())
            }
            None => Err(KpiEngineError::RunNotFound(id)),
        })
    }
}
