//! Task registry: the single source of truth for progress queries.
//!
//! One [`TaskRegistry`] is shared (behind an `Arc`) by every stage of every
//! task. It guards all records with one mutex that is held only while a
//! closure mutates in-memory fields; stages never hold it across conversion,
//! merging or disk I/O. A progress reader therefore sees either the state
//! before or after an update, never a torn one.
//!
//! The per-task log is append-only by construction: [`TaskRecord`] exposes
//! no way to remove or rewrite entries.

use crate::error::PipelineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Opaque, globally unique task identifier.
///
/// Ids double as a path segment under each storage root, so ids accepted
/// from clients are validated to be one plain segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// A fresh random (v4 UUID) id.
    pub fn generate() -> Self {
        TaskId(Uuid::new_v4().to_string())
    }

    /// Validate a client-supplied id.
    ///
    /// Anything that is not a single safe path segment cannot name a task
    /// and is reported as [`PipelineError::TaskNotFound`].
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let ok = !raw.is_empty()
            && raw != "."
            && raw != ".."
            && !raw.contains(['/', '\\', '\0'])
            && raw.len() <= 128;
        if ok {
            Ok(TaskId(raw.to_string()))
        } else {
            Err(PipelineError::TaskNotFound {
                task_id: raw.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of one item in a convert run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Fail,
}

/// Per-item result of a convert run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    /// Source file name.
    #[serde(rename = "file")]
    pub item: String,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ItemOutcome {
    pub fn success(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            status: ItemStatus::Success,
            reason: None,
        }
    }

    pub fn fail(item: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            status: ItemStatus::Fail,
            reason: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ItemStatus::Success
    }
}

/// Where the final package was written, recorded once packaging succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub archive_path: PathBuf,
    pub file_name: String,
    pub folder_name: String,
    pub file_count: usize,
}

/// Independent completion flags of the three processing stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFlags {
    pub convert_done: bool,
    pub merge_done: bool,
    pub package_done: bool,
}

impl StageFlags {
    /// True iff every stage completed.
    pub fn all_done(&self) -> bool {
        self.convert_done && self.merge_done && self.package_done
    }
}

/// Mutable state of one task, owned by the registry.
///
/// Stages receive `&mut TaskRecord` inside [`TaskRegistry::update`].
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub total: usize,
    pub current: usize,
    pub current_item: String,
    pub results: Vec<ItemOutcome>,
    pub flags: StageFlags,
    pub package: Option<PackageInfo>,
    pub created_at: DateTime<Utc>,
    log: Vec<String>,
}

impl TaskRecord {
    fn new() -> Self {
        Self {
            total: 0,
            current: 0,
            current_item: String::new(),
            results: Vec::new(),
            flags: StageFlags::default(),
            package: None,
            created_at: Utc::now(),
            log: Vec::new(),
        }
    }

    /// Append one line to the task log.
    pub fn push_log(&mut self, line: impl Into<String>) {
        self.log.push(line.into());
    }

    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Derived from the stage flags on every call.
    pub fn done(&self) -> bool {
        self.flags.all_done()
    }

    /// Reset the convert section: counters, results and the convert flag.
    /// Other stages' flags and the log are left alone.
    pub fn begin_convert(&mut self, total: usize) {
        self.total = total;
        self.current = 0;
        self.current_item.clear();
        self.results.clear();
        self.flags.convert_done = false;
    }

    fn snapshot(&self) -> TaskProgress {
        TaskProgress {
            total: self.total,
            current: self.current,
            current_file: self.current_item.clone(),
            results: self.results.clone(),
            done: self.done(),
            convert_done: self.flags.convert_done,
            merge_done: self.flags.merge_done,
            package_done: self.flags.package_done,
            logs: self.log.clone(),
            package: self.package.clone(),
            created_at: Some(self.created_at),
        }
    }
}

/// Point-in-time view of a task, as returned by progress queries.
///
/// `done` is computed from the three stage flags when the snapshot is taken.
/// A snapshot serialized before logging existed deserializes with an empty
/// `logs` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub total: usize,
    pub current: usize,
    pub current_file: String,
    pub results: Vec<ItemOutcome>,
    pub done: bool,
    pub convert_done: bool,
    pub merge_done: bool,
    pub package_done: bool,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl TaskProgress {
    /// Number of successful items in the most recent convert run.
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }
}

/// Process-wide map from task id to task record.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<TaskId, TaskRecord>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic inside an update closure leaves the map structurally valid, so
    // the poisoned guard is taken over instead of taking the service down.
    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, TaskRecord>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a fresh record.
    pub fn create(&self, task_id: &TaskId) -> Result<(), PipelineError> {
        let mut tasks = self.lock();
        if tasks.contains_key(task_id) {
            return Err(PipelineError::AlreadyExists {
                task_id: task_id.to_string(),
            });
        }
        tasks.insert(task_id.clone(), TaskRecord::new());
        Ok(())
    }

    /// Get-or-create. Returns `true` when a record had to be created.
    pub fn ensure(&self, task_id: &TaskId) -> bool {
        let mut tasks = self.lock();
        if tasks.contains_key(task_id) {
            return false;
        }
        tasks.insert(task_id.clone(), TaskRecord::new());
        true
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.lock().contains_key(task_id)
    }

    /// Current snapshot of a task.
    pub fn get(&self, task_id: &TaskId) -> Result<TaskProgress, PipelineError> {
        self.lock()
            .get(task_id)
            .map(TaskRecord::snapshot)
            .ok_or_else(|| PipelineError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    /// Progress query: snapshot with `done` recomputed from the stage flags.
    pub fn progress(&self, task_id: &TaskId) -> Result<TaskProgress, PipelineError> {
        self.get(task_id)
    }

    /// Apply `mutation` to the task's record under the registry lock.
    ///
    /// The closure must only touch in-memory fields.
    pub fn update<R>(
        &self,
        task_id: &TaskId,
        mutation: impl FnOnce(&mut TaskRecord) -> R,
    ) -> Result<R, PipelineError> {
        let mut tasks = self.lock();
        let record = tasks
            .get_mut(task_id)
            .ok_or_else(|| PipelineError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;
        Ok(mutation(record))
    }

    /// Append one line to a task's log.
    pub fn append_log(&self, task_id: &TaskId, line: impl Into<String>) -> Result<(), PipelineError> {
        self.update(task_id, |record| record.push_log(line))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
