//! The Task Directory (spec §4.1): an on-disk, crash-recoverable queue of
//! heterogeneous tasks routed by kind, ordered by `tasks.json`.

use amphigory_core::{Completion, Owner, OutcomeStatus, Task};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed task/order-index JSON at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("task id already exists: {0}")]
    DuplicateId(String),
    #[error("task not found: {0}")]
    NotFound(String),
}

fn io_err(path: &Path, source: io::Error) -> QueueError {
    QueueError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn json_err(path: &Path, source: serde_json::Error) -> QueueError {
    QueueError::Json {
        path: path.to_path_buf(),
        source,
    }
}

const QUEUED: &str = "queued";
const IN_PROGRESS: &str = "in_progress";
const COMPLETE: &str = "complete";
const FAILED: &str = "failed";
const INDEX_FILE: &str = "tasks.json";
const PAUSE_FILE: &str = "PAUSED";

/// Handle onto a Task Directory rooted at a shared-filesystem path.
pub struct TaskDirectory {
    root: PathBuf,
}

impl TaskDirectory {
    /// Open (creating if absent) the directory tree at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let root = root.into();
        for sub in [QUEUED, IN_PROGRESS, COMPLETE, FAILED] {
            let dir = root.join(sub);
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
        let index_path = root.join(INDEX_FILE);
        if !index_path.is_file() {
            write_json(&index_path, &Vec::<String>::new())?;
        }
        Ok(Self { root })
    }

    fn dir(&self, sub: &str) -> PathBuf {
        self.root.join(sub)
    }

    fn task_path(&self, sub: &str, id: &str) -> PathBuf {
        self.dir(sub).join(format!("{id}.json"))
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn read_index(&self) -> Result<Vec<String>, QueueError> {
        let path = self.index_path();
        let bytes = fs::read(&path).map_err(|e| io_err(&path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| json_err(&path, e))
    }

    fn write_index(&self, ids: &[String]) -> Result<(), QueueError> {
        write_json(&self.index_path(), ids)
    }

    fn exists_anywhere(&self, id: &str) -> bool {
        [QUEUED, IN_PROGRESS, COMPLETE, FAILED]
            .iter()
            .any(|sub| self.task_path(sub, id).is_file())
    }

    /// Write `queued/<id>.json` and append the id to `tasks.json`. The task
    /// file is written before the index entry, per the crash-recovery
    /// ordering in spec §4.1.
    pub fn enqueue(&self, task: &Task) -> Result<(), QueueError> {
        if self.exists_anywhere(&task.id) {
            return Err(QueueError::DuplicateId(task.id.clone()));
        }

        let path = self.task_path(QUEUED, &task.id);
        write_json(&path, task)?;

        let mut ids = self.read_index()?;
        ids.push(task.id.clone());
        self.write_index(&ids)?;

        Ok(())
    }

    /// Scan `tasks.json` in order and claim the first task that (a) is
    /// owned by `owner`, (b) is still present in `queued/`, and (c) has a
    /// satisfied dependency. Moves it to `in_progress/` via rename, which
    /// is the mutual-exclusion point between concurrent claimers.
    pub fn claim_next(&self, owner: Owner) -> Result<Option<Task>, QueueError> {
        let ids = self.read_index()?;

        for id in ids {
            let queued_path = self.task_path(QUEUED, &id);
            let task: Task = match read_json(&queued_path) {
                Ok(t) => t,
                Err(QueueError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                    // Already claimed or completed by someone else, or
                    // never made it past orphaned-write. Keep scanning.
                    continue;
                }
                Err(e) => return Err(e),
            };

            if task.kind.owner() != owner {
                continue;
            }
            if !task.is_ready() {
                // A downstream task never blocks the queue: keep scanning.
                continue;
            }

            let in_progress_path = self.task_path(IN_PROGRESS, &id);
            match fs::rename(&queued_path, &in_progress_path) {
                Ok(()) => return Ok(Some(task)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    // Another claimer won the race; move on.
                    continue;
                }
                Err(e) => return Err(io_err(&queued_path, e)),
            }
        }

        Ok(None)
    }

    /// Write the completion record and, for failures, a copy under
    /// `failed/`, then delete the `in_progress/` file. The completion file
    /// exists before the in-progress file is removed.
    pub fn complete(&self, task_id: &str, outcome: &Completion) -> Result<(), QueueError> {
        let complete_path = self.task_path(COMPLETE, task_id);
        write_json(&complete_path, outcome)?;

        if outcome.status == OutcomeStatus::Failed {
            let failed_path = self.task_path(FAILED, task_id);
            write_json(&failed_path, outcome)?;
        }

        let in_progress_path = self.task_path(IN_PROGRESS, task_id);
        match fs::remove_file(&in_progress_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&in_progress_path, e)),
        }
    }

    /// Dismiss a failed completion: remove it from `failed/` (the
    /// `complete/` record is retained for history).
    pub fn dismiss_failed(&self, task_id: &str) -> Result<(), QueueError> {
        let path = self.task_path(FAILED, task_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(QueueError::NotFound(task_id.to_string())),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    /// Queued tasks whose `input` equals `output_path`, used for
    /// cancellation of a downstream chain.
    pub fn downstream(&self, output_path: &Path) -> Result<Vec<Task>, QueueError> {
        let mut matches = Vec::new();
        for id in self.read_index()? {
            let path = self.task_path(QUEUED, &id);
            match read_json::<Task>(&path) {
                Ok(task) if task.input.as_deref() == Some(output_path) => matches.push(task),
                Ok(_) => {}
                Err(QueueError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(matches)
    }

    /// On consumer startup: move any `in_progress/` file belonging to
    /// `owner` back to `queued/`. Returns the number of tasks recovered.
    /// Idempotent — running it with nothing in flight is a no-op.
    pub fn recover(&self, owner: Owner) -> Result<usize, QueueError> {
        let dir = self.dir(IN_PROGRESS);
        let mut recovered = 0;

        let entries = fs::read_dir(&dir).map_err(|e| io_err(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let task: Task = match read_json(&path) {
                Ok(t) => t,
                Err(_) => continue,
            };
            if task.kind.owner() != owner {
                continue;
            }

            let queued_path = self.task_path(QUEUED, &task.id);
            fs::rename(&path, &queued_path).map_err(|e| io_err(&path, e))?;
            recovered += 1;
        }

        Ok(recovered)
    }

    /// Scan `queued/` for task ids missing from `tasks.json` (a producer
    /// crash between writing the task file and appending to the index)
    /// and append them, in filename order. The controller, as sole
    /// producer, runs this on startup.
    pub fn reconcile_index(&self) -> Result<usize, QueueError> {
        let dir = self.dir(QUEUED);
        let mut on_disk: Vec<String> = fs::read_dir(&dir)
            .map_err(|e| io_err(&dir, e))?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                (path.extension().and_then(|x| x.to_str()) == Some("json"))
                    .then(|| path.file_stem().unwrap().to_string_lossy().into_owned())
            })
            .collect();
        on_disk.sort();

        let mut ids = self.read_index()?;
        let known: std::collections::HashSet<&str> = ids.iter().map(|s| s.as_str()).collect();
        let missing: Vec<String> = on_disk
            .into_iter()
            .filter(|id| !known.contains(id.as_str()))
            .collect();

        let added = missing.len();
        if added > 0 {
            ids.extend(missing);
            self.write_index(&ids)?;
        }
        Ok(added)
    }

    /// Enqueue a fresh task with a new id but the same kind/input/output/
    /// payload as a previously failed one (spec §7 resubmission).
    pub fn resubmit(&self, failed_task_id: &str, new_id: impl Into<String>) -> Result<Task, QueueError> {
        let path = self.task_path(FAILED, failed_task_id);
        let original: Task = read_json(&path)?;
        let mut fresh = original;
        fresh.id = new_id.into();
        self.enqueue(&fresh)?;
        Ok(fresh)
    }

    pub fn is_paused(&self) -> bool {
        self.root.join(PAUSE_FILE).is_file()
    }

    pub fn pause(&self) -> Result<(), QueueError> {
        let path = self.root.join(PAUSE_FILE);
        fs::write(&path, b"").map_err(|e| io_err(&path, e))
    }

    pub fn resume(&self) -> Result<(), QueueError> {
        let path = self.root.join(PAUSE_FILE);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every completion record under `complete/`, paired with its task id
    /// (the filename stem). Used by consumers that poll for a specific
    /// task kind rather than claiming from `queued/` — the controller's
    /// scan-ingestion loop, in particular, since proactive scans are
    /// written straight to `complete/` without ever being enqueued.
    pub fn list_complete(&self) -> Result<Vec<(String, Completion)>, QueueError> {
        let dir = self.dir(COMPLETE);
        let mut out = Vec::new();

        for entry in fs::read_dir(&dir).map_err(|e| io_err(&dir, e))? {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let id = path.file_stem().unwrap().to_string_lossy().into_owned();
            let completion: Completion = read_json(&path)?;
            out.push((id, completion));
        }

        Ok(out)
    }
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), QueueError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| json_err(path, e))?;
    fs::write(path, bytes).map_err(|e| io_err(path, e))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, QueueError> {
    let bytes = fs::read(path).map_err(|e| io_err(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| json_err(path, e))
}

#[cfg(test)]
#[path = "dir_tests.rs"]
mod tests;
