use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::task::Task;

/// JSONL-backed task store used by the in-process task service (local
/// fixtures, demos, tests). One task per line.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        debug!(file = %self.tasks_path.display(), "loading tasks");
        let file = fs::File::open(&self.tasks_path)
            .with_context(|| format!("failed to open {}", self.tasks_path.display()))?;
        let reader = BufReader::new(file);

        let mut out = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let task: Task = serde_json::from_str(trimmed).with_context(|| {
                format!(
                    "failed parsing {} line {}",
                    self.tasks_path.display(),
                    idx + 1
                )
            })?;
            out.push(task);
        }

        debug!(count = out.len(), "loaded tasks");
        Ok(out)
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        debug!(
            file = %self.tasks_path.display(),
            count = tasks.len(),
            "saving tasks atomically"
        );

        let dir = self
            .tasks_path
            .parent()
            .unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        for task in tasks {
            let serialized = serde_json::to_string(task)?;
            writeln!(temp, "{serialized}")?;
        }
        temp.flush()?;

        temp.persist(&self.tasks_path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.tasks_path.display(), err))?;

        Ok(())
    }

    /// Replaces the task with the same name, appending when new.
    #[tracing::instrument(skip(self, task), fields(name = %task.name))]
    pub fn upsert_task(&self, task: Task) -> anyhow::Result<()> {
        let mut tasks = self.load_tasks()?;
        match tasks.iter_mut().find(|t| t.name == task.name) {
            Some(slot) => *slot = task,
            None => tasks.push(task),
        }
        self.save_tasks(&tasks)
    }
}
