//! Append-only log of result events.
//!
//! # Design
//! - One JSON document per line; entries are appended and never rewritten.
//! - An in-memory mirror is rebuilt from disk at open; a missing or unreadable log
//!   yields an empty store, and malformed lines are skipped.
//! - File writes happen on a dedicated writer thread so callers on async workers never
//!   block on disk. The mirror is updated in the same critical section that queues the
//!   write, so the file and mirror agree on order.
//! - Dropping the store drains queued writes before returning.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use pulley_events::{ProgressEvent, ResultEvent, UploadObserver};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

enum WriteCommand {
    Append(String),
    Clear(Sender<io::Result<()>>),
    Flush(Sender<io::Result<()>>),
}

/// Durable record of enqueued and terminal uploads.
pub struct ResultStore {
    path: PathBuf,
    entries: Mutex<Vec<ResultEvent>>,
    writer: Option<Sender<WriteCommand>>,
    handle: Option<JoinHandle<()>>,
}

impl ResultStore {
    /// Open the log at `path`, loading any existing entries and starting its writer.
    ///
    /// # Errors
    ///
    /// Returns an error when the writer thread cannot be spawned.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let entries = read_log(&path);
        let (writer, commands) = mpsc::channel();
        let log = path.clone();
        let handle = thread::Builder::new()
            .name("pulley-results".to_string())
            .spawn(move || run_writer(&log, &commands))
            .map_err(|err| StoreError::io("results.spawn_writer", &path, err))?;
        Ok(Self {
            path,
            entries: Mutex::new(entries),
            writer: Some(writer),
            handle: Some(handle),
        })
    }

    /// Location of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add an event to the mirror and queue it for the log.
    ///
    /// Write failures on the writer thread are logged; call [`Self::flush`] to wait
    /// until queued entries have reached the file.
    ///
    /// # Errors
    ///
    /// Returns an error when the entry cannot be encoded or the writer has stopped;
    /// the mirror is left unchanged in that case.
    pub fn record(&self, event: &ResultEvent) -> StoreResult<()> {
        let mut line = serde_json::to_string(event)
            .map_err(|err| StoreError::json("results.encode", &self.path, err))?;
        line.push('\n');

        let mut entries = self.lock();
        self.send(WriteCommand::Append(line), "results.append")?;
        entries.push(event.clone());
        Ok(())
    }

    /// Block until every queued entry has been written.
    ///
    /// # Errors
    ///
    /// Returns an error when the writer has stopped.
    pub fn flush(&self) -> StoreResult<()> {
        let (reply, done) = mpsc::channel();
        self.send(WriteCommand::Flush(reply), "results.flush")?;
        wait_reply(&done, "results.flush", &self.path)
    }

    /// Every recorded event in insertion order.
    #[must_use]
    pub fn load_all(&self) -> Vec<ResultEvent> {
        self.lock().clone()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove every entry from the log and the mirror. Clearing twice is harmless.
    ///
    /// Blocks until the writer has removed the file.
    ///
    /// # Errors
    ///
    /// Returns an error when the log exists but cannot be removed.
    pub fn clear(&self) -> StoreResult<()> {
        let mut entries = self.lock();
        let (reply, done) = mpsc::channel();
        self.send(WriteCommand::Clear(reply), "results.clear")?;
        wait_reply(&done, "results.clear", &self.path)?;
        entries.clear();
        drop(entries);
        Ok(())
    }

    fn send(&self, command: WriteCommand, operation: &'static str) -> StoreResult<()> {
        self.writer
            .as_ref()
            .and_then(|writer| writer.send(command).ok())
            .ok_or_else(|| StoreError::writer_stopped(operation, &self.path))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ResultEvent>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ResultStore {
    fn drop(&mut self) {
        drop(self.writer.take());
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!(path = %self.path.display(), "result log writer panicked");
        }
    }
}

impl UploadObserver for ResultStore {
    fn on_progress(&self, _event: &ProgressEvent) {}

    fn on_result(&self, event: &ResultEvent) {
        if let Err(err) = self.record(event) {
            warn!(
                error = %err,
                operation = err.operation(),
                task_id = %event.task_id(),
                "failed to persist upload result"
            );
        }
    }
}

fn run_writer(path: &Path, commands: &Receiver<WriteCommand>) {
    for command in commands {
        match command {
            WriteCommand::Append(line) => {
                if let Err(err) = append_line(path, &line) {
                    warn!(error = %err, path = %path.display(), "failed to append upload result");
                }
            }
            WriteCommand::Clear(reply) => reply_to(&reply, remove_log(path)),
            WriteCommand::Flush(reply) => reply_to(&reply, Ok(())),
        }
    }
    debug!(path = %path.display(), "result log writer stopped");
}

fn reply_to(reply: &Sender<io::Result<()>>, outcome: io::Result<()>) {
    if reply.send(outcome).is_err() {
        debug!("result log caller went away before the reply");
    }
}

fn wait_reply(
    done: &Receiver<io::Result<()>>,
    operation: &'static str,
    path: &Path,
) -> StoreResult<()> {
    match done.recv() {
        Ok(outcome) => outcome.map_err(|err| StoreError::io(operation, path, err)),
        Err(_) => Err(StoreError::writer_stopped(operation, path)),
    }
}

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())
}

fn remove_log(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

fn read_log(path: &Path) -> Vec<ResultEvent> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            warn!(error = %err, path = %path.display(), "result log unreadable; starting empty");
            return Vec::new();
        }
    };

    let mut entries = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, path = %path.display(), "result log read interrupted");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ResultEvent>(&line) {
            Ok(event) => entries.push(event),
            Err(err) => {
                warn!(error = %err, line = index + 1, "skipping malformed result entry");
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulley_events::TaskId;
    use std::collections::BTreeMap;

    fn completed(id: &str) -> ResultEvent {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        ResultEvent::Completed {
            task_id: TaskId::from(id),
            message: Some("{\"ok\":true}".into()),
            status_code: 200,
            headers,
            tag: Some("photos".into()),
        }
    }

    fn failed(id: &str) -> ResultEvent {
        ResultEvent::Failed {
            task_id: TaskId::from(id),
            status_code: 500,
            code: "upload_error".into(),
            message: None,
            details: vec!["frame 0".into()],
            tag: None,
        }
    }

    fn canceled(id: &str) -> ResultEvent {
        ResultEvent::Canceled {
            task_id: TaskId::from(id),
            tag: Some("photos".into()),
        }
    }

    #[test]
    fn entries_survive_reopen_unchanged() -> anyhow::Result<()> {
        let dir = tempfile::Builder::new().prefix("pulley-results").tempdir()?;
        let path = dir.path().join("nested").join("results.jsonl");
        let store = ResultStore::open(&path)?;
        assert!(store.is_empty());

        let enqueued = ResultEvent::Enqueued {
            task_id: TaskId::from("ctx.a"),
            tag: None,
        };
        store.record(&enqueued)?;
        store.record(&completed("ctx.a"))?;
        store.record(&failed("ctx.b"))?;
        store.record(&canceled("ctx.c"))?;
        drop(store);

        let reopened = ResultStore::open(&path)?;
        assert_eq!(
            reopened.load_all(),
            vec![enqueued, completed("ctx.a"), failed("ctx.b"), canceled("ctx.c")]
        );
        Ok(())
    }

    #[test]
    fn clear_empties_log_and_is_idempotent() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("results.jsonl");
        let store = ResultStore::open(&path)?;
        store.record(&failed("ctx.c"))?;
        assert_eq!(store.len(), 1);

        store.clear()?;
        store.clear()?;
        assert!(store.load_all().is_empty());
        assert!(ResultStore::open(&path)?.load_all().is_empty());
        Ok(())
    }

    #[test]
    fn malformed_lines_are_skipped_on_load() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("results.jsonl");
        let good = serde_json::to_string(&completed("ctx.d"))?;
        fs::write(&path, format!("not json\n\n{good}\n{{\"status\":\"bogus\"}}\n"))?;

        let store = ResultStore::open(&path)?;
        assert_eq!(store.load_all(), vec![completed("ctx.d")]);
        Ok(())
    }

    #[test]
    fn observer_records_results_only() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = ResultStore::open(dir.path().join("results.jsonl"))?;
        store.on_progress(&ProgressEvent::canceled(TaskId::from("ctx.e"), None));
        store.on_result(&failed("ctx.e"));
        assert_eq!(store.load_all(), vec![failed("ctx.e")]);
        Ok(())
    }

    #[test]
    fn flush_waits_for_queued_appends() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("results.jsonl");
        let store = ResultStore::open(&path)?;
        for index in 0..20 {
            store.record(&failed(&format!("ctx.{index}")))?;
        }
        store.flush()?;

        let written = fs::read_to_string(&path)?;
        assert_eq!(written.lines().count(), 20);
        assert_eq!(ResultStore::open(&path)?.load_all(), store.load_all());
        Ok(())
    }

    #[test]
    fn clear_after_queued_appends_leaves_nothing_behind() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("results.jsonl");
        let store = ResultStore::open(&path)?;
        store.record(&completed("ctx.f"))?;
        store.record(&canceled("ctx.g"))?;
        store.clear()?;
        store.flush()?;

        assert!(!path.exists());
        assert!(store.is_empty());
        Ok(())
    }
}
