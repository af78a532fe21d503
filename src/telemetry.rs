use std::cmp::Reverse;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::Utc;
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{Subscriber, subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt};

use crate::config::{TraceSettings, project_dirs};

const TRACE_SUFFIX: &str = ".trace.jsonl";

static TRACE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static ACTIVE_TRACE_FILE: OnceCell<PathBuf> = OnceCell::new();
static TRACING_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Snapshot of trace export state for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct TraceReport {
    pub enabled: bool,
    pub directory: Option<PathBuf>,
    pub active_file: Option<PathBuf>,
    pub recent_files: Vec<PathBuf>,
}

fn install_subscriber<S>(subscriber: S) -> Result<()>
where
    S: Subscriber + Send + Sync + 'static,
{
    if TRACING_INITIALIZED.get().is_some() {
        return Ok(());
    }

    subscriber::set_global_default(subscriber)?;
    let _ = TRACING_INITIALIZED.set(());
    Ok(())
}

/// Install the global subscriber: compact console output plus, when trace
/// capture is enabled, a JSON file per process run.
pub fn init_tracing(service: &str, verbose: bool, traces: &TraceSettings) -> Result<()> {
    let default_level = if verbose {
        "webframe=debug"
    } else {
        "webframe=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let console = fmt::layer().with_target(false).compact();

    match build_trace_file_layer(service, traces)? {
        Some((writer, guard, path)) => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(console)
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true)
                        .with_writer(writer)
                        .with_filter(LevelFilter::DEBUG),
                );
            let _ = TRACE_GUARD.set(guard);
            let _ = ACTIVE_TRACE_FILE.set(path);
            install_subscriber(subscriber)
        }
        None => install_subscriber(tracing_subscriber::registry().with(env_filter).with(console)),
    }
}

/// Trace file written by this process, if capture is on.
pub fn current_trace_file() -> Option<&'static PathBuf> {
    ACTIVE_TRACE_FILE.get()
}

pub fn trace_report(traces: &TraceSettings) -> Result<TraceReport> {
    let directory = if traces.enabled {
        Some(resolve_trace_directory(traces)?)
    } else {
        resolve_trace_directory(traces).ok()
    };

    let recent_files = match directory.as_deref() {
        Some(dir) => trace_files(dir)?
            .into_iter()
            .take(traces.max_files.max(1))
            .collect(),
        None => Vec::new(),
    };

    Ok(TraceReport {
        enabled: traces.enabled,
        directory,
        active_file: ACTIVE_TRACE_FILE.get().cloned(),
        recent_files,
    })
}

fn build_trace_file_layer(
    service: &str,
    traces: &TraceSettings,
) -> Result<Option<(NonBlocking, WorkerGuard, PathBuf)>> {
    if !traces.enabled {
        return Ok(None);
    }

    let directory = resolve_trace_directory(traces)?;
    fs::create_dir_all(&directory)
        .with_context(|| format!("Failed to create trace directory {}", directory.display()))?;

    let (file, path) = create_trace_file(service, &directory)?;
    prune_old_traces(&directory, traces.max_files, &path)?;

    let (writer, guard) = tracing_appender::non_blocking(file);
    Ok(Some((writer, guard, path)))
}

fn resolve_trace_directory(traces: &TraceSettings) -> Result<PathBuf> {
    if let Some(dir) = &traces.directory {
        return Ok(dir.clone());
    }
    Ok(project_dirs()?.cache_dir().join("traces"))
}

fn create_trace_file(service: &str, directory: &Path) -> Result<(File, PathBuf)> {
    let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let mut candidate = directory.join(format!("{service}-{timestamp}{TRACE_SUFFIX}"));
    let mut counter = 0;
    while candidate.exists() {
        counter += 1;
        candidate = directory.join(format!("{service}-{timestamp}-{counter}{TRACE_SUFFIX}"));
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&candidate)
        .with_context(|| format!("Failed to open trace file {}", candidate.display()))?;
    Ok((file, candidate))
}

/// Keep at most `max_files` trace files including `keep`. Zero disables pruning.
fn prune_old_traces(directory: &Path, max_files: usize, keep: &Path) -> Result<()> {
    if max_files == 0 {
        return Ok(());
    }
    let retain = max_files - 1;
    let stale = trace_files(directory)?
        .into_iter()
        .filter(|path| path != keep)
        .skip(retain);
    for path in stale {
        let _ = fs::remove_file(&path);
    }
    Ok(())
}

/// Trace files in `directory`, newest first.
fn trace_files(directory: &Path) -> Result<Vec<PathBuf>> {
    if !directory.exists() {
        return Ok(Vec::new());
    }

    let mut entries: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(directory)
        .with_context(|| format!("Failed to read trace directory {}", directory.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let is_trace = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(TRACE_SUFFIX));
        if !is_trace || !path.is_file() {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|meta| meta.modified()) else {
            continue;
        };
        entries.push((modified, path));
    }

    entries.sort_by_key(|(modified, _)| Reverse(*modified));
    Ok(entries.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        let modified = SystemTime::now() - Duration::from_secs(age_secs);
        file.set_modified(modified).unwrap();
        path
    }

    #[test]
    fn prune_keeps_newest_and_active_file() {
        let dir = tempdir().unwrap();
        let oldest = touch(dir.path(), "webframe-1.trace.jsonl", 300);
        let older = touch(dir.path(), "webframe-2.trace.jsonl", 200);
        let newer = touch(dir.path(), "webframe-3.trace.jsonl", 100);
        let active = touch(dir.path(), "webframe-4.trace.jsonl", 0);
        let unrelated = touch(dir.path(), "notes.txt", 500);

        prune_old_traces(dir.path(), 2, &active).unwrap();

        assert!(active.exists());
        assert!(newer.exists());
        assert!(!older.exists());
        assert!(!oldest.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn zero_max_files_disables_pruning() {
        let dir = tempdir().unwrap();
        let old = touch(dir.path(), "a.trace.jsonl", 100);
        let keep = touch(dir.path(), "b.trace.jsonl", 0);
        prune_old_traces(dir.path(), 0, &keep).unwrap();
        assert!(old.exists());
    }

    #[test]
    fn trace_file_names_do_not_collide() {
        let dir = tempdir().unwrap();
        let (_, first) = create_trace_file("webframe", dir.path()).unwrap();
        let (_, second) = create_trace_file("webframe", dir.path()).unwrap();
        assert_ne!(first, second);
        assert!(
            second
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(TRACE_SUFFIX))
        );
    }

    #[test]
    fn report_lists_recent_files_newest_first() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "old.trace.jsonl", 100);
        let new = touch(dir.path(), "new.trace.jsonl", 0);
        let traces = TraceSettings {
            enabled: true,
            directory: Some(dir.path().to_path_buf()),
            max_files: 10,
        };
        let report = trace_report(&traces).unwrap();
        assert!(report.enabled);
        assert_eq!(report.recent_files.first(), Some(&new));
        assert_eq!(report.recent_files.len(), 2);
    }
}
