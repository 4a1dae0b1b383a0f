//! Decode orchestration.
//!
//! One [`Decoder`] handles a sequence of archives. For each archive it
//! prepares `<root>/<archive>_sources`, dispatches one task per eligible
//! class batch and per eligible resource, and waits for the pool while
//! reporting progress. A task that fails is recorded in `_failed_classes`
//! and never stops its siblings.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use crate::decompiler::{
    ClassEntry, DecompileOptions, Decompiler, DecompilerProvider, ResourceEntry,
};
use crate::error::OutputDirectoryError;
use crate::filter::{ResourceFilter, SourceFilter};
use crate::input::InputLines;
use crate::output::OutputPathResolver;
use crate::pool::{PauseGate, TaskHandler};
use crate::prompt::{ConflictChoice, ConflictPrompt};
use crate::sink::OutputSink;

pub const FAILURE_LOG_NAME: &str = "_failed_classes";

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct DecodeJob {
    pub output_root: PathBuf,
    pub source_filter: SourceFilter,
    pub resource_filter: ResourceFilter,
    pub flatten: bool,
    pub rename_classes: bool,
    pub thread_count: usize,
    pub pause_enabled: bool,
    pub decode_java: bool,
    pub decode_smali: bool,
    pub decode_res: bool,
}

impl DecodeJob {
    fn decompile_options(&self) -> DecompileOptions {
        DecompileOptions {
            rename_classes: self.rename_classes,
            include_source: self.decode_java || self.decode_smali,
            include_resources: self.decode_res,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeState {
    Init,
    ResolvingOutput,
    Dispatching,
    Awaiting,
    Done,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecodeReport {
    pub archive: String,
    pub output_dir: Option<String>,
    pub state: DecodeState,
    pub dispatched: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DecodeReport {
    fn new(archive: &Path) -> Self {
        Self {
            archive: archive.to_string_lossy().to_string(),
            output_dir: None,
            state: DecodeState::Init,
            dispatched: 0,
            failed: 0,
            error: None,
        }
    }

    fn enter(&mut self, state: DecodeState) {
        tracing::debug!(archive = %self.archive, from = ?self.state, to = ?state, "decode state");
        self.state = state;
    }

    fn fail(mut self, error: impl std::fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self.enter(DecodeState::Failed);
        self
    }
}

/// Append-only `_failed_classes` file shared by all workers of one archive.
/// The file is opened and closed around every line; write errors are dropped.
#[derive(Debug)]
pub struct FailureLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FailureLog {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(FAILURE_LOG_NAME),
            lock: Mutex::new(()),
        }
    }

    pub fn record_class(&self, class: &ClassEntry) {
        self.append(&format!("- {} ({})", class.full_name, class.raw_name));
    }

    pub fn record_resource(&self, resource: &ResourceEntry) {
        self.append(&format!("- {} (resource)", resource.name));
    }

    fn append(&self, line: &str) {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(err) = written {
            tracing::debug!("failure log not written: {err}");
        }
    }
}

/// `[42%]` padded to seven columns.
pub fn progress(completed: usize, total: usize) -> String {
    let percent = if total == 0 {
        100
    } else {
        completed * 100 / total
    };
    format!("{:<7}", format!("[{percent}%]"))
}

pub struct Decoder {
    job: DecodeJob,
    provider: Arc<dyn DecompilerProvider>,
    prompt: Arc<dyn ConflictPrompt>,
    sink: Arc<dyn OutputSink>,
    handler: TaskHandler,
    pause_input: Option<Arc<InputLines>>,
    monitor: OnceLock<()>,
}

impl Decoder {
    pub fn new(
        job: DecodeJob,
        provider: Arc<dyn DecompilerProvider>,
        prompt: Arc<dyn ConflictPrompt>,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Self> {
        let handler = TaskHandler::new(job.thread_count, job.pause_enabled)?;
        Ok(Self {
            job,
            provider,
            prompt,
            sink,
            handler,
            pause_input: None,
            monitor: OnceLock::new(),
        })
    }

    /// Restricts following decode passes, e.g. to the classes a search matched.
    pub fn set_source_filter(&mut self, filter: SourceFilter) {
        self.job.source_filter = filter;
    }

    pub fn pause_gate(&self) -> Arc<PauseGate> {
        self.handler.pause_gate()
    }

    /// Lines from `input` toggle pause once the first archive is being
    /// decoded. Ignored when the job was built without pause support.
    pub fn with_pause_input(mut self, input: Arc<InputLines>) -> Self {
        self.pause_input = Some(input);
        self
    }

    fn start_pause_monitor(&self) {
        if !self.job.pause_enabled {
            return;
        }
        let Some(input) = &self.pause_input else {
            return;
        };
        self.monitor.get_or_init(|| {
            let gate = self.handler.pause_gate();
            let sink = self.sink.clone();
            self.sink.write(">> Press ENTER to pause or resume");
            input.set_listener(move || {
                if gate.toggle() {
                    sink.write("Paused...");
                } else {
                    sink.write("Resumed...");
                }
            });
        });
    }

    pub fn decode(&self, archive: &Path) -> DecodeReport {
        let mut report = DecodeReport::new(archive);

        report.enter(DecodeState::ResolvingOutput);
        let dir = match self.prepare_output_dir(archive) {
            Ok(Some(dir)) => dir,
            Ok(None) => {
                self.sink.write(&format!("!!--> Skipping: {}", archive_name(archive)));
                report.enter(DecodeState::Skipped);
                return report;
            }
            Err(err) => {
                self.sink.write(&format!("!! {err}"));
                self.sink.write(&format!("!!--> Skipping: {}", archive_name(archive)));
                return report.fail(err);
            }
        };
        report.output_dir = Some(dir.to_string_lossy().to_string());
        self.start_pause_monitor();

        self.sink.write("Preparing...");
        let decompiler = match self
            .provider
            .open(archive, &self.job.decompile_options())
            .with_context(|| format!("Failed to open archive: {}", archive.display()))
        {
            Ok(decompiler) => decompiler,
            Err(err) => {
                self.sink.write(&format!("Failed: {err:#}"));
                return report.fail(format!("{err:#}"));
            }
        };

        report.enter(DecodeState::Dispatching);
        let failed = Arc::new(AtomicUsize::new(0));
        report.dispatched = self.dispatch_all(decompiler, &dir, &failed);

        if !self.handler.has_pending_task() {
            self.sink.write("Nothing to save.");
            report.enter(DecodeState::Done);
            return report;
        }

        report.enter(DecodeState::Awaiting);
        let sink = self.sink.clone();
        let mut last = (0, report.dispatched);
        self.handler.await_completion(POLL_INTERVAL, |completed, total| {
            last = (completed, total);
            sink.rewrite(&format!(">> Saving... {}", progress(completed, total)));
        });
        self.sink.restore();
        self.sink.write(&format!(">> Saving... {}", progress(last.0, last.1)));

        report.failed = failed.load(Ordering::SeqCst);
        if report.failed > 0 {
            self.sink.write(&format!(
                "!! {} item(s) failed, see {}",
                report.failed,
                dir.join(FAILURE_LOG_NAME).display()
            ));
        }
        report.enter(DecodeState::Done);
        report
    }

    /// `Ok(None)` means the user chose to skip this archive.
    fn prepare_output_dir(&self, archive: &Path) -> Result<Option<PathBuf>, OutputDirectoryError> {
        let dir = self
            .job
            .output_root
            .join(format!("{}_sources", archive_name(archive)));

        if dir.exists() {
            match self.prompt.prompt_overwrite_merge_skip(&dir, self.job.flatten) {
                ConflictChoice::Overwrite => {
                    self.sink.write("Cleaning...");
                    std::fs::remove_dir_all(&dir).map_err(|source| OutputDirectoryError::Clear {
                        path: dir.clone(),
                        source,
                    })?;
                }
                ConflictChoice::Merge if self.job.flatten => return Ok(Some(dir)),
                ConflictChoice::Merge | ConflictChoice::Skip => return Ok(None),
            }
        }

        std::fs::create_dir_all(&dir).map_err(|source| OutputDirectoryError::Create {
            path: dir.clone(),
            source,
        })?;
        Ok(Some(dir))
    }

    fn dispatch_all(
        &self,
        decompiler: Arc<dyn Decompiler>,
        dir: &Path,
        failed: &Arc<AtomicUsize>,
    ) -> usize {
        let resolver = Arc::new(OutputPathResolver::new(dir, self.job.flatten));
        let log = Arc::new(FailureLog::new(dir));
        let mut dispatched = 0;

        for batch in decompiler.build_batches() {
            let eligible: Vec<ClassEntry> = batch
                .into_iter()
                .filter(|class| class.is_eligible(&self.job.source_filter))
                .collect();
            if eligible.is_empty() {
                continue;
            }
            let task = ClassTask {
                decompiler: decompiler.clone(),
                resolver: resolver.clone(),
                log: log.clone(),
                failed: failed.clone(),
                java: self.job.decode_java,
                smali: self.job.decode_smali,
            };
            dispatched += 1;
            self.handler.dispatch(move || {
                for class in &eligible {
                    task.write_class(class);
                }
            });
        }

        for resource in decompiler.resources() {
            if !self.job.resource_filter.accepts(&resource.name) {
                continue;
            }
            let decompiler = decompiler.clone();
            let log = log.clone();
            let failed = failed.clone();
            let out_dir = dir.to_path_buf();
            dispatched += 1;
            self.handler.dispatch(move || {
                if let Err(err) = decompiler.save_resource(&resource, &out_dir) {
                    tracing::debug!(resource = %resource.name, "resource not saved: {err:#}");
                    log.record_resource(&resource);
                    failed.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        dispatched
    }
}

struct ClassTask {
    decompiler: Arc<dyn Decompiler>,
    resolver: Arc<OutputPathResolver>,
    log: Arc<FailureLog>,
    failed: Arc<AtomicUsize>,
    java: bool,
    smali: bool,
}

impl ClassTask {
    fn write_class(&self, class: &ClassEntry) {
        let paths = self.resolver.resolve(class);
        let mut ok = true;
        if self.java {
            let written = self
                .decompiler
                .code(class)
                .and_then(|code| save_text(&paths.java, &code));
            if let Err(err) = written {
                tracing::debug!(class = %class.full_name, "source not written: {err:#}");
                ok = false;
            }
        }
        if self.smali {
            let written = self
                .decompiler
                .smali(class)
                .and_then(|listing| save_text(&paths.smali, &listing));
            if let Err(err) = written {
                tracing::debug!(class = %class.full_name, "listing not written: {err:#}");
                ok = false;
            }
        }
        if !ok {
            self.log.record_class(class);
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn save_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write: {}", path.display()))
}

fn archive_name(archive: &Path) -> String {
    archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| archive.to_string_lossy().to_string())
}
