//! Fetching and installing selected machines.
//!
//! An [`InstallTask`] names where a machine's file comes from, where the
//! download lands and where the installed file goes. The [`Installer`] runs
//! tasks on a [`WorkerPool`], serializing tasks that share a source archive,
//! and retries retryable failures a bounded number of times.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::RANGE;
use romsift_core::ConfigError;
use thiserror::Error;

use crate::worker_pool::WorkerPool;

/// Name of the default install action.
pub const DEFAULT_ACTION: &str = "copy";

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Request for {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: StatusCode },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Source file not found: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("{action} failed: {message}")]
    Action { action: String, message: String },

    #[error("Cancelled")]
    Cancelled,
}

impl InstallError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn action(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Action {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Whether another attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Io { .. } => true,
            Self::Http { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::MissingSource(_) | Self::Action { .. } | Self::Cancelled => false,
        }
    }
}

/// Fetches a resource to a local path.
pub trait Downloader: Send + Sync {
    /// Make `dest` hold the resource at `url`. An existing `dest` is kept
    /// unless `force` is set.
    fn get(&self, url: &str, dest: &Path, force: bool) -> Result<(), InstallError>;
}

/// [`Downloader`] for `http(s)://` URLs, `file://` URLs and plain paths.
///
/// Partial HTTP downloads are kept as `<dest>.part` and resumed with a
/// `Range` request on the next attempt.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::blocking::Client,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("romsift/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    fn fetch(&self, url: &str, dest: &Path) -> Result<(), InstallError> {
        let part = part_path(dest);
        let offset = fs::metadata(&part).map(|m| m.len()).unwrap_or(0);

        let mut request = self.client.get(url);
        if offset > 0 {
            log::debug!("Resuming {url} at byte {offset}");
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        let mut response = request.send().map_err(|source| InstallError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        let mut file = if status == StatusCode::PARTIAL_CONTENT {
            fs::OpenOptions::new()
                .append(true)
                .open(&part)
                .map_err(|e| InstallError::io(&part, e))?
        } else if status == StatusCode::RANGE_NOT_SATISFIABLE && offset > 0 {
            // The partial file already holds everything.
            return fs::rename(&part, dest).map_err(|e| InstallError::io(dest, e));
        } else if status.is_success() {
            fs::File::create(&part).map_err(|e| InstallError::io(&part, e))?
        } else {
            return Err(InstallError::Http {
                url: url.to_string(),
                status,
            });
        };

        io::copy(&mut response, &mut file).map_err(|e| InstallError::io(&part, e))?;
        file.flush().map_err(|e| InstallError::io(&part, e))?;
        drop(file);
        fs::rename(&part, dest).map_err(|e| InstallError::io(dest, e))
    }
}

impl Downloader for HttpDownloader {
    fn get(&self, url: &str, dest: &Path, force: bool) -> Result<(), InstallError> {
        if dest.exists() && !force {
            log::debug!("{} already downloaded", dest.display());
            return Ok(());
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| InstallError::io(parent, e))?;
        }

        match local_path(url) {
            Some(source) => {
                if !source.exists() {
                    return Err(InstallError::MissingSource(source));
                }
                if source != dest {
                    fs::copy(&source, dest).map_err(|e| InstallError::io(dest, e))?;
                }
                Ok(())
            }
            None => {
                log::info!("Downloading {url}");
                self.fetch(url, dest)
            }
        }
    }
}

fn local_path(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        Some(PathBuf::from(path))
    } else if url.contains("://") {
        None
    } else {
        Some(PathBuf::from(url))
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Turns a downloaded file into an installed one.
pub trait InstallAction: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn install(&self, source: &Path, target: &Path, machine: &str) -> Result<(), InstallError>;
}

fn prepare_target(source: &Path, target: &Path) -> Result<(), InstallError> {
    if !source.exists() {
        return Err(InstallError::MissingSource(source.to_path_buf()));
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| InstallError::io(parent, e))?;
    }
    Ok(())
}

/// Copy the download to the target, keeping the download.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyAction;

impl InstallAction for CopyAction {
    fn name(&self) -> &str {
        "copy"
    }

    fn install(&self, source: &Path, target: &Path, machine: &str) -> Result<(), InstallError> {
        prepare_target(source, target)?;
        if source == target {
            return Ok(());
        }
        fs::copy(source, target).map_err(|e| InstallError::io(target, e))?;
        log::debug!("{machine}: copied {} -> {}", source.display(), target.display());
        Ok(())
    }
}

/// Move the download to the target.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveAction;

impl InstallAction for MoveAction {
    fn name(&self) -> &str {
        "move"
    }

    fn install(&self, source: &Path, target: &Path, machine: &str) -> Result<(), InstallError> {
        prepare_target(source, target)?;
        if source == target {
            return Ok(());
        }
        if fs::rename(source, target).is_err() {
            // Cross-device: copy then remove.
            fs::copy(source, target).map_err(|e| InstallError::io(target, e))?;
            fs::remove_file(source).map_err(|e| InstallError::io(source, e))?;
        }
        log::debug!("{machine}: moved {} -> {}", source.display(), target.display());
        Ok(())
    }
}

/// The download already is the installed file.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAction;

impl InstallAction for NoAction {
    fn name(&self) -> &str {
        "none"
    }

    fn install(&self, _source: &Path, target: &Path, _machine: &str) -> Result<(), InstallError> {
        if target.exists() {
            Ok(())
        } else {
            Err(InstallError::MissingSource(target.to_path_buf()))
        }
    }
}

/// Install actions by name.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn InstallAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<A: InstallAction + 'static>(&mut self, action: A) -> &mut Self {
        self.actions
            .insert(action.name().to_string(), Arc::new(action));
        self
    }

    /// Registry with `copy`, `move` and `none`.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry
            .register(CopyAction)
            .register(MoveAction)
            .register(NoAction);
        registry
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn InstallAction>, ConfigError> {
        self.actions
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::invalid_value("install", format!("unknown action '{name}'")))
    }
}

/// Shared flag checked between tasks.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One machine to install.
#[derive(Debug, Clone)]
pub struct InstallTask {
    pub machine: String,
    /// Tasks with the same key share a source file and never run concurrently.
    pub archive_key: String,
    /// Where to fetch from; `None` when the download path is filled some other way.
    pub source: Option<String>,
    pub download: PathBuf,
    pub target: PathBuf,
    pub action: Arc<dyn InstallAction>,
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub workers: usize,
    /// Total attempts per task, at least one.
    pub attempts: usize,
    pub retry_delay: Duration,
    /// Re-download and reinstall even when files exist.
    pub force: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            attempts: 3,
            retry_delay: Duration::from_secs(2),
            force: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    Installed,
    AlreadyPresent,
}

#[derive(Debug)]
pub struct InstallOutcome {
    pub machine: String,
    pub target: PathBuf,
    pub attempts: usize,
    pub result: Result<InstallStatus, InstallError>,
}

/// Runs install tasks concurrently.
#[derive(Clone)]
pub struct Installer {
    downloader: Arc<dyn Downloader>,
    options: InstallOptions,
    cancel: CancelFlag,
}

impl Installer {
    pub fn new(downloader: Arc<dyn Downloader>, options: InstallOptions, cancel: CancelFlag) -> Self {
        Self {
            downloader,
            options,
            cancel,
        }
    }

    /// Install every task and return one outcome per task, in task order.
    /// `on_outcome` sees each outcome as it finishes.
    pub async fn run(
        &self,
        tasks: Vec<InstallTask>,
        mut on_outcome: impl FnMut(&InstallOutcome),
    ) -> Vec<InstallOutcome> {
        let batches = batch_by_archive(tasks);
        log::info!(
            "Installing {} archive(s) with {} worker(s)",
            batches.len(),
            self.options.workers
        );

        let runner = self.clone();
        let mut pool = WorkerPool::start(self.options.workers, batches, move |batch| {
            let runner = runner.clone();
            async move {
                let pending: Vec<(usize, String, PathBuf)> = batch
                    .iter()
                    .map(|(i, t)| (*i, t.machine.clone(), t.target.clone()))
                    .collect();
                match tokio::task::spawn_blocking(move || runner.run_batch(batch)).await {
                    Ok(outcomes) => outcomes,
                    Err(e) => pending
                        .into_iter()
                        .map(|(index, machine, target)| {
                            let outcome = InstallOutcome {
                                machine,
                                target,
                                attempts: 0,
                                result: Err(InstallError::action("worker", e.to_string())),
                            };
                            (index, outcome)
                        })
                        .collect(),
                }
            }
        });

        let mut outcomes = Vec::new();
        while let Some((_, batch)) = pool.recv().await {
            for (index, outcome) in batch {
                on_outcome(&outcome);
                outcomes.push((index, outcome));
            }
        }
        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, o)| o).collect()
    }

    fn run_batch(&self, batch: Vec<(usize, InstallTask)>) -> Vec<(usize, InstallOutcome)> {
        batch
            .into_iter()
            .map(|(index, task)| (index, self.install_with_retries(&task)))
            .collect()
    }

    /// Install one task, retrying retryable errors with a fixed delay.
    pub fn install_with_retries(&self, task: &InstallTask) -> InstallOutcome {
        let attempts = self.options.attempts.max(1);
        let mut attempt = 0;
        let result = loop {
            if self.cancel.is_cancelled() {
                break Err(InstallError::Cancelled);
            }
            attempt += 1;
            match self.install_once(task) {
                Ok(status) => break Ok(status),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    log::warn!(
                        "{}: attempt {attempt}/{attempts} failed: {e}; retrying",
                        task.machine
                    );
                    std::thread::sleep(self.options.retry_delay);
                }
                Err(e) => break Err(e),
            }
        };

        match &result {
            Ok(InstallStatus::Installed) => log::info!("Installed {}", task.machine),
            Ok(InstallStatus::AlreadyPresent) => log::debug!("{} already installed", task.machine),
            Err(InstallError::Cancelled) => log::debug!("{}: cancelled", task.machine),
            Err(e) => log::error!("{}: {e}", task.machine),
        }

        InstallOutcome {
            machine: task.machine.clone(),
            target: task.target.clone(),
            attempts: attempt,
            result,
        }
    }

    fn install_once(&self, task: &InstallTask) -> Result<InstallStatus, InstallError> {
        if task.target.exists() && !self.options.force {
            return Ok(InstallStatus::AlreadyPresent);
        }
        if let Some(url) = &task.source {
            self.downloader.get(url, &task.download, self.options.force)?;
        }
        task.action.install(&task.download, &task.target, &task.machine)?;
        Ok(InstallStatus::Installed)
    }
}

/// Group tasks by archive key, keeping first-seen order of keys and task
/// order within a key. Each task carries its original index.
fn batch_by_archive(tasks: Vec<InstallTask>) -> Vec<Vec<(usize, InstallTask)>> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut batches: Vec<Vec<(usize, InstallTask)>> = Vec::new();
    for (index, task) in tasks.into_iter().enumerate() {
        let slot = *slots.entry(task.archive_key.clone()).or_insert_with(|| {
            batches.push(Vec::new());
            batches.len() - 1
        });
        batches[slot].push((index, task));
    }
    batches
}

#[cfg(test)]
#[path = "tests/install_tests.rs"]
mod tests;
