//! Background batch installation.
//!
//! One [`BatchInstaller`] runs at most one batch at a time. A batch runs on
//! its own thread, installs packages in order through a [`PackageInstaller`],
//! records every outcome in an [`InstallationProgress`] and reports each one
//! through optional callbacks. Callbacks run on the batch thread.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use thiserror::Error;

use super::progress::{InstallationProgress, InstallationSummary, ProgressSnapshot};
use super::result::InstallResult;
use crate::winget::runner::CommandRunner;
use crate::winget::{InstallOutcome, WingetError, WingetManager};

/// Installs a single package. Implemented by the facade; tests substitute
/// their own.
pub trait PackageInstaller: Send + Sync + 'static {
    fn install_package(&self, package_id: &str, silent: bool)
    -> Result<InstallOutcome, WingetError>;
}

impl<R: CommandRunner + 'static> PackageInstaller for WingetManager<R> {
    fn install_package(
        &self,
        package_id: &str,
        silent: bool,
    ) -> Result<InstallOutcome, WingetError> {
        self.install(package_id, silent, None)
    }
}

pub type ResultCallback = Box<dyn Fn(&str, &InstallResult) + Send + Sync>;
pub type ProgressCallback = Box<dyn Fn(&ProgressSnapshot) + Send + Sync>;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("An installation batch is already in progress")]
    AlreadyInProgress,

    #[error("Failed to start installation thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub struct BatchRequest {
    package_ids: Vec<String>,
    silent: bool,
    stop_on_first_failure: bool,
    on_result: Option<ResultCallback>,
    on_progress: Option<ProgressCallback>,
}

impl BatchRequest {
    pub fn new<I, S>(package_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            package_ids: package_ids.into_iter().map(Into::into).collect(),
            silent: true,
            stop_on_first_failure: false,
            on_result: None,
            on_progress: None,
        }
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Stop after the first package that does not succeed. Later packages
    /// are never attempted and never appear in the results.
    pub fn stop_on_first_failure(mut self, stop: bool) -> Self {
        self.stop_on_first_failure = stop;
        self
    }

    pub fn on_result(mut self, callback: impl Fn(&str, &InstallResult) + Send + Sync + 'static) -> Self {
        self.on_result = Some(Box::new(callback));
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(&ProgressSnapshot) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub fn package_ids(&self) -> &[String] {
        &self.package_ids
    }
}

#[derive(Debug, Default)]
struct Completion {
    done: Mutex<bool>,
    signal: Condvar,
}

impl Completion {
    fn finish(&self) {
        let mut done = self.done.lock().unwrap_or_else(|p| p.into_inner());
        *done = true;
        self.signal.notify_all();
    }

    fn is_done(&self) -> bool {
        *self.done.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn wait(&self, timeout: Option<Duration>) -> bool {
        let done = self.done.lock().unwrap_or_else(|p| p.into_inner());
        match timeout {
            None => *self
                .signal
                .wait_while(done, |done| !*done)
                .unwrap_or_else(|p| p.into_inner()),
            Some(timeout) => {
                let (done, _) = self
                    .signal
                    .wait_timeout_while(done, timeout, |done| !*done)
                    .unwrap_or_else(|p| p.into_inner());
                *done
            }
        }
    }
}

/// Handle to a started (or trivially finished) batch.
#[derive(Debug, Clone)]
pub struct BatchHandle {
    completion: Arc<Completion>,
    progress: Option<Arc<InstallationProgress>>,
}

impl BatchHandle {
    fn finished() -> Self {
        let completion = Completion::default();
        completion.finish();
        Self {
            completion: Arc::new(completion),
            progress: None,
        }
    }

    /// Block until the batch ends or `timeout` elapses; true if it ended.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        self.completion.wait(timeout)
    }

    pub fn is_finished(&self) -> bool {
        self.completion.is_done()
    }

    /// `None` for an empty batch.
    pub fn progress(&self) -> Option<&Arc<InstallationProgress>> {
        self.progress.as_ref()
    }
}

/// Releases the single-flight flag and wakes waiters however the batch
/// thread exits, panics included.
struct BatchGuard {
    installing: Arc<AtomicBool>,
    completion: Arc<Completion>,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.installing.store(false, Ordering::SeqCst);
        self.completion.finish();
    }
}

pub struct BatchInstaller<I: PackageInstaller> {
    installer: Arc<I>,
    pacing_delay: Duration,
    installing: Arc<AtomicBool>,
    current: Mutex<Option<BatchHandle>>,
}

impl<I: PackageInstaller> BatchInstaller<I> {
    pub fn new(installer: Arc<I>, pacing_delay: Duration) -> Self {
        Self {
            installer,
            pacing_delay,
            installing: Arc::new(AtomicBool::new(false)),
            current: Mutex::new(None),
        }
    }

    /// Start a batch in the background and return without waiting.
    ///
    /// Rejected with [`BatchError::AlreadyInProgress`] while another batch
    /// from this installer is still running; there is no queue.
    pub fn install_packages(&self, request: BatchRequest) -> Result<BatchHandle, BatchError> {
        // Held from the flag swap until the new handle is recorded, so a
        // batch started right after this one finishes cannot be overwritten.
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());

        if self
            .installing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Rejected installation batch: another batch is in progress");
            return Err(BatchError::AlreadyInProgress);
        }

        if request.package_ids.is_empty() {
            self.installing.store(false, Ordering::SeqCst);
            debug!("Empty installation batch, nothing to do");
            return Ok(BatchHandle::finished());
        }

        let progress = Arc::new(InstallationProgress::new(request.package_ids.len()));
        let completion = Arc::new(Completion::default());
        let handle = BatchHandle {
            completion: Arc::clone(&completion),
            progress: Some(Arc::clone(&progress)),
        };
        let previous = current.replace(handle.clone());

        let guard = BatchGuard {
            installing: Arc::clone(&self.installing),
            completion,
        };
        let installer = Arc::clone(&self.installer);
        let pacing_delay = self.pacing_delay;

        // If spawning fails the closure is dropped with the guard inside it,
        // which releases the flag.
        let spawned = thread::Builder::new()
            .name("winstall-batch".into())
            .spawn(move || {
                let _guard = guard;
                run_batch(installer.as_ref(), &progress, &request, pacing_delay);
            });
        if let Err(e) = spawned {
            *current = previous;
            return Err(e.into());
        }
        Ok(handle)
    }

    pub fn is_installing(&self) -> bool {
        self.installing.load(Ordering::SeqCst)
    }

    /// True immediately when no batch was ever started.
    pub fn wait_for_completion(&self, timeout: Option<Duration>) -> bool {
        let current = self.current.lock().unwrap_or_else(|p| p.into_inner()).clone();
        match current {
            Some(handle) => handle.wait(timeout),
            None => true,
        }
    }

    /// Summary of the most recent non-empty batch.
    pub fn get_installation_summary(&self) -> Option<InstallationSummary> {
        self.current
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .and_then(|handle| handle.progress.as_ref())
            .map(|progress| progress.get_summary())
    }
}

fn run_batch<I: PackageInstaller + ?Sized>(
    installer: &I,
    progress: &InstallationProgress,
    request: &BatchRequest,
    pacing_delay: Duration,
) {
    let total = request.package_ids.len();
    info!("Starting installation batch of {total} packages");

    for (index, package_id) in request.package_ids.iter().enumerate() {
        progress.set_current_package(package_id);
        info!("[{}/{}] Installing {}", index + 1, total, package_id);

        let result = install_one(installer, package_id, request.silent);
        let succeeded = result.success();
        progress.update(package_id, result.clone());

        if let Some(callback) = &request.on_progress {
            callback(&progress.snapshot());
        }
        if let Some(callback) = &request.on_result {
            callback(package_id, &result);
        }

        if !succeeded && request.stop_on_first_failure {
            warn!(
                "Stopping batch after failure of {} ({} of {} packages processed)",
                package_id,
                index + 1,
                total
            );
            break;
        }

        if index + 1 < total && !pacing_delay.is_zero() {
            thread::sleep(pacing_delay);
        }
    }

    let summary = progress.get_summary();
    info!(
        "Installation batch finished: {} successful, {} failed, {} skipped",
        summary.successful, summary.failed, summary.skipped
    );
}

fn install_one<I: PackageInstaller + ?Sized>(
    installer: &I,
    package_id: &str,
    silent: bool,
) -> InstallResult {
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
        installer.install_package(package_id, silent)
    }));
    match attempt {
        Ok(Ok(outcome)) => InstallResult::succeeded(outcome),
        Ok(Err(e)) => {
            if e.is_skippable() {
                warn!("Skipping {package_id}: {e}");
            } else {
                error!("Failed to install {package_id}: {e}");
            }
            InstallResult::from_error(package_id, &e)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("Unexpected error installing {package_id}: {message}");
            InstallResult::unexpected(package_id, format!("Unexpected error: {message}"))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::result::{ErrorKind, InstallStatus};
    use crate::winget::WingetSettings;
    use crate::winget::runner::CommandOutput;
    use crate::winget::testing::{Scripted, ScriptedRunner};
    use std::collections::HashMap;

    const WAIT: Option<Duration> = Some(Duration::from_secs(10));

    #[derive(Clone)]
    enum Fake {
        Succeed,
        Fail(WingetError),
        Panic,
    }

    /// Blocks installs until opened.
    #[derive(Default)]
    struct Gate {
        open: Mutex<bool>,
        signal: Condvar,
    }

    impl Gate {
        fn closed() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn open(&self) {
            *self.open.lock().unwrap() = true;
            self.signal.notify_all();
        }

        fn pass(&self) {
            let open = self.open.lock().unwrap();
            let _open = self.signal.wait_while(open, |open| !*open).unwrap();
        }
    }

    #[derive(Default)]
    struct FakeInstaller {
        outcomes: HashMap<String, Fake>,
        calls: Mutex<Vec<String>>,
        gate: Option<Arc<Gate>>,
        /// Ids held at the gate; `None` holds every id.
        gated_ids: Option<Vec<String>>,
    }

    impl FakeInstaller {
        fn new(outcomes: &[(&str, Fake)]) -> Self {
            Self {
                outcomes: outcomes
                    .iter()
                    .map(|(id, fake)| (id.to_string(), fake.clone()))
                    .collect(),
                ..Default::default()
            }
        }

        fn gated(mut self, gate: Arc<Gate>) -> Self {
            self.gate = Some(gate);
            self
        }

        fn gated_only(mut self, gate: Arc<Gate>, ids: &[&str]) -> Self {
            self.gate = Some(gate);
            self.gated_ids = Some(ids.iter().map(|id| id.to_string()).collect());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl PackageInstaller for FakeInstaller {
        fn install_package(
            &self,
            package_id: &str,
            _silent: bool,
        ) -> Result<InstallOutcome, WingetError> {
            self.calls.lock().unwrap().push(package_id.to_string());
            if let Some(gate) = &self.gate {
                let held = match &self.gated_ids {
                    Some(ids) => ids.iter().any(|id| id == package_id),
                    None => true,
                };
                if held {
                    gate.pass();
                }
            }
            match self.outcomes.get(package_id).cloned().unwrap_or(Fake::Succeed) {
                Fake::Succeed => Ok(InstallOutcome {
                    package_id: package_id.to_string(),
                    command: format!("winget install --id {package_id}"),
                    attempts: 1,
                    output: CommandOutput::default(),
                }),
                Fake::Fail(e) => Err(e),
                Fake::Panic => panic!("installer exploded"),
            }
        }
    }

    fn batch<I: PackageInstaller>(installer: I) -> (Arc<I>, BatchInstaller<I>) {
        let installer = Arc::new(installer);
        let batch = BatchInstaller::new(Arc::clone(&installer), Duration::ZERO);
        (installer, batch)
    }

    type Seen = Arc<Mutex<Vec<(String, InstallResult)>>>;

    fn recording(request: BatchRequest) -> (BatchRequest, Seen) {
        let seen: Seen = Arc::default();
        let sink = Arc::clone(&seen);
        let request = request.on_result(move |id, result| {
            sink.lock().unwrap().push((id.to_string(), result.clone()));
        });
        (request, seen)
    }

    #[test]
    fn test_no_batch_is_finished() {
        let (_, batch) = batch(FakeInstaller::default());
        assert!(!batch.is_installing());
        assert!(batch.wait_for_completion(Some(Duration::ZERO)));
        assert!(batch.get_installation_summary().is_none());
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let (installer, batch) = batch(FakeInstaller::default());
        let handle = batch.install_packages(BatchRequest::new(Vec::<String>::new())).unwrap();
        assert!(handle.is_finished());
        assert!(handle.progress().is_none());
        assert!(!batch.is_installing());
        assert!(batch.get_installation_summary().is_none());
        assert!(installer.calls().is_empty());
    }

    #[test]
    fn test_two_successful_installs_end_to_end() {
        let runner = ScriptedRunner::new(vec![
            Scripted::Exit(0, "Successfully installed", ""),
            Scripted::Exit(0, "Successfully installed", ""),
        ]);
        let settings = WingetSettings {
            retry_backoff: Duration::ZERO,
            ..WingetSettings::default()
        };
        let (manager, batch) = batch(WingetManager::with_runner(runner, settings));

        let (request, seen) = recording(BatchRequest::new(["pkgA", "pkgB"]));
        batch.install_packages(request).unwrap();
        assert!(batch.wait_for_completion(WAIT));

        let summary = batch.get_installation_summary().unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.progress_percentage, 100.0);
        assert_eq!(manager.runner().command_calls().len(), 2);

        let seen = seen.lock().unwrap();
        let ids: Vec<&str> = seen.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["pkgA", "pkgB"]);
        assert!(seen.iter().all(|(_, r)| r.success() && r.attempts == 1));
    }

    #[test]
    fn test_second_batch_rejected_while_running() {
        let gate = Gate::closed();
        let (_, batch) = batch(FakeInstaller::default().gated(Arc::clone(&gate)));

        let first = batch.install_packages(BatchRequest::new(["P1"])).unwrap();
        assert!(batch.is_installing());
        assert!(matches!(
            batch.install_packages(BatchRequest::new(["P2"])),
            Err(BatchError::AlreadyInProgress)
        ));
        assert!(matches!(
            batch.install_packages(BatchRequest::new(Vec::<String>::new())),
            Err(BatchError::AlreadyInProgress)
        ));
        assert!(!batch.wait_for_completion(Some(Duration::from_millis(50))));

        gate.open();
        assert!(first.wait(WAIT));
        assert!(!batch.is_installing());

        let second = batch.install_packages(BatchRequest::new(["P2"])).unwrap();
        assert!(second.wait(WAIT));
    }

    #[test]
    fn test_stop_on_first_failure() {
        let (installer, batch) = batch(FakeInstaller::new(&[(
            "P1",
            Fake::Fail(WingetError::InstallationFailed {
                package_id: "P1".into(),
                reason: "Error".into(),
                attempts: 4,
            }),
        )]));

        let (request, seen) = recording(BatchRequest::new(["P1", "P2"]).stop_on_first_failure(true));
        batch.install_packages(request).unwrap();
        assert!(batch.wait_for_completion(WAIT));

        assert_eq!(installer.calls(), ["P1"]);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "P1");

        let summary = batch.get_installation_summary().unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.results.contains_key("P2"));
    }

    #[test]
    fn test_failures_do_not_stop_batch_by_default() {
        let (installer, batch) = batch(FakeInstaller::new(&[(
            "P1",
            Fake::Fail(WingetError::unavailable()),
        )]));
        batch.install_packages(BatchRequest::new(["P1", "P2"])).unwrap();
        assert!(batch.wait_for_completion(WAIT));
        assert_eq!(installer.calls(), ["P1", "P2"]);
        let summary = batch.get_installation_summary().unwrap();
        assert_eq!((summary.successful, summary.failed), (1, 1));
    }

    #[test]
    fn test_errors_are_classified() {
        let (_, batch) = batch(FakeInstaller::new(&[
            (
                "admin",
                Fake::Fail(WingetError::AdminRequired {
                    message: "needs admin".into(),
                    attempts: 1,
                }),
            ),
            (
                "missing",
                Fake::Fail(WingetError::PackageNotFound {
                    package_id: "missing".into(),
                    attempts: 1,
                }),
            ),
            ("unavailable", Fake::Fail(WingetError::unavailable())),
            (
                "exec",
                Fake::Fail(WingetError::ExecutionFailed {
                    message: "timed out".into(),
                    command: None,
                    return_code: None,
                }),
            ),
            (
                "exhausted",
                Fake::Fail(WingetError::InstallationFailed {
                    package_id: "exhausted".into(),
                    reason: "Error".into(),
                    attempts: 4,
                }),
            ),
            ("boom", Fake::Panic),
        ]));

        batch
            .install_packages(BatchRequest::new([
                "admin",
                "missing",
                "unavailable",
                "exec",
                "exhausted",
                "boom",
                "fine",
            ]))
            .unwrap();
        assert!(batch.wait_for_completion(WAIT));
        assert!(!batch.is_installing());

        let summary = batch.get_installation_summary().unwrap();
        let status = |id: &str| summary.results[id].status;
        assert_eq!(status("admin"), InstallStatus::Skipped(ErrorKind::AdminRequired));
        assert_eq!(status("missing"), InstallStatus::Skipped(ErrorKind::NotFound));
        assert_eq!(
            status("unavailable"),
            InstallStatus::Failed(ErrorKind::ManagerUnavailable)
        );
        assert_eq!(status("exec"), InstallStatus::Failed(ErrorKind::ExecutionFailed));
        assert_eq!(
            status("exhausted"),
            InstallStatus::Failed(ErrorKind::InstallationFailed)
        );
        assert_eq!(status("boom"), InstallStatus::Failed(ErrorKind::UnexpectedError));
        assert_eq!(status("fine"), InstallStatus::Succeeded);
        assert_eq!(
            (summary.successful, summary.failed, summary.skipped),
            (1, 4, 2)
        );
    }

    #[test]
    fn test_progress_callback_after_each_package() {
        let (_, batch) = batch(FakeInstaller::default());
        let snapshots: Arc<Mutex<Vec<(usize, usize, String)>>> = Arc::default();
        let sink = Arc::clone(&snapshots);
        let request = BatchRequest::new(["a", "b", "c"]).on_progress(move |snapshot| {
            sink.lock().unwrap().push((
                snapshot.completed,
                snapshot.total,
                snapshot.current_package.clone(),
            ));
        });
        batch.install_packages(request).unwrap();
        assert!(batch.wait_for_completion(WAIT));

        let snapshots = snapshots.lock().unwrap();
        assert_eq!(
            *snapshots,
            vec![
                (1, 3, "a".to_string()),
                (2, 3, "b".to_string()),
                (3, 3, "c".to_string()),
            ]
        );
    }

    #[test]
    fn test_panicking_callback_still_releases_guard() {
        let (_, batch) = batch(FakeInstaller::default());
        let request = BatchRequest::new(["a", "b"]).on_result(|_, _| panic!("callback bug"));
        batch.install_packages(request).unwrap();
        assert!(batch.wait_for_completion(WAIT));
        assert!(!batch.is_installing());

        let next = batch.install_packages(BatchRequest::new(["c"])).unwrap();
        assert!(next.wait(WAIT));
    }

    #[test]
    fn test_pacing_delay_between_packages_only() {
        let installer = Arc::new(FakeInstaller::default());
        let batch = BatchInstaller::new(installer, Duration::from_millis(100));

        let started = std::time::Instant::now();
        batch.install_packages(BatchRequest::new(["only"])).unwrap();
        assert!(batch.wait_for_completion(WAIT));
        assert!(started.elapsed() < Duration::from_millis(100));

        let started = std::time::Instant::now();
        batch.install_packages(BatchRequest::new(["a", "b", "c"])).unwrap();
        assert!(batch.wait_for_completion(WAIT));
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_latest_batch_is_never_replaced_by_a_finished_one() {
        for _ in 0..200 {
            let gate = Gate::closed();
            let (_, batch) = batch(FakeInstaller::default().gated_only(Arc::clone(&gate), &["slow-1"]));
            let batch = Arc::new(batch);

            let fast = {
                let batch = Arc::clone(&batch);
                thread::spawn(move || batch.install_packages(BatchRequest::new(["fast"])).ok())
            };
            let slow = loop {
                match batch.install_packages(BatchRequest::new(["slow-1", "slow-2", "slow-3"])) {
                    Ok(handle) => break handle,
                    Err(BatchError::AlreadyInProgress) => thread::yield_now(),
                    Err(e) => panic!("unexpected batch error: {e}"),
                }
            };
            fast.join().unwrap();

            assert_eq!(slow.progress().unwrap().total(), 3);
            assert!(!slow.is_finished());
            assert_eq!(batch.get_installation_summary().unwrap().total, 3);
            assert!(!batch.wait_for_completion(Some(Duration::ZERO)));
            assert!(batch.is_installing());

            gate.open();
            assert!(slow.wait(WAIT));
            assert!(batch.wait_for_completion(WAIT));
        }
    }
}
