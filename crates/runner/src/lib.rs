//! Process supervisor for long-running services.
//!
//! A [`Runner`] owns a set of named app processes that share one
//! [`CancellationToken`]. The token is cancelled on SIGINT/SIGTERM or when
//! any process fails; every process is then awaited, closers run under a
//! timeout, and the binary exits with status 1 if a process failed.
//!
//! ```no_run
//! use iotstream_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Runner::new()
//!         .with_named_process("ticker", Box::new(|ctx| Box::pin(async move {
//!             ctx.cancelled().await;
//!             Ok(())
//!         })))
//!         .with_closer(|| async move { Ok(()) })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type BoxedResultFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A long-running process driven by a cancellation token
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> BoxedResultFuture + Send>;

/// Cleanup step executed after every app process has returned
pub type Closer = Box<dyn FnOnce() -> BoxedResultFuture + Send>;

const DEFAULT_CLOSER_TIMEOUT: Duration = Duration::from_secs(10);

/// How a run ended
#[derive(Debug, Default)]
pub struct RunOutcome {
    /// Name and error of the first process that failed
    pub failure: Option<(String, anyhow::Error)>,
    pub closers_timed_out: bool,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        if self.failure.is_some() {
            1
        } else {
            0
        }
    }
}

pub struct Runner {
    processes: Vec<(String, AppProcess)>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    token: CancellationToken,
    handle_signals: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: DEFAULT_CLOSER_TIMEOUT,
            token: CancellationToken::new(),
            handle_signals: true,
        }
    }

    /// Add a process under `name`, used in logs and in the run outcome
    pub fn with_named_process(mut self, name: impl Into<String>, process: AppProcess) -> Self {
        self.processes.push((name.into(), process));
        self
    }

    /// Add an unnamed process from a closure
    pub fn with_app_process<F, Fut>(self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = format!("process_{}", self.processes.len());
        self.with_named_process(name, Box::new(|ctx| Box::pin(process(ctx))))
    }

    /// Closers run concurrently once all processes have returned, whatever their outcome
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Share cancellation with code outside the runner
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Disable SIGINT/SIGTERM handling; shutdown then comes only from the token or a failure
    pub fn without_signal_handlers(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Run to completion and exit the process with the outcome's exit code
    pub async fn run(self) {
        let outcome = self.execute().await;
        match &outcome.failure {
            Some((name, err)) => {
                error!(process = %name, error = %format!("{:#}", err), "Exiting after process failure")
            }
            None => info!("Exiting normally"),
        }
        std::process::exit(outcome.exit_code());
    }

    /// Run every process until shutdown, then the closers
    pub async fn execute(self) -> RunOutcome {
        let token = self.token;

        if self.handle_signals {
            spawn_signal_handlers(token.clone());
        }

        let mut join_set = JoinSet::new();
        for (name, process) in self.processes {
            let ctx = token.clone();
            info!(process = %name, "Starting process");
            join_set.spawn(async move {
                let result = process(ctx).await;
                (name, result)
            });
        }

        let mut outcome = RunOutcome::default();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    debug!(process = %name, "Process finished");
                }
                Ok((name, Err(err))) => {
                    error!(process = %name, error = %format!("{:#}", err), "Process failed");
                    if outcome.failure.is_none() {
                        outcome.failure = Some((name, err));
                    }
                    token.cancel();
                }
                Err(join_err) => {
                    error!(error = %join_err, "Process panicked");
                    if outcome.failure.is_none() {
                        outcome.failure =
                            Some(("<panicked>".to_string(), anyhow::anyhow!("{}", join_err)));
                    }
                    token.cancel();
                }
            }
        }

        if !self.closers.is_empty() {
            info!(timeout_ms = self.closer_timeout.as_millis(), "Running closers");
            if tokio::time::timeout(self.closer_timeout, run_closers(self.closers))
                .await
                .is_err()
            {
                error!(timeout_ms = self.closer_timeout.as_millis(), "Closers timed out");
                outcome.closers_timed_out = true;
            }
        }

        outcome
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT");
                ctrl_c_token.cancel();
            }
            Err(err) => warn!(error = %err, "Failed to listen for SIGINT"),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM");
                token.cancel();
            }
            Err(err) => warn!(error = %err, "Failed to listen for SIGTERM"),
        }
    });
}

async fn run_closers(closers: Vec<Closer>) {
    let mut set = JoinSet::new();
    for closer in closers {
        set.spawn(closer());
    }

    while let Some(result) = set.join_next().await {
        match result {
            Ok(Ok(())) => debug!("Closer finished"),
            Ok(Err(err)) => error!(error = %format!("{:#}", err), "Closer failed"),
            Err(err) => error!(error = %err, "Closer panicked"),
        }
    }
}
