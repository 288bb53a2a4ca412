//! A concurrent process runner with graceful, ordered shutdown.
//!
//! The runner owns the long-running processes of a service (UDP ingestion,
//! broker consumers, ...) and the closers that release their resources:
//! - Processes run concurrently, each with a shared cancellation token
//! - SIGTERM/SIGINT, or the first failing process, cancels all processes
//! - Closers run afterwards, one at a time, in reverse registration order
//! - Closers are bounded by a configurable timeout
//!
//! # Example
//!
//! ```no_run
//! use sensor_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let runner = Runner::new()
//!         .with_named_process("ticker", |ctx| async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => break,
//!                     _ = tokio::time::sleep(Duration::from_secs(1)) => {
//!                         tracing::info!("tick");
//!                     }
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .with_closer(|| async move {
//!             tracing::info!("releasing resources");
//!             Ok(())
//!         })
//!         .with_closer_timeout(Duration::from_secs(5));
//!
//!     runner.run().await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Type alias for an app process function.
/// Takes a cancellation token and returns a future that resolves to Result<(), anyhow::Error>
pub type AppProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>
        + Send,
>;

/// Type alias for a closer function.
pub type Closer =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>> + Send>;

pub struct Runner {
    app_processes: Vec<(String, AppProcess)>,
    closers: Vec<(String, Closer)>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Creates a runner with a 10 second closer timeout and no processes.
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Adds an anonymous app process.
    pub fn with_app_process<F, Fut>(self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let name = format!("process-{}", self.app_processes.len());
        self.with_named_process(name, process)
    }

    /// Adds an app process whose name is used in lifecycle logs.
    ///
    /// If any process returns an error, all processes are cancelled and the
    /// closers are executed.
    pub fn with_named_process<N, F, Fut>(mut self, name: N, process: F) -> Self
    where
        N: Into<String>,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.app_processes
            .push((name.into(), Box::new(|token| Box::pin(process(token)))));
        self
    }

    /// Adds an anonymous closer.
    pub fn with_closer<F, Fut>(self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let name = format!("closer-{}", self.closers.len());
        self.with_named_closer(name, closer)
    }

    /// Adds a closer.
    ///
    /// Closers execute after every app process has stopped, regardless of
    /// why they stopped. They run one at a time, last registered first, so a
    /// resource registered early (a broker connection) outlives the
    /// resources registered after it. A failing closer does not prevent the
    /// remaining closers from running.
    pub fn with_named_closer<N, F, Fut>(mut self, name: N, closer: F) -> Self
    where
        N: Into<String>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers
            .push((name.into(), Box::new(|| Box::pin(closer()))));
        self
    }

    /// Sets the timeout for executing all closers. Default is 10 seconds.
    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Sets a custom cancellation token, allowing external control over
    /// process cancellation.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Runs until shutdown and exits the process: status 0 on a clean stop,
    /// 1 if any app process failed.
    pub async fn run(self) {
        match self.run_until_stopped().await {
            Ok(()) => {
                tracing::info!("Application exiting normally");
                std::process::exit(0);
            }
            Err(err) => {
                tracing::error!(error = %format!("{:#}", err), "Application exiting with error");
                std::process::exit(1);
            }
        }
    }

    /// Runs all app processes until they finish, one fails, or a shutdown
    /// signal arrives, then executes the closers.
    ///
    /// Returns the first process error, if any.
    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let token = self.cancellation_token;
        let closer_timeout = self.closer_timeout;
        let closers = self.closers;
        let mut join_set = JoinSet::new();

        for (name, process) in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                tracing::debug!(process = %name, "starting app process");
                let result = process(process_token).await;
                (name, result)
            });
        }

        let signal_handles = Self::spawn_signal_handlers(&token);

        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    tracing::debug!(process = %name, "app process completed");
                }
                Ok((name, Err(err))) => {
                    if first_error.is_none() {
                        tracing::error!(process = %name, error = %format!("{:#}", err), "app process error");
                        first_error = Some(err.context(format!("process '{}' failed", name)));
                    } else {
                        tracing::warn!(process = %name, error = %err, "app process error after shutdown began");
                    }
                    token.cancel();
                }
                Err(err) => {
                    tracing::error!(error = %err, "app process panicked");
                    if first_error.is_none() {
                        first_error = Some(anyhow::anyhow!("app process panicked: {}", err));
                    }
                    token.cancel();
                }
            }
        }

        for handle in signal_handles {
            handle.abort();
        }

        if !closers.is_empty() {
            tracing::info!(timeout = ?closer_timeout, "running closers");

            match tokio::time::timeout(closer_timeout, Self::run_closers(closers)).await {
                Ok(()) => tracing::info!("all closers completed"),
                Err(_) => tracing::error!(timeout = ?closer_timeout, "closers timed out"),
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn spawn_signal_handlers(token: &CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        let signal_token = token.clone();
        handles.push(tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received shutdown signal");
                    signal_token.cancel();
                }
                Err(err) => {
                    tracing::error!(error = %err, "error setting up signal handler");
                }
            }
        }));

        #[cfg(unix)]
        {
            let sigterm_token = token.clone();
            handles.push(tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                        tracing::info!("Received SIGTERM signal");
                        sigterm_token.cancel();
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "error setting up SIGTERM handler");
                    }
                }
            }));
        }

        handles
    }

    /// Runs closers sequentially, last registered first.
    async fn run_closers(closers: Vec<(String, Closer)>) {
        for (name, closer) in closers.into_iter().rev() {
            match closer().await {
                Ok(()) => tracing::debug!(closer = %name, "closer completed"),
                Err(err) => tracing::error!(closer = %name, error = %format!("{:#}", err), "closer error"),
            }
        }
    }
}
