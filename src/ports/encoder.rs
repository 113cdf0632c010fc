use crate::domain::asset::AssetId;
use crate::domain::plan::EncodePlan;
use crate::error::StreamError;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// How an encoder process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeOutcome {
    Success,
    /// Nonzero exit; `None` when killed by a signal
    Failed(Option<i32>),
    Cancelled,
    /// The supervisor stopped reporting without an exit status
    Lost,
}

impl fmt::Display for EncodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeOutcome::Success => write!(f, "exited successfully"),
            EncodeOutcome::Failed(Some(code)) => write!(f, "exit code {}", code),
            EncodeOutcome::Failed(None) => write!(f, "terminated by signal"),
            EncodeOutcome::Cancelled => write!(f, "cancelled"),
            EncodeOutcome::Lost => write!(f, "supervisor lost"),
        }
    }
}

/// Everything needed to start one encoder process.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub asset_id: AssetId,
    pub plan: EncodePlan,
    pub output_dir: PathBuf,
    /// Cancelling this terminates the process.
    pub cancel: CancellationToken,
}

/// Observer side of a running encoder.
#[derive(Debug, Clone)]
pub struct EncodeHandle {
    pid: Option<u32>,
    outcome: watch::Receiver<Option<EncodeOutcome>>,
}

/// Writer side, held by whoever supervises the process.
#[derive(Debug)]
pub struct ExitReporter(watch::Sender<Option<EncodeOutcome>>);

impl ExitReporter {
    pub fn report(self, outcome: EncodeOutcome) {
        self.0.send_replace(Some(outcome));
    }
}

impl EncodeHandle {
    pub fn new(pid: Option<u32>) -> (ExitReporter, EncodeHandle) {
        let (tx, rx) = watch::channel(None);
        (ExitReporter(tx), EncodeHandle { pid, outcome: rx })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_running(&self) -> bool {
        // A dropped reporter means nobody is supervising anymore.
        self.outcome.borrow().is_none() && self.outcome.has_changed().is_ok()
    }

    pub fn outcome(&self) -> Option<EncodeOutcome> {
        self.outcome.borrow().clone()
    }

    /// Resolves once the process has ended.
    pub async fn wait(&self) -> EncodeOutcome {
        let mut rx = self.outcome.clone();
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone().unwrap_or(EncodeOutcome::Lost);
            }
        }
    }
}

/// Starts encoder processes without waiting for them to finish.
#[cfg_attr(test, mockall::automock)]
pub trait EncodeLauncher: Send + Sync {
    fn launch(&self, request: LaunchRequest) -> Result<EncodeHandle, StreamError>;
}
