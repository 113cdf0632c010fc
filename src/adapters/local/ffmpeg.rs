//! Runs encode plans through the ffmpeg command line tool.

use crate::domain::asset::AssetId;
use crate::error::StreamError;
use crate::ports::encoder::{EncodeHandle, EncodeLauncher, EncodeOutcome, ExitReporter, LaunchRequest};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Spawns one ffmpeg process per launch and supervises it on a background task.
#[derive(Debug, Clone)]
pub struct FfmpegSupervisor {
    program: String,
}

impl FfmpegSupervisor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegSupervisor {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl EncodeLauncher for FfmpegSupervisor {
    fn launch(&self, request: LaunchRequest) -> Result<EncodeHandle, StreamError> {
        let mut command = Command::new(&self.program);
        command
            .arg("-hide_banner")
            .arg("-nostdin")
            .arg("-y")
            .args(&request.plan.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| StreamError::spawn(self.program.clone(), e))?;

        let pid = child.id();
        tracing::info!(
            asset_id = request.asset_id,
            pid = ?pid,
            program = %self.program,
            output_dir = %request.output_dir.display(),
            "Encoder started"
        );

        let (reporter, handle) = EncodeHandle::new(pid);
        tokio::spawn(supervise(request.asset_id, child, request.cancel, reporter));
        Ok(handle)
    }
}

async fn supervise(
    asset_id: AssetId,
    mut child: Child,
    cancel: CancellationToken,
    reporter: ExitReporter,
) {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let logs = async {
        futures::join!(forward_lines(asset_id, stdout), forward_lines(asset_id, stderr));
    };

    let waited = async {
        tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(asset_id, error = %e, "Failed to kill encoder");
                }
                None
            }
        }
    };

    let (status, _) = tokio::join!(waited, logs);
    let outcome = match status {
        Some(Ok(status)) => outcome_of(status),
        Some(Err(e)) => {
            tracing::warn!(asset_id, error = %e, "Lost track of encoder");
            EncodeOutcome::Lost
        }
        None => EncodeOutcome::Cancelled,
    };

    match &outcome {
        EncodeOutcome::Success | EncodeOutcome::Cancelled => {
            tracing::info!(asset_id, %outcome, "Encoder finished")
        }
        _ => tracing::warn!(asset_id, %outcome, "Encoder failed"),
    }
    reporter.report(outcome);
}

fn outcome_of(status: ExitStatus) -> EncodeOutcome {
    if status.success() {
        EncodeOutcome::Success
    } else {
        EncodeOutcome::Failed(status.code())
    }
}

async fn forward_lines<R>(asset_id: AssetId, pipe: Option<R>)
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return;
    };
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.is_empty() {
            tracing::debug!(target: "ffmpeg", asset_id, "{}", line);
        }
    }
}
