//! Subprocess execution with streamed output.

use std::process::Stdio;
use tinyci_core::LineSender;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::SplitStream;
use tracing::{debug, warn};

/// Run `command` to completion, forwarding every line it prints on stdout or
/// stderr to `lines` as soon as it is read.
///
/// Returns `true` iff the process exits with status zero. A process that
/// cannot be spawned, or whose output cannot be read, counts as a failure and
/// produces one `ERROR:` line describing the cause.
pub async fn run_process(mut command: Command, lines: &LineSender) -> bool {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program = %program, "Spawning process");
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            report_failure(lines, &program, &e).await;
            return false;
        }
    };

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        report_failure(lines, &program, &"output pipes unavailable").await;
        let _ = child.kill().await;
        return false;
    };

    let stdout = SplitStream::new(BufReader::new(stdout).split(b'\n'));
    let stderr = SplitStream::new(BufReader::new(stderr).split(b'\n'));
    let mut merged = stdout.merge(stderr);

    while let Some(chunk) = merged.next().await {
        match chunk {
            Ok(bytes) => {
                // A closed receiver must not stall the child on a full pipe,
                // so keep draining even if nobody listens.
                let _ = lines.send(decode_line(&bytes)).await;
            }
            Err(e) => {
                report_failure(lines, &program, &e).await;
                let _ = child.kill().await;
                return false;
            }
        }
    }

    match child.wait().await {
        Ok(status) => {
            debug!(program = %program, status = %status, "Process exited");
            status.success()
        }
        Err(e) => {
            report_failure(lines, &program, &e).await;
            false
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

async fn report_failure(lines: &LineSender, program: &str, error: &(dyn std::fmt::Display + Sync)) {
    warn!(program = %program, error = %error, "Process execution failed");
    let _ = lines
        .send(format!("ERROR: Execution of {} failed: {}", program, error))
        .await;
}
