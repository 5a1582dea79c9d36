//! Runs the external configuration-apply command

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, SyncError};

/// Runs `program args...` with `input` on stdin and returns its stdout.
///
/// A process that cannot be started is a transport error; a non-zero exit
/// is a backend error carrying the exit code and captured stderr.
pub async fn run_with_input(program: &str, args: &[String], input: &str) -> Result<String> {
    debug!("Invoking {} {}", program, args.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SyncError::Transport(format!("failed to start {}: {}", program, e)))?;

    // stdin is fed while the output pipes drain, so a chatty command
    // cannot stall on a full pipe
    let stdin = child.stdin.take();
    let feed = async move {
        let Some(mut stdin) = stdin else {
            return Ok(());
        };
        // a command may exit without reading its input; the exit code decides
        match stdin.write_all(input.as_bytes()).await {
            Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
            _ => Ok(()),
        }
    };
    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    let output = output?;
    fed?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        Err(SyncError::Backend(format!(
            "{} exited with code {}:\n{}",
            program,
            code,
            String::from_utf8_lossy(&output.stderr)
        )))
    }
}
