use std::process::Stdio;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Runs an external command with a hard deadline, returning its merged
/// stdout and stderr. The child is killed if the deadline passes or the
/// caller drops the future early.
pub async fn run_command(limit: Duration, program: &str, args: &[&str]) -> Result<String> {
    debug!("running command: {} {:?}", program, args);

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => return Err(anyhow!("command timed out after {:?}", limit)),
    };

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(anyhow!(
            "{} exited with {}: {}",
            program,
            output.status,
            text.trim()
        ));
    }

    Ok(text)
}
