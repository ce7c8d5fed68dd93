//! Utilities for running commands with proper error handling and timeouts

use anyhow::{Context, Result};
use std::fs::File;
use std::process::{Command, Output, Stdio};
use std::time::Duration;
use tracing::{debug, error};

/// Run a command with optional timeout
pub fn run_command(
    program: &str,
    args: &[&str],
    envs: &[(&str, &str)],
    timeout: Option<Duration>,
) -> Result<Output> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.envs(envs.iter().copied());
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    debug!("Running command: {} {}", program, args.join(" "));

    let output = wait_with_timeout(cmd, program, timeout)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("Command failed: {} {}", program, args.join(" "));
        error!("Stderr: {}", stderr.trim());
        anyhow::bail!(
            "Command failed with exit code {:?}: {}",
            output.status.code(),
            stderr.trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.is_empty() {
        debug!("Command output: {}", stdout.trim());
    }

    Ok(output)
}

/// Run a command and return stdout as string
pub fn run_command_stdout(
    program: &str,
    args: &[&str],
    envs: &[(&str, &str)],
    timeout: Option<Duration>,
) -> Result<String> {
    let output = run_command(program, args, envs, timeout)?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Run a command with stdout redirected into `sink`.
///
/// The caller owns the file; on failure it is left for the caller to remove.
pub fn run_command_to_file(
    program: &str,
    args: &[&str],
    envs: &[(&str, &str)],
    sink: File,
    timeout: Option<Duration>,
) -> Result<()> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.envs(envs.iter().copied());
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::from(sink));
    cmd.stderr(Stdio::piped());

    debug!("Running command to file: {} {}", program, args.join(" "));

    let output = wait_with_timeout(cmd, program, timeout)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("Command failed: {} {}", program, args.join(" "));
        error!("Stderr: {}", stderr.trim());
        anyhow::bail!(
            "Command failed with exit code {:?}: {}",
            output.status.code(),
            stderr.trim()
        );
    }

    Ok(())
}

/// Spawn `cmd` with the stdio it was configured with and wait for it.
///
/// `output()` would replace stdout with a pipe and lose a file sink, so the
/// child is spawned and then awaited.
fn wait_with_timeout(mut cmd: Command, program: &str, timeout: Option<Duration>) -> Result<Output> {
    let Some(timeout_duration) = timeout else {
        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to execute {}", program))?;
        return child
            .wait_with_output()
            .with_context(|| format!("Failed to wait for {}", program));
    };

    // Current-thread runtime so callers need not live inside one
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start timeout runtime")?;

    runtime.block_on(async {
        let mut cmd = tokio::process::Command::from(cmd);
        cmd.kill_on_drop(true);
        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to execute {}", program))?;

        // On timeout the child is dropped, which kills it
        match tokio::time::timeout(timeout_duration, child.wait_with_output()).await {
            Ok(output) => output.with_context(|| format!("Failed to wait for {}", program)),
            Err(_) => Err(anyhow::anyhow!(
                "{} timed out after {:?}",
                program,
                timeout_duration
            )),
        }
    })
}
