//! Common utilities for integration tests
//!
//! This module provides cleanup guards and helper functions for integration tests.

use anyhow::Result;
use std::process::Command;
use std::thread;
use std::time::Duration;

/// Guard that ensures Docker container cleanup on drop (even on panic)
pub struct ContainerGuard {
    name: String,
}

impl ContainerGuard {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        cleanup_container(&self.name);
    }
}

/// Stop and remove a container with its anonymous volumes
pub fn cleanup_container(name: &str) {
    let _ = Command::new("docker").args(["stop", name]).output();
    let _ = Command::new("docker").args(["rm", "-v", name]).output();
}

/// Helper to check if Docker is available
pub fn is_docker_available() -> bool {
    Command::new("docker")
        .args(["ps"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Start a detached container with the given environment
pub fn start_container(name: &str, image: &str, env: &[&str]) -> Result<()> {
    cleanup_container(name);

    let mut args = vec!["run", "-d", "--name", name];
    for var in env {
        args.push("-e");
        args.push(var);
    }
    args.push(image);

    let output = Command::new("docker").args(&args).output()?;
    if !output.status.success() {
        anyhow::bail!(
            "Failed to start {}: {}",
            image,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

/// Poll `docker exec <name> <check...>` until it succeeds
pub fn wait_until_ready(name: &str, check: &[&str], attempts: u32) -> Result<()> {
    for _ in 0..attempts {
        let mut args = vec!["exec", name];
        args.extend_from_slice(check);

        let ready = Command::new("docker")
            .args(&args)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if ready {
            return Ok(());
        }
        thread::sleep(Duration::from_secs(1));
    }

    anyhow::bail!("Container {} did not become ready", name)
}

/// Run a command inside a container and return stdout
pub fn docker_exec(name: &str, command: &[&str]) -> Result<String> {
    let mut args = vec!["exec", name];
    args.extend_from_slice(command);

    let output = Command::new("docker").args(&args).output()?;
    if !output.status.success() {
        anyhow::bail!("{}", String::from_utf8_lossy(&output.stderr));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
