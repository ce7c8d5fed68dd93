//! Command execution abstraction for testability
//!
//! The Docker and S3 adapters drive external CLIs through this trait so
//! their argument building and output parsing can be tested without the
//! real binaries.

use anyhow::Result;
use std::fs::File;
use std::process::Output;
use std::time::Duration;

/// Abstraction for command execution, enabling mocking in tests
pub trait CommandExecutor: Send + Sync {
    /// Run a command with optional timeout
    fn run_command(
        &self,
        program: &str,
        args: &[&str],
        envs: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<Output>;

    /// Run a command and return stdout as string
    fn run_command_stdout(
        &self,
        program: &str,
        args: &[&str],
        envs: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<String> {
        let output = self.run_command(program, args, envs, timeout)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a command with stdout written to `sink`
    fn run_command_to_file(
        &self,
        program: &str,
        args: &[&str],
        envs: &[(&str, &str)],
        sink: File,
        timeout: Option<Duration>,
    ) -> Result<()>;
}

/// Default implementation using real subprocess calls
#[derive(Debug, Clone, Default)]
pub struct RealExecutor;

impl RealExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for RealExecutor {
    fn run_command(
        &self,
        program: &str,
        args: &[&str],
        envs: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<Output> {
        super::command::run_command(program, args, envs, timeout)
    }

    fn run_command_to_file(
        &self,
        program: &str,
        args: &[&str],
        envs: &[(&str, &str)],
        sink: File,
        timeout: Option<Duration>,
    ) -> Result<()> {
        super::command::run_command_to_file(program, args, envs, sink, timeout)
    }
}

/// A mock executor for testing that records calls and returns configured responses
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    /// Recorded command invocation
    #[derive(Clone, Debug)]
    pub struct CommandCall {
        pub program: String,
        pub args: Vec<String>,
        pub env_keys: Vec<String>,
    }

    impl CommandCall {
        /// The first argument (the subcommand for docker/aws style CLIs)
        pub fn subcommand(&self) -> Option<&str> {
            self.args.first().map(String::as_str)
        }

        pub fn has_arg(&self, arg: &str) -> bool {
            self.args.iter().any(|a| a == arg)
        }
    }

    /// Response configuration for mock
    #[derive(Clone, Debug)]
    pub enum MockResponse {
        Success { stdout: String, stderr: String },
        Failure { stderr: String, exit_code: i32 },
        Timeout,
    }

    impl MockResponse {
        pub fn ok(stdout: &str) -> Self {
            MockResponse::Success {
                stdout: stdout.to_string(),
                stderr: String::new(),
            }
        }

        pub fn fail(stderr: &str) -> Self {
            MockResponse::Failure {
                stderr: stderr.to_string(),
                exit_code: 1,
            }
        }
    }

    impl Default for MockResponse {
        fn default() -> Self {
            MockResponse::ok("")
        }
    }

    /// Mock executor for testing.
    ///
    /// Responses are matched on `"<program> <first arg>"` first, then on the
    /// program name alone, then fall back to the default response.
    #[derive(Clone, Default)]
    pub struct MockExecutor {
        /// Recorded command invocations
        pub calls: Arc<Mutex<Vec<CommandCall>>>,
        responses: Arc<Mutex<HashMap<String, MockResponse>>>,
        default_response: Arc<Mutex<MockResponse>>,
    }

    impl MockExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Configure a response for a program, or `"program subcommand"`
        pub fn expect(self, matcher: &str, response: MockResponse) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(matcher.to_string(), response);
            self
        }

        /// Set the default response for unconfigured programs
        pub fn with_default_response(self, response: MockResponse) -> Self {
            *self.default_response.lock().unwrap() = response;
            self
        }

        /// Get all recorded calls
        pub fn get_calls(&self) -> Vec<CommandCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Check if a program was called
        pub fn was_called(&self, program: &str) -> bool {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .any(|c| c.program == program)
        }

        /// Get number of calls to a specific program
        pub fn call_count(&self, program: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.program == program)
                .count()
        }

        fn record_call(&self, program: &str, args: &[&str], envs: &[(&str, &str)]) {
            self.calls.lock().unwrap().push(CommandCall {
                program: program.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
                env_keys: envs.iter().map(|(k, _)| k.to_string()).collect(),
            });
        }

        fn get_response(&self, program: &str, args: &[&str]) -> MockResponse {
            let responses = self.responses.lock().unwrap();
            args.first()
                .and_then(|sub| responses.get(&format!("{} {}", program, sub)))
                .or_else(|| responses.get(program))
                .cloned()
                .unwrap_or_else(|| self.default_response.lock().unwrap().clone())
        }

        fn execute_response(&self, response: MockResponse) -> Result<Output> {
            match response {
                MockResponse::Success { stdout, stderr } => Ok(Output {
                    status: std::process::ExitStatus::default(),
                    stdout: stdout.into_bytes(),
                    stderr: stderr.into_bytes(),
                }),
                MockResponse::Failure { stderr, exit_code } => {
                    anyhow::bail!("Command failed with exit code {:?}: {}", exit_code, stderr)
                }
                MockResponse::Timeout => {
                    anyhow::bail!("Command timed out")
                }
            }
        }
    }

    impl CommandExecutor for MockExecutor {
        fn run_command(
            &self,
            program: &str,
            args: &[&str],
            envs: &[(&str, &str)],
            _timeout: Option<Duration>,
        ) -> Result<Output> {
            self.record_call(program, args, envs);
            let response = self.get_response(program, args);
            self.execute_response(response)
        }

        fn run_command_to_file(
            &self,
            program: &str,
            args: &[&str],
            envs: &[(&str, &str)],
            mut sink: File,
            timeout: Option<Duration>,
        ) -> Result<()> {
            let output = self.run_command(program, args, envs, timeout)?;
            sink.write_all(&output.stdout)?;
            Ok(())
        }
    }
}
