//! External command execution
//!
//! Every command is described by a [`CommandSpec`] and executed through a
//! [`CommandRunner`], which always hands back a [`CommandOutput`]. Callers
//! decide what a non-zero status means; [`CommandRunner::run_checked`] turns
//! it into an error naming the step.

use anyhow::{Context, Result, bail};
use std::process::{Command, Output, Stdio};

/// What happens to the child's stdout/stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Captured, shown only when the step fails
    Suppressed,
    /// Streamed to the terminal as it happens
    Surfaced,
}

/// A command to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Prefixed with `sudo`
    pub privileged: bool,
    pub output: OutputMode,
    /// Arguments are hidden from logs and error messages
    pub sensitive: bool,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            privileged: false,
            output: OutputMode::Suppressed,
            sensitive: false,
        }
    }

    /// `bash -c <script>`, so `source` and `&&` work
    pub fn shell(script: &str) -> Self {
        Self::new("bash", ["-c", script])
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    pub fn surfaced(mut self) -> Self {
        self.output = OutputMode::Surfaced;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Program and arguments as actually executed
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        if self.privileged {
            argv.push("sudo".to_string());
        }
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Printable command line, with arguments masked when sensitive
    pub fn display(&self) -> String {
        if self.sensitive {
            let mut shown = self.argv();
            let keep = usize::from(self.privileged) + 1;
            shown.truncate(keep);
            shown.push("<redacted>".to_string());
            return shown.join(" ");
        }
        self.argv()
            .iter()
            .map(|arg| {
                if arg.is_empty() || arg.contains(char::is_whitespace) {
                    format!("'{arg}'")
                } else {
                    arg.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (`None` when killed by a signal)
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run with the given stdout
    pub fn ok(stdout: &str) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    /// A failed run with the given exit code and stderr
    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Error out unless the command succeeded
    pub fn ensure_success(&self, step: &str) -> Result<&Self> {
        if self.success() {
            return Ok(self);
        }

        let status = match self.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };
        let detail = [self.stderr.trim(), self.stdout.trim()]
            .into_iter()
            .find(|s| !s.is_empty());
        match detail {
            Some(detail) => bail!("{step} failed ({status}): {detail}"),
            None => bail!("{step} failed ({status})"),
        }
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

/// Executes commands
pub trait CommandRunner {
    /// Run `spec` and return its output, whatever the exit status
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Run `spec` and fail unless it exits with status zero
    fn run_checked(&self, step: &str, spec: &CommandSpec) -> Result<CommandOutput> {
        let output = self.run(spec)?;
        output.ensure_success(step)?;
        Ok(output)
    }
}

/// Runs commands on this machine
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        log::debug!("$ {}", spec.display());

        let argv = spec.argv();
        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);

        let output: CommandOutput = match spec.output {
            OutputMode::Suppressed => command
                .stdin(Stdio::inherit())
                .output()
                .with_context(|| format!("Failed to execute: {}", spec.display()))?
                .into(),
            OutputMode::Surfaced => {
                let status = command
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit())
                    .status()
                    .with_context(|| format!("Failed to execute: {}", spec.display()))?;
                CommandOutput {
                    code: status.code(),
                    ..CommandOutput::default()
                }
            }
        };

        log::trace!(
            "exit={:?} stdout={:?} stderr={:?}",
            output.code,
            output.stdout,
            output.stderr
        );
        Ok(output)
    }
}

/// Prints commands instead of running them
#[derive(Debug, Default)]
pub struct DryRunRunner;

impl CommandRunner for DryRunRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        crate::ui::dim(&format!("[dry-run] {}", spec.display()));
        Ok(CommandOutput::ok(""))
    }
}

#[cfg(test)]
pub mod testing {
    //! Test doubles shared by command tests

    use super::{CommandOutput, CommandRunner, CommandSpec};
    use anyhow::Result;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Records every command; replies from a queue of canned outputs keyed by
    /// a substring of the command line, defaulting to success
    #[derive(Default)]
    pub struct RecordingRunner {
        pub calls: RefCell<Vec<CommandSpec>>,
        replies: RefCell<VecDeque<(String, CommandOutput)>>,
    }

    impl RecordingRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Reply with `output` to the first command whose line contains `pattern`
        pub fn reply(self, pattern: &str, output: CommandOutput) -> Self {
            self.replies
                .borrow_mut()
                .push_back((pattern.to_string(), output));
            self
        }

        /// Command lines in order
        pub fn lines(&self) -> Vec<String> {
            self.calls
                .borrow()
                .iter()
                .map(|spec| spec.argv().join(" "))
                .collect()
        }

        /// Command lines, skipping `sudo -v` / `sudo -k`
        pub fn work(&self) -> Vec<String> {
            self.lines()
                .into_iter()
                .filter(|line| line != "sudo -v" && line != "sudo -k")
                .collect()
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            self.calls.borrow_mut().push(spec.clone());
            let line = spec.argv().join(" ");
            let mut replies = self.replies.borrow_mut();
            if let Some(pos) = replies.iter().position(|(p, _)| line.contains(p.as_str())) {
                if let Some((_, output)) = replies.remove(pos) {
                    return Ok(output);
                }
            }
            Ok(CommandOutput::ok(""))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingRunner;
    use super::*;

    #[test]
    fn test_argv_adds_sudo_when_privileged() {
        let spec = CommandSpec::new("service", ["postgresql", "restart"]).privileged();
        assert_eq!(spec.argv(), vec!["sudo", "service", "postgresql", "restart"]);
        assert_eq!(spec.display(), "sudo service postgresql restart");
    }

    #[test]
    fn test_display_quotes_arguments_with_spaces() {
        let spec = CommandSpec::shell("source venv/bin/activate && migrate");
        assert_eq!(spec.display(), "bash -c 'source venv/bin/activate && migrate'");
    }

    #[test]
    fn test_display_redacts_sensitive_arguments() {
        let spec = CommandSpec::new("psql", ["-c", "ALTER USER postgres PASSWORD 'hunter2'"])
            .sensitive();
        assert_eq!(spec.display(), "psql <redacted>");
        assert!(!spec.display().contains("hunter2"));
    }

    #[test]
    fn test_ensure_success_names_step_and_stderr() {
        let output = CommandOutput::failed(1, "dropdb: error: database is being accessed\n");
        let err = output.ensure_success("drop database").unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("drop database failed (exit code 1)"));
        assert!(msg.contains("being accessed"));
    }

    #[test]
    fn test_ensure_success_falls_back_to_stdout() {
        let output = CommandOutput {
            code: Some(2),
            stdout: "ERROR: syntax error".to_string(),
            stderr: String::new(),
        };
        let msg = output.ensure_success("seed").unwrap_err().to_string();
        assert!(msg.contains("syntax error"));
    }

    #[test]
    fn test_signal_termination_is_failure() {
        let output = CommandOutput::default();
        assert!(!output.success());
        let msg = output.ensure_success("restart").unwrap_err().to_string();
        assert!(msg.contains("terminated by signal"));
    }

    #[test]
    fn test_run_checked_uses_reply() {
        let runner = RecordingRunner::new().reply("dropdb", CommandOutput::failed(1, "boom"));
        let ok = runner.run_checked("list", &CommandSpec::new("psql", ["-lqt"]));
        assert!(ok.is_ok());
        let err = runner.run_checked("drop", &CommandSpec::new("dropdb", ["x"]));
        assert!(err.is_err());
        assert_eq!(runner.lines(), vec!["psql -lqt", "dropdb x"]);
    }

    #[test]
    fn test_system_runner_reports_exit_code() {
        let runner = SystemRunner;
        let out = runner.run(&CommandSpec::shell("echo out; echo err >&2; exit 3")).unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }
}
