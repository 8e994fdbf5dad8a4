//! External command execution.
//!
//! Every backend talks to its VCS through this runner. Arguments are handed
//! to the child as separate argv entries, so paths containing spaces or shell
//! metacharacters never need quoting.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Errors returned by external command execution.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The executable could not be started at all.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The command ran but exited with a status the caller did not accept.
    #[error("{command} exited with status {code}: {stderr}")]
    NonZeroExit {
        command: String,
        code: i32,
        stderr: String,
    },
}

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub exit_code: i32,
}

impl ProcessOutput {
    /// Stdout decoded as UTF-8, replacing invalid sequences.
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Builder for a single external command invocation.
#[derive(Debug, Clone)]
pub struct Process {
    program: String,
    args: Vec<OsString>,
    envs: Vec<(String, String)>,
    current_dir: Option<PathBuf>,
    allowed_exit_codes: Vec<i32>,
    fail_on_error: bool,
}

impl Process {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
            allowed_exit_codes: vec![0],
            fail_on_error: true,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_os_string());
        }
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Accept additional exit codes as success (e.g. `diff` returning 1).
    pub fn allow_exit_codes(mut self, codes: &[i32]) -> Self {
        self.allowed_exit_codes.extend_from_slice(codes);
        self
    }

    /// Return the output for any exit status instead of failing.
    pub fn no_fail(mut self) -> Self {
        self.fail_on_error = false;
        self
    }

    /// Human readable rendering used in logs and errors.
    pub fn describe(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(&arg.to_string_lossy());
        }
        out
    }

    /// Run the command to completion, capturing stdout and stderr.
    pub fn run(&self) -> Result<ProcessOutput, ProcessError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        log::debug!(
            "running `{}` in {:?}",
            self.describe(),
            self.current_dir.as_deref().unwrap_or(Path::new("."))
        );

        let output = cmd.output().map_err(|source| ProcessError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Killed by a signal: no exit code, report as -1.
        let exit_code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if self.fail_on_error && !self.allowed_exit_codes.contains(&exit_code) {
            return Err(ProcessError::NonZeroExit {
                command: self.describe(),
                code: exit_code,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(ProcessOutput {
            stdout: output.stdout,
            stderr,
            exit_code,
        })
    }
}

/// Check whether an executable is runnable (`<program> --version`).
pub fn is_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
