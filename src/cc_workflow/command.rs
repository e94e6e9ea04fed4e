use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use itertools::Itertools;
use log::{debug, info};

use crate::errors::WorkflowError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_TAIL_LINES: usize = 40;

/// One invocation of an external tool. Built up front so the exact
/// command line can be logged, shown in a dry run, or checked in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl ToolCommand {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        ToolCommand {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            envs: Vec::new(),
        }
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env<K: ToString, V: ToString>(mut self, key: K, value: V) -> Self {
        self.envs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arg_list(&self) -> &[OsString] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_ref().map(PathBuf::as_path)
    }

    /// Short name for messages: the program's file name.
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map_or_else(|| self.program.to_string_lossy(), |f| f.to_string_lossy())
            .to_string()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in self.envs.iter() {
            cmd.env(key, value);
        }
        cmd
    }

    fn spawn(&self, stdout: Stdio) -> Result<Child> {
        info!("running {}", self);
        self.command()
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                WorkflowError::ToolSpawn {
                    tool: self.tool_name(),
                    source: e,
                }
                .into()
            })
    }

    /// Runs to completion. A non-zero exit, or running past `timeout`,
    /// is an error carrying the tail of the tool's stderr.
    pub fn run(&self, timeout: Option<Duration>) -> Result<()> {
        let mut child = self.spawn(Stdio::inherit())?;
        let stderr = collect_stderr(&mut child);

        let status = match timeout {
            None => child.wait()?,
            Some(limit) => match wait_with_timeout(&mut child, limit)? {
                Some(status) => status,
                None => {
                    let _ = stderr.join();
                    return Err(WorkflowError::ToolTimeout {
                        tool: self.tool_name(),
                        hours: limit.as_secs_f64() / 3600.0,
                    }
                    .into());
                }
            },
        };

        self.finish(status, stderr)
    }

    /// Runs to completion, copying the tool's standard output into `out`.
    pub fn run_to_writer<W: Write>(&self, out: &mut W) -> Result<u64> {
        let mut child = self.spawn(Stdio::piped())?;
        let stderr = collect_stderr(&mut child);

        let copied = match child.stdout.take() {
            Some(mut stdout) => io::copy(&mut stdout, out)?,
            None => 0,
        };
        let status = child.wait()?;

        self.finish(status, stderr)?;
        Ok(copied)
    }

    fn finish(&self, status: ExitStatus, stderr: thread::JoinHandle<Vec<u8>>) -> Result<()> {
        let stderr = stderr.join().unwrap_or_default();
        let stderr = String::from_utf8_lossy(&stderr);

        if status.success() {
            if !stderr.is_empty() {
                debug!("{} stderr:\n{}", self.tool_name(), stderr);
            }
            Ok(())
        } else {
            Err(WorkflowError::ToolFailed {
                tool: self.tool_name(),
                status: status.to_string(),
                stderr: stderr_tail(&stderr, STDERR_TAIL_LINES),
            }
            .into())
        }
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|w| shell_word(&w.to_string_lossy()))
            .join(" ");
        write!(f, "{}", words)
    }
}

fn shell_word(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

fn collect_stderr(child: &mut Child) -> thread::JoinHandle<Vec<u8>> {
    let stderr = child.stderr.take();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_end(&mut buf);
        }
        buf
    })
}

/// Waits for `child`, killing it once `limit` has elapsed. Returns
/// `None` when the child was killed.
fn wait_with_timeout(child: &mut Child, limit: Duration) -> Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= limit {
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn stderr_tail(stderr: &str, nlines: usize) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(nlines);
    lines[start..].join("\n")
}
