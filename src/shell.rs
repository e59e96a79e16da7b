//! Synchronous execution of external commands, optionally with privilege
//! elevation.
//!
//! Root-owned control files are reached by funneling the read or write
//! through a superuser escalation front-end, see [`Elevation`]. One
//! [`Shell`] instance is shared by every [`FileClient`] in the process,
//! passed in at construction.
//!
//! # Implementation details
//!
//! Commands are interpreted by `sh -c`, so pipes and `&&` chains work.
//! Calls are serialized internally; concurrent callers never observe each
//! other's output.
//!
//! [`FileClient`]: crate::client::FileClient
use std::{
    io::{self, Write},
    process::{Command, Stdio},
    sync::{
        mpsc::{self, RecvTimeoutError},
        Mutex,
    },
    thread,
    time::Duration,
};

use nix::{
    sys::signal::{kill, Signal},
    unistd::Pid,
};

use crate::error::ShellError;

pub type Result<T, E = ShellError> = std::result::Result<T, E>;

/// Privilege escalation front-end used for elevated commands.
#[derive(Debug, Clone)]
pub enum Elevation {
    /// `sudo`
    Sudo,

    /// `pkexec`
    Pkexec,

    /// Any other front-end: the program plus its leading arguments, with
    /// `sh -c <command>` appended.
    Custom {
        program: String,
        args: Vec<String>,
    },
}

impl Elevation {
    /// Build the full elevated command line.
    fn wrap(&self, command: &str) -> Command {
        let (program, args): (&str, &[String]) = match self {
            Elevation::Sudo => ("sudo", &[]),
            Elevation::Pkexec => ("pkexec", &[]),
            Elevation::Custom { program, args } => (program.as_str(), args.as_slice()),
        };
        let mut cmd = Command::new(program);
        cmd.args(args).arg("sh").arg("-c").arg(command);
        cmd
    }
}

/// Captured output of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,

    /// Exit status of the child, or `-1` if it was killed by a signal.
    pub status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs external commands, optionally wrapped with a privilege escalation
/// front-end.
///
/// A non-zero exit is reported as data in [`CommandOutput`], not as an
/// error; [`ShellError`] is reserved for failing to run the child at all,
/// or for exceeding the configured timeout.
#[derive(Debug)]
pub struct Shell {
    elevation: Elevation,
    timeout: Option<Duration>,

    /// Serializes `run` calls.
    serial: Mutex<()>,

    /// Pid of the in-flight child, if any. Target of [`Shell::abort`].
    current: Mutex<Option<Pid>>,
}

impl Shell {
    pub fn new() -> Self {
        Self::with_elevation(Elevation::Sudo)
    }

    pub fn with_elevation(elevation: Elevation) -> Self {
        Self {
            elevation,
            timeout: None,
            serial: Mutex::new(()),
            current: Mutex::new(None),
        }
    }

    /// Limit how long a single command may run.
    ///
    /// Without this, a stuck child or an interactive credential prompt
    /// blocks [`Shell::run`] indefinitely.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run `command` and wait for it to finish.
    pub fn run(&self, command: &str, elevated: bool) -> Result<CommandOutput> {
        self.run_with_input(command, elevated, None)
    }

    /// Like [`Shell::run`], with `input` piped to the child's stdin.
    pub fn run_with_input(
        &self,
        command: &str,
        elevated: bool,
        input: Option<&str>,
    ) -> Result<CommandOutput> {
        let _serial = self.serial.lock().unwrap_or_else(|e| e.into_inner());

        let mut cmd = if elevated {
            self.elevation.wrap(command)
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        };
        cmd.stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        if let Some(input) = input {
            // Dropping the handle closes the child's stdin. A child that
            // exits without draining it breaks the pipe; its exit status
            // carries the real failure, so don't report the EPIPE.
            let mut stdin = child.stdin.take().expect("stdin was piped");
            if let Err(e) = stdin.write_all(input.as_bytes()) {
                if e.kind() != io::ErrorKind::BrokenPipe {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(e.into());
                }
            }
        }

        let pid = Pid::from_raw(child.id() as i32);
        self.set_current(Some(pid));

        // `wait_with_output` consumes the child, so reap on a helper thread
        // and bound the wait here.
        let (tx, rx) = mpsc::channel();
        let reaper = thread::spawn(move || {
            let _ = tx.send(child.wait_with_output());
        });

        let output = match self.timeout {
            Some(limit) => match rx.recv_timeout(limit) {
                Ok(output) => output,
                Err(RecvTimeoutError::Timeout) => {
                    let _ = kill(pid, Signal::SIGKILL);
                    // Still reap it, no zombie outlives the call.
                    let _ = rx.recv();
                    let _ = reaper.join();
                    self.set_current(None);
                    return Err(ShellError::Timeout(limit));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    unreachable!("reaper always sends before exiting")
                }
            },
            None => rx.recv().expect("reaper always sends before exiting"),
        };
        let _ = reaper.join();
        self.set_current(None);

        let output = output?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code().unwrap_or(-1),
        })
    }

    /// Kill the child of the in-flight [`Shell::run`], if there is one.
    ///
    /// The blocked `run` call observes the killed exit status and returns
    /// normally; callers waiting on the serialization lock are unaffected.
    pub fn abort(&self) {
        if let Some(pid) = *self.current.lock().unwrap_or_else(|e| e.into_inner()) {
            let _ = kill(pid, Signal::SIGKILL);
        }
    }

    fn set_current(&self, pid: Option<Pid>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = pid;
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

/// Quote `s` for inclusion in a `sh -c` command line.
pub(crate) fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
