//! Process execution with a hard deadline.
//!
//! Children are polled with `try_wait` until they exit or the deadline
//! passes, at which point their whole process group is killed and reaped.
//! Output pipes are drained on separate threads so a chatty child cannot
//! block on a full pipe; collecting that output shares the same deadline.
//!
//! Each child leads its own process group, so a Ctrl-C at the terminal
//! reaches nodeprep but not the command in flight.

use converge::{CommandOutput, HostError, ProcessExecutor, host::command_line};
use std::io::{self, Read, Write};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

const POLL_START: Duration = Duration::from_millis(5);
const POLL_MAX: Duration = Duration::from_millis(100);

/// Runs real processes on the local host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run a program feeding `input` on stdin.
    ///
    /// Used for commands that take secrets, so they never appear in an
    /// argument list.
    pub fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        input: &[u8],
        timeout: Duration,
    ) -> Result<CommandOutput, HostError> {
        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::piped());
        let mut child = spawn(&mut command, program)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input)
                .map_err(|e| HostError::io(Path::new(program), e))?;
        }

        wait(child, &command_line(program, args), timeout)
    }
}

impl ProcessExecutor for SystemExecutor {
    fn run_in(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<CommandOutput, HostError> {
        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null());
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let rendered = match (program, args) {
            ("sh", ["-c", script]) => (*script).to_string(),
            _ => command_line(program, args),
        };
        log::debug!("running `{rendered}` (timeout {}s)", timeout.as_secs());

        let child = spawn(&mut command, program)?;
        wait(child, &rendered, timeout)
    }
}

fn spawn(command: &mut Command, program: &str) -> Result<Child, HostError> {
    command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => HostError::NotFound {
                what: format!("program {program}"),
            },
            _ => HostError::io(Path::new(program), e),
        })
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>, stream: Stream, tx: Sender<(Stream, Vec<u8>)>) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send((stream, buf));
    });
}

/// SIGKILL the child's process group, then reap the child
fn kill_group(child: &mut Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        #[allow(unsafe_code)]
        // SAFETY: killpg has no memory-safety preconditions
        let _ = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn timed_out(rendered: &str, timeout: Duration) -> HostError {
    HostError::Timeout {
        command: rendered.to_string(),
        after: timeout,
    }
}

/// Wait for `child` and its output until `timeout`; kill its group when the deadline passes
fn wait(mut child: Child, rendered: &str, timeout: Duration) -> Result<CommandOutput, HostError> {
    let (tx, rx) = mpsc::channel();
    drain(child.stdout.take(), Stream::Stdout, tx.clone());
    drain(child.stderr.take(), Stream::Stderr, tx);

    let deadline = Instant::now() + timeout;
    let mut poll = POLL_START;
    let status: ExitStatus = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                log::warn!("`{rendered}` exceeded {}s, killing it", timeout.as_secs());
                kill_group(&mut child);
                return Err(timed_out(rendered, timeout));
            }
            Ok(None) => {
                thread::sleep(poll.min(deadline.saturating_duration_since(Instant::now())));
                poll = (poll * 2).min(POLL_MAX);
            }
            Err(e) => return Err(HostError::Other(format!("waiting for `{rendered}`: {e}"))),
        }
    };

    // A background process can keep the pipes open after the child exits
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    for _ in 0..2 {
        match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok((Stream::Stdout, buf)) => stdout = buf,
            Ok((Stream::Stderr, buf)) => stderr = buf,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("`{rendered}` left a process holding its output past {}s, killing it", timeout.as_secs());
                kill_group(&mut child);
                return Err(timed_out(rendered, timeout));
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(CommandOutput {
        code: status.code(),
        stdout,
        stderr,
        success: status.success(),
    })
}
