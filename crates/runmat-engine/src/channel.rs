//! Byte transport between a session and its engine.
//!
//! A [`Channel`] moves protocol lines. [`ProcessChannel`] is the standard
//! implementation: the engine's stdin and stdout, with a reader thread so
//! that receives can time out.

use log::{debug, trace, warn};
use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::EngineConfig;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("engine closed the channel")]
    Closed,
    #[error("no reply from the engine within {0:?}")]
    TimedOut(Duration),
    #[error("channel I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A line-oriented, blocking, bidirectional link to an engine.
pub trait Channel: Send {
    /// Send one newline-terminated line.
    fn send(&mut self, line: &str) -> Result<(), ChannelError>;

    /// Wait for the next line; `None` waits indefinitely.
    fn recv(&mut self, timeout: Option<Duration>) -> Result<String, ChannelError>;

    /// Stop the engine: give it `grace` to exit on its own, then force it.
    /// Must be safe to call more than once.
    fn terminate(&mut self, grace: Duration);

    /// Human-readable description, e.g. the command line and pid.
    fn describe(&self) -> String;
}

/// Channel over the stdio pipes of a child process. Stderr is inherited.
pub struct ProcessChannel {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Receiver<io::Result<String>>,
    reader: Option<JoinHandle<()>>,
    description: String,
    finished: bool,
}

impl ProcessChannel {
    /// Start the configured engine executable.
    pub fn spawn(config: &EngineConfig) -> io::Result<Self> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }
        let mut child = command.spawn()?;
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "engine stdout unavailable"))?;

        let (tx, rx) = mpsc::channel();
        let pid = child.id();
        let reader = thread::Builder::new()
            .name(format!("runmat-engine-{pid}"))
            .spawn(move || {
                let mut stdout = BufReader::new(stdout);
                loop {
                    let mut line = String::new();
                    match stdout.read_line(&mut line) {
                        Ok(0) => break,
                        Ok(_) => {
                            if tx.send(Ok(line)).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e));
                            break;
                        }
                    }
                }
                trace!("engine {pid} stdout closed");
            })?;

        let description = format!("{} (pid {pid})", config.command.display());
        debug!("spawned engine {description}");
        Ok(Self {
            child,
            stdin,
            lines: rx,
            reader: Some(reader),
            description,
            finished: false,
        })
    }

    /// OS process id of the engine.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl Channel for ProcessChannel {
    fn send(&mut self, line: &str) -> Result<(), ChannelError> {
        let stdin = self.stdin.as_mut().ok_or(ChannelError::Closed)?;
        stdin.write_all(line.as_bytes())?;
        if !line.ends_with('\n') {
            stdin.write_all(b"\n")?;
        }
        stdin.flush()?;
        Ok(())
    }

    fn recv(&mut self, timeout: Option<Duration>) -> Result<String, ChannelError> {
        let next = match timeout {
            Some(limit) => self.lines.recv_timeout(limit).map_err(|e| match e {
                RecvTimeoutError::Timeout => ChannelError::TimedOut(limit),
                RecvTimeoutError::Disconnected => ChannelError::Closed,
            })?,
            None => self.lines.recv().map_err(|_| ChannelError::Closed)?,
        };
        Ok(next?)
    }

    fn terminate(&mut self, grace: Duration) {
        if self.finished {
            return;
        }
        self.finished = true;
        // Closing stdin lets a well-behaved engine see EOF and exit.
        drop(self.stdin.take());
        let deadline = Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!("engine {} exited with {status}", self.description);
                    break;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
                Ok(None) => {
                    warn!("engine {} did not exit; killing it", self.description);
                    let _ = self.child.kill();
                    let _ = self.child.wait();
                    break;
                }
                Err(e) => {
                    warn!("cannot wait for engine {}: {e}", self.description);
                    let _ = self.child.kill();
                    break;
                }
            }
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        self.terminate(Duration::ZERO);
    }
}
