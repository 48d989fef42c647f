//! Child-process supervisor (§4.4), grounded in the original
//! `AvTranscoder.cpp`: own the child's stdout as a pipe, expose
//! incremental reads, and guarantee the child is killed and reaped when
//! the supervisor is dropped.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use wkmp_common::{Error, Result};

/// Owns one spawned child and its stdout pipe. Single-writer per child;
/// the caller may run multiple supervisors concurrently, bounded by
/// configuration (`max_concurrent_transcodes`).
pub struct ChildProcess {
    child: Child,
    stdout: ChildStdout,
}

impl ChildProcess {
    /// Spawn `program` with `args`, stdin closed, stderr discarded (logs
    /// suppressed per §4.5), stdout piped.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| Error::Fatal(format!("failed to spawn {program}: {e}")))?;
        let stdout = child.stdout.take().ok_or_else(|| Error::Internal("child had no stdout pipe".into()))?;

        Ok(Self { child, stdout })
    }

    /// Read up to `buf.len()` bytes, returning `0` at end of stream.
    pub async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.stdout.read(buf).await?)
    }

    /// Non-blocking check: has the child already exited?
    pub fn finished(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        // `kill_on_drop` arranges for tokio to SIGKILL and reap the child
        // once this future's runtime drops it; start_kill makes that
        // immediate rather than waiting for the next poll.
        let _ = self.child.start_kill();
    }
}
