//! Bounded one-shot child execution.
//!
//! Both the reasoner and the oneshot adapter transport hand a child one
//! payload on stdin and collect everything it prints. The child is
//! untrusted: output is capped, the wait is bounded, and an overrun kills
//! the process instead of hanging the run.

use std::io::{self, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Outcome of one bounded child invocation.
#[derive(Debug)]
pub struct ChildRun {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// True when either stream overflowed the cap and bytes were dropped.
    pub truncated: bool,
    pub timed_out: bool,
}

/// Feed `input` to a freshly spawned child and collect its capped output
/// within `timeout`.
///
/// stdin is written from a helper thread and both output pipes are drained
/// concurrently, so a child that exits early, never reads, or floods a pipe
/// cannot deadlock the caller.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_cap))]
pub fn feed_and_collect(
    mut cmd: Command,
    input: Vec<u8>,
    timeout: Duration,
    output_cap: usize,
) -> Result<ChildRun> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().context("spawn child")?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin not piped"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr not piped"))?;

    // A write failure here means the child stopped reading; its exit status
    // already tells that story, so the error is dropped.
    let writer = thread::spawn(move || {
        let mut stdin = stdin;
        let _ = stdin.write_all(&input);
    });
    let out_reader = thread::spawn(move || drain_capped(stdout, output_cap));
    let err_reader = thread::spawn(move || drain_capped(stderr, output_cap));

    let (status, timed_out) = match child.wait_timeout(timeout).context("wait for child")? {
        Some(status) => (status, false),
        None => {
            warn!(timeout_secs = timeout.as_secs(), "child timed out, killing");
            child.kill().context("kill child")?;
            (child.wait().context("reap child after kill")?, true)
        }
    };
    writer
        .join()
        .map_err(|_| anyhow!("stdin writer panicked"))?;

    let (stdout, out_dropped) = join_reader(out_reader).context("collect stdout")?;
    let (stderr, err_dropped) = join_reader(err_reader).context("collect stderr")?;
    let truncated = out_dropped || err_dropped;
    if truncated {
        warn!(output_cap, "child output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "child finished");
    Ok(ChildRun {
        status,
        stdout,
        stderr,
        truncated,
        timed_out,
    })
}

fn join_reader(
    handle: thread::JoinHandle<io::Result<(Vec<u8>, bool)>>,
) -> Result<(Vec<u8>, bool)> {
    handle
        .join()
        .map_err(|_| anyhow!("reader thread panicked"))?
        .context("read child output")
}

/// Keep at most `cap` bytes, then drain the rest so the child never blocks
/// on a full pipe.
fn drain_capped<R: Read>(mut reader: R, cap: usize) -> io::Result<(Vec<u8>, bool)> {
    let mut kept = Vec::new();
    (&mut reader).take(cap as u64).read_to_end(&mut kept)?;
    let dropped = io::copy(&mut reader, &mut io::sink())?;
    Ok((kept, dropped > 0))
}
