//! Worker Transport (C6a, spec §5/§9 "fork safety"): dispatches
//! `ParseTask`s to a fixed pool of out-of-process workers, each one a
//! freshly spawned copy of this same binary re-executed in `--worker`
//! mode, never a `fork()` of the (multithreaded) coordinator process.
//!
//! Wire format is length-prefixed `bincode` frames over the child's
//! stdin/stdout, following the teacher's own re-exec precedent in
//! `main.rs` for out-of-process helper modes.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};

use crate::error::{IndexError, IndexResult};
use crate::parsing::{worker::ParseWorker, ParseTask, ParsedBatch};

/// Flag passed to re-exec this binary as a worker process.
pub const WORKER_FLAG: &str = "--worker";

/// Writes `payload` as a 4-byte little-endian length prefix followed by
/// the bytes themselves.
pub fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> io::Result<()> {
    w.write_all(&(payload.len() as u32).to_le_bytes())?;
    w.write_all(payload)?;
    w.flush()
}

/// Reads one length-prefixed frame. Returns `Ok(None)` on a clean EOF
/// (the child closed its stdout), distinguishing a normal pool teardown
/// from a genuine crash.
pub fn read_frame<R: Read>(r: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match r.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(Some(buf))
}

/// Entry point for the child process: constructs one `ParseWorker` (and
/// with it, one `clang::Clang`/`clang::Index` per spec §4.6) and then
/// loops reading `ParseTask` frames from stdin, writing `ParsedBatch`
/// frames to stdout, until stdin is closed by the parent.
pub fn run_worker_loop() -> io::Result<()> {
    let worker = ParseWorker::new();
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut stdin_lock = stdin.lock();
    let mut stdout_lock = stdout.lock();

    loop {
        let frame = match read_frame(&mut stdin_lock)? {
            Some(f) => f,
            None => return Ok(()),
        };
        let task: ParseTask = bincode::deserialize(&frame)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let result: Result<ParsedBatch, String> = worker.parse(&task);
        let encoded = bincode::serialize(&result)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        write_frame(&mut stdout_lock, &encoded)?;
    }
}

/// One live child process plus its piped stdio handles.
struct WorkerProcess {
    child: Child,
    stdin: std::process::ChildStdin,
    stdout: std::process::ChildStdout,
}

impl WorkerProcess {
    fn spawn(binary: &std::path::Path) -> io::Result<Self> {
        let mut child = Command::new(binary)
            .arg(WORKER_FLAG)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        Ok(Self { child, stdin, stdout })
    }

    fn send(&mut self, task: &ParseTask) -> io::Result<Result<ParsedBatch, String>> {
        let encoded = bincode::serialize(task)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        write_frame(&mut self.stdin, &encoded)?;
        let frame = read_frame(&mut self.stdout)?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "worker closed stdout"))?;
        bincode::deserialize(&frame).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn kill(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Outcome of one dispatched task, as seen by the coordinator.
pub enum TaskOutcome {
    Parsed(ParsedBatch),
    /// The worker ran and reported a parse failure for this file
    /// specifically (spec §4.6/§7 `PARSE_FAILURE`) — not a crash.
    ParseFailed(String),
    /// The worker process itself died mid-task (spec §7 `WORKER_CRASHED`).
    Crashed,
}

/// A fixed-size, pre-spawned pool of worker processes (spec §5 "pool size
/// ≤ CPU count − 1, minimum 1; lifecycle = for the duration of one batch,
/// then torn down cleanly"). Dispatch uses a shared task queue so a slow
/// file never starves the rest of the batch behind it.
pub struct WorkerPool {
    binary: std::path::PathBuf,
    size: usize,
}

impl WorkerPool {
    pub fn new(binary: std::path::PathBuf, size: usize) -> Self {
        Self {
            binary,
            size: size.max(1),
        }
    }

    /// Runs every task in `tasks` across the pool and returns one outcome
    /// per task, in the same order. A worker that crashes mid-task is
    /// replaced before continuing to drain the queue; `cancelled` is
    /// polled between dispatches so a cooperative cancellation request
    /// stops issuing new work without disturbing tasks already applied.
    pub fn run_batch(
        &self,
        tasks: Vec<ParseTask>,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> IndexResult<Vec<(ParseTask, TaskOutcome)>> {
        let (task_tx, task_rx): (Sender<(usize, ParseTask)>, Receiver<(usize, ParseTask)>) =
            bounded(tasks.len().max(1));
        let (result_tx, result_rx) = bounded(tasks.len().max(1));

        let total = tasks.len();
        for (idx, task) in tasks.into_iter().enumerate() {
            task_tx.send((idx, task)).expect("queue sized for all tasks");
        }
        drop(task_tx);

        std::thread::scope(|scope| {
            for _ in 0..self.size {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                let binary = self.binary.clone();
                scope.spawn(move || {
                    let mut process = match WorkerProcess::spawn(&binary) {
                        Ok(p) => Some(p),
                        Err(_) => None,
                    };
                    for (idx, task) in task_rx.iter() {
                        if cancelled() {
                            let _ = result_tx.send((idx, task, TaskOutcome::Crashed));
                            continue;
                        }
                        let outcome = match process.as_mut() {
                            Some(proc) => match proc.send(&task) {
                                Ok(Ok(batch)) => TaskOutcome::Parsed(batch),
                                Ok(Err(message)) => TaskOutcome::ParseFailed(message),
                                Err(_) => {
                                    if let Some(p) = process.take() {
                                        p.kill();
                                    }
                                    process = WorkerProcess::spawn(&binary).ok();
                                    TaskOutcome::Crashed
                                }
                            },
                            None => {
                                process = WorkerProcess::spawn(&binary).ok();
                                TaskOutcome::Crashed
                            }
                        };
                        let _ = result_tx.send((idx, task, outcome));
                    }
                    if let Some(p) = process {
                        p.kill();
                    }
                });
            }
        });
        drop(result_tx);

        let mut slots: Vec<Option<(ParseTask, TaskOutcome)>> = (0..total).map(|_| None).collect();
        for (idx, task, outcome) in result_rx.iter() {
            slots[idx] = Some((task, outcome));
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| {
                    IndexError::BrokenPool("worker pool lost a task without reporting it".into())
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_through_a_buffer() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let read_back = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(read_back, b"hello");
    }

    #[test]
    fn read_frame_reports_clean_eof_as_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }
}
