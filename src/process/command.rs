//! Delegate each item to an external program: payload JSON on stdin, result JSON on stdout.

use anyhow::{Context, Result, anyhow};
use log::debug;
use serde_json::Value;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::Processor;
use crate::ItemContext;

/// How often a running child is polled while a timeout is armed.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs `program args..` once per item.
///
/// The child gets the payload on stdin and `ENRICHER_DATASET`, `ENRICHER_FILE`, `ENRICHER_ITEM`
/// in its environment. Empty stdout or `null` means no result; a non-zero exit is an error.
#[derive(Clone, Debug)]
pub struct CommandProcessor {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandProcessor {
    /// `argv[0]` is the program. Errors when `argv` is empty.
    pub fn new(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("processor command is empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: None,
        })
    }

    /// Kill the child and fail the item if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn spawn(&self, ctx: &ItemContext) -> Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .env("ENRICHER_DATASET", &ctx.dataset_label)
            .env("ENRICHER_FILE", &ctx.file_id)
            .env("ENRICHER_ITEM", &ctx.item_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn {}", self.program))
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus> {
        let Some(timeout) = self.timeout else {
            return child.wait().context("wait for processor");
        };
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait().context("poll processor")? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(anyhow!("{} timed out after {:?}", self.program, timeout));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Drain a child pipe on its own thread so a chatty child can't block on a full pipe.
fn read_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

impl Processor for CommandProcessor {
    fn process(&self, ctx: &ItemContext, payload: &Value) -> Result<Option<Value>> {
        let input = serde_json::to_vec(payload).context("serialize payload")?;
        let mut child = self.spawn(ctx)?;

        let stdout = read_pipe(child.stdout.take());
        let stderr = read_pipe(child.stderr.take());
        let stdin = child.stdin.take();
        // A child that exits without reading stdin is judged by its exit status below.
        let writer = thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                let _ = stdin.write_all(&input);
            }
        });

        let status = self.wait(&mut child)?;
        let _ = writer.join();
        let out = stdout
            .join()
            .map_err(|_| anyhow!("stdout reader panicked"))?;
        let err = stderr
            .join()
            .map_err(|_| anyhow!("stderr reader panicked"))?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&err);
            return Err(anyhow!(
                "{} exited with {}: {}",
                self.program,
                status,
                stderr.trim()
            ));
        }
        let text = String::from_utf8_lossy(&out);
        let text = text.trim();
        if text.is_empty() {
            debug!("[{}] {} produced no output", ctx.dataset_label, ctx.item_id);
            return Ok(None);
        }
        let value: Value = serde_json::from_str(text)
            .with_context(|| format!("{} wrote invalid JSON", self.program))?;
        Ok((!value.is_null()).then_some(value))
    }
}
