//! The external search engine, treated as an opaque process.

use crate::config::{EngineConfig, SizeLabel};
use crate::error::EngineError;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Everything that determines the engine's argument vector for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInvocation {
    pub dataset_orig_path: PathBuf,
    pub dataset_path: PathBuf,
    pub query_orig_path: PathBuf,
    pub query_path: PathBuf,
    pub size: SizeLabel,
    pub build_index: bool,
    pub k: usize,
}

impl EngineInvocation {
    /// Positional arguments in the engine's fixed order.
    pub fn positional_args(&self) -> Vec<String> {
        vec![
            self.dataset_orig_path.to_string_lossy().to_string(),
            self.dataset_path.to_string_lossy().to_string(),
            self.query_orig_path.to_string_lossy().to_string(),
            self.query_path.to_string_lossy().to_string(),
            self.size.code().to_string(),
            if self.build_index { "true" } else { "false" }.to_string(),
            self.k.to_string(),
        ]
    }
}

/// Number of trailing stdout lines kept in [`EngineOutput::stdout`].
pub const STDOUT_TAIL_LINES: usize = 50;

#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub elapsed: Duration,
    /// Last [`STDOUT_TAIL_LINES`] lines the engine printed. Every line is
    /// also logged at debug level as it arrives.
    pub stdout: String,
    pub stdout_lines: usize,
}

/// Logs each line of `reader` and keeps the last `keep` of them.
pub fn drain_lines<R: Read>(reader: R, keep: usize) -> std::io::Result<(String, usize)> {
    let mut reader = BufReader::new(reader);
    let mut tail: VecDeque<String> = VecDeque::with_capacity(keep);
    let mut buf = Vec::new();
    let mut total = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf).trim_end().to_string();
        debug!(target: "engine::stdout", "{}", line);
        total += 1;
        if keep == 0 {
            continue;
        }
        if tail.len() == keep {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    let mut text = Vec::from(tail).join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    Ok((text, total))
}

/// Runs the index build and search. The engine writes its result and
/// side-channel files itself; callers read them from derived paths.
pub trait Engine {
    fn run(&self, invocation: &EngineInvocation) -> Result<EngineOutput, EngineError>;
}

/// Launches the engine jar on a JVM with a fixed heap ceiling.
pub struct JavaEngine {
    config: EngineConfig,
}

impl JavaEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn argv(&self, invocation: &EngineInvocation) -> Vec<String> {
        let mut argv = vec![
            format!("-Xmx{}", self.config.max_heap),
            "-jar".to_string(),
            self.config.jar.to_string_lossy().to_string(),
        ];
        argv.extend(invocation.positional_args());
        argv
    }

    fn command(&self, invocation: &EngineInvocation) -> Command {
        let mut cmd = Command::new(&self.config.java);
        cmd.args(self.argv(invocation));
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());
        bind_to_parent(&mut cmd);
        cmd
    }
}

impl Engine for JavaEngine {
    fn run(&self, invocation: &EngineInvocation) -> Result<EngineOutput, EngineError> {
        let program = self.config.java.to_string_lossy().to_string();
        debug!(program = %program, argv = ?self.argv(invocation), "engine command");
        info!(
            size = %invocation.size,
            k = invocation.k,
            build_index = invocation.build_index,
            "running engine (index build + search)"
        );
        let started = Instant::now();
        let mut child = self
            .command(invocation)
            .spawn()
            .map_err(|source| EngineError::Launch {
                program: program.clone(),
                source,
            })?;
        let drained = match child.stdout.take() {
            Some(stdout) => drain_lines(stdout, STDOUT_TAIL_LINES),
            None => Ok((String::new(), 0)),
        };
        let status = child.wait().map_err(|source| EngineError::Launch {
            program: program.clone(),
            source,
        })?;
        let (stdout, stdout_lines) =
            drained.map_err(|source| EngineError::Launch { program, source })?;
        let elapsed = started.elapsed();
        let elapsed_secs = elapsed.as_secs_f64();
        match status.code() {
            Some(0) => {}
            Some(code) => return Err(EngineError::NonZeroExit { code, elapsed_secs }),
            None => return Err(EngineError::Killed { elapsed_secs }),
        }
        info!(secs = elapsed_secs, "engine finished");
        Ok(EngineOutput {
            elapsed,
            stdout,
            stdout_lines,
        })
    }
}

/// Ask the kernel to kill the child when the harness dies, so an interrupted
/// run does not orphan a JVM holding hundreds of gigabytes.
#[cfg(target_os = "linux")]
fn bind_to_parent(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    let parent = std::process::id() as libc::pid_t;
    // SAFETY: prctl and getppid are async-signal-safe, and the error path
    // builds an io::Error without allocating.
    unsafe {
        cmd.pre_exec(move || {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL, 0, 0, 0) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            // The harness may have died between fork and prctl.
            if libc::getppid() != parent {
                return Err(std::io::Error::from_raw_os_error(libc::ESRCH));
            }
            Ok(())
        });
    }
}

#[cfg(not(target_os = "linux"))]
fn bind_to_parent(_cmd: &mut Command) {}
