//! Work discovery: positional files first, then the `-d` tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use farm_core::{kdebug, kerror, kwarn, FarmResult};
use farm_runtime::{SubmitStatus, Task};

/// Whether the producer should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// What the producer did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerReport {
    pub submitted: usize,
    /// Entries that were not regular files
    pub skipped: usize,
    /// Inputs that could not be inspected; any makes the exit status non-zero
    pub failures: usize,
    /// Stopped early by a stop request or a pool that refused work
    pub stopped: bool,
}

pub struct Producer<'a> {
    submit: &'a mut dyn FnMut(Task) -> FarmResult<SubmitStatus>,
    stop: &'a dyn Fn() -> bool,
    delay: Duration,
    /// Retry interval for `Busy`; `None` treats `Busy` as final
    handoff_retry: Option<Duration>,
    report: ProducerReport,
}

impl<'a> Producer<'a> {
    pub fn new(
        submit: &'a mut dyn FnMut(Task) -> FarmResult<SubmitStatus>,
        stop: &'a dyn Fn() -> bool,
        delay: Duration,
    ) -> Self {
        Self {
            submit,
            stop,
            delay,
            handoff_retry: None,
            report: ProducerReport::default(),
        }
    }

    /// Direct-handoff pools answer `Busy` while every worker is busy
    pub fn retry_busy(mut self, every: Duration) -> Self {
        self.handoff_retry = Some(every);
        self
    }

    /// Submit `files`, then every regular file below `dir`.
    ///
    /// Only a pool failure is an error; unreadable inputs are counted.
    pub fn run(mut self, files: &[PathBuf], dir: Option<&Path>) -> FarmResult<ProducerReport> {
        let mut flow = Flow::Continue;
        for file in files {
            flow = self.positional(file)?;
            if flow == Flow::Stop {
                break;
            }
        }

        if let (Flow::Continue, Some(dir)) = (flow, dir) {
            match fs::metadata(dir) {
                Ok(meta) if meta.is_dir() => flow = self.walk(dir)?,
                Ok(_) => {
                    kerror!("{} is not a directory", dir.display());
                    self.report.failures += 1;
                }
                Err(e) => {
                    kerror!("stat {}: {}", dir.display(), e);
                    self.report.failures += 1;
                }
            }
        }

        self.report.stopped = flow == Flow::Stop;
        Ok(self.report)
    }

    fn positional(&mut self, file: &Path) -> FarmResult<Flow> {
        self.pause();
        if (self.stop)() {
            return Ok(Flow::Stop);
        }
        match fs::metadata(file) {
            Ok(meta) if meta.is_file() => self.submit(file),
            Ok(_) => {
                kdebug!("skipping {}: not a regular file", file.display());
                self.report.skipped += 1;
                Ok(Flow::Continue)
            }
            Err(e) => {
                kerror!("stat {}: {}", file.display(), e);
                self.report.failures += 1;
                Ok(Flow::Continue)
            }
        }
    }

    fn walk(&mut self, dir: &Path) -> FarmResult<Flow> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                kerror!("opening directory {}: {}", dir.display(), e);
                self.report.failures += 1;
                return Ok(Flow::Continue);
            }
        };

        for entry in entries {
            if (self.stop)() {
                return Ok(Flow::Stop);
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    kerror!("reading directory {}: {}", dir.display(), e);
                    self.report.failures += 1;
                    return Ok(Flow::Continue);
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) => {
                    kerror!("stat {}: {}", path.display(), e);
                    self.report.failures += 1;
                    continue;
                }
            };

            // Symlinked directories are not descended, so cycles cannot recurse
            let is_file = if file_type.is_symlink() {
                fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false)
            } else {
                file_type.is_file()
            };

            let flow = if file_type.is_dir() {
                self.walk(&path)?
            } else if is_file {
                self.pause();
                if (self.stop)() {
                    return Ok(Flow::Stop);
                }
                self.submit(&path)?
            } else {
                self.report.skipped += 1;
                Flow::Continue
            };
            if flow == Flow::Stop {
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    fn submit(&mut self, path: &Path) -> FarmResult<Flow> {
        let Some(name) = path.to_str() else {
            kwarn!("skipping {}: name is not valid UTF-8", path.display());
            self.report.failures += 1;
            return Ok(Flow::Continue);
        };

        let mut task = Task::weighted_sum(name);
        loop {
            match (self.submit)(task)? {
                SubmitStatus::Accepted => {
                    self.report.submitted += 1;
                    return Ok(Flow::Continue);
                }
                SubmitStatus::Busy(back) => match self.handoff_retry {
                    Some(every) if !(self.stop)() => {
                        task = back;
                        thread::sleep(every);
                    }
                    _ => {
                        kwarn!("pool busy, {} not submitted, stopping", back.input());
                        return Ok(Flow::Stop);
                    }
                },
                SubmitStatus::Full(back) => {
                    kwarn!("pool closed, {} not submitted, stopping", back.input());
                    return Ok(Flow::Stop);
                }
            }
        }
    }

    fn pause(&self) {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
    }
}
