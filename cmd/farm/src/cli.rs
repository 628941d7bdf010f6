//! Command line of the master.
//!
//! Options may appear anywhere among the file arguments. A malformed
//! numeric value is reported and the value from the base config is kept.

use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use farm_runtime::config::{pending_from_len, FarmConfig};

#[derive(Debug)]
pub struct Cli {
    pub config: FarmConfig,
    pub dir: Option<PathBuf>,
    pub files: Vec<PathBuf>,
    pub help: bool,
    /// Problems to report; none of them stops the run
    pub warnings: Vec<String>,
}

pub fn usage(prog: &str) -> String {
    format!(
        "usage: {prog} -n <num_worker> -q <qlen> -t <delay> [-d <dirname>] filename [filename...] -h

Options:
  -n <N>      Worker threads (default: 4)
  -q <N>      Pending queue length, 0 for direct handoff (default: 8)
  -t <MS>     Delay before each submission in milliseconds (default: 0)
  -d <DIR>    Walk DIR recursively and submit every regular file
  -h          Print this help

Results go to stdout as '<value> <file>' lines sorted by value.
SIGUSR1 prints a snapshot, SIGINT/SIGQUIT/SIGTERM/SIGHUP stop submitting."
    )
}

fn numeric<T: FromStr>(flag: char, raw: Option<String>, warnings: &mut Vec<String>) -> Option<T> {
    match raw {
        None => {
            warnings.push(format!("option '-{}' requires an argument", flag));
            None
        }
        Some(s) => match s.trim().parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warnings.push(format!("invalid argument for '-{}': '{}', keeping default", flag, s));
                None
            }
        },
    }
}

/// Parse everything after the program name on top of `base`
pub fn parse<I>(args: I, base: FarmConfig) -> Cli
where
    I: IntoIterator<Item = OsString>,
{
    let mut cli = Cli {
        config: base,
        dir: None,
        files: Vec::new(),
        help: false,
        warnings: Vec::new(),
    };
    let mut args = args.into_iter();
    let mut options_done = false;

    while let Some(arg) = args.next() {
        let text = arg.to_string_lossy().into_owned();
        if options_done || !text.starts_with('-') || text == "-" {
            cli.files.push(PathBuf::from(arg));
            continue;
        }
        if text == "--" {
            options_done = true;
            continue;
        }

        let mut chars = text[1..].chars();
        let flag = chars.next().unwrap_or('-');
        let attached: String = chars.collect();
        let value = |args: &mut I::IntoIter| -> Option<OsString> {
            if attached.is_empty() {
                args.next()
            } else {
                Some(OsString::from(attached.clone()))
            }
        };

        match flag {
            'n' => {
                let raw = value(&mut args).map(|v| v.to_string_lossy().into_owned());
                if let Some(n) = numeric(flag, raw, &mut cli.warnings) {
                    cli.config.num_workers = n;
                }
            }
            'q' => {
                let raw = value(&mut args).map(|v| v.to_string_lossy().into_owned());
                if let Some(q) = numeric::<usize>(flag, raw, &mut cli.warnings) {
                    cli.config.pending_capacity = pending_from_len(q);
                }
            }
            't' => {
                let raw = value(&mut args).map(|v| v.to_string_lossy().into_owned());
                if let Some(ms) = numeric::<u64>(flag, raw, &mut cli.warnings) {
                    cli.config.submit_delay = Duration::from_millis(ms);
                }
            }
            'd' => match value(&mut args) {
                Some(dir) => cli.dir = Some(PathBuf::from(dir)),
                None => cli.warnings.push("option '-d' requires an argument".into()),
            },
            'h' => cli.help = true,
            other => cli.warnings.push(format!("unknown option '-{}' ignored", other)),
        }
    }
    cli
}
