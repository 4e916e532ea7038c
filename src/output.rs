//! Process-wide logger: a `log::Log` implementation writing to stderr/stdout
//! and, optionally, a log file truncated at startup (§6.3). Carried from the
//! teacher's `output.rs`, stripped of its TUI sink indirection since this
//! gateway has no interactive terminal mode to route around.

use log::{Level, LevelFilter, Metadata, Record};
use std::fs::File;
use std::io::Write;
use std::sync::Mutex;

pub struct OutputLogger {
    level: LevelFilter,
    file: Option<Mutex<File>>,
}

impl OutputLogger {
    pub fn new(level: LevelFilter, file: Option<Mutex<File>>) -> Self {
        Self { level, file }
    }
}

impl log::Log for OutputLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{}] {}", record.level(), record.args());
        if matches!(record.level(), Level::Error | Level::Warn) {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
        if let Some(file) = &self.file {
            if let Ok(mut handle) = file.lock() {
                let _ = writeln!(handle, "{}", line);
            }
        }
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
        if let Some(file) = &self.file {
            if let Ok(mut handle) = file.lock() {
                let _ = handle.flush();
            }
        }
    }
}

/// Installs the process-wide logger. `log_file`, if set, is truncated before
/// the first write so successive runs don't append onto a stale log.
pub fn init_logger(level: LevelFilter, log_file: Option<&str>) -> anyhow::Result<()> {
    let file = match log_file {
        Some(path) => Some(Mutex::new(
            File::create(path).map_err(|e| anyhow::anyhow!("cannot open log file {}: {}", path, e))?,
        )),
        None => None,
    };

    let logger = OutputLogger::new(level, file);
    log::set_boxed_logger(Box::new(logger)).map_err(|e| anyhow::anyhow!(e))?;
    log::set_max_level(level);
    Ok(())
}
