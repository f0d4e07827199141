use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

static LOG_DIR: &str = "./logs";

struct DecLogger {
    level: LevelFilter,
    file: Option<Mutex<File>>,
}

impl Log for DecLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format!(
            "{} [{}] {}: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        );
        eprintln!("{}", line);

        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = writeln!(file, "{}", line);
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

fn open_run_log() -> Option<File> {
    fs::create_dir_all(LOG_DIR).ok()?;
    let path = format!("{}/dec_{}.log", LOG_DIR, Local::now().format("%Y%m%d_%H%M%S"));
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Installs the global logger. The level is read from `DEC_LOG` (default `info`).
/// Lines go to stderr and, when the `logs/` directory is writable, to a per-run file.
pub fn init_logger() -> Result<(), SetLoggerError> {
    let level = std::env::var("DEC_LOG")
        .ok()
        .and_then(|value| LevelFilter::from_str(&value).ok())
        .unwrap_or(LevelFilter::Info);

    let logger = DecLogger {
        level,
        file: open_run_log().map(Mutex::new),
    };

    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(level);
    Ok(())
}
