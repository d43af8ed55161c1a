//! Log setup: every record goes to stderr and to one file per run.

use std::{
    fs::{File, OpenOptions},
    io::{ErrorKind, LineWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, bail};
use chrono::{DateTime, Local, TimeZone};
use env_logger::{Env, Target};

const LOG_FILE_PREFIX: &str = "playlist-dl";

/// Runs started within the same second get numbered files, up to this many.
const MAX_LOG_FILES_PER_SECOND: usize = 100;

/// Installs the global logger and returns the path of this run's log file.
///
/// The level comes from `RUST_LOG` and defaults to `info`.
pub fn init(logs_dir: &Path) -> anyhow::Result<PathBuf> {
    let (path, file) = create_run_log(logs_dir, &Local::now())?;

    run_log_builder(file)
        .try_init()
        .with_context(|| "Failed to install logger")?;

    Ok(path)
}

/// Creates a log file no earlier run has used. Existing logs are never
/// truncated.
fn create_run_log<Tz: TimeZone>(
    logs_dir: &Path,
    started: &DateTime<Tz>,
) -> anyhow::Result<(PathBuf, File)>
where
    Tz::Offset: std::fmt::Display,
{
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("Failed to create logs directory {}", logs_dir.display()))?;

    for attempt in 0..MAX_LOG_FILES_PER_SECOND {
        let path = logs_dir.join(log_file_name(started, attempt));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to create log file {}", path.display()));
            }
        }
    }
    bail!(
        "Failed to create log file in {}, too many runs started at once",
        logs_dir.display()
    )
}

/// Logger writing every record to `file` and to stderr.
fn run_log_builder(file: File) -> env_logger::Builder {
    let mut builder = builder();
    builder.target(Target::Pipe(Box::new(Tee {
        file: LineWriter::new(file),
        console: std::io::stderr(),
    })));
    builder
}

/// Console-only logging for commands that do not produce a run log.
pub fn init_console() -> anyhow::Result<()> {
    builder()
        .try_init()
        .with_context(|| "Failed to install logger")
}

fn builder() -> env_logger::Builder {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.args()
        )
    });
    builder
}

fn log_file_name<Tz: TimeZone>(started: &DateTime<Tz>, attempt: usize) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let stamp = started.format("%Y%m%d-%H%M%S");
    match attempt {
        0 => format!("{LOG_FILE_PREFIX}-{stamp}.log"),
        n => format!("{LOG_FILE_PREFIX}-{stamp}-{n}.log"),
    }
}

/// Writes everything to both sinks
struct Tee<A, B> {
    file: A,
    console: B,
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write_all(buf)?;
        // a closed terminal must not break the run log
        let _ = self.console.write_all(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()?;
        let _ = self.console.flush();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use log::{Level, Log, Record};

    #[test]
    fn test_log_file_name_is_timestamped() {
        let started = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(log_file_name(&started, 0), "playlist-dl-20240309-070501.log");
        assert_eq!(log_file_name(&started, 2), "playlist-dl-20240309-070501-2.log");
    }

    #[test]
    fn test_runs_in_the_same_second_get_separate_logs() -> anyhow::Result<()> {
        let tmp = tempfile::TempDir::new()?;
        let logs = tmp.path().join("logs");
        let started = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();

        let (first, mut file) = create_run_log(&logs, &started)?;
        writeln!(file, "first run")?;
        let (second, _) = create_run_log(&logs, &started)?;

        assert_ne!(first, second);
        assert!(second.ends_with("playlist-dl-20240309-070501-1.log"));
        assert_eq!(std::fs::read_to_string(&first)?, "first run\n");

        Ok(())
    }

    #[test]
    fn test_run_log_receives_records() -> anyhow::Result<()> {
        let tmp = tempfile::TempDir::new()?;
        let (path, file) = create_run_log(tmp.path(), &Local::now())?;
        let logger = run_log_builder(file).build();

        logger.log(
            &Record::builder()
                .args(format_args!("[mix row 1] downloaded Band - Song"))
                .level(Level::Error)
                .target("playlist_dl::pipeline")
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("run finished, processed: 1, skipped: 0, failed: 0"))
                .level(Level::Error)
                .target("playlist_dl::pipeline")
                .build(),
        );
        logger.flush();

        let content = std::fs::read_to_string(&path)?;
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("ERROR [mix row 1] downloaded Band - Song"));
        assert!(lines[1].ends_with("run finished, processed: 1, skipped: 0, failed: 0"));

        Ok(())
    }

    #[test]
    fn test_tee_writes_both_sinks() {
        let mut tee = Tee {
            file: Vec::new(),
            console: Vec::new(),
        };

        write!(tee, "downloaded {}", 3).unwrap();
        tee.flush().unwrap();

        assert_eq!(tee.file, b"downloaded 3");
        assert_eq!(tee.console, b"downloaded 3");
    }
}
