use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warn,
    Error,
}

impl Level {
    pub fn marker(self) -> &'static str {
        match self {
            Self::Info => "[info]",
            Self::Success => "[ok]",
            Self::Warn => "[warn]",
            Self::Error => "[error]",
        }
    }
}

/// Journal for one migration run. Every line is appended to the log file and,
/// when `echo` is set, printed to stdout. The file is never truncated.
#[derive(Debug)]
pub struct RunLog {
    file: File,
    path: PathBuf,
    echo: bool,
}

impl RunLog {
    pub fn open(path: &Path, echo: bool) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            echo,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn start_run(&self) {
        let started = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_secs())
            .unwrap_or(0);
        self.write_line(&format!("=== run started (unix {started}) ==="));
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.append(Level::Info, message.as_ref());
    }

    pub fn success(&self, message: impl AsRef<str>) {
        self.append(Level::Success, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.append(Level::Warn, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.append(Level::Error, message.as_ref());
    }

    pub fn append(&self, level: Level, message: &str) {
        self.write_line(&format!("{} {message}", level.marker()));
    }

    fn write_line(&self, line: &str) {
        if self.echo {
            println!("{line}");
        }
        let mut file = &self.file;
        if let Err(error) = writeln!(file, "{line}") {
            tracing::warn!(path = %self.path.display(), %error, "failed to append to run log");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::RunLog;

    #[test]
    fn open_creates_missing_file_and_parents() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("logs").join("application.log");
        let log = RunLog::open(&path, false).expect("open log");
        log.info("first line");
        assert!(path.exists());
        let content = fs::read_to_string(&path).expect("read log");
        assert_eq!(content, "[info] first line\n");
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("application.log");
        {
            let log = RunLog::open(&path, false).expect("open log");
            log.warn("from first run");
        }
        let log = RunLog::open(&path, false).expect("reopen log");
        log.error("from second run");
        log.success("done");

        let content = fs::read_to_string(&path).expect("read log");
        let lines = content.lines().collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec![
                "[warn] from first run",
                "[error] from second run",
                "[ok] done"
            ]
        );
    }

    #[test]
    fn start_run_writes_separator() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("application.log");
        let log = RunLog::open(&path, false).expect("open log");
        log.start_run();
        let content = fs::read_to_string(&path).expect("read log");
        assert!(content.starts_with("=== run started (unix "));
    }
}
