use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::ImportSection;

pub const STATE_DIR_NAME: &str = ".docx2wiki";
pub const DEFAULT_DATA_DIR: &str = "Data";
pub const DEFAULT_MEDIA_DIR: &str = "media";
pub const DEFAULT_LOG_FILE: &str = "application.log";

/// Subdirectory pandoc creates under `--extract-media=<dir>`.
pub const EXTRACTED_MEDIA_SUBDIR: &str = "media";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Config,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Config => "config",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub media_root: PathBuf,
    pub log_path: PathBuf,
    pub root_source: ValueSource,
    pub data_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    /// Directory the converter drops extracted images into.
    pub fn media_dir(&self) -> PathBuf {
        self.media_root.join(EXTRACTED_MEDIA_SUBDIR)
    }

    /// Fill in paths configured under `[import]`. Flags and env values win.
    pub fn apply_import_settings(&mut self, import: &ImportSection) {
        if self.data_source == ValueSource::Default
            && let Some(data_dir) = non_empty(import.data_dir.as_deref())
        {
            self.data_dir = absolutize(Path::new(data_dir), &self.project_root);
            self.data_source = ValueSource::Config;
        }
        if let Some(media_dir) = non_empty(import.media_dir.as_deref()) {
            self.media_root = absolutize(Path::new(media_dir), &self.project_root);
        }
        if let Some(log_file) = non_empty(import.log_file.as_deref()) {
            self.log_path = absolutize(Path::new(log_file), &self.project_root);
        }
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nstate_dir={}\nconfig_path={} ({})\ndata_dir={} ({})\nmedia_dir={}\nlog_path={}",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.state_dir),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
            normalize_for_display(&self.data_dir),
            self.data_source.as_str(),
            normalize_for_display(&self.media_dir()),
            normalize_for_display(&self.log_path),
        )
    }
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = if let Some(path) = overrides.project_root.as_deref() {
        (absolutize(path, &context.cwd), ValueSource::Flag)
    } else if let Some(value) = lookup_env("DOCX2WIKI_PROJECT_ROOT") {
        (
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        )
    } else {
        (context.cwd.clone(), ValueSource::Default)
    };
    let state_dir = project_root.join(STATE_DIR_NAME);

    let (data_dir, data_source) = if let Some(path) = overrides.data_dir.as_deref() {
        (absolutize(path, &project_root), ValueSource::Flag)
    } else if let Some(value) = lookup_env("DOCX2WIKI_DATA_DIR") {
        (
            absolutize(Path::new(value.trim()), &project_root),
            ValueSource::Env,
        )
    } else {
        (project_root.join(DEFAULT_DATA_DIR), ValueSource::Default)
    };

    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, &project_root), ValueSource::Flag)
    } else if let Some(value) = lookup_env("DOCX2WIKI_CONFIG") {
        (
            absolutize(Path::new(value.trim()), &project_root),
            ValueSource::Env,
        )
    } else {
        (state_dir.join("config.toml"), ValueSource::Default)
    };

    Ok(ResolvedPaths {
        media_root: project_root.join(DEFAULT_MEDIA_DIR),
        log_path: project_root.join(DEFAULT_LOG_FILE),
        project_root,
        state_dir,
        config_path,
        data_dir,
        root_source,
        data_source,
        config_source,
    })
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
