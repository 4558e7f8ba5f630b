use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};

use crate::discover::base_name;

pub trait DocumentConverter {
    /// Convert `document` to HTML, extracting embedded media on the side.
    /// Returns the path of the HTML file once it exists on disk.
    fn convert(&self, document: &Path) -> Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct PandocConverter {
    pub binary: PathBuf,
    /// Passed as `--extract-media`; pandoc writes images to `<media_root>/media`.
    pub media_root: PathBuf,
    pub working_dir: PathBuf,
}

impl PandocConverter {
    pub fn new(binary: impl Into<PathBuf>, media_root: &Path, working_dir: &Path) -> Self {
        Self {
            binary: binary.into(),
            media_root: media_root.to_path_buf(),
            working_dir: working_dir.to_path_buf(),
        }
    }

    pub fn command_args(&self, document: &Path, output: &Path) -> Vec<String> {
        vec![
            document.to_string_lossy().to_string(),
            "-f".to_string(),
            "docx".to_string(),
            "-t".to_string(),
            "html".to_string(),
            "-o".to_string(),
            output.to_string_lossy().to_string(),
            format!("--extract-media={}", self.media_root.to_string_lossy()),
        ]
    }
}

impl DocumentConverter for PandocConverter {
    fn convert(&self, document: &Path) -> Result<PathBuf> {
        let output = html_output_path(document);
        let args = self.command_args(document, &output);
        tracing::debug!(binary = %self.binary.display(), ?args, "running converter");

        let result = Command::new(&self.binary)
            .args(&args)
            .current_dir(&self.working_dir)
            .output()
            .with_context(|| format!("failed to execute {}", self.binary.display()))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            bail!(
                "{} exited with {} for {}: {}",
                self.binary.display(),
                result.status,
                document.display(),
                stderr.trim()
            );
        }
        if !output.exists() {
            bail!(
                "converter produced no output file {} for {}",
                output.display(),
                document.display()
            );
        }
        Ok(output)
    }
}

/// `<dir>/<base>.html` beside the source document.
pub fn html_output_path(document: &Path) -> PathBuf {
    let file_name = format!("{}.html", base_name(document));
    match document.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}
