use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::confluence::ContentApi;
use crate::convert::{DocumentConverter, html_output_path};
use crate::discover::{base_name, has_extension};
use crate::housekeeping::{clear_directory, remove_converted};
use crate::journal::RunLog;
use crate::rewrite::rewrite_images;
use crate::runtime::normalize_for_display;
use crate::titles::TitleMap;

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub space_key: String,
    pub extension: String,
    /// Where the converter extracts images; emptied after every document.
    pub media_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageAction {
    Updated,
    UpdateFailed,
    CreateFailed,
    ConversionFailed,
    RewriteFailed,
}

impl PageAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::UpdateFailed => "update_failed",
            Self::CreateFailed => "create_failed",
            Self::ConversionFailed => "conversion_failed",
            Self::RewriteFailed => "rewrite_failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    pub source: String,
    pub title: String,
    pub parent_id: Option<String>,
    pub page_id: Option<String>,
    pub action: PageAction,
    pub attachments_uploaded: usize,
    pub attachments_failed: usize,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadReport {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub skipped_documents: usize,
    pub skipped_folders: Vec<String>,
    pub attachments_uploaded: usize,
    pub attachments_failed: usize,
    pub request_count: usize,
    pub pages: Vec<PageResult>,
}

impl UploadReport {
    pub fn success(&self) -> bool {
        self.failed == 0
            && self.skipped_documents == 0
            && self.skipped_folders.is_empty()
            && self.attachments_failed == 0
    }

    fn record(&mut self, page: PageResult) {
        if page.page_id.is_some() {
            self.created += 1;
        }
        match page.action {
            PageAction::Updated => self.updated += 1,
            PageAction::UpdateFailed | PageAction::CreateFailed => self.failed += 1,
            PageAction::ConversionFailed | PageAction::RewriteFailed => {
                self.skipped_documents += 1
            }
        }
        self.attachments_uploaded += page.attachments_uploaded;
        self.attachments_failed += page.attachments_failed;
        self.pages.push(page);
    }
}

/// Walks a document tree and mirrors it as a page tree: every document
/// becomes a page, and a folder named like a document's base name holds
/// that page's children.
pub struct Uploader<'a, A, C> {
    api: &'a mut A,
    converter: &'a C,
    titles: &'a TitleMap,
    log: &'a RunLog,
    settings: &'a UploadSettings,
}

impl<'a, A, C> Uploader<'a, A, C>
where
    A: ContentApi,
    C: DocumentConverter,
{
    pub fn new(
        api: &'a mut A,
        converter: &'a C,
        titles: &'a TitleMap,
        log: &'a RunLog,
        settings: &'a UploadSettings,
    ) -> Self {
        Self {
            api,
            converter,
            titles,
            log,
            settings,
        }
    }

    pub fn upload_tree(&mut self, root: &Path, parent_id: Option<&str>) -> Result<UploadReport> {
        if !root.is_dir() {
            bail!("data folder not found: {}", normalize_for_display(root));
        }
        let parent_id = parent_id.map(str::trim).filter(|id| !id.is_empty());

        let mut report = UploadReport::default();
        self.upload_folder(root, parent_id, &mut report);
        report.request_count = self.api.request_count();
        Ok(report)
    }

    fn upload_folder(&mut self, folder: &Path, parent_id: Option<&str>, report: &mut UploadReport) {
        let documents = match list_documents(folder, &self.settings.extension) {
            Ok(documents) => documents,
            Err(error) => {
                self.log.error(format!("{error:#}"));
                report.skipped_folders.push(normalize_for_display(folder));
                return;
            }
        };

        for document in documents {
            let page_id = self.upload_document(&document, parent_id, report);
            let subfolder = document.with_file_name(base_name(&document));
            if !subfolder.is_dir() {
                continue;
            }
            match page_id {
                Some(page_id) => self.upload_folder(&subfolder, Some(page_id.as_str()), report),
                None => {
                    self.log.warn(format!(
                        "skipping folder {}: no page was created for {}",
                        normalize_for_display(&subfolder),
                        display_name(&document)
                    ));
                    report.skipped_folders.push(normalize_for_display(&subfolder));
                }
            }
        }
    }

    /// Convert, rewrite and publish one document. Returns the page id when the
    /// page exists remotely, even if its final update failed.
    fn upload_document(
        &mut self,
        document: &Path,
        parent_id: Option<&str>,
        report: &mut UploadReport,
    ) -> Option<String> {
        let title = self.titles.title_for(document);
        let name = display_name(document);
        let mut result = PageResult {
            source: normalize_for_display(document),
            title: title.clone(),
            parent_id: parent_id.map(ToString::to_string),
            page_id: None,
            action: PageAction::ConversionFailed,
            attachments_uploaded: 0,
            attachments_failed: 0,
            detail: None,
        };
        self.log.info(format!("processing {name} as '{title}'"));

        let html = match self.converter.convert(document) {
            Ok(html) => html,
            Err(error) => {
                self.log
                    .error(format!("failed to create HTML for {name}: {error:#}"));
                result.detail = Some(format!("{error:#}"));
                self.cleanup(&html_output_path(document));
                report.record(result);
                return None;
            }
        };

        let markup = match rewrite_images(&html, &self.settings.media_dir, self.log) {
            Ok(markup) => markup,
            Err(error) => {
                self.log
                    .error(format!("failed to rewrite markup for {name}: {error:#}"));
                result.action = PageAction::RewriteFailed;
                result.detail = Some(format!("{error:#}"));
                self.cleanup(&html);
                report.record(result);
                return None;
            }
        };

        let page = match self
            .api
            .create_page(&self.settings.space_key, &title, parent_id)
        {
            Ok(page) => page,
            Err(error) => {
                self.log
                    .error(format!("failed to create page '{title}': {error:#}"));
                result.action = PageAction::CreateFailed;
                result.detail = Some(format!("{error:#}"));
                self.cleanup(&html);
                report.record(result);
                return None;
            }
        };
        self.log
            .success(format!("page created: '{title}' (id {})", page.id));
        result.page_id = Some(page.id.clone());

        for attachment in &markup.attachments {
            let attachment_name = display_name(attachment);
            match self.api.upload_attachment(&page.id, attachment) {
                Ok(()) => {
                    self.log
                        .success(format!("attachment uploaded: {attachment_name}"));
                    result.attachments_uploaded += 1;
                }
                Err(error) => {
                    self.log.error(format!(
                        "failed to upload attachment {attachment_name}: {error:#}"
                    ));
                    result.attachments_failed += 1;
                }
            }
        }

        match self.api.update_page(&page, &title, &markup.body) {
            Ok(()) => {
                self.log
                    .success(format!("page updated with attachments: {title}"));
                result.action = PageAction::Updated;
            }
            Err(error) => {
                self.log
                    .error(format!("failed to update page '{title}': {error:#}"));
                result.action = PageAction::UpdateFailed;
                result.detail = Some(format!("{error:#}"));
            }
        }

        self.cleanup(&html);
        report.record(result);
        Some(page.id)
    }

    fn cleanup(&self, html: &Path) {
        clear_directory(&self.settings.media_dir, self.log);
        remove_converted(html, self.log);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedPage {
    pub source: String,
    pub title: String,
    pub depth: usize,
    pub parent_title: Option<String>,
}

/// The page tree `upload_tree` would build, without converting or calling out.
pub fn plan_tree(root: &Path, extension: &str, titles: &TitleMap) -> Result<Vec<PlannedPage>> {
    if !root.is_dir() {
        bail!("data folder not found: {}", normalize_for_display(root));
    }
    let mut out = Vec::new();
    plan_folder(root, extension, titles, 0, None, &mut out)?;
    Ok(out)
}

fn plan_folder(
    folder: &Path,
    extension: &str,
    titles: &TitleMap,
    depth: usize,
    parent_title: Option<&str>,
    out: &mut Vec<PlannedPage>,
) -> Result<()> {
    for document in list_documents(folder, extension)? {
        let title = titles.title_for(&document);
        out.push(PlannedPage {
            source: normalize_for_display(&document),
            title: title.clone(),
            depth,
            parent_title: parent_title.map(ToString::to_string),
        });
        let subfolder = document.with_file_name(base_name(&document));
        if subfolder.is_dir() {
            plan_folder(&subfolder, extension, titles, depth + 1, Some(&title), out)?;
        }
    }
    Ok(())
}

/// Matching files directly inside `folder`, sorted by file name.
fn list_documents(folder: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(folder).with_context(|| format!("failed to list {}", folder.display()))?;
    let mut documents = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list {}", folder.display()))?;
        if !entry.file_type().is_ok_and(|kind| kind.is_file()) {
            continue;
        }
        let path = entry.path();
        if has_extension(&path, extension) {
            documents.push(path);
        }
    }
    documents.sort_by(|left, right| left.file_name().cmp(&right.file_name()));
    Ok(documents)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
