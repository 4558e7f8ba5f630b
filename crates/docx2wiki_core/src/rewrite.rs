use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use quick_xml::escape::{escape, partial_escape};
use scraper::{ElementRef, Html, Node, Selector};

use crate::journal::RunLog;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Storage-format body plus the media files it references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewrittenMarkup {
    pub body: String,
    /// Distinct media files, in first-reference order.
    pub attachments: Vec<PathBuf>,
    /// `src` values whose file was not found in the media directory.
    pub missing: Vec<String>,
}

pub fn rewrite_images(html_path: &Path, media_dir: &Path, log: &RunLog) -> Result<RewrittenMarkup> {
    let html = fs::read_to_string(html_path)
        .with_context(|| format!("failed to read {}", html_path.display()))?;
    Ok(rewrite_html(&html, media_dir, log))
}

/// Serialize the `<body>` children of `html` as XHTML, turning every `<img>`
/// whose file exists in `media_dir` into an attached-image macro.
pub fn rewrite_html(html: &str, media_dir: &Path, log: &RunLog) -> RewrittenMarkup {
    let document = Html::parse_document(html);
    let mut writer = StorageWriter {
        media_dir,
        log,
        out: RewrittenMarkup::default(),
        seen: HashSet::new(),
    };
    if let Ok(selector) = Selector::parse("body")
        && let Some(body) = document.select(&selector).next()
    {
        writer.write_children(body);
    }
    writer.out
}

struct StorageWriter<'a> {
    media_dir: &'a Path,
    log: &'a RunLog,
    out: RewrittenMarkup,
    seen: HashSet<String>,
}

impl StorageWriter<'_> {
    fn write_children(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.out.body.push_str(&partial_escape(&**text)),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.write_element(child);
                    }
                }
                _ => {}
            }
        }
    }

    fn write_element(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();
        if name == "img"
            && let Some(src) = element.value().attr("src")
            && self.write_attached_image(src)
        {
            return;
        }

        self.out.body.push('<');
        self.out.body.push_str(name);
        for (key, value) in element.value().attrs() {
            self.out.body.push(' ');
            self.out.body.push_str(key);
            self.out.body.push_str("=\"");
            self.out.body.push_str(&escape(value));
            self.out.body.push('"');
        }
        if VOID_ELEMENTS.contains(&name) {
            self.out.body.push_str(" />");
            return;
        }
        self.out.body.push('>');
        self.write_children(element);
        self.out.body.push_str("</");
        self.out.body.push_str(name);
        self.out.body.push('>');
    }

    /// Returns false when the image file is missing and the `<img>` must be kept.
    fn write_attached_image(&mut self, src: &str) -> bool {
        let file_name = Path::new(src.trim())
            .file_name()
            .map(|name| name.to_string_lossy().to_string());
        let Some(file_name) = file_name.filter(|name| self.media_dir.join(name).is_file()) else {
            self.log.warn(format!("image not found: \"{src}\""));
            self.out.missing.push(src.to_string());
            return false;
        };
        let image = self.media_dir.join(&file_name);

        if self.seen.insert(file_name.clone()) {
            self.log.info(format!("image resolved: {file_name}"));
            self.out.attachments.push(image);
        }
        self.out.body.push_str("<ac:image><ri:attachment ri:filename=\"");
        self.out.body.push_str(&escape(file_name.as_str()));
        self.out.body.push_str("\" /></ac:image>");
        true
    }
}
