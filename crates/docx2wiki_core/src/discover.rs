use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Every file under `root` whose extension matches `extension`
/// (case-insensitive), depth-first with entries sorted by file name.
pub fn discover_documents(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if has_extension(entry.path(), extension) {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}

pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// File name without its extension.
pub fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::{base_name, discover_documents, has_extension};

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(path, b"stub").expect("write file");
    }

    #[test]
    fn finds_matching_files_at_every_depth_exactly_once() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("Data");
        touch(&root.join("Report.docx"));
        touch(&root.join("Report").join("Chart.DOCX"));
        touch(&root.join("Report").join("Deep").join("Deeper").join("Notes.docx"));
        touch(&root.join("readme.txt"));
        touch(&root.join("Report").join("image.png"));
        fs::create_dir_all(root.join("Folder.docx")).expect("dir with doc extension");

        let found = discover_documents(&root, "docx").expect("discover");
        assert_eq!(found.len(), 3);
        let unique = found.iter().collect::<BTreeSet<_>>();
        assert_eq!(unique.len(), 3);
        assert!(found.contains(&root.join("Report.docx")));
        assert!(found.contains(&root.join("Report").join("Chart.DOCX")));
        assert!(found.contains(&root.join("Report/Deep/Deeper/Notes.docx")));
        assert!(found.iter().all(|path| path.is_file()));
    }

    #[test]
    fn missing_root_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let error = discover_documents(&temp.path().join("absent"), "docx").expect_err("must fail");
        assert!(error.to_string().contains("failed to walk"));
    }

    #[test]
    fn extension_and_base_name_helpers() {
        assert!(has_extension(Path::new("a/B.DocX"), "docx"));
        assert!(!has_extension(Path::new("a/B.doc"), "docx"));
        assert!(!has_extension(Path::new("a/docx"), "docx"));
        assert_eq!(base_name(Path::new("a/Quarterly report.docx")), "Quarterly report");
        assert_eq!(base_name(Path::new("a/archive.tar.docx")), "archive.tar");
    }
}
