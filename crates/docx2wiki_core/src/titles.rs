use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::discover::base_name;

/// Collision-free page titles for a fixed set of documents.
///
/// A base name shared by several files gets `" 1"`, `" 2"`, ... appended in
/// input order, skipping any suffix that would equal another file's title; a
/// unique base name is used as is. Built once, never mutated.
#[derive(Debug, Clone, Default)]
pub struct TitleMap {
    entries: Vec<(PathBuf, String)>,
    index: HashMap<PathBuf, usize>,
}

impl TitleMap {
    pub fn build(files: &[PathBuf]) -> Self {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for file in files {
            *counts.entry(base_name(file)).or_insert(0) += 1;
        }

        // Unique base names keep their title, so suffixed titles must avoid them.
        let mut taken: HashSet<String> = counts
            .iter()
            .filter(|(_, count)| **count == 1)
            .map(|(base, _)| base.clone())
            .collect();
        let mut next_suffix: HashMap<String, usize> = HashMap::new();
        let mut entries = Vec::with_capacity(files.len());
        let mut index = HashMap::with_capacity(files.len());
        for file in files {
            if index.contains_key(file) {
                continue;
            }
            let base = base_name(file);
            let title = if counts.get(&base).copied().unwrap_or(0) > 1 {
                let suffix = next_suffix.entry(base.clone()).or_insert(0);
                loop {
                    *suffix += 1;
                    let candidate = format!("{base} {suffix}");
                    if taken.insert(candidate.clone()) {
                        break candidate;
                    }
                }
            } else {
                base
            };
            index.insert(file.clone(), entries.len());
            entries.push((file.clone(), title));
        }

        Self { entries, index }
    }

    pub fn get(&self, path: &Path) -> Option<&str> {
        self.index
            .get(path)
            .map(|position| self.entries[*position].1.as_str())
    }

    /// Title for `path`, falling back to its base name when unmapped.
    pub fn title_for(&self, path: &Path) -> String {
        self.get(path)
            .map(ToString::to_string)
            .unwrap_or_else(|| base_name(path))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.entries
            .iter()
            .map(|(path, title)| (path.as_path(), title.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
