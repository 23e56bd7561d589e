//
// folder.rs
//
// C5: maps document paths to Documents within one workspace root; loads
// from disk; supports add/update/remove (spec §3, §4.5).
//

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use walkdir::WalkDir;

use crate::document::Document;
use crate::path::NotePath;

#[derive(Debug, Clone)]
pub struct Folder {
    pub name: String,
    pub root: NotePath,
    pub documents: BTreeMap<NotePath, Document>,
}

impl Folder {
    /// Recursively scans `root` for `**/*.md` files (case-insensitive)
    /// and loads each as a `Document`. Returns `None` if `root` doesn't
    /// exist; a folder with zero notes is still `Some` (empty), matching
    /// the source's behavior.
    pub fn try_load(name: String, root: NotePath) -> Option<Self> {
        if !root.as_path().exists() {
            return None;
        }

        let mut documents = BTreeMap::new();
        let mut visited_dirs: HashSet<PathBuf> = HashSet::new();

        let walker = WalkDir::new(root.as_path()).follow_links(true);
        for entry in walker.into_iter().filter_entry(|e| {
            if !e.file_type().is_dir() {
                return true;
            }
            match e.path().canonicalize() {
                Ok(canon) => visited_dirs.insert(canon),
                Err(_) => true,
            }
        }) {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let is_markdown = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("md"))
                .unwrap_or(false);
            if !is_markdown {
                continue;
            }

            let path = match NotePath::from_fs_path(entry.path()) {
                Ok(p) => p,
                Err(_) => continue,
            };
            match Document::load(root.clone(), path.clone()) {
                Ok(doc) => {
                    documents.insert(path, doc);
                }
                Err(_) => continue,
            }
        }

        Some(Self {
            name,
            root,
            documents,
        })
    }

    pub fn update_document(&self, document: Document) -> Self {
        let mut documents = self.documents.clone();
        documents.insert(document.path.clone(), document);
        Self {
            name: self.name.clone(),
            root: self.root.clone(),
            documents,
        }
    }

    pub fn remove_document(&self, path: &NotePath) -> Self {
        let mut documents = self.documents.clone();
        documents.remove(path);
        Self {
            name: self.name.clone(),
            root: self.root.clone(),
            documents,
        }
    }

    pub fn get(&self, path: &NotePath) -> Option<&Document> {
        self.documents.get(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_markdown_files_recursively() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.md"), "# A\n").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/b.MD"), "# B\n").unwrap();
        fs::write(tmp.path().join("ignore.txt"), "nope").unwrap();

        let root = NotePath::from_fs_path(tmp.path()).unwrap();
        let folder = Folder::try_load("wiki".to_string(), root).unwrap();
        assert_eq!(folder.documents.len(), 2);
    }

    #[test]
    fn missing_root_returns_none() {
        let root = NotePath::parse("/nonexistent/path/for/mdwiki/test").unwrap();
        assert!(Folder::try_load("wiki".to_string(), root).is_none());
    }

    #[test]
    fn empty_folder_is_some() {
        let tmp = tempfile::tempdir().unwrap();
        let root = NotePath::from_fs_path(tmp.path()).unwrap();
        let folder = Folder::try_load("wiki".to_string(), root).unwrap();
        assert!(folder.documents.is_empty());
    }

    #[test]
    fn update_then_remove_restores_original() {
        let tmp = tempfile::tempdir().unwrap();
        let root = NotePath::from_fs_path(tmp.path()).unwrap();
        let folder = Folder::try_load("wiki".to_string(), root.clone()).unwrap();

        let path = NotePath::from_fs_path(&tmp.path().join("a.md")).unwrap();
        let item = tower_lsp::lsp_types::TextDocumentItem {
            uri: path.uri().clone(),
            language_id: "markdown".to_string(),
            version: 0,
            text: "# A\n".to_string(),
        };
        let doc = Document::from_open(root, &item).unwrap();
        assert_eq!(doc.elements.len(), 1);

        let updated = folder.update_document(doc);
        assert_eq!(updated.documents.len(), 1);
        let restored = updated.remove_document(&path);
        assert_eq!(restored.documents, folder.documents);
    }
}
