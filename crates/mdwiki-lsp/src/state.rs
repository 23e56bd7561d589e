//
// state.rs
//
// C8: the sole mutable state cell. Handlers compute a new `State` value
// and commit it via `update_state`, which diffs diagnostics against the
// last-published map and enqueues publishes for whatever changed
// (spec §4.8).
//

use std::collections::BTreeMap;

use tower_lsp::lsp_types::{Diagnostic, Url};

use crate::diagnostics;
use crate::document::Document;
use crate::folder::Folder;
use crate::path::NotePath;
use crate::queue::{Publish, QueueHandle};

#[derive(Debug, Clone, Default)]
pub struct State {
    pub folders: Vec<Folder>,
    last_published: BTreeMap<Url, BTreeMap<NotePath, Vec<Diagnostic>>>,
    pub revision: u64,
}

impl State {
    pub fn new(folders: Vec<Folder>) -> Self {
        Self {
            folders,
            last_published: BTreeMap::new(),
            revision: 0,
        }
    }

    pub fn folder_for(&self, path: &NotePath) -> Option<&Folder> {
        self.folders.iter().find(|f| path.is_under(&f.root))
    }

    pub fn folder_for_mut_index(&self, path: &NotePath) -> Option<usize> {
        self.folders.iter().position(|f| path.is_under(&f.root))
    }

    pub fn document(&self, path: &NotePath) -> Option<&Document> {
        self.folder_for(path)?.get(path)
    }

    /// Returns a new state with `document` inserted into whichever
    /// folder it belongs to. No-op (returns a clone) if no folder
    /// contains it; the caller is responsible for `UnknownDocument`.
    pub fn with_document_updated(&self, document: Document) -> Self {
        let mut next = self.clone_without_history();
        if let Some(idx) = self.folder_for_mut_index(&document.path) {
            next.folders[idx] = next.folders[idx].update_document(document);
        }
        next
    }

    pub fn with_document_removed(&self, path: &NotePath) -> Self {
        let mut next = self.clone_without_history();
        if let Some(idx) = self.folder_for_mut_index(path) {
            next.folders[idx] = next.folders[idx].remove_document(path);
        }
        next
    }

    fn clone_without_history(&self) -> Self {
        Self {
            folders: self.folders.clone(),
            last_published: self.last_published.clone(),
            revision: self.revision,
        }
    }
}

/// Diffs `new_state`'s per-folder diagnostics against what was last
/// published, enqueues a publish for every `(path, diagnostics)` pair in
/// any folder whose diagnostic map changed, and returns the committed
/// state (with `last_published` replaced and `revision` incremented).
///
/// If nothing changed, returns `new_state` with the *old* `revision` and
/// `last_published` intact. The source treats a no-op update as not a
/// "successful update" for the purpose of revision monotonicity.
pub fn update_state(previous: &State, new_state: State, queue: &QueueHandle) -> State {
    let mut any_changed = false;
    let mut last_published = previous.last_published.clone();

    for folder in &new_state.folders {
        let new_diag = diagnostics::diagnose_folder(folder);
        let root_uri = folder.root.uri().clone();
        let changed = last_published.get(&root_uri) != Some(&new_diag);
        if !changed {
            continue;
        }
        any_changed = true;
        for (path, diags) in &new_diag {
            queue.enqueue(Publish {
                uri: path.uri().clone(),
                diagnostics: diags.clone(),
            });
        }
        last_published.insert(root_uri, new_diag);
    }

    if !any_changed {
        return State {
            folders: new_state.folders,
            last_published: previous.last_published.clone(),
            revision: previous.revision,
        };
    }

    State {
        folders: new_state.folders,
        last_published,
        revision: previous.revision + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueHandle;
    use tower_lsp::lsp_types::TextDocumentItem;

    fn root() -> NotePath {
        NotePath::parse("/tmp/wiki").unwrap()
    }

    fn doc(name: &str, text: &str) -> Document {
        let item = TextDocumentItem {
            uri: tower_lsp::lsp_types::Url::parse(&format!("file:///tmp/wiki/{name}")).unwrap(),
            language_id: "markdown".to_string(),
            version: 0,
            text: text.to_string(),
        };
        Document::from_open(root(), &item).unwrap()
    }

    fn folder_of(docs: Vec<Document>) -> Folder {
        let mut documents = std::collections::BTreeMap::new();
        for d in docs {
            documents.insert(d.path.clone(), d);
        }
        Folder {
            name: "wiki".to_string(),
            root: root(),
            documents,
        }
    }

    #[test]
    fn first_update_enqueues_every_document() {
        let handle = QueueHandle::noop();
        let b = doc("b.md", "[[a]]");
        let state0 = State::new(vec![]);
        let state1 = State::new(vec![folder_of(vec![b])]);
        let committed = update_state(&state0, state1, &handle);
        assert_eq!(committed.revision, 1);
    }

    #[test]
    fn no_change_leaves_revision_untouched() {
        let handle = QueueHandle::noop();
        let a = doc("a.md", "# Hello\n");
        let state0 = State::new(vec![folder_of(vec![a.clone()])]);
        let state1 = update_state(&State::new(vec![]), state0, &handle);
        let state2 = update_state(&state1, State::new(state1.folders.clone()), &handle);
        assert_eq!(state1.revision, state2.revision);
    }

    #[test]
    fn revision_strictly_increases_on_change() {
        let handle = QueueHandle::noop();
        let b = doc("b.md", "[[a]]");
        let state0 = State::new(vec![]);
        let state1 = update_state(&state0, State::new(vec![folder_of(vec![b.clone()])]), &handle);

        let a = doc("a.md", "# Hello\n");
        let folder2 = folder_of(vec![b, a]);
        let state2 = update_state(&state1, State::new(vec![folder2]), &handle);
        assert!(state2.revision > state1.revision);
    }
}
