//
// document.rs
//
// C4: couples a text buffer with its parsed element tree; rebuilt on
// edit (spec §3, §4.4).
//

use std::fs;

use tower_lsp::lsp_types::{TextDocumentContentChangeEvent, TextDocumentItem};

use crate::buffer::TextBuffer;
use crate::elements::{self, Element};
use crate::error::{Result, ServerError};
use crate::path::NotePath;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: NotePath,
    pub path: NotePath,
    pub text: TextBuffer,
    pub elements: Vec<Element>,
}

impl Document {
    fn new(root: NotePath, path: NotePath, text: TextBuffer) -> Result<Self> {
        if !path.is_under(&root) {
            return Err(ServerError::BadPath(path.uri().to_string()));
        }
        let elements = elements::parse(&text);
        Ok(Self {
            root,
            path,
            text,
            elements,
        })
    }

    /// Reads the file from disk.
    pub fn load(root: NotePath, path: NotePath) -> Result<Self> {
        let contents = fs::read_to_string(path.as_path())
            .map_err(|source| ServerError::io(path.as_path(), source))?;
        Self::new(root, path, TextBuffer::new(&contents))
    }

    /// Constructs a document from an LSP `didOpen` payload (text given in
    /// the message, no disk read).
    pub fn from_open(root: NotePath, item: &TextDocumentItem) -> Result<Self> {
        let path = NotePath::from_uri(item.uri.clone())?;
        Self::new(root, path, TextBuffer::new(&item.text))
    }

    /// Applies a batch of LSP incremental content changes and re-parses.
    pub fn apply_change(&self, changes: &[TextDocumentContentChangeEvent]) -> Result<Self> {
        let mut edits = Vec::with_capacity(changes.len());
        for change in changes {
            match change.range {
                Some(range) => edits.push((range, change.text.clone())),
                None => {
                    // Full-document sync: replace wholesale.
                    return Self::new(
                        self.root.clone(),
                        self.path.clone(),
                        TextBuffer::new(&change.text),
                    );
                }
            }
        }
        let text = self.text.apply_edits(&edits)?;
        Self::new(self.root.clone(), self.path.clone(), text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> NotePath {
        NotePath::parse("/tmp/wiki").unwrap()
    }

    #[test]
    fn from_open_parses_elements() {
        let item = TextDocumentItem {
            uri: tower_lsp::lsp_types::Url::parse("file:///tmp/wiki/a.md").unwrap(),
            language_id: "markdown".to_string(),
            version: 0,
            text: "# Hello\n".to_string(),
        };
        let doc = Document::from_open(root(), &item).unwrap();
        assert_eq!(doc.elements.len(), 1);
    }

    #[test]
    fn path_must_be_under_root() {
        let item = TextDocumentItem {
            uri: tower_lsp::lsp_types::Url::parse("file:///tmp/elsewhere/a.md").unwrap(),
            language_id: "markdown".to_string(),
            version: 0,
            text: "# Hello\n".to_string(),
        };
        assert!(Document::from_open(root(), &item).is_err());
    }

    #[test]
    fn apply_change_reparses() {
        let item = TextDocumentItem {
            uri: tower_lsp::lsp_types::Url::parse("file:///tmp/wiki/a.md").unwrap(),
            language_id: "markdown".to_string(),
            version: 0,
            text: "# Hello\n".to_string(),
        };
        let doc = Document::from_open(root(), &item).unwrap();
        let change = TextDocumentContentChangeEvent {
            range: Some(tower_lsp::lsp_types::Range::new(
                tower_lsp::lsp_types::Position::new(0, 2),
                tower_lsp::lsp_types::Position::new(0, 7),
            )),
            range_length: None,
            text: "World".to_string(),
        };
        let doc2 = doc.apply_change(&[change]).unwrap();
        assert_eq!(doc2.text.text(), "# World\n");
        if let Element::Heading { text, .. } = &doc2.elements[0] {
            assert_eq!(text, "World");
        } else {
            unreachable!();
        }
    }
}
