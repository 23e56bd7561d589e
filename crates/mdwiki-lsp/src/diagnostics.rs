//
// diagnostics.rs
//
// C7: computes broken-reference, ambiguous-reference, and duplicate-
// heading diagnostics for every document in a folder (spec §4.7).
//

use std::collections::{BTreeMap, HashSet};

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity};

use crate::elements::Element;
use crate::folder::Folder;
use crate::path::NotePath;
use crate::resolver;

/// Diagnostics for every document in `folder`, including an empty `Vec`
/// for documents with no issues. This is required so the state manager
/// can diff against a previous map and publish "cleared" results.
pub fn diagnose_folder(folder: &Folder) -> BTreeMap<NotePath, Vec<Diagnostic>> {
    let mut out = BTreeMap::new();
    for document in folder.documents.values() {
        let mut diags = Vec::new();
        diagnose_links(document, folder, &mut diags);
        diagnose_duplicate_headings(&document.elements, &mut diags);
        out.insert(document.path.clone(), diags);
    }
    out
}

fn diagnose_links(
    document: &crate::document::Document,
    folder: &Folder,
    diags: &mut Vec<Diagnostic>,
) {
    for_each_wiki_link(&document.elements, &mut |link| {
        let Element::WikiLink {
            target_doc, range, ..
        } = link
        else {
            return;
        };

        if let Some(name) = target_doc {
            if resolver::is_ambiguous(folder, name) {
                diags.push(Diagnostic {
                    range: *range,
                    severity: Some(DiagnosticSeverity::WARNING),
                    message: format!("multiple notes named \"{name}\"; using the first in sorted path order"),
                    ..Diagnostic::default()
                });
            }
        }

        if resolver::resolve(document, link, folder).is_none() {
            diags.push(Diagnostic {
                range: *range,
                severity: Some(DiagnosticSeverity::WARNING),
                message: "broken reference".to_string(),
                ..Diagnostic::default()
            });
        }
    });
}

fn for_each_wiki_link<'a>(elements: &'a [Element], f: &mut impl FnMut(&'a Element)) {
    for element in elements {
        match element {
            Element::WikiLink { .. } => f(element),
            Element::Heading { children, .. } => for_each_wiki_link(children, f),
            _ => {}
        }
    }
}

fn diagnose_duplicate_headings(elements: &[Element], diags: &mut Vec<Diagnostic>) {
    let mut seen: HashSet<String> = HashSet::new();
    walk_headings(elements, &mut seen, diags);
}

fn walk_headings(elements: &[Element], seen: &mut HashSet<String>, diags: &mut Vec<Diagnostic>) {
    for element in elements {
        if let Element::Heading {
            text,
            range,
            children,
            ..
        } = element
        {
            let key = text.trim().to_lowercase();
            if !seen.insert(key) {
                diags.push(Diagnostic {
                    range: *range,
                    severity: Some(DiagnosticSeverity::INFORMATION),
                    message: format!("duplicate heading \"{text}\" (resolver uses the first occurrence)"),
                    ..Diagnostic::default()
                });
            }
            walk_headings(children, seen, diags);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use tower_lsp::lsp_types::{Position, Range, TextDocumentItem, Url};

    fn root() -> NotePath {
        NotePath::parse("/tmp/wiki").unwrap()
    }

    fn doc(name: &str, text: &str) -> Document {
        let item = TextDocumentItem {
            uri: Url::parse(&format!("file:///tmp/wiki/{name}")).unwrap(),
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
    fn broken_link_reported() {
        let b = doc("b.md", "[[a]]");
        let folder = folder_of(vec![b.clone()]);
        let diags = diagnose_folder(&folder);
        let b_diags = &diags[&b.path];
        assert_eq!(b_diags.len(), 1);
        assert_eq!(b_diags[0].range, Range::new(Position::new(0, 0), Position::new(0, 5)));
    }

    #[test]
    fn resolved_link_has_no_diagnostic() {
        let a = doc("a.md", "# Hello\n");
        let b = doc("b.md", "[[a]]");
        let folder = folder_of(vec![a.clone(), b.clone()]);
        let diags = diagnose_folder(&folder);
        assert!(diags[&a.path].is_empty());
        assert!(diags[&b.path].is_empty());
    }

    #[test]
    fn every_document_present_even_when_empty() {
        let a = doc("a.md", "# Hello\n");
        let folder = folder_of(vec![a.clone()]);
        let diags = diagnose_folder(&folder);
        assert!(diags.contains_key(&a.path));
        assert!(diags[&a.path].is_empty());
    }

    #[test]
    fn duplicate_heading_is_informational() {
        let a = doc("a.md", "# One\n# One\n");
        let folder = folder_of(vec![a.clone()]);
        let diags = diagnose_folder(&folder);
        let a_diags = &diags[&a.path];
        assert_eq!(a_diags.len(), 1);
        assert_eq!(a_diags[0].severity, Some(DiagnosticSeverity::INFORMATION));
    }

    #[test]
    fn ambiguous_target_reported_per_link() {
        let a1 = doc("a.md", "# A1\n");
        let item = TextDocumentItem {
            uri: Url::parse("file:///tmp/wiki/sub/a.md").unwrap(),
            language_id: "markdown".to_string(),
            version: 0,
            text: "# A2\n".to_string(),
        };
        let a2 = Document::from_open(root(), &item).unwrap();
        let b = doc("b.md", "[[a]]\n[[a]]");
        let folder = folder_of(vec![a1, a2, b.clone()]);
        let diags = diagnose_folder(&folder);
        // each of the two links gets an ambiguity diagnostic; neither
        // resolver call fails (resolution succeeds, just ambiguous).
        assert_eq!(diags[&b.path].len(), 2);
    }
}
