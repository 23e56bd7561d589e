//
// resolver.rs
//
// C6: resolves wiki links to target documents/headings within a folder;
// also backs completion, definition, and hover (spec §4.6).
//

use tower_lsp::lsp_types::{Position, Range};

use crate::document::Document;
use crate::elements::Element;
use crate::folder::Folder;
use crate::path::NotePath;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub path: NotePath,
    pub heading_range: Option<Range>,
    pub heading_scope: Option<Range>,
}

/// Whether resolving `target_doc` by note name hit more than one
/// candidate. Exposed separately so the diagnostics engine can report
/// the collision without re-running resolution.
pub fn is_ambiguous(folder: &Folder, target_doc: &str) -> bool {
    matching_documents(folder, target_doc).len() > 1
}

fn matching_documents<'a>(folder: &'a Folder, target_doc: &str) -> Vec<&'a Document> {
    let mut matches: Vec<&Document> = folder
        .documents
        .values()
        .filter(|doc| {
            doc.path
                .note_name()
                .map(|name| name.eq_ignore_ascii_case(target_doc))
                .unwrap_or(false)
        })
        .collect();
    matches.sort_by(|a, b| a.path.cmp(&b.path));
    matches
}

/// Resolves a `WikiLink` element against `source` within `folder`.
/// Follows the rules in order: same-document anchor, note-name lookup
/// (first in sorted canonical-path order on ambiguity), heading lookup.
pub fn resolve(source: &Document, link: &Element, folder: &Folder) -> Option<ResolvedTarget> {
    let (target_doc, target_heading) = match link {
        Element::WikiLink {
            target_doc,
            target_heading,
            ..
        } => (target_doc.clone(), target_heading.clone()),
        _ => return None,
    };

    let target = match target_doc {
        None => source,
        Some(name) => {
            let matches = matching_documents(folder, &name);
            matches.into_iter().next()?
        }
    };

    match target_heading {
        None => Some(ResolvedTarget {
            path: target.path.clone(),
            heading_range: None,
            heading_scope: None,
        }),
        Some(heading) => {
            let found = find_heading(&target.elements, &heading);
            found.map(|(range, scope)| ResolvedTarget {
                path: target.path.clone(),
                heading_range: Some(range),
                heading_scope: Some(scope),
            })
        }
    }
}

/// Pre-order search for the first heading whose trimmed text matches
/// `wanted`, case-insensitively.
fn find_heading(elements: &[Element], wanted: &str) -> Option<(Range, Range)> {
    let wanted = wanted.trim();
    for element in elements {
        if let Element::Heading {
            text,
            range,
            scope,
            children,
            ..
        } = element
        {
            if text.trim().eq_ignore_ascii_case(wanted) {
                return Some((*range, *scope));
            }
            if let Some(found) = find_heading(children, wanted) {
                return Some(found);
            }
        }
    }
    None
}

/// The wiki link, if any, whose range contains `pos` in `source`.
pub fn link_at_position<'a>(source: &'a Document, pos: Position) -> Option<&'a Element> {
    fn search(elements: &[Element], pos: Position) -> Option<&Element> {
        for element in elements {
            match element {
                Element::WikiLink { range, .. } if contains(*range, pos) => return Some(element),
                Element::Heading { children, .. } => {
                    if let Some(found) = search(children, pos) {
                        return Some(found);
                    }
                }
                _ => {}
            }
        }
        None
    }
    search(&source.elements, pos)
}

fn contains(range: Range, pos: Position) -> bool {
    (pos.line, pos.character) >= (range.start.line, range.start.character)
        && (pos.line, pos.character) <= (range.end.line, range.end.character)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCandidate {
    pub label: String,
}

/// Enumerates completion candidates for a partially-typed wiki link,
/// filtered by substring (case-insensitive) on `partial` and sorted by
/// name. `partial` is the text already typed between `[[` (and an
/// optional `#`, exclusive) and the cursor.
pub fn completion_candidates(
    folder: &Folder,
    target_doc: Option<&str>,
    partial: &str,
) -> Vec<CompletionCandidate> {
    let partial_lower = partial.to_lowercase();
    let mut candidates: Vec<CompletionCandidate> = match target_doc {
        None => folder
            .documents
            .values()
            .filter_map(|doc| doc.path.note_name())
            .filter(|name| name.to_lowercase().contains(&partial_lower))
            .map(|name| CompletionCandidate {
                label: name.to_string(),
            })
            .collect(),
        Some(doc_name) => {
            let matches = matching_documents(folder, doc_name);
            let target = match matches.into_iter().next() {
                Some(doc) => doc,
                None => return Vec::new(),
            };
            let mut headings = Vec::new();
            collect_heading_names(&target.elements, &mut headings);
            headings
                .into_iter()
                .filter(|name| name.to_lowercase().contains(&partial_lower))
                .map(|name| CompletionCandidate { label: name })
                .collect()
        }
    };
    candidates.sort_by(|a, b| a.label.cmp(&b.label));
    candidates.dedup();
    candidates
}

fn collect_heading_names(elements: &[Element], out: &mut Vec<String>) {
    for element in elements {
        if let Element::Heading { text, children, .. } = element {
            out.push(text.clone());
            collect_heading_names(children, out);
        }
    }
}
