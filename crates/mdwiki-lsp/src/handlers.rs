//
// handlers.rs
//
// Pure functions from `&State` (plus request params) to LSP responses.
// Kept free of I/O and free of the client handle so they're trivial to
// unit test (spec §4.6, §6).
//

use tower_lsp::lsp_types::*;

use crate::elements::Element;
use crate::path::NotePath;
use crate::resolver;
use crate::state::State;

// ============================================================================
// Folding Range
// ============================================================================

pub fn folding_range(state: &State, uri: &Url) -> Option<Vec<FoldingRange>> {
    let path = NotePath::from_uri(uri.clone()).ok()?;
    let document = state.document(&path)?;
    let mut ranges = Vec::new();
    collect_folding_ranges(&document.elements, &mut ranges);
    Some(ranges)
}

fn collect_folding_ranges(elements: &[Element], ranges: &mut Vec<FoldingRange>) {
    for element in elements {
        if let Element::Heading { scope, children, .. } = element {
            ranges.push(FoldingRange {
                start_line: scope.start.line,
                start_character: Some(scope.start.character),
                end_line: scope.end.line,
                end_character: Some(scope.end.character),
                kind: Some(FoldingRangeKind::Region),
                collapsed_text: None,
            });
            collect_folding_ranges(children, ranges);
        }
    }
}

// ============================================================================
// Document Symbol
// ============================================================================

pub fn document_symbol(
    state: &State,
    uri: &Url,
    hierarchical: bool,
) -> Option<DocumentSymbolResponse> {
    let path = NotePath::from_uri(uri.clone()).ok()?;
    let document = state.document(&path)?;

    if hierarchical {
        let symbols: Vec<DocumentSymbol> = document
            .elements
            .iter()
            .filter_map(heading_to_symbol)
            .collect();
        Some(DocumentSymbolResponse::Nested(symbols))
    } else {
        let mut flat = Vec::new();
        collect_flat_symbols(&document.elements, uri, &mut flat);
        Some(DocumentSymbolResponse::Flat(flat))
    }
}

#[allow(deprecated)] // `DocumentSymbol::deprecated` has no replacement field yet.
fn heading_to_symbol(element: &Element) -> Option<DocumentSymbol> {
    let Element::Heading {
        text,
        range,
        scope,
        children,
        ..
    } = element
    else {
        return None;
    };

    let nested: Vec<DocumentSymbol> = children.iter().filter_map(heading_to_symbol).collect();

    Some(DocumentSymbol {
        name: text.clone(),
        detail: None,
        kind: SymbolKind::STRING,
        tags: None,
        deprecated: None,
        range: *scope,
        selection_range: *range,
        children: if nested.is_empty() { None } else { Some(nested) },
    })
}

fn collect_flat_symbols(elements: &[Element], uri: &Url, out: &mut Vec<SymbolInformation>) {
    for element in elements {
        if let Element::Heading {
            level,
            text,
            range,
            children,
            ..
        } = element
        {
            out.push(flat_symbol(uri, *level, text, *range));
            collect_flat_symbols(children, uri, out);
        }
    }
}

#[allow(deprecated)]
fn flat_symbol(uri: &Url, level: u8, text: &str, range: Range) -> SymbolInformation {
    SymbolInformation {
        name: format!("H{level}: {text}"),
        kind: SymbolKind::STRING,
        tags: None,
        deprecated: None,
        location: Location {
            uri: uri.clone(),
            range,
        },
        container_name: None,
    }
}

// ============================================================================
// Workspace Symbol
// ============================================================================

/// Flat, case-insensitive substring search across every folder's
/// headings.
pub fn workspace_symbol(state: &State, query: &str) -> Option<Vec<SymbolInformation>> {
    let query_lower = query.to_lowercase();
    let mut out = Vec::new();
    for folder in &state.folders {
        for document in folder.documents.values() {
            collect_workspace_matches(&document.elements, document.path.uri(), document.path.note_name(), &query_lower, &mut out);
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

#[allow(deprecated)]
fn collect_workspace_matches(
    elements: &[Element],
    uri: &Url,
    note_name: Option<&str>,
    query_lower: &str,
    out: &mut Vec<SymbolInformation>,
) {
    for element in elements {
        if let Element::Heading {
            text,
            range,
            children,
            ..
        } = element
        {
            if text.to_lowercase().contains(query_lower) {
                out.push(SymbolInformation {
                    name: text.clone(),
                    kind: SymbolKind::STRING,
                    tags: None,
                    deprecated: None,
                    location: Location {
                        uri: uri.clone(),
                        range: *range,
                    },
                    container_name: note_name.map(str::to_string),
                });
            }
            collect_workspace_matches(children, uri, note_name, query_lower, out);
        }
    }
}

// ============================================================================
// Completion
// ============================================================================

pub fn completion(state: &State, uri: &Url, position: Position) -> Option<CompletionResponse> {
    let path = NotePath::from_uri(uri.clone()).ok()?;
    let folder = state.folder_for(&path)?;
    let document = state.document(&path)?;

    let (target_doc, partial) = partial_link_at(document, position)?;

    let candidates = resolver::completion_candidates(folder, target_doc.as_deref(), &partial);
    if candidates.is_empty() {
        return None;
    }

    let items = candidates
        .into_iter()
        .map(|c| CompletionItem {
            label: c.label,
            kind: Some(CompletionItemKind::REFERENCE),
            ..Default::default()
        })
        .collect();

    Some(CompletionResponse::List(CompletionList {
        is_incomplete: true,
        items,
    }))
}

/// If `position` sits inside an (possibly unterminated) `[[...]]` on its
/// line, returns `(target_doc, partial_text_before_cursor)`. `target_doc`
/// is `Some` once a `#` has been typed in the partial.
fn partial_link_at(
    document: &crate::document::Document,
    position: Position,
) -> Option<(Option<String>, String)> {
    let line = document.text.line(position.line as usize);
    let chars: Vec<char> = line.chars().collect();
    let cursor = (position.character as usize).min(chars.len());

    let mut open = None;
    let mut i = 0;
    while i + 1 < cursor {
        if chars[i] == '[' && chars[i + 1] == '[' {
            open = Some(i + 2);
        }
        i += 1;
    }
    let start = open?;
    if start > cursor {
        return None;
    }

    // Don't cross a `]]` that closes before the cursor.
    let between: String = chars[start..cursor].iter().collect();
    if between.contains("]]") {
        return None;
    }

    match between.split_once('#') {
        Some((doc, heading)) => Some((Some(doc.trim().to_string()), heading.to_string())),
        None => Some((None, between)),
    }
}

// ============================================================================
// Hover
// ============================================================================

pub fn hover(state: &State, uri: &Url, position: Position) -> Option<Hover> {
    let path = NotePath::from_uri(uri.clone()).ok()?;
    let folder = state.folder_for(&path)?;
    let document = state.document(&path)?;

    let link = resolver::link_at_position(document, position)?;
    let resolved = resolver::resolve(document, link, folder)?;
    let target = folder.get(&resolved.path)?;

    let text = match resolved.heading_scope {
        Some(scope) => target.text.substring(scope),
        None => target.text.text(),
    };

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: text,
        }),
        range: Some(link.range()),
    })
}

// ============================================================================
// Goto Definition
// ============================================================================

pub fn goto_definition(
    state: &State,
    uri: &Url,
    position: Position,
) -> Option<GotoDefinitionResponse> {
    let path = NotePath::from_uri(uri.clone()).ok()?;
    let folder = state.folder_for(&path)?;
    let document = state.document(&path)?;

    let link = resolver::link_at_position(document, position)?;
    let resolved = resolver::resolve(document, link, folder)?;
    let target = folder.get(&resolved.path)?;

    let range = resolved.heading_scope.unwrap_or_else(|| target.text.full_range());

    Some(GotoDefinitionResponse::Scalar(Location {
        uri: resolved.path.uri().clone(),
        range,
    }))
}
