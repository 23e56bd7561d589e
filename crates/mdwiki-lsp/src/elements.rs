//
// elements.rs
//
// C3: parses a `TextBuffer` into the semantic element tree spec §3/§4.3
// describes. Total: never fails, malformed link-like sequences are
// simply not recognized.
//

use tower_lsp::lsp_types::{Position, Range};

use crate::buffer::TextBuffer;

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Heading {
        level: u8,
        text: String,
        range: Range,
        scope: Range,
        children: Vec<Element>,
    },
    WikiLink {
        target_doc: Option<String>,
        target_heading: Option<String>,
        range: Range,
    },
    /// Other Markdown link forms (`[text](target)`). Captured structurally
    /// but not yet resolved as references (spec leaves this open; see
    /// DESIGN.md).
    InlineRef {
        text: String,
        target: String,
        range: Range,
    },
}

impl Element {
    pub fn range(&self) -> Range {
        match self {
            Element::Heading { range, .. } => *range,
            Element::WikiLink { range, .. } => *range,
            Element::InlineRef { range, .. } => *range,
        }
    }
}

/// Parses the full buffer into a forest of top-level elements. Headings
/// nest by level; wiki links and inline refs are always leaves, attached
/// at the top level (callers that need "the wiki links inside heading H"
/// walk H's `scope` against the flat link list, as the resolver does).
pub fn parse(buffer: &TextBuffer) -> Vec<Element> {
    let mut headings_flat: Vec<(u8, String, Range)> = Vec::new();
    let mut links: Vec<Element> = Vec::new();

    let mut in_fence = false;
    let mut fence_char = '`';

    for line_idx in 0..buffer.line_count() {
        let line = buffer.line(line_idx);
        let trimmed_start = line.trim_start();

        let is_fence_delim = trimmed_start.starts_with("```") || trimmed_start.starts_with("~~~");
        if is_fence_delim {
            let ch = trimmed_start.chars().next().unwrap();
            if !in_fence {
                in_fence = true;
                fence_char = ch;
            } else if ch == fence_char {
                in_fence = false;
            }
            continue;
        }

        if in_fence {
            continue;
        }

        let is_indented_code = line.starts_with("    ") || line.starts_with('\t');

        if !is_indented_code {
            if let Some((level, text)) = parse_atx_heading(&line) {
                let range = Range::new(
                    Position::new(line_idx as u32, 0),
                    Position::new(line_idx as u32, utf16_len(&line)),
                );
                headings_flat.push((level, text, range));
                continue;
            }
        }

        collect_links_in_line(&line, line_idx as u32, &mut links);
    }

    let doc_end = buffer.full_range().end;
    let mut roots = nest_headings(headings_flat, doc_end);
    roots.extend(links);
    roots
}

fn utf16_len(s: &str) -> u32 {
    s.chars().map(|c| c.len_utf16()).sum::<usize>() as u32
}

/// Recognizes `#`..`######` followed by a space; returns the heading
/// level and its trimmed text. Callers are expected to have already
/// excluded indented-code lines.
fn parse_atx_heading(line: &str) -> Option<(u8, String)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }

    let rest = &trimmed[hashes..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }

    let text = rest.trim().to_string();
    Some((hashes as u8, text))
}

struct OpenHeading {
    level: u8,
    text: String,
    range: Range,
    children: Vec<Element>,
}

fn nest_headings(flat: Vec<(u8, String, Range)>, doc_end: Position) -> Vec<Element> {
    let mut stack: Vec<OpenHeading> = Vec::new();
    let mut roots: Vec<Element> = Vec::new();

    for (level, text, range) in flat {
        close_while(&mut stack, &mut roots, level, range.start);
        stack.push(OpenHeading {
            level,
            text,
            range,
            children: Vec::new(),
        });
    }

    close_while(&mut stack, &mut roots, 0, doc_end);
    roots
}

/// Pops and finalizes every open heading whose level is `>= min_level`
/// (use `min_level = 0` to close everything at EOF), attaching each as a
/// child of the new top of stack, or as a root if the stack empties.
fn close_while(stack: &mut Vec<OpenHeading>, roots: &mut Vec<Element>, min_level: u8, end: Position) {
    loop {
        let should_close = match stack.last() {
            Some(top) => min_level == 0 || top.level >= min_level,
            None => false,
        };
        if !should_close {
            break;
        }
        let open = stack.pop().unwrap();
        let element = Element::Heading {
            level: open.level,
            text: open.text,
            range: open.range,
            scope: Range::new(open.range.start, end),
            children: open.children,
        };
        match stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None => roots.push(element),
        }
    }
}

/// Finds non-overlapping `[[...]]` and `[text](target)` occurrences on a
/// single line (wiki links and Markdown reference links don't span
/// lines in this parser).
fn collect_links_in_line(line: &str, line_idx: u32, out: &mut Vec<Element>) {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '[' && chars.get(i + 1) == Some(&'[') {
            if let Some(close) = find_wiki_close(&chars, i + 2) {
                let payload: String = chars[i + 2..close].iter().collect();
                if let Some(link) = build_wiki_link(&payload, line_idx, utf16_offset(&chars, i), utf16_offset(&chars, close + 2)) {
                    out.push(link);
                }
                i = close + 2;
                continue;
            }
        } else if chars[i] == '[' {
            if let Some((text_end, target, consumed_end)) = parse_inline_ref(&chars, i) {
                let text: String = chars[i + 1..text_end].iter().collect();
                if !text.is_empty() && !target.is_empty() {
                    out.push(Element::InlineRef {
                        text,
                        target,
                        range: Range::new(
                            Position::new(line_idx, utf16_offset(&chars, i)),
                            Position::new(line_idx, utf16_offset(&chars, consumed_end)),
                        ),
                    });
                }
                i = consumed_end;
                continue;
            }
        }
        i += 1;
    }
}

fn utf16_offset(chars: &[char], idx: usize) -> u32 {
    chars[..idx].iter().map(|c| c.len_utf16()).sum::<usize>() as u32
}

fn find_wiki_close(chars: &[char], from: usize) -> Option<usize> {
    let mut j = from;
    while j + 1 < chars.len() {
        if chars[j] == ']' && chars[j + 1] == ']' {
            return Some(j);
        }
        j += 1;
    }
    None
}

fn build_wiki_link(payload: &str, line_idx: u32, start_col: u32, end_col: u32) -> Option<Element> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (target_doc, target_heading) = if let Some(rest) = trimmed.strip_prefix('#') {
        (None, Some(rest.to_string()))
    } else if let Some(hash_idx) = trimmed.find('#') {
        let (doc, heading) = trimmed.split_at(hash_idx);
        (Some(doc.to_string()), Some(heading[1..].to_string()))
    } else {
        (Some(trimmed.to_string()), None)
    };

    Some(Element::WikiLink {
        target_doc,
        target_heading,
        range: Range::new(Position::new(line_idx, start_col), Position::new(line_idx, end_col)),
    })
}

/// Recognizes `[text](target)`. Returns the index of the `]`, the target
/// string, and the index just past the closing `)`.
fn parse_inline_ref(chars: &[char], start: usize) -> Option<(usize, String, usize)> {
    let mut j = start + 1;
    while j < chars.len() && chars[j] != ']' && chars[j] != '[' {
        j += 1;
    }
    if j >= chars.len() || chars[j] != ']' {
        return None;
    }
    let text_end = j;
    if chars.get(j + 1) != Some(&'(') {
        return None;
    }
    let mut k = j + 2;
    while k < chars.len() && chars[k] != ')' {
        k += 1;
    }
    if k >= chars.len() {
        return None;
    }
    let target: String = chars[j + 2..k].iter().collect();
    Some((text_end, target, k + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headings_of(elements: &[Element]) -> Vec<&Element> {
        elements
            .iter()
            .filter(|e| matches!(e, Element::Heading { .. }))
            .collect()
    }

    #[test]
    fn single_heading() {
        let buf = TextBuffer::new("# Hello\n");
        let elements = parse(&buf);
        let headings = headings_of(&elements);
        assert_eq!(headings.len(), 1);
        if let Element::Heading { text, level, scope, .. } = headings[0] {
            assert_eq!(text, "Hello");
            assert_eq!(*level, 1);
            assert_eq!(scope.start, Position::new(0, 0));
            assert_eq!(scope.end, Position::new(1, 0));
        } else {
            unreachable!();
        }
    }

    #[test]
    fn nested_headings() {
        let buf = TextBuffer::new("# A\n## B\n# C\n");
        let elements = parse(&buf);
        let headings = headings_of(&elements);
        assert_eq!(headings.len(), 2);
        if let Element::Heading { text, children, .. } = headings[0] {
            assert_eq!(text, "A");
            assert_eq!(children.len(), 1);
        } else {
            unreachable!();
        }
    }

    #[test]
    fn heading_scope_ends_at_next_equal_or_lower() {
        let buf = TextBuffer::new("# One\n## Two\n");
        let elements = parse(&buf);
        let headings = headings_of(&elements);
        if let Element::Heading { children, .. } = headings[0] {
            if let Element::Heading { scope, .. } = &children[0] {
                assert_eq!(scope.start, Position::new(1, 0));
                assert_eq!(scope.end, Position::new(2, 0));
            } else {
                unreachable!();
            }
        } else {
            unreachable!();
        }
    }

    #[test]
    fn headings_not_recognized_in_fenced_code() {
        let buf = TextBuffer::new("```\n# not a heading\n```\n# Real\n");
        let elements = parse(&buf);
        let headings = headings_of(&elements);
        assert_eq!(headings.len(), 1);
    }

    #[test]
    fn headings_not_recognized_in_indented_code() {
        let buf = TextBuffer::new("    # not a heading\n# Real\n");
        let elements = parse(&buf);
        let headings = headings_of(&elements);
        assert_eq!(headings.len(), 1);
    }

    #[test]
    fn wiki_link_forms() {
        let buf = TextBuffer::new("[[doc]] [[doc#heading]] [[#heading]]\n");
        let elements = parse(&buf);
        let links: Vec<&Element> = elements
            .iter()
            .filter(|e| matches!(e, Element::WikiLink { .. }))
            .collect();
        assert_eq!(links.len(), 3);
    }

    #[test]
    fn wiki_link_whitespace_trimmed_outer_only() {
        let buf = TextBuffer::new("[[ my doc ]]\n");
        let elements = parse(&buf);
        if let Element::WikiLink { target_doc, .. } = &elements[0] {
            assert_eq!(target_doc.as_deref(), Some("my doc"));
        } else {
            unreachable!();
        }
    }

    #[test]
    fn malformed_link_not_recognized() {
        let buf = TextBuffer::new("[[]] [[ ]]\n");
        let elements = parse(&buf);
        assert!(elements.is_empty());
    }

    #[test]
    fn inline_ref_captured() {
        let buf = TextBuffer::new("see [note](other.md) for more\n");
        let elements = parse(&buf);
        assert!(matches!(elements[0], Element::InlineRef { .. }));
    }
}
