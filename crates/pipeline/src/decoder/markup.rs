//! Display cleanup for sentence text
//!
//! Generated text is read aloud or shown as plain text, never rendered, so
//! residual formatting markup is stripped before emission: emphasis and
//! code markers, heading markers, and link syntax collapsed to its label.
//! Char-stream scan, no regex.

/// Strip formatting markup from a sentence.
pub fn clean_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    let mut at_line_start = true;

    while let Some((i, c)) = chars.next() {
        match c {
            '\n' => {
                out.push('\n');
                at_line_start = true;
            }
            '#' if at_line_start => {
                while matches!(chars.peek(), Some(&(_, '#'))) {
                    chars.next();
                }
                if matches!(chars.peek(), Some(&(_, ' '))) {
                    chars.next();
                }
            }
            '*' | '`' => {}
            '_' => {
                // Double underscore is emphasis; a single one stays, it is
                // common inside identifiers.
                if matches!(chars.peek(), Some(&(_, '_'))) {
                    chars.next();
                } else {
                    out.push('_');
                    at_line_start = false;
                }
            }
            '[' => match parse_link(text, i) {
                Some((label, end)) => {
                    out.push_str(&label);
                    while chars.peek().is_some_and(|&(j, _)| j < end) {
                        chars.next();
                    }
                    at_line_start = false;
                }
                None => {
                    out.push('[');
                    at_line_start = false;
                }
            },
            _ => {
                out.push(c);
                at_line_start = false;
            }
        }
    }

    out
}

/// Parse `[label](url)` starting at byte `start`; returns the cleaned label
/// and the byte offset just past the closing paren.
fn parse_link(text: &str, start: usize) -> Option<(String, usize)> {
    let rest = &text[start..];
    let close = rest.find(']')?;
    if !rest[close + 1..].starts_with('(') {
        return None;
    }
    let paren = rest[close + 1..].find(')')? + close + 1;

    let label: String = rest[1..close]
        .chars()
        .filter(|c| !matches!(c, '*' | '`'))
        .collect();
    Some((label, start + paren + 1))
}
