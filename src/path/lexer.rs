//! Tokenizes a raw path string into segment tokens, respecting `\`-escapes
//! and the parenthesized/quoted span of filter expressions so that a `.`
//! or `|` inside `#(user.age > 30)` does not get mistaken for a path or
//! modifier separator.

/// Splits `path` on unescaped `.`, treating everything inside a top-level
/// `#( ... )` filter span (including nested quotes) as opaque.
pub(crate) fn split_segments(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }

    let bytes = path.as_bytes();
    let mut out = Vec::new();
    let mut current = String::new();
    let mut paren_depth = 0i32;
    let mut in_quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\\' && i + 1 < bytes.len() {
            current.push(b as char);
            current.push(bytes[i + 1] as char);
            i += 2;
            continue;
        }
        if let Some(q) = in_quote {
            current.push(b as char);
            if b == q {
                in_quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' | b'\'' if paren_depth > 0 => {
                in_quote = Some(b);
                current.push(b as char);
            }
            b'(' => {
                paren_depth += 1;
                current.push(b as char);
            }
            b')' => {
                if paren_depth > 0 {
                    paren_depth -= 1;
                }
                current.push(b as char);
            }
            b'.' if paren_depth == 0 => {
                out.push(std::mem::take(&mut current));
            }
            _ => current.push(b as char),
        }
        i += 1;
    }
    out.push(current);
    out
}

/// Splits a single segment token into its core text and the chain of
/// modifier names suffixed with `|@name`. Modifier separators inside a
/// filter's parens are ignored, same as `.` in [`split_segments`].
pub(crate) fn split_modifiers(token: &str) -> (String, Vec<String>) {
    let bytes = token.as_bytes();
    let mut core = String::new();
    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut paren_depth = 0i32;
    let mut in_quote: Option<u8> = None;
    let mut i = 0;
    let mut have_core = false;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\\' && i + 1 < bytes.len() {
            current.push(b as char);
            current.push(bytes[i + 1] as char);
            i += 2;
            continue;
        }
        if let Some(q) = in_quote {
            current.push(b as char);
            if b == q {
                in_quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' | b'\'' if paren_depth > 0 => {
                in_quote = Some(b);
                current.push(b as char);
            }
            b'(' => {
                paren_depth += 1;
                current.push(b as char);
            }
            b')' => {
                if paren_depth > 0 {
                    paren_depth -= 1;
                }
                current.push(b as char);
            }
            b'|' if paren_depth == 0 => {
                if !have_core {
                    core = std::mem::take(&mut current);
                    have_core = true;
                } else {
                    pieces.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(b as char),
        }
        i += 1;
    }
    if !have_core {
        core = current;
    } else {
        pieces.push(current);
    }

    let modifiers = pieces
        .into_iter()
        .filter_map(|p| p.strip_prefix('@').map(|s| s.to_string()))
        .collect();
    (core, modifiers)
}

/// Resolves `\X` escape pairs into a literal `X`, for use once a token's
/// boundaries are already known.
pub(crate) fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Finds the first unescaped occurrence of `needle` in `s`, used to split
/// an element name from its namespace prefix.
pub(crate) fn find_unescaped(s: &str, needle: char) -> Option<usize> {
    let mut escaped = false;
    for (idx, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
            continue;
        }
        if c == needle {
            return Some(idx);
        }
    }
    None
}
