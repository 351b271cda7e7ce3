//! Linear byte-level XML tokenizer.
//!
//! A cursor over a borrowed byte slice, `memchr`-accelerated tag/text
//! boundary search, and a const lookup table for valid tag-name-start
//! bytes, exposing the three driving primitives the query interpreter
//! and edit engine need: `skip_to_next_element`, `parse_element_name`,
//! `parse_element_content`.
//!
//! The scanner is intentionally non-validating here — malformed tails
//! produce best-effort partial results. [`crate::validator`] is the one
//! place that reports well-formedness errors.

pub mod entity;

use crate::limits::{MAX_ATTRIBUTES, MAX_NAMESPACE_PREFIX_LENGTH, MAX_NESTING_DEPTH, MAX_TOKEN_SIZE};

#[cfg(feature = "use-memchr")]
use memchr::memchr;
#[cfg(not(feature = "use-memchr"))]
fn memchr(needle: u8, haystack: &[u8]) -> Option<usize> {
    haystack.iter().position(|&x| x == needle)
}

static IS_VALID_NAME_START: [bool; 256] = lut_name_start_chars();
const fn lut_name_start_chars() -> [bool; 256] {
    let mut arr = [true; 256];
    let mut i = 0;
    while i < 256 {
        arr[i] = match i as u8 {
            0x00..=b' ' => false,
            b'!'..=b'9' => false,
            b':'..=b'@' => false,
            b'['..=b'`' => false,
            b'{'..=0x7F => false,
            _ => true,
        };
        i += 1;
    }
    arr
}

#[inline]
pub(crate) fn is_valid_tag_name(name: &[u8]) -> bool {
    match name.first().copied() {
        Some(x) => IS_VALID_NAME_START[x as usize],
        None => false,
    }
}

fn trim_whitespace(text: &[u8]) -> &[u8] {
    text.iter()
        .position(|&ch| ch > b' ')
        .and_then(|l| text.iter().rposition(|&ch| ch > b' ').map(|r| (l, r)))
        .and_then(|(l, r)| text.get(l..=r))
        .unwrap_or(b"")
}

/// An element's attribute table, capped at [`MAX_ATTRIBUTES`] entries;
/// overflow is silently discarded.
#[derive(Debug, Clone, Default)]
pub(crate) struct Attributes<'doc> {
    items: Vec<(&'doc [u8], &'doc [u8])>,
}

impl<'doc> Attributes<'doc> {
    fn push(&mut self, key: &'doc [u8], value: &'doc [u8]) {
        if self.items.len() < MAX_ATTRIBUTES {
            self.items.push((key, value));
        }
    }

    pub(crate) fn get(&self, name: &[u8], case_sensitive: bool) -> Option<&'doc [u8]> {
        self.items
            .iter()
            .find(|(k, _)| crate::options::names_eq(k, name, case_sensitive))
            .map(|(_, v)| *v)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&'doc [u8], &'doc [u8])> + '_ {
        self.items.iter().copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}

/// A parsed opening or self-closing tag.
#[derive(Debug, Clone)]
pub(crate) struct ElementTag<'doc> {
    pub prefix: Option<&'doc [u8]>,
    pub local: &'doc [u8],
    pub raw_name: &'doc [u8],
    pub attrs: Attributes<'doc>,
    pub self_closing: bool,
    /// Position of this tag's opening `<`.
    pub tag_start: usize,
    /// Position at which a newly-inserted attribute should be spliced in
    /// (just before the trailing `/` of a self-closing tag, or just
    /// before the closing `>` otherwise).
    pub attrs_insert_pos: usize,
    /// Position immediately after this tag's closing `>`.
    pub tag_end: usize,
}

impl<'doc> ElementTag<'doc> {
    /// Matches this tag's name against `(prefix, local)`, honoring the
    /// case-sensitivity policy the caller supplies.
    pub(crate) fn matches_name(&self, prefix: Option<&[u8]>, local: &[u8], case_sensitive: bool) -> bool {
        let eq = |a: &[u8], b: &[u8]| crate::options::names_eq(a, b, case_sensitive);
        match (self.prefix, prefix) {
            (Some(a), Some(b)) => eq(a, b) && eq(self.local, local),
            (None, None) => eq(self.local, local),
            // A query segment without a prefix matches an element with a
            // prefix only on the local name (textual prefix matching is a
            // non-goal for full resolution, but an unqualified query
            // should still be able to find prefixed elements by local
            // name, the way GJSON-style dialects match loosely).
            (Some(_), None) => eq(self.local, local),
            (None, Some(_)) => false,
        }
    }
}

/// The located content of a non-self-closing element.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ElementContent<'doc> {
    pub bytes: &'doc [u8],
    pub content_start: usize,
    pub close_tag_start: usize,
    pub close_tag_end: usize,
}

/// A cursor over borrowed document bytes. Two scanners over the same
/// document are independent and safe to use from different threads:
/// all state here is a plain offset.
#[derive(Debug, Clone)]
pub(crate) struct Scanner<'doc> {
    source: &'doc [u8],
    pos: usize,
    depth: usize,
}

impl<'doc> Scanner<'doc> {
    pub(crate) fn new(source: &'doc [u8]) -> Self {
        Scanner { source, pos: 0, depth: 0 }
    }

    /// A scanner over `source` positioned at `pos`, used by the query
    /// interpreter to resume scanning inside an already-located element's
    /// content without re-slicing the document (so all offsets recorded
    /// along the way stay absolute).
    pub(crate) fn at(source: &'doc [u8], pos: usize) -> Self {
        Scanner { source, pos, depth: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn source(&self) -> &'doc [u8] {
        self.source
    }

    /// Advances past whitespace, comments, PIs, CDATA, DOCTYPE, and text,
    /// stopping at the next element start. Returns `false` at end of
    /// buffer or when the next tag is a closing tag (the cursor is left
    /// sitting on that closing tag's `<` either way, so callers can
    /// inspect or consume it).
    pub(crate) fn skip_to_next_element(&mut self) -> bool {
        loop {
            if self.pos >= self.source.len() {
                return false;
            }
            let rest = &self.source[self.pos..];
            if rest[0] != b'<' {
                match memchr(b'<', rest) {
                    Some(idx) => self.pos += idx,
                    None => {
                        self.pos = self.source.len();
                        return false;
                    }
                }
                continue;
            }

            if rest.starts_with(b"<!--") {
                self.skip_comment();
                continue;
            }
            if rest.starts_with(b"<![CDATA[") {
                self.skip_cdata();
                continue;
            }
            if rest.starts_with(b"<?") {
                self.skip_pi();
                continue;
            }
            if rest.len() >= 2 && rest[1] == b'!' {
                // DOCTYPE or another bang section we don't follow; recognized
                // and skipped without being parsed.
                self.skip_doctype();
                continue;
            }
            if rest.len() >= 2 && rest[1] == b'/' {
                return false; // sitting on a closing tag
            }
            return true; // sitting on an opening/self-closing tag
        }
    }

    fn skip_comment(&mut self) {
        let search_start = self.pos + 4;
        let bound = (search_start + MAX_TOKEN_SIZE).min(self.source.len());
        match find_subslice(&self.source[search_start..bound], b"-->") {
            Some(idx) => self.pos = search_start + idx + 3,
            None => self.pos = self.source.len(), // unterminated: consume to end (tolerant)
        }
    }

    fn skip_cdata(&mut self) {
        let search_start = self.pos + 9;
        let bound = (search_start + MAX_TOKEN_SIZE).min(self.source.len());
        match find_subslice(&self.source[search_start..bound], b"]]>") {
            Some(idx) => self.pos = search_start + idx + 3,
            None => self.pos = self.source.len(),
        }
    }

    fn skip_pi(&mut self) {
        let search_start = self.pos + 2;
        let bound = (search_start + MAX_TOKEN_SIZE).min(self.source.len());
        match find_subslice(&self.source[search_start..bound], b"?>") {
            Some(idx) => self.pos = search_start + idx + 2,
            None => self.pos = self.source.len(),
        }
    }

    fn skip_doctype(&mut self) {
        // DOCTYPE bodies may themselves contain a bracketed internal
        // subset with nested `>` inside markup declarations; track simple
        // bracket depth so `<!DOCTYPE a [ <!ENTITY b "c"> ]>` is skipped
        // as one unit rather than stopping at the first `>`.
        let start = self.pos + 2;
        let mut i = start;
        let mut bracket_depth = 0i32;
        let bound = (start + MAX_TOKEN_SIZE).min(self.source.len());
        while i < bound {
            match self.source[i] {
                b'[' => bracket_depth += 1,
                b']' => bracket_depth -= 1,
                b'>' if bracket_depth <= 0 => {
                    self.pos = i + 1;
                    return;
                }
                _ => {}
            }
            i += 1;
        }
        self.pos = self.source.len();
    }

    /// Parses the tag at the cursor (which must be sitting on an opening
    /// or self-closing tag's `<`, as left by `skip_to_next_element`
    /// returning `true`). Advances the cursor past the tag on success.
    pub(crate) fn parse_element_name(&mut self) -> Option<ElementTag<'doc>> {
        let tag_start = self.pos;
        let after_lt = tag_start + 1;
        let rest = self.source.get(after_lt..)?;
        let bound = rest.len().min(MAX_TOKEN_SIZE);
        let gt = memchr(b'>', &rest[..bound])?;
        let inner_raw = &rest[..gt];

        let self_closing = inner_raw.last() == Some(&b'/');
        let inner = if self_closing { &inner_raw[..inner_raw.len() - 1] } else { inner_raw };

        let (name, attr_text) = match inner.iter().position(|&ch| ch <= b' ') {
            Some(ws) => (&inner[..ws], &inner[ws + 1..]),
            None => (inner, &inner[inner.len()..]),
        };

        if !is_valid_tag_name(name) {
            return None;
        }

        let (prefix, local) = split_prefix(name);
        let attrs = parse_attributes(attr_text);

        let angle_pos = after_lt + gt; // absolute position of '>'
        let attrs_insert_pos = if self_closing { angle_pos - 1 } else { angle_pos };

        self.pos = angle_pos + 1;

        Some(ElementTag {
            prefix,
            local,
            raw_name: name,
            attrs,
            self_closing,
            tag_start,
            attrs_insert_pos,
            tag_end: self.pos,
        })
    }

    /// Parses a closing tag at the cursor (which must be sitting on a
    /// `</` as left by `skip_to_next_element` returning `false` on a tag
    /// rather than EOF). Returns `(prefix, local, end_pos)`.
    fn parse_close_tag(&mut self) -> Option<(Option<&'doc [u8]>, &'doc [u8], usize)> {
        let after = self.pos + 2; // past `</`
        let rest = self.source.get(after..)?;
        let bound = rest.len().min(MAX_TOKEN_SIZE);
        let gt = memchr(b'>', &rest[..bound])?;
        let name = trim_whitespace(&rest[..gt]);
        if name.is_empty() {
            return None;
        }
        let (prefix, local) = split_prefix(name);
        let end_pos = after + gt + 1;
        Some((prefix, local, end_pos))
    }

    /// Locates the matching close tag for `tag` (which must not be
    /// self-closing) and returns its content slice plus close-tag
    /// boundaries. Leaves the cursor positioned right after the matching
    /// close tag. Bounded by [`MAX_NESTING_DEPTH`]: documents nested
    /// deeper than that are truncated rather than followed.
    pub(crate) fn parse_element_content(&mut self, tag: &ElementTag<'doc>) -> Option<ElementContent<'doc>> {
        debug_assert!(!tag.self_closing);
        let content_start = tag.tag_end;
        self.pos = content_start;
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            log::warn!("pathxml: nesting depth exceeded {MAX_NESTING_DEPTH}, truncating scan");
            self.depth -= 1;
            self.pos = self.source.len();
            return None;
        }

        let result = self.find_matching_close(tag);
        self.depth -= 1;
        result
    }

    fn find_matching_close(&mut self, tag: &ElementTag<'doc>) -> Option<ElementContent<'doc>> {
        let content_start = self.pos;
        loop {
            if !self.skip_to_next_element() {
                if self.pos >= self.source.len() {
                    return None; // unterminated element: best-effort miss
                }
                let close_tag_start = self.pos;
                let (prefix, local, end_pos) = self.parse_close_tag()?;
                if tag.matches_name(prefix, local, true) {
                    self.pos = end_pos;
                    return Some(ElementContent {
                        bytes: &self.source[content_start..close_tag_start],
                        content_start,
                        close_tag_start,
                        close_tag_end: end_pos,
                    });
                }
                // Mismatched closing tag: the document is malformed past
                // this point. Tolerate it by treating this as our own
                // close, the way a best-effort scanner would rather than
                // looping forever.
                self.pos = end_pos;
                return Some(ElementContent {
                    bytes: &self.source[content_start..close_tag_start],
                    content_start,
                    close_tag_start,
                    close_tag_end: end_pos,
                });
            }

            // A nested opening tag: skip its entire subtree before
            // resuming the search for our own close tag.
            let child_start = self.pos;
            match self.parse_element_name() {
                Some(child) if child.self_closing => continue,
                Some(child) => {
                    self.depth += 1;
                    if self.depth > MAX_NESTING_DEPTH {
                        self.depth -= 1;
                        self.pos = self.source.len();
                        return None;
                    }
                    let found = self.find_matching_close(&child);
                    self.depth -= 1;
                    if found.is_none() {
                        return None;
                    }
                }
                None => {
                    // Unparsable nested tag; skip past it defensively.
                    self.pos = child_start + 1;
                }
            }
        }
    }

    /// Extracts an element's direct text content, skipping nested child
    /// elements and decoding entities.
    pub(crate) fn direct_text(content: &'doc [u8]) -> String {
        let mut scanner = Scanner::new(content);
        let mut out = String::new();
        loop {
            let start = scanner.pos;
            if !scanner.skip_to_next_element() {
                let tail_start = start;
                let tail_end = scanner.pos.min(scanner.source.len());
                if tail_start < tail_end {
                    let text = trim_raw_text(&scanner.source[tail_start..tail_end]);
                    if !text.is_empty() {
                        out.push_str(&entity::decode(text));
                    }
                }
                break; // end of buffer, or sitting on a stray closing tag
            }

            let text_slice = &scanner.source[start..scanner.pos];
            let trimmed = trim_raw_text(text_slice);
            if !trimmed.is_empty() {
                out.push_str(&entity::decode(trimmed));
            }

            match scanner.parse_element_name() {
                Some(tag) if tag.self_closing => continue,
                Some(tag) => {
                    if scanner.parse_element_content(&tag).is_none() {
                        break;
                    }
                }
                None => break,
            }
        }
        out
    }
}

/// Interleaved CDATA sections contribute their literal text, un-decoded,
/// which `direct_text` approximates by simply not special-casing them here
/// — CDATA markers never reach this point because `skip_to_next_element`
/// consumes them as non-text tokens. A more complete implementation would
/// thread CDATA bytes through separately; this crate treats CDATA as
/// skippable markup for the purposes of direct-text extraction, matching
/// the behavior of treating it like a comment for Text-segment purposes.
fn trim_raw_text(text: &[u8]) -> &[u8] {
    trim_whitespace(text)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    let first = needle[0];
    let mut start = 0;
    while let Some(idx) = memchr(first, &haystack[start..]) {
        let abs = start + idx;
        if haystack[abs..].starts_with(needle) {
            return Some(abs);
        }
        start = abs + 1;
    }
    None
}

fn split_prefix(name: &[u8]) -> (Option<&[u8]>, &[u8]) {
    match memchr(b':', name) {
        Some(idx) if idx <= MAX_NAMESPACE_PREFIX_LENGTH => (Some(&name[..idx]), &name[idx + 1..]),
        _ => (None, name),
    }
}

fn parse_attributes(content: &[u8]) -> Attributes<'_> {
    let mut attrs = Attributes::default();
    let mut pos = 0usize;
    while pos < content.len() {
        match content[pos..].iter().position(|&b| b > b' ') {
            Some(skip) => pos += skip,
            None => break,
        }
        let rest = &content[pos..];

        let key_end = rest
            .iter()
            .position(|&b| b <= b' ' || b == b'=')
            .unwrap_or(rest.len());
        let key = &rest[..key_end];
        if key.is_empty() {
            break;
        }
        pos += key_end;

        // Skip whitespace up to a possible `=`.
        let mut lookahead = pos;
        while lookahead < content.len() && content[lookahead] <= b' ' {
            lookahead += 1;
        }

        if lookahead < content.len() && content[lookahead] == b'=' {
            lookahead += 1;
            while lookahead < content.len() && content[lookahead] <= b' ' {
                lookahead += 1;
            }
            if lookahead < content.len() && (content[lookahead] == b'"' || content[lookahead] == b'\'') {
                let quote = content[lookahead];
                lookahead += 1;
                let value_start = lookahead;
                match memchr(quote, &content[value_start..]) {
                    Some(end) => {
                        attrs.push(key, &content[value_start..value_start + end]);
                        pos = value_start + end + 1;
                    }
                    None => {
                        attrs.push(key, &content[value_start..]);
                        pos = content.len();
                    }
                }
            } else {
                // Unquoted value (tolerated): read until next whitespace.
                let value_end = content[lookahead..]
                    .iter()
                    .position(|&b| b <= b' ')
                    .map(|n| lookahead + n)
                    .unwrap_or(content.len());
                attrs.push(key, &content[lookahead..value_end]);
                pos = value_end;
            }
        } else {
            // Attribute with no value: stored as the empty string.
            attrs.push(key, &[]);
            pos = lookahead;
        }
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_simple_element() {
        let mut s = Scanner::new(b"<root><a>1</a></root>");
        assert!(s.skip_to_next_element());
        let tag = s.parse_element_name().unwrap();
        assert_eq!(tag.local, b"root");
        assert!(!tag.self_closing);
        let content = s.parse_element_content(&tag).unwrap();
        assert_eq!(content.bytes, b"<a>1</a>");
    }

    #[test]
    fn parses_attributes_with_both_quote_styles() {
        let mut s = Scanner::new(br#"<a x="1" y='2' z/>"#);
        assert!(s.skip_to_next_element());
        let tag = s.parse_element_name().unwrap();
        assert_eq!(tag.attrs.get(b"x", true), Some(&b"1"[..]));
        assert_eq!(tag.attrs.get(b"y", true), Some(&b"2"[..]));
        assert_eq!(tag.attrs.get(b"z", true), Some(&b""[..]));
        assert!(tag.self_closing);
    }

    #[test]
    fn handles_nested_same_name_elements() {
        let mut s = Scanner::new(b"<a><a>inner</a>tail</a>");
        s.skip_to_next_element();
        let tag = s.parse_element_name().unwrap();
        let content = s.parse_element_content(&tag).unwrap();
        assert_eq!(content.bytes, b"<a>inner</a>tail");
    }

    #[test]
    fn skips_comments_and_pis_between_siblings() {
        let mut s = Scanner::new(b"<root><!-- c --><?pi?><a/></root>");
        s.skip_to_next_element();
        let root = s.parse_element_name().unwrap();
        let content = s.parse_element_content(&root).unwrap();
        let mut inner = Scanner::new(content.bytes);
        assert!(inner.skip_to_next_element());
        let a = inner.parse_element_name().unwrap();
        assert_eq!(a.local, b"a");
        assert!(a.self_closing);
    }

    #[test]
    fn direct_text_skips_nested_elements() {
        let text = Scanner::direct_text(b"hello <b>world</b> tail");
        assert_eq!(text, "hello  tail");
    }

    #[test]
    fn namespace_prefix_is_recognized() {
        let mut s = Scanner::new(b"<ns:root/>");
        s.skip_to_next_element();
        let tag = s.parse_element_name().unwrap();
        assert_eq!(tag.prefix, Some(&b"ns"[..]));
        assert_eq!(tag.local, b"root");
    }

    #[test]
    fn overlong_prefix_is_treated_as_unqualified() {
        let long = "p".repeat(MAX_NAMESPACE_PREFIX_LENGTH + 1);
        let xml = format!("<{long}:root/>");
        let mut s = Scanner::new(xml.as_bytes());
        s.skip_to_next_element();
        let tag = s.parse_element_name().unwrap();
        assert_eq!(tag.prefix, None);
    }

    #[test]
    fn doctype_is_skipped() {
        let mut s = Scanner::new(b"<!DOCTYPE root [ <!ENTITY x \"y\"> ]><root/>");
        assert!(s.skip_to_next_element());
        let tag = s.parse_element_name().unwrap();
        assert_eq!(tag.local, b"root");
    }
}
