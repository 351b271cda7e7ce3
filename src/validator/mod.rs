//! The well-formedness validator: a distinct pass from the
//! tolerant [`crate::scanner::Scanner`] that walks the document once and
//! reports the *first* violation as a 1-based line/column plus message,
//! rather than producing a best-effort partial result.

use crate::error::{Error, Location};
use crate::limits::MAX_NESTING_DEPTH;
use crate::options::Options;
use crate::scanner::is_valid_tag_name;

type ValidateResult<T> = std::result::Result<T, (Location, String)>;

/// Checks `doc` for well-formedness, returning the first violation found.
pub(crate) fn validate(doc: &[u8], options: &Options) -> crate::error::Result<()> {
    validate_inner(doc, options).map_err(|(location, message)| Error::Malformed { location, message })
}

/// Checks a fragment intended for [`crate::edit::set_raw`] the same way a
/// top-level document is checked: a fragment with multiple root elements
/// is itself a well-formed document.
pub(crate) fn validate_fragment(fragment: &[u8], options: &Options) -> crate::error::Result<()> {
    validate_inner(fragment, options).map_err(|(location, message)| Error::InvalidFragment { location, message })
}

fn validate_inner(doc: &[u8], options: &Options) -> ValidateResult<()> {
    let mut cursor = Cursor::new(doc);
    let mut seen_element = false;
    loop {
        if cursor.pos >= doc.len() {
            break;
        }
        if doc[cursor.pos] == b'<' {
            match doc.get(cursor.pos + 1) {
                Some(b'/') => return Err(cursor.error("unexpected closing tag at document level")),
                Some(b'!') if doc[cursor.pos..].starts_with(b"<!--") => cursor.skip_comment()?,
                Some(b'!') if doc[cursor.pos..].starts_with(b"<![CDATA[") => {
                    return Err(cursor.error("CDATA section not allowed outside element content"))
                }
                Some(b'!') => cursor.skip_doctype()?,
                Some(b'?') => cursor.skip_pi()?,
                _ => {
                    cursor.validate_element(options)?;
                    seen_element = true;
                }
            }
        } else {
            let start = cursor.pos;
            cursor.advance_to_lt();
            if !is_all_whitespace(&doc[start..cursor.pos]) {
                let _ = seen_element;
                return Err(cursor.error_at(start, "character data is not allowed between root elements"));
            }
        }
    }
    Ok(())
}

fn is_all_whitespace(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b <= b' ')
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0, depth: 0 }
    }

    fn location_at(&self, pos: usize) -> Location {
        let mut line = 1usize;
        let mut col = 1usize;
        for &b in &self.data[..pos.min(self.data.len())] {
            if b == b'\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        Location { line, column: col }
    }

    fn error(&self, message: &str) -> (Location, String) {
        self.error_at(self.pos, message)
    }

    fn error_at(&self, pos: usize, message: &str) -> (Location, String) {
        (self.location_at(pos), message.to_string())
    }

    fn advance_to_lt(&mut self) {
        match self.data[self.pos..].iter().position(|&b| b == b'<') {
            Some(idx) => self.pos += idx,
            None => self.pos = self.data.len(),
        }
    }

    fn skip_comment(&mut self) -> ValidateResult<()> {
        let start = self.pos;
        let search_from = self.pos + 4;
        match find(&self.data[search_from..], b"-->") {
            Some(idx) => {
                self.pos = search_from + idx + 3;
                Ok(())
            }
            None => Err((self.location_at(start), "unterminated comment".to_string())),
        }
    }

    fn skip_pi(&mut self) -> ValidateResult<()> {
        let start = self.pos;
        let search_from = self.pos + 2;
        match find(&self.data[search_from..], b"?>") {
            Some(idx) => {
                self.pos = search_from + idx + 2;
                Ok(())
            }
            None => Err((self.location_at(start), "unterminated processing instruction".to_string())),
        }
    }

    fn skip_cdata(&mut self) -> ValidateResult<()> {
        let start = self.pos;
        let search_from = self.pos + 9;
        match find(&self.data[search_from..], b"]]>") {
            Some(idx) => {
                self.pos = search_from + idx + 3;
                Ok(())
            }
            None => Err((self.location_at(start), "unterminated CDATA section".to_string())),
        }
    }

    fn skip_doctype(&mut self) -> ValidateResult<()> {
        let start = self.pos;
        let mut i = self.pos + 2;
        let mut bracket_depth = 0i32;
        while i < self.data.len() {
            match self.data[i] {
                b'[' => bracket_depth += 1,
                b']' => bracket_depth -= 1,
                b'>' if bracket_depth <= 0 => {
                    self.pos = i + 1;
                    return Ok(());
                }
                _ => {}
            }
            i += 1;
        }
        Err((self.location_at(start), "unterminated DOCTYPE declaration".to_string()))
    }

    /// Validates an element at the cursor (sitting on `<`), recursing into
    /// its children and requiring a matching close tag.
    fn validate_element(&mut self, options: &Options) -> ValidateResult<()> {
        let tag_start = self.pos;
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.depth -= 1;
            return Err((self.location_at(tag_start), format!("nesting depth exceeds {MAX_NESTING_DEPTH}")));
        }
        let result = self.validate_element_inner(tag_start, options);
        self.depth -= 1;
        result
    }

    fn validate_element_inner(&mut self, tag_start: usize, options: &Options) -> ValidateResult<()> {
        self.pos += 1;

        let name_start = self.pos;
        while self.pos < self.data.len() && !matches!(self.data[self.pos], b' ' | b'\t' | b'\r' | b'\n' | b'/' | b'>') {
            self.pos += 1;
        }
        let name = &self.data[name_start..self.pos];
        if !is_valid_tag_name(name) {
            return Err((self.location_at(tag_start), "invalid element name".to_string()));
        }

        self.validate_attributes(tag_start)?;

        if self.pos >= self.data.len() {
            return Err((self.location_at(tag_start), "unterminated tag".to_string()));
        }
        if self.data[self.pos] == b'/' {
            self.pos += 1;
            if self.data.get(self.pos) != Some(&b'>') {
                return Err((self.location_at(tag_start), "malformed self-closing tag".to_string()));
            }
            self.pos += 1;
            return Ok(());
        }
        if self.data.get(self.pos) != Some(&b'>') {
            return Err((self.location_at(tag_start), "malformed opening tag".to_string()));
        }
        self.pos += 1;

        loop {
            if self.pos >= self.data.len() {
                return Err((self.location_at(tag_start), "unterminated element: missing close tag".to_string()));
            }
            if self.data[self.pos] == b'<' {
                match self.data.get(self.pos + 1) {
                    Some(b'/') => {
                        let close_start = self.pos;
                        self.pos += 2;
                        let close_name_start = self.pos;
                        while self.pos < self.data.len() && self.data[self.pos] != b'>' {
                            self.pos += 1;
                        }
                        if self.pos >= self.data.len() {
                            return Err((self.location_at(close_start), "unterminated closing tag".to_string()));
                        }
                        let close_name = trim(&self.data[close_name_start..self.pos]);
                        self.pos += 1;
                        if !crate::options::names_eq(name, close_name, options.case_sensitive) {
                            return Err((
                                self.location_at(close_start),
                                format!(
                                    "closing tag </{}> does not match opening tag <{}>",
                                    String::from_utf8_lossy(close_name),
                                    String::from_utf8_lossy(name)
                                ),
                            ));
                        }
                        return Ok(());
                    }
                    Some(b'!') if self.data[self.pos..].starts_with(b"<!--") => self.skip_comment()?,
                    Some(b'!') if self.data[self.pos..].starts_with(b"<![CDATA[") => self.skip_cdata()?,
                    Some(b'!') => self.skip_doctype()?,
                    Some(b'?') => self.skip_pi()?,
                    _ => self.validate_element(options)?,
                }
            } else {
                self.advance_to_lt();
            }
        }
    }

    fn validate_attributes(&mut self, tag_start: usize) -> ValidateResult<()> {
        loop {
            while self.pos < self.data.len() && matches!(self.data[self.pos], b' ' | b'\t' | b'\r' | b'\n') {
                self.pos += 1;
            }
            if self.pos >= self.data.len() || matches!(self.data[self.pos], b'/' | b'>') {
                return Ok(());
            }
            let key_start = self.pos;
            while self.pos < self.data.len() && !matches!(self.data[self.pos], b' ' | b'\t' | b'\r' | b'\n' | b'=' | b'/' | b'>') {
                self.pos += 1;
            }
            if self.pos == key_start {
                return Err((self.location_at(tag_start), "malformed attribute".to_string()));
            }
            while self.pos < self.data.len() && matches!(self.data[self.pos], b' ' | b'\t' | b'\r' | b'\n') {
                self.pos += 1;
            }
            if self.data.get(self.pos) != Some(&b'=') {
                continue; // valueless attribute, tolerated
            }
            self.pos += 1;
            while self.pos < self.data.len() && matches!(self.data[self.pos], b' ' | b'\t' | b'\r' | b'\n') {
                self.pos += 1;
            }
            let quote = match self.data.get(self.pos) {
                Some(&q @ (b'"' | b'\'')) => q,
                _ => return Err((self.location_at(tag_start), "attribute value must be quoted".to_string())),
            };
            self.pos += 1;
            match self.data[self.pos..].iter().position(|&b| b == quote) {
                Some(idx) => self.pos += idx + 1,
                None => return Err((self.location_at(tag_start), "unterminated attribute value".to_string())),
            }
        }
    }
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b > b' ').unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|&b| b > b' ').map(|i| i + 1).unwrap_or(start);
    &bytes[start..end]
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&i| &haystack[i..i + needle.len()] == needle)
}
