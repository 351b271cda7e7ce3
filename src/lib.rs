//! *pathxml* queries and edits XML text through a compact, dotted-path
//! syntax — a GJSON-style query dialect generalized to XML elements,
//! attributes, and text.
//!
//! # Example
//! ```rust
//! let doc = r#"<users><user><name>Alice</name><age>30</age></user></users>"#;
//! assert_eq!(pathxml::get(doc.as_bytes(), "users.user.name").str(), "Alice");
//! ```
//!
//! # Why would I need this?
//! Sometimes you need to pull one value, or make one small edit, out of an
//! XML document without standing up a DOM and a schema. `pathxml` treats the
//! document as bytes, walks it lazily, and never allocates more than the
//! result you asked for. It is deliberately non-validating on the query
//! side (malformed input degrades to `Null`, never a panic); [`valid`] is
//! the one entry point that reports well-formedness errors.
//!
//! # Path syntax
//! `root.user.name` walks elements by name; `@attr` reads an attribute;
//! `%` reads direct text; `*`/`**` are single/recursive wildcards;
//! `#(expr)` and `#(expr)#` are first-match/all-match filters; `#` counts;
//! `#.field` projects a field out of a matched set; `-1` indexes from the
//! end; `|@modifier` chains a named transform onto a segment's result. See
//! the crate's specification document for the full grammar.

mod edit;
mod filter;
mod limits;
mod modifier;
mod path;
mod query;
mod scanner;
mod validator;

pub mod error;
pub mod options;
pub mod result;

pub use error::{Error, Location};
pub use options::Options;
pub use result::{Kind, Value};

/// Reads the value at `path` in `doc`, using default [`Options`].
///
/// Never fails: a malformed path, a miss, or a blown resource limit all
/// collapse to a `Value` whose `kind()` is [`Kind::Null`].
pub fn get<'doc>(doc: &'doc [u8], path: &str) -> Value<'doc> {
    get_with_options(doc, path, &Options::default())
}

/// [`get`] with caller-supplied [`Options`].
pub fn get_with_options<'doc>(doc: &'doc [u8], path: &str, options: &Options) -> Value<'doc> {
    let compiled = path::compile(path);
    query::evaluate(doc, &compiled, options)
}

/// Sets the value at `path` to `value`, returning a new document.
///
/// Missing ancestor elements are auto-created. `value: None` is equivalent
/// to [`delete`]. See the crate documentation's path syntax section for
/// what paths this accepts as edit targets — wildcard, filter, `#`, and
/// field-extraction segments identify sets of elements and are rejected
/// with [`Error::MalformedPath`], since editing needs one concrete target.
pub fn set(doc: &[u8], path: &str, value: Option<&str>) -> error::Result<Vec<u8>> {
    set_with_options(doc, path, value, &Options::default())
}

/// [`set`] with caller-supplied [`Options`].
pub fn set_with_options(doc: &[u8], path: &str, value: Option<&str>, options: &Options) -> error::Result<Vec<u8>> {
    edit::set(doc, path, value, options)
}

/// Identical to [`set`] except `raw` is inserted verbatim as XML markup
/// (after a well-formedness check) rather than escaped as text.
pub fn set_raw(doc: &[u8], path: &str, raw: &[u8]) -> error::Result<Vec<u8>> {
    set_raw_with_options(doc, path, raw, &Options::default())
}

/// [`set_raw`] with caller-supplied [`Options`].
pub fn set_raw_with_options(doc: &[u8], path: &str, raw: &[u8], options: &Options) -> error::Result<Vec<u8>> {
    edit::set_raw(doc, path, raw, options)
}

/// Deletes the value at `path`, returning a new document. Deleting a path
/// that does not exist returns `doc` unchanged, not an error.
pub fn delete(doc: &[u8], path: &str) -> error::Result<Vec<u8>> {
    delete_with_options(doc, path, &Options::default())
}

/// [`delete`] with caller-supplied [`Options`].
pub fn delete_with_options(doc: &[u8], path: &str, options: &Options) -> error::Result<Vec<u8>> {
    edit::delete(doc, path, options)
}

/// Checks `doc` for well-formedness, returning the first violation found
/// as a 1-based `{line, column}` plus message.
pub fn valid(doc: &[u8]) -> error::Result<()> {
    valid_with_options(doc, &Options::default())
}

/// [`valid`] with caller-supplied [`Options`].
pub fn valid_with_options(doc: &[u8], options: &Options) -> error::Result<()> {
    validator::validate(doc, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_reads_nested_value() {
        let doc = b"<a><b>hello</b></a>";
        assert_eq!(get(doc, "a.b").str(), "hello");
    }

    #[test]
    fn set_then_get_round_trips() {
        let doc = b"<a></a>";
        let updated = set(doc, "a.b", Some("v")).unwrap();
        assert_eq!(get(&updated, "a.b").str(), "v");
    }

    #[test]
    fn set_null_then_get_is_null() {
        let doc = b"<a><b>v</b></a>";
        let updated = set(doc, "a.b", None).unwrap();
        assert!(!get(&updated, "a.b").exists());
    }

    #[test]
    fn delete_then_validate_still_well_formed() {
        let doc = b"<a><b>v</b><c/></a>";
        let updated = delete(doc, "a.b").unwrap();
        assert!(valid(&updated).is_ok());
    }

    #[test]
    fn valid_reports_first_malformed_location() {
        let err = valid(b"<a><b></a>").unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    #[test]
    fn get_on_malformed_path_is_null_not_panic() {
        let doc = b"<a/>";
        assert!(!get(doc, "#(").exists());
    }
}
