//! The edit engine: `Set`, `SetRaw`, and `Delete`, built by
//! splicing `[prefix | new_bytes | suffix]` around a byte range located by
//! re-using the same sibling-scanning primitives as [`crate::query`].
//!
//! Editing restricts its target paths to plain navigation: a chain of
//! `Element` segments, optionally followed by one trailing `Attribute`,
//! `Text`, or `Index` segment. Wildcards, filters, `#`, and field
//! extraction identify *sets* of elements, which does not translate to a
//! single splice point, so a path using them is rejected with
//! [`crate::error::Error::MalformedPath`] rather than silently picking one.

use crate::error::{Error, Result};
use crate::limits::{MAX_DOCUMENT_SIZE, MAX_WILDCARD_RESULTS};
use crate::options::Options;
use crate::path::segment::SegmentKind;
use crate::path::CompileError;
use crate::query::{collect_siblings, MatchedElement};
use crate::scanner::entity;
use crate::scanner::ElementTag;
use crate::validator;

/// One `Element` step of an edit path: a plain name, no wildcards or
/// filters.
#[derive(Debug, Clone)]
struct ElementStep {
    prefix: Option<String>,
    local: String,
}

/// What a path's final segment asks the engine to act on.
#[derive(Debug, Clone)]
enum Tail {
    /// No trailing segment, or an explicit `%`: the named element's inner
    /// text content.
    Text,
    /// A trailing `@name`: an attribute on the named element.
    Attribute(String),
    /// A trailing index: select (or, for `Set`, append) among the
    /// preceding element name's siblings.
    Index(i64),
}

/// The new content a splice introduces.
enum Target {
    Text(String),
    Attribute(String, String),
    Raw(Vec<u8>),
}

pub(crate) fn set(doc: &[u8], path: &str, value: Option<&str>, options: &Options) -> Result<Vec<u8>> {
    let Some(value) = value else {
        return delete(doc, path, options);
    };
    check_size(doc)?;
    let (names, tail) = split_path(&compile_for_edit(path)?)?;
    match tail {
        Tail::Index(k) => apply_set_index(doc, &names, k, Target::Text(value.to_string()), options),
        Tail::Text => {
            let nav = navigate_prefix(doc, &names, options);
            if nav.complete {
                set_element_text(doc, nav.matched.last().unwrap(), &Target::Text(value.to_string()))
            } else {
                insert_missing_chain(doc, &nav, &names, Target::Text(value.to_string()))
            }
        }
        Tail::Attribute(attr_name) => {
            let nav = navigate_prefix(doc, &names, options);
            if nav.complete {
                set_attribute(doc, nav.matched.last().unwrap(), &attr_name, value, options)
            } else {
                insert_missing_chain(doc, &nav, &names, Target::Attribute(attr_name, value.to_string()))
            }
        }
    }
}

/// Identical to [`set`] except `raw` is inserted verbatim (after a
/// well-formedness check) rather than escaped as text.
pub(crate) fn set_raw(doc: &[u8], path: &str, raw: &[u8], options: &Options) -> Result<Vec<u8>> {
    check_size(doc)?;
    validator::validate_fragment(raw, options)?;
    let (names, tail) = split_path(&compile_for_edit(path)?)?;
    match tail {
        Tail::Attribute(_) => Err(Error::malformed_path("set_raw cannot target an attribute")),
        Tail::Index(k) => apply_set_index(doc, &names, k, Target::Raw(raw.to_vec()), options),
        Tail::Text => {
            let nav = navigate_prefix(doc, &names, options);
            if nav.complete {
                set_element_text(doc, nav.matched.last().unwrap(), &Target::Raw(raw.to_vec()))
            } else {
                insert_missing_chain(doc, &nav, &names, Target::Raw(raw.to_vec()))
            }
        }
    }
}

pub(crate) fn delete(doc: &[u8], path: &str, options: &Options) -> Result<Vec<u8>> {
    check_size(doc)?;
    let (names, tail) = split_path(&compile_for_edit(path)?)?;
    match tail {
        Tail::Text => match locate_existing_chain(doc, &names, options) {
            Some(chain) => {
                let (start, end) = element_span(chain.last().unwrap());
                Ok(splice(doc, start, end, b""))
            }
            None => Ok(doc.to_vec()),
        },
        Tail::Attribute(attr_name) => match locate_existing_chain(doc, &names, options) {
            Some(chain) => match attribute_removal_span(doc, chain.last().unwrap(), &attr_name, options) {
                Some((start, end)) => Ok(splice(doc, start, end, b"")),
                None => Ok(doc.to_vec()),
            },
            None => Ok(doc.to_vec()),
        },
        Tail::Index(k) => {
            let last_idx = names.len() - 1;
            let ancestors = &names[..last_idx];
            let last = &names[last_idx];
            let Some(chain) = locate_existing_chain(doc, ancestors, options) else {
                return Ok(doc.to_vec());
            };
            let region_start = match chain.last() {
                None => 0,
                Some(parent) => match &parent.content {
                    Some(c) => c.content_start,
                    None => return Ok(doc.to_vec()),
                },
            };
            let pfx = last.prefix.as_deref().map(str::as_bytes);
            let siblings = collect_siblings(
                doc,
                region_start,
                |t: &ElementTag<'_>| t.matches_name(pfx, last.local.as_bytes(), options.case_sensitive),
                MAX_WILDCARD_RESULTS,
            );
            match resolve_index(siblings.len(), k) {
                Some(i) => {
                    let (start, end) = element_span(&siblings[i]);
                    Ok(splice(doc, start, end, b""))
                }
                None => Ok(doc.to_vec()),
            }
        }
    }
}

fn compile_for_edit(path: &str) -> Result<crate::path::segment::CompiledPath> {
    crate::path::try_compile(path).map_err(|e| match e {
        CompileError::TooManySegments => Error::PathTooLong {
            max: crate::limits::MAX_PATH_SEGMENTS,
        },
        CompileError::Malformed(reason) => Error::malformed_path(reason),
    })
}

/// Splits a compiled path into its plain-element navigation chain and a
/// trailing target kind, rejecting any segment kind the edit engine does
/// not support (wildcards, filters, `#`, field extraction).
fn split_path(compiled: &crate::path::segment::CompiledPath) -> Result<(Vec<ElementStep>, Tail)> {
    if compiled.segments.is_empty() {
        return Err(Error::malformed_path("edit path must not be empty"));
    }
    let last_idx = compiled.segments.len() - 1;
    let mut names = Vec::with_capacity(compiled.segments.len());
    for (i, seg) in compiled.segments.iter().enumerate() {
        match &seg.kind {
            SegmentKind::Element { prefix, local } => names.push(ElementStep {
                prefix: prefix.clone(),
                local: local.clone(),
            }),
            SegmentKind::Attribute(name) if i == last_idx => return finish(names, Tail::Attribute(name.clone())),
            SegmentKind::Text if i == last_idx => return finish(names, Tail::Text),
            SegmentKind::Index(k) if i == last_idx => return finish(names, Tail::Index(*k)),
            _ => {
                return Err(Error::malformed_path(
                    "edit paths support only element/attribute/text/index navigation",
                ))
            }
        }
    }
    finish(names, Tail::Text)
}

fn finish(names: Vec<ElementStep>, tail: Tail) -> Result<(Vec<ElementStep>, Tail)> {
    if names.is_empty() {
        return Err(Error::malformed_path("edit path must start with an element name"));
    }
    Ok((names, tail))
}

/// The outcome of walking as much of `names` as exists in `doc`, matching
/// the first occurrence at each level (no wildcards: the edit engine's
/// navigation is always a single concrete chain).
struct Nav<'doc> {
    matched: Vec<MatchedElement<'doc>>,
    complete: bool,
}

fn navigate_prefix<'doc>(doc: &'doc [u8], names: &[ElementStep], options: &Options) -> Nav<'doc> {
    let mut matched = Vec::with_capacity(names.len());
    let mut region_start = 0usize;
    for step in names {
        let pfx = step.prefix.as_deref().map(str::as_bytes);
        let mut found = collect_siblings(
            doc,
            region_start,
            |t: &ElementTag<'_>| t.matches_name(pfx, step.local.as_bytes(), options.case_sensitive),
            1,
        );
        let Some(m) = found.pop() else { break };
        let content_start = m.content.map(|c| c.content_start);
        matched.push(m);
        match content_start {
            Some(cs) => region_start = cs,
            None => break,
        }
    }
    let complete = matched.len() == names.len();
    Nav { matched, complete }
}

fn locate_existing_chain<'doc>(doc: &'doc [u8], names: &[ElementStep], options: &Options) -> Option<Vec<MatchedElement<'doc>>> {
    let nav = navigate_prefix(doc, names, options);
    nav.complete.then_some(nav.matched)
}

fn resolve_index(len: usize, k: i64) -> Option<usize> {
    let len = len as i64;
    let resolved = if k < 0 { len + k } else { k };
    if resolved < 0 || resolved >= len {
        None
    } else {
        Some(resolved as usize)
    }
}

fn apply_set_index<'doc>(doc: &'doc [u8], names: &[ElementStep], k: i64, target: Target, options: &Options) -> Result<Vec<u8>> {
    let last_idx = names.len() - 1;
    let ancestors = &names[..last_idx];
    let last = &names[last_idx];
    let nav = navigate_prefix(doc, ancestors, options);
    if !nav.complete {
        return insert_missing_chain(doc, &nav, names, target);
    }

    let root_level = ancestors.is_empty();
    let region_start = if root_level {
        0
    } else {
        match &nav.matched.last().unwrap().content {
            Some(c) => c.content_start,
            None => {
                let leaf = leaf_bytes(last, &target);
                return expand_self_closing(doc, nav.matched.last().unwrap(), &leaf);
            }
        }
    };

    let pfx = last.prefix.as_deref().map(str::as_bytes);
    let siblings = collect_siblings(
        doc,
        region_start,
        |t: &ElementTag<'_>| t.matches_name(pfx, last.local.as_bytes(), options.case_sensitive),
        MAX_WILDCARD_RESULTS,
    );

    if siblings.is_empty() {
        let leaf = leaf_bytes(last, &target);
        let insert_at = if root_level {
            doc.len()
        } else {
            nav.matched.last().unwrap().content.unwrap().close_tag_start
        };
        return Ok(splice(doc, insert_at, insert_at, &leaf));
    }

    if k == -1 {
        let insert_at = element_span(siblings.last().unwrap()).1;
        let leaf = leaf_bytes(last, &target);
        return Ok(splice(doc, insert_at, insert_at, &leaf));
    }

    match resolve_index(siblings.len(), k) {
        Some(i) => set_element_text(doc, &siblings[i], &target),
        None => Ok(doc.to_vec()),
    }
}

fn insert_missing_chain(doc: &[u8], nav: &Nav<'_>, names: &[ElementStep], target: Target) -> Result<Vec<u8>> {
    let remaining = &names[nav.matched.len()..];
    let chain_bytes = build_new_chain(remaining, &target);
    match nav.matched.last() {
        None => {
            let insert_at = doc.len();
            Ok(splice(doc, insert_at, insert_at, &chain_bytes))
        }
        Some(last) => match &last.content {
            Some(c) => {
                let insert_at = c.close_tag_start;
                Ok(splice(doc, insert_at, insert_at, &chain_bytes))
            }
            None => expand_self_closing(doc, last, &chain_bytes),
        },
    }
}

fn expand_self_closing(doc: &[u8], e: &MatchedElement<'_>, inner: &[u8]) -> Result<Vec<u8>> {
    let tag_start = e.tag.tag_start;
    let tag_end = e.tag.tag_end;
    let open_part = &doc[tag_start..e.tag.attrs_insert_pos];
    let name = tag_qualified_name(&e.tag);

    let mut replacement = Vec::with_capacity(open_part.len() + inner.len() + name.len() * 2 + 3);
    replacement.extend_from_slice(open_part);
    replacement.push(b'>');
    replacement.extend_from_slice(inner);
    replacement.extend_from_slice(b"</");
    replacement.extend_from_slice(name.as_bytes());
    replacement.push(b'>');
    Ok(splice(doc, tag_start, tag_end, &replacement))
}

fn set_element_text(doc: &[u8], e: &MatchedElement<'_>, target: &Target) -> Result<Vec<u8>> {
    let bytes: Vec<u8> = match target {
        Target::Text(value) => entity::escape(value).into_bytes(),
        Target::Raw(raw) => raw.clone(),
        Target::Attribute(..) => unreachable!("attribute targets never reach element-text replacement"),
    };
    match &e.content {
        Some(c) => Ok(splice(doc, c.content_start, c.close_tag_start, &bytes)),
        None => expand_self_closing(doc, e, &bytes),
    }
}

fn set_attribute(doc: &[u8], e: &MatchedElement<'_>, attr_name: &str, value: &str, options: &Options) -> Result<Vec<u8>> {
    match e.tag.attrs.get(attr_name.as_bytes(), options.case_sensitive) {
        Some(existing) => {
            let value_start = offset_of(doc, existing);
            let value_end = value_start + existing.len();
            Ok(splice(doc, value_start, value_end, entity::escape(value).as_bytes()))
        }
        None => {
            let insertion = format!(" {attr_name}=\"{}\"", entity::escape(value));
            Ok(splice(doc, e.tag.attrs_insert_pos, e.tag.attrs_insert_pos, insertion.as_bytes()))
        }
    }
}

fn attribute_removal_span(doc: &[u8], e: &MatchedElement<'_>, attr_name: &str, options: &Options) -> Option<(usize, usize)> {
    let target = attr_name.as_bytes();
    for (key, value) in e.tag.attrs.iter() {
        let matches = crate::options::names_eq(key, target, options.case_sensitive);
        if matches {
            let key_start = offset_of(doc, key);
            let value_start = offset_of(doc, value);
            let attr_end = value_start + value.len() + 1; // past the closing quote
            return Some((key_start.saturating_sub(1), attr_end));
        }
    }
    None
}

fn element_span(e: &MatchedElement<'_>) -> (usize, usize) {
    match &e.content {
        Some(c) => (e.tag.tag_start, c.close_tag_end),
        None => (e.tag.tag_start, e.tag.tag_end),
    }
}

fn build_new_chain(names: &[ElementStep], target: &Target) -> Vec<u8> {
    let (last, rest) = names.split_last().expect("edit chain always has a leaf");
    let mut bytes = leaf_bytes(last, target);
    for step in rest.iter().rev() {
        bytes = wrap(step, bytes);
    }
    bytes
}

fn leaf_bytes(step: &ElementStep, target: &Target) -> Vec<u8> {
    let name = qualified_name(step.prefix.as_deref(), &step.local);
    match target {
        Target::Attribute(attr, value) => format!("<{name} {attr}=\"{}\"/>", entity::escape(value)).into_bytes(),
        Target::Text(value) => format!("<{name}>{}</{name}>", entity::escape(value)).into_bytes(),
        Target::Raw(raw) => {
            let mut v = format!("<{name}>").into_bytes();
            v.extend_from_slice(raw);
            v.extend_from_slice(format!("</{name}>").as_bytes());
            v
        }
    }
}

fn wrap(step: &ElementStep, inner: Vec<u8>) -> Vec<u8> {
    let name = qualified_name(step.prefix.as_deref(), &step.local);
    let mut v = format!("<{name}>").into_bytes();
    v.extend(inner);
    v.extend(format!("</{name}>").into_bytes());
    v
}

fn qualified_name(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{p}:{local}"),
        None => local.to_string(),
    }
}

fn tag_qualified_name(tag: &ElementTag<'_>) -> String {
    match tag.prefix {
        Some(p) => format!("{}:{}", String::from_utf8_lossy(p), String::from_utf8_lossy(tag.local)),
        None => String::from_utf8_lossy(tag.local).into_owned(),
    }
}

fn offset_of(doc: &[u8], sub: &[u8]) -> usize {
    (sub.as_ptr() as usize).wrapping_sub(doc.as_ptr() as usize)
}

fn splice(doc: &[u8], start: usize, end: usize, replacement: &[u8]) -> Vec<u8> {
    log::trace!(
        "pathxml: splicing bytes [{start}..{end}) ({} bytes) with {} replacement bytes",
        end - start,
        replacement.len()
    );
    let mut out = Vec::with_capacity(doc.len() - (end - start) + replacement.len());
    out.extend_from_slice(&doc[..start]);
    out.extend_from_slice(replacement);
    out.extend_from_slice(&doc[end..]);
    out
}

fn check_size(doc: &[u8]) -> Result<()> {
    if doc.len() > MAX_DOCUMENT_SIZE {
        return Err(Error::DocumentTooLarge {
            size: doc.len(),
            max: MAX_DOCUMENT_SIZE,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(doc: &[u8], path: &str, value: &str) -> String {
        String::from_utf8(set(doc, path, Some(value), &Options::default()).unwrap()).unwrap()
    }

    fn d(doc: &[u8], path: &str) -> String {
        String::from_utf8(delete(doc, path, &Options::default()).unwrap()).unwrap()
    }

    #[test]
    fn sets_existing_element_text() {
        assert_eq!(s(b"<a><b>old</b></a>", "a.b", "new"), "<a><b>new</b></a>");
    }

    #[test]
    fn sets_existing_attribute() {
        assert_eq!(s(br#"<a x="1"/>"#, "a.@x", "2"), r#"<a x="2"/>"#);
    }

    #[test]
    fn adds_new_attribute_to_existing_element() {
        assert_eq!(s(b"<a><b/></a>", "a.b.@id", "7"), r#"<a><b id="7"/></a>"#);
    }

    #[test]
    fn escapes_special_characters_in_set_value() {
        assert_eq!(s(b"<a></a>", "a", "<x> & \"y\""), "<a>&lt;x&gt; &amp; &quot;y&quot;</a>");
    }

    #[test]
    fn auto_creates_missing_nested_chain() {
        assert_eq!(s(b"<root></root>", "root.user.name", "John"), "<root><user><name>John</name></user></root>");
    }

    #[test]
    fn auto_creates_attribute_on_missing_element() {
        assert_eq!(s(b"<root></root>", "root.user.@id", "9"), r#"<root><user id="9"/></root>"#);
    }

    #[test]
    fn non_matching_root_appends_sibling_root() {
        assert_eq!(s(b"<a/>", "b", "1"), "<a/><b>1</b>");
    }

    #[test]
    fn empty_document_creates_root() {
        assert_eq!(s(b"", "root", "v"), "<root>v</root>");
    }

    #[test]
    fn self_closing_element_expands_to_host_text() {
        assert_eq!(s(b"<a/>", "a", "hi"), "<a>hi</a>");
    }

    #[test]
    fn negative_index_appends_new_sibling() {
        assert_eq!(s(b"<a><item>1</item><item>2</item></a>", "a.item.-1", "3"), "<a><item>1</item><item>2</item><item>3</item></a>");
    }

    #[test]
    fn negative_index_creates_first_when_no_siblings_exist() {
        assert_eq!(s(b"<a></a>", "a.item.-1", "1"), "<a><item>1</item></a>");
    }

    #[test]
    fn concrete_index_sets_existing_occurrence() {
        assert_eq!(s(b"<a><item>1</item><item>2</item></a>", "a.item.0", "9"), "<a><item>9</item><item>2</item></a>");
    }

    #[test]
    fn set_with_null_value_deletes() {
        assert_eq!(
            String::from_utf8(set(b"<a><b>1</b></a>", "a.b", None, &Options::default()).unwrap()).unwrap(),
            "<a></a>"
        );
    }

    #[test]
    fn deletes_existing_element_span() {
        assert_eq!(d(b"<a><b>1</b><c/></a>", "a.b"), "<a><c/></a>");
    }

    #[test]
    fn deletes_attribute_and_leading_space() {
        assert_eq!(d(br#"<a x="1" y="2"/>"#, "a.@x"), r#"<a y="2"/>"#);
    }

    #[test]
    fn delete_of_missing_target_is_a_no_op() {
        let doc: &[u8] = b"<a><b/></a>";
        assert_eq!(d(doc, "a.missing"), "<a><b/></a>");
    }

    #[test]
    fn deletes_indexed_element() {
        assert_eq!(d(b"<a><item>1</item><item>2</item></a>", "a.item.0"), "<a><item>2</item></a>");
    }

    #[test]
    fn set_raw_inserts_fragment_verbatim() {
        let out = String::from_utf8(set_raw(b"<a></a>", "a", b"<b>1</b><c>2</c>", &Options::default()).unwrap()).unwrap();
        assert_eq!(out, "<a><b>1</b><c>2</c></a>");
    }

    #[test]
    fn set_raw_rejects_malformed_fragment() {
        assert!(set_raw(b"<a></a>", "a", b"<b>", &Options::default()).is_err());
    }

    #[test]
    fn oversized_document_is_rejected() {
        let doc = vec![b'a'; MAX_DOCUMENT_SIZE + 1];
        assert!(matches!(set(&doc, "a", Some("x"), &Options::default()), Err(Error::DocumentTooLarge { .. })));
    }

    #[test]
    fn wildcard_path_is_rejected_for_editing() {
        assert!(set(b"<a><b/></a>", "a.*", Some("x"), &Options::default()).is_err());
    }
}
