//! Path compilation: turns path text into an ordered,
//! bounded vector of [`segment::Segment`]s.

pub(crate) mod cache;
pub(crate) mod lexer;
pub(crate) mod segment;

use std::sync::Arc;

use crate::filter::parse_filter;
use crate::limits::{MAX_FIELD_NAME_LENGTH, MAX_FILTER_EXPRESSION_LENGTH, MAX_PATH_SEGMENTS};
use segment::{CompiledPath, Field, Segment, SegmentKind};

/// Why a path failed to compile. Query callers collapse this to
/// `Value::Null`; edit callers surface it as [`crate::error::Error`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CompileError {
    TooManySegments,
    Malformed(String),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::TooManySegments => write!(f, "path exceeds {MAX_PATH_SEGMENTS} segments"),
            CompileError::Malformed(reason) => write!(f, "{reason}"),
        }
    }
}

/// Compiles `path`, consulting and populating the process-wide cache.
/// Returns an empty [`CompiledPath`] on failure for query callers that
/// want spec's "empty segment vector => Null" behavior without handling
/// a `Result`; use [`try_compile`] when the distinction matters (edit
/// operations must surface compile failures as errors).
pub(crate) fn compile(path: &str) -> CompiledPath {
    try_compile(path).unwrap_or_default()
}

/// Compiles `path`, returning the specific failure reason.
pub(crate) fn try_compile(path: &str) -> Result<CompiledPath, CompileError> {
    if let Some(cached) = cache::lookup(path) {
        return Ok((*cached).clone());
    }
    let compiled = compile_segments(path)?;
    cache::store(path, Arc::new(compiled.clone()));
    Ok(compiled)
}

/// Compiles without touching the cache; used for filter sub-paths, which
/// are typically distinct per filter instance and not worth caching.
pub(crate) fn compile_segments(path: &str) -> Result<CompiledPath, CompileError> {
    if path.bytes().any(|b| b == 0) {
        return Err(CompileError::Malformed("NUL byte in path".into()));
    }
    if path.is_empty() {
        return Ok(CompiledPath::default());
    }

    let tokens = lexer::split_segments(path);
    if tokens.len() > MAX_PATH_SEGMENTS {
        return Err(CompileError::TooManySegments);
    }

    let mut segments = Vec::with_capacity(tokens.len());
    for token in tokens {
        if token.is_empty() {
            return Err(CompileError::Malformed("empty path segment".into()));
        }
        let (core, modifiers) = lexer::split_modifiers(&token);
        let kind = parse_segment(&core)?;
        segments.push(Segment { kind, modifiers });
    }

    Ok(CompiledPath { segments })
}

fn parse_segment(core: &str) -> Result<SegmentKind, CompileError> {
    if core == "*" {
        return Ok(SegmentKind::WildcardSingle);
    }
    if core == "**" {
        return Ok(SegmentKind::WildcardRecursive);
    }
    if core == "%" {
        return Ok(SegmentKind::Text);
    }
    if core == "#" {
        return Ok(SegmentKind::Count);
    }
    if let Some(name) = core.strip_prefix('@') {
        let name = lexer::unescape(name);
        if name.is_empty() {
            return Err(CompileError::Malformed("empty attribute name".into()));
        }
        return Ok(SegmentKind::Attribute(name));
    }
    if let Some(rest) = core.strip_prefix("#.") {
        return parse_field_extraction(rest);
    }
    if core.starts_with("#(") {
        return parse_filter_segment(core);
    }
    if let Some(index) = parse_index(core) {
        return Ok(SegmentKind::Index(index));
    }
    parse_element(core)
}

fn parse_field_extraction(rest: &str) -> Result<SegmentKind, CompileError> {
    if rest.len() > MAX_FIELD_NAME_LENGTH {
        return Err(CompileError::Malformed("field name too long".into()));
    }
    if rest == "%" {
        return Ok(SegmentKind::FieldExtraction(Field::Text));
    }
    if let Some(name) = rest.strip_prefix('@') {
        let name = lexer::unescape(name);
        if name.is_empty() {
            return Err(CompileError::Malformed("empty field attribute name".into()));
        }
        return Ok(SegmentKind::FieldExtraction(Field::Attribute(name)));
    }
    if rest.is_empty() {
        return Err(CompileError::Malformed("empty field name".into()));
    }
    Ok(SegmentKind::FieldExtraction(Field::Element(lexer::unescape(rest))))
}

fn parse_filter_segment(core: &str) -> Result<SegmentKind, CompileError> {
    let all = core.ends_with('#');
    let without_all = if all { &core[..core.len() - 1] } else { core };
    let inner = without_all
        .strip_prefix("#(")
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| CompileError::Malformed("unterminated filter expression".into()))?;

    if inner.len() > MAX_FILTER_EXPRESSION_LENGTH {
        return Err(CompileError::Malformed("filter expression too long".into()));
    }

    let condition = parse_filter(inner)?;
    Ok(SegmentKind::Filter {
        condition: Box::new(condition),
        all,
    })
}

fn parse_index(core: &str) -> Option<i64> {
    let (neg, digits) = match core.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, core),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: i64 = digits.parse().ok()?;
    Some(if neg { -value } else { value })
}

fn parse_element(core: &str) -> Result<SegmentKind, CompileError> {
    use crate::limits::MAX_NAMESPACE_PREFIX_LENGTH;

    let (prefix, local_raw) = match lexer::find_unescaped(core, ':') {
        Some(idx) if idx <= MAX_NAMESPACE_PREFIX_LENGTH => {
            (Some(lexer::unescape(&core[..idx])), &core[idx + 1..])
        }
        _ => (None, core),
    };
    let local = lexer::unescape(local_raw);
    if local.is_empty() {
        return Err(CompileError::Malformed("empty element name".into()));
    }
    Ok(SegmentKind::Element { prefix, local })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_plain_element_path() {
        let p = try_compile("root.user.name").unwrap();
        assert_eq!(p.segments.len(), 3);
        assert!(matches!(
            p.segments[0].kind,
            SegmentKind::Element { ref local, .. } if local == "root"
        ));
    }

    #[test]
    fn compiles_filter_with_all_flag() {
        let p = try_compile("items.item.#(name%\"D*\")#.name").unwrap();
        assert!(matches!(
            p.segments[2].kind,
            SegmentKind::Filter { all: true, .. }
        ));
    }

    #[test]
    fn rejects_nul_byte() {
        assert!(try_compile("a.\0.b").is_err());
    }

    #[test]
    fn rejects_too_many_segments() {
        let long_path = (0..MAX_PATH_SEGMENTS + 1)
            .map(|i| format!("s{i}"))
            .collect::<Vec<_>>()
            .join(".");
        assert_eq!(try_compile(&long_path), Err(CompileError::TooManySegments));
    }

    #[test]
    fn recognizes_index_and_count_and_wildcards() {
        let p = try_compile("a.-1.#.* .**").unwrap_or_default();
        // " .**" includes a literal space segment which is a valid
        // (if unusual) element name; this test only exercises the
        // leading handful of segment kinds.
        assert!(matches!(p.segments[1].kind, SegmentKind::Index(-1)));
        assert!(matches!(p.segments[2].kind, SegmentKind::Count));
    }

    #[test]
    fn strict_equality_requires_double_equals() {
        let p = try_compile("items.#(a=b)").unwrap();
        if let SegmentKind::Filter { condition, .. } = &p.segments[1].kind {
            assert_eq!(condition.operator, crate::filter::Operator::Exists);
        } else {
            panic!("expected filter segment");
        }
    }
}
