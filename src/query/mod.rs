//! The query interpreter: walks a compiled path's segments
//! against the scanner to produce a [`Value`].
//!
//! All positions threaded through this module are absolute offsets into
//! the single top-level document buffer. Recursing "into" an element's
//! content never re-slices the document — it repositions a [`Scanner`]
//! within the same buffer — so the byte ranges recorded along the way
//! stay usable by the edit engine without any offset translation.

use crate::filter::{FilterCondition, Operator};
use crate::filter::pattern;
use crate::limits::{MAX_FILTER_DEPTH, MAX_RECURSIVE_OPERATIONS, MAX_WILDCARD_RESULTS};
use crate::options::Options;
use crate::path::segment::{CompiledPath, Field, Segment, SegmentKind};
use crate::result::{Scalar, Value};
use crate::scanner::entity;
use crate::scanner::{ElementContent, ElementTag, Scanner};

/// A single resolved element: its parsed tag plus its content region, if
/// it has one (self-closing tags carry `None`).
#[derive(Debug, Clone)]
pub(crate) struct MatchedElement<'doc> {
    pub tag: ElementTag<'doc>,
    pub content: Option<ElementContent<'doc>>,
    pub doc: &'doc [u8],
}

impl<'doc> MatchedElement<'doc> {
    fn span_end(&self) -> usize {
        self.content.map(|c| c.close_tag_end).unwrap_or(self.tag.tag_end)
    }

    fn content_bytes(&self) -> &'doc [u8] {
        self.content.map(|c| c.bytes).unwrap_or(&[])
    }
}

/// Per-query resource accounting: the recursive-descent visit counter and
/// the filter-evaluation recursion depth.
#[derive(Debug, Default)]
pub(crate) struct Budget {
    pub recursive_visits: usize,
    pub filter_depth: usize,
}

enum EvalCtx<'doc> {
    Siblings { start: usize },
    Element(MatchedElement<'doc>),
}

/// Evaluates `compiled` against `doc`, the crate's single public-facing
/// query entry point.
pub(crate) fn evaluate<'doc>(doc: &'doc [u8], compiled: &CompiledPath, options: &Options) -> Value<'doc> {
    if compiled.is_empty() {
        return Value::Null;
    }
    let mut budget = Budget::default();
    eval_path(doc, &compiled.segments, 0, EvalCtx::Siblings { start: 0 }, options, &mut budget)
}

fn eval_path<'doc>(
    doc: &'doc [u8],
    segments: &[Segment],
    idx: usize,
    ctx: EvalCtx<'doc>,
    options: &Options,
    budget: &mut Budget,
) -> Value<'doc> {
    if idx >= segments.len() {
        return match ctx {
            EvalCtx::Element(e) => apply_modifiers(terminal_value(&e), &[], options),
            EvalCtx::Siblings { .. } => Value::Null,
        };
    }

    let seg = &segments[idx];
    let raw = match ctx {
        EvalCtx::Element(e) => eval_from_element(doc, segments, idx, e, options, budget),
        EvalCtx::Siblings { start } => eval_from_siblings(doc, segments, idx, start, options, budget),
    };
    apply_modifiers(raw, &seg.modifiers, options)
}

fn eval_from_element<'doc>(
    doc: &'doc [u8],
    segments: &[Segment],
    idx: usize,
    e: MatchedElement<'doc>,
    options: &Options,
    budget: &mut Budget,
) -> Value<'doc> {
    let seg = &segments[idx];
    match &seg.kind {
        SegmentKind::Attribute(name) => {
            if idx + 1 < segments.len() {
                return Value::Null;
            }
            match e.tag.attrs.get(name.as_bytes(), options.case_sensitive) {
                Some(raw) => Value::Attribute(Scalar::new(raw, entity::decode(raw))),
                None => Value::Null,
            }
        }
        SegmentKind::Text => {
            if idx + 1 < segments.len() {
                return Value::Null;
            }
            let raw = e.content_bytes();
            Value::Str(Scalar::new(raw, Scanner::direct_text(raw)))
        }
        SegmentKind::Element { .. } | SegmentKind::WildcardSingle | SegmentKind::WildcardRecursive | SegmentKind::Filter { .. } => {
            match e.content {
                Some(content) => eval_path(
                    doc,
                    segments,
                    idx,
                    EvalCtx::Siblings { start: content.content_start },
                    options,
                    budget,
                ),
                None => Value::Null,
            }
        }
        // These need a preceding buffered candidate set, which a singular
        // element context by definition does not carry.
        SegmentKind::Index(_) | SegmentKind::Count | SegmentKind::FieldExtraction(_) => Value::Null,
    }
}

fn eval_from_siblings<'doc>(
    doc: &'doc [u8],
    segments: &[Segment],
    idx: usize,
    start: usize,
    options: &Options,
    budget: &mut Budget,
) -> Value<'doc> {
    match &segments[idx].kind {
        SegmentKind::Element { prefix, local } => {
            let pfx = prefix.as_deref().map(str::as_bytes);
            let want_all = is_aggregator(segments.get(idx + 1));
            let limit = if want_all { MAX_WILDCARD_RESULTS } else { 1 };
            let candidates = collect_siblings(
                doc,
                start,
                |t: &ElementTag<'_>| t.matches_name(pfx, local.as_bytes(), options.case_sensitive),
                limit,
            );
            if want_all {
                continue_candidates(doc, segments, idx + 1, candidates, options, budget)
            } else {
                first_or_continue(doc, segments, idx, candidates, options, budget)
            }
        }
        SegmentKind::WildcardSingle => {
            let candidates = collect_siblings(doc, start, |_| true, MAX_WILDCARD_RESULTS);
            continue_candidates(doc, segments, idx + 1, candidates, options, budget)
        }
        SegmentKind::WildcardRecursive => eval_wildcard_recursive(doc, segments, idx, start, options, budget),
        SegmentKind::Filter { condition, all } => {
            let pool = collect_siblings(doc, start, |_| true, MAX_WILDCARD_RESULTS);
            let mut matching = Vec::new();
            for c in pool {
                if matching.len() >= MAX_WILDCARD_RESULTS {
                    break;
                }
                if eval_condition(condition, &c, options, budget) {
                    matching.push(c);
                }
            }
            if *all {
                continue_candidates(doc, segments, idx + 1, matching, options, budget)
            } else {
                first_or_continue(doc, segments, idx, matching, options, budget)
            }
        }
        // No preceding element match at this level: these need a buffered
        // set that was never created.
        SegmentKind::Attribute(_) | SegmentKind::Text | SegmentKind::Index(_) | SegmentKind::Count | SegmentKind::FieldExtraction(_) => {
            Value::Null
        }
    }
}

fn first_or_continue<'doc>(
    doc: &'doc [u8],
    segments: &[Segment],
    idx: usize,
    mut candidates: Vec<MatchedElement<'doc>>,
    options: &Options,
    budget: &mut Budget,
) -> Value<'doc> {
    if candidates.is_empty() {
        return Value::Null;
    }
    let first = candidates.remove(0);
    if idx + 1 >= segments.len() {
        terminal_value(&first)
    } else {
        eval_path(doc, segments, idx + 1, EvalCtx::Element(first), options, budget)
    }
}

/// Applies segment `idx` (an aggregate-consuming kind, or a plain
/// continuation) to a just-buffered candidate set.
fn continue_candidates<'doc>(
    doc: &'doc [u8],
    segments: &[Segment],
    idx: usize,
    candidates: Vec<MatchedElement<'doc>>,
    options: &Options,
    budget: &mut Budget,
) -> Value<'doc> {
    if idx >= segments.len() {
        let items: Vec<Value<'doc>> = candidates.iter().map(terminal_value).collect();
        return Value::Array(items).collapse_singleton();
    }
    match &segments[idx].kind {
        SegmentKind::Index(k) => apply_index(doc, segments, idx, candidates, *k, options, budget),
        SegmentKind::Count => Value::number(candidates.len() as f64, candidates.len().to_string()),
        SegmentKind::FieldExtraction(field) => apply_field_extraction(candidates, field, options),
        SegmentKind::Filter { condition, all } => {
            let mut matching = Vec::new();
            for c in candidates {
                if matching.len() >= MAX_WILDCARD_RESULTS {
                    break;
                }
                if eval_condition(condition, &c, options, budget) {
                    matching.push(c);
                }
            }
            if *all {
                continue_candidates(doc, segments, idx + 1, matching, options, budget)
            } else {
                first_or_continue(doc, segments, idx, matching, options, budget)
            }
        }
        _ => match candidates.len() {
            0 => Value::Null,
            1 => {
                let only = candidates.into_iter().next().unwrap();
                eval_path(doc, segments, idx, EvalCtx::Element(only), options, budget)
            }
            _ => Value::Array(
                candidates
                    .into_iter()
                    .map(|c| eval_path(doc, segments, idx, EvalCtx::Element(c), options, budget))
                    .collect(),
            ),
        },
    }
}

fn apply_index<'doc>(
    doc: &'doc [u8],
    segments: &[Segment],
    idx: usize,
    candidates: Vec<MatchedElement<'doc>>,
    k: i64,
    options: &Options,
    budget: &mut Budget,
) -> Value<'doc> {
    if candidates.is_empty() {
        return Value::Null;
    }
    let len = candidates.len() as i64;
    let resolved = if k < 0 { len + k } else { k };
    if resolved < 0 || resolved >= len {
        return Value::Null;
    }
    let chosen = candidates.into_iter().nth(resolved as usize).unwrap();
    if idx + 1 >= segments.len() {
        terminal_value(&chosen)
    } else {
        eval_path(doc, segments, idx + 1, EvalCtx::Element(chosen), options, budget)
    }
}

fn apply_field_extraction<'doc>(candidates: Vec<MatchedElement<'doc>>, field: &Field, options: &Options) -> Value<'doc> {
    let mut out = Vec::with_capacity(candidates.len());
    for c in &candidates {
        let value = match field {
            Field::Attribute(name) => match c.tag.attrs.get(name.as_bytes(), options.case_sensitive) {
                Some(raw) => Value::Attribute(Scalar::new(raw, entity::decode(raw))),
                None => Value::Null,
            },
            Field::Text => {
                let raw = c.content_bytes();
                Value::Str(Scalar::new(raw, Scanner::direct_text(raw)))
            }
            Field::Element(name) => match &c.content {
                Some(content) => {
                    let matched = collect_siblings(
                        c.doc,
                        content.content_start,
                        |t: &ElementTag<'_>| t.matches_name(None, name.as_bytes(), options.case_sensitive),
                        1,
                    );
                    match matched.into_iter().next() {
                        Some(m) => terminal_value(&m),
                        None => Value::Null,
                    }
                }
                None => Value::Null,
            },
        };
        out.push(value);
    }
    Value::Array(out)
}

fn eval_wildcard_recursive<'doc>(
    doc: &'doc [u8],
    segments: &[Segment],
    idx: usize,
    start: usize,
    options: &Options,
    budget: &mut Budget,
) -> Value<'doc> {
    let descendants = recursive_descendants(doc, start, budget);
    let next_idx = idx + 1;
    if next_idx >= segments.len() {
        let items: Vec<Value<'doc>> = descendants.iter().map(terminal_value).collect();
        return Value::Array(items).collapse_singleton();
    }

    let mut results = Vec::new();
    for d in descendants {
        if results.len() >= MAX_WILDCARD_RESULTS {
            break;
        }
        if !segment_matches_self(&segments[next_idx].kind, &d, options, budget) {
            continue;
        }
        let after = next_idx + 1;
        let value = if after >= segments.len() {
            terminal_value(&d)
        } else {
            eval_path(doc, segments, after, EvalCtx::Element(d), options, budget)
        };
        results.push(value);
    }
    Value::Array(results).collapse_singleton()
}

/// Tests whether `kind` matches a recursively-visited element *itself*,
/// as opposed to matching one of its children.
fn segment_matches_self(kind: &SegmentKind, d: &MatchedElement<'_>, options: &Options, budget: &mut Budget) -> bool {
    match kind {
        SegmentKind::Element { prefix, local } => {
            d.tag.matches_name(prefix.as_deref().map(str::as_bytes), local.as_bytes(), options.case_sensitive)
        }
        SegmentKind::WildcardSingle | SegmentKind::WildcardRecursive => true,
        SegmentKind::Attribute(name) => d.tag.attrs.get(name.as_bytes(), options.case_sensitive).is_some(),
        SegmentKind::Filter { condition, .. } => eval_condition(condition, d, options, budget),
        _ => false,
    }
}

fn recursive_descendants<'doc>(doc: &'doc [u8], start: usize, budget: &mut Budget) -> Vec<MatchedElement<'doc>> {
    let mut out = Vec::new();
    walk_recursive(doc, start, &mut out, budget);
    out
}

/// Checks the two caps bounding `**`'s depth-first walk, logging the first
/// time either one trips so long recursive queries leave a trace of why
/// they stopped short of full traversal.
fn budget_exhausted(out: &[MatchedElement<'_>], budget: &Budget) -> bool {
    if out.len() >= MAX_WILDCARD_RESULTS {
        log::debug!("pathxml: recursive descent stopped, collected {MAX_WILDCARD_RESULTS} matches");
        return true;
    }
    if budget.recursive_visits >= MAX_RECURSIVE_OPERATIONS {
        log::debug!("pathxml: recursive descent stopped, visited {MAX_RECURSIVE_OPERATIONS} elements");
        return true;
    }
    false
}

fn walk_recursive<'doc>(doc: &'doc [u8], start: usize, out: &mut Vec<MatchedElement<'doc>>, budget: &mut Budget) {
    let mut scanner = Scanner::at(doc, start);
    loop {
        if budget_exhausted(out, budget) {
            return;
        }
        if !scanner.skip_to_next_element() {
            return;
        }
        let tag = match scanner.parse_element_name() {
            Some(t) => t,
            None => return,
        };
        budget.recursive_visits += 1;

        if tag.self_closing {
            out.push(MatchedElement { tag, content: None, doc });
        } else {
            let content_start = tag.tag_end;
            match scanner.parse_element_content(&tag) {
                Some(content) => {
                    out.push(MatchedElement { tag, content: Some(content), doc });
                    if budget_exhausted(out, budget) {
                        return;
                    }
                    walk_recursive(doc, content_start, out, budget);
                }
                None => return,
            }
        }
    }
}

pub(crate) fn collect_siblings<'doc>(
    doc: &'doc [u8],
    start: usize,
    matches: impl Fn(&ElementTag<'doc>) -> bool,
    limit: usize,
) -> Vec<MatchedElement<'doc>> {
    let mut scanner = Scanner::at(doc, start);
    let mut out = Vec::new();
    while out.len() < limit {
        if !scanner.skip_to_next_element() {
            break;
        }
        let tag = match scanner.parse_element_name() {
            Some(t) => t,
            None => break,
        };
        let is_match = matches(&tag);
        if tag.self_closing {
            if is_match {
                out.push(MatchedElement { tag, content: None, doc });
            }
        } else {
            match scanner.parse_element_content(&tag) {
                Some(content) => {
                    if is_match {
                        out.push(MatchedElement { tag, content: Some(content), doc });
                    }
                }
                None => break,
            }
        }
    }
    out
}

fn eval_condition(condition: &FilterCondition, candidate: &MatchedElement<'_>, options: &Options, budget: &mut Budget) -> bool {
    if budget.filter_depth >= MAX_FILTER_DEPTH {
        return false;
    }
    budget.filter_depth += 1;
    let left = if condition.left.is_empty() {
        terminal_value(candidate)
    } else {
        eval_path(
            candidate.doc,
            &condition.left.segments,
            0,
            EvalCtx::Element(candidate.clone()),
            options,
            budget,
        )
    };
    budget.filter_depth -= 1;

    match condition.operator {
        Operator::Exists => left.exists(),
        Operator::Eq => left.str().trim() == condition.operand.trim(),
        Operator::Ne => left.str().trim() != condition.operand.trim(),
        Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => {
            match (parse_finite(&left.str()), parse_finite(&condition.operand)) {
                (Some(l), Some(r)) => condition.operator.eval_numeric(l, r),
                _ => false,
            }
        }
        Operator::Like => pattern::matches(&left.str(), &condition.operand),
        Operator::NotLike => !pattern::matches(&left.str(), &condition.operand),
    }
}

fn parse_finite(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn is_aggregator(seg: Option<&Segment>) -> bool {
    matches!(
        seg.map(|s| &s.kind),
        Some(SegmentKind::Index(_)) | Some(SegmentKind::Count) | Some(SegmentKind::Filter { .. }) | Some(SegmentKind::FieldExtraction(_))
    )
}

fn terminal_value<'doc>(e: &MatchedElement<'doc>) -> Value<'doc> {
    let raw = &e.doc[e.tag.tag_start..e.span_end()];
    let text = Scanner::direct_text(e.content_bytes());
    Value::Element(Scalar::new(raw, text))
}

fn apply_modifiers<'doc>(value: Value<'doc>, modifiers: &[String], options: &Options) -> Value<'doc> {
    if modifiers.is_empty() {
        return value;
    }
    crate::modifier::apply_chain(value, modifiers, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::try_compile;

    fn get<'doc>(doc: &'doc [u8], path: &str) -> Value<'doc> {
        let compiled = try_compile(path).unwrap();
        evaluate(doc, &compiled, &Options::default())
    }

    #[test]
    fn simple_nested_lookup() {
        let doc = b"<root><user><name>John</name></user></root>";
        let v = get(doc, "root.user.name");
        assert_eq!(v.str(), "John");
    }

    #[test]
    fn all_match_filter_projects_names() {
        let doc = b"<users><user><age>25</age><name>Alice</name></user><user><age>18</age><name>Bob</name></user></users>";
        let v = get(doc, "users.user.#(age>21)#.name");
        assert_eq!(v.kind(), crate::result::Kind::Array);
        let names: Vec<String> = v.array().iter().map(|x| x.str()).collect();
        assert_eq!(names, vec!["Alice"]);
    }

    #[test]
    fn glob_filter_matches_prefix() {
        let doc = b"<items><item><name>Dale</name></item><item><name>David</name></item><item><name>Roger</name></item></items>";
        let v = get(doc, r#"items.item.#(name%"D*")#.name"#);
        let names: Vec<String> = v.array().iter().map(|x| x.str()).collect();
        assert_eq!(names, vec!["Dale", "David"]);
    }

    #[test]
    fn first_match_filter_returns_scalar() {
        let doc = b"<users><user><age>25</age></user><user><age>18</age></user></users>";
        let v = get(doc, "users.user.#(age>21).age");
        assert_eq!(v.str(), "25");
    }

    #[test]
    fn count_segment() {
        let doc = b"<a><b/><b/><b/></a>";
        let v = get(doc, "a.b.#");
        assert_eq!(v.i64(), 3);
    }

    #[test]
    fn negative_index_selects_from_end() {
        let doc = b"<a><b>1</b><b>2</b><b>3</b></a>";
        let v = get(doc, "a.b.-1");
        assert_eq!(v.str(), "3");
    }

    #[test]
    fn attribute_segment() {
        let doc = br#"<a><b x="1"/></a>"#;
        let v = get(doc, "a.b.@x");
        assert_eq!(v.str(), "1");
    }

    #[test]
    fn recursive_wildcard_finds_any_depth() {
        let doc = b"<a><b><c><name>deep</name></c></b></a>";
        let v = get(doc, "**.name");
        assert_eq!(v.str(), "deep");
    }

    #[test]
    fn recursive_wildcard_collects_multiple_matches_as_array() {
        let doc = b"<a><name>one</name><b><name>two</name></b></a>";
        let v = get(doc, "**.name");
        let names: Vec<String> = v.array().iter().map(|x| x.str()).collect();
        assert_eq!(names, vec!["one", "two"]);
    }

    #[test]
    fn multi_root_fragment_count() {
        let doc = b"<item>a</item><item>b</item><item>c</item>";
        let v = get(doc, "item.#");
        assert_eq!(v.i64(), 3);
    }

    #[test]
    fn missing_path_returns_null() {
        let doc = b"<a><b/></a>";
        let v = get(doc, "a.c.d");
        assert!(!v.exists());
    }

    #[test]
    fn wildcard_results_are_bounded() {
        let mut doc = String::from("<root>");
        for i in 0..(MAX_WILDCARD_RESULTS + 50) {
            doc.push_str(&format!("<n>{i}</n>"));
        }
        doc.push_str("</root>");
        let v = get(doc.as_bytes(), "root.n.#(n>-1)#.%");
        assert!(v.array().len() <= MAX_WILDCARD_RESULTS);
    }
}
