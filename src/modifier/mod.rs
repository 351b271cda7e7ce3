//! The modifier pipeline: named unary transforms over a
//! [`Value`], attached to a path segment with `|@name` and run after that
//! segment's result is formed.
//!
//! The registry mirrors [`crate::path::cache`]'s shape: a `Mutex`-guarded
//! map behind a `once_cell::sync::Lazy`, serializing the rare
//! register/unregister call against the read-dominant apply path.

use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::options::Options;
use crate::result::{Scalar, Value};
use crate::scanner::entity;
use crate::scanner::Scanner;

/// A registered modifier: a pure function from one `Value` to another.
/// Plain `fn` pointers (rather than `Box<dyn Fn>`) keep registration
/// lifetime-agnostic, since a modifier must not capture anything tied to a
/// particular document.
pub(crate) type ModifierFn = for<'doc> fn(Value<'doc>, &Options) -> Value<'doc>;

static REGISTRY: Lazy<Mutex<HashMap<String, ModifierFn>>> = Lazy::new(|| {
    let mut m: HashMap<String, ModifierFn> = HashMap::new();
    m.insert("sort".to_string(), sort as ModifierFn);
    m.insert("reverse".to_string(), reverse as ModifierFn);
    m.insert("first".to_string(), first as ModifierFn);
    m.insert("last".to_string(), last as ModifierFn);
    m.insert("pretty".to_string(), pretty as ModifierFn);
    m.insert("flatten".to_string(), flatten as ModifierFn);
    m.insert("upper".to_string(), upper as ModifierFn);
    m.insert("lower".to_string(), lower as ModifierFn);
    Mutex::new(m)
});

/// Runs `value` through each named modifier in order. Unknown names are
/// skipped rather than erroring, consistent with the rest of the crate's
/// tolerant-by-default posture.
pub(crate) fn apply_chain<'doc>(value: Value<'doc>, names: &[String], options: &Options) -> Value<'doc> {
    if names.is_empty() {
        return value;
    }
    let registry = REGISTRY.lock().unwrap();
    let mut current = value;
    for name in names {
        if let Some(f) = registry.get(name.as_str()) {
            current = f(current, options);
        }
    }
    current
}

/// Registers or replaces a modifier under `name`. Exposed for tests that
/// need to exercise the registry's own register/unregister contract (spec
/// §4.5: "MUST support registration/unregistration for tests").
#[cfg(test)]
pub(crate) fn register(name: impl Into<String>, f: ModifierFn) {
    REGISTRY.lock().unwrap().insert(name.into(), f);
}

#[cfg(test)]
pub(crate) fn unregister(name: &str) {
    REGISTRY.lock().unwrap().remove(name);
}

fn sort<'doc>(value: Value<'doc>, _options: &Options) -> Value<'doc> {
    match value {
        Value::Array(mut items) => {
            items.sort_by(|a, b| a.str().cmp(&b.str()));
            Value::Array(items)
        }
        other => other,
    }
}

fn reverse<'doc>(value: Value<'doc>, _options: &Options) -> Value<'doc> {
    match value {
        Value::Array(mut items) => {
            items.reverse();
            Value::Array(items)
        }
        other => other,
    }
}

fn first<'doc>(value: Value<'doc>, _options: &Options) -> Value<'doc> {
    match value {
        Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
        other => other,
    }
}

fn last<'doc>(value: Value<'doc>, _options: &Options) -> Value<'doc> {
    match value {
        Value::Array(mut items) => items.pop().unwrap_or(Value::Null),
        other => other,
    }
}

fn flatten<'doc>(value: Value<'doc>, _options: &Options) -> Value<'doc> {
    match value {
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Array(inner) => out.extend(inner),
                    other => out.push(other),
                }
            }
            Value::Array(out)
        }
        other => other,
    }
}

fn upper<'doc>(value: Value<'doc>, options: &Options) -> Value<'doc> {
    map_text(value, options, str::to_uppercase)
}

fn lower<'doc>(value: Value<'doc>, options: &Options) -> Value<'doc> {
    map_text(value, options, str::to_lowercase)
}

fn map_text<'doc>(value: Value<'doc>, options: &Options, f: fn(&str) -> String) -> Value<'doc> {
    match value {
        Value::Str(s) => Value::Str(Scalar::new(s.raw(), f(s.text()))),
        Value::Element(s) => Value::Element(Scalar::new(s.raw(), f(s.text()))),
        Value::Attribute(s) => Value::Attribute(Scalar::new(s.raw(), f(s.text()))),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| map_text(v, options, f)).collect()),
        other => other,
    }
}

/// Reformats XML markup with indentation. Operates on a value's raw bytes,
/// which may be any well-formed-enough fragment (an `Element`'s own
/// markup, or a `Str` produced by an earlier `pretty` in the chain).
fn pretty<'doc>(value: Value<'doc>, options: &Options) -> Value<'doc> {
    match value {
        Value::Element(s) => {
            let text = pretty_print(s.raw(), options);
            Value::Str(Scalar::new(s.raw(), text))
        }
        Value::Str(s) => {
            let text = pretty_print(s.raw(), options);
            Value::Str(Scalar::new(s.raw(), text))
        }
        Value::Array(items) => Value::Array(items.into_iter().map(|v| pretty(v, options)).collect()),
        other => other,
    }
}

fn pretty_print(raw: &[u8], options: &Options) -> String {
    let mut out = String::new();
    render_siblings(raw, 0, 0, options, &mut out);
    out.trim_end().to_string()
}

fn render_siblings(bytes: &[u8], start: usize, depth: usize, options: &Options, out: &mut String) {
    let mut scanner = Scanner::at(bytes, start);
    loop {
        let text_start = scanner.pos();
        if !scanner.skip_to_next_element() {
            push_text_line(bytes, text_start, scanner.pos().min(bytes.len()), depth, options, out);
            return;
        }
        push_text_line(bytes, text_start, scanner.pos(), depth, options, out);

        match scanner.parse_element_name() {
            Some(tag) => {
                push_indent(out, depth, options);
                out.push('<');
                push_tag_name(&tag, out);
                for (k, v) in tag.attrs.iter() {
                    out.push(' ');
                    out.push_str(&String::from_utf8_lossy(k));
                    out.push_str("=\"");
                    out.push_str(&entity::escape(&entity::decode(v)));
                    out.push('"');
                }
                if tag.self_closing {
                    out.push_str("/>\n");
                    continue;
                }
                out.push_str(">\n");
                if let Some(content) = scanner.parse_element_content(&tag) {
                    render_siblings(bytes, content.content_start, depth + 1, options, out);
                    push_indent(out, depth, options);
                    out.push_str("</");
                    push_tag_name(&tag, out);
                    out.push_str(">\n");
                } else {
                    return;
                }
            }
            None => return,
        }
    }
}

fn push_text_line(bytes: &[u8], start: usize, end: usize, depth: usize, options: &Options, out: &mut String) {
    if start >= end {
        return;
    }
    let trimmed = trim(&bytes[start..end]);
    if trimmed.is_empty() {
        return;
    }
    push_indent(out, depth, options);
    out.push_str(&entity::decode(trimmed));
    out.push('\n');
}

fn push_indent(out: &mut String, depth: usize, options: &Options) {
    for _ in 0..depth {
        out.push_str(&options.indent);
    }
}

fn push_tag_name(tag: &crate::scanner::ElementTag<'_>, out: &mut String) {
    if let Some(prefix) = tag.prefix {
        out.push_str(&String::from_utf8_lossy(prefix));
        out.push(':');
    }
    out.push_str(&String::from_utf8_lossy(tag.local));
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b > b' ');
    let end = bytes.iter().rposition(|&b| b > b' ');
    match (start, end) {
        (Some(s), Some(e)) => &bytes[s..=e],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arr<'a>(items: Vec<&'a str>) -> Value<'a> {
        Value::Array(items.into_iter().map(|s| Value::Str(Scalar::new(b"", s.to_string()))).collect())
    }

    #[test]
    fn sort_orders_lexicographically() {
        let v = apply_chain(arr(vec!["banana", "apple", "cherry"]), &["sort".to_string()], &Options::default());
        let names: Vec<String> = v.array().iter().map(|x| x.str()).collect();
        assert_eq!(names, vec!["apple", "banana", "cherry"]);
    }

    #[test]
    fn reverse_flips_order() {
        let v = apply_chain(arr(vec!["a", "b", "c"]), &["reverse".to_string()], &Options::default());
        let names: Vec<String> = v.array().iter().map(|x| x.str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[test]
    fn first_and_last() {
        let v = apply_chain(arr(vec!["a", "b", "c"]), &["first".to_string()], &Options::default());
        assert_eq!(v.str(), "a");
        let v = apply_chain(arr(vec!["a", "b", "c"]), &["last".to_string()], &Options::default());
        assert_eq!(v.str(), "c");
    }

    #[test]
    fn first_on_empty_array_is_null() {
        let v = apply_chain(Value::Array(vec![]), &["first".to_string()], &Options::default());
        assert!(!v.exists());
    }

    #[test]
    fn flatten_merges_one_level() {
        let nested = Value::Array(vec![arr(vec!["a", "b"]), arr(vec!["c"])]);
        let v = apply_chain(nested, &["flatten".to_string()], &Options::default());
        let names: Vec<String> = v.array().iter().map(|x| x.str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn upper_and_lower_transform_text() {
        let v = Value::Str(Scalar::new(b"", "MiXeD".to_string()));
        assert_eq!(apply_chain(v.clone(), &["upper".to_string()], &Options::default()).str(), "MIXED");
        assert_eq!(apply_chain(v, &["lower".to_string()], &Options::default()).str(), "mixed");
    }

    #[test]
    fn chained_modifiers_apply_in_order() {
        let v = apply_chain(
            arr(vec!["banana", "apple"]),
            &["sort".to_string(), "first".to_string()],
            &Options::default(),
        );
        assert_eq!(v.str(), "apple");
    }

    #[test]
    fn pretty_reformats_nested_markup() {
        let raw = b"<a><b>1</b><c/></a>";
        let v = Value::Element(Scalar::new(raw, String::new()));
        let out = apply_chain(v, &["pretty".to_string()], &Options::default()).str();
        assert!(out.contains("<a>\n"));
        assert!(out.contains("  <b>\n"));
        assert!(out.contains("1\n"));
        assert!(out.contains("  <c/>\n") || out.contains("  <c/>"));
    }

    #[test]
    fn unknown_modifier_is_skipped() {
        let v = apply_chain(arr(vec!["a"]), &["no-such-modifier".to_string()], &Options::default());
        assert_eq!(v.array().len(), 1);
    }

    #[test]
    fn register_and_unregister_round_trip() {
        fn shout<'doc>(v: Value<'doc>, _o: &Options) -> Value<'doc> {
            Value::Str(Scalar::new(b"", format!("{}!", v.str())))
        }
        register("shout", shout as ModifierFn);
        let v = apply_chain(Value::Str(Scalar::new(b"", "hi".to_string())), &["shout".to_string()], &Options::default());
        assert_eq!(v.str(), "hi!");
        unregister("shout");
        let v = apply_chain(Value::Str(Scalar::new(b"", "hi".to_string())), &["shout".to_string()], &Options::default());
        assert_eq!(v.str(), "hi");
    }
}
