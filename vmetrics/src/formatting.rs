//! Helpers for rendering metrics in the Prometheus [exposition format].
//!
//! [exposition format]: https://github.com/prometheus/docs/blob/main/content/docs/instrumenting/exposition_formats.md#text-format-details

use tracing::warn;

/// A sample value as it appears at the end of an exposition line.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Value {
    Unsigned(u64),
    Float(f64),
}

/// Splits `name` into its base and its label list, braces included.
///
/// `foo{bar="baz"}` splits into `("foo", "{bar=\"baz\"}")`, and `foo` into `("foo", "")`.
pub fn split_metric_name(name: &str) -> (&str, &str) {
    match name.find('{') {
        Some(n) => name.split_at(n),
        None => (name, ""),
    }
}

/// Merges `tag` into the label list of `name`.
///
/// `name` may be a bare base (`foo`), carry an empty label list (`foo{}`), carry labels
/// (`foo{a="b"}`), or be a label list on its own (`{a="b"}`). The tag is always appended last.
///
/// ```
/// use vmetrics::add_tag;
///
/// assert_eq!(add_tag("foo", r#"quantile="0.5""#), r#"foo{quantile="0.5"}"#);
/// assert_eq!(add_tag("foo{}", r#"le="1""#), r#"foo{le="1"}"#);
/// assert_eq!(add_tag(r#"foo{a="b"}"#, r#"le="1""#), r#"foo{a="b",le="1"}"#);
/// ```
pub fn add_tag(name: &str, tag: &str) -> String {
    let Some(open) = name.strip_suffix('}') else {
        return format!("{name}{{{tag}}}");
    };

    let mut buffer = String::with_capacity(name.len() + tag.len() + 1);
    buffer.push_str(open);
    if !open.ends_with('{') {
        buffer.push(',');
    }
    buffer.push_str(tag);
    buffer.push('}');
    buffer
}

/// Rewrites rendered exposition text so that every sample carries `extra_labels`.
///
/// Each line is trimmed. Blank lines are dropped and comment lines pass through verbatim. For
/// sample lines, `extra_labels` is placed first in the existing label list, or a new label list
/// is synthesized before the value when the sample has none.
///
/// ```
/// use vmetrics::add_extra_labels;
///
/// assert_eq!(add_extra_labels("a 123", r#"foo="bar""#), "a{foo=\"bar\"} 123\n");
/// assert_eq!(add_extra_labels(r#"a{b="c"} 1.3"#, r#"foo="bar""#), "a{foo=\"bar\",b=\"c\"} 1.3\n");
/// ```
pub fn add_extra_labels(text: &str, extra_labels: &str) -> String {
    let mut buffer = String::with_capacity(text.len() + text.len() / 4);

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('#') || extra_labels.is_empty() {
            buffer.push_str(line);
            buffer.push('\n');
            continue;
        }

        if let Some(n) = line.find('{') {
            let (head, tail) = line.split_at(n + 1);
            buffer.push_str(head);
            buffer.push_str(extra_labels);
            if !tail.starts_with('}') {
                buffer.push(',');
            }
            buffer.push_str(tail);
        } else if let Some(n) = line.rfind(|c: char| c.is_ascii_whitespace()) {
            let (name, value) = line.split_at(n);
            buffer.push_str(name.trim_end());
            buffer.push('{');
            buffer.push_str(extra_labels);
            buffer.push('}');
            buffer.push_str(value);
        } else {
            warn!(line, "sample line has no value; passing it through without extra labels");
            buffer.push_str(line);
        }
        buffer.push('\n');
    }

    buffer
}

/// Writes the `# HELP` and `# TYPE` lines for a metric family.
pub(crate) fn write_metadata(buffer: &mut String, base: &str, metric_type: &str) {
    buffer.push_str("# HELP ");
    buffer.push_str(base);
    buffer.push('\n');
    buffer.push_str("# TYPE ");
    buffer.push_str(base);
    buffer.push(' ');
    buffer.push_str(metric_type);
    buffer.push('\n');
}

/// Writes `<base><suffix><labels> <value>\n`.
pub(crate) fn write_metric_line(
    buffer: &mut String,
    base: &str,
    suffix: &str,
    labels: &str,
    value: Value,
) {
    buffer.push_str(base);
    buffer.push_str(suffix);
    buffer.push_str(labels);
    buffer.push(' ');
    write_value(buffer, value);
    buffer.push('\n');
}

/// Writes a full metric name followed by its value.
pub(crate) fn write_sample(buffer: &mut String, name: &str, value: Value) {
    write_metric_line(buffer, name, "", "", value);
}

pub(crate) fn write_value(buffer: &mut String, value: Value) {
    use std::fmt::Write;

    match value {
        Value::Unsigned(v) => buffer.push_str(itoa::Buffer::new().format(v)),
        Value::Float(v) if v.is_nan() => buffer.push_str("NaN"),
        Value::Float(v) if v == f64::INFINITY => buffer.push_str("+Inf"),
        Value::Float(v) if v == f64::NEG_INFINITY => buffer.push_str("-Inf"),
        // `Display` for `f64` renders integral values without a fraction and everything else with
        // the shortest digit string that round-trips.
        Value::Float(v) => {
            let _ = write!(buffer, "{v}");
        }
    }
}

/// Escapes a label value so it can be placed between double quotes.
pub(crate) fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::{
        add_extra_labels, add_tag, escape_label_value, split_metric_name, write_value, Value,
    };
    use proptest::prelude::*;

    #[test]
    fn test_add_tag_known_cases() {
        let cases = &[
            ("foo", r#"le="1""#, r#"foo{le="1"}"#),
            ("foo{}", r#"le="1""#, r#"foo{le="1"}"#),
            (r#"foo{a="b"}"#, r#"le="1""#, r#"foo{a="b",le="1"}"#),
            ("", r#"vmrange="1...2""#, r#"{vmrange="1...2"}"#),
            (r#"{a="b"}"#, r#"vmrange="1...2""#, r#"{a="b",vmrange="1...2"}"#),
        ];

        for (name, tag, expected) in cases {
            assert_eq!(&add_tag(name, tag), expected);
        }
    }

    #[test]
    fn test_split_metric_name() {
        assert_eq!(split_metric_name("foo"), ("foo", ""));
        assert_eq!(split_metric_name(r#"foo{a="b"}"#), ("foo", r#"{a="b"}"#));
        assert_eq!(split_metric_name("foo{}"), ("foo", "{}"));
    }

    #[test]
    fn test_add_extra_labels_known_cases() {
        let cases = &[
            ("", r#"foo="bar""#, ""),
            ("a 123", r#"foo="bar""#, "a{foo=\"bar\"} 123\n"),
            (r#"a{b="c"} 1.3"#, r#"foo="bar""#, "a{foo=\"bar\",b=\"c\"} 1.3\n"),
            (
                r#"a{b="c}{"} 1.3"#,
                r#"foo="bar",baz="x""#,
                "a{foo=\"bar\",baz=\"x\",b=\"c}{\"} 1.3\n",
            ),
            ("a{} 1", r#"foo="bar""#, "a{foo=\"bar\"} 1\n"),
            ("foo 1\n\n\n  bar 2  \n", r#"x="y""#, "foo{x=\"y\"} 1\nbar{x=\"y\"} 2\n"),
            (
                "\tfoo{bar=\"baz\"} 1\n\tbaz 2\n",
                r#"a="b""#,
                "foo{a=\"b\",bar=\"baz\"} 1\nbaz{a=\"b\"} 2\n",
            ),
            (
                "# HELP foo\n# TYPE foo counter\nfoo 1\n",
                r#"a="b""#,
                "# HELP foo\n# TYPE foo counter\nfoo{a=\"b\"} 1\n",
            ),
            ("foo 1", "", "foo 1\n"),
            ("garbage", r#"a="b""#, "garbage\n"),
        ];

        for (text, extra, expected) in cases {
            assert_eq!(&add_extra_labels(text, extra), expected, "input: {text:?}");
        }
    }

    #[test]
    fn test_write_value_known_cases() {
        let cases = &[
            (Value::Unsigned(0), "0"),
            (Value::Unsigned(u64::MAX), "18446744073709551615"),
            (Value::Float(125.0), "125"),
            (Value::Float(-3.0), "-3"),
            (Value::Float(42.12), "42.12"),
            (Value::Float(0.1 + 0.2), "0.30000000000000004"),
            (Value::Float(f64::INFINITY), "+Inf"),
            (Value::Float(f64::NEG_INFINITY), "-Inf"),
            (Value::Float(f64::NAN), "NaN"),
        ];

        for (value, expected) in cases {
            let mut buffer = String::new();
            write_value(&mut buffer, *value);
            assert_eq!(&buffer, expected);
        }
    }

    #[test]
    fn test_escape_label_value() {
        let cases = &[
            ("plain", "plain"),
            ("\"", "\\\""),
            ("\\", "\\\\"),
            ("\n", "\\n"),
            ("a\"b\\c", "a\\\"b\\\\c"),
        ];

        for (input, expected) in cases {
            assert_eq!(&escape_label_value(input), expected);
        }
    }

    proptest! {
        #[test]
        fn test_float_values_round_trip(
            v in proptest::num::f64::NORMAL | proptest::num::f64::ZERO,
        ) {
            let mut buffer = String::new();
            write_value(&mut buffer, Value::Float(v));
            let parsed: f64 = buffer.parse().expect("rendered value should parse");
            prop_assert_eq!(parsed, v);
        }
    }
}
