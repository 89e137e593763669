//! Grammar checks for metric names and label lists.
//!
//! A metric name has the form `base{key="value",...}`:
//!
//! - `base` matches `[a-zA-Z_:][a-zA-Z0-9_:.]*`
//! - label keys match `[a-zA-Z_][a-zA-Z0-9_]*`
//! - label values are double-quoted, with `\` escaping the next character
//! - whitespace is not permitted anywhere outside a quoted value

use std::borrow::Cow;

use thiserror::Error;

/// Errors that describe why a metric name or label list was rejected.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The metric name was empty.
    #[error("metric name cannot be empty")]
    Empty,

    /// The metric base name contained an invalid character or was empty.
    #[error("invalid metric base name {0:?}: must match [a-zA-Z_:][a-zA-Z0-9_:.]*")]
    InvalidBaseName(String),

    /// A label key contained an invalid character or was empty.
    #[error("invalid label key {0:?}: must match [a-zA-Z_][a-zA-Z0-9_]*")]
    InvalidLabelKey(String),

    /// The label list was opened with `{` but the name did not end with `}`.
    #[error("missing closing '}}' in {0:?}")]
    MissingClosingBrace(String),

    /// A `}` appeared without a matching `{`.
    #[error("unexpected '}}' in {0:?}")]
    UnexpectedClosingBrace(String),

    /// A label key was not followed by `=`.
    #[error("missing '=' after label key in {0:?}")]
    MissingEquals(String),

    /// A label value did not start with `"`.
    #[error("missing opening quote for the value of label {0:?}")]
    MissingOpeningQuote(String),

    /// A label value was not terminated by `"`.
    #[error("missing closing quote for the value of label {0:?}")]
    MissingClosingQuote(String),

    /// Something other than `,` followed a label value.
    #[error("expected ',' after the value of label {label:?}, found {tail:?}")]
    MissingComma {
        /// The label whose value was just closed.
        label: String,
        /// The unexpected remainder.
        tail: String,
    },

    /// The label list ended with `,`.
    #[error("trailing comma in label list")]
    TrailingComma,
}

/// Validates a full metric name, including its optional label list.
///
/// ## Errors
///
/// Returns the first grammar violation found in `name`.
pub fn validate_metric_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Empty);
    }

    match name.find('{') {
        None => {
            if name.contains('}') {
                return Err(ValidationError::UnexpectedClosingBrace(name.to_string()));
            }
            validate_base_name(name)
        }
        Some(n) => {
            validate_base_name(&name[..n])?;
            let labels = name[n + 1..]
                .strip_suffix('}')
                .ok_or_else(|| ValidationError::MissingClosingBrace(name.to_string()))?;
            validate_labels(labels)
        }
    }
}

/// Validates a comma-separated label list such as `foo="bar",baz="qux"`, without braces.
///
/// An empty string is a valid, empty label list.
///
/// ## Errors
///
/// Returns the first grammar violation found in `labels`.
pub fn validate_labels(labels: &str) -> Result<(), ValidationError> {
    let mut rest = labels;
    while !rest.is_empty() {
        let eq = rest.find('=').ok_or_else(|| ValidationError::MissingEquals(rest.to_string()))?;
        let key = &rest[..eq];
        validate_label_key(key)?;

        rest = rest[eq + 1..]
            .strip_prefix('"')
            .ok_or_else(|| ValidationError::MissingOpeningQuote(key.to_string()))?;
        let end = find_closing_quote(rest)
            .ok_or_else(|| ValidationError::MissingClosingQuote(key.to_string()))?;
        rest = &rest[end + 1..];

        if rest.is_empty() {
            break;
        }
        rest = rest.strip_prefix(',').ok_or_else(|| ValidationError::MissingComma {
            label: key.to_string(),
            tail: rest.to_string(),
        })?;
        if rest.is_empty() {
            return Err(ValidationError::TrailingComma);
        }
    }

    Ok(())
}

/// Returns the canonical spelling of a valid metric name.
///
/// An empty label list is dropped and labels are ordered by key, so `foo{}` becomes `foo` and
/// `foo{b="2",a="1"}` becomes `foo{a="1",b="2"}`. Names that do not parse are returned unchanged.
pub(crate) fn canonical_name(name: &str) -> Cow<'_, str> {
    let Some(open) = name.find('{') else {
        return Cow::Borrowed(name);
    };
    let base = &name[..open];
    let Some(labels) = name[open + 1..].strip_suffix('}') else {
        return Cow::Borrowed(name);
    };
    if labels.is_empty() {
        return Cow::Borrowed(base);
    }

    let Some(mut pairs) = split_label_pairs(labels) else {
        return Cow::Borrowed(name);
    };
    if pairs.windows(2).all(|w| w[0].0 <= w[1].0) {
        return Cow::Borrowed(name);
    }
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut canonical = String::with_capacity(name.len());
    canonical.push_str(base);
    canonical.push('{');
    for (i, (_, pair)) in pairs.iter().enumerate() {
        if i > 0 {
            canonical.push(',');
        }
        canonical.push_str(pair);
    }
    canonical.push('}');
    Cow::Owned(canonical)
}

// Splits a label list into `(key, key="value")` pairs.
fn split_label_pairs(labels: &str) -> Option<Vec<(&str, &str)>> {
    let mut pairs = Vec::new();
    let mut rest = labels;
    while !rest.is_empty() {
        let eq = rest.find('=')?;
        let value = rest[eq + 1..].strip_prefix('"')?;
        let end = eq + 2 + find_closing_quote(value)? + 1;
        pairs.push((&rest[..eq], &rest[..end]));

        rest = &rest[end..];
        if !rest.is_empty() {
            rest = rest.strip_prefix(',')?;
        }
    }
    Some(pairs)
}

fn validate_base_name(base: &str) -> Result<(), ValidationError> {
    let mut chars = base.chars();
    let valid = match chars.next() {
        Some(c) => valid_base_start_character(c) && chars.all(valid_base_character),
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidBaseName(base.to_string()))
    }
}

fn validate_label_key(key: &str) -> Result<(), ValidationError> {
    let mut chars = key.chars();
    let valid = match chars.next() {
        Some(c) => valid_label_key_start_character(c) && chars.all(valid_label_key_character),
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidLabelKey(key.to_string()))
    }
}

// Returns the byte offset of the first unescaped `"` in `s`.
fn find_closing_quote(s: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, b) in s.bytes().enumerate() {
        match b {
            _ if escaped => escaped = false,
            b'\\' => escaped = true,
            b'"' => return Some(i),
            _ => {}
        }
    }
    None
}

#[inline]
fn valid_base_start_character(c: char) -> bool {
    // Essentially, needs to match the regex pattern of [a-zA-Z_:].
    c.is_ascii_alphabetic() || c == '_' || c == ':'
}

#[inline]
fn valid_base_character(c: char) -> bool {
    // Essentially, needs to match the regex pattern of [a-zA-Z0-9_:.].
    c.is_ascii_alphanumeric() || c == '_' || c == ':' || c == '.'
}

#[inline]
pub(crate) fn valid_label_key_start_character(c: char) -> bool {
    // Essentially, needs to match the regex pattern of [a-zA-Z_].
    c.is_ascii_alphabetic() || c == '_'
}

#[inline]
pub(crate) fn valid_label_key_character(c: char) -> bool {
    // Essentially, needs to match the regex pattern of [a-zA-Z0-9_].
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::{canonical_name, validate_labels, validate_metric_name, ValidationError};
    use proptest::prelude::*;

    #[test]
    fn test_valid_metric_names() {
        let cases = &[
            "a",
            "_9:8",
            "a{}",
            r#"a{foo="bar"}"#,
            r#"a{b="c"}"#,
            r#"foo{bar="baz",x="y\"z"}"#,
            r#"foo{bar="b}az"}"#,
            r#":foo:bar{bar="a",baz="b"}"#,
            r#"some.foo{bar="baz"}"#,
            r#"foo{bar="with spaces inside"}"#,
            r#"foo{bar="ends with backslash\\"}"#,
        ];

        for name in cases {
            assert_eq!(validate_metric_name(name), Ok(()), "expected {name:?} to be valid");
        }
    }

    #[test]
    fn test_invalid_metric_names() {
        let cases = &[
            "",
            "{}",
            "a ",
            " a",
            " a ",
            "a {}",
            "a{} ",
            "a{ }",
            r#"a{foo ="bar"}"#,
            r#"a{ foo="bar"}"#,
            r#"a{foo= "bar"}"#,
            r#"a{foo="bar" }"#,
            r#"a{foo="bar" ,baz="a"}"#,
            r#"foo{bar="baz", x="y\"z"}"#,
            "a{foo}",
            "a{=}",
            r#"a{=""}"#,
            "a{",
            "a}",
            "a{foo=}",
            r#"a{foo="#,
            r#"a{foo="}"#,
            r#"a{foo="bar",}"#,
            r#"a{foo="bar", x"#,
            r#"a{foo="bar", x="#,
            r#"a{foo="bar", x=""#,
            r#"a{foo="bar", x="}"#,
            r#"a{foo="bar"}x"#,
            r#"a{foo="bar"x}"#,
            "1abc",
            ".abc",
            r#"a{1b="c"}"#,
            r#"a{b.c="d"}"#,
        ];

        for name in cases {
            assert!(validate_metric_name(name).is_err(), "expected {name:?} to be invalid");
        }
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(validate_metric_name(""), Err(ValidationError::Empty));
        assert_eq!(validate_labels(r#"foo="bar","#), Err(ValidationError::TrailingComma));
        assert_eq!(
            validate_labels(r#"foo="bar"#),
            Err(ValidationError::MissingClosingQuote("foo".to_string()))
        );
        assert_eq!(
            validate_metric_name(r#"a{foo="bar""#),
            Err(ValidationError::MissingClosingBrace(r#"a{foo="bar""#.to_string()))
        );
        assert_eq!(
            validate_labels("foo=bar"),
            Err(ValidationError::MissingOpeningQuote("foo".to_string()))
        );
        assert!(matches!(
            validate_labels(r#"foo="bar" "#),
            Err(ValidationError::MissingComma { .. })
        ));
    }

    #[test]
    fn test_validate_labels() {
        assert_eq!(validate_labels(""), Ok(()));
        assert_eq!(validate_labels(r#"label1="value1",label2="value2""#), Ok(()));
        assert!(validate_labels("{}").is_err());
        assert!(validate_labels(r#"a="b"c="d""#).is_err());
    }

    #[test]
    fn test_canonical_name() {
        let cases = &[
            ("foo", "foo"),
            ("foo{}", "foo"),
            (r#"foo{a="1"}"#, r#"foo{a="1"}"#),
            (r#"foo{a="1",b="2"}"#, r#"foo{a="1",b="2"}"#),
            (r#"foo{b="2",a="1"}"#, r#"foo{a="1",b="2"}"#),
            (r#"foo{c="x,y=\"z",a="}{"}"#, r#"foo{a="}{",c="x,y=\"z"}"#),
            (r#"foo{path="/a",quantile="0.5",a="b"}"#, r#"foo{a="b",path="/a",quantile="0.5"}"#),
        ];

        for (name, expected) in cases {
            assert_eq!(canonical_name(name), *expected, "{name:?}");
            assert_eq!(validate_metric_name(&canonical_name(name)), Ok(()));
        }
    }

    proptest! {
        #[test]
        fn test_generated_names_are_valid(
            base in "[a-zA-Z_:][a-zA-Z0-9_:.]{0,16}",
            labels in proptest::collection::vec(
                ("[a-zA-Z_][a-zA-Z0-9_]{0,8}", "[^\"\\\\]{0,12}"),
                0..4,
            ),
        ) {
            let labels = labels
                .iter()
                .map(|(k, v)| format!("{k}=\"{v}\""))
                .collect::<Vec<_>>()
                .join(",");
            let name = if labels.is_empty() { base } else { format!("{base}{{{labels}}}") };
            prop_assert_eq!(validate_metric_name(&name), Ok(()));
        }

        #[test]
        fn test_whitespace_outside_quotes_is_rejected(
            base in "[a-zA-Z_:][a-zA-Z0-9_:.]{0,16}",
            ws in "[ \t\n]",
        ) {
            let leading = format!("{ws}{base}");
            let trailing = format!("{base}{ws}");
            prop_assert!(validate_metric_name(&leading).is_err());
            prop_assert!(validate_metric_name(&trailing).is_err());
        }
    }
}
