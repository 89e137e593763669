//! Building label lists for metric names.

use crate::formatting::escape_label_value;
use crate::validator::{valid_label_key_character, valid_label_key_start_character};

/// Something that can describe itself as a label list.
///
/// Implement this for request or tenant descriptors to derive metric names from them with
/// [`compose_name`].
pub trait LabelComposer {
    /// Renders the label list, braces included, or an empty string for no labels.
    fn to_labels(&self) -> String;
}

/// An ordered list of labels.
///
/// Keys are sanitized to `[a-zA-Z_][a-zA-Z0-9_]*` and values are escaped, so the result is always
/// a valid label list.
///
/// ```
/// use vmetrics::labels;
///
/// let name = labels().add("path", "/api").add("code", 200).compose("requests_total");
/// assert_eq!(name, r#"requests_total{path="/api",code="200"}"#);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelsBuilder {
    labels: Vec<(String, String)>,
}

/// Starts an empty [`LabelsBuilder`].
pub fn labels() -> LabelsBuilder {
    LabelsBuilder::default()
}

impl LabelsBuilder {
    /// Appends a label.
    #[must_use]
    pub fn add<K, V>(mut self, key: K, value: V) -> Self
    where
        K: AsRef<str>,
        V: ToString,
    {
        let value = escape_label_value(&value.to_string());
        self.labels.push((sanitize_label_key(key.as_ref()), value));
        self
    }

    /// Returns `true` if no labels were added.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Renders the label list as `{k1="v1",k2="v2"}`, or an empty string when there are no labels.
    pub fn build(&self) -> String {
        if self.labels.is_empty() {
            return String::new();
        }

        let mut buffer = String::from("{");
        for (i, (key, value)) in self.labels.iter().enumerate() {
            if i > 0 {
                buffer.push(',');
            }
            buffer.push_str(key);
            buffer.push_str("=\"");
            buffer.push_str(value);
            buffer.push('"');
        }
        buffer.push('}');
        buffer
    }

    /// Appends the label list to `base`.
    pub fn compose(&self, base: &str) -> String {
        compose_name(base, self)
    }
}

impl LabelComposer for LabelsBuilder {
    fn to_labels(&self) -> String {
        self.build()
    }
}

/// Returns `base` followed by the label list of `labels`.
pub fn compose_name<L: LabelComposer + ?Sized>(base: &str, labels: &L) -> String {
    let mut name = String::from(base);
    name.push_str(&labels.to_labels());
    name
}

fn sanitize_label_key(key: &str) -> String {
    // The first character must be [a-zA-Z_], and all subsequent characters must be [a-zA-Z0-9_].
    if key.is_empty() {
        return "_".to_string();
    }
    key.chars()
        .enumerate()
        .map(|(i, c)| {
            if i == 0 && valid_label_key_start_character(c)
                || i != 0 && valid_label_key_character(c)
            {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{compose_name, labels, sanitize_label_key, LabelComposer};
    use crate::validator::validate_metric_name;
    use proptest::prelude::*;

    struct Route {
        method: &'static str,
        status: u16,
    }

    impl LabelComposer for Route {
        fn to_labels(&self) -> String {
            labels().add("method", self.method).add("status", self.status).build()
        }
    }

    #[test]
    fn test_build() {
        assert_eq!(labels().build(), "");
        assert!(labels().is_empty());
        assert_eq!(labels().add("a", "b").build(), r#"{a="b"}"#);
        assert_eq!(
            labels().add("a", "b").add("c", 1.5).add("d", true).build(),
            r#"{a="b",c="1.5",d="true"}"#
        );
    }

    #[test]
    fn test_compose_with_custom_composer() {
        let route = Route { method: "GET", status: 404 };
        assert_eq!(
            compose_name("http_requests_total", &route),
            r#"http_requests_total{method="GET",status="404"}"#
        );
        assert_eq!(labels().compose("plain"), "plain");
    }

    #[test]
    fn test_sanitize_label_key_known_cases() {
        let cases = &[
            ("", "_"),
            ("*", "_"),
            ("\"", "_"),
            (":", "_"),
            ("foo_bar", "foo_bar"),
            ("1foobar", "_foobar"),
            ("foo.bar", "foo_bar"),
            ("foo1bar2", "foo1bar2"),
        ];

        for (input, expected) in cases {
            assert_eq!(&sanitize_label_key(input), expected);
        }
    }

    #[test]
    fn test_values_are_escaped() {
        assert_eq!(labels().add("q", "say \"hi\"\n").build(), r#"{q="say \"hi\"\n"}"#);
    }

    proptest! {
        #[test]
        fn test_composed_names_are_valid(
            key in ".{0,12}",
            value in ".{0,24}",
        ) {
            let name = labels().add(&key, &value).compose("metric");
            prop_assert_eq!(validate_metric_name(&name), Ok(()));
        }
    }
}
