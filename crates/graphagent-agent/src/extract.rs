//! Forgiving extraction of structured values from model free text.

use serde::de::DeserializeOwned;
use tracing::debug;

/// Outcome of extracting a structured value from model output.
///
/// Both variants carry a usable value; `Fallback` means the model output could
/// not be parsed and the caller's default was substituted.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted<T> {
    Parsed(T),
    Fallback(T),
}

impl<T> Extracted<T> {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Extracted::Parsed(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Extracted::Parsed(v) | Extracted::Fallback(v) => v,
        }
    }
}

/// Parse the first balanced `{...}` span of `text` as `T`.
pub fn object<T: DeserializeOwned>(text: &str, fallback: impl FnOnce() -> T) -> Extracted<T> {
    parse_span(text, '{', '}', fallback)
}

/// Parse the first balanced `[...]` span of `text` as `T`.
pub fn list<T: DeserializeOwned>(text: &str, fallback: impl FnOnce() -> T) -> Extracted<T> {
    parse_span(text, '[', ']', fallback)
}

fn parse_span<T: DeserializeOwned>(
    text: &str,
    open: char,
    close: char,
    fallback: impl FnOnce() -> T,
) -> Extracted<T> {
    let Some(span) = balanced_span(text, open, close) else {
        debug!(open = %open, "No balanced span in model output, using fallback");
        return Extracted::Fallback(fallback());
    };
    match serde_json::from_str::<T>(span) {
        Ok(value) => Extracted::Parsed(value),
        Err(e) => {
            debug!(error = %e, "Model output span is not valid JSON, using fallback");
            Extracted::Fallback(fallback())
        }
    }
}

/// The first substring that starts at `open` and ends at its matching
/// `close`, ignoring delimiters inside JSON string literals.
pub fn balanced_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_balanced_span_nested() {
        let text = r#"Sure! {"a": {"b": 1}, "c": "}"} trailing {"x": 2}"#;
        assert_eq!(
            balanced_span(text, '{', '}'),
            Some(r#"{"a": {"b": 1}, "c": "}"}"#)
        );
    }

    #[test]
    fn test_balanced_span_unclosed() {
        assert_eq!(balanced_span("{\"a\": 1", '{', '}'), None);
        assert_eq!(balanced_span("no braces", '{', '}'), None);
    }

    #[test]
    fn test_object_from_code_fence() {
        let text = "```json\n{\"ok\": true}\n```";
        let got: Extracted<Value> = object(text, || Value::Null);
        assert!(got.is_parsed());
        assert_eq!(got.into_inner()["ok"], true);
    }

    #[test]
    fn test_list_parsed() {
        let got: Extracted<Vec<String>> =
            list(r#"Queries: ["a", "b [x]", "c"]"#, Vec::new);
        assert_eq!(got, Extracted::Parsed(vec!["a".into(), "b [x]".into(), "c".into()]));
    }

    #[test]
    fn test_fallback_on_invalid_json() {
        let got: Extracted<Vec<String>> = list("[not, json]", || vec!["default".into()]);
        assert_eq!(got, Extracted::Fallback(vec!["default".into()]));
    }

    #[test]
    fn test_fallback_on_wrong_shape() {
        let got: Extracted<Vec<String>> = list("[1, 2, 3]", Vec::new);
        assert!(!got.is_parsed());
    }
}
