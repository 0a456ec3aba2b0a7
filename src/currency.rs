use regex::Regex;
use std::sync::OnceLock;

/// A spreadsheet cell before cleaning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawCell<'a> {
    Missing,
    /// A cell already typed as numeric, e.g. a value computed in memory
    /// rather than read from CSV text. Passed through unchanged.
    Number(f64),
    Text(&'a str),
}

impl<'a> From<Option<&'a str>> for RawCell<'a> {
    fn from(value: Option<&'a str>) -> Self {
        match value {
            Some(text) => RawCell::Text(text),
            None => RawCell::Missing,
        }
    }
}

impl<'a> From<&'a str> for RawCell<'a> {
    fn from(value: &'a str) -> Self {
        RawCell::Text(value)
    }
}

/// Lets already-numeric amounts go through the same cleaning entry point.
impl From<f64> for RawCell<'_> {
    fn from(value: f64) -> Self {
        RawCell::Number(value)
    }
}

fn currency_noise() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[$,()%]").expect("currency pattern is a valid regex"))
}

/// Parse a human-formatted amount such as `"($1,234.50)"` into a number.
///
/// Parenthesised values are negative (accounting convention). Anything that
/// does not survive cleaning as a finite float comes back as `None`.
pub fn clean_currency<'a>(value: impl Into<RawCell<'a>>) -> Option<f64> {
    match value.into() {
        RawCell::Missing => None,
        RawCell::Number(number) => number.is_finite().then_some(number),
        RawCell::Text(text) => {
            let trimmed = text.trim();
            let stripped = currency_noise().replace_all(trimmed, "");
            let stripped = stripped.trim();
            if stripped.is_empty() {
                return None;
            }

            let negative = trimmed.starts_with('(') && trimmed.ends_with(')');
            let candidate = if negative {
                format!("-{}", stripped)
            } else {
                stripped.to_string()
            };

            candidate
                .parse::<f64>()
                .ok()
                .filter(|number| number.is_finite())
        }
    }
}

/// Plain numeric coercion: no symbol stripping, invalid text becomes `None`.
pub fn parse_number(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|text| text.trim().parse::<f64>().ok())
        .filter(|number| number.is_finite())
}
