// Rain graph series extraction from embedded script text
use crate::domain::forecast::RawSeriesBundle;
use thiserror::Error;

pub const SERIES_KEY: &str = "series";
pub const SERIES_END_MARKER: &str = "}}},";

#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("no rain graph series found in script")]
    SeriesNotFound,
    #[error("rain graph series could not be parsed: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Find the data-carrying line and parse its series object.
///
/// Only a line holding both `series` and the closing marker counts; other
/// mentions of `series` in the script are ignored.
pub fn parse_series(lines: &[String]) -> Result<RawSeriesBundle, SeriesError> {
    for line in lines {
        let Some(start) = line.find(SERIES_KEY) else {
            continue;
        };
        let tail = &line[start..];
        if !tail.contains(SERIES_END_MARKER) {
            tracing::debug!("end of data in series not found");
            continue;
        }

        tracing::debug!("rain graph series found");
        // An unbalanced literal still belongs to this line; let the parser reject it.
        let literal = object_literal_after(tail, SERIES_KEY)
            .unwrap_or_else(|| marker_bounded_literal(tail));
        let text = rename_resolution_keys(literal);
        return Ok(serde_json::from_str(&text)?);
    }

    Err(SeriesError::SeriesNotFound)
}

/// Slice the object literal that follows `key`, ending at its matching
/// closing brace. Braces inside string literals are skipped.
pub fn object_literal_after<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let after_key = text.find(key)? + key.len();
    let open = after_key + text[after_key..].find('{')?;

    let mut depth = 0usize;
    let mut in_string: Option<char> = None;
    let mut escaped = false;

    for (offset, ch) in text[open..].char_indices() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == quote {
                in_string = None;
            }
            continue;
        }

        match ch {
            '"' | '\'' => in_string = Some(ch),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open..open + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Text from the first `{` after `series` through the closing braces of
/// the end marker.
fn marker_bounded_literal(tail: &str) -> &str {
    let end = tail
        .find(SERIES_END_MARKER)
        .map_or(tail.len(), |pos| pos + SERIES_END_MARKER.len() - 1);
    let start = tail[SERIES_KEY.len()..]
        .find('{')
        .map_or(end, |pos| pos + SERIES_KEY.len())
        .min(end);
    &tail[start..end]
}

/// `2h`/`24h` are not identifiers, rename them before parsing.
fn rename_resolution_keys(literal: &str) -> String {
    literal
        .replacen("\"2h\"", "\"data2h\"", 1)
        .replacen("\"24h\"", "\"data24h\"", 1)
}
