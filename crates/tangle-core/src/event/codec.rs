//! JSON-lines encoding for [`Event`]s.

use std::path::Path;

use super::Event;
use crate::error::StoreError;

/// Serialize an event to one compact JSON line, newline included.
///
/// # Errors
///
/// Returns the serializer error; in practice only non-string map keys can
/// trigger it, and the event model has none.
pub fn encode_line(event: &Event) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    Ok(line)
}

/// Parse a single raw line. `line_no` is 1-based and only used for the
/// error.
///
/// # Errors
///
/// [`StoreError::Parse`] with the file, line number and raw content.
pub fn decode_line(path: &Path, line_no: usize, raw: &str) -> Result<Event, StoreError> {
    serde_json::from_str(raw.trim_end_matches('\r')).map_err(|e| StoreError::Parse {
        path: path.to_path_buf(),
        line: line_no,
        content: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Parse newline-delimited events, skipping blank lines.
///
/// Stops at the first bad line; there is no partial result.
///
/// # Errors
///
/// [`StoreError::Parse`] for the first line that does not decode.
pub fn parse_lines(path: &Path, input: &str) -> Result<Vec<Event>, StoreError> {
    let mut events = Vec::new();
    for (i, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        events.push(decode_line(path, i + 1, line)?);
    }
    Ok(events)
}
