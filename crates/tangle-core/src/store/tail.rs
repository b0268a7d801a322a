//! Chunked tail reads over a log file.
//!
//! Reads `[start, end)` in fixed-size chunks, splits on `\n`, and parses
//! each non-blank line. A final line without a trailing newline is parsed
//! too, since `end` is a size measured by the caller and everything before
//! it is treated as committed.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::StoreError;
use crate::event::{decode_line, Event};

/// Events found in one byte range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tail {
    pub events: Vec<Event>,
    /// Absolute byte offset where each event's line starts.
    pub positions: Vec<u64>,
    pub bytes_read: u64,
}

impl Tail {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Read and parse `path` from byte `start` up to byte `end`.
///
/// A missing file is an empty tail. `start >= end` reads nothing. Line
/// numbers in parse errors count from `start`, and the reason carries the
/// absolute byte offset of the bad line.
///
/// # Errors
///
/// [`StoreError::Parse`] for the first bad line, or a classified I/O error.
pub fn read_tail(path: &Path, start: u64, end: u64, chunk: usize) -> Result<Tail, StoreError> {
    let mut tail = Tail::default();
    if start >= end {
        return Ok(tail);
    }
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(tail),
        Err(e) => return Err(StoreError::from_io(&e, path, "open for tail read")),
    };
    file.seek(SeekFrom::Start(start))
        .map_err(|e| StoreError::from_io(&e, path, "seek"))?;

    let mut reader = file.take(end - start);
    let mut buf = vec![0_u8; chunk.max(1)];
    let mut pending: Vec<u8> = Vec::new();
    let mut line_start = start;
    let mut line_no = 0_usize;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StoreError::from_io(&e, path, "read tail of")),
        };
        tail.bytes_read += n as u64;
        pending.extend_from_slice(&buf[..n]);

        let mut consumed = 0;
        while let Some(pos) = pending[consumed..].iter().position(|b| *b == b'\n') {
            let line = &pending[consumed..consumed + pos];
            line_no += 1;
            push_line(path, line, line_no, line_start, &mut tail)?;
            line_start += (pos + 1) as u64;
            consumed += pos + 1;
        }
        pending.drain(..consumed);
    }

    if !pending.is_empty() {
        line_no += 1;
        push_line(path, &pending, line_no, line_start, &mut tail)?;
    }

    tracing::debug!(
        path = %path.display(),
        start,
        end,
        bytes = tail.bytes_read,
        events = tail.events.len(),
        "read log tail"
    );
    Ok(tail)
}

fn push_line(
    path: &Path,
    raw: &[u8],
    line_no: usize,
    offset: u64,
    tail: &mut Tail,
) -> Result<(), StoreError> {
    let text = std::str::from_utf8(raw).map_err(|e| StoreError::Parse {
        path: path.to_path_buf(),
        line: line_no,
        content: String::from_utf8_lossy(raw).into_owned(),
        reason: format!("invalid UTF-8 at byte {offset}: {e}"),
    })?;
    if text.trim().is_empty() {
        return Ok(());
    }
    let event = decode_line(path, line_no, text).map_err(|err| match err {
        StoreError::Parse {
            path,
            line,
            content,
            reason,
        } => StoreError::Parse {
            path,
            line,
            content,
            reason: format!("{reason} (at byte {offset})"),
        },
        other => other,
    })?;
    tail.events.push(event);
    tail.positions.push(offset);
    Ok(())
}
