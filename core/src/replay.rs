//! Event-log replay as a lazy, finite, non-restartable event sequence.
//!
//! The log is JSON Lines: one AuditEvent object per line. Blank lines
//! are skipped. Parsing stops being useful at the first bad line, and
//! the driver aborts on it, so errors carry the 1-based line number.

use crate::{
    error::{AuditError, AuditResult},
    event::AuditEvent,
};
use std::{
    fs::File,
    io::{BufRead, BufReader, Lines},
    path::Path,
};

pub struct EventLogReader<R> {
    lines: Lines<R>,
    line:  usize,
}

impl<R: BufRead> EventLogReader<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: reader.lines(), line: 0 }
    }
}

impl EventLogReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> Iterator for EventLogReader<R> {
    type Item = AuditResult<AuditEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;
            if text.trim().is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(&text)
                    .map_err(|source| AuditError::MalformedEvent { line: self.line, source }),
            );
        }
    }
}

/// Serialize events as JSON Lines. Used to export a stored log.
pub fn write_event_log<'a, W, I>(mut writer: W, events: I) -> AuditResult<()>
where
    W: std::io::Write,
    I: IntoIterator<Item = &'a AuditEvent>,
{
    for event in events {
        serde_json::to_writer(&mut writer, event)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
