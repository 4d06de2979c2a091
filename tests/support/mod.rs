//! Shared test doubles for the integration suites: a real RFC 822 header
//! parser built on `mail-parser` (standing in for the embedder's own
//! parser) and an in-memory header cache.

use std::{collections::HashMap, io::Read, path::Path};

use mailbox::{
    email::{HeaderParser, ParsedHeaders},
    header_cache::{CachedHeader, HeaderCache},
    Result,
};

pub struct MailParserHeaders;

impl HeaderParser for MailParserHeaders {
    fn parse_headers(&self, reader: &mut dyn Read) -> Result<ParsedHeaders> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        let content_offset = body_offset(&bytes);
        let received = mail_parser::MessageParser::new()
            .parse(&bytes)
            .and_then(|msg| msg.date().map(unix_timestamp))
            .unwrap_or(0);

        Ok(ParsedHeaders {
            content_offset,
            received,
        })
    }
}

/// Offset of the first body byte: the position right after the first
/// blank line, accepting either line ending.
fn body_offset(bytes: &[u8]) -> u64 {
    let crlf = bytes.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4);
    let lf = bytes.windows(2).position(|w| w == b"\n\n").map(|i| i + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => a.min(b) as u64,
        (Some(a), None) => a as u64,
        (None, Some(b)) => b as u64,
        (None, None) => bytes.len() as u64,
    }
}

/// Days since the Unix epoch for a proleptic-Gregorian date (Howard
/// Hinnant's `days_from_civil`). Used instead of pulling in chrono just for
/// test fixtures.
fn days_from_civil(y: i64, m: u32, d: u32) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (m as i64 + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe - 719468
}

fn unix_timestamp(dt: &mail_parser::DateTime) -> i64 {
    let days = days_from_civil(dt.year as i64, dt.month as u32, dt.day as u32);
    let tz_secs = dt.tz_hour as i64 * 3600 + dt.tz_minute as i64 * 60;
    let tz_sign = if dt.tz_before_gmt { -1 } else { 1 };
    days * 86400 + dt.hour as i64 * 3600 + dt.minute as i64 * 60 + dt.second as i64 - tz_sign * tz_secs
}

/// A header cache backed by a plain `HashMap`, so tests can assert a
/// second scan hits the cache instead of re-parsing.
#[derive(Default)]
pub struct InMemoryHeaderCache {
    entries: HashMap<String, CachedHeader>,
    pub fetches: usize,
    pub stores: usize,
}

impl HeaderCache for InMemoryHeaderCache {
    fn open(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn fetch(&mut self, key: &str) -> Result<Option<CachedHeader>> {
        self.fetches += 1;
        Ok(self.entries.get(key).cloned())
    }

    fn store(&mut self, key: &str, entry: &CachedHeader) -> Result<()> {
        self.stores += 1;
        self.entries.insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub fn sample_message(subject: &str) -> Vec<u8> {
    format!(
        "From: a@example.com\r\nTo: b@example.com\r\nSubject: {subject}\r\nDate: Tue, 1 Jul 2025 10:00:00 +0000\r\n\r\nHello, {subject}.\r\n"
    )
    .into_bytes()
}
