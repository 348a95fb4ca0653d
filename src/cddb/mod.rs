//! CDDB disc metadata lookup
//!
//! A lookup is two round trips: `cddb query` turns a disc id into a
//! `(category, id)` pair and `cddb read` fetches the xmcd record for it.
//! Response parsing lives here so it can be tested without a server; the
//! HTTP transport is in [`client`].

pub mod client;

pub use client::CddbClient;

use crate::cd::DiscIdentity;
use encoding_rs::ISO_8859_15;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Lookup timed out")]
    Timeout,
    #[error("CDDB returned status {code}: {message}")]
    Status { code: u16, message: String },
    #[error("No CDDB entry for disc {0}")]
    NoMatch(String),
    #[error("Malformed CDDB response: {0}")]
    Malformed(String),
}

/// One candidate returned by `cddb query`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMatch {
    pub category: String,
    pub disc_id: String,
    pub title: String,
}

/// Fields of an xmcd record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CddbRecord {
    fields: BTreeMap<String, String>,
}

impl CddbRecord {
    /// Parse xmcd `KEY=value` lines
    ///
    /// Comment lines start with `#`. A key may repeat, in which case the
    /// values are concatenated (long titles are split over several lines).
    pub fn parse(text: &str) -> Self {
        let mut fields: BTreeMap<String, String> = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                debug!("Ignoring xmcd line without '=': {:?}", line);
                continue;
            };
            fields
                .entry(key.trim().to_string())
                .or_default()
                .push_str(&unescape(value));
        }
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn disc_title(&self) -> Option<&str> {
        self.get("DTITLE")
    }

    /// `DTITLE` is `Artist / Album`; without a separator both are the title
    pub fn artist_album(&self) -> Option<(String, String)> {
        let title = self.disc_title()?;
        Some(match title.split_once(" / ") {
            Some((artist, album)) => (artist.trim().to_string(), album.trim().to_string()),
            None => (title.trim().to_string(), title.trim().to_string()),
        })
    }

    /// `TTITLE0`, `TTITLE1`, ... up to the first gap
    pub fn track_titles(&self) -> Vec<String> {
        (0..)
            .map_while(|i| self.get(&format!("TTITLE{}", i)))
            .map(|t| t.trim().to_string())
            .collect()
    }

    /// Year from the `YEAR: ` prefix of `EXTD`, falling back to `DYEAR`
    pub fn year(&self) -> Option<String> {
        let from_extd = self
            .get("EXTD")
            .and_then(|extd| extd.trim_start().strip_prefix("YEAR: "))
            .and_then(|rest| rest.split_whitespace().next())
            .map(str::to_string);

        from_extd.or_else(|| {
            self.get("DYEAR")
                .map(str::trim)
                .filter(|y| !y.is_empty())
                .map(str::to_string)
        })
    }

    pub fn genre(&self) -> Option<String> {
        self.get("DGENRE")
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
    }
}

/// Lookup service seam (allows mocking for tests)
#[async_trait::async_trait]
pub trait DiscLookup: Send + Sync {
    async fn query(&self, disc: &DiscIdentity) -> Result<QueryMatch, LookupError>;

    async fn read(&self, category: &str, disc_id: &str) -> Result<CddbRecord, LookupError>;

    /// Query, then read the first match
    async fn lookup(&self, disc: &DiscIdentity) -> Result<CddbRecord, LookupError> {
        let found = self.query(disc).await?;
        debug!(
            "CDDB match for {}: {}/{} ({})",
            disc, found.category, found.disc_id, found.title
        );
        self.read(&found.category, &found.disc_id).await
    }
}

/// Decode a response body from the protocol's single-byte charset
///
/// Invalid bytes become U+FFFD rather than failing the lookup.
pub fn decode_body(bytes: &[u8]) -> String {
    let (text, _, had_errors) = ISO_8859_15.decode(bytes);
    if had_errors {
        warn!("CDDB response contained undecodable bytes");
    }
    text.into_owned()
}

/// `cddb query` command line for a disc
pub fn query_command(disc: &DiscIdentity) -> String {
    let mut cmd = format!("cddb query {} {}", disc.hex(), disc.track_count());
    for offset in &disc.track_offsets {
        cmd.push(' ');
        cmd.push_str(&offset.to_string());
    }
    cmd.push(' ');
    cmd.push_str(&disc.total_seconds().to_string());
    cmd
}

pub fn read_command(category: &str, disc_id: &str) -> String {
    format!("cddb read {} {}", category, disc_id)
}

/// Interpret a `cddb query` reply
///
/// 200 is a single exact match; 210/211 list several matches and the
/// first one wins.
pub fn parse_query_response(body: &str, disc_id: &str) -> Result<QueryMatch, LookupError> {
    let mut lines = body.lines().map(|l| l.trim_end_matches('\r'));
    let (code, rest) = status_line(lines.next())?;

    match code {
        200 => parse_match(rest),
        210 | 211 => {
            let first = lines
                .take_while(|l| *l != ".")
                .find(|l| !l.trim().is_empty())
                .ok_or_else(|| LookupError::Malformed("empty match list".to_string()))?;
            parse_match(first)
        }
        202 => Err(LookupError::NoMatch(disc_id.to_string())),
        _ => Err(LookupError::Status {
            code,
            message: rest.to_string(),
        }),
    }
}

/// Interpret a `cddb read` reply
pub fn parse_read_response(body: &str) -> Result<CddbRecord, LookupError> {
    let mut lines = body.lines().map(|l| l.trim_end_matches('\r'));
    let (code, rest) = status_line(lines.next())?;

    if code != 210 {
        return Err(LookupError::Status {
            code,
            message: rest.to_string(),
        });
    }

    let record: Vec<&str> = lines.take_while(|l| *l != ".").collect();
    Ok(CddbRecord::parse(&record.join("\n")))
}

fn status_line(line: Option<&str>) -> Result<(u16, &str), LookupError> {
    let line = line.ok_or_else(|| LookupError::Malformed("empty response".to_string()))?;
    let (code, rest) = line.split_once(' ').unwrap_or((line, ""));
    let code = code
        .parse::<u16>()
        .map_err(|_| LookupError::Malformed(format!("bad status line: {:?}", line)))?;
    Ok((code, rest.trim()))
}

fn parse_match(line: &str) -> Result<QueryMatch, LookupError> {
    let mut parts = line.trim().splitn(3, ' ');
    match (parts.next(), parts.next()) {
        (Some(category), Some(disc_id)) if !category.is_empty() && !disc_id.is_empty() => {
            Ok(QueryMatch {
                category: category.to_string(),
                disc_id: disc_id.to_string(),
                title: parts.next().unwrap_or_default().trim().to_string(),
            })
        }
        _ => Err(LookupError::Malformed(format!("bad match line: {:?}", line))),
    }
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
