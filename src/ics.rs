//! Minimal ICS (RFC 5545) feed reader: just enough to pull VEVENT
//! summary/description/date pairs out of the calendar exports that Airbnb
//! and Booking.com publish. Anything structurally broken is a hard
//! `ParseError`; reconciliation never runs on a half-read feed.

use chrono::NaiveDate;

#[derive(Debug)]
pub struct ParseError(pub String);

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseError {}

/// One VEVENT, with start/end normalized to calendar dates
/// (time-of-day stripped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEvent {
    pub summary: String,
    pub description: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Parse a raw feed into its events. DTEND follows the ICS convention of
/// being exclusive for all-day events, which matches the half-open
/// check-in/check-out interval directly.
pub fn parse_feed(data: &[u8]) -> Result<Vec<FeedEvent>, ParseError> {
    let text = std::str::from_utf8(data)
        .map_err(|_| ParseError("feed is not valid UTF-8".into()))?;

    let lines = unfold_lines(text);
    if !lines.iter().any(|l| l.trim() == "BEGIN:VCALENDAR") {
        return Err(ParseError("missing BEGIN:VCALENDAR".into()));
    }

    let mut events = Vec::new();
    let mut current: Option<EventBuilder> = None;

    for line in &lines {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if line == "BEGIN:VEVENT" {
            if current.is_some() {
                return Err(ParseError("nested BEGIN:VEVENT".into()));
            }
            current = Some(EventBuilder::default());
            continue;
        }
        if line == "END:VEVENT" {
            let builder = current
                .take()
                .ok_or_else(|| ParseError("END:VEVENT without BEGIN".into()))?;
            events.push(builder.finish()?);
            continue;
        }
        let Some(builder) = current.as_mut() else {
            continue; // calendar-level property
        };

        // NAME;PARAM=...:VALUE. Parameters (VALUE=DATE, TZID) are ignored;
        // the value shape tells us everything we need.
        let Some((name_part, value)) = line.split_once(':') else {
            continue;
        };
        let name = name_part.split(';').next().unwrap_or("").to_ascii_uppercase();
        match name.as_str() {
            "SUMMARY" => builder.summary = Some(unescape(value)),
            "DESCRIPTION" => builder.description = Some(unescape(value)),
            "DTSTART" => builder.start = Some(parse_ics_date(value)?),
            "DTEND" => builder.end = Some(parse_ics_date(value)?),
            _ => {}
        }
    }

    if current.is_some() {
        return Err(ParseError("unterminated VEVENT".into()));
    }

    Ok(events)
}

#[derive(Default)]
struct EventBuilder {
    summary: Option<String>,
    description: Option<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl EventBuilder {
    fn finish(self) -> Result<FeedEvent, ParseError> {
        Ok(FeedEvent {
            summary: self.summary.unwrap_or_else(|| "Booking".into()),
            description: self.description.unwrap_or_default(),
            start: self.start.ok_or_else(|| ParseError("VEVENT missing DTSTART".into()))?,
            end: self.end.ok_or_else(|| ParseError("VEVENT missing DTEND".into()))?,
        })
    }
}

/// Undo RFC 5545 line folding: a line starting with space or tab continues
/// the previous line.
fn unfold_lines(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in text.lines() {
        if (raw.starts_with(' ') || raw.starts_with('\t'))
            && let Some(last) = out.last_mut()
        {
            last.push_str(&raw[1..]);
        } else {
            out.push(raw.to_string());
        }
    }
    out
}

/// Accepts both DATE (`20250201`) and DATE-TIME (`20250201T140000Z`) values;
/// the time-of-day is dropped either way.
fn parse_ics_date(value: &str) -> Result<NaiveDate, ParseError> {
    let digits = value.split('T').next().unwrap_or(value).trim();
    NaiveDate::parse_from_str(digits, "%Y%m%d")
        .map_err(|_| ParseError(format!("bad date value: {value}")))
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
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
