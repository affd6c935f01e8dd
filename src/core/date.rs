//! Date parsing capability used when reading purchase records.
//!
//! Patterns use the LDML syntax understood by platform date formatters
//! (`yyyy-MM-dd'T'HH:mm:ssZ`), and are translated into a chrono format string
//! once, when the formatter is built.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use std::collections::HashSet;
use std::fmt::Display;
use thiserror::Error;

/// Pattern used by the backend and by receipts for date fields.
pub const ISO8601_PATTERN: &str = "yyyy-MM-dd'T'HH:mm:ssZ";

/// Turns a date string into a point in time.
pub trait DateParser: Send + Sync {
    fn parse(&self, value: &str) -> Option<DateTime<Utc>>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatePatternError {
    #[error("unsupported pattern field '{0}' in date pattern \"{1}\"")]
    UnsupportedField(String, String),
    #[error("unterminated quoted literal in date pattern \"{0}\"")]
    UnterminatedLiteral(String),
    #[error("date pattern \"{0}\" has no date fields")]
    MissingDate(String),
    #[error("date pattern \"{0}\" needs year, month and day")]
    IncompleteDate(String),
    #[error("date pattern \"{0}\" needs both hour and minute")]
    IncompleteTime(String),
    #[error("date pattern \"{0}\" uses 'h' without an 'a' marker")]
    HourWithoutPeriod(String),
    #[error("date pattern \"{0}\" has an offset but no time")]
    OffsetWithoutTime(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OffsetStyle {
    /// `+0000`
    Basic,
    /// `+00:00`
    Extended,
}

impl OffsetStyle {
    fn zulu(&self) -> &'static str {
        match self {
            OffsetStyle::Basic => "+0000",
            OffsetStyle::Extended => "+00:00",
        }
    }
}

/// Parses and formats dates according to an LDML pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct DateFormatter {
    pattern: String,
    chrono_format: String,
    offset: Option<OffsetStyle>,
    has_time: bool,
    time_zone: FixedOffset,
}

impl DateFormatter {
    /// Builds a formatter for `pattern`, interpreting offset-less values as UTC.
    pub fn new(pattern: &str) -> Result<Self, DatePatternError> {
        let (chrono_format, offset, has_time) = translate_pattern(pattern)?;
        Ok(Self {
            pattern: pattern.to_string(),
            chrono_format,
            offset,
            has_time,
            time_zone: Utc.fix(),
        })
    }

    /// The formatter used for backend and receipt dates.
    pub fn iso8601() -> Self {
        Self {
            pattern: ISO8601_PATTERN.to_string(),
            chrono_format: "%Y-%m-%dT%H:%M:%S%z".to_string(),
            offset: Some(OffsetStyle::Basic),
            has_time: true,
            time_zone: Utc.fix(),
        }
    }

    /// Time zone applied to values whose pattern carries no offset.
    pub fn with_time_zone(mut self, time_zone: FixedOffset) -> Self {
        self.time_zone = time_zone;
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn format(&self, date: &DateTime<Utc>) -> String {
        date.with_timezone(&self.time_zone)
            .format(&self.chrono_format)
            .to_string()
    }

    fn normalize<'a>(&self, value: &'a str) -> std::borrow::Cow<'a, str> {
        match self.offset {
            Some(style) => match value.strip_suffix(['Z', 'z']) {
                Some(stripped) => format!("{stripped}{}", style.zulu()).into(),
                None => value.into(),
            },
            None => value.into(),
        }
    }

    fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.time_zone
            .from_local_datetime(&naive)
            .single()
            .map(|date| date.with_timezone(&Utc))
    }
}

impl DateParser for DateFormatter {
    fn parse(&self, value: &str) -> Option<DateTime<Utc>> {
        let value = self.normalize(value.trim());

        if self.offset.is_some() {
            return DateTime::parse_from_str(&value, &self.chrono_format)
                .ok()
                .map(|date| date.with_timezone(&Utc));
        }

        if self.has_time {
            return NaiveDateTime::parse_from_str(&value, &self.chrono_format)
                .ok()
                .and_then(|naive| self.localize(naive));
        }

        NaiveDate::parse_from_str(&value, &self.chrono_format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .and_then(|naive| self.localize(naive))
    }
}

impl Display for DateFormatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

fn translate_pattern(
    pattern: &str,
) -> Result<(String, Option<OffsetStyle>, bool), DatePatternError> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut offset = None;
    let mut fields = HashSet::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            // '' is an escaped quote, anything else opens a literal
            if chars.get(i + 1) == Some(&'\'') {
                out.push('\'');
                i += 2;
                continue;
            }
            let mut j = i + 1;
            loop {
                match chars.get(j) {
                    None => return Err(DatePatternError::UnterminatedLiteral(pattern.to_string())),
                    Some('\'') if chars.get(j + 1) == Some(&'\'') => {
                        out.push('\'');
                        j += 2;
                    }
                    Some('\'') => break,
                    Some(literal) => {
                        push_literal(&mut out, *literal);
                        j += 1;
                    }
                }
            }
            i = j + 1;
            continue;
        }

        if !c.is_ascii_alphabetic() {
            push_literal(&mut out, c);
            i += 1;
            continue;
        }

        let run = chars[i..].iter().take_while(|&&next| next == c).count();
        let field: String = std::iter::repeat_n(c, run).collect();
        let translated = match (c, run) {
            ('y', 2) => "%y",
            ('y', _) => "%Y",
            ('M', 1 | 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', 1 | 2) => "%d",
            ('H', 1 | 2) => "%H",
            ('h', 1 | 2) => "%I",
            ('m', 1 | 2) => "%M",
            ('s', 1 | 2) => "%S",
            ('S', 3) => "%3f",
            ('S', 6) => "%6f",
            ('S', 9) => "%9f",
            ('a', 1) => "%p",
            ('Z', 1..=3) | ('X', 1 | 2) | ('x', 1 | 2) => "%z",
            ('Z', 5) | ('X', 3) | ('x', 3) => "%:z",
            _ => return Err(DatePatternError::UnsupportedField(field, pattern.to_string())),
        };

        if matches!(c, 'Z' | 'X' | 'x') {
            offset = Some(if translated == "%z" {
                OffsetStyle::Basic
            } else {
                OffsetStyle::Extended
            });
        }
        fields.insert(c);

        out.push_str(translated);
        i += run;
    }

    let has = |field: char| fields.contains(&field);
    let has_time = ['H', 'h', 'm', 's', 'S', 'a'].iter().any(|f| has(*f));

    let error = match ['y', 'M', 'd'].iter().filter(|f| has(**f)).count() {
        0 => Some(DatePatternError::MissingDate(pattern.to_string())),
        1 | 2 => Some(DatePatternError::IncompleteDate(pattern.to_string())),
        _ if has_time && !((has('H') || has('h')) && has('m')) => {
            Some(DatePatternError::IncompleteTime(pattern.to_string()))
        }
        _ if has('h') && !has('a') => {
            Some(DatePatternError::HourWithoutPeriod(pattern.to_string()))
        }
        _ if offset.is_some() && !has_time => {
            Some(DatePatternError::OffsetWithoutTime(pattern.to_string()))
        }
        _ => None,
    };
    if let Some(error) = error {
        return Err(error);
    }

    Ok((out, offset, has_time))
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}
