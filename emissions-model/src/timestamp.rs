//! Conversion of timestamp-like values to UTC.
//!
//! Accounting logs mix offset-aware and naive timestamps. Every timestamp
//! entering the pipeline goes through [`to_utc`], which either yields a UTC
//! `OffsetDateTime` or fails with [`TimestampError::InvalidTimestamp`].

use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime, UtcOffset,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

#[derive(Debug, Clone, Copy)]
pub enum TimestampLike<'a> {
    Text(&'a str),
    Aware(OffsetDateTime),
    Naive(PrimitiveDateTime),
}

impl<'a> From<&'a str> for TimestampLike<'a> {
    fn from(s: &'a str) -> Self {
        TimestampLike::Text(s)
    }
}

impl From<OffsetDateTime> for TimestampLike<'_> {
    fn from(ts: OffsetDateTime) -> Self {
        TimestampLike::Aware(ts)
    }
}

impl From<PrimitiveDateTime> for TimestampLike<'_> {
    fn from(ts: PrimitiveDateTime) -> Self {
        TimestampLike::Naive(ts)
    }
}

/// Normalizes `value` to UTC.
///
/// Naive values (no offset) are interpreted in `naive_offset`.
pub fn to_utc<'a, T>(value: T, naive_offset: UtcOffset) -> Result<OffsetDateTime, TimestampError>
where
    T: Into<TimestampLike<'a>>,
{
    match value.into() {
        TimestampLike::Aware(ts) => Ok(ts.to_offset(UtcOffset::UTC)),
        TimestampLike::Naive(ts) => Ok(ts.assume_offset(naive_offset).to_offset(UtcOffset::UTC)),
        TimestampLike::Text(raw) => {
            let s = raw.trim();
            if let Some(ts) = OffsetDateTime::parse(s, &Rfc3339).ok().or_else(|| parse_compact_offset(s)) {
                return Ok(ts.to_offset(UtcOffset::UTC));
            }
            parse_naive(s)
                .map(|ts| ts.assume_offset(naive_offset).to_offset(UtcOffset::UTC))
                .ok_or_else(|| TimestampError::InvalidTimestamp(raw.to_string()))
        }
    }
}

fn parse_naive(s: &str) -> Option<PrimitiveDateTime> {
    PrimitiveDateTime::parse(s, format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"))
        .or_else(|_| {
            PrimitiveDateTime::parse(
                s,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
            )
        })
        .or_else(|_| {
            PrimitiveDateTime::parse(s, format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        })
        .or_else(|_| {
            PrimitiveDateTime::parse(
                s,
                format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
            )
        })
        .or_else(|_| PrimitiveDateTime::parse(s, format_description!("[year]-[month]-[day]T[hour]:[minute]")))
        .or_else(|_| PrimitiveDateTime::parse(s, format_description!("[year]-[month]-[day] [hour]:[minute]")))
        .ok()
}

/// Offset-aware text whose offset has no colon, e.g. `2024-09-16T10:15:00+0000`.
fn parse_compact_offset(s: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(
        s,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory][offset_minute]"),
    )
    .or_else(|_| {
        OffsetDateTime::parse(
            s,
            format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory][offset_minute]"
            ),
        )
    })
    .ok()
}

/// Parses a `+HH:MM` / `-HH:MM` offset string.
pub fn parse_offset(s: &str) -> Result<UtcOffset, TimestampError> {
    let trimmed = s.trim();
    if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("z") {
        return Ok(UtcOffset::UTC);
    }
    UtcOffset::parse(
        trimmed,
        format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
    )
    .map_err(|_| TimestampError::InvalidTimestamp(s.to_string()))
}

/// RFC 3339 text for `ts`, falling back to the `Display` form for values
/// RFC 3339 cannot represent.
pub fn format_rfc3339(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    #[test]
    fn naive_text_is_assumed_utc_by_default() {
        let ts = to_utc("2024-09-16T10:15:00", UtcOffset::UTC).unwrap();
        assert_eq!(ts, datetime!(2024-09-16 10:15:00 UTC));

        let spaced = to_utc("2024-09-16 10:15:00.250", UtcOffset::UTC).unwrap();
        assert_eq!(spaced, datetime!(2024-09-16 10:15:00.25 UTC));
    }

    #[test]
    fn naive_text_honours_configured_offset() {
        let ts = to_utc("2024-09-16T10:15:00", offset!(-7)).unwrap();
        assert_eq!(ts, datetime!(2024-09-16 17:15:00 UTC));
    }

    #[test]
    fn aware_text_is_converted_not_reinterpreted() {
        let ts = to_utc("2024-09-16T10:15:00-07:00", offset!(+3)).unwrap();
        assert_eq!(ts, datetime!(2024-09-16 17:15:00 UTC));
        assert_eq!(ts.offset(), UtcOffset::UTC);
    }

    #[test]
    fn minutes_only_and_compact_offsets_are_accepted() {
        assert_eq!(
            to_utc("2024-09-16T10:15", UtcOffset::UTC).unwrap(),
            datetime!(2024-09-16 10:15:00 UTC)
        );
        assert_eq!(
            to_utc("2024-09-16 10:15", offset!(-7)).unwrap(),
            datetime!(2024-09-16 17:15:00 UTC)
        );
        assert_eq!(
            to_utc("2024-09-16T10:15:00+0000", offset!(+3)).unwrap(),
            datetime!(2024-09-16 10:15:00 UTC)
        );
        assert_eq!(
            to_utc("2024-09-16T10:15:00.5-0700", UtcOffset::UTC).unwrap(),
            datetime!(2024-09-16 17:15:00.5 UTC)
        );
    }

    #[test]
    fn typed_values_are_accepted() {
        let aware = datetime!(2024-09-16 12:00:00 +02:00);
        assert_eq!(to_utc(aware, UtcOffset::UTC).unwrap(), datetime!(2024-09-16 10:00:00 UTC));

        let naive = datetime!(2024-09-16 12:00:00);
        assert_eq!(to_utc(naive, offset!(+1)).unwrap(), datetime!(2024-09-16 11:00:00 UTC));
    }

    #[test]
    fn slurm_placeholders_are_invalid() {
        for raw in ["Unknown", "None", "", "  ", "2024-13-01T00:00:00"] {
            assert_eq!(
                to_utc(raw, UtcOffset::UTC),
                Err(TimestampError::InvalidTimestamp(raw.to_string()))
            );
        }
    }

    #[test]
    fn offsets_parse() {
        assert_eq!(parse_offset("+00:00").unwrap(), UtcOffset::UTC);
        assert_eq!(parse_offset("UTC").unwrap(), UtcOffset::UTC);
        assert_eq!(parse_offset("-07:00").unwrap(), offset!(-7));
        assert!(parse_offset("7").is_err());
    }

    #[test]
    fn rfc3339_formatting() {
        assert_eq!(format_rfc3339(datetime!(2024-09-16 10:00:00 UTC)), "2024-09-16T10:00:00Z");
    }
}
