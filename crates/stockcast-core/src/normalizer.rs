//! Provider payload → canonical OHLCV series.
//!
//! Each provider speaks its own field vocabulary and date encoding. A
//! [`FieldMap`] lists the accepted names per canonical field; values are
//! coerced leniently (comma-grouped strings, ROC calendar years, epoch
//! seconds) and rows that still cannot be read are dropped rather than
//! failing the whole payload.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use time::{Date, Month, OffsetDateTime};

use crate::data_source::{ProviderPayload, SourceError};
use crate::{NormalizedBar, NormalizedSeries, ProviderId};

/// Offset between ROC calendar years and Gregorian years.
const ROC_YEAR_OFFSET: i32 = 1911;

/// Accepted source field names for each canonical field, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMap {
    pub date: &'static [&'static str],
    pub open: &'static [&'static str],
    pub high: &'static [&'static str],
    pub low: &'static [&'static str],
    pub close: &'static [&'static str],
    pub volume: &'static [&'static str],
}

const TWSE_FIELDS: FieldMap = FieldMap {
    date: &["日期", "date"],
    open: &["開盤價", "open"],
    high: &["最高價", "high"],
    low: &["最低價", "low"],
    close: &["收盤價", "close"],
    volume: &["成交股數", "capacity", "volume"],
};

const YAHOO_FIELDS: FieldMap = FieldMap {
    date: &["timestamp", "date"],
    open: &["open"],
    high: &["high"],
    low: &["low"],
    close: &["close"],
    volume: &["volume"],
};

const FINMIND_FIELDS: FieldMap = FieldMap {
    date: &["date"],
    open: &["open"],
    high: &["max"],
    low: &["min"],
    close: &["close"],
    volume: &["Trading_Volume"],
};

impl FieldMap {
    pub const fn for_provider(provider: ProviderId) -> Self {
        match provider {
            ProviderId::Twse => TWSE_FIELDS,
            ProviderId::Yahoo => YAHOO_FIELDS,
            ProviderId::Finmind => FINMIND_FIELDS,
        }
    }

    fn required(&self) -> [(&'static str, &'static [&'static str]); 5] {
        [
            ("date", self.date),
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ]
    }
}

/// Normalize a provider payload into a date-ordered series.
///
/// Rows are sorted ascending and a repeated date keeps the row seen last.
/// Fails with `SchemaMismatch` only when a required field is missing from
/// every row; individual unreadable rows are skipped.
pub fn normalize(payload: &ProviderPayload) -> Result<NormalizedSeries, SourceError> {
    let fields = FieldMap::for_provider(payload.provider);

    if !payload.records.is_empty() {
        for (name, aliases) in fields.required() {
            let present = payload
                .records
                .iter()
                .any(|record| aliases.iter().any(|alias| record.contains_key(*alias)));
            if !present {
                return Err(SourceError::schema_mismatch(format!(
                    "{} payload has no '{name}' field (expected one of {aliases:?})",
                    payload.provider
                )));
            }
        }
    }

    let mut by_date = BTreeMap::new();
    let mut dropped = 0_usize;
    for record in &payload.records {
        match read_bar(record, &fields, payload.utc_offset_seconds) {
            Some(bar) => {
                by_date.insert(bar.date, bar);
            }
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        tracing::debug!(
            provider = %payload.provider,
            symbol = %payload.symbol,
            dropped,
            kept = by_date.len(),
            "dropped unreadable rows"
        );
    }

    NormalizedSeries::new(payload.symbol.clone(), by_date.into_values().collect())
        .map_err(|error| SourceError::schema_mismatch(error.to_string()))
}

fn read_bar(record: &Map<String, Value>, fields: &FieldMap, utc_offset: i32) -> Option<NormalizedBar> {
    let date = coerce_date(lookup(record, fields.date)?, utc_offset)?;
    let open = coerce_number(lookup(record, fields.open)?)?;
    let high = coerce_number(lookup(record, fields.high)?)?;
    let low = coerce_number(lookup(record, fields.low)?)?;
    let close = coerce_number(lookup(record, fields.close)?)?;
    let volume = coerce_volume(lookup(record, fields.volume)?)?;

    NormalizedBar::new(date, open, high, low, close, volume).ok()
}

fn lookup<'a>(record: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|alias| record.get(*alias))
}

/// Reads a trading date from any supported encoding.
///
/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, ROC `YYY/MM/DD`, compact `YYYYMMDD`
/// and epoch seconds (number or digit string) shifted by `utc_offset`.
pub fn coerce_date(value: &Value, utc_offset: i32) -> Option<Date> {
    match value {
        Value::Number(number) => epoch_date(number.as_i64()?, utc_offset),
        Value::String(text) => parse_date_text(text.trim(), utc_offset),
        _ => None,
    }
}

fn parse_date_text(text: &str, utc_offset: i32) -> Option<Date> {
    let day_part = text.split(['T', ' ']).next().unwrap_or(text);

    if !day_part.is_empty() && day_part.chars().all(|ch| ch.is_ascii_digit()) {
        if day_part.len() == 8 {
            let year = day_part[..4].parse().ok()?;
            let month = day_part[4..6].parse().ok()?;
            let day = day_part[6..].parse().ok()?;
            return calendar_date(year, month, day);
        }
        return epoch_date(day_part.parse().ok()?, utc_offset);
    }

    let mut parts = day_part.split(['-', '/']);
    let (year, month, day) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let numeric = |part: &str| !part.is_empty() && part.chars().all(|ch| ch.is_ascii_digit());
    if !(numeric(year) && numeric(month) && numeric(day)) {
        return None;
    }

    let mut year: i32 = year.parse().ok()?;
    if year < 1_000 {
        year += ROC_YEAR_OFFSET;
    }
    calendar_date(year, month.parse().ok()?, day.parse().ok()?)
}

fn calendar_date(year: i32, month: u8, day: u8) -> Option<Date> {
    Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}

fn epoch_date(seconds: i64, utc_offset: i32) -> Option<Date> {
    let shifted = seconds.checked_add(i64::from(utc_offset))?;
    OffsetDateTime::from_unix_timestamp(shifted)
        .ok()
        .map(OffsetDateTime::date)
}

/// Reads a price from a JSON number or a comma-grouped string.
///
/// Placeholders such as `--` and empty strings read as missing.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => {
            let cleaned = text.trim().replace(',', "");
            let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);
            if cleaned.is_empty() || cleaned.chars().all(|ch| ch == '-') {
                return None;
            }
            cleaned.parse::<f64>().ok()?
        }
        _ => return None,
    };

    parsed.is_finite().then_some(parsed)
}

fn coerce_volume(value: &Value) -> Option<u64> {
    if let Some(volume) = value.as_u64() {
        return Some(volume);
    }

    let parsed = coerce_number(value)?;
    (parsed >= 0.0 && parsed <= u64::MAX as f64).then(|| parsed.round() as u64)
}
