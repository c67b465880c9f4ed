//! Time-windowed index queries
//!
//! [`TimeRangeQueryBuilder`] is [`crate::builder::IndexQueryBuilder`]
//! specialised for sort keys of the shape `"TIME#{rfc3339}"`: RFC 3339 Zulu
//! timestamps sort lexicographically in chronological order, the same
//! rendering [`crate::types::Expiry::key_format`] uses for the same reason.
//! [`TimeWindowIter`] walks a `[start, end)` range in fixed-size slices,
//! running one query per slice, for callers that want to process a long
//! range without holding it all in memory at once.

use std::ops::Range;

use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};

use crate::{builder::IndexQueryBuilder, query::QueryParams, store, Error, Table};

fn format_instant(ts: OffsetDateTime) -> String {
    let normalized = ts
        .to_offset(time::UtcOffset::UTC)
        .replace_nanosecond(0)
        .expect("0 is always a valid nanosecond component");
    format!("TIME#{}", normalized.format(&Rfc3339).expect("RFC 3339 formatting never fails for a valid offset"))
}

fn start_of_day(ts: OffsetDateTime) -> OffsetDateTime {
    ts.replace_time(time::Time::MIDNIGHT)
}

fn start_of_week(ts: OffsetDateTime) -> OffsetDateTime {
    let days_from_monday = i64::from(ts.weekday().number_days_from_monday());
    start_of_day(ts - Duration::days(days_from_monday))
}

fn start_of_month(ts: OffsetDateTime) -> OffsetDateTime {
    start_of_day(ts.replace_day(1).expect("day 1 is always valid"))
}

/// A fluent builder for a time-windowed index query
///
/// Wraps [`IndexQueryBuilder`], translating timestamps into the
/// `"TIME#{rfc3339}"` sort-key segment and, for [`Self::between`],
/// approximating the window's exclusive upper bound by stepping the end
/// instant back one second before formatting it, since the underlying key
/// condition only offers an inclusive `BETWEEN`.
#[derive(Clone, Debug)]
#[must_use]
pub struct TimeRangeQueryBuilder {
    inner: IndexQueryBuilder,
}

impl Default for TimeRangeQueryBuilder {
    fn default() -> Self {
        Self {
            inner: IndexQueryBuilder::new(),
        }
    }
}

impl TimeRangeQueryBuilder {
    /// Start a new, empty builder scanning oldest-first
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a builder that scans newest-first
    pub fn latest() -> Self {
        Self {
            inner: IndexQueryBuilder::new().scan_backward(),
        }
    }

    /// Start a builder that scans oldest-first
    ///
    /// Equivalent to [`Self::new`]; provided for symmetry with [`Self::latest`].
    pub fn oldest() -> Self {
        Self::new()
    }

    /// Set the partition value for the chosen index
    pub fn with_partition_key(mut self, value: impl Into<String>) -> Self {
        self.inner = self.inner.with_partition_key(value);
        self
    }

    /// Require the timestamp to be at or after `start`
    pub fn from(mut self, start: OffsetDateTime) -> Self {
        self.inner = self.inner.with_sort_key_greater_or_equal(format_instant(start));
        self
    }

    /// Require the timestamp to be strictly before `end`
    pub fn until(mut self, end: OffsetDateTime) -> Self {
        self.inner = self.inner.with_sort_key_less_than(format_instant(end));
        self
    }

    /// Require the timestamp to fall in `[start, end)`
    pub fn between(mut self, start: OffsetDateTime, end: OffsetDateTime) -> Self {
        let inclusive_end = (end - Duration::SECOND).max(start);
        self.inner = self
            .inner
            .with_sort_key_between(format_instant(start), format_instant(inclusive_end));
        self
    }

    /// Require the timestamp to fall within the last `hours` hours, up to now
    pub fn last_n_hours(self, hours: i64) -> Self {
        let now = OffsetDateTime::now_utc();
        self.between(now - Duration::hours(hours), now)
    }

    /// Require the timestamp to fall within the last `days` days, up to now
    pub fn last_n_days(self, days: i64) -> Self {
        let now = OffsetDateTime::now_utc();
        self.between(now - Duration::days(days), now)
    }

    /// Require the timestamp to fall within today, the current UTC calendar
    /// day from midnight up to now
    pub fn today(self) -> Self {
        let now = OffsetDateTime::now_utc();
        self.between(start_of_day(now), now)
    }

    /// Require the timestamp to fall within this week, from Monday midnight
    /// UTC up to now
    pub fn this_week(self) -> Self {
        let now = OffsetDateTime::now_utc();
        self.between(start_of_week(now), now)
    }

    /// Require the timestamp to fall within this month, from the first of
    /// the month midnight UTC up to now
    pub fn this_month(self) -> Self {
        let now = OffsetDateTime::now_utc();
        self.between(start_of_month(now), now)
    }

    /// Cap the number of items evaluated per page
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.inner = self.inner.with_limit(limit);
        self
    }

    /// Resolve this builder against `T`'s registered key pattern table for
    /// the named index tag
    pub fn build<T: 'static>(self, index_tag: &str) -> Result<QueryParams, Error> {
        self.inner.build::<T>(index_tag)
    }
}

/// Walks a `[start, end)` time window in fixed-size slices, running one
/// query per slice
///
/// Each call to [`Self::next_slice`] advances the cursor by `slice_width`,
/// clamping the final slice to the window's end.
#[derive(Debug)]
pub struct TimeWindowIter<'a, Tb> {
    table: &'a Tb,
    index_tag: String,
    partition_value: String,
    slice_width: Duration,
    cursor: OffsetDateTime,
    window_end: OffsetDateTime,
}

impl<'a, Tb: Table> TimeWindowIter<'a, Tb> {
    /// Start iterating `window` in slices of `slice_width`
    pub fn new(
        table: &'a Tb,
        index_tag: impl Into<String>,
        partition_value: impl Into<String>,
        window: Range<OffsetDateTime>,
        slice_width: Duration,
    ) -> Self {
        Self {
            table,
            index_tag: index_tag.into(),
            partition_value: partition_value.into(),
            slice_width,
            cursor: window.start,
            window_end: window.end,
        }
    }

    /// Fetch the next slice, or `None` once the window is exhausted
    ///
    /// The returned `bool` is `true` if slices remain after this one.
    pub async fn next_slice<T>(&mut self) -> Result<Option<(Vec<T>, bool)>, Error>
    where
        T: serde::de::DeserializeOwned + Send + Sync + 'static,
    {
        if self.cursor >= self.window_end {
            return Ok(None);
        }

        let slice_end = (self.cursor + self.slice_width).min(self.window_end);

        let params = TimeRangeQueryBuilder::new()
            .with_partition_key(self.partition_value.clone())
            .between(self.cursor, slice_end)
            .build::<T>(&self.index_tag)?;

        let items = store::query::<T>(self.table, params).await?;

        self.cursor = slice_end;
        let has_more = self.cursor < self.window_end;

        Ok(Some((items, has_more)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Event;

    fn register_event() {
        let _ = crate::registry::register_index_map::<Event>(
            crate::template::IndexMap::new()
                .with("PK", "EVENT#{StreamId}")
                .with("GSI1PK", "STREAM#{StreamId}")
                .with("GSI1SK", "TIME#{Timestamp}"),
        );
        crate::registry::register_physical_index(
            "GSI1",
            crate::keys::GlobalSecondaryIndexDefinition {
                index_name: "GSI1",
                hash_key: "PK1",
                range_key: Some("SK1"),
            }
            .into_index(),
        );
    }

    fn instant(unix: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(unix).unwrap()
    }

    #[test]
    fn from_formats_a_lower_bound() {
        register_event();
        let params = TimeRangeQueryBuilder::new()
            .with_partition_key("abc")
            .from(instant(12345321))
            .build::<Event>("GSI1")
            .unwrap();

        assert_eq!(
            params.values[":key_SK"].as_s().unwrap(),
            "TIME#1970-05-23T21:15:21Z"
        );
    }

    #[test]
    fn between_steps_the_end_back_one_second() {
        register_event();
        let params = TimeRangeQueryBuilder::new()
            .with_partition_key("abc")
            .between(instant(1000), instant(1010))
            .build::<Event>("GSI1")
            .unwrap();

        assert_eq!(
            params.values[":key_SK_END"].as_s().unwrap(),
            "TIME#1970-01-01T00:16:49Z"
        );
    }

    #[test]
    fn latest_scans_backward() {
        register_event();
        let params = TimeRangeQueryBuilder::latest()
            .with_partition_key("abc")
            .from(instant(0))
            .build::<Event>("GSI1")
            .unwrap();

        assert_eq!(params.direction, crate::query::ScanDirection::Backward);
    }

    #[test]
    fn last_n_hours_anchors_the_lower_bound_one_day_back() {
        register_event();
        let params = TimeRangeQueryBuilder::new()
            .with_partition_key("abc")
            .last_n_hours(24)
            .build::<Event>("GSI1")
            .unwrap();

        let start = params.values[":key_SK_START"].as_s().unwrap().clone();
        let end = params.values[":key_SK_END"].as_s().unwrap().clone();
        assert!(start < end);
    }

    #[test]
    fn today_starts_at_midnight_utc() {
        register_event();
        let params = TimeRangeQueryBuilder::new()
            .with_partition_key("abc")
            .today()
            .build::<Event>("GSI1")
            .unwrap();

        let start = params.values[":key_SK_START"].as_s().unwrap();
        assert!(start.ends_with("T00:00:00Z"));
    }

    #[test]
    fn start_of_week_lands_on_monday_midnight() {
        let wednesday = instant(1_700_000_000); // 2023-11-14, a Tuesday
        let start = start_of_week(wednesday);
        assert_eq!(start.weekday(), time::Weekday::Monday);
        assert_eq!(start.time(), time::Time::MIDNIGHT);
        assert!(start <= wednesday);
    }

    #[test]
    fn start_of_month_lands_on_the_first() {
        let ts = instant(1_700_000_000);
        let start = start_of_month(ts);
        assert_eq!(start.day(), 1);
        assert_eq!(start.time(), time::Time::MIDNIGHT);
        assert!(start <= ts);
    }

    #[test]
    fn this_week_and_this_month_translate_into_a_between_query() {
        register_event();
        let week_params = TimeRangeQueryBuilder::new()
            .with_partition_key("abc")
            .this_week()
            .build::<Event>("GSI1")
            .unwrap();
        assert!(week_params.values.contains_key(":key_SK_START"));
        assert!(week_params.values.contains_key(":key_SK_END"));

        let month_params = TimeRangeQueryBuilder::new()
            .with_partition_key("abc")
            .this_month()
            .build::<Event>("GSI1")
            .unwrap();
        assert!(month_params.values.contains_key(":key_SK_START"));
        assert!(month_params.values.contains_key(":key_SK_END"));
    }
}
