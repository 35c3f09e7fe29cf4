//! Opening-interval derivation.
//!
//! Joins `calendar_items` rows with the parsed day-type legends and anchors
//! each range to an absolute instant in the park's time zone.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta, TimeZone};
use chrono_tz::Tz;

use crate::legend;
use crate::models::{CalendarDay, CalendarRow, ClockTime, LegendRule, OpeningInterval, ScheduleKind, TimeRange};

/// Parse raw `labels` rows into a legend rule per day type.
pub fn legend_rules<'a>(labels: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<LegendRule> {
    labels
        .into_iter()
        .map(|(type_key, value)| LegendRule {
            type_key: type_key.to_string(),
            ranges: legend::parse_legend(value),
        })
        .collect()
}

/// Index legend rules by day type. Later duplicates win.
pub fn legends_by_type(rules: &[LegendRule]) -> HashMap<String, Vec<TimeRange>> {
    rules
        .iter()
        .map(|rule| (rule.type_key.clone(), rule.ranges.clone()))
        .collect()
}

/// One [`CalendarDay`] per row, in row order.
///
/// A day type with no legend, or whose legend yielded no ranges, becomes a
/// single `Closed` interval with no times.
pub fn build_calendar(
    rows: &[CalendarRow],
    legends: &HashMap<String, Vec<TimeRange>>,
    tz: Tz,
) -> Vec<CalendarDay> {
    rows.iter()
        .map(|row| {
            let ranges = legends.get(&row.day_type).map(Vec::as_slice).unwrap_or(&[]);
            let mut intervals: Vec<OpeningInterval> = ranges
                .iter()
                .filter_map(|range| operating_interval(row.date, range, tz))
                .collect();

            if intervals.is_empty() {
                intervals.push(OpeningInterval {
                    date: row.date,
                    opening_time: None,
                    closing_time: None,
                    kind: ScheduleKind::Closed,
                });
            }

            CalendarDay {
                date: row.date,
                day_type: row.day_type.clone(),
                intervals,
            }
        })
        .collect()
}

/// Flat interval list: row order, then legend alternative order.
pub fn build(
    rows: &[CalendarRow],
    legends: &HashMap<String, Vec<TimeRange>>,
    tz: Tz,
) -> Vec<OpeningInterval> {
    build_calendar(rows, legends, tz)
        .into_iter()
        .flat_map(|day| day.intervals)
        .collect()
}

fn operating_interval(date: NaiveDate, range: &TimeRange, tz: Tz) -> Option<OpeningInterval> {
    let opening = localize(tz, date, range.start)?;
    let mut closing = localize(tz, date, range.end)?;

    // Closing at or before opening means the range runs past midnight.
    if closing <= opening {
        closing = localize(tz, date.succ_opt()?, range.end)?;
    }

    Some(OpeningInterval {
        date,
        opening_time: Some(opening),
        closing_time: Some(closing),
        kind: ScheduleKind::Operating,
    })
}

/// Wall-clock time on `date` in `tz`. Ambiguous times (DST fall-back) take
/// the earlier instant; times inside a DST gap move forward by one hour.
fn localize(tz: Tz, date: NaiveDate, time: ClockTime) -> Option<DateTime<FixedOffset>> {
    let naive = date.and_hms_opt(time.hour, time.minute, 0)?;
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
        .map(|dt| dt.fixed_offset())
}
