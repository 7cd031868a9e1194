use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Timelike, Weekday};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("Unsupported time period: {0}")]
    UnsupportedScale(TimePeriod),
}

/// Fixed bucket lengths understood by the backend, in seconds.
///
/// Month and Year are nominal (30 and 365 days); calendar-aware stepping
/// lives on [`SelectablePeriod`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimePeriod {
    Minute,
    FiveMinutes,
    TwentyMinutes,
    Hour,
    FourHours,
    Day,
    Week,
    Month,
    Year,
}

impl TimePeriod {
    pub const ALL: [TimePeriod; 9] = [
        TimePeriod::Minute,
        TimePeriod::FiveMinutes,
        TimePeriod::TwentyMinutes,
        TimePeriod::Hour,
        TimePeriod::FourHours,
        TimePeriod::Day,
        TimePeriod::Week,
        TimePeriod::Month,
        TimePeriod::Year,
    ];

    pub const fn seconds(self) -> i64 {
        match self {
            TimePeriod::Minute => 60,
            TimePeriod::FiveMinutes => 5 * 60,
            TimePeriod::TwentyMinutes => 20 * 60,
            TimePeriod::Hour => 60 * 60,
            TimePeriod::FourHours => 4 * 60 * 60,
            TimePeriod::Day => 24 * 60 * 60,
            TimePeriod::Week => 7 * 24 * 60 * 60,
            TimePeriod::Month => 30 * 24 * 60 * 60,
            TimePeriod::Year => 365 * 24 * 60 * 60,
        }
    }

    pub fn from_seconds(seconds: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.seconds() == seconds)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimePeriod::Minute => "Minute",
            TimePeriod::FiveMinutes => "5 Minutes",
            TimePeriod::TwentyMinutes => "20 Minutes",
            TimePeriod::Hour => "Hour",
            TimePeriod::FourHours => "4 Hours",
            TimePeriod::Day => "Day",
            TimePeriod::Week => "Week",
            TimePeriod::Month => "Month",
            TimePeriod::Year => "Year",
        }
    }

    /// Ordered breakdown units used when this period is the display scale.
    fn subunits(self) -> Option<&'static [(TimePeriod, &'static str)]> {
        match self {
            TimePeriod::Month | TimePeriod::Week => {
                Some(&[(TimePeriod::Day, "days"), (TimePeriod::Hour, "hr")])
            }
            TimePeriod::Day => Some(&[(TimePeriod::Hour, "hr"), (TimePeriod::Minute, "min")]),
            TimePeriod::Hour | TimePeriod::Minute => Some(&[(TimePeriod::Minute, "min")]),
            TimePeriod::Year
            | TimePeriod::FourHours
            | TimePeriod::TwentyMinutes
            | TimePeriod::FiveMinutes => None,
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Formats `seconds` as a compact breakdown such as `"2 days, 3 hr"`.
pub fn format_interval(scale: TimePeriod, seconds: i64) -> Result<String, PeriodError> {
    let units = scale
        .subunits()
        .ok_or(PeriodError::UnsupportedScale(scale))?;

    let mut remaining = seconds;
    let mut parts = Vec::with_capacity(units.len());
    for (unit, label) in units {
        let size = unit.seconds();
        if remaining > size {
            let count = remaining / size;
            parts.push(format!("{count} {label}"));
            remaining -= count * size;
        }
    }

    if parts.is_empty() {
        // Tables are never empty.
        let smallest = units.last().map(|(_, label)| *label).unwrap_or_default();
        return Ok(format!("0{smallest}"));
    }
    Ok(parts.join(", "))
}

/// Formats a bucket start for a chart axis at the given granularity.
pub fn format_date<Tz>(interval: TimePeriod, date: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let pattern = match interval {
        TimePeriod::Year => "%Y",
        TimePeriod::Month => "%b %y",
        TimePeriod::Week | TimePeriod::Day => "%-d %b",
        TimePeriod::FourHours
        | TimePeriod::Hour
        | TimePeriod::TwentyMinutes
        | TimePeriod::FiveMinutes
        | TimePeriod::Minute => "%H:%M",
    };
    date.format(pattern).to_string()
}

/// Which chart a bucket table is for. The uptime chart zooms one step finer
/// at the hour scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Series {
    History,
    Uptime,
}

/// Coarse periods the user can page through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectablePeriod {
    Year,
    Month,
    Week,
    Day,
    Hour,
}

impl SelectablePeriod {
    pub const CHART_OPTIONS: [SelectablePeriod; 4] = [
        SelectablePeriod::Month,
        SelectablePeriod::Week,
        SelectablePeriod::Day,
        SelectablePeriod::Hour,
    ];

    pub fn as_period(self) -> TimePeriod {
        match self {
            SelectablePeriod::Year => TimePeriod::Year,
            SelectablePeriod::Month => TimePeriod::Month,
            SelectablePeriod::Week => TimePeriod::Week,
            SelectablePeriod::Day => TimePeriod::Day,
            SelectablePeriod::Hour => TimePeriod::Hour,
        }
    }

    pub fn from_period(period: TimePeriod) -> Option<Self> {
        match period {
            TimePeriod::Year => Some(SelectablePeriod::Year),
            TimePeriod::Month => Some(SelectablePeriod::Month),
            TimePeriod::Week => Some(SelectablePeriod::Week),
            TimePeriod::Day => Some(SelectablePeriod::Day),
            TimePeriod::Hour => Some(SelectablePeriod::Hour),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        self.as_period().as_str()
    }

    /// Bucket size requested from the backend when this period is shown.
    pub fn interval(self, series: Series) -> TimePeriod {
        match self {
            SelectablePeriod::Year => TimePeriod::Month,
            SelectablePeriod::Month | SelectablePeriod::Week => TimePeriod::Day,
            SelectablePeriod::Day => TimePeriod::Hour,
            SelectablePeriod::Hour => match series {
                Series::History => TimePeriod::FiveMinutes,
                Series::Uptime => TimePeriod::Minute,
            },
        }
    }

    /// Start of the bucket containing `now`, in `now`'s time zone.
    pub fn start_of<Tz: TimeZone>(self, now: &DateTime<Tz>, week_start: Weekday) -> DateTime<Tz> {
        let local = now.naive_local();
        let date = local.date();
        let aligned = match self {
            SelectablePeriod::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).map(midnight),
            SelectablePeriod::Month => {
                NaiveDate::from_ymd_opt(date.year(), date.month(), 1).map(midnight)
            }
            SelectablePeriod::Week => {
                let back = days_since(date.weekday(), week_start);
                date.checked_sub_days(Days::new(back)).map(midnight)
            }
            SelectablePeriod::Day => Some(midnight(date)),
            SelectablePeriod::Hour => date.and_hms_opt(local.hour(), 0, 0),
        };
        aligned
            .and_then(|naive| localize(&now.timezone(), naive))
            .unwrap_or_else(|| now.clone())
    }

    /// Moves `datetime` by `count` periods using calendar arithmetic.
    ///
    /// Out-of-range results leave the instant unchanged.
    pub fn add<Tz: TimeZone>(self, datetime: &DateTime<Tz>, count: i32) -> DateTime<Tz> {
        let local = datetime.naive_local();
        let magnitude = count.unsigned_abs();
        let shifted = match self {
            SelectablePeriod::Year => shift_months(local, magnitude.saturating_mul(12), count < 0),
            SelectablePeriod::Month => shift_months(local, magnitude, count < 0),
            SelectablePeriod::Week => shift_days(local, u64::from(magnitude) * 7, count < 0),
            SelectablePeriod::Day => shift_days(local, u64::from(magnitude), count < 0),
            SelectablePeriod::Hour => return datetime.clone() + Duration::hours(i64::from(count)),
        };
        shifted
            .and_then(|naive| localize(&datetime.timezone(), naive))
            .unwrap_or_else(|| datetime.clone())
    }

    pub fn next<Tz: TimeZone>(self, datetime: &DateTime<Tz>) -> DateTime<Tz> {
        self.add(datetime, 1)
    }

    pub fn previous<Tz: TimeZone>(self, datetime: &DateTime<Tz>) -> DateTime<Tz> {
        self.add(datetime, -1)
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

fn days_since(day: Weekday, week_start: Weekday) -> u64 {
    u64::from((day.num_days_from_monday() + 7 - week_start.num_days_from_monday()) % 7)
}

fn shift_months(naive: NaiveDateTime, months: u32, backwards: bool) -> Option<NaiveDateTime> {
    if backwards {
        naive.checked_sub_months(Months::new(months))
    } else {
        naive.checked_add_months(Months::new(months))
    }
}

fn shift_days(naive: NaiveDateTime, days: u64, backwards: bool) -> Option<NaiveDateTime> {
    if backwards {
        naive.checked_sub_days(Days::new(days))
    } else {
        naive.checked_add_days(Days::new(days))
    }
}

/// Resolves a wall-clock time, taking the earlier instant on a fold and the
/// first valid instant after a gap.
fn localize<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
}

/// The `[start, end)` range a chart currently shows.
#[derive(Debug, Clone)]
pub struct PeriodWindow<Tz: TimeZone> {
    pub series: Series,
    pub period: SelectablePeriod,
    pub interval: TimePeriod,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub week_start: Weekday,
}

impl<Tz: TimeZone> PeriodWindow<Tz> {
    pub fn starting_now(
        series: Series,
        period: SelectablePeriod,
        now: &DateTime<Tz>,
        week_start: Weekday,
    ) -> Self {
        let start = period.start_of(now, week_start);
        let end = period.next(&start);
        Self {
            series,
            period,
            interval: period.interval(series),
            start,
            end,
            week_start,
        }
    }

    /// Switches to `period` and jumps to the bucket containing `now`.
    pub fn select(&mut self, period: SelectablePeriod, now: &DateTime<Tz>) {
        *self = Self::starting_now(self.series, period, now, self.week_start);
    }

    pub fn step_forward(&mut self) {
        self.start = self.period.next(&self.start);
        self.end = self.period.next(&self.end);
    }

    pub fn step_backward(&mut self) {
        self.start = self.period.previous(&self.start);
        self.end = self.period.previous(&self.end);
    }

    /// Zooms into the bucket starting at `bucket_start`. Returns `false` when
    /// already at the finest granularity.
    pub fn drill_down(&mut self, bucket_start: DateTime<Tz>) -> bool {
        let Some(period) = SelectablePeriod::from_period(self.interval) else {
            return false;
        };
        self.period = period;
        self.interval = period.interval(self.series);
        self.end = period.next(&bucket_start);
        self.start = bucket_start;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn utc(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
    }

    #[test]
    fn day_scale_breaks_into_hours_and_minutes() {
        assert_eq!(format_interval(TimePeriod::Day, 5400).unwrap(), "1 hr, 30 min");
    }

    #[test]
    fn week_scale_uses_days() {
        let seconds = 2 * 86_400 + 3 * 3_600 + 59;
        assert_eq!(format_interval(TimePeriod::Week, seconds).unwrap(), "2 days, 3 hr");
    }

    #[test]
    fn zero_duration_uses_smallest_label() {
        assert_eq!(format_interval(TimePeriod::Month, 0).unwrap(), "0hr");
        assert_eq!(format_interval(TimePeriod::Week, 0).unwrap(), "0hr");
        assert_eq!(format_interval(TimePeriod::Day, 0).unwrap(), "0min");
        assert_eq!(format_interval(TimePeriod::Hour, 0).unwrap(), "0min");
        assert_eq!(format_interval(TimePeriod::Minute, 0).unwrap(), "0min");
    }

    #[test]
    fn exact_unit_is_not_counted_at_that_unit() {
        // One full hour only exceeds the minute unit.
        assert_eq!(format_interval(TimePeriod::Day, 3600).unwrap(), "60 min");
    }

    #[test]
    fn unsupported_scales_are_rejected() {
        for scale in [
            TimePeriod::Year,
            TimePeriod::FourHours,
            TimePeriod::TwentyMinutes,
            TimePeriod::FiveMinutes,
        ] {
            assert_eq!(
                format_interval(scale, 100),
                Err(PeriodError::UnsupportedScale(scale))
            );
        }
    }

    #[test]
    fn leading_count_never_decreases() {
        for scale in [TimePeriod::Month, TimePeriod::Day, TimePeriod::Hour] {
            let mut previous = 0;
            for seconds in (0..400_000).step_by(997) {
                let text = format_interval(scale, seconds).unwrap();
                let leading: i64 = text
                    .split(|c: char| !c.is_ascii_digit())
                    .next()
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(0);
                let first_label_is_largest = text.contains(scale.subunits().unwrap()[0].1)
                    || scale.subunits().unwrap().len() == 1;
                if first_label_is_largest {
                    assert!(leading >= previous, "{scale}: {seconds} -> {text}");
                    previous = leading;
                }
            }
        }
    }

    #[test]
    fn date_labels_follow_granularity() {
        let t = utc(2024, 3, 10, 15, 0);
        assert_eq!(format_date(TimePeriod::Year, &t), "2024");
        assert_eq!(format_date(TimePeriod::Month, &t), "Mar 24");
        assert_eq!(format_date(TimePeriod::Day, &t), "10 Mar");
        assert_eq!(format_date(TimePeriod::FiveMinutes, &t), "15:00");
    }

    #[test]
    fn day_navigation_scenario() {
        let now = utc(2024, 3, 10, 15, 0);
        let start = SelectablePeriod::Day.start_of(&now, Weekday::Sun);
        assert_eq!(start, utc(2024, 3, 10, 0, 0));
        assert_eq!(SelectablePeriod::Day.next(&start), utc(2024, 3, 11, 0, 0));
        assert_eq!(SelectablePeriod::Day.previous(&start), utc(2024, 3, 9, 0, 0));
    }

    #[test]
    fn week_starts_on_configured_day_at_midnight() {
        for day in 1..=28 {
            let t = utc(2024, 2, day, 13, 37);
            let sunday = SelectablePeriod::Week.start_of(&t, Weekday::Sun);
            assert_eq!(sunday.weekday(), Weekday::Sun);
            assert_eq!((sunday.hour(), sunday.minute()), (0, 0));
            assert!(sunday <= t && t - sunday < Duration::days(7));

            let monday = SelectablePeriod::Week.start_of(&t, Weekday::Mon);
            assert_eq!(monday.weekday(), Weekday::Mon);
        }
    }

    #[test]
    fn start_of_respects_offset() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 3, 10, 1, 30, 0).unwrap();
        let start = SelectablePeriod::Day.start_of(&now, Weekday::Sun);
        assert_eq!(start, tz.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap());
    }

    #[test]
    fn month_and_year_alignment() {
        let now = utc(2023, 7, 19, 8, 5);
        assert_eq!(SelectablePeriod::Month.start_of(&now, Weekday::Sun), utc(2023, 7, 1, 0, 0));
        assert_eq!(SelectablePeriod::Year.start_of(&now, Weekday::Sun), utc(2023, 1, 1, 0, 0));
        assert_eq!(SelectablePeriod::Hour.start_of(&now, Weekday::Sun), utc(2023, 7, 19, 8, 0));
    }

    #[test]
    fn stepping_round_trips() {
        let periods = [
            SelectablePeriod::Year,
            SelectablePeriod::Month,
            SelectablePeriod::Week,
            SelectablePeriod::Day,
            SelectablePeriod::Hour,
        ];
        for period in periods {
            for t in [utc(2023, 1, 15, 9, 41), utc(2024, 6, 1, 0, 0), utc(2022, 11, 28, 23, 59)] {
                assert_eq!(period.previous(&period.next(&t)), t, "{period:?} at {t}");
                assert_eq!(period.next(&period.previous(&t)), t, "{period:?} at {t}");
            }
        }
    }

    #[test]
    fn month_stepping_follows_calendar_length() {
        let feb = utc(2024, 2, 1, 0, 0);
        assert_eq!(SelectablePeriod::Month.next(&feb), utc(2024, 3, 1, 0, 0));
        assert_eq!(SelectablePeriod::Month.next(&feb) - feb, Duration::days(29));
        assert_eq!(SelectablePeriod::Week.next(&feb), utc(2024, 2, 8, 0, 0));
    }

    #[test]
    fn window_pages_and_drills_down() {
        let now = utc(2024, 3, 10, 15, 0);
        let mut window = PeriodWindow::starting_now(Series::Uptime, SelectablePeriod::Week, &now, Weekday::Sun);
        assert_eq!(window.start, utc(2024, 3, 10, 0, 0));
        assert_eq!(window.end, utc(2024, 3, 17, 0, 0));
        assert_eq!(window.interval, TimePeriod::Day);

        window.step_backward();
        assert_eq!(window.start, utc(2024, 3, 3, 0, 0));
        window.step_forward();
        assert_eq!(window.start, utc(2024, 3, 10, 0, 0));

        assert!(window.drill_down(utc(2024, 3, 12, 0, 0)));
        assert_eq!(window.period, SelectablePeriod::Day);
        assert_eq!(window.interval, TimePeriod::Hour);
        assert_eq!(window.end, utc(2024, 3, 13, 0, 0));

        assert!(window.drill_down(utc(2024, 3, 12, 5, 0)));
        assert_eq!(window.interval, TimePeriod::Minute);
        assert!(!window.drill_down(utc(2024, 3, 12, 5, 7)));
        assert_eq!(window.start, utc(2024, 3, 12, 5, 0));
    }

    #[test]
    fn history_hour_uses_five_minute_buckets() {
        assert_eq!(SelectablePeriod::Hour.interval(Series::History), TimePeriod::FiveMinutes);
        assert_eq!(SelectablePeriod::Hour.interval(Series::Uptime), TimePeriod::Minute);
        assert_eq!(SelectablePeriod::Year.interval(Series::History), TimePeriod::Month);
    }

    #[test]
    fn seconds_round_trip_through_lookup() {
        for period in TimePeriod::ALL {
            assert_eq!(TimePeriod::from_seconds(period.seconds()), Some(period));
        }
        assert_eq!(TimePeriod::Year.seconds(), 365 * TimePeriod::Day.seconds());
    }
}
