use polars::prelude::{DataType, Expr, LazyFrame, Null, PlSmallStr, col, lit, when};

use crate::{
    config::HolidayYears,
    error::FeatureResult,
    features::{BatchKind, FeatureBatch, FeatureCol, holiday::HolidayCalendar, names},
    schema::RecordCol,
};

/// Calendar features of the search moment and of the implied check-in date.
#[derive(Debug, Clone)]
pub struct TemporalBatch {
    timestamp: PlSmallStr,
    horizon_days: PlSmallStr,
    calendar: HolidayCalendar,
}

impl Default for TemporalBatch {
    fn default() -> Self {
        Self::new(HolidayYears::default())
    }
}

impl TemporalBatch {
    pub fn new(years: HolidayYears) -> Self {
        Self {
            timestamp: RecordCol::SearchTimestamp.name(),
            horizon_days: RecordCol::DaysUntilCheckin.name(),
            calendar: HolidayCalendar::us_federal(years),
        }
    }

    pub fn exprs(&self) -> Vec<Expr> {
        let ts = col(self.timestamp.clone());
        let hour = ts.clone().dt().hour();
        let search_date = ts.clone().dt().date();
        let checkin = checkin_date(search_date.clone(), col(self.horizon_days.clone()));

        vec![
            // === Search moment ===
            hour.clone().alias(FeatureCol::SearchHour),
            ts.clone().dt().weekday().alias(FeatureCol::SearchDayOfWeek),
            ts.clone().dt().week().alias(FeatureCol::SearchWeek),
            ts.clone().dt().month().alias(FeatureCol::SearchMonth),
            ts.clone().dt().year().alias(FeatureCol::SearchYear),
            search_date.clone().alias(FeatureCol::SearchDate),
            weekend_flag(ts.dt().weekday()).alias(FeatureCol::IsWeekendSearch),
            self.calendar
                .flag(search_date)
                .alias(FeatureCol::IsHolidaySearch),
            time_of_day(hour).alias(FeatureCol::SearchTimeOfDay),
            // === Check-in ===
            checkin.clone().alias(FeatureCol::ExpectedCheckinDate),
            checkin
                .clone()
                .dt()
                .weekday()
                .alias(FeatureCol::CheckinDayOfWeek),
            checkin.clone().dt().day().alias(FeatureCol::CheckinDayOfMonth),
            checkin.clone().dt().month().alias(FeatureCol::CheckinMonth),
            weekend_flag(checkin.clone().dt().weekday()).alias(FeatureCol::IsWeekendCheckin),
            self.calendar
                .flag(checkin)
                .alias(FeatureCol::IsHolidayCheckin),
        ]
    }
}

impl FeatureBatch for TemporalBatch {
    fn kind(&self) -> BatchKind {
        BatchKind::Temporal
    }

    fn inputs(&self) -> Vec<PlSmallStr> {
        vec![self.timestamp.clone(), self.horizon_days.clone()]
    }

    fn outputs(&self) -> Vec<PlSmallStr> {
        names([
            FeatureCol::SearchHour,
            FeatureCol::SearchDayOfWeek,
            FeatureCol::SearchWeek,
            FeatureCol::SearchMonth,
            FeatureCol::SearchYear,
            FeatureCol::SearchDate,
            FeatureCol::IsWeekendSearch,
            FeatureCol::IsHolidaySearch,
            FeatureCol::SearchTimeOfDay,
            FeatureCol::ExpectedCheckinDate,
            FeatureCol::CheckinDayOfWeek,
            FeatureCol::CheckinDayOfMonth,
            FeatureCol::CheckinMonth,
            FeatureCol::IsWeekendCheckin,
            FeatureCol::IsHolidayCheckin,
        ])
    }

    fn apply(&self, lf: LazyFrame) -> FeatureResult<LazyFrame> {
        Ok(lf.with_columns(self.exprs()))
    }
}

/// Adds whole calendar days to a date through its day-number representation.
fn checkin_date(date: Expr, days: Expr) -> Expr {
    (date.cast(DataType::Int32) + days.cast(DataType::Int32)).cast(DataType::Date)
}

/// Friday or Saturday (weekend nights), given an ISO weekday (Monday = 1).
fn weekend_flag(weekday: Expr) -> Expr {
    weekday
        .clone()
        .eq(lit(5))
        .or(weekday.eq(lit(6)))
        .cast(DataType::Int8)
}

/// Buckets: 0-5 night, 6-11 morning, 12-17 afternoon, 18-23 evening.
fn time_of_day(hour: Expr) -> Expr {
    when(hour.clone().lt(lit(6)))
        .then(lit("night"))
        .when(hour.clone().lt(lit(12)))
        .then(lit("morning"))
        .when(hour.clone().lt(lit(18)))
        .then(lit("afternoon"))
        .when(hour.is_not_null())
        .then(lit("evening"))
        .otherwise(lit(Null {}))
        .cast(DataType::String)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};
    use polars::{
        df,
        prelude::{DataFrame, IntoLazy},
    };

    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, 30, 0))
            .expect("valid timestamp")
    }

    fn searches() -> DataFrame {
        df![
            "search_timestamp" => &[
                Some(at(2013, 7, 4, 14)),
                Some(at(2013, 12, 29, 2)),
                Some(at(2014, 3, 10, 19)),
                None,
            ],
            "days_until_checkin" => &[Some(2i16), Some(3), Some(0), Some(5)],
        ]
        .expect("Failed to create DF")
    }

    fn derive() -> DataFrame {
        TemporalBatch::default()
            .apply(searches().lazy())
            .expect("apply")
            .collect()
            .expect("collect")
    }

    fn ints(df: &DataFrame, c: FeatureCol) -> Vec<Option<i64>> {
        df.column(c.as_str())
            .and_then(|s| s.cast(&DataType::Int64))
            .expect("int column")
            .i64()
            .expect("i64")
            .into_iter()
            .collect()
    }

    #[test]
    fn search_moment_features() {
        let df = derive();
        assert_eq!(ints(&df, FeatureCol::SearchHour), vec![Some(14), Some(2), Some(19), None]);
        // Thu, Sun, Mon
        assert_eq!(
            ints(&df, FeatureCol::SearchDayOfWeek),
            vec![Some(4), Some(7), Some(1), None]
        );
        assert_eq!(
            ints(&df, FeatureCol::IsWeekendSearch),
            vec![Some(0), Some(0), Some(0), None]
        );
        assert_eq!(
            ints(&df, FeatureCol::IsHolidaySearch),
            vec![Some(1), Some(0), Some(0), None]
        );
        assert_eq!(ints(&df, FeatureCol::SearchYear)[0], Some(2013));
        assert_eq!(ints(&df, FeatureCol::SearchMonth)[1], Some(12));

        let tod = df
            .column(FeatureCol::SearchTimeOfDay.as_str())
            .expect("time of day");
        let tod = tod.str().expect("str").into_iter().collect::<Vec<_>>();
        assert_eq!(tod, vec![Some("afternoon"), Some("night"), Some("evening"), None]);
    }

    #[test]
    fn checkin_uses_calendar_day_arithmetic() {
        let df = derive();
        let checkin = df
            .column(FeatureCol::ExpectedCheckinDate.as_str())
            .expect("checkin");
        assert_eq!(checkin.dtype(), &DataType::Date);

        // 2013-07-04 + 2 = Saturday 2013-07-06
        assert_eq!(ints(&df, FeatureCol::CheckinDayOfWeek)[0], Some(6));
        assert_eq!(ints(&df, FeatureCol::IsWeekendCheckin)[0], Some(1));
        assert_eq!(ints(&df, FeatureCol::IsHolidayCheckin)[0], Some(0));

        // 2013-12-29 + 3 crosses the year into New Year's Day
        assert_eq!(ints(&df, FeatureCol::CheckinDayOfMonth)[1], Some(1));
        assert_eq!(ints(&df, FeatureCol::CheckinMonth)[1], Some(1));
        assert_eq!(ints(&df, FeatureCol::IsHolidayCheckin)[1], Some(1));

        assert_eq!(checkin.null_count(), 1, "Null timestamp yields null check-in");
    }

    #[test]
    fn weekend_means_friday_and_saturday_nights() {
        let df = df![
            // Fri, Sat, Sun, Thu
            "search_timestamp" => &[
                Some(at(2013, 7, 5, 10)),
                Some(at(2013, 7, 6, 10)),
                Some(at(2013, 7, 7, 10)),
                Some(at(2013, 7, 4, 10)),
            ],
            // Check-ins: Fri, Sun, Sun, Fri
            "days_until_checkin" => &[Some(0i16), Some(1), Some(0), Some(1)],
        ]
        .expect("Failed to create DF");

        let out = TemporalBatch::default()
            .apply(df.lazy())
            .expect("apply")
            .collect()
            .expect("collect");

        assert_eq!(
            ints(&out, FeatureCol::IsWeekendSearch),
            vec![Some(1), Some(1), Some(0), Some(0)]
        );
        assert_eq!(
            ints(&out, FeatureCol::IsWeekendCheckin),
            vec![Some(1), Some(0), Some(0), Some(1)]
        );
    }

    #[test]
    fn declared_outputs_match_produced_columns() {
        let df = derive();
        for out in TemporalBatch::default().outputs() {
            assert!(df.column(out.as_str()).is_ok(), "missing output {out}");
        }
        assert_eq!(df.height(), 4);
    }
}
