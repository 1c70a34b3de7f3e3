use std::{collections::HashSet, sync::Arc};

use chrono::{Datelike, NaiveDate, Weekday};
use polars::prelude::{
    Column, DataType, Expr, Field, Int8Chunked, IntoColumn, IntoSeries, PolarsResult,
};

use crate::config::HolidayYears;

/// US federal holidays, including the weekday on which weekend holidays are observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidayCalendar {
    /// Days since the Unix epoch.
    days: HashSet<i32>,
}

impl HolidayCalendar {
    pub fn us_federal(years: HolidayYears) -> Self {
        let days = (years.first..=years.last)
            .flat_map(federal_holidays)
            .flat_map(|d| [Some(d), observed(d)])
            .flatten()
            .map(epoch_days)
            .collect();
        Self { days }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.days.contains(&epoch_days(date))
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Int8 flag (1 = holiday) for a `Date` expression. Null dates stay null.
    pub fn flag(&self, date: Expr) -> Expr {
        let days = Arc::new(self.days.clone());
        date.cast(DataType::Date).map(
            move |c| holiday_flags(c, &days),
            |_, f| Ok(Field::new(f.name().clone(), DataType::Int8)),
        )
    }
}

fn holiday_flags(c: Column, days: &HashSet<i32>) -> PolarsResult<Column> {
    let ca = c.date()?;
    let out = ca
        .physical()
        .into_iter()
        .map(|d| d.map(|d| i8::from(days.contains(&d))))
        .collect::<Int8Chunked>()
        .with_name(c.name().clone())
        .into_series()
        .into_column();
    Ok(out)
}

fn federal_holidays(year: i32) -> Vec<NaiveDate> {
    let fixed = |month, day| NaiveDate::from_ymd_opt(year, month, day);
    let nth = |month, weekday, n| NaiveDate::from_weekday_of_month_opt(year, month, weekday, n);
    let last = |month, weekday| nth(month, weekday, 5).or_else(|| nth(month, weekday, 4));

    [
        fixed(1, 1),                 // New Year's Day
        nth(1, Weekday::Mon, 3),     // Martin Luther King Jr. Day
        nth(2, Weekday::Mon, 3),     // Washington's Birthday
        last(5, Weekday::Mon),       // Memorial Day
        fixed(7, 4),                 // Independence Day
        nth(9, Weekday::Mon, 1),     // Labor Day
        nth(10, Weekday::Mon, 2),    // Columbus Day
        fixed(11, 11),               // Veterans Day
        nth(11, Weekday::Thu, 4),    // Thanksgiving
        fixed(12, 25),               // Christmas Day
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Saturday holidays are observed on Friday, Sunday holidays on Monday.
fn observed(date: NaiveDate) -> Option<NaiveDate> {
    match date.weekday() {
        Weekday::Sat => date.pred_opt(),
        Weekday::Sun => date.succ_opt(),
        _ => None,
    }
}

fn epoch_days(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    (date - epoch).num_days() as i32
}
