//! Financial-calendar helpers. The financial year runs 1 July to 30 June;
//! quarters are JUL-SEP, OCT-DEC, JAN-MAR, APR-JUN.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("day exists in month")
}

/// First day of the given month.
pub fn ymd_start_of_month(year: i32, month: u32) -> NaiveDate {
    ymd(year, month, 1)
}

/// Last day of the month containing `date`.
pub fn end_of_month(date: NaiveDate) -> NaiveDate {
    let first = ymd(date.year(), date.month(), 1);
    add_months(first, 1) - chrono::Duration::days(1)
}

/// Month arithmetic that clamps to the end of shorter months.
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// A financial year identified by the calendar year it ends in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FinancialYear {
    end_year: i32,
}

impl FinancialYear {
    pub fn ending_in(end_year: i32) -> Self {
        Self { end_year }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        let end_year = if date.month() < 7 {
            date.year()
        } else {
            date.year() + 1
        };
        Self { end_year }
    }

    pub fn start(self) -> NaiveDate {
        ymd(self.end_year - 1, 7, 1)
    }

    pub fn end(self) -> NaiveDate {
        ymd(self.end_year, 6, 30)
    }

    pub fn end_year(self) -> i32 {
        self.end_year
    }

    pub fn next(self) -> Self {
        Self {
            end_year: self.end_year + 1,
        }
    }

    /// Display form, e.g. `2024-2025`.
    pub fn label(self) -> String {
        format!("{}-{}", self.end_year - 1, self.end_year)
    }
}

impl std::fmt::Display for FinancialYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// A quarter of a financial year, identified by its first day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FinancialQuarter {
    start: NaiveDate,
}

impl FinancialQuarter {
    pub fn from_date(date: NaiveDate) -> Self {
        let quarter_month = match date.month() {
            7..=9 => 7,
            10..=12 => 10,
            1..=3 => 1,
            _ => 4,
        };
        Self {
            start: ymd(date.year(), quarter_month, 1),
        }
    }

    /// Quarter index within the financial year, 1 (JUL-SEP) through 4 (APR-JUN).
    pub fn quarter(self) -> u8 {
        match self.start.month() {
            7 => 1,
            10 => 2,
            1 => 3,
            _ => 4,
        }
    }

    pub fn start(self) -> NaiveDate {
        self.start
    }

    pub fn end(self) -> NaiveDate {
        end_of_month(add_months(self.start, 2))
    }

    pub fn financial_year(self) -> FinancialYear {
        FinancialYear::from_date(self.start)
    }

    /// Display form, e.g. `Q3 2024-2025`.
    pub fn label(self) -> String {
        format!("Q{} {}", self.quarter(), self.financial_year().label())
    }
}

/// Financial years touched by the inclusive date range.
pub fn financial_years_in_range(start: NaiveDate, end: NaiveDate) -> Vec<FinancialYear> {
    let mut years = Vec::new();
    let mut year = FinancialYear::from_date(start);
    let last = FinancialYear::from_date(end);
    while year <= last {
        years.push(year);
        year = year.next();
    }
    years
}

/// Financial quarters touched by the inclusive date range.
pub fn financial_quarters_in_range(start: NaiveDate, end: NaiveDate) -> Vec<FinancialQuarter> {
    let mut quarters = Vec::new();
    let mut current = FinancialQuarter::from_date(start);
    let last = FinancialQuarter::from_date(end);
    while current <= last {
        quarters.push(current);
        current = FinancialQuarter::from_date(add_months(current.start, 3));
    }
    quarters
}

/// First days of the calendar months fully covered by the inclusive range.
///
/// A month counts when the range's start-day anchor falls on or after `start`
/// and its end-day anchor falls on or before `end`, with anchors clamped to
/// the end of shorter months.
pub fn months_in_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    if start >= end {
        tracing::warn!(%start, %end, "month range is empty or inverted");
        return Vec::new();
    }

    let clamp = |year: i32, month: u32, day: u32| {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap_or_else(|| end_of_month(ymd(year, month, 1)))
    };

    let mut months = Vec::new();
    let mut first = ymd(start.year(), start.month(), 1);
    while first <= end {
        let anchor_start = clamp(first.year(), first.month(), start.day());
        let anchor_end = clamp(first.year(), first.month(), end.day());
        if anchor_start >= start && anchor_end <= end {
            months.push(first);
        }
        first = add_months(first, 1);
    }
    months
}

/// Last day of the first financial year ending strictly after `date`.
pub fn end_of_next_financial_year(date: NaiveDate) -> NaiveDate {
    let candidate = ymd(date.year(), 6, 30);
    if candidate > date {
        candidate
    } else {
        ymd(date.year() + 1, 6, 30)
    }
}

/// Last day of the first calendar quarter (ending Mar/Jun/Sep/Dec) strictly
/// after `date`.
pub fn end_of_next_financial_quarter(date: NaiveDate) -> NaiveDate {
    for month in [3u32, 6, 9, 12] {
        let candidate = end_of_month(ymd(date.year(), month, 1));
        if candidate > date {
            return candidate;
        }
    }
    end_of_month(ymd(date.year() + 1, 3, 1))
}
