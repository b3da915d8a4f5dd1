//! Published consumer price index reference data.
//!
//! CPI quarters differ from financial quarters: quarter 1 ends in March,
//! 2 in June, 3 in September, and 4 in December.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::finance::{end_of_month, ymd_start_of_month};

/// A single published quarterly CPI percentage change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpiRecord {
    pub year: i32,
    pub quarter: u8,
    /// Percentage change for the quarter, e.g. `3.4` for 3.4%.
    pub value: Decimal,
}

impl CpiRecord {
    /// Last day of the calendar quarter this figure covers.
    pub fn period_end(&self) -> NaiveDate {
        let month = u32::from(self.quarter) * 3;
        end_of_month(ymd_start_of_month(self.year, month))
    }
}

/// Ordered lookup over published CPI figures.
#[derive(Debug, Clone, Default)]
pub struct CpiTable {
    records: Vec<CpiRecord>,
}

impl CpiTable {
    pub fn new(mut records: Vec<CpiRecord>) -> Self {
        records.retain(|record| (1..=4).contains(&record.quarter));
        records.sort_by_key(|record| (record.year, record.quarter));
        Self { records }
    }

    /// The most recent figure published on or before `date`, if any.
    pub fn latest_for(&self, date: NaiveDate) -> Option<&CpiRecord> {
        self.records
            .iter()
            .rev()
            .find(|record| record.period_end() <= date)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn table() -> CpiTable {
        CpiTable::new(vec![
            CpiRecord {
                year: 2024,
                quarter: 2,
                value: dec!(3.8),
            },
            CpiRecord {
                year: 2023,
                quarter: 4,
                value: dec!(4.1),
            },
            CpiRecord {
                year: 2024,
                quarter: 1,
                value: dec!(3.6),
            },
        ])
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn latest_figure_respects_publication_order() {
        let table = table();
        let latest = table.latest_for(date(2024, 5, 1)).expect("figure available");
        assert_eq!((latest.year, latest.quarter), (2024, 1));
        assert_eq!(latest.value, dec!(3.6));
    }

    #[test]
    fn no_figure_before_first_publication() {
        let table = table();
        assert!(table.latest_for(date(2023, 12, 30)).is_none());
        let first = table.latest_for(date(2023, 12, 31)).expect("december figure");
        assert_eq!(first.value, dec!(4.1));
    }
}
