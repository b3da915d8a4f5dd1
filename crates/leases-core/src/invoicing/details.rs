//! Invoicing configuration for an approval and the schedule derived from it.
//!
//! Fixed charge methods are billed per sequential year of the approval term.
//! Gross-turnover methods emit no fixed schedule; they are billed from the
//! turnover the holder declares against each statement requirement.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::charges::cpi::CpiTable;
use crate::charges::finance::{add_months, FinancialYear};
use crate::charges::money::{excl_gst, quantize};
use crate::charges::{ChargeMethod, RepetitionType};
use crate::proposals::domain::{ApprovalId, InvoicingDetailsId};

/// Flat increment applied from the given sequential year of the term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnualIncrementAmount {
    /// 1-based sequential year of the approval term.
    pub year: u32,
    pub increment: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnualIncrementPercentage {
    pub year: u32,
    pub percentage: Decimal,
}

/// Percentage of turnover charged for one financial year, together with the
/// turnover figure once the holder declares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrossTurnoverEntry {
    pub financial_year: FinancialYear,
    pub percentage: Decimal,
    pub entered_turnover: Option<Decimal>,
}

/// Manually negotiated CPI figure for one sequential year of the term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomCpiEntry {
    pub year: u32,
    pub percentage: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoicingDetails {
    pub id: InvoicingDetailsId,
    pub approval: Option<ApprovalId>,
    pub charge_method: ChargeMethod,
    pub base_fee: Option<Decimal>,
    pub once_off_charge_amount: Option<Decimal>,
    pub invoicing_once_every: u32,
    pub invoicing_repetition_type: Option<RepetitionType>,
    pub review_once_every: u32,
    pub review_repetition_type: Option<RepetitionType>,
    pub annual_increment_amounts: Vec<AnnualIncrementAmount>,
    pub annual_increment_percentages: Vec<AnnualIncrementPercentage>,
    pub gross_turnover_entries: Vec<GrossTurnoverEntry>,
    pub custom_cpi_entries: Vec<CustomCpiEntry>,
    pub crown_land_rent_review_dates: Vec<NaiveDate>,
    /// Configuration this one superseded, set when a renewal or amendment is
    /// approved over an earlier proposal.
    pub previous_invoicing_details: Option<InvoicingDetailsId>,
}

impl InvoicingDetails {
    pub fn new(id: InvoicingDetailsId, charge_method: ChargeMethod) -> Self {
        Self {
            id,
            approval: None,
            charge_method,
            base_fee: None,
            once_off_charge_amount: None,
            invoicing_once_every: 1,
            invoicing_repetition_type: None,
            review_once_every: 1,
            review_repetition_type: None,
            annual_increment_amounts: Vec::new(),
            annual_increment_percentages: Vec::new(),
            gross_turnover_entries: Vec::new(),
            custom_cpi_entries: Vec::new(),
            crown_land_rent_review_dates: Vec::new(),
            previous_invoicing_details: None,
        }
    }

    pub fn turnover_repetition(&self) -> RepetitionType {
        self.invoicing_repetition_type
            .unwrap_or(RepetitionType::Annually)
    }

    /// The fixed invoice schedule for the approval term.
    ///
    /// CPI-based methods stop at the first year whose figure is not yet
    /// available; the remainder is generated once the figure arrives.
    pub fn invoice_schedule(
        &self,
        period: ApprovalPeriod,
        cpi: &CpiTable,
        gst_rate: Decimal,
        gst_free: bool,
    ) -> Result<Vec<ScheduledInvoice>, ScheduleError> {
        match self.charge_method {
            ChargeMethod::NoRentOrLicenceCharge
            | ChargeMethod::PercentageOfGrossTurnoverInArrears
            | ChargeMethod::PercentageOfGrossTurnoverInAdvance => Ok(Vec::new()),
            ChargeMethod::OnceOffCharge => {
                let amount = self
                    .once_off_charge_amount
                    .ok_or(ScheduleError::MissingConfiguration("once-off charge amount"))?;
                if amount <= Decimal::ZERO {
                    return Err(ScheduleError::InvalidAmount(amount));
                }
                let amount = quantize(amount);
                Ok(vec![ScheduledInvoice {
                    year: 1,
                    cover_start: period.start,
                    cover_end: period.expiry,
                    amount_incl_tax: amount,
                    amount_excl_tax: excl_gst(amount, gst_rate, gst_free),
                }])
            }
            _ => self.base_fee_schedule(period, cpi, gst_rate, gst_free),
        }
    }

    fn base_fee_schedule(
        &self,
        period: ApprovalPeriod,
        cpi: &CpiTable,
        gst_rate: Decimal,
        gst_free: bool,
    ) -> Result<Vec<ScheduledInvoice>, ScheduleError> {
        let base = self
            .base_fee
            .ok_or(ScheduleError::MissingConfiguration("base fee"))?;
        if base <= Decimal::ZERO {
            return Err(ScheduleError::InvalidAmount(base));
        }

        let mut schedule = Vec::new();
        let mut amount = base;
        for year in period.sequential_years() {
            if year.index > 1 {
                match self.adjust_for_year(amount, &year, cpi)? {
                    Some(adjusted) => amount = adjusted,
                    // Figure not yet available; later years wait for it.
                    None => break,
                }
            }
            let amount_incl_tax = quantize(amount);
            schedule.push(ScheduledInvoice {
                year: year.index,
                cover_start: year.start,
                cover_end: year.end,
                amount_incl_tax,
                amount_excl_tax: excl_gst(amount_incl_tax, gst_rate, gst_free),
            });
        }
        Ok(schedule)
    }

    fn adjust_for_year(
        &self,
        amount: Decimal,
        year: &SequentialYear,
        cpi: &CpiTable,
    ) -> Result<Option<Decimal>, ScheduleError> {
        let adjusted = match self.charge_method {
            ChargeMethod::BaseFeePlusFixedAnnualIncrement => {
                let entry = self
                    .annual_increment_amounts
                    .iter()
                    .find(|entry| entry.year == year.index)
                    .ok_or(ScheduleError::MissingAnnualEntry { year: year.index })?;
                amount + entry.increment
            }
            ChargeMethod::BaseFeePlusFixedAnnualPercentage => {
                let entry = self
                    .annual_increment_percentages
                    .iter()
                    .find(|entry| entry.year == year.index)
                    .ok_or(ScheduleError::MissingAnnualEntry { year: year.index })?;
                amount * (Decimal::ONE + entry.percentage / Decimal::ONE_HUNDRED)
            }
            ChargeMethod::BaseFeePlusAnnualCpi => match cpi.latest_for(year.start) {
                Some(record) => amount * (Decimal::ONE + record.value / Decimal::ONE_HUNDRED),
                None => return Ok(None),
            },
            ChargeMethod::BaseFeePlusAnnualCpiCustom => {
                let figure = self
                    .custom_cpi_entries
                    .iter()
                    .find(|entry| entry.year == year.index)
                    .and_then(|entry| entry.percentage);
                match figure {
                    Some(percentage) => amount * (Decimal::ONE + percentage / Decimal::ONE_HUNDRED),
                    None => return Ok(None),
                }
            }
            _ => amount,
        };
        Ok(Some(adjusted))
    }
}

/// The active term of an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPeriod {
    pub start: NaiveDate,
    pub expiry: NaiveDate,
}

impl ApprovalPeriod {
    /// Twelve-month slices of the term, the last truncated at expiry.
    pub fn sequential_years(&self) -> Vec<SequentialYear> {
        let mut years = Vec::new();
        let mut index = 1u32;
        let mut cover_start = self.start;
        while cover_start <= self.expiry {
            let next_start = add_months(cover_start, 12);
            let cover_end = (next_start - chrono::Duration::days(1)).min(self.expiry);
            years.push(SequentialYear {
                index,
                start: cover_start,
                end: cover_end,
            });
            cover_start = next_start;
            index += 1;
        }
        years
    }
}

/// One sequential year of an approval term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequentialYear {
    pub index: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// One row of the fixed invoice schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledInvoice {
    pub year: u32,
    pub cover_start: NaiveDate,
    pub cover_end: NaiveDate,
    pub amount_incl_tax: Decimal,
    pub amount_excl_tax: Decimal,
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid invoice amount: {0}")]
    InvalidAmount(Decimal),
    #[error("missing annual adjustment entry for year {year}")]
    MissingAnnualEntry { year: u32 },
    #[error("{0} is required for this charge method")]
    MissingConfiguration(&'static str),
}
