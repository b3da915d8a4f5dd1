//! Charge model shared by invoicing and compliance generation.
//!
//! Two different calendars matter when raising charges: the financial year
//! (1 July to 30 June, with its quarters) and the sequential year (twelve
//! months from the approval start date). The helpers in [`finance`] cover the
//! former; the invoicing engine walks the latter.

pub mod cpi;
pub mod finance;
pub mod money;

use serde::{Deserialize, Serialize};

/// How rent or licence charges are calculated for an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeMethod {
    NoRentOrLicenceCharge,
    OnceOffCharge,
    BaseFeePlusFixedAnnualIncrement,
    BaseFeePlusFixedAnnualPercentage,
    BaseFeePlusAnnualCpi,
    BaseFeePlusAnnualCpiCustom,
    PercentageOfGrossTurnoverInArrears,
    PercentageOfGrossTurnoverInAdvance,
}

impl ChargeMethod {
    pub const fn key(self) -> &'static str {
        match self {
            ChargeMethod::NoRentOrLicenceCharge => "no_rent_or_licence_charge",
            ChargeMethod::OnceOffCharge => "once_off_charge",
            ChargeMethod::BaseFeePlusFixedAnnualIncrement => {
                "base_fee_plus_fixed_annual_increment"
            }
            ChargeMethod::BaseFeePlusFixedAnnualPercentage => {
                "base_fee_plus_fixed_annual_percentage"
            }
            ChargeMethod::BaseFeePlusAnnualCpi => "base_fee_plus_annual_cpi",
            ChargeMethod::BaseFeePlusAnnualCpiCustom => "base_fee_plus_annual_cpi_custom",
            ChargeMethod::PercentageOfGrossTurnoverInArrears => "percentage_of_gross_turnover",
            ChargeMethod::PercentageOfGrossTurnoverInAdvance => {
                "percentage_of_gross_turnover_in_advance"
            }
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ChargeMethod::NoRentOrLicenceCharge => "No rent or licence charge",
            ChargeMethod::OnceOffCharge => "Once off charge",
            ChargeMethod::BaseFeePlusFixedAnnualIncrement => {
                "Base fee plus fixed annual increment"
            }
            ChargeMethod::BaseFeePlusFixedAnnualPercentage => {
                "Base fee plus fixed annual percentage"
            }
            ChargeMethod::BaseFeePlusAnnualCpi => "Base fee plus annual CPI (ABS)",
            ChargeMethod::BaseFeePlusAnnualCpiCustom => "Base fee plus annual CPI (custom)",
            ChargeMethod::PercentageOfGrossTurnoverInArrears => {
                "Percentage of gross turnover (in arrears)"
            }
            ChargeMethod::PercentageOfGrossTurnoverInAdvance => {
                "Percentage of gross turnover (in advance)"
            }
        }
    }

    /// Charge methods billed against declared turnover rather than a fixed schedule.
    pub const fn is_gross_turnover(self) -> bool {
        matches!(
            self,
            ChargeMethod::PercentageOfGrossTurnoverInArrears
                | ChargeMethod::PercentageOfGrossTurnoverInAdvance
        )
    }

    /// Charge methods whose yearly amounts derive from a base fee.
    pub const fn uses_base_fee(self) -> bool {
        matches!(
            self,
            ChargeMethod::BaseFeePlusFixedAnnualIncrement
                | ChargeMethod::BaseFeePlusFixedAnnualPercentage
                | ChargeMethod::BaseFeePlusAnnualCpi
                | ChargeMethod::BaseFeePlusAnnualCpiCustom
        )
    }
}

/// Cadence for recurring invoicing, reviews, and turnover statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepetitionType {
    Annually,
    Quarterly,
    Monthly,
}

impl RepetitionType {
    pub const fn key(self) -> &'static str {
        match self {
            RepetitionType::Annually => "annually",
            RepetitionType::Quarterly => "quarterly",
            RepetitionType::Monthly => "monthly",
        }
    }

    pub const fn months(self) -> u32 {
        match self {
            RepetitionType::Annually => 12,
            RepetitionType::Quarterly => 3,
            RepetitionType::Monthly => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_method_keys_are_stable() {
        assert_eq!(
            ChargeMethod::PercentageOfGrossTurnoverInArrears.key(),
            "percentage_of_gross_turnover"
        );
        assert_eq!(
            ChargeMethod::BaseFeePlusAnnualCpiCustom.key(),
            "base_fee_plus_annual_cpi_custom"
        );
    }

    #[test]
    fn gross_turnover_methods_are_flagged() {
        assert!(ChargeMethod::PercentageOfGrossTurnoverInAdvance.is_gross_turnover());
        assert!(!ChargeMethod::BaseFeePlusAnnualCpi.is_gross_turnover());
        assert!(ChargeMethod::BaseFeePlusFixedAnnualIncrement.uses_base_fee());
    }
}
