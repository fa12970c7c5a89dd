//! Solar quote calculation.
//!
//! [`calculate_quote`] is a pure function: no I/O, no clock, no shared state.
//! Monetary outputs are rounded to cents only when the result is assembled.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;

pub const DEFAULT_COST_PER_WATT: f64 = 3.00;
pub const DEFAULT_UTILITY_RATE_PER_KWH: f64 = 0.13;
pub const DEFAULT_ANNUAL_UTILITY_INCREASE: f64 = 0.03;
pub const DEFAULT_FEDERAL_TAX_CREDIT: f64 = 0.26;
pub const DEFAULT_LOAN_INTEREST_RATE: f64 = 0.0699;
pub const DEFAULT_LOAN_TERM_YEARS: i32 = 25;
pub const MAX_LOAN_TERM_YEARS: i32 = 50;

/// Sun-hours per day used when production must be derived from system size.
pub const PEAK_SUN_HOURS: f64 = 5.0;
pub const DERATE_FACTOR: f64 = 0.75;

const PROJECTION_YEARS: i32 = 25;
const BREAK_EVEN_HORIZON_YEARS: i32 = 30;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QuoteInput {
    #[serde(alias = "SystemSizeKW")]
    #[schema(example = 10.5)]
    pub system_size_kw: f64,
    /// Derived from system size when absent or zero.
    #[serde(default, alias = "AnnualProductionKWh")]
    pub annual_production_kwh: Option<f64>,
    #[serde(alias = "MonthlyElectricBill")]
    #[schema(example = 200.0)]
    pub monthly_electric_bill: f64,
    #[serde(default, alias = "ElectricalOffsetPct")]
    #[schema(example = 90.0)]
    pub electrical_offset_pct: f64,
    #[serde(default, alias = "PanelCount")]
    #[schema(example = 30)]
    pub panel_count: i32,
    #[serde(default, alias = "State")]
    pub state: Option<String>,
    #[serde(default, alias = "CostPerWatt")]
    pub cost_per_watt: Option<f64>,
    #[serde(default, alias = "UtilityRatePerKWh")]
    pub utility_rate_per_kwh: Option<f64>,
    #[serde(default, alias = "AnnualUtilityIncrease")]
    pub annual_utility_increase: Option<f64>,
    #[serde(default, alias = "FederalTaxCredit")]
    pub federal_tax_credit: Option<f64>,
    #[serde(default, alias = "LoanInterestRate")]
    pub loan_interest_rate: Option<f64>,
    #[serde(default, alias = "LoanTermYears")]
    pub loan_term_years: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QuoteResult {
    pub system_cost_before_incentives: f64,
    pub federal_tax_credit: f64,
    pub system_cost_after_incentives: f64,
    pub estimated_monthly_payment: f64,
    pub current_monthly_bill: f64,
    pub estimated_new_monthly_bill: f64,
    /// Bill reduction minus the loan payment.
    pub monthly_savings: f64,
    pub first_year_savings: f64,
    pub twenty_five_year_savings: f64,
    /// Production valued at the utility rate.
    pub annual_solar_savings: f64,
    pub system_size_kw: f64,
    pub annual_production_kwh: f64,
    pub panel_count: i32,
    pub electrical_offset_pct: f64,
    pub cost_per_watt: f64,
    pub simple_payback_years: f64,
    /// First year cumulative savings cover the pre-incentive cost; 0 if none within 30 years.
    pub break_even_year: i32,
    pub summary: String,
}

/// Financial parameters after defaults are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Financials {
    cost_per_watt: f64,
    utility_rate: f64,
    annual_increase: f64,
    tax_credit: f64,
    interest_rate: f64,
    loan_term_years: i32,
}

impl Financials {
    fn resolve(input: &QuoteInput) -> Result<Self, AppError> {
        let financials = Self {
            cost_per_watt: input.cost_per_watt.unwrap_or(DEFAULT_COST_PER_WATT),
            utility_rate: input
                .utility_rate_per_kwh
                .unwrap_or(DEFAULT_UTILITY_RATE_PER_KWH),
            annual_increase: input
                .annual_utility_increase
                .unwrap_or(DEFAULT_ANNUAL_UTILITY_INCREASE),
            tax_credit: input.federal_tax_credit.unwrap_or(DEFAULT_FEDERAL_TAX_CREDIT),
            interest_rate: input.loan_interest_rate.unwrap_or(DEFAULT_LOAN_INTEREST_RATE),
            loan_term_years: input.loan_term_years.unwrap_or(DEFAULT_LOAN_TERM_YEARS),
        };

        for (name, value) in [
            ("cost_per_watt", financials.cost_per_watt),
            ("utility_rate_per_kwh", financials.utility_rate),
            ("annual_utility_increase", financials.annual_increase),
            ("federal_tax_credit", financials.tax_credit),
            ("loan_interest_rate", financials.interest_rate),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::BadRequest(format!(
                    "{} must be a non-negative number",
                    name
                )));
            }
        }
        if financials.tax_credit > 1.0 {
            return Err(AppError::BadRequest(
                "federal_tax_credit must be a fraction between 0 and 1".to_string(),
            ));
        }
        if !(1..=MAX_LOAN_TERM_YEARS).contains(&financials.loan_term_years) {
            return Err(AppError::BadRequest(format!(
                "loan_term_years must be between 1 and {}",
                MAX_LOAN_TERM_YEARS
            )));
        }

        Ok(financials)
    }
}

/// Estimated yearly production of a system of `system_size_kw`.
pub fn derived_annual_production(system_size_kw: f64) -> f64 {
    system_size_kw * PEAK_SUN_HOURS * 365.0 * DERATE_FACTOR
}

/// Standard amortized monthly payment; straight division at a zero rate.
pub fn monthly_loan_payment(principal: f64, annual_rate: f64, term_years: i32) -> f64 {
    let n = f64::from(term_years) * 12.0;
    let r = annual_rate / 12.0;
    if r == 0.0 {
        return principal / n;
    }
    let growth = (1.0 + r).powf(n);
    principal * (r * growth) / (growth - 1.0)
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn calculate_quote(input: &QuoteInput) -> Result<QuoteResult, AppError> {
    if !input.system_size_kw.is_finite() || input.system_size_kw <= 0.0 {
        return Err(AppError::BadRequest(
            "system size must be greater than 0".to_string(),
        ));
    }
    if !input.monthly_electric_bill.is_finite() || input.monthly_electric_bill <= 0.0 {
        return Err(AppError::BadRequest(
            "monthly electric bill must be greater than 0".to_string(),
        ));
    }
    if !input.electrical_offset_pct.is_finite() || input.electrical_offset_pct < 0.0 {
        return Err(AppError::BadRequest(
            "electrical offset must be a non-negative percentage".to_string(),
        ));
    }
    let annual_production = match input.annual_production_kwh {
        None => derived_annual_production(input.system_size_kw),
        Some(p) if p == 0.0 => derived_annual_production(input.system_size_kw),
        Some(p) if p.is_finite() && p > 0.0 => p,
        Some(_) => {
            return Err(AppError::BadRequest(
                "annual production must be greater than 0".to_string(),
            ))
        }
    };
    let fin = Financials::resolve(input)?;

    let cost_before = input.system_size_kw * 1000.0 * fin.cost_per_watt;
    let tax_credit = cost_before * fin.tax_credit;
    let cost_after = cost_before - tax_credit;

    let payment = monthly_loan_payment(cost_before, fin.interest_rate, fin.loan_term_years);
    let yearly_payment = payment * 12.0;

    let offset_ratio = input.electrical_offset_pct / 100.0;
    let current_bill = input.monthly_electric_bill;
    let annual_current_bill = current_bill * 12.0;
    let new_bill = current_bill * (1.0 - offset_ratio).max(0.0);

    let bill_reduction = current_bill - new_bill;
    let monthly_savings = bill_reduction - payment;
    let first_year_savings = bill_reduction * 12.0 - yearly_payment;

    let escalation = |year: i32| (1.0 + fin.annual_increase).powi(year - 1);

    let mut total_without_solar = 0.0;
    let mut total_with_solar = 0.0;
    for year in 1..=PROJECTION_YEARS {
        total_without_solar += annual_current_bill * escalation(year);
        let yearly_new_bill = new_bill * 12.0 * escalation(year);
        total_with_solar += if year <= fin.loan_term_years {
            yearly_payment + yearly_new_bill
        } else {
            yearly_new_bill
        };
    }
    let twenty_five_year_savings = total_without_solar - total_with_solar;

    let annual_solar_savings = annual_production * fin.utility_rate;
    let simple_payback = if annual_solar_savings > 0.0 {
        cost_after / annual_solar_savings
    } else {
        0.0
    };

    let mut break_even_year = 0;
    let mut cumulative = 0.0;
    for year in 1..=BREAK_EVEN_HORIZON_YEARS {
        let yearly_solar_savings = annual_current_bill * escalation(year) * offset_ratio;
        cumulative += if year <= fin.loan_term_years {
            yearly_solar_savings - yearly_payment
        } else {
            yearly_solar_savings
        };
        if cumulative >= cost_before {
            break_even_year = year;
            break;
        }
    }

    let summary = format!(
        "This {:.2} kW solar system with {} panels will produce approximately {:.0} kWh annually, \
         offsetting {:.0}% of your electricity usage. \
         The system costs ${:.2} before incentives (${:.2} after federal tax credit). \
         Your estimated monthly payment is ${:.2}, and you'll save approximately ${:.2} in the first year. \
         Over 25 years, your total savings are estimated at ${:.2}.",
        input.system_size_kw,
        input.panel_count,
        annual_production,
        input.electrical_offset_pct,
        cost_before,
        cost_after,
        payment,
        first_year_savings,
        twenty_five_year_savings,
    );

    Ok(QuoteResult {
        system_cost_before_incentives: round_cents(cost_before),
        federal_tax_credit: round_cents(tax_credit),
        system_cost_after_incentives: round_cents(cost_after),
        estimated_monthly_payment: round_cents(payment),
        current_monthly_bill: current_bill,
        estimated_new_monthly_bill: round_cents(new_bill),
        monthly_savings: round_cents(monthly_savings),
        first_year_savings: round_cents(first_year_savings),
        twenty_five_year_savings: round_cents(twenty_five_year_savings),
        annual_solar_savings: round_cents(annual_solar_savings),
        system_size_kw: input.system_size_kw,
        annual_production_kwh: annual_production,
        panel_count: input.panel_count,
        electrical_offset_pct: input.electrical_offset_pct,
        cost_per_watt: fin.cost_per_watt,
        simple_payback_years: round_cents(simple_payback),
        break_even_year,
        summary,
    })
}
