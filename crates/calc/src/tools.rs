//! Closed-form calculators trên `Decimal`

use crate::error::{CalcError, CalcResult};
use rust_decimal::Decimal;

/// NPV tại `rate` (0.08 = 8%/kỳ). Flow đầu tiên ở t=0, không chiết khấu.
pub fn npv(rate: Decimal, flows: &[Decimal]) -> CalcResult<Decimal> {
    validate_rate(rate)?;
    let base = Decimal::ONE + rate;

    let mut total = Decimal::ZERO;
    let mut discount = Decimal::ONE;
    for (t, flow) in flows.iter().enumerate() {
        if t > 0 {
            discount = discount.checked_mul(base).ok_or(CalcError::Overflow)?;
        }
        let present = flow.checked_div(discount).ok_or(CalcError::Overflow)?;
        total = total.checked_add(present).ok_or(CalcError::Overflow)?;
    }

    Ok(total)
}

pub fn validate_rate(rate: Decimal) -> CalcResult<()> {
    if rate <= -Decimal::ONE {
        return Err(CalcError::InvalidRate(format!("rate must be > -1, got {}", rate)));
    }
    Ok(())
}

pub fn validate_moic(invested: Decimal, returned: Decimal) -> CalcResult<()> {
    if invested <= Decimal::ZERO {
        return Err(CalcError::InvalidInvestment(invested));
    }
    if returned < Decimal::ZERO {
        return Err(CalcError::InvalidReturn(returned));
    }
    Ok(())
}

/// Multiple on invested capital = returned / invested
pub fn moic(invested: Decimal, returned: Decimal) -> CalcResult<Decimal> {
    validate_moic(invested, returned)?;
    returned.checked_div(invested).ok_or(CalcError::Overflow)
}
