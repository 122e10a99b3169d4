//! Checked helpers over the CosmWasm amount types.
//!
//! `Uint128` and `Decimal` overload `+`, `-` and `*` with panicking
//! operators; ledgers only ever go through the checked forms below or the
//! types' own `checked_*` methods.

use cosmwasm_std::{CheckedMultiplyRatioError, Decimal, Fraction, OverflowError, Uint128};

/// `amount * ratio`, rounded down.
pub fn mul_floor(amount: Uint128, ratio: Decimal) -> Result<Uint128, CheckedMultiplyRatioError> {
    amount.checked_multiply_ratio(ratio.numerator(), ratio.denominator())
}

/// `amount * numerator / denominator` for two decimals, rounded down.
///
/// Used to carry an amount from one slash multiplier to another.
pub fn mul_ratio_floor(
    amount: Uint128,
    numerator: Decimal,
    denominator: Decimal,
) -> Result<Uint128, CheckedMultiplyRatioError> {
    amount.checked_multiply_ratio(numerator.atomics(), denominator.atomics())
}

pub fn decimal_add(a: Decimal, b: Decimal) -> Result<Decimal, OverflowError> {
    Ok(Decimal::new(a.atomics().checked_add(b.atomics())?))
}

pub fn decimal_sub(a: Decimal, b: Decimal) -> Result<Decimal, OverflowError> {
    Ok(Decimal::new(a.atomics().checked_sub(b.atomics())?))
}

/// Sum amounts, failing instead of wrapping.
pub fn checked_sum<I>(amounts: I) -> Result<Uint128, OverflowError>
where
    I: IntoIterator<Item = Uint128>,
{
    amounts
        .into_iter()
        .try_fold(Uint128::zero(), |total, amount| total.checked_add(amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_floor() {
        let amount = Uint128::new(500_000);
        assert_eq!(
            mul_floor(amount, "0.1".parse().unwrap()).unwrap(),
            Uint128::new(50_000)
        );
        assert_eq!(
            mul_floor(Uint128::new(7), Decimal::percent(50)).unwrap(),
            Uint128::new(3)
        );
        assert_eq!(mul_floor(amount, Decimal::one()).unwrap(), amount);
        assert!(mul_floor(Uint128::MAX, Decimal::percent(200)).is_err());
    }

    #[test]
    fn test_mul_ratio_floor() {
        // 1000 staked at 0.5 survives whole while the multiplier is still 0.5
        let amount = Uint128::new(1_000);
        assert_eq!(
            mul_ratio_floor(amount, Decimal::percent(50), Decimal::percent(50)).unwrap(),
            amount
        );
        assert_eq!(
            mul_ratio_floor(amount, Decimal::percent(45), Decimal::percent(90)).unwrap(),
            Uint128::new(500)
        );
        assert!(mul_ratio_floor(amount, Decimal::one(), Decimal::zero()).is_err());
    }

    #[test]
    fn test_decimal_add_sub() {
        let index = decimal_add(Decimal::percent(25), Decimal::percent(50)).unwrap();
        assert_eq!(index, Decimal::percent(75));
        assert_eq!(
            decimal_sub(index, Decimal::percent(25)).unwrap(),
            Decimal::percent(50)
        );
        assert!(decimal_sub(Decimal::percent(10), Decimal::percent(20)).is_err());
        assert!(decimal_add(Decimal::MAX, Decimal::one()).is_err());
    }

    #[test]
    fn test_checked_sum() {
        let total = checked_sum([Uint128::new(1), Uint128::new(2), Uint128::new(3)]).unwrap();
        assert_eq!(total, Uint128::new(6));
        assert!(checked_sum([Uint128::MAX, Uint128::new(1)]).is_err());
    }

    #[test]
    fn test_serde_as_strings() {
        let json = serde_json::to_string(&Uint128::new(1_000_000)).unwrap();
        assert_eq!(json, "\"1000000\"");
        let json = serde_json::to_string(&Decimal::percent(10)).unwrap();
        assert_eq!(json, "\"0.1\"");
    }
}
