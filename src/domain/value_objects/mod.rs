//! Value Objects for the shop

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monetary amounts are kept to cents.
pub const MONEY_DP: u32 = 2;

/// Round half-up (midpoint away from zero) to cents. Applied once, on final figures only.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// `amount * percent / 100`, unrounded.
pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    amount * percent / Decimal::ONE_HUNDRED
}

/// Ecuadorian national identity number (cédula).
///
/// Ten digits: a province code 01-24, a third digit below 6, and a
/// modulus-10 check digit computed with the 2-1-2-1... coefficient series.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NationalId(String);

impl NationalId {
    pub fn new(value: impl Into<String>) -> Result<Self, NationalIdError> {
        let value = value.into().trim().to_string();
        if value.len() != 10 { return Err(NationalIdError::Length); }
        let digits: Vec<u32> = value.chars().map(|c| c.to_digit(10)).collect::<Option<_>>().ok_or(NationalIdError::NotNumeric)?;

        let province = digits[0] * 10 + digits[1];
        if !(1..=24).contains(&province) { return Err(NationalIdError::Province); }
        if digits[2] > 5 { return Err(NationalIdError::ThirdDigit); }

        let sum: u32 = digits[..9]
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let v = if i % 2 == 0 { d * 2 } else { *d };
                if v >= 10 { v - 9 } else { v }
            })
            .sum();
        let check = (10 - sum % 10) % 10;
        if check != digits[9] { return Err(NationalIdError::CheckDigit); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for NationalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for NationalId {
    type Error = NationalIdError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<NationalId> for String {
    fn from(id: NationalId) -> Self { id.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum NationalIdError { Length, NotNumeric, Province, ThirdDigit, CheckDigit }
impl std::error::Error for NationalIdError {}
impl fmt::Display for NationalIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length => write!(f, "national id must have 10 digits"),
            Self::NotNumeric => write!(f, "national id must be numeric"),
            Self::Province => write!(f, "national id has an invalid province code"),
            Self::ThirdDigit => write!(f, "national id has an invalid third digit"),
            Self::CheckDigit => write!(f, "national id check digit does not match"),
        }
    }
}

/// Discount percentage in the closed range 0..=100.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub fn new(value: Decimal) -> Result<Self, PercentageError> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED { return Err(PercentageError); }
        Ok(Self(value))
    }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }
}

impl TryFrom<Decimal> for Percentage {
    type Error = PercentageError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Percentage> for Decimal {
    fn from(p: Percentage) -> Self { p.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct PercentageError;
impl std::error::Error for PercentageError {}
impl fmt::Display for PercentageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "percentage must be between 0 and 100") }
}
