//! Discount resolution
//!
//! Three independent candidates are computed for a priced cart and the one
//! worth the most money wins:
//!
//! - `amount`: step table keyed by gross subtotal, a rule applies when
//!   `subtotal >= threshold`
//! - `quantity`: step table keyed by total item count, a rule applies when
//!   `items > threshold` (strictly greater)
//! - `product`: sum of each line's standing product markdown
//!
//! Within a step table the satisfied rule with the highest threshold applies;
//! of two rules on the same threshold the larger percentage wins.
//! Equal savings are broken in the order product, amount, quantity.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::aggregates::PricedLine;
use crate::domain::value_objects::{percent_of, round_money};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind { Amount, Quantity }

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Amount => "amount", Self::Quantity => "quantity" }
    }
}

impl FromStr for DiscountKind {
    type Err = UnknownDiscountKind;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amount" => Ok(Self::Amount),
            "quantity" => Ok(Self::Quantity),
            other => Err(UnknownDiscountKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct UnknownDiscountKind(pub String);
impl std::error::Error for UnknownDiscountKind {}
impl fmt::Display for UnknownDiscountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "unknown discount kind '{}'", self.0) }
}

/// Which discount family was applied to an order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType { #[default] None, Product, Amount, Quantity }

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::None => "none", Self::Product => "product", Self::Amount => "amount", Self::Quantity => "quantity" }
    }
}

impl FromStr for DiscountType {
    type Err = UnknownDiscountKind;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "product" => Ok(Self::Product),
            "amount" => Ok(Self::Amount),
            "quantity" => Ok(Self::Quantity),
            other => Err(UnknownDiscountKind(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountRule {
    pub id: i64,
    pub kind: DiscountKind,
    pub threshold: Decimal,
    pub percentage: Decimal,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Tier { threshold: Decimal, percentage: Decimal }

/// The amount and quantity step tables.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DiscountTables {
    amount: Vec<Tier>,
    quantity: Vec<Tier>,
}

impl DiscountTables {
    pub fn from_rules(rules: &[DiscountRule]) -> Self {
        let mut tables = Self::default();
        for rule in rules {
            let tier = Tier { threshold: rule.threshold, percentage: rule.percentage };
            match rule.kind {
                DiscountKind::Amount => tables.amount.push(tier),
                DiscountKind::Quantity => tables.quantity.push(tier),
            }
        }
        tables
    }

    /// Percentage of the highest amount tier with `threshold <= subtotal`.
    pub fn amount_percent(&self, subtotal: Decimal) -> Decimal {
        highest_satisfied(&self.amount, |t| t <= subtotal)
    }

    /// Percentage of the highest quantity tier with `items > threshold`.
    pub fn quantity_percent(&self, items: i64) -> Decimal {
        let items = Decimal::from(items);
        highest_satisfied(&self.quantity, |t| items > t)
    }

    pub fn is_empty(&self) -> bool { self.amount.is_empty() && self.quantity.is_empty() }
}

fn highest_satisfied(tiers: &[Tier], satisfied: impl Fn(Decimal) -> bool) -> Decimal {
    tiers
        .iter()
        .filter(|t| satisfied(t.threshold))
        .max_by(|a, b| a.threshold.cmp(&b.threshold).then(a.percentage.cmp(&b.percentage)))
        .map(|t| t.percentage)
        .unwrap_or(Decimal::ZERO)
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub discount_type: DiscountType,
    pub value: Decimal,
}

/// Outcome of pricing a cart.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub subtotal: Decimal,
    pub total_items: i64,
    pub candidates: [Candidate; 3],
    pub discount_type: DiscountType,
    pub discount: Decimal,
    pub total: Decimal,
}

/// Price a cart and pick its best discount. Pure.
pub fn resolve(lines: &[PricedLine], tables: &DiscountTables) -> PriceQuote {
    let mut subtotal = Decimal::ZERO;
    let mut total_items: i64 = 0;
    let mut product_savings = Decimal::ZERO;

    for line in lines {
        let line_subtotal = line.subtotal();
        subtotal += line_subtotal;
        total_items += i64::from(line.quantity);
        if !line.discount_percent.is_zero() {
            product_savings += percent_of(line_subtotal, line.discount_percent);
        }
    }

    let candidates = [
        Candidate { discount_type: DiscountType::Product, value: product_savings },
        Candidate { discount_type: DiscountType::Amount, value: percent_of(subtotal, tables.amount_percent(subtotal)) },
        Candidate { discount_type: DiscountType::Quantity, value: percent_of(subtotal, tables.quantity_percent(total_items)) },
    ];

    // Strict comparison keeps the earliest candidate on a tie and never lets a zero win.
    let best = candidates
        .iter()
        .fold(Candidate { discount_type: DiscountType::None, value: Decimal::ZERO }, |best, c| {
            if c.value > best.value { *c } else { best }
        });

    let discount = round_money(best.value);
    PriceQuote {
        subtotal,
        total_items,
        candidates,
        discount_type: best.discount_type,
        discount,
        total: round_money(subtotal - discount),
    }
}
