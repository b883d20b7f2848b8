//! Deposit fee schedule.
//!
//! `fees(amount) = ceil(amount × processor_rate) + processor_fixed
//!               + ceil(amount × platform_rate)`
//!
//! Rates are exact decimals; all results are whole minor units.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::MarketError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    /// Proportional fee charged by the payment processor.
    pub processor_rate: Decimal,
    /// Flat fee charged by the payment processor, in minor units.
    pub processor_fixed: u64,
    /// Proportional fee retained by the market.
    pub platform_rate: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            processor_rate: Decimal::new(29, 3),
            processor_fixed: 30,
            platform_rate: Decimal::new(1, 2),
        }
    }
}

impl FeeSchedule {
    /// A schedule that charges nothing.
    pub fn zero() -> Self {
        Self {
            processor_rate: Decimal::ZERO,
            processor_fixed: 0,
            platform_rate: Decimal::ZERO,
        }
    }

    /// Total fees for a gross amount.
    pub fn fees(&self, amount: u64) -> u64 {
        ceil_mul(amount, self.processor_rate)
            .saturating_add(self.processor_fixed)
            .saturating_add(ceil_mul(amount, self.platform_rate))
    }

    /// Amount left after fees. Fails when nothing positive would remain.
    pub fn net_of_fees(&self, amount: u64) -> Result<u64, MarketError> {
        let fees = self.fees(amount);
        match amount.checked_sub(fees) {
            Some(net) if net > 0 => Ok(net),
            _ => Err(MarketError::AmountTooSmall {
                amount,
                reason: format!("fees of {fees} leave nothing to credit"),
            }),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, rate) in [
            ("processor_rate", self.processor_rate),
            ("platform_rate", self.platform_rate),
        ] {
            if rate.is_sign_negative() || rate >= Decimal::ONE {
                return Err(format!("fees.{name} must be in [0, 1), got {rate}"));
            }
        }
        Ok(())
    }
}

fn ceil_mul(amount: u64, rate: Decimal) -> u64 {
    Decimal::from(amount)
        .checked_mul(rate)
        .and_then(|v| v.ceil().to_u64())
        .unwrap_or(u64::MAX)
}
