//! Server-side order pricing.
//!
//! The platform fee is always taken out of the seller's payout and never shows up in the buyer's total. The gateway fee
//! is added to the buyer's total only when the buyer pays it; otherwise it is deducted from the payout as well.
use mkp_common::{BasisPoints, Money};
use serde::{Deserialize, Serialize};

use crate::db_types::{FeePayer, GatewayKind, OrderAmounts};

/// A percentage plus a fixed per-transaction component, e.g. 2.9% + 0.30.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayFeeSchedule {
    pub rate: BasisPoints,
    pub fixed: Money,
}

impl GatewayFeeSchedule {
    pub fn new(rate: BasisPoints, fixed: Money) -> Self {
        Self { rate, fixed }
    }

    pub fn fee_for(&self, base: Money) -> Money {
        base.apply_rate(self.rate) + self.fixed
    }
}

/// The marketplace-wide rates used to price every new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub sales_tax_rate: BasisPoints,
    pub platform_fee_rate: BasisPoints,
    pub fee_payer: FeePayer,
    pub stripe: GatewayFeeSchedule,
    pub paypal: GatewayFeeSchedule,
    pub paytabs: GatewayFeeSchedule,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            sales_tax_rate: BasisPoints::new(0),
            platform_fee_rate: BasisPoints::new(500),
            fee_payer: FeePayer::Buyer,
            stripe: GatewayFeeSchedule::new(BasisPoints::new(290), Money::from(30)),
            paypal: GatewayFeeSchedule::new(BasisPoints::new(349), Money::from(49)),
            paytabs: GatewayFeeSchedule::new(BasisPoints::new(285), Money::from(0)),
        }
    }
}

impl FeeSchedule {
    pub fn gateway(&self, gateway: GatewayKind) -> GatewayFeeSchedule {
        match gateway {
            GatewayKind::Stripe => self.stripe,
            GatewayKind::Paypal => self.paypal,
            GatewayKind::Paytabs => self.paytabs,
        }
    }

    pub fn pricing_input(
        &self,
        gateway: GatewayKind,
        product_price: Money,
        shipping_cost: Money,
        currency: &str,
    ) -> PricingInput {
        PricingInput {
            product_price,
            shipping_cost,
            tax_rate: self.sales_tax_rate,
            platform_fee_rate: self.platform_fee_rate,
            gateway_fee: self.gateway(gateway),
            fee_payer: self.fee_payer,
            currency: currency.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingInput {
    pub product_price: Money,
    pub shipping_cost: Money,
    pub tax_rate: BasisPoints,
    pub platform_fee_rate: BasisPoints,
    pub gateway_fee: GatewayFeeSchedule,
    pub fee_payer: FeePayer,
    pub currency: String,
}

/// Computes every monetary field of an order. Pure; rounding happens once per fee, to the nearest minor unit.
///
/// Tax and all fees are levied on the product price only.
pub fn compute_totals(input: &PricingInput) -> OrderAmounts {
    let sales_tax = input.product_price.apply_rate(input.tax_rate);
    let platform_fee = input.product_price.apply_rate(input.platform_fee_rate);
    let gateway_fee = input.gateway_fee.fee_for(input.product_price);
    let subtotal = input.product_price + input.shipping_cost + sales_tax;
    let (total_amount, seller_payout) = match input.fee_payer {
        FeePayer::Buyer => (subtotal + gateway_fee, input.product_price - platform_fee),
        FeePayer::Seller => (subtotal, input.product_price - platform_fee - gateway_fee),
    };
    OrderAmounts {
        product_price: input.product_price,
        shipping_cost: input.shipping_cost,
        sales_tax,
        platform_fee,
        gateway_fee,
        total_amount,
        seller_payout,
        fee_payer: input.fee_payer,
        currency: input.currency.clone(),
    }
}
