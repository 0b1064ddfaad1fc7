//! Cart validation and order assembly.
//!
//! Everything here is pure: the service looks up catalog data, prices each
//! line and hands the result to [`plan_order`], which produces the rows to
//! write inside the order transaction.

use common::{
    Actor, AuditEntry, Money, NewOrder, NewOrderItem, OrderStatus, PaymentMethod, ProductId,
    UserId, VariantId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::OrderError;

/// One line of a customer's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub quantity: u32,
}

impl CartLine {
    pub fn new(product_id: ProductId, variant_id: VariantId, quantity: u32) -> Self {
        Self {
            product_id,
            variant_id,
            quantity,
        }
    }
}

/// Command to place an order from a cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrder {
    pub user_id: UserId,
    pub customer_name: String,
    pub customer_phone: String,
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
    pub note: Option<String>,
    /// Total the client computed, including shipping.
    pub declared_total: Money,
    pub lines: Vec<CartLine>,
}

impl CreateOrder {
    /// Rejects carts that can never become an order.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.lines.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        if !self.declared_total.is_positive() {
            return Err(OrderError::InvalidTotal(self.declared_total));
        }
        if let Some(line) = self.lines.iter().find(|line| line.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                variant_id: line.variant_id,
                quantity: line.quantity,
            });
        }

        let required = [
            ("customer_name", &self.customer_name),
            ("customer_phone", &self.customer_phone),
            ("shipping_address", &self.shipping_address),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(OrderError::MissingField(field));
            }
        }
        Ok(())
    }
}

/// Tunable order-creation rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPolicy {
    /// Flat fee added to every order.
    pub shipping_fee: Money,
    /// Largest accepted gap between declared and computed totals.
    pub total_tolerance: Money,
    /// Initial status of cash-on-delivery orders.
    pub cod_initial_status: OrderStatus,
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            shipping_fee: Money::from_major(30_000),
            total_tolerance: Money::new(Decimal::new(1, 2)),
            cod_initial_status: OrderStatus::Pending,
        }
    }
}

impl OrderPolicy {
    /// Status a new order starts in.
    ///
    /// Bank transfers wait for the payment notification; cash-on-delivery
    /// follows `cod_initial_status`.
    pub fn initial_status(&self, method: PaymentMethod) -> OrderStatus {
        match method {
            PaymentMethod::BankTransfer => OrderStatus::Pending,
            PaymentMethod::Cod => self.cod_initial_status,
        }
    }
}

/// Rows to write for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPlan {
    pub header: NewOrder,
    pub items: Vec<NewOrderItem>,
}

impl OrderPlan {
    /// Reservations to make, in ascending variant-id order.
    ///
    /// A fixed global order keeps concurrent transactions from locking the
    /// same variants in opposite orders.
    pub fn reservations(&self) -> Vec<(VariantId, u32)> {
        let mut reservations: Vec<_> = self
            .items
            .iter()
            .map(|item| (item.variant_id, item.quantity))
            .collect();
        reservations.sort_by_key(|(variant_id, _)| *variant_id);
        reservations
    }
}

/// Assembles the order rows from priced lines and checks the declared total.
pub fn plan_order(
    cmd: CreateOrder,
    items: Vec<NewOrderItem>,
    policy: &OrderPolicy,
) -> Result<OrderPlan, OrderError> {
    let computed = items
        .iter()
        .try_fold(policy.shipping_fee, |total, item| {
            item.price_at_purchase
                .checked_multiply(item.quantity)
                .and_then(|line| total.checked_add(line))
        })
        .ok_or(OrderError::AmountOverflow)?;

    let within_tolerance = computed
        .abs_diff(cmd.declared_total)
        .is_some_and(|diff| diff <= policy.total_tolerance);
    if !within_tolerance {
        return Err(OrderError::TotalMismatch {
            declared: cmd.declared_total,
            computed,
        });
    }

    let status = policy.initial_status(cmd.payment_method);
    let placed = AuditEntry::now(
        Actor::Customer(cmd.user_id),
        format!("Order placed ({}, {})", cmd.payment_method, status),
    );

    let header = NewOrder {
        user_id: cmd.user_id,
        customer_name: cmd.customer_name.trim().to_string(),
        customer_phone: cmd.customer_phone.trim().to_string(),
        shipping_address: cmd.shipping_address.trim().to_string(),
        total_amount: computed,
        shipping_fee: policy.shipping_fee,
        status,
        payment_method: cmd.payment_method,
        note: cmd.note.filter(|note| !note.trim().is_empty()),
        audit_log: vec![placed],
    };

    Ok(OrderPlan { header, items })
}
