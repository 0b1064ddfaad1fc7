//! Catalog records read by the fulfillment core.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Money, ProductId, VariantId};

/// A catalog product with its pricing rules.
///
/// Size-rule and promotion fields are independently optional; the pricing
/// engine decides which combinations take effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub base_price: Money,
    /// Size label at or past which the surcharge applies.
    pub size_threshold: Option<String>,
    /// Surcharge in percent of the base price.
    pub size_surcharge_pct: Option<Decimal>,
    /// Promotional discount in percent.
    pub discount_pct: Option<Decimal>,
    pub promo_start: Option<DateTime<Utc>>,
    pub promo_end: Option<DateTime<Utc>>,
    pub promo_name: Option<String>,
}

/// A purchasable size/colour configuration of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub size_label: String,
    pub stock: u32,
    pub sku: String,
}

/// Product fields supplied by the catalog when registering a product.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub base_price: Money,
    pub size_threshold: Option<String>,
    pub size_surcharge_pct: Option<Decimal>,
    pub discount_pct: Option<Decimal>,
    pub promo_start: Option<DateTime<Utc>>,
    pub promo_end: Option<DateTime<Utc>>,
    pub promo_name: Option<String>,
}

impl NewProduct {
    /// A product with only a name and base price.
    pub fn new(name: impl Into<String>, base_price: Money) -> Self {
        Self {
            name: name.into(),
            base_price,
            ..Self::default()
        }
    }

    /// Sets the size surcharge rule.
    pub fn with_size_rule(mut self, threshold: impl Into<String>, surcharge_pct: Decimal) -> Self {
        self.size_threshold = Some(threshold.into());
        self.size_surcharge_pct = Some(surcharge_pct);
        self
    }

    /// Sets the promotion window.
    pub fn with_promotion(
        mut self,
        name: impl Into<String>,
        discount_pct: Decimal,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        self.promo_name = Some(name.into());
        self.discount_pct = Some(discount_pct);
        self.promo_start = Some(start);
        self.promo_end = Some(end);
        self
    }
}

/// Variant fields supplied by the catalog when registering a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVariant {
    pub product_id: ProductId,
    pub size_label: String,
    pub stock: u32,
    pub sku: String,
}

impl NewVariant {
    pub fn new(
        product_id: ProductId,
        size_label: impl Into<String>,
        stock: u32,
        sku: impl Into<String>,
    ) -> Self {
        Self {
            product_id,
            size_label: size_label.into(),
            stock,
            sku: sku.into(),
        }
    }
}
