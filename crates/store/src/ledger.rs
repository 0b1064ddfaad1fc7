use async_trait::async_trait;
use common::VariantId;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Stock successfully set aside for one order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub variant_id: VariantId,
    pub quantity: u32,
    /// Stock left on the variant after the decrement.
    pub remaining: u32,
}

/// Atomic stock reservation.
///
/// Only implemented by open order transactions, so a reservation is always
/// undone together with the order it backs.
#[async_trait]
pub trait InventoryLedger: Send {
    /// Decrements the variant's stock by `quantity` in a single conditional
    /// write.
    ///
    /// Fails with `InsufficientStock` when fewer than `quantity` units are
    /// left and with `VariantNotFound` when the variant does not exist. On
    /// failure the stock is left untouched; it never goes negative and is
    /// never partially reserved.
    async fn reserve(&mut self, variant_id: VariantId, quantity: u32) -> Result<Reservation>;
}
