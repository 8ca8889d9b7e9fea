pub mod manager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use manager::OrderManager;

/// Opaque unique order identity, grounded on the teacher's `uuid::Uuid`-backed ids
/// (`src/execution/fill.rs::FillEvent::trade_id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(uuid::Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn sign(&self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }

    pub fn from_signed_qty(qty: i64) -> Self {
        if qty >= 0 {
            Side::Buy
        } else {
            Side::Sell
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Filled,
    Rejected,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Open)
    }
}

/// Errors raised by [`OrderManager`] operations, grounded on the original's
/// `order_manager.py` exception surface, generalised into a `thiserror` enum.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error("order {0} is not open and cannot be cancelled (status: {1:?})")]
    NotCancellable(OrderId, OrderStatus),

    #[error("order quantity {0} rounds to zero at lot size {1}")]
    BelowLotSize(i64, i64),

    #[error("limit order requires a finite positive limit price")]
    InvalidLimitPrice,

    #[error("mutation attempted on terminal order {0} (status: {1:?})")]
    AlreadyTerminal(OrderId, OrderStatus),
}

/// A single order's full lifecycle record (spec §3 "Order").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: i64,
    pub limit_price: Option<f64>,
    pub created_time: DateTime<Utc>,
    pub created_bar_time: DateTime<Utc>,
    pub fill_price: Option<f64>,
    pub fill_time: Option<DateTime<Utc>>,
    pub commission: f64,
    pub status: OrderStatus,
    pub is_immediate: bool,
    pub reject_reason: Option<String>,
    pub name: Option<String>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        side: Side,
        order_type: OrderType,
        quantity: i64,
        limit_price: Option<f64>,
        created_time: DateTime<Utc>,
        created_bar_time: DateTime<Utc>,
        name: Option<String>,
    ) -> Result<Self, OrderError> {
        if quantity <= 0 {
            return Err(OrderError::BelowLotSize(quantity, 1));
        }
        if matches!(order_type, OrderType::Limit) {
            match limit_price {
                Some(p) if p.is_finite() && p > 0.0 => {}
                _ => return Err(OrderError::InvalidLimitPrice),
            }
        }
        Ok(Self {
            id: OrderId::new(),
            symbol: symbol.into(),
            side,
            order_type,
            quantity,
            limit_price,
            created_time,
            created_bar_time,
            fill_price: None,
            fill_time: None,
            commission: 0.0,
            status: OrderStatus::Open,
            is_immediate: true,
            reject_reason: None,
            name,
        })
    }

    pub fn fill(
        &mut self,
        price: f64,
        commission: f64,
        at: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::AlreadyTerminal(self.id, self.status));
        }
        self.fill_price = Some(price);
        self.fill_time = Some(at);
        self.commission = commission;
        self.status = OrderStatus::Filled;
        Ok(())
    }

    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::AlreadyTerminal(self.id, self.status));
        }
        self.status = OrderStatus::Rejected;
        self.is_immediate = false;
        self.reject_reason = Some(reason.into());
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !matches!(self.status, OrderStatus::Open) {
            return Err(OrderError::NotCancellable(self.id, self.status));
        }
        self.status = OrderStatus::Cancelled;
        Ok(())
    }

    pub fn expire(&mut self) -> Result<(), OrderError> {
        if !matches!(self.status, OrderStatus::Open) {
            return Err(OrderError::NotCancellable(self.id, self.status));
        }
        self.status = OrderStatus::Expired;
        Ok(())
    }

    pub fn defer_to_historical(&mut self) {
        self.is_immediate = false;
    }
}
