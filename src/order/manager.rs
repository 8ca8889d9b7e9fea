use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use super::{Order, OrderError, OrderId, OrderStatus, OrderType, Side};

/// Submit/cancel/query surface over the order book, grounded on
/// `qtrader/trading/order_manager.py`'s split of today-vs-history orders and lot-size
/// normalisation, restyled around an `indexmap::IndexMap` the way `barter-instrument` keys its
/// lookups (insertion order preserved, which the filled-history tests rely on).
///
/// Mirrors the Python original's two-structure book: `today` holds every order created today
/// regardless of terminal status, wholesale-cleared at settlement; `filled_history` is a
/// permanent log appended to the instant an order fills, independent of settlement.
#[derive(Debug, Default)]
pub struct OrderManager {
    today: IndexMap<OrderId, Order>,
    filled_history: Vec<Order>,
    lot_size: i64,
}

impl OrderManager {
    pub fn new(lot_size: i64) -> Self {
        Self {
            today: IndexMap::new(),
            filled_history: Vec::new(),
            lot_size: lot_size.max(1),
        }
    }

    /// Normalises `signed_qty` to the configured lot size and opens a new order. `created_time`
    /// is wall-clock `now()` in SIMULATION, logical time in BACKTEST (caller's responsibility to
    /// pass the right instant); `created_bar_time` is always the current logical time.
    #[allow(clippy::too_many_arguments)]
    pub fn submit(
        &mut self,
        symbol: impl Into<String>,
        signed_qty: i64,
        order_type: OrderType,
        limit_price: Option<f64>,
        created_time: DateTime<Utc>,
        created_bar_time: DateTime<Utc>,
        name: Option<String>,
    ) -> Result<OrderId, OrderError> {
        let side = Side::from_signed_qty(signed_qty);
        let normalized = (signed_qty.unsigned_abs() as i64 / self.lot_size) * self.lot_size;
        if normalized == 0 {
            return Err(OrderError::BelowLotSize(signed_qty, self.lot_size));
        }

        let order = Order::new(
            symbol,
            side,
            order_type,
            normalized,
            limit_price,
            created_time,
            created_bar_time,
            name,
        )?;
        let id = order.id;
        self.today.insert(id, order);
        Ok(id)
    }

    pub fn cancel(&mut self, id: OrderId) -> Result<(), OrderError> {
        let order = self.today.get_mut(&id).ok_or(OrderError::NotFound(id))?;
        order.cancel()
    }

    /// Marks `id` FILLED and appends a permanent copy to `filled_history`, mirroring
    /// `order_manager.py`'s `add_filled_order_to_history` (called at fill time, independent of
    /// settlement).
    pub fn fill(
        &mut self,
        id: OrderId,
        price: f64,
        commission: f64,
        at: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        let order = self.today.get_mut(&id).ok_or(OrderError::NotFound(id))?;
        order.fill(price, commission, at)?;
        self.filled_history.push(order.clone());
        Ok(())
    }

    pub fn reject(&mut self, id: OrderId, reason: impl Into<String>) -> Result<(), OrderError> {
        let order = self.today.get_mut(&id).ok_or(OrderError::NotFound(id))?;
        order.reject(reason)
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.today
            .get(&id)
            .or_else(|| self.filled_history.iter().find(|o| o.id == id))
    }

    pub fn get_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        self.today.get_mut(&id)
    }

    pub fn get_open(&self) -> impl Iterator<Item = &Order> {
        self.today.values().filter(|o| o.status == OrderStatus::Open)
    }

    pub fn get_open_mut(&mut self) -> impl Iterator<Item = &mut Order> {
        self.today.values_mut().filter(|o| o.status == OrderStatus::Open)
    }

    /// Orders created on the given logical date, regardless of status.
    pub fn get_today(&self, today: chrono::NaiveDate) -> impl Iterator<Item = &Order> {
        self.today
            .values()
            .filter(move |o| o.created_time.date_naive() == today)
    }

    pub fn get_filled_history(&self) -> impl Iterator<Item = &Order> {
        self.filled_history.iter()
    }

    /// Today's orders merged with the permanent filled-history log, mirroring
    /// `order_manager.py`'s `get_all_orders`.
    pub fn get_all(&self) -> impl Iterator<Item = &Order> {
        self.filled_history.iter().chain(self.today.values())
    }

    /// Marks every still-open order created on `today` as EXPIRED, then drops the day's order
    /// table wholesale. Filled orders already live permanently in `filled_history`; rejected,
    /// cancelled, and now-expired orders are not retained past their own day, mirroring
    /// `order_manager.py`'s `clear_today_orders`.
    pub fn clear_today(&mut self, today: chrono::NaiveDate) {
        for order in self.today.values_mut() {
            if order.created_time.date_naive() == today && order.status == OrderStatus::Open {
                let _ = order.expire();
            }
        }
        self.today.clear();
    }

    /// Re-populates the book from a persisted order list, routing filled orders into
    /// `filled_history` and everything else into today's table, per `order_manager.py`'s
    /// `restore_orders`.
    pub fn restore(&mut self, orders: Vec<Order>) {
        self.today.clear();
        self.filled_history.clear();
        for order in orders {
            if order.status == OrderStatus::Filled {
                self.filled_history.push(order);
            } else {
                self.today.insert(order.id, order);
            }
        }
    }

    pub fn lot_size(&self) -> i64 {
        self.lot_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, h, 0, 0).unwrap()
    }

    #[test]
    fn submit_rounds_down_to_lot_size() {
        let mut mgr = OrderManager::new(100);
        let id = mgr
            .submit("600000.SH", 150, OrderType::Market, None, t(9), t(9), None)
            .unwrap();
        assert_eq!(mgr.get(id).unwrap().quantity, 100);

        let id2 = mgr
            .submit("600000.SH", -290, OrderType::Market, None, t(9), t(9), None)
            .unwrap();
        assert_eq!(mgr.get(id2).unwrap().quantity, 200);
        assert_eq!(mgr.get(id2).unwrap().side, Side::Sell);
    }

    #[test]
    fn submit_below_lot_size_rejected() {
        let mut mgr = OrderManager::new(100);
        let err = mgr
            .submit("600000.SH", 50, OrderType::Market, None, t(9), t(9), None)
            .unwrap_err();
        assert!(matches!(err, OrderError::BelowLotSize(50, 100)));
    }

    #[test]
    fn cancel_only_succeeds_while_open() {
        let mut mgr = OrderManager::new(1);
        let id = mgr
            .submit("600000.SH", 100, OrderType::Market, None, t(9), t(9), None)
            .unwrap();
        mgr.fill(id, 10.0, 1.0, t(10)).unwrap();
        assert!(matches!(mgr.cancel(id), Err(OrderError::NotCancellable(_, _))));
    }

    #[test]
    fn fill_appends_to_permanent_history_immediately() {
        let mut mgr = OrderManager::new(1);
        let id = mgr
            .submit("600000.SH", 100, OrderType::Market, None, t(9), t(9), None)
            .unwrap();
        mgr.fill(id, 10.0, 1.0, t(10)).unwrap();

        assert_eq!(mgr.get_filled_history().count(), 1);
        assert_eq!(mgr.get(id).unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn clear_today_drops_the_days_table_but_keeps_filled_history() {
        let mut mgr = OrderManager::new(1);
        let open_id = mgr
            .submit("600000.SH", 100, OrderType::Market, None, t(9), t(9), None)
            .unwrap();
        let filled_id = mgr
            .submit("600001.SH", 100, OrderType::Market, None, t(9), t(9), None)
            .unwrap();
        mgr.fill(filled_id, 10.0, 1.0, t(10)).unwrap();

        mgr.clear_today(t(9).date_naive());

        assert!(mgr.get(open_id).is_none());
        assert_eq!(mgr.get(filled_id).unwrap().status, OrderStatus::Filled);
        assert_eq!(mgr.get_all().count(), 1);
    }

    #[test]
    fn clear_today_is_idempotent() {
        let mut mgr = OrderManager::new(1);
        let id = mgr
            .submit("600000.SH", 100, OrderType::Market, None, t(9), t(9), None)
            .unwrap();
        let today = t(9).date_naive();
        mgr.clear_today(today);
        mgr.clear_today(today);
        assert!(mgr.get(id).is_none());
        assert_eq!(mgr.get_all().count(), 0);
    }
}
