//! Read-only access to orders.
use std::fmt::Debug;

use log::trace;

use crate::{
    db_types::{Customer, Order, OrderNumber, Product},
    order_objects::{OrderQueryFilter, OrderSnapshot},
    traits::{OrderManagement, OrderQueryError},
};

pub struct OrderQueryApi<B> {
    db: B,
}

impl<B: Debug> Debug for OrderQueryApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderQueryApi ({:?})", self.db)
    }
}

impl<B> OrderQueryApi<B>
where B: OrderManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn fetch_order(&self, order_number: &OrderNumber) -> Result<Option<Order>, OrderQueryError> {
        self.db.fetch_order_by_number(order_number).await
    }

    /// The order together with its line items, or `None` if there is no such order.
    pub async fn order_snapshot(&self, order_number: &OrderNumber) -> Result<Option<OrderSnapshot>, OrderQueryError> {
        let Some(order) = self.db.fetch_order_by_number(order_number).await? else {
            return Ok(None);
        };
        let items = self.db.fetch_order_items(order.id).await?;
        Ok(Some(OrderSnapshot::new(order, &items)))
    }

    /// Snapshots of every order matching the filter, newest first.
    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<OrderSnapshot>, OrderQueryError> {
        trace!("🔄️ Searching orders. {query}");
        let orders = self.db.search_orders(query).await?;
        let mut result = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.db.fetch_order_items(order.id).await?;
            result.push(OrderSnapshot::new(order, &items));
        }
        Ok(result)
    }

    pub async fn fetch_product(&self, product_id: &str) -> Result<Option<Product>, OrderQueryError> {
        self.db.fetch_product(product_id).await
    }

    pub async fn fetch_customer_by_phone(&self, phone: &str) -> Result<Option<Customer>, OrderQueryError> {
        self.db.fetch_customer_by_phone(phone).await
    }
}
