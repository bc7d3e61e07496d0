use fulfillment_engine::{
    db_types::{Customer, Order, OrderItem, OrderNumber, OrderQrCode, Product},
    order_objects::OrderQueryFilter,
    OrderManagement,
    OrderQueryError,
};
use mockall::mock;

mock! {
    pub OrderManager {}
    impl OrderManagement for OrderManager {
        async fn fetch_order_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>, OrderQueryError>;
        async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, OrderQueryError>;
        async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderQueryError>;
        async fn fetch_qr_code(&self, order_id: i64) -> Result<Option<OrderQrCode>, OrderQueryError>;
        async fn fetch_product(&self, product_id: &str) -> Result<Option<Product>, OrderQueryError>;
        async fn fetch_customer_by_phone(&self, phone: &str) -> Result<Option<Customer>, OrderQueryError>;
    }
}
