use crate::traits::FulfillmentError;

/// A persisted membership counter for a named broadcast group.
#[allow(async_fn_in_trait)]
pub trait SubscriberCounter: Clone {
    /// Admits one more member to `group` if it has fewer than `max` members. Returns the new count on admission, or
    /// `None` if the group is full.
    async fn try_join(&self, group: &str, max: i64) -> Result<Option<i64>, FulfillmentError>;

    /// Releases one membership. The count never drops below zero.
    async fn leave(&self, group: &str) -> Result<i64, FulfillmentError>;

    /// Clears the count for `group`, dropping memberships left behind by sessions that never ended cleanly.
    async fn reset_subscribers(&self, group: &str) -> Result<(), FulfillmentError>;
}
