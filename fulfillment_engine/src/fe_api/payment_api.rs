//! Payment confirmation and QR payment artifacts.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;

use crate::{
    db_types::{Order, OrderNumber, OrderQrCode},
    events::{EventProducers, PaymentConfirmedEvent, StatusChangedEvent},
    fe_api::event_snapshot,
    helpers::render_png_off_thread,
    traits::{CodConfirmation, FulfillmentDatabase, FulfillmentError},
};

/// The URL a delivery driver opens (usually by scanning a QR code) to confirm cash collection.
pub fn cod_confirmation_url(public_base_url: &str, order_number: &OrderNumber) -> String {
    format!("{}/cod/confirm/{order_number}", public_base_url.trim_end_matches('/'))
}

/// A payment QR image, ready to serve.
#[derive(Debug, Clone)]
pub struct PaymentQrImage {
    pub png: Vec<u8>,
    /// Validity of a stored artifact. `None` for images rendered on demand, which never expire.
    pub valid: Option<bool>,
}

pub struct PaymentApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for PaymentApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentApi")
    }
}

impl<B> PaymentApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> PaymentApi<B>
where B: FulfillmentDatabase
{
    /// Records cash collection for a cash-on-delivery order.
    ///
    /// Confirming an order twice is harmless: the second call reports `already_confirmed` and changes nothing, and no
    /// events are published for it. A first confirmation publishes `payment_confirmed`, plus `status_changed` if the
    /// order moved out of `pending`.
    pub async fn confirm_cod_payment(
        &self,
        order_number: &OrderNumber,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<CodConfirmation, FulfillmentError> {
        let confirmation = self.db.confirm_cod_payment(order_number, actor, notes).await?;
        if confirmation.already_confirmed {
            info!("💰️ Payment for {order_number} was already confirmed. Nothing to do.");
            return Ok(confirmation);
        }
        info!("💰️ Cash payment for {order_number} confirmed by {actor}");
        let snapshot = event_snapshot(&self.db, confirmation.order.clone()).await;
        self.producers.publish(PaymentConfirmedEvent::new(snapshot.clone(), actor).into()).await;
        if let Some(old_status) = confirmation.previous_status.filter(|_| confirmation.status_changed()) {
            self.producers.publish(StatusChangedEvent::new(snapshot, old_status, actor).into()).await;
        }
        Ok(confirmation)
    }

    /// Issues the QR payment artifact for a pre-paid order, encoding the payment reference `qr_data`.
    ///
    /// If the order already has an artifact, it is returned unchanged (the boolean is then false), even if it has
    /// expired. Rendering happens before the database is touched.
    pub async fn issue_qr_code(
        &self,
        order_number: &OrderNumber,
        qr_data: &str,
    ) -> Result<(OrderQrCode, bool), FulfillmentError> {
        let order = self.fetch_order(order_number).await?;
        if order.is_cash_on_delivery() {
            return Err(FulfillmentError::ValidationError(format!(
                "Order {order_number} is paid on delivery. QR payment codes are only issued for pre-paid orders"
            )));
        }
        if let Some(existing) = self.db.fetch_qr_code(order.id).await? {
            debug!("💰️ Reusing the QR code issued for {order_number} at {}", existing.created_at);
            return Ok((existing, false));
        }
        let qr_data = qr_data.trim();
        if qr_data.is_empty() {
            return Err(FulfillmentError::ValidationError("A payment reference is required".to_string()));
        }
        let image = render_png_off_thread(qr_data.to_string()).await?;
        let (qr, inserted) = self.db.insert_qr_code(order.id, qr_data, image, Utc::now()).await?;
        if inserted {
            info!("💰️ QR code issued for {order_number}. Valid until {}", qr.expires_at);
        }
        Ok((qr, inserted))
    }

    pub async fn fetch_qr_code(&self, order_number: &OrderNumber) -> Result<Option<OrderQrCode>, FulfillmentError> {
        let order = self.fetch_order(order_number).await?;
        let qr = self.db.fetch_qr_code(order.id).await?;
        Ok(qr)
    }

    /// The QR image to show for an order.
    ///
    /// Pre-paid orders get their stored payment artifact. Cash-on-delivery orders without a stored artifact get a QR
    /// code for their confirmation URL, rendered on demand.
    pub async fn payment_qr_image(
        &self,
        order_number: &OrderNumber,
        public_base_url: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentQrImage, FulfillmentError> {
        let order = self.fetch_order(order_number).await?;
        if let Some(qr) = self.db.fetch_qr_code(order.id).await? {
            let valid = Some(qr.is_valid_at(now));
            return Ok(PaymentQrImage { png: qr.image, valid });
        }
        if order.is_cash_on_delivery() {
            let png = render_confirmation_qr(public_base_url, order_number).await?;
            return Ok(PaymentQrImage { png, valid: None });
        }
        Err(FulfillmentError::QrCodeNotFound(order_number.clone()))
    }

    /// Marks the order's QR artifact as used, once the gateway reports the payment as complete.
    pub async fn mark_qr_used(&self, order_number: &OrderNumber) -> Result<OrderQrCode, FulfillmentError> {
        let order = self.fetch_order(order_number).await?;
        let qr = self
            .db
            .mark_qr_code_used(order.id)
            .await?
            .ok_or_else(|| FulfillmentError::QrCodeNotFound(order_number.clone()))?;
        debug!("💰️ QR code for {order_number} marked as used");
        Ok(qr)
    }

    /// Whether the order's QR artifact can still be used at `now`.
    pub async fn is_qr_valid(&self, order_number: &OrderNumber, now: DateTime<Utc>) -> Result<bool, FulfillmentError> {
        let qr = self
            .fetch_qr_code(order_number)
            .await?
            .ok_or_else(|| FulfillmentError::QrCodeNotFound(order_number.clone()))?;
        Ok(qr.is_valid_at(now))
    }

    /// Deletes QR artifacts that expired more than `retention` ago.
    pub async fn cleanup_expired_qr_codes(&self, retention: Duration) -> Result<u64, FulfillmentError> {
        let cutoff = Utc::now() - retention;
        let n = self.db.delete_expired_qr_codes(cutoff).await?;
        if n > 0 {
            info!("💰️ Deleted {n} QR codes that expired before {cutoff}");
        }
        Ok(n)
    }

    async fn fetch_order(&self, order_number: &OrderNumber) -> Result<Order, FulfillmentError> {
        self.db
            .fetch_order_by_number(order_number)
            .await?
            .ok_or_else(|| FulfillmentError::OrderNotFound(order_number.clone()))
    }
}

/// Renders the cash-on-delivery confirmation URL of an order as a PNG QR code.
pub async fn render_confirmation_qr(
    public_base_url: &str,
    order_number: &OrderNumber,
) -> Result<Vec<u8>, FulfillmentError> {
    let png = render_png_off_thread(cod_confirmation_url(public_base_url, order_number)).await?;
    Ok(png)
}
