use std::time::Duration as StdDuration;

use chrono::Duration;
use fulfillment_engine::{events::EventProducers, PaymentApi, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

/// Starts the QR code clean-up worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every `interval`, QR codes that expired more than `retention` ago are deleted.
pub fn start_qr_cleanup_worker(db: SqliteDatabase, retention: Duration, interval: StdDuration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let api = PaymentApi::new(db, EventProducers::default());
        info!("🕰️ QR code clean-up worker started. Codes are kept for {} days after expiry.", retention.num_days());
        loop {
            timer.tick().await;
            debug!("🕰️ Running QR code clean-up job");
            match api.cleanup_expired_qr_codes(retention).await {
                Ok(0) => debug!("🕰️ No expired QR codes to delete"),
                Ok(n) => info!("🕰️ {n} expired QR codes deleted"),
                Err(e) => error!("🕰️ Error running QR code clean-up job: {e}"),
            }
        }
    })
}
