mod anomaly;
mod qr_image;

pub use anomaly::{
    AnomalyReport,
    AnomalyRules,
    CustomerHistory,
    DEFAULT_FIRST_ORDER_THRESHOLD,
    DEFAULT_HIGH_VALUE_THRESHOLD,
};
pub use qr_image::{render_png, render_png_off_thread, QrImageError};
