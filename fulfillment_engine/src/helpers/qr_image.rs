//! Renders payment references as scannable PNG images.
use std::io::Cursor;

use image::{ImageFormat, Luma};
use qrcode::QrCode;
use thiserror::Error;

/// Width, in pixels, of each QR module.
const MODULE_SIZE: u32 = 10;

#[derive(Debug, Clone, Error)]
pub enum QrImageError {
    #[error("Cannot encode the data as a QR code. {0}")]
    EncodingError(String),
    #[error("Could not write the PNG image. {0}")]
    ImageError(String),
    #[error("The QR rendering task did not complete. {0}")]
    TaskError(String),
}

/// Encodes `data` (typically a URL) into a QR code and returns the PNG bytes.
pub fn render_png(data: &str) -> Result<Vec<u8>, QrImageError> {
    let code = QrCode::new(data.as_bytes()).map_err(|e| QrImageError::EncodingError(e.to_string()))?;
    let img = code.render::<Luma<u8>>().module_dimensions(MODULE_SIZE, MODULE_SIZE).build();
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).map_err(|e| QrImageError::ImageError(e.to_string()))?;
    Ok(bytes)
}

/// [`render_png`], run on the blocking thread pool.
pub async fn render_png_off_thread(data: String) -> Result<Vec<u8>, QrImageError> {
    tokio::task::spawn_blocking(move || render_png(&data)).await.map_err(|e| QrImageError::TaskError(e.to_string()))?
}
