use std::sync::atomic::{AtomicBool, Ordering};

use actix_web::{
    error::{JsonPayloadError, PathError, QueryPayloadError, ResponseError},
    http::{header::ContentType, StatusCode},
    HttpRequest,
    HttpResponse,
};
use fulfillment_engine::{db_types::StockShortfall, FulfillmentError, OrderQueryError};
use log::*;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

static DIAGNOSTIC_ERRORS: AtomicBool = AtomicBool::new(false);

/// Switches internal error details in responses on or off. Off by default.
pub fn set_diagnostic_errors(enabled: bool) {
    DIAGNOSTIC_ERRORS.store(enabled, Ordering::Relaxed);
}

fn diagnostic_errors() -> bool {
    DIAGNOSTIC_ERRORS.load(Ordering::Relaxed)
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("{0}")]
    ValidationError(String),
    #[error("Insufficient stock")]
    InsufficientStock(Vec<StockShortfall>),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Could not create the order. {0}")]
    OrderCreationFailure(String),
    #[error("Payment gateway did not respond in time")]
    PaymentTimeout,
    #[error("Could not reach payment gateway. {0}")]
    PaymentConnectionError(String),
    #[error("{0}")]
    PaymentDeclined(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
}

impl ServerError {
    /// The `error.type` field of the response envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => "ValidationError",
            Self::InsufficientStock(_) => "InsufficientStock",
            Self::InvalidTransition(_) => "InvalidTransition",
            Self::NotFound(_) => "NotFound",
            Self::OrderCreationFailure(_) => "OrderCreationFailure",
            Self::PaymentTimeout => "PaymentTimeout",
            Self::PaymentConnectionError(_) => "PaymentConnectionError",
            Self::PaymentDeclined(_) => "PaymentDeclined",
            Self::InitializeError(_) | Self::IOError(_) | Self::BackendError(_) => "InternalError",
        }
    }

    /// The message shown to callers. Internal failures are never described beyond a generic message.
    pub fn public_message(&self) -> String {
        match self {
            Self::OrderCreationFailure(_) => "Could not create the order. Please try again.".to_string(),
            Self::PaymentConnectionError(_) => "Could not reach payment gateway".to_string(),
            Self::InitializeError(_) | Self::IOError(_) | Self::BackendError(_) => {
                "An unexpected error occurred".to_string()
            },
            _ => self.to_string(),
        }
    }

    /// Builds the JSON error envelope, tagged with `request_id`.
    pub fn envelope(&self, request_id: &Uuid, include_detail: bool) -> serde_json::Value {
        let mut error = json!({
            "type": self.kind(),
            "message": self.public_message(),
            "request_id": request_id.to_string(),
        });
        if let Self::InsufficientStock(items) = self {
            error["items"] = json!(items);
        }
        if include_detail {
            error["detail"] = json!(self.to_string());
        }
        json!({ "success": false, "error": error })
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientStock(_) => StatusCode::BAD_REQUEST,
            Self::InvalidTransition(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::OrderCreationFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PaymentTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::PaymentConnectionError(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let request_id = Uuid::new_v4();
        let status = self.status_code();
        if status.is_server_error() {
            error!("💻️ [{request_id}] {status} {}: {self}", self.kind());
        } else {
            debug!("💻️ [{request_id}] {status} {}: {self}", self.kind());
        }
        HttpResponse::build(status)
            .insert_header(ContentType::json())
            .body(self.envelope(&request_id, diagnostic_errors()).to_string())
    }
}

impl From<FulfillmentError> for ServerError {
    fn from(e: FulfillmentError) -> Self {
        match e {
            FulfillmentError::ValidationError(s) => Self::ValidationError(s),
            FulfillmentError::NotCashOnDelivery(_) => Self::ValidationError(e.to_string()),
            FulfillmentError::InsufficientStock(items) => Self::InsufficientStock(items),
            FulfillmentError::InvalidTransition(t) => Self::InvalidTransition(t.to_string()),
            FulfillmentError::OrderCancelled(_) => Self::InvalidTransition(e.to_string()),
            FulfillmentError::OrderNotFound(_) | FulfillmentError::QrCodeNotFound(_) => Self::NotFound(e.to_string()),
            FulfillmentError::OrderCreationFailure(s) => Self::OrderCreationFailure(s),
            FulfillmentError::DatabaseError(_) | FulfillmentError::QrRenderError(_) => {
                Self::BackendError(e.to_string())
            },
        }
    }
}

impl From<OrderQueryError> for ServerError {
    fn from(e: OrderQueryError) -> Self {
        match e {
            OrderQueryError::QueryError(s) => Self::ValidationError(s),
            OrderQueryError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

/// Malformed JSON bodies are reported in the standard envelope instead of actix's plain-text response.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ServerError::ValidationError(format!("Invalid request body. {err}")).into()
}

pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ServerError::ValidationError(format!("Invalid query parameters. {err}")).into()
}

pub fn path_error_handler(err: PathError, _req: &HttpRequest) -> actix_web::Error {
    ServerError::ValidationError(format!("Invalid request path. {err}")).into()
}

#[cfg(test)]
mod test {
    use fulfillment_engine::db_types::{OrderNumber, OrderStatusType};

    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (ServerError::ValidationError("phone is required".into()), 400, "ValidationError"),
            (ServerError::InsufficientStock(vec![]), 400, "InsufficientStock"),
            (ServerError::InvalidTransition("nope".into()), 400, "InvalidTransition"),
            (ServerError::NotFound("Order MD00001 not found".into()), 404, "NotFound"),
            (ServerError::OrderCreationFailure("disk full".into()), 500, "OrderCreationFailure"),
            (ServerError::PaymentTimeout, 504, "PaymentTimeout"),
            (ServerError::PaymentConnectionError("refused".into()), 503, "PaymentConnectionError"),
            (ServerError::PaymentDeclined("Merchant not registered".into()), 402, "PaymentDeclined"),
            (ServerError::BackendError("pool timed out".into()), 500, "InternalError"),
        ];
        for (err, code, kind) in cases {
            assert_eq!(err.status_code().as_u16(), code, "{err:?}");
            assert_eq!(err.kind(), kind);
        }
    }

    #[test]
    fn internal_errors_are_not_leaked() {
        let err = ServerError::BackendError("table orders is locked".into());
        let id = Uuid::new_v4();
        let envelope = err.envelope(&id, false);
        assert_eq!(envelope["success"], false);
        assert_eq!(envelope["error"]["message"], "An unexpected error occurred");
        assert_eq!(envelope["error"]["request_id"], id.to_string());
        assert!(envelope["error"].get("detail").is_none());
        let envelope = err.envelope(&id, true);
        assert!(envelope["error"]["detail"].as_str().unwrap().contains("table orders is locked"));
    }

    #[test]
    fn insufficient_stock_lists_items() {
        let err = ServerError::InsufficientStock(vec![StockShortfall {
            id: "P1".into(),
            name: "Lipstick".into(),
            available: 1,
            requested: 2,
        }]);
        let envelope = err.envelope(&Uuid::new_v4(), false);
        assert_eq!(envelope["error"]["message"], "Insufficient stock");
        assert_eq!(envelope["error"]["items"][0]["id"], "P1");
        assert_eq!(envelope["error"]["items"][0]["available"], 1);
        assert_eq!(envelope["error"]["items"][0]["requested"], 2);
    }

    #[test]
    fn engine_errors_map_once() {
        let transition = OrderStatusType::Pending.validate_transition(OrderStatusType::OutForDelivery).unwrap_err();
        let err = ServerError::from(FulfillmentError::InvalidTransition(transition));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.public_message().contains("Cannot change from \"pending\" to \"out_for_delivery\""));

        let err = ServerError::from(FulfillmentError::OrderNotFound(OrderNumber::from_sequence(1)));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.public_message(), "Order MD00001 not found");

        let err = ServerError::from(FulfillmentError::OrderCancelled(OrderNumber::from_sequence(2)));
        assert_eq!(err.kind(), "InvalidTransition");

        let err = ServerError::from(FulfillmentError::DatabaseError("disk I/O error".into()));
        assert_eq!(err.kind(), "InternalError");
        assert_eq!(err.public_message(), "An unexpected error occurred");
    }
}
