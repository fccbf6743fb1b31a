//! Error → HTTP status mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use rmk_catalog::CatalogError;
use rmk_pricing::PricingError;

use crate::api_types::ErrorResponse;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "VALIDATION_ERROR",
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND",
            message: message.into(),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        let status = match &e {
            CatalogError::Validation { .. } => StatusCode::BAD_REQUEST,
            CatalogError::NotFound { .. } => StatusCode::NOT_FOUND,
            CatalogError::DuplicateVariant { .. }
            | CatalogError::EmptyDecision
            | CatalogError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CatalogError::OfferConflict { .. } => StatusCode::CONFLICT,
            CatalogError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl From<PricingError> for ApiError {
    fn from(e: PricingError) -> Self {
        let (status, code) = match &e {
            PricingError::ScopeConflict { .. } => (StatusCode::CONFLICT, "SCOPE_CONFLICT"),
            PricingError::Overflow => (StatusCode::UNPROCESSABLE_ENTITY, "PRICING_OVERFLOW"),
            _ => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        };
        Self {
            status,
            code,
            message: e.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        if let Some(p) = e.downcast_ref::<PricingError>() {
            return p.clone().into();
        }
        if let Some(c) = e.downcast_ref::<CatalogError>() {
            return c.clone().into();
        }
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL",
            message: format!("{e:#}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, error = %self.message, "request failed");
        } else {
            tracing::debug!(
                status = %self.status,
                code = self.code,
                error = %self.message,
                "request refused"
            );
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.code.to_string(),
                message: self.message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_errors_map_to_statuses() {
        let cases = [
            (CatalogError::validation("slug", "bad"), StatusCode::BAD_REQUEST),
            (
                CatalogError::NotFound {
                    entity: "product",
                    id: 1,
                },
                StatusCode::NOT_FOUND,
            ),
            (CatalogError::EmptyDecision, StatusCode::UNPROCESSABLE_ENTITY),
            (
                CatalogError::OfferConflict {
                    merchant_id: 1,
                    variant_id: 2,
                },
                StatusCode::CONFLICT,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn anyhow_wrapping_pricing_error_keeps_its_status() {
        let e: anyhow::Error = PricingError::ScopeConflict {
            existing_rule_id: 3,
        }
        .into();
        let api = ApiError::from(e);
        assert_eq!(api.status, StatusCode::CONFLICT);
        assert_eq!(api.code, "SCOPE_CONFLICT");
    }
}
