pub mod session;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState};

/// The shop session attached to every protected request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopSession {
    pub shop_id: String,
    pub shop_name: String,
    pub operator: Option<String>,
}

#[async_trait]
impl FromRequestParts<AppState> for ShopSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let claims = state
            .sessions
            .verify_token(bearer.token())
            .map_err(|_| AppError::unauthorized())?;

        Ok(ShopSession {
            shop_id: claims.sub,
            shop_name: claims.shop_name,
            operator: claims.operator,
        })
    }
}
