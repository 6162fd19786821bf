use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use daosub::{
    Community, CommunityId, Error, ErrorCode, ErrorResponse, Identity, OrderId, OrderStatus,
    Price, SubscribeOutcome, SubscriptionOrder,
};
use daosub_common::common::DEFAULT_PRICE;
use serde::{Deserialize, Serialize};

use crate::router::RouterState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Subscriber account address
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayNotifyQuery {
    pub method: String,
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayNotifyRequest {
    pub tx_id: String,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutCommunityRequest {
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub price: Option<Price>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutIdentityRequest {
    pub id: String,
    #[serde(default)]
    pub nickname: String,
}

pub async fn post_subscribe(
    State(state): State<RouterState>,
    Path(community_id): Path<String>,
    Json(payload): Json<SubscribeRequest>,
) -> Result<Json<SubscribeOutcome>, Response> {
    let community_id = CommunityId::from(community_id);
    let cancel = state.shutdown.child_token();

    // Dropping the subscribe future on timeout deregisters its waiter
    let outcome = tokio::time::timeout(
        state.subscribe_timeout,
        state
            .coordinator
            .subscribe(&cancel, &community_id, &payload.address),
    )
    .await
    .unwrap_or(Err(Error::Cancelled))
    .map_err(|err| {
        match &err {
            Error::Cancelled => {
                tracing::info!("Subscribe of {} to {} cancelled", payload.address, community_id)
            }
            _ => tracing::error!(
                "Could not subscribe {} to {}: {}",
                payload.address,
                community_id,
                err
            ),
        }
        into_response(err)
    })?;

    Ok(Json(outcome))
}

pub async fn post_pay_notify(
    State(state): State<RouterState>,
    Query(query): Query<PayNotifyQuery>,
    Json(payload): Json<PayNotifyRequest>,
) -> Result<Json<SubscribeOutcome>, Response> {
    if query.method != state.coordinator.settings().payment_channel {
        tracing::warn!("Payment callback for unknown method {}", query.method);
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                ErrorCode::Unknown(400),
                format!("Unsupported method `{}`", query.method),
            )),
        )
            .into_response());
    }

    let order = state
        .reporter
        .report_completion(&query.order_id, &payload.tx_id, payload.status)
        .await
        .map_err(|err| {
            tracing::error!("Could not record completion of {}: {}", query.order_id, err);
            into_response(err)
        })?;

    Ok(Json(SubscribeOutcome::from(&order)))
}

pub async fn get_order(
    State(state): State<RouterState>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<SubscriptionOrder>, Response> {
    let order = state.coordinator.get_order(&order_id).await.map_err(|err| {
        tracing::debug!("Could not get order {}: {}", order_id, err);
        into_response(err)
    })?;

    Ok(Json(order))
}

pub async fn put_community(
    State(state): State<RouterState>,
    Path(community_id): Path<String>,
    Json(payload): Json<PutCommunityRequest>,
) -> Result<Json<Community>, Response> {
    let community = Community {
        id: CommunityId::from(community_id),
        name: payload.name,
        owner: payload.owner,
        price: payload.price.unwrap_or(DEFAULT_PRICE),
    };

    state
        .directory
        .put_community(community.clone())
        .await
        .map_err(|err| {
            tracing::error!("Could not store community {}: {}", community.id, err);
            into_response(Error::from(err))
        })?;

    Ok(Json(community))
}

pub async fn put_identity(
    State(state): State<RouterState>,
    Path(address): Path<String>,
    Json(payload): Json<PutIdentityRequest>,
) -> Result<Json<Identity>, Response> {
    let identity = Identity {
        id: payload.id,
        address,
        nickname: payload.nickname,
    };

    state
        .directory
        .put_identity(identity.clone())
        .await
        .map_err(|err| {
            tracing::error!("Could not store identity {}: {}", identity.address, err);
            into_response(Error::from(err))
        })?;

    Ok(Json(identity))
}

fn status_code(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::CommunityNotFound | ErrorCode::IdentityNotFound | ErrorCode::OrderNotFound => {
            StatusCode::NOT_FOUND
        }
        ErrorCode::DuplicateOrder | ErrorCode::InvalidTransition | ErrorCode::TxIdMismatch => {
            StatusCode::CONFLICT
        }
        ErrorCode::NonTerminalCompletion => StatusCode::BAD_REQUEST,
        ErrorCode::PaymentInitiationFailed => StatusCode::BAD_GATEWAY,
        ErrorCode::Cancelled => StatusCode::REQUEST_TIMEOUT,
        ErrorCode::Internal | ErrorCode::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn into_response<T>(error: T) -> Response
where
    T: Into<ErrorResponse>,
{
    let response: ErrorResponse = error.into();
    (status_code(response.code), Json(response)).into_response()
}
