// Copyright 2025 bgpgg Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP surface: the protocol endpoints remote speakers POST to, plus the
//! read-only views the degraded-mode fallback reads.

use crate::advertise::LocalAgentRecord;
use crate::bgp::msg_keepalive::KeepaliveMessage;
use crate::bgp::msg_open::OpenMessage;
use crate::bgp::msg_update::UpdateMessage;
use crate::discovery::{DiscoveryAggregator, NetworkView};
use crate::log::{debug, info};
use crate::peer::{PeerInfo, UpdateOutcome};
use crate::rib::AgentRoute;
use crate::server::{PeerRoutes, SessionManager, SessionStats};
use crate::types::{Asn, SessionError};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

pub const PATH_PEERS: &str = "/bgp/peers";
pub const PATH_STATS: &str = "/bgp/stats";
pub const PATH_ROUTES: &str = "/bgp/routes";
pub const PATH_CANDIDATES: &str = "/bgp/routes/candidates";
pub const PATH_AGENTS: &str = "/bgp/agents";

/// Error body returned for every non-success status.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

pub struct ApiError(SessionError);

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        ApiError(e)
    }
}

pub fn status_for(error: &SessionError) -> StatusCode {
    match error {
        SessionError::PeerNotFound(_) => StatusCode::NOT_FOUND,
        SessionError::InvalidPeer(_)
        | SessionError::InvalidConfig(_)
        | SessionError::HandshakeFailed(_)
        | SessionError::LoopDetected { .. } => StatusCode::BAD_REQUEST,
        SessionError::HoldTimerExpired => StatusCode::CONFLICT,
        SessionError::ShutDown | SessionError::ServerGone => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        debug!(status = status.as_u16(), error = %self.0, "request failed");
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(manager: SessionManager) -> Router {
    Router::new()
        .route("/bgp/open", post(handle_open))
        .route("/bgp/update", post(handle_update))
        .route("/bgp/keepalive", post(handle_keepalive))
        .route(PATH_PEERS, get(handle_get_peers))
        .route("/bgp/peers/{asn}", get(handle_get_peer))
        .route("/bgp/peers/{asn}/routes", get(handle_get_peer_routes))
        .route(PATH_STATS, get(handle_get_stats))
        .route(PATH_ROUTES, get(handle_get_network_view))
        .route(PATH_CANDIDATES, get(handle_get_candidates))
        .route(PATH_AGENTS, get(handle_get_agents))
        .with_state(manager)
}

/// Serve the HTTP surface until the listener fails.
pub async fn serve(listener: TcpListener, manager: SessionManager) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, asn = manager.local_as().asn, "HTTP surface listening");
    }
    axum::serve(listener, router(manager)).await
}

async fn handle_open(
    State(manager): State<SessionManager>,
    Json(open): Json<OpenMessage>,
) -> ApiResult<OpenMessage> {
    Ok(Json(manager.receive_open(open).await?))
}

async fn handle_update(
    State(manager): State<SessionManager>,
    Json(update): Json<UpdateMessage>,
) -> ApiResult<UpdateOutcome> {
    let asn = update.sender_asn;
    Ok(Json(manager.receive_update(asn, update).await?))
}

async fn handle_keepalive(
    State(manager): State<SessionManager>,
    Json(keepalive): Json<KeepaliveMessage>,
) -> Result<StatusCode, ApiError> {
    manager.receive_keepalive(keepalive.sender_asn).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_get_peers(State(manager): State<SessionManager>) -> ApiResult<Vec<PeerInfo>> {
    Ok(Json(manager.get_peers().await?))
}

async fn handle_get_peer(
    State(manager): State<SessionManager>,
    Path(asn): Path<Asn>,
) -> ApiResult<PeerInfo> {
    match manager.get_peer(asn).await? {
        Some(info) => Ok(Json(info)),
        None => Err(SessionError::PeerNotFound(asn).into()),
    }
}

async fn handle_get_peer_routes(
    State(manager): State<SessionManager>,
    Path(asn): Path<Asn>,
) -> ApiResult<Vec<AgentRoute>> {
    Ok(Json(manager.get_routes_from_peer(asn).await?))
}

async fn handle_get_stats(State(manager): State<SessionManager>) -> ApiResult<SessionStats> {
    Ok(Json(manager.get_session_stats().await?))
}

async fn handle_get_network_view(State(manager): State<SessionManager>) -> ApiResult<NetworkView> {
    let snapshot = manager.get_route_snapshot().await?;
    Ok(Json(DiscoveryAggregator::from_snapshot(snapshot).network_view()))
}

async fn handle_get_candidates(State(manager): State<SessionManager>) -> ApiResult<Vec<PeerRoutes>> {
    Ok(Json(manager.get_route_snapshot().await?))
}

async fn handle_get_agents(
    State(manager): State<SessionManager>,
) -> ApiResult<Vec<LocalAgentRecord>> {
    Ok(Json(manager.get_local_agents().await?))
}
