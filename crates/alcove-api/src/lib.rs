pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod pagination;

use std::sync::Arc;

use axum::Router;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};

use alcove_db::Database;
use alcove_gateway::connection;
use alcove_gateway::dispatcher::Dispatcher;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
}

/// The full application router: public auth endpoints, JWT-protected
/// message endpoints, and the gateway WebSocket upgrade.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route(
            "/api/messages",
            get(messages::get_channel_messages).post(messages::send_channel_message),
        )
        .route(
            "/api/messages/{message_id}",
            patch(messages::edit_channel_message).delete(messages::delete_channel_message),
        )
        .route(
            "/api/direct-messages",
            get(messages::get_direct_messages).post(messages::send_direct_message),
        )
        .route(
            "/api/direct-messages/{message_id}",
            patch(messages::edit_direct_message).delete(messages::delete_direct_message),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state.clone());

    let gateway_route = Router::new()
        .route("/gateway", get(gateway_upgrade))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(gateway_route)
}

async fn gateway_upgrade(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher.clone(), state.jwt_secret.clone())
    })
}
