use axum::{
    Router, middleware,
    routing::{get, patch, post, put},
};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{
    auth, favorites, live, messages, notifications, properties, ratings, rentals, reports, users,
};

/// Every HTTP and WebSocket route. Transport layers (CORS, tracing) are
/// added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(live::health))
        .route("/ws", get(live::ws_upgrade))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/properties", get(properties::list_properties))
        .route("/properties/{property_id}", get(properties::get_property))
        .route("/ratings/property/{property_id}", get(ratings::property_ratings))
        .route("/ratings/property/{property_id}/stats", get(ratings::property_stats));

    let protected_routes = Router::new()
        .route("/users/me", get(users::get_me).put(users::update_me))
        .route("/messages", post(messages::send_message))
        .route("/messages/conversations", get(messages::list_conversations))
        .route("/messages/conversations/{user_id}", get(messages::get_history))
        .route(
            "/messages/conversations/{user_id}/read",
            put(messages::mark_conversation_read),
        )
        .route("/messages/{message_id}", axum::routing::delete(messages::delete_message))
        .route("/messages/{message_id}/read", patch(messages::mark_read))
        .route("/properties", post(properties::create_property))
        .route("/properties/mine", get(properties::my_properties))
        .route(
            "/properties/{property_id}",
            put(properties::update_property).delete(properties::delete_property),
        )
        .route("/favorites", get(favorites::list_favorites))
        .route(
            "/favorites/{property_id}",
            post(favorites::add_favorite).delete(favorites::remove_favorite),
        )
        .route("/favorites/check/{property_id}", get(favorites::check_favorite))
        .route(
            "/notifications",
            get(notifications::list_notifications).delete(notifications::delete_all),
        )
        .route(
            "/notifications/settings",
            get(notifications::get_settings).put(notifications::update_settings),
        )
        .route("/notifications/unread/count", get(notifications::unread_count))
        .route("/notifications/read-all", put(notifications::mark_all_read))
        .route("/notifications/{id}/read", put(notifications::mark_read))
        .route(
            "/notifications/{id}",
            axum::routing::delete(notifications::delete_notification),
        )
        .route("/rentals", post(rentals::create_rental))
        .route("/rentals/mine", get(rentals::my_rentals))
        .route("/rentals/{rental_id}", put(rentals::update_rental))
        .route("/ratings/property", post(ratings::rate_property))
        .route("/ratings/tenant", post(ratings::rate_tenant))
        .route("/ratings/tenant/{student_id}", get(ratings::tenant_ratings))
        .route("/ratings/tenant/{student_id}/stats", get(ratings::tenant_stats))
        .route("/reports", post(reports::create_report))
        .route("/reports/mine", get(reports::my_reports))
        .route("/reports/student/{student_id}", get(reports::student_reports))
        .route("/reports/{report_id}", put(reports::update_report))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
