use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::models::{AiChat, FlashcardSession, MultipleChoiceQuiz, Summary, Upload};
use crate::repo::OwnedCollection;
use crate::{auth::AuthenticatedUser, state::AppState};

use collections::ResourceResponse;

pub mod aichats;
pub mod auth;
pub mod checkout;
pub mod collections;
pub mod folders;
pub mod generate;
pub mod health;
pub mod notion;
pub mod public;
pub mod uploads;
pub mod webhooks;

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

/// Routes shared by every owned collection: list, fetch, rename, move
/// between folders, delete.
fn collection_routes<C>() -> Router<AppState>
where
    C: OwnedCollection + Into<ResourceResponse> + Send + 'static,
{
    Router::new()
        .route("/", get(collections::list::<C>))
        .route(
            "/:id",
            get(collections::get_one::<C>)
                .patch(collections::rename::<C>)
                .delete(collections::remove::<C>),
        )
        .route("/:id/folder", patch(collections::move_item::<C>))
}

pub fn create_router(state: AppState) -> Router<()> {
    // Origins come from config as a comma-separated list; parsing happens
    // once at startup, so a malformed entry aborts before the bind.
    let allow_origin = match state.config.cors_allowed_origin.as_deref() {
        Some(origins) => AllowOrigin::list(
            origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(|origin| {
                    origin
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
                .collect::<Vec<_>>(),
        ),
        None => AllowOrigin::mirror_request(),
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(tower_http::cors::AllowMethods::mirror_request())
        .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
        .allow_credentials(true);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/me", get(auth::me).patch(auth::update_profile));

    let aichats_routes = Router::new()
        .route(
            "/",
            get(collections::list::<AiChat>).post(aichats::create_chat),
        )
        .route(
            "/:id",
            get(collections::get_one::<AiChat>)
                .patch(collections::rename::<AiChat>)
                .delete(collections::remove::<AiChat>),
        )
        .route("/:id/folder", patch(collections::move_item::<AiChat>))
        .route("/:id/messages", post(aichats::continue_chat));

    let uploads_routes = Router::new()
        .route("/", get(collections::list::<Upload>).post(uploads::upload))
        .route("/text", post(uploads::upload_text))
        .route(
            "/:id",
            get(collections::get_one::<Upload>)
                .patch(collections::rename::<Upload>)
                .delete(collections::remove::<Upload>),
        )
        .route("/:id/folder", patch(collections::move_item::<Upload>));

    let folders_routes = Router::new()
        .route("/", get(folders::list_folders).post(folders::create_folder))
        .route(
            "/:id",
            patch(folders::rename_folder).delete(folders::delete_folder),
        );

    let generate_routes = Router::new()
        .route("/generate-flashcards", post(generate::generate_flashcards))
        .route("/generate-quiz", post(generate::generate_quiz))
        .route("/generate-summary", post(generate::generate_summary));

    let checkout_routes = Router::new()
        .route("/session", post(checkout::create_checkout_session))
        .route("/session-status", get(checkout::session_status))
        .route("/cancel", post(checkout::cancel_subscription));

    let notion_routes = Router::new()
        .route("/auth-url", get(notion::auth_url))
        .route("/callback", get(notion::callback))
        .route("/is-authorized", get(notion::is_authorized))
        .route("/page-content", get(notion::page_content));

    let public_routes = Router::new()
        .route(
            "/api/openai/generate-flashcards-public",
            post(generate::generate_flashcards_public),
        )
        .route("/api/uploads-public", post(uploads::upload_public))
        .route(
            "/api/public/sessions/:id",
            get(public::get_session).delete(public::delete_session),
        )
        .route("/api/webhooks/stripe", post(webhooks::stripe_webhook));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/flashcards", collection_routes::<FlashcardSession>())
        .nest(
            "/api/multiple-choice-quizzes",
            collection_routes::<MultipleChoiceQuiz>(),
        )
        .nest("/api/summaries", collection_routes::<Summary>())
        .nest("/api/aichats", aichats_routes)
        .nest("/api/uploads", uploads_routes)
        .nest("/api/folders", folders_routes)
        .nest("/api/openai", generate_routes)
        .nest("/api/checkout", checkout_routes)
        .nest("/api/notion", notion_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
}
