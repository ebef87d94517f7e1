//! HTTP Surface
//!
//! axum router exposing the dispatcher under `/{namespace}`. Bearer tokens
//! resolve to actors through the configured [`ActorDirectory`]; every
//! failure renders as the `{code, message, data: {status}}` envelope.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router, async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::ai::provider::{Route, RouteArgs, RouteResult, Target};
use crate::dispatch::{DispatchRequest, FeatureDispatcher, SettingsPayload, SettingsResponse};
use crate::types::{Actor, ActorDirectory, ErrorEnvelope, QuillError, Result};

#[derive(Clone)]
pub struct ServerState {
    pub dispatcher: FeatureDispatcher,
    pub actors: Arc<ActorDirectory>,
}

impl ServerState {
    pub fn new(dispatcher: FeatureDispatcher, actors: ActorDirectory) -> Self {
        Self {
            dispatcher,
            actors: Arc::new(actors),
        }
    }
}

// =============================================================================
// Error Rendering
// =============================================================================

impl IntoResponse for QuillError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code = %self.code(), "Request failed: {}", self);
        }
        (status, Json(ErrorEnvelope::from(&self))).into_response()
    }
}

// =============================================================================
// Actor Extraction
// =============================================================================

/// Actor resolved from the `Authorization: Bearer` header; anonymous when
/// the header is missing or the token is unknown
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

#[async_trait]
impl FromRequestParts<ServerState> for CurrentActor {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        Ok(Self(state.actors.resolve(header)))
    }
}

// =============================================================================
// Router
// =============================================================================

pub fn router(state: ServerState, namespace: &str) -> Router {
    let api = Router::new()
        .route("/generate-title", post(title_from_text))
        .route("/generate-title/:id", get(title_for_item))
        .route("/generate-excerpt", post(excerpt_from_text))
        .route("/generate-excerpt/:id", get(excerpt_for_item))
        .route("/resize-content", post(resize_text))
        .route("/resize-content/:id", get(resize_item))
        .route("/generate-descriptive-text/:id", get(descriptive_text))
        .route("/generate-tags/:id", get(generate_tags))
        .route("/openai/generate-image", post(generate_image))
        .route("/term-cleanup/:taxonomy", get(term_cleanup))
        .route("/settings", get(read_settings).post(write_settings));

    Router::new()
        .nest(&format!("/{}", namespace.trim_matches('/')), api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(router: Router, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

// =============================================================================
// Route Handlers
// =============================================================================

type RouteResponse = Result<Json<RouteResult>>;

/// Unparseable IDs become `0`, which the route reports as a missing post
fn item_target(id: &str) -> Target {
    Target::Item(id.trim().parse().unwrap_or(0))
}

async fn run(
    state: &ServerState,
    actor: &Actor,
    route: Route,
    target: Target,
    args: RouteArgs,
) -> RouteResponse {
    let request = DispatchRequest::new(route, target).with_args(args);
    state.dispatcher.dispatch(actor, request).await.map(Json)
}

async fn title_for_item(
    State(state): State<ServerState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Query(args): Query<RouteArgs>,
) -> RouteResponse {
    run(&state, &actor, Route::Title, item_target(&id), args).await
}

async fn title_from_text(
    State(state): State<ServerState>,
    CurrentActor(actor): CurrentActor,
    Json(args): Json<RouteArgs>,
) -> RouteResponse {
    run(&state, &actor, Route::Title, Target::Text, args).await
}

async fn excerpt_for_item(
    State(state): State<ServerState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Query(args): Query<RouteArgs>,
) -> RouteResponse {
    run(&state, &actor, Route::Excerpt, item_target(&id), args).await
}

async fn excerpt_from_text(
    State(state): State<ServerState>,
    CurrentActor(actor): CurrentActor,
    Json(args): Json<RouteArgs>,
) -> RouteResponse {
    run(&state, &actor, Route::Excerpt, Target::Text, args).await
}

async fn resize_item(
    State(state): State<ServerState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Query(args): Query<RouteArgs>,
) -> RouteResponse {
    run(&state, &actor, Route::ResizeContent, item_target(&id), args).await
}

async fn resize_text(
    State(state): State<ServerState>,
    CurrentActor(actor): CurrentActor,
    Json(args): Json<RouteArgs>,
) -> RouteResponse {
    run(&state, &actor, Route::ResizeContent, Target::Text, args).await
}

async fn descriptive_text(
    State(state): State<ServerState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> RouteResponse {
    let target = item_target(&id);
    run(&state, &actor, Route::DescriptiveText, target, RouteArgs::default()).await
}

async fn generate_tags(
    State(state): State<ServerState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> RouteResponse {
    run(&state, &actor, Route::Classify, item_target(&id), RouteArgs::default()).await
}

#[derive(Debug, Deserialize)]
struct ImageBody {
    #[serde(default)]
    prompt: String,
    #[serde(flatten)]
    args: RouteArgs,
}

async fn generate_image(
    State(state): State<ServerState>,
    CurrentActor(actor): CurrentActor,
    Json(body): Json<ImageBody>,
) -> RouteResponse {
    let target = Target::Prompt(body.prompt);
    run(&state, &actor, Route::GenerateImage, target, body.args).await
}

async fn term_cleanup(
    State(state): State<ServerState>,
    CurrentActor(actor): CurrentActor,
    Path(taxonomy): Path<String>,
) -> RouteResponse {
    let target = Target::Taxonomy(taxonomy);
    run(&state, &actor, Route::TermCleanup, target, RouteArgs::default()).await
}

// =============================================================================
// Settings Handlers
// =============================================================================

async fn read_settings(
    State(state): State<ServerState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Map<String, Value>>> {
    state.dispatcher.get_settings(&actor).map(Json)
}

async fn write_settings(
    State(state): State<ServerState>,
    CurrentActor(actor): CurrentActor,
    Json(payload): Json<SettingsPayload>,
) -> Result<Json<SettingsResponse>> {
    state.dispatcher.save_settings(&actor, &payload).await.map(Json)
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::context::AppContext;
    use crate::types::actor::caps;

    const ADMIN_TOKEN: &str = "admin-token";
    const EDITOR_TOKEN: &str = "editor-token";

    fn app() -> Router {
        let dispatcher = FeatureDispatcher::new(Arc::new(AppContext::in_memory()));
        let actors = ActorDirectory::new([
            (ADMIN_TOKEN.to_string(), Actor::operator()),
            (
                EDITOR_TOKEN.to_string(),
                Actor::new(2, ["editor"]).with_capabilities([caps::EDIT_POSTS]),
            ),
        ]);
        router(ServerState::new(dispatcher, actors), "quillmind/v1")
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_anonymous_title_request_is_forbidden() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/quillmind/v1/generate-title/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["code"], "rest_forbidden");
        assert_eq!(body["data"]["status"], 403);
    }

    #[tokio::test]
    async fn test_disabled_feature_renders_envelope() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/quillmind/v1/generate-title/1?n=2")
                    .header(AUTHORIZATION, format!("Bearer {}", EDITOR_TOKEN))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["code"], "not_enabled");
        assert_eq!(body["message"], "Title generation not currently enabled.");
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let app = app();
        let save = Request::builder()
            .method("POST")
            .uri("/quillmind/v1/settings")
            .header(AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN))
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "settings": { "feature_content_resizing": { "status": "enabled" } },
                    "is_setup": true,
                    "step": "enable_features"
                })
                .to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(save).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["errors"], json!([]));
        assert_eq!(body["settings"]["feature_content_resizing"]["status"], "enabled");

        let read = Request::builder()
            .uri("/quillmind/v1/settings")
            .header(AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN))
            .body(Body::empty())
            .unwrap();
        let body = body_json(app.oneshot(read).await.unwrap()).await;
        assert_eq!(body["feature_content_resizing"]["status"], "enabled");
    }

    #[tokio::test]
    async fn test_settings_forbidden_for_editor() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/quillmind/v1/settings")
                    .header(AUTHORIZATION, format!("Bearer {}", EDITOR_TOKEN))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_item_target_parsing() {
        assert_eq!(item_target("42"), Target::Item(42));
        assert_eq!(item_target("abc"), Target::Item(0));
    }
}
