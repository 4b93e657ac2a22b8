use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cli::ServeArgs;
use crate::error::{ApiError, ErrorBody};
use crate::lookups::LookupEntry;
use crate::report::{CustomRule, Engine, Params, Sourced};

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
}

pub async fn run(opts: ServeArgs) -> anyhow::Result<()> {
    let engine = Engine::connect(&opts.source)
        .await
        .context("initialise data source")?;
    tracing::info!("Data source: {}", engine.source_label());

    let app = router(Arc::new(engine));

    let addr: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .context("parse host:port")?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(engine: Arc<Engine>) -> Router {
    let state = AppState { engine };

    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    Router::new()
        .route("/api/health", get(api_health))
        .route("/api/metrics", get(api_metrics))
        .route("/api/lookups", get(api_lookups))
        .route("/api/resistance/custom", post(api_custom_resistance))
        .route("/api/resistance/:metric", get(api_resistance))
        .route("/api/prevalence/:metric", get(api_prevalence))
        .route("/api/usage/aware", get(api_aware))
        .route("/api/usage/atc", get(api_atc))
        .route(
            "/api/datasets/:dataset/antibiogram/:organism",
            get(api_antibiogram),
        )
        .route(
            "/api/datasets/:dataset/distribution/:column",
            get(api_distribution),
        )
        .route("/api/datasets/:dataset/filters/:column", get(api_filter_options))
        .route("/api/datasets/:dataset/summary", get(api_summary))
        .fallback(api_not_found)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    success: bool,
    data: T,
    data_source: String,
    timestamp: String,
}

fn ok<T: Serialize>(data_source: &str, data: T) -> Response {
    Json(Envelope {
        success: true,
        data,
        data_source: data_source.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
    .into_response()
}

fn reply<T: Serialize>(res: Result<Sourced<T>, ApiError>) -> Response {
    match res {
        Ok(s) => ok(s.table, s.data),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
}

async fn api_health(State(st): State<AppState>) -> impl IntoResponse {
    ok(st.engine.source_label(), Health { status: "ok" })
}

async fn api_metrics(State(st): State<AppState>) -> impl IntoResponse {
    ok(st.engine.source_label(), st.engine.registry())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupsResponse<'a> {
    organisms: Vec<LookupEntry>,
    antibiotics: Vec<LookupEntry>,
    age_categories: &'a [String],
}

async fn api_lookups(State(st): State<AppState>) -> impl IntoResponse {
    let lookups = st.engine.lookups();
    ok(
        st.engine.source_label(),
        LookupsResponse {
            organisms: lookups.organism_entries(),
            antibiotics: lookups.antibiotic_entries(),
            age_categories: lookups.ages.labels(),
        },
    )
}

async fn api_resistance(
    State(st): State<AppState>,
    AxumPath(metric): AxumPath<String>,
    Query(p): Query<Params>,
) -> impl IntoResponse {
    reply(st.engine.resistance(&metric, &p).await)
}

async fn api_custom_resistance(
    State(st): State<AppState>,
    Query(p): Query<Params>,
    body: Result<Json<CustomRule>, JsonRejection>,
) -> impl IntoResponse {
    let Json(rule) = match body {
        Ok(b) => b,
        Err(rejection) => return ApiError::bad_request(rejection.body_text()).into_response(),
    };
    reply(st.engine.custom_resistance(&rule, &p).await)
}

async fn api_prevalence(
    State(st): State<AppState>,
    AxumPath(metric): AxumPath<String>,
    Query(p): Query<Params>,
) -> impl IntoResponse {
    reply(st.engine.prevalence(&metric, &p).await)
}

async fn api_aware(State(st): State<AppState>, Query(p): Query<Params>) -> impl IntoResponse {
    reply(st.engine.aware_distribution(&p).await)
}

async fn api_atc(State(st): State<AppState>, Query(p): Query<Params>) -> impl IntoResponse {
    reply(st.engine.atc_distribution(&p).await)
}

async fn api_antibiogram(
    State(st): State<AppState>,
    AxumPath((dataset, organism)): AxumPath<(String, String)>,
    Query(p): Query<Params>,
) -> impl IntoResponse {
    reply(st.engine.antibiogram(&dataset, &organism, &p).await)
}

async fn api_distribution(
    State(st): State<AppState>,
    AxumPath((dataset, column)): AxumPath<(String, String)>,
    Query(p): Query<Params>,
) -> impl IntoResponse {
    reply(st.engine.distribution(&dataset, &column, &p).await)
}

async fn api_filter_options(
    State(st): State<AppState>,
    AxumPath((dataset, column)): AxumPath<(String, String)>,
    Query(p): Query<Params>,
) -> impl IntoResponse {
    reply(st.engine.filter_options(&dataset, &column, &p).await)
}

async fn api_summary(
    State(st): State<AppState>,
    AxumPath(dataset): AxumPath<String>,
    Query(p): Query<Params>,
) -> impl IntoResponse {
    reply(st.engine.summary(&dataset, &p).await)
}

async fn api_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(ErrorBody::new("no such endpoint")))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    ApiError::Internal(detail).into_response()
}
