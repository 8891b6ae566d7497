#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use crop_doctor::{DiagnosisState, ServiceConfig, diagnosis_router};
use dotenv::dotenv;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

mod metrics;

/// Route template the request matched, so arbitrary paths cannot add series.
fn route_label<B>(request: &Request<B>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string())
}

async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = route_label(&request);

    let is_predict = path.ends_with("/predict");
    if is_predict {
        metrics::increment_in_flight();
    }

    let response = next.run(request).await;

    if is_predict {
        metrics::decrement_in_flight();
    }
    metrics::record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    metrics::init_telemetry();

    tracing::info!("Starting Crop Doctor API");

    let config = ServiceConfig::from_env()?;
    tracing::info!(
        "Loaded configuration: model={}, prefix={}, max_image_size_mb={}",
        config.model_path.display(),
        config.normalized_prefix(),
        config.max_image_size_mb
    );

    let port = config.port;
    let state = match DiagnosisState::load(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load model");
            return Err(e.into());
        }
    };

    let app = diagnosis_router(state)
        .route("/metrics", get(metrics::handler))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
