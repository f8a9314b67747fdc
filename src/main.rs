// Crop Advisor API v0.1
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod crops;
mod errors;
mod helpers;
mod routes;
mod services;

use config::AppConfig;
use routes::predict::AppState;
use services::inference::InferenceEngine;
use services::model::{SoftmaxClassifier, StandardScaler};
use services::thingspeak::ThingSpeakClient;

/// Classifier artifact file name inside MODEL_DIR.
const CLASSIFIER_FILE: &str = "crop_model.json";
/// Scaler artifact file name inside MODEL_DIR.
const SCALER_FILE: &str = "scaler.json";

/// Crop Advisor API — OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Crop Advisor API",
        version = "0.1.0",
        description = "Crop recommendation API. Predicts a suitable crop from four \
            environmental readings (temperature, humidity, soil pH, rainfall) using a \
            pre-trained classifier, scores cotton suitability with both a model \
            probability and a fixed-threshold rule, and can fetch readings from a \
            ThingSpeak IoT telemetry channel.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Prediction", description = "Crop prediction and cotton suitability"),
        (name = "Telemetry", description = "ThingSpeak channel readings"),
    ),
    paths(
        routes::health::health_check,
        routes::predict::predict,
        routes::telemetry::get_telemetry_reading,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::predict::PredictRequest,
            routes::predict::PredictionResponse,
            routes::predict::CottonSuitability,
            services::inference::Reading,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crop_advisor_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    // Load the trained artifacts. The service cannot answer anything
    // without them, so a missing or malformed artifact is fatal.
    let model_dir = Path::new(&config.model_dir);
    let scaler =
        StandardScaler::from_file(&model_dir.join(SCALER_FILE)).expect("Failed to load scaler artifact");
    let classifier = SoftmaxClassifier::from_file(&model_dir.join(CLASSIFIER_FILE))
        .expect("Failed to load classifier artifact");

    let engine = Arc::new(InferenceEngine::new(
        Box::new(scaler),
        Box::new(classifier),
        config.prediction_mode,
    ));
    tracing::info!(
        "Model artifacts loaded from {} ({} classes, selection mode {})",
        model_dir.display(),
        engine.num_classes(),
        engine.mode()
    );

    // Create ThingSpeak client
    let thingspeak = ThingSpeakClient::new(&config.thingspeak_base_url, config.field_mapping);

    // Build shared application state
    let app_state = AppState { engine, thingspeak };

    // CORS — predict is a POST, everything else GET
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    // Build router
    let api_routes = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/predict", post(routes::predict::predict))
        .route(
            "/api/v1/telemetry/reading",
            get(routes::telemetry::get_telemetry_reading),
        )
        .with_state(app_state);

    let app = Router::new()
        .merge(api_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
