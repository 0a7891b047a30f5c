mod extract;

use crate::build_info;
use crate::model::extraction::{Endpoints, ServiceDescriptor};
use crate::model::Language;
use crate::util::ApiError;
use crate::AppState;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE,
};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

pub use extract::extract_text;

/// 跨域：任意来源，GET/POST/OPTIONS，仅允许 Content-Type 请求头
fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
}

pub fn routes(app_state: AppState) -> Router {
    let body_limit = usize::try_from(app_state.config.upload.max_file_bytes()).unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(service_info).fallback(method_fallback))
        .route("/extract-text", post(extract_text).fallback(method_fallback))
        .fallback(endpoint_not_found)
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(create_cors_layer())
        // 所有响应（包括错误与预检）统一为 JSON 且允许跨域
        .layer(SetResponseHeaderLayer::overriding(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
}

/// GET /
async fn service_info(State(app_state): State<AppState>) -> Json<ServiceDescriptor> {
    Json(ServiceDescriptor {
        service: "OCR API Service",
        status: "running",
        supported_languages: Language::supported_codes(),
        supported_formats: app_state.config.upload.allowed_extensions.clone(),
        version: build_info::service_version(),
        endpoints: Endpoints {
            extract_text: "/extract-text (POST)",
            health: "/ (GET)",
        },
    })
}

/// 已知路由上的其他方法：OPTIONS 直接放行，其余返回 405
async fn method_fallback(method: Method) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    ApiError::MethodNotAllowed.into_response()
}

async fn endpoint_not_found() -> ApiError {
    ApiError::NotFound
}
