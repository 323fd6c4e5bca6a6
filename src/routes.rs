use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, Responder, guard, http::Method, web};

use crate::error::AppError;
use crate::registry::{RegisterTree, epoch_secs};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RegisterTree>,
    pub metrics_prefix: String,
    pub metrics_root: String,
}

impl AppState {
    pub fn api_scope(&self, base_path: &str) -> actix_web::Scope {
        web::scope(base_path)
            .service(
                web::resource("/metrics")
                    .route(web::get().to(metrics))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/api")
                    .route(web::get().to(rest_get))
                    .route(web::put().to(rest_put))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET, Method::PUT]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/api/{path:.*}")
                    .route(web::get().to(rest_get))
                    .route(web::put().to(rest_put))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET, Method::PUT]))
                            .to(method_not_allowed),
                    ),
            )
    }
}

async fn rest_get(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<impl Responder, AppError> {
    let path = register_path(&req);
    let id = state
        .registry
        .lookup(path)
        .ok_or_else(|| AppError::NotFound(path.to_string()))?;

    let body = state.registry.render_json(id, epoch_secs())?;
    Ok(web::Json(body))
}

async fn rest_put(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<impl Responder, AppError> {
    let path = register_path(&req);
    let id = state
        .registry
        .lookup(path)
        .ok_or_else(|| AppError::NotFound(path.to_string()))?;

    let text = std::str::from_utf8(&body)
        .map_err(|_| AppError::InvalidValue("payload must be valid UTF-8".into()))?;
    if text.trim().is_empty() {
        return Err(AppError::InvalidValue("empty payload".into()));
    }

    state.registry.apply_write(id, text, epoch_secs())?;
    Ok(HttpResponse::Ok())
}

async fn metrics(state: web::Data<AppState>) -> Result<impl Responder, AppError> {
    let id = state
        .registry
        .lookup(&state.metrics_root)
        .ok_or_else(|| AppError::NotFound(state.metrics_root.clone()))?;

    let text = state
        .registry
        .render_metrics(&state.metrics_prefix, id, epoch_secs())?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(text))
}

fn register_path<'a>(req: &'a HttpRequest) -> &'a str {
    req.match_info().get("path").unwrap_or("")
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().finish()
}

fn guard_not_methods(methods: &[Method]) -> impl guard::Guard {
    let allowed: Vec<Method> = methods.to_vec();
    guard::fn_guard(move |ctx| !allowed.iter().any(|m| m == ctx.head().method))
}
