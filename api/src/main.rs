use std::net::SocketAddr;

use axum::Router;
use axum::http::Request;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod middleware;
mod pages;
mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "lifeline_api=info,lifeline_core=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let app = app(AppState::from_env());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%addr, error = %err, "failed to bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!("Lifeline gateway listening on {}", addr);

    if let Err(err) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!(error = %err, "server stopped");
        std::process::exit(1);
    }
}

fn app(state: AppState) -> Router {
    let gateway_path = state.page.form_action.clone();
    Router::new()
        .merge(routes::health::router())
        .merge(routes::confirm::router(&gateway_path))
        .fallback(routes::confirm::neutral)
        .layer(
            ServiceBuilder::new()
                // Spans carry the path only; the query holds link credentials.
                .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                    tracing::info_span!("request", method = %req.method(), path = %req.uri().path())
                }))
                .layer(axum::middleware::from_fn(middleware::security_headers::apply)),
        )
        .with_state(state)
}
