use axum::{
    http::{header, HeaderValue},
    middleware,
    response::Response,
    Router,
};

use crate::{Config, Ingestor, ReadingStore};

mod buoys;
mod errors;
mod health;
mod ingest;

// ---

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState<S> {
    pub store: S,
    pub ingestor: Ingestor<S>,
}

pub fn router<S: ReadingStore>(store: S, config: &Config) -> Router {
    // ---
    let state = AppState {
        ingestor: Ingestor::new(store.clone(), config.api_key.as_str()),
        store,
    };

    Router::new()
        .merge(ingest::router::<S>())
        .merge(buoys::router::<S>())
        .merge(health::router())
        .with_state(state)
        .layer(middleware::map_response(add_cors_headers))
}

/// Permissive CORS, attached to every routed response.
async fn add_cors_headers(mut response: Response) -> Response {
    // ---
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

#[cfg(test)]
pub(crate) fn test_config(api_key: &str) -> Config {
    Config {
        db_url: None,
        db_pool_max: 1,
        api_key: api_key.to_string(),
        server_port: 0,
    }
}
