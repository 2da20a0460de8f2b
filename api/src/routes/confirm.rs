use axum::Router;
use axum::extract::{Request, State};
use axum::http::Method;
use axum::response::Html;
use axum::routing::any;
use chrono::Utc;

use lifeline_core::gateway::{GatewayRequest, GatewayResponse, Method as GatewayMethod};
use lifeline_core::messages::LinkAction;

use crate::middleware::rate_limit::client_key;
use crate::pages;
use crate::state::AppState;

/// Form bodies only ever carry `a`, `id`, and `sig`.
const MAX_FORM_BYTES: usize = 4 * 1024;

pub fn router(path: &str) -> Router<AppState> {
    Router::new().route(path, any(handle))
}

/// Everything that is not a gateway link or `/health`.
pub async fn neutral(State(state): State<AppState>) -> Html<String> {
    pages::render(&GatewayResponse::Neutral, &state.page)
}

/// Link credentials from the query string or a form body. Accepts both
/// `?confirm&id=..` and `?a=confirm&id=..`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct LinkParams {
    action: Option<LinkAction>,
    id: String,
    sig: String,
}

impl LinkParams {
    fn parse(input: &[u8]) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(input) {
            match key.as_ref() {
                "id" => params.id = value.into_owned(),
                "sig" => params.sig = value.into_owned(),
                "a" => params.action = LinkAction::parse(&value),
                bare if value.is_empty() => {
                    if let Some(action) = LinkAction::parse(bare) {
                        params.action = Some(action);
                    }
                }
                _ => {}
            }
        }
        params
    }

    /// Fields present in `other` win.
    fn merge(&mut self, other: LinkParams) {
        if other.action.is_some() {
            self.action = other.action;
        }
        if !other.id.is_empty() {
            self.id = other.id;
        }
        if !other.sig.is_empty() {
            self.sig = other.sig;
        }
    }
}

fn gateway_method(method: &Method) -> GatewayMethod {
    match *method {
        Method::GET => GatewayMethod::Get,
        Method::HEAD => GatewayMethod::Head,
        Method::POST => GatewayMethod::Post,
        _ => GatewayMethod::Other,
    }
}

async fn handle(State(state): State<AppState>, req: Request) -> Html<String> {
    let client = client_key(&req, state.trust_forwarded);
    let method = gateway_method(req.method());
    let mut params = LinkParams::parse(req.uri().query().unwrap_or_default().as_bytes());

    if method == GatewayMethod::Post {
        match axum::body::to_bytes(req.into_body(), MAX_FORM_BYTES).await {
            Ok(body) => params.merge(LinkParams::parse(&body)),
            Err(err) => tracing::debug!(client = %client, error = %err, "unreadable form body"),
        }
    }

    let Some(gateway) = state.gateway.clone() else {
        return pages::render(&GatewayResponse::Neutral, &state.page);
    };

    let now = Utc::now().timestamp();
    let response = tokio::task::spawn_blocking(move || {
        gateway.handle(
            &GatewayRequest {
                action: params.action,
                id: &params.id,
                sig: &params.sig,
                method,
                client: &client,
            },
            now,
        )
    })
    .await
    .unwrap_or_else(|err| {
        tracing::error!(error = %err, "gateway task failed");
        GatewayResponse::Neutral
    });

    pages::render(&response, &state.page)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use lifeline_core::notify::LogNotifier;
    use lifeline_core::token::Token;
    use tower::ServiceExt;

    use super::*;
    use crate::state::tests::test_config;

    fn app(state: AppState) -> Router {
        router("/check").fallback(neutral).with_state(state)
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, String) {
        let response = app(state.clone())
            .oneshot(request)
            .await
            .expect("request should succeed");
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        (status, String::from_utf8(body.to_vec()).expect("utf-8 page"))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request should build")
    }

    fn post_form(uri: &str, form: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .expect("request should build")
    }

    fn initialised(dir: &std::path::Path) -> (AppState, Token) {
        let state = AppState::from_config(test_config(dir));
        let switch = state.gateway.as_ref().expect("gateway").switch();
        switch
            .tick(&LogNotifier, Utc::now().timestamp())
            .expect("tick");
        let token = switch
            .store()
            .load()
            .and_then(|s| s.confirm_token)
            .expect("confirm token");
        (state, token)
    }

    #[test]
    fn params_accept_bare_and_named_action() {
        let bare = LinkParams::parse(b"confirm&id=abc&sig=def");
        assert_eq!(bare.action, Some(LinkAction::Confirm));
        assert_eq!(bare.id, "abc");
        assert_eq!(bare.sig, "def");

        let named = LinkParams::parse(b"a=ack&id=abc&sig=def");
        assert_eq!(named.action, Some(LinkAction::Ack));

        let unknown = LinkParams::parse(b"a=delete&id=abc");
        assert_eq!(unknown.action, None);
    }

    #[tokio::test]
    async fn get_link_returns_prompt_without_confirming() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (state, token) = initialised(dir.path());

        let (status, page) = send(
            &state,
            get(&format!("/check?confirm&id={}&sig={}", token.id, token.sig)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(page.contains(r#"<form method="POST" action="/check">"#));

        let stored = state
            .gateway
            .as_ref()
            .expect("gateway")
            .switch()
            .store()
            .load()
            .expect("state");
        assert_eq!(stored.last_confirm_at, 0);
    }

    #[tokio::test]
    async fn posted_prompt_form_confirms() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (state, token) = initialised(dir.path());

        let (status, page) = send(
            &state,
            post_form("/check", format!("a=confirm&id={}&sig={}", token.id, token.sig)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(page.contains("Your check-in was recorded."));

        let stored = state
            .gateway
            .as_ref()
            .expect("gateway")
            .switch()
            .store()
            .load()
            .expect("state");
        assert!(stored.last_confirm_at > 0);
        assert_ne!(stored.confirm_token, Some(token));
    }

    #[tokio::test]
    async fn bad_links_are_indistinguishable_from_unknown_pages() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (state, _) = initialised(dir.path());

        let (_, unknown) = send(&state, get("/anything")).await;
        let (status, forged) = send(
            &state,
            post_form(
                "/check",
                format!("a=confirm&id={}&sig={}", "ab".repeat(16), "cd".repeat(32)),
            ),
        )
        .await;
        let (_, empty) = send(&state, get("/check")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(forged, unknown);
        assert_eq!(empty, unknown);
    }

    #[tokio::test]
    async fn degraded_gateway_is_always_neutral() {
        let state = AppState::degraded();
        let (status, page) = send(&state, get("/?confirm&id=abc&sig=def")).await;
        assert_eq!(status, StatusCode::OK);
        let (_, unknown) = send(&state, get("/anything")).await;
        assert_eq!(page, unknown);
    }
}
