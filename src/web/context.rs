use std::{convert::Infallible, net::SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};

use crate::{models::RequestContext, utils::state::AppState};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn peer_ip(parts: &Parts) -> Option<String> {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// The socket peer, unless the service sits behind a trusted proxy. Then the
/// last `x-forwarded-for` hop (the one the proxy appended) wins, then
/// `x-real-ip`. Earlier hops are client supplied and ignored.
fn client_ip(parts: &Parts, trust_proxy: bool) -> String {
    let forwarded = || {
        header_str(&parts.headers, "x-forwarded-for")
            .and_then(|value| value.rsplit(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .or_else(|| header_str(&parts.headers, "x-real-ip"))
            .map(str::to_string)
    };

    trust_proxy
        .then(forwarded)
        .flatten()
        .or_else(|| peer_ip(parts))
        .unwrap_or_else(|| "unknown".to_string())
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let request_id = header_str(headers, REQUEST_ID_HEADER)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(RequestContext {
            request_id,
            client_ip: client_ip(parts, state.config.server.trust_proxy),
            referrer: header_str(headers, header::REFERER.as_str()).map(str::to_string),
            user_agent: header_str(headers, header::USER_AGENT.as_str()).map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_config, TestApp};
    use axum::http::Request;

    fn peer(request: &mut Request<()>, ip: [u8; 4]) {
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((ip, 4000))));
    }

    async fn extract(request: Request<()>, trust_proxy: bool) -> RequestContext {
        let mut config = test_config();
        config.server.trust_proxy = trust_proxy;
        let app = TestApp::with_config(config);
        let (mut parts, _) = request.into_parts();
        RequestContext::from_request_parts(&mut parts, &app.state)
            .await
            .unwrap()
    }

    fn forwarded_request() -> Request<()> {
        let mut request = Request::builder()
            .header("x-request-id", "req-42")
            .header("x-forwarded-for", "198.51.100.1, 203.0.113.9")
            .header("x-real-ip", "10.0.0.2")
            .header("referer", "https://site.test/blog")
            .header("user-agent", "curl/8")
            .body(())
            .unwrap();
        peer(&mut request, [10, 0, 0, 1]);
        request
    }

    #[tokio::test]
    async fn test_ignores_forwarding_headers_by_default() {
        let ctx = extract(forwarded_request(), false).await;
        assert_eq!(ctx.request_id, "req-42");
        assert_eq!(ctx.client_ip, "10.0.0.1");
        assert_eq!(ctx.referrer.as_deref(), Some("https://site.test/blog"));
        assert_eq!(ctx.user_agent.as_deref(), Some("curl/8"));
    }

    #[tokio::test]
    async fn test_trusted_proxy_uses_last_forwarded_hop() {
        let ctx = extract(forwarded_request(), true).await;
        assert_eq!(ctx.client_ip, "203.0.113.9");
    }

    #[tokio::test]
    async fn test_trusted_proxy_falls_back_to_real_ip_then_peer() {
        let mut request = Request::builder()
            .header("x-real-ip", "10.0.0.2")
            .body(())
            .unwrap();
        peer(&mut request, [192, 0, 2, 1]);
        assert_eq!(extract(request, true).await.client_ip, "10.0.0.2");

        let mut request = Request::builder().body(()).unwrap();
        peer(&mut request, [192, 0, 2, 1]);
        let ctx = extract(request, true).await;
        assert_eq!(ctx.client_ip, "192.0.2.1");
        assert!(!ctx.request_id.is_empty());
    }

    #[tokio::test]
    async fn test_missing_everything() {
        let ctx = extract(Request::builder().body(()).unwrap(), false).await;
        assert_eq!(ctx.client_ip, "unknown");
        assert!(ctx.referrer.is_none());
    }
}
