pub mod rate_limit;
pub mod tenant_boundary;

use axum::http::HeaderMap;

use crate::types::RequestMeta;

/// Pull the audit-relevant request metadata out of the headers. Behind the
/// load balancer the client address arrives in X-Forwarded-For.
pub fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    RequestMeta { ip, user_agent }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("10.1.2.3, 172.16.0.1"),
        );
        headers.insert("user-agent", HeaderValue::from_static("sitework-web/4.2"));

        let meta = request_meta(&headers);
        assert_eq!(meta.ip.as_deref(), Some("10.1.2.3"));
        assert_eq!(meta.user_agent.as_deref(), Some("sitework-web/4.2"));
    }

    #[test]
    fn missing_headers_stay_none() {
        let meta = request_meta(&HeaderMap::new());
        assert!(meta.ip.is_none());
        assert!(meta.user_agent.is_none());
    }
}
