use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};

const SWAGGER_CSP: &str = "default-src 'self'; \
     script-src 'self' 'unsafe-inline'; \
     style-src 'self' 'unsafe-inline'; \
     img-src 'self' data:; \
     font-src 'self'; \
     connect-src 'self'";

const API_CSP: &str = "default-src 'none'; frame-ancestors 'none'";

fn is_swagger_route(path: &str) -> bool {
    path.starts_with("/docs") || path == "/.well-known/openapi.json"
}

/// Responses of these paths carry credentials and must never be cached.
fn carries_credentials(path: &str) -> bool {
    path.starts_with("/login/oauth/") || path == "/api/userinfo"
}

fn apply(headers: &mut HeaderMap, path: &str) {
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );

    if is_swagger_route(path) {
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(SWAGGER_CSP),
        );
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
    } else {
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(API_CSP),
        );
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    }

    if carries_credentials(path) {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    }
}

pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let mut response = next.run(req).await;
    apply(response.headers_mut(), &path);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_responses_are_not_cacheable() {
        let mut headers = HeaderMap::new();
        apply(&mut headers, "/login/oauth/access_token");
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    }

    #[test]
    fn public_documents_keep_their_caching() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=3600"),
        );
        apply(&mut headers, "/.well-known/jwks");
        assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=3600");
    }

    #[test]
    fn swagger_may_be_framed() {
        let mut headers = HeaderMap::new();
        apply(&mut headers, "/docs/index.html");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "SAMEORIGIN");
        assert_eq!(headers[header::CONTENT_SECURITY_POLICY], SWAGGER_CSP);
    }
}
