use crate::context::Context;
use crate::http::Method;
use futures::future::{ready, Ready};
use tracing::debug;

#[derive(Clone)]
pub struct SecurityConfig {
    pub hsts: bool,
    pub xss_protection: bool,
    pub content_type_options: bool,
    pub frame_options: Option<String>,
    pub content_security_policy: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            hsts: true,
            xss_protection: true,
            content_type_options: true,
            frame_options: Some("DENY".to_string()),
            content_security_policy: None,
        }
    }
}

/// Adds the configured security headers to whatever response the request ends with.
#[derive(Clone)]
pub struct SecurityHeaders {
    config: SecurityConfig,
}

impl SecurityHeaders {
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    pub fn apply(&self, ctx: Context) -> Ready<()> {
        let config = &self.config;
        if config.hsts {
            ctx.header("Strict-Transport-Security", "max-age=31536000");
        }
        if config.xss_protection {
            ctx.header("X-XSS-Protection", "1; mode=block");
        }
        if config.content_type_options {
            ctx.header("X-Content-Type-Options", "nosniff");
        }
        if let Some(frame_options) = &config.frame_options {
            ctx.header("X-Frame-Options", frame_options.as_str());
        }
        if let Some(policy) = &config.content_security_policy {
            ctx.header("Content-Security-Policy", policy.as_str());
        }
        ready(())
    }
}

#[derive(Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age: Option<u32>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
            allow_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"].map(String::from).to_vec(),
            allow_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
            allow_credentials: false,
            max_age: Some(86400),
        }
    }
}

/// CORS headers for ordinary requests; a preflight `OPTIONS` request is answered
/// with `204` and ends there.
#[derive(Clone)]
pub struct Cors {
    config: CorsConfig,
}

impl Cors {
    pub fn new(config: CorsConfig) -> Self {
        Self { config }
    }

    fn allows(&self, origin: &str) -> bool {
        self.config.allow_origins.iter().any(|allowed| allowed == "*" || allowed == origin)
    }

    pub fn apply(&self, ctx: Context) -> Ready<()> {
        let config = &self.config;
        if let Some(origin) = ctx.request().header("origin") {
            if self.allows(origin) {
                ctx.header("Access-Control-Allow-Origin", origin);
            }
        }
        if config.allow_credentials {
            ctx.header("Access-Control-Allow-Credentials", "true");
        }

        if ctx.request().method() == Method::OPTIONS {
            ctx.header("Access-Control-Allow-Methods", config.allow_methods.join(", "));
            ctx.header("Access-Control-Allow-Headers", config.allow_headers.join(", "));
            if let Some(max_age) = config.max_age {
                ctx.header("Access-Control-Max-Age", max_age.to_string());
            }
            debug!(path = ctx.request().path(), "answering CORS preflight");
            ctx.status(204).end();
        }
        ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Request, ResponseRecorder};

    #[tokio::test]
    async fn security_headers_are_pending_until_commit() {
        let recorder = ResponseRecorder::new();
        let ctx = Context::new(Request::new(Method::GET, "/"), recorder.clone());
        SecurityHeaders::new(SecurityConfig::default()).apply(ctx.clone()).await;
        assert_eq!(recorder.write_count(), 0);

        ctx.text("ok");
        let response = recorder.response().unwrap();
        assert_eq!(response.header("x-frame-options"), Some("DENY"));
        assert_eq!(response.header("x-content-type-options"), Some("nosniff"));
        assert_eq!(response.header("content-security-policy"), None);
    }

    #[tokio::test]
    async fn preflight_ends_the_request() {
        let recorder = ResponseRecorder::new();
        let request = Request::new(Method::OPTIONS, "/api").with_header("Origin", "https://a.example");
        let ctx = Context::new(request, recorder.clone());
        Cors::new(CorsConfig::default()).apply(ctx.clone()).await;

        assert!(ctx.is_ended());
        let response = recorder.response().unwrap();
        assert_eq!(response.status, 204);
        assert_eq!(response.header("access-control-allow-origin"), Some("https://a.example"));
        assert_eq!(response.header("access-control-max-age"), Some("86400"));
    }

    #[tokio::test]
    async fn disallowed_origin_gets_no_header() {
        let recorder = ResponseRecorder::new();
        let request = Request::new(Method::GET, "/").with_header("Origin", "https://evil.example");
        let ctx = Context::new(request, recorder.clone());
        let cors = Cors::new(CorsConfig {
            allow_origins: vec!["https://a.example".to_string()],
            ..CorsConfig::default()
        });
        cors.apply(ctx.clone()).await;
        assert!(!ctx.is_ended());

        ctx.end();
        assert_eq!(recorder.response().unwrap().header("access-control-allow-origin"), None);
    }
}
