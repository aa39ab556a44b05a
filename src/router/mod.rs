//! Ordered storage for everything a request can be dispatched to.
//!
//! The registry is append-only: it is filled while the application is set up, then
//! frozen behind an `Arc` and only read while requests are served.

mod pattern;

pub use pattern::{Params, Pattern, WILDCARD};

use crate::error::PatternError;
use crate::handler::{BoxedErrorHandler, BoxedHandler, ErrorHandler, Handler};
use crate::http::Method;
use std::sync::Arc;

pub(crate) struct MiddlewareEntry {
    pub(crate) pattern: Pattern,
    pub(crate) task: BoxedHandler,
}

pub(crate) struct RouteEntry {
    /// `None` matches every method.
    pub(crate) method: Option<Method>,
    pub(crate) pattern: Pattern,
    pub(crate) task: BoxedHandler,
}

impl RouteEntry {
    pub(crate) fn accepts(&self, method: Method) -> bool {
        self.method.map_or(true, |m| m == method)
    }
}

pub(crate) struct ErrorEntry {
    pub(crate) code: String,
    pub(crate) task: BoxedErrorHandler,
}

#[derive(Default)]
pub struct Registry {
    pub(crate) middlewares: Vec<MiddlewareEntry>,
    pub(crate) routes: Vec<RouteEntry>,
    pub(crate) errors: Vec<ErrorEntry>,
    pub(crate) uncaught: Option<BoxedErrorHandler>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task for every path under `prefix`, whatever the method.
    pub fn add_middleware<H: Handler>(&mut self, prefix: &str, task: H) -> Result<(), PatternError> {
        let pattern = Pattern::compile(&format!("{}/*", trim(prefix)))?;
        self.middlewares.push(MiddlewareEntry {
            pattern,
            task: Arc::new(task),
        });
        Ok(())
    }

    pub fn add_route<H: Handler>(
        &mut self,
        method: Option<Method>,
        template: &str,
        task: H,
    ) -> Result<(), PatternError> {
        let pattern = Pattern::compile(trim(template))?;
        self.routes.push(RouteEntry {
            method,
            pattern,
            task: Arc::new(task),
        });
        Ok(())
    }

    pub fn add_error<H: ErrorHandler>(&mut self, code: &str, task: H) {
        self.errors.push(ErrorEntry {
            code: code.to_string(),
            task: Arc::new(task),
        });
    }

    /// Replaces any previously registered uncaught handler.
    pub fn set_uncaught<H: ErrorHandler>(&mut self, task: H) {
        self.uncaught = Some(Arc::new(task));
    }

    pub fn len(&self) -> usize {
        self.middlewares.len() + self.routes.len() + self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.uncaught.is_none()
    }
}

fn trim(path: &str) -> &str {
    path.strip_suffix('/').unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::error::Cause;

    async fn noop(_ctx: Context) {}
    async fn noop_error(_cause: Cause, _ctx: Context) {}

    #[test]
    fn middleware_matches_prefix() {
        let mut registry = Registry::new();
        registry.add_middleware("/user", noop).unwrap();
        registry.add_middleware("/", noop).unwrap();

        let user = &registry.middlewares[0].pattern;
        assert_eq!(user.template(), "/user/*");
        assert!(user.is_match("/user/"));
        assert!(user.is_match("/user/42/profile/"));
        assert!(!user.is_match("/users/"));

        let root = &registry.middlewares[1].pattern;
        assert_eq!(root.template(), "/*");
        assert!(root.is_match("/"));
        assert!(root.is_match("/anything/at/all/"));
    }

    #[test]
    fn routes_keep_registration_order() {
        let mut registry = Registry::new();
        registry.add_route(Some(Method::GET), "/greeting", noop).unwrap();
        registry.add_route(None, "/:uid", noop).unwrap();
        registry.add_route(Some(Method::PATCH), "/:uid/", noop).unwrap();

        let templates: Vec<&str> = registry.routes.iter().map(|r| r.pattern.template()).collect();
        assert_eq!(templates, ["/greeting", "/:uid", "/:uid"]);
        assert!(registry.routes[1].accepts(Method::DELETE));
        assert!(!registry.routes[0].accepts(Method::POST));
    }

    #[test]
    fn bad_templates_fail_at_registration() {
        let mut registry = Registry::new();
        assert!(registry.add_route(Some(Method::GET), "/a/:", noop).is_err());
        assert!(registry.add_middleware("/files/*/x", noop).is_err());
        assert!(registry.routes.is_empty());
        assert!(registry.middlewares.is_empty());
    }

    #[test]
    fn errors_and_uncaught() {
        let mut registry = Registry::new();
        assert!(registry.is_empty());
        registry.add_error("UID_NOT_FOUND", noop_error);
        registry.add_error("UID_NOT_FOUND", noop_error);
        registry.set_uncaught(noop_error);

        assert_eq!(registry.errors.len(), 2);
        assert!(registry.errors.iter().all(|e| e.code == "UID_NOT_FOUND"));
        assert!(registry.uncaught.is_some());
        assert_eq!(registry.len(), 2);
    }
}
