//! Ready-made middleware.
//!
//! These are ordinary context tasks: register them with
//! [`Application::middleware`](crate::Application::middleware) under the prefix they
//! should guard. They only set pending headers, so they must run before the route
//! that commits the response.

mod security;

pub use security::{Cors, CorsConfig, SecurityConfig, SecurityHeaders};
