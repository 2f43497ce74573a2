// Request-gating middleware chain (§4.5).

pub mod auth;
pub mod automation;
pub mod body_limit;
pub mod cors;
pub mod csrf;
pub mod object_id;
pub mod proto_pollution;
pub mod security_headers;

pub use auth::{auth_middleware, AuthenticatedUser};
pub use automation::automation_guard;
pub use body_limit::body_limit_layer;
pub use cors::dynamic_cors_middleware;
pub use csrf::csrf_guard;
pub use object_id::validate_object_id;
pub use proto_pollution::proto_pollution_guard;
pub use security_headers::security_headers_layer;
