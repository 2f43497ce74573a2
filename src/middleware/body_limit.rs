// Body-size caps (§4.5 item 3): JSON/urlencoded payloads are capped at
// 10 KB, webhook raw bodies at 64 KB. Webhook routes apply their own,
// larger limit at the route level; this layer covers everything else.

use axum::extract::DefaultBodyLimit;

pub const API_BODY_LIMIT_BYTES: usize = 10 * 1024;
pub const WEBHOOK_BODY_LIMIT_BYTES: usize = 64 * 1024;

pub fn body_limit_layer() -> DefaultBodyLimit {
    DefaultBodyLimit::max(API_BODY_LIMIT_BYTES)
}

pub fn webhook_body_limit_layer() -> DefaultBodyLimit {
    DefaultBodyLimit::max(WEBHOOK_BODY_LIMIT_BYTES)
}
