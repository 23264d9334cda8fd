//! API Module
//!
//! HTTP handlers and routing.
//!
//! # Endpoints
//! - `GET /health` - Store reachability
//! - `GET /metrics` - Hit rate, top keys and footprint estimate
//! - `PUT /cache` - Store a JSON value
//! - `GET /cache/:key` - Retrieve a value by key
//! - `DELETE /cache/:key` - Delete a key
//! - `POST /invalidate/:entity/:id` - Purge the entity's cache families
//! - `POST /ai/:operation` - Rate-limited, cached AI call

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
