//! Request and Response models for the HTTP surface
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{
    AiRequest, InvalidateQuery, MetricsQuery, SetRequest, MAX_LESSON_ID_LENGTH, MAX_PROMPT_LENGTH,
};
pub use responses::{
    AiResponse, DeleteResponse, GetResponse, HealthResponse, InvalidateResponse,
    MetricsResponse, RateLimitErrorBody, SetResponse,
};
