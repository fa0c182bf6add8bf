//! Infrastructure layer - Backend implementations and process plumbing

pub mod cache;
pub mod logging;
pub mod services;
