//! Response construction re-exports.

pub use axum::response::{IntoResponse, Response};
