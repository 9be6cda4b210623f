//! Facade crate over `engine-core` and `engine-http`.
//!
//! ```ignore
//! use engine::prelude::*;
//! ```

pub use engine_core;
pub use engine_http;

pub use engine_core::*;

/// Unified prelude — import everything with `use engine::prelude::*`.
pub mod prelude {
    pub use engine_core::prelude::*;
}
