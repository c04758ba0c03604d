//! # Pinger Testing Utils
//!
//! Shared testing utilities for the workspace:
//!
//! - **Builders**: `TaskBuilder` with sensible defaults
//! - **Mocks**: `FlakyTaskStore` fault injection, `StaticExecutor` / `PanickingExecutor`
//! - **Helpers**: deterministic clocks, seeded in-memory stores, polling waits
//!
//! ```toml
//! [dev-dependencies]
//! pinger-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
