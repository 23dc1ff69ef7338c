//! Test utilities.
//!
//! This module provides shared helpers for unit and integration tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - Lab executor constructors
//! - Assertion macros that log before asserting
//!
//! # Example
//! ```
//! use tether::test_utils::{init_test_logging, lab_context};
//!
//! init_test_logging();
//! let (lab, context) = lab_context();
//! context.executor().post(|| {});
//! assert_eq!(lab.run_until_idle(), 1);
//! ```

use crate::context::Context;
use crate::lab::{LabConfig, LabExecutor};

#[cfg(feature = "tracing-integration")]
static INIT_LOGGING: std::sync::Once = std::sync::Once::new();

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
#[cfg(feature = "tracing-integration")]
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Initialize test logging. Does nothing without `tracing-integration`.
#[cfg(not(feature = "tracing-integration"))]
pub fn init_test_logging() {}

/// A lab executor and a context scheduled on it, the standard fixture
/// for deterministic tests.
#[must_use]
pub fn lab_context() -> (LabExecutor, Context) {
    let lab = LabExecutor::new();
    let context = Context::new(lab.handle());
    (lab, context)
}

/// Like [`lab_context`], with explicit lab configuration.
#[must_use]
pub fn lab_context_with(config: LabConfig) -> (LabExecutor, Context) {
    let lab = LabExecutor::with_config(config);
    let context = Context::new(lab.handle());
    (lab, context)
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        $crate::tracing_compat::info!(phase = %$name, "========================================");
        $crate::tracing_compat::info!(phase = %$name, "TEST PHASE: {}", $name);
        $crate::tracing_compat::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        $crate::tracing_compat::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        $crate::tracing_compat::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        $crate::tracing_compat::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        $crate::tracing_compat::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
