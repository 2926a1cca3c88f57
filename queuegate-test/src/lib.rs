//! Test utilities for queuegate
//!
//! Provides helpers for testing synthesized stacks:
//! - Assertions over a synthesized template (counts, property subsets)
//! - Throwaway function code directories
//! - Log output routed through the test harness
//!
//! ## Usage
//!
//! ```rust,no_run
//! use queuegate_test::{CodeDir, TemplateAssertions};
//! # fn synth(_: &std::path::Path) -> queuegate_template::Template { unimplemented!() }
//!
//! let code = CodeDir::python_handler();
//! let template = synth(code.path());
//!
//! let assert = TemplateAssertions::new(&template);
//! assert.resource_count_is("AWS::SQS::Queue", 1);
//! let visibility = serde_json::json!({"VisibilityTimeout": 300});
//! assert.has_resource_properties("AWS::SQS::Queue", &visibility);
//! ```

pub mod assertions;
pub mod fixtures;

pub use assertions::TemplateAssertions;
pub use fixtures::CodeDir;

/// Route `tracing` output through the test harness; safe to call from every test
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "queuegate=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
