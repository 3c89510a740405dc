pub mod collector;
pub mod completion;
pub mod config;
pub mod convert;
pub mod evaluator;
pub mod package_provider;
pub mod resume;
pub mod scope_provider;
pub mod server;
pub mod state;
#[cfg(any(test, feature = "test_support"))]
pub mod test_util;
