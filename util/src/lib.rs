pub mod archive_guard;
pub mod config;
pub mod grading_config;
pub mod paths;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
