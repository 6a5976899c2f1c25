pub mod backend;
pub mod config;
pub mod edits;
pub mod engine;
pub mod logging;
pub mod persist;
pub mod protocol;
pub mod trim;
pub mod types;
pub mod util;

#[cfg(test)]
pub mod test_support;
