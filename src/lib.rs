//! Class loading and linking for a JVM: class file parsing, class path search, the runtime class
//! model and a class loader that drives classes from loading to initialization.

pub mod class;
pub mod config;
pub mod consts;
pub mod descriptor;
pub mod error;
pub mod runtime;
pub mod search;

#[cfg(test)]
mod test_support;

pub use config::LoaderConfig;
pub use error::LoadError;
pub use runtime::{ClassLoader, ClassObject, RuntimeClass};
