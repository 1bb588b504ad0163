pub mod engine;
pub mod hash;
pub mod store;

pub use engine::{RegistryHandle, RegistrySnapshot};
