pub mod descriptor;
pub mod filter;
pub mod hydrator;

pub use filter::DeviceFilter;
pub use hydrator::{run_hydrator, Hydrator};
