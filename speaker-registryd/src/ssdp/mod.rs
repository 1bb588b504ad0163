pub mod codec;
pub mod search;
pub mod transport;

pub use codec::Service;
pub use transport::TransportError;
