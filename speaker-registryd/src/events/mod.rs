pub mod listener;

pub use listener::EventListener;
