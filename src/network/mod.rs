pub mod client;
pub mod error;
pub mod protocol;
pub mod transport;

pub use client::ChatService;
