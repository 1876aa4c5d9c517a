pub mod types;

pub use types::Message;
