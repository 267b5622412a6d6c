pub mod connection;

pub use connection::{ConnectionWrapper, LspConnection};
