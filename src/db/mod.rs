pub mod connection;
pub mod credentials;

pub use connection::*;
pub use credentials::SurrealCredentialStore;
