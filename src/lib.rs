pub mod config;
pub mod envfile;
pub mod init;
pub mod output;
pub mod probe;
pub mod providers;
pub mod redact;
pub mod scan;

// Re-export the types the binary and integration tests touch most.
pub use providers::{KeyShape, ProviderSpec};
pub use scan::{KeyStatus, ScanReport};
