pub mod config;
pub mod error;
pub mod session;
pub mod source_lookup;

pub use config::DownloadConfig;
pub use error::DownloadError;
pub use session::{download_file, DownloadOutcome};
pub use source_lookup::fetch_sources;

#[cfg(test)]
mod tests;
