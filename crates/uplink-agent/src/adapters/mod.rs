//! # Adapters
//!
//! Concrete implementations of the outbound ports.
//!
//! | Adapter | Port |
//! |---------|------|
//! | [`WsLinkConnector`] | `LinkConnector` (WebSocket) |
//! | [`MemoryConnector`] | `LinkConnector` (in-process channels) |
//! | [`HttpArchiveFetcher`] | `ArchiveFetcher` |
//! | [`ZipExtractor`] | `ArchiveExtractor` |
//! | [`TokioFs`] | `LocalFs` |
//! | [`HomeCredentialStore`] | `CredentialStore` |

pub mod config_file;
pub mod credentials;
pub mod fs;
pub mod http_fetcher;
pub mod memory_link;
pub mod ws_link;
pub mod zip_extractor;

pub use config_file::load_config;
pub use credentials::HomeCredentialStore;
pub use fs::TokioFs;
pub use http_fetcher::HttpArchiveFetcher;
pub use memory_link::{MemoryConnector, OutboundFrame, PeerEnd};
pub use ws_link::WsLinkConnector;
pub use zip_extractor::ZipExtractor;
