//! Config-driven preprocessing and visual sanity checks for BIDS EEG datasets.
//!
//! Signal processing itself happens behind [`SignalBackend`]: either an
//! external bridge process ([`BridgeBackend`]) or the in-memory
//! [`DryRunBackend`].

pub mod backend;
pub mod bids;
pub mod bridge;
pub mod config;
pub mod dry_run;
pub mod error;
pub mod loader;
pub mod manager;
pub mod paths;
pub mod preprocess;
pub mod psd;
pub mod timing;
pub mod visualize;

pub use backend::SignalBackend;
pub use bids::BidsPath;
pub use bridge::{find_bridge, BridgeBackend};
pub use config::Config;
pub use dry_run::DryRunBackend;
pub use error::{BidciError, ConfigError, Result};
pub use loader::{BidsDataLoader, LoadedRecording};
pub use manager::{DatasetManager, PipelineReport};
