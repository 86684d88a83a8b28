//! seasky-core: framing, decoding and track fusion for aircraft and ship
//! surveillance feeds.
//!
//! No async and no sockets. File I/O is limited to the persisted track store,
//! the config file and the reference-data file. The `seasky-server` crate
//! owns transports, scheduling and HTTP.

pub mod ais;
pub mod beast;
pub mod config;
pub mod cpr;
pub mod crc;
pub mod decode;
pub mod frame;
pub mod lines;
pub mod liveness;
pub mod merge;
pub mod reference;
pub mod snapshot;
pub mod table;
pub mod track;
pub mod types;

// Re-export commonly used types at crate root
pub use beast::BeastFramer;
pub use decode::decode;
pub use frame::{parse_frame, parse_frame_uncached, KnownAddresses, ModeFrame};
pub use lines::LineFramer;
pub use liveness::{LivenessRegistry, SourceLiveness, SourceStatus};
pub use merge::{AisMerger, MergeOutcome, ModeSMerger};
pub use table::{TableSettings, TrackTable};
pub use track::{Track, TrackType};
pub use types::*;
