//! roster-watch daemon: fetch a faction roster, detect changes, and post
//! them to a chat webhook.

pub mod config;
pub mod error;
pub mod renderer;
pub mod sink;
pub mod source;
pub mod watcher;

pub use config::{resolve_data_file, Config, FetchConfig, WatchArgs};
pub use error::{ConfigError, CycleError, DeliveryError, FetchError, ParseError};
pub use sink::{DeliverySink, WebhookSink};
pub use source::{parse_roster, RosterSource, SnapshotSource};
pub use watcher::{CycleReport, Watcher};
