//! SQLite persistence and the incremental run cache for `fdtd-core`
//! simulations.

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod filter;
pub mod record;
pub mod schema;
pub mod store;

pub use cache::{CacheState, RunOutcome, SimulationCache};
pub use config::{DATA_DIR_ENV, DataLayout, RetryPolicy, StoreConfig};
pub use error::{CacheError, CodecError, Result, StoreError};
pub use filter::{CompareOp, Filter};
pub use record::ResultRecord;
pub use store::{RecordSummary, ResultStore};
