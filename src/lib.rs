mod config;
mod controller;
mod epoch;
mod errors;
mod filter;
mod merger;
mod models;
mod transport;
mod variants;

pub use crate::config::ControllerConfig;
pub use crate::controller::{DispatchTicket, QueryController};
pub use crate::epoch::QueryEpoch;
pub use crate::errors::{ControllerError, ControllerResult};
pub use crate::filter::compile_filter;
pub use crate::merger::{DuplicatePolicy, MergeOutcome, ResultCollection, ResultMerger};
pub use crate::models::{
    ControllerEvent, EventEnvelope, Item, ItemKind, Origin, PaginationWindow, PatchResponse,
    QueryParams, QueryResponse, RequestMethod, RequestSpec, RowAction, SortSpec,
};
pub use crate::transport::{RemoteFeed, Transport, TransportFuture};
pub use crate::variants::{column_to_attribute, QueryTarget};

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Installs JSON logging into `log_dir/controller.log.<date>`. `RUST_LOG`
/// overrides the default `info` filter.
pub fn init_tracing(log_dir: &Path) -> ControllerResult<()> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "controller.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| ControllerError::Config(error.to_string()))
}
