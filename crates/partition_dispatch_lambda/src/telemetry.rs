use tracing::Span;
use tracing_subscriber::EnvFilter;

use crate::runtime::contract::PartitionQuery;

/// JSON logs on stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .try_init()
}

pub fn partition_span(parent: &Span, query: &PartitionQuery) -> Span {
    tracing::info_span!(
        parent: parent,
        "partition",
        contest_id = query.contest_id(),
        selection_id = query.selection_id(),
        partition_id = query.partition_id()
    )
}

pub fn batch_span(parent: &Span, query: &PartitionQuery, batch_number: usize) -> Span {
    tracing::info_span!(
        parent: parent,
        "batch",
        contest_id = query.contest_id(),
        selection_id = query.selection_id(),
        partition_id = query.partition_id(),
        batch_number
    )
}
