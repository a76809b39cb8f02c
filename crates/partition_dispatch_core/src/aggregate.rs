use crate::contract::{DispatchOutcome, OverallStatus, PartitionResult};

pub fn aggregate(outcomes: impl IntoIterator<Item = DispatchOutcome>) -> PartitionResult {
    let mut batches_dispatched = 0usize;
    let mut records_scanned = 0usize;
    let mut failed_batches = Vec::new();

    for outcome in outcomes {
        batches_dispatched += 1;
        records_scanned += outcome.record_count;
        if outcome.is_failed() {
            failed_batches.push(outcome);
        }
    }

    // Outcomes arrive in completion order.
    failed_batches.sort_by_key(|outcome| outcome.sequence_number);

    let overall_status = if failed_batches.is_empty() {
        OverallStatus::Complete
    } else {
        OverallStatus::PartialCompletion
    };

    PartitionResult {
        batches_dispatched,
        records_scanned,
        failed_batches,
        overall_status,
    }
}
