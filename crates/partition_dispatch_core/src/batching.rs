use std::mem;

use crate::contract::{Record, ValidationError};

#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    sequence_number: usize,
    records: Vec<Record>,
}

impl Batch {
    pub fn sequence_number(&self) -> usize {
        self.sequence_number
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Groups a record stream into batches of `max_batch_size`.
///
/// A batch is emitted the moment it fills, so callers can hand it off while
/// the scan is still running. Only the trailing batch returned by [`flush`]
/// may be smaller than the maximum.
///
/// [`flush`]: Batcher::flush
#[derive(Debug)]
pub struct Batcher {
    max_batch_size: usize,
    pending: Vec<Record>,
    next_sequence_number: usize,
}

impl Batcher {
    pub fn new(max_batch_size: usize) -> Result<Self, ValidationError> {
        if max_batch_size == 0 {
            return Err(ValidationError::new(
                "max_batch_size must be a positive integer",
            ));
        }

        Ok(Self {
            max_batch_size,
            pending: Vec::with_capacity(max_batch_size),
            next_sequence_number: 0,
        })
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Number of batches emitted so far.
    pub fn emitted(&self) -> usize {
        self.next_sequence_number
    }

    pub fn accept(&mut self, record: Record) -> Option<Batch> {
        self.pending.push(record);
        if self.pending.len() < self.max_batch_size {
            return None;
        }
        Some(self.emit())
    }

    pub fn flush(&mut self) -> Option<Batch> {
        if self.pending.is_empty() {
            return None;
        }
        Some(self.emit())
    }

    fn emit(&mut self) -> Batch {
        let records = mem::replace(&mut self.pending, Vec::with_capacity(self.max_batch_size));
        let batch = Batch {
            sequence_number: self.next_sequence_number,
            records,
        };
        self.next_sequence_number += 1;
        batch
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn record(index: usize) -> Record {
        let mut record = Record::new();
        record.insert("userId".to_string(), Value::from(format!("user-{index}")));
        record
    }

    fn run(total_records: usize, max_batch_size: usize) -> Vec<Batch> {
        let mut batcher = Batcher::new(max_batch_size).expect("batcher should build");
        let mut batches = Vec::new();
        for index in 0..total_records {
            if let Some(batch) = batcher.accept(record(index)) {
                batches.push(batch);
            }
        }
        batches.extend(batcher.flush());
        batches
    }

    #[test]
    fn splits_85_records_into_40_40_5() {
        let batches = run(85, 40);

        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        let sequence_numbers: Vec<usize> = batches.iter().map(Batch::sequence_number).collect();
        assert_eq!(sizes, vec![40, 40, 5]);
        assert_eq!(sequence_numbers, vec![0, 1, 2]);
    }

    #[test]
    fn zero_records_produce_zero_batches() {
        assert!(run(0, 40).is_empty());
    }

    #[test]
    fn exact_multiple_has_no_trailing_batch() {
        let batches = run(80, 40);
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|batch| batch.len() == 40));
    }

    #[test]
    fn batch_counts_cover_every_record_in_order() {
        for (total, max) in [(1, 1), (7, 3), (39, 40), (41, 40), (100, 7)] {
            let batches = run(total, max);

            assert_eq!(batches.len(), total.div_ceil(max));
            assert_eq!(batches.iter().map(Batch::len).sum::<usize>(), total);
            let (last, full) = batches.split_last().expect("at least one batch");
            assert!(full.iter().all(|batch| batch.len() == max));
            assert!((1..=max).contains(&last.len()));

            let ids: Vec<Value> = batches
                .iter()
                .flat_map(|batch| batch.records().iter())
                .map(|record| record["userId"].clone())
                .collect();
            let expected: Vec<Value> = (0..total)
                .map(|index| Value::from(format!("user-{index}")))
                .collect();
            assert_eq!(ids, expected);
        }
    }

    #[test]
    fn emits_full_batch_before_flush() {
        let mut batcher = Batcher::new(2).expect("batcher should build");
        assert!(batcher.accept(record(0)).is_none());
        let batch = batcher.accept(record(1)).expect("second record fills the batch");

        assert_eq!(batch.sequence_number(), 0);
        assert_eq!(batcher.emitted(), 1);
        assert!(batcher.flush().is_none());
    }

    #[test]
    fn rejects_zero_batch_size() {
        let error = Batcher::new(0).expect_err("zero size should fail");
        assert_eq!(error.message(), "max_batch_size must be a positive integer");
    }
}
