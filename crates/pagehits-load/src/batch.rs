//! Fixed-stride batches over a partition

use pagehits_common::types::Record;

use crate::partition::Partition;

/// Up to `batch_size` consecutive records of one partition.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    /// Index of the first record in the full record set
    pub offset: usize,
    pub records: &'a [Record],
}

impl<'a> Batch<'a> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Batch content as JSON, for diagnosing failed writes.
    pub fn payload(&self) -> String {
        serde_json::to_string(self.records).unwrap_or_else(|e| format!("<unserializable: {}>", e))
    }
}

/// Iterate `partition` of `records` in strides of `batch_size`.
///
/// Every batch holds between 1 and `batch_size` records; only the last one
/// can be short. An empty partition yields nothing.
pub fn batches<'a>(
    records: &'a [Record],
    partition: Partition,
    batch_size: usize,
) -> impl Iterator<Item = Batch<'a>> + 'a {
    let batch_size = batch_size.max(1);
    let start = partition.start;
    records[partition.range()]
        .chunks(batch_size)
        .enumerate()
        .map(move |(i, chunk)| Batch {
            offset: start + i * batch_size,
            records: chunk,
        })
}

/// Like [`batches`], but no batch crosses a multiple of `segment_len`
/// counted from the partition start.
///
/// Every segment is striped independently, so a segment whose length is not a
/// multiple of `batch_size` ends in a short batch.
pub fn segmented_batches<'a>(
    records: &'a [Record],
    partition: Partition,
    batch_size: usize,
    segment_len: usize,
) -> impl Iterator<Item = Batch<'a>> + 'a {
    let segment_len = segment_len.max(1);
    partition.range().step_by(segment_len).flat_map(move |start| {
        let segment = Partition {
            index: partition.index,
            start,
            end: start.saturating_add(segment_len).min(partition.end),
        };
        batches(records, segment, batch_size)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::new("en", format!("Page_{}", i), i as i64, 100))
            .collect()
    }

    #[test]
    fn test_short_final_batch() {
        let records = records(40);
        let partition = Partition { index: 1, start: 10, end: 35 };

        let sizes: Vec<usize> = batches(&records, partition, 10).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);

        let offsets: Vec<usize> = batches(&records, partition, 10).map(|b| b.offset).collect();
        assert_eq!(offsets, vec![10, 20, 30]);
    }

    #[test]
    fn test_never_reads_past_partition_end() {
        let records = records(40);
        let partition = Partition { index: 0, start: 0, end: 25 };

        let last = batches(&records, partition, 10).last().unwrap();
        assert_eq!(last.records.last().unwrap().page, "Page_24");
    }

    #[test]
    fn test_empty_partition() {
        let records = records(5);
        let partition = Partition { index: 3, start: 0, end: 0 };
        assert_eq!(batches(&records, partition, 10).count(), 0);
    }

    #[test]
    fn test_segments_cut_batches_at_boundaries() {
        let records = records(30);
        let partition = Partition { index: 0, start: 5, end: 30 };

        let offsets: Vec<usize> = segmented_batches(&records, partition, 3, 10)
            .map(|b| b.offset)
            .collect();
        assert_eq!(offsets, vec![5, 8, 11, 14, 15, 18, 21, 24, 25, 28]);

        let sizes: Vec<usize> = segmented_batches(&records, partition, 3, 10)
            .map(|b| b.len())
            .collect();
        assert_eq!(sizes, vec![3, 3, 3, 1, 3, 3, 3, 1, 3, 2]);
    }

    #[test]
    fn test_unbounded_segment_matches_plain_batches() {
        let records = records(40);
        let partition = Partition { index: 2, start: 7, end: 40 };

        let plain: Vec<usize> = batches(&records, partition, 10).map(|b| b.offset).collect();
        let segmented: Vec<usize> = segmented_batches(&records, partition, 10, usize::MAX)
            .map(|b| b.offset)
            .collect();
        assert_eq!(plain, segmented);
    }

    #[test]
    fn test_payload_contains_records() {
        let records = records(2);
        let partition = Partition { index: 0, start: 0, end: 2 };
        let batch = batches(&records, partition, 10).next().unwrap();

        let payload = batch.payload();
        assert!(payload.contains("Page_0"));
        assert!(payload.contains("Page_1"));
    }
}
