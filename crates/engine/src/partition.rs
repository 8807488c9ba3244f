//! Splitting an ordered key list into contiguous worker ranges

use sinf_common::errors::{InfluenceError, Result};
use std::ops::Range;

/// Half-open index range `[start, end)` assigned to one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub worker: usize,
    pub start: usize,
    pub end: usize,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// This worker's share of `keys`
    pub fn slice<'a, T>(&self, keys: &'a [T]) -> &'a [T] {
        &keys[self.range()]
    }
}

/// Equal-sized contiguous partitions; the last worker absorbs the remainder
#[derive(Debug, Clone, Copy)]
pub struct WorkerPartitioner {
    n_workers: usize,
}

impl WorkerPartitioner {
    pub fn new(n_workers: usize) -> Result<Self> {
        if n_workers == 0 {
            return Err(InfluenceError::config("n_workers must be at least 1"));
        }
        Ok(Self { n_workers })
    }

    pub fn n_workers(&self) -> usize {
        self.n_workers
    }

    /// Workers that actually receive keys
    pub fn effective_workers(&self, key_count: usize) -> usize {
        self.n_workers.min(key_count)
    }

    /// Partitions covering `0..key_count` exactly once, in order
    pub fn partition(&self, key_count: usize) -> Vec<Partition> {
        let workers = self.effective_workers(key_count);
        if workers == 0 {
            return Vec::new();
        }

        let load = key_count / workers;
        let mut partitions: Vec<Partition> = (0..workers - 1)
            .map(|worker| Partition {
                worker,
                start: worker * load,
                end: (worker + 1) * load,
            })
            .collect();

        partitions.push(Partition {
            worker: workers - 1,
            start: (workers - 1) * load,
            end: key_count,
        });

        partitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers(partitions: &[Partition], key_count: usize) {
        let mut next = 0;
        for p in partitions {
            assert_eq!(p.start, next);
            assert!(p.end >= p.start);
            next = p.end;
        }
        assert_eq!(next, key_count);
    }

    #[test]
    fn test_even_split() {
        let parts = WorkerPartitioner::new(4).unwrap().partition(8);
        assert_eq!(parts.len(), 4);
        assert!(parts.iter().all(|p| p.len() == 2));
        assert_covers(&parts, 8);
    }

    #[test]
    fn test_last_worker_absorbs_remainder() {
        let parts = WorkerPartitioner::new(3).unwrap().partition(11);
        let sizes: Vec<_> = parts.iter().map(|p| p.len()).collect();
        assert_eq!(sizes, vec![3, 3, 5]);
        assert_eq!(parts.last().unwrap().end, 11);
        assert_covers(&parts, 11);
    }

    #[test]
    fn test_more_workers_than_keys() {
        let parts = WorkerPartitioner::new(16).unwrap().partition(3);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.len() == 1));
        assert_covers(&parts, 3);
    }

    #[test]
    fn test_no_keys() {
        assert!(WorkerPartitioner::new(4).unwrap().partition(0).is_empty());
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(WorkerPartitioner::new(0).is_err());
    }

    #[test]
    fn test_exhaustive_coverage() {
        for workers in 1..9 {
            let partitioner = WorkerPartitioner::new(workers).unwrap();
            for keys in 0..40 {
                let parts = partitioner.partition(keys);
                assert_covers(&parts, keys);
                assert!(parts.iter().all(|p| !p.is_empty()));
            }
        }
    }

    #[test]
    fn test_slice() {
        let keys = ["a", "b", "c", "d", "e"];
        let parts = WorkerPartitioner::new(2).unwrap().partition(keys.len());
        assert_eq!(parts[0].slice(&keys), &["a", "b"]);
        assert_eq!(parts[1].slice(&keys), &["c", "d", "e"]);
    }
}
