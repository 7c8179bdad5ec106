use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::{PeerError, Result};

/// Which end of the connection this side is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The side that dialed.
    Initiator,
    /// The side that accepted.
    Acceptor,
}

impl Role {
    pub fn partition(self) -> Partition {
        match self {
            Role::Initiator => Partition::Ascending,
            Role::Acceptor => Partition::Descending,
        }
    }
}

/// Sign partition of the correlation id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// 1, 2, 3, ...
    Ascending,
    /// -1, -2, -3, ...
    Descending,
}

/// Per-connection correlation id source.
///
/// The two peers of a connection use opposite partitions, so ids never
/// collide and nothing has to be negotiated. Ids are never zero and never
/// reused; running off the end of the range is an error, not a wrap.
#[derive(Debug)]
pub struct IdAllocator {
    partition: Partition,
    last: AtomicI64,
}

impl IdAllocator {
    pub fn new(partition: Partition) -> Self {
        Self::starting_after(partition, 0)
    }

    fn starting_after(partition: Partition, last: i64) -> Self {
        Self {
            partition,
            last: AtomicI64::new(last),
        }
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Allocate the next id.
    pub fn next(&self) -> Result<i64> {
        let partition = self.partition;
        let step = move |last: i64| match partition {
            Partition::Ascending => last.checked_add(1),
            Partition::Descending => last.checked_sub(1),
        };
        let previous = self
            .last
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, step)
            .map_err(|_| PeerError::IdSpaceExhausted)?;
        Ok(match partition {
            Partition::Ascending => previous + 1,
            Partition::Descending => previous - 1,
        })
    }

    /// Whether `id` belongs to this allocator's partition.
    pub fn owns(&self, id: i64) -> bool {
        match self.partition {
            Partition::Ascending => id > 0,
            Partition::Descending => id < 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn partitions_start_at_one() {
        let up = IdAllocator::new(Role::Initiator.partition());
        let down = IdAllocator::new(Role::Acceptor.partition());
        assert_eq!(
            (0..3).map(|_| up.next().unwrap()).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(
            (0..3).map(|_| down.next().unwrap()).collect::<Vec<_>>(),
            vec![-1, -2, -3]
        );
    }

    #[test]
    fn two_allocators_never_collide() {
        let up = IdAllocator::new(Partition::Ascending);
        let down = IdAllocator::new(Partition::Descending);
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let a = up.next().unwrap();
            let b = down.next().unwrap();
            assert_ne!(a, 0);
            assert_ne!(b, 0);
            assert!(up.owns(a) && !up.owns(b));
            assert!(seen.insert(a));
            assert!(seen.insert(b));
        }
    }

    #[test]
    fn concurrent_allocation_is_unique() {
        let ids = Arc::new(IdAllocator::new(Partition::Descending));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..1000).map(|_| ids.next().unwrap()).collect::<Vec<_>>())
            })
            .collect();
        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(all.len(), 8000);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let up = IdAllocator::starting_after(Partition::Ascending, i64::MAX - 1);
        assert_eq!(up.next().unwrap(), i64::MAX);
        assert!(matches!(up.next(), Err(PeerError::IdSpaceExhausted)));
        assert!(matches!(up.next(), Err(PeerError::IdSpaceExhausted)));

        let down = IdAllocator::starting_after(Partition::Descending, i64::MIN);
        assert!(matches!(down.next(), Err(PeerError::IdSpaceExhausted)));
    }
}
