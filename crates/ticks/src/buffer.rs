use crate::error::TickError;
use core_types::Tick;
use std::collections::VecDeque;

/// A bounded ring of the most recent ticks for one symbol.
///
/// Append is O(1) amortised; the oldest tick is evicted on overflow. The
/// buffer is exclusively owned by its symbol's engine worker, so no
/// synchronisation happens here.
#[derive(Debug)]
pub struct TickBuffer {
    capacity: usize,
    ticks: VecDeque<Tick>,
}

impl TickBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ticks: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Appends a tick, evicting the oldest on overflow.
    ///
    /// A tick with a timestamp strictly before the newest buffered tick is
    /// rejected; the caller counts the drop. Equal timestamps are accepted
    /// (several prints can share a millisecond).
    pub fn push(&mut self, tick: Tick) -> Result<(), TickError> {
        if let Some(last) = self.ticks.back() {
            if tick.timestamp < last.timestamp {
                return Err(TickError::OutOfOrder {
                    symbol: tick.symbol,
                    got: tick.timestamp,
                    last: last.timestamp,
                });
            }
        }
        if self.ticks.len() == self.capacity {
            self.ticks.pop_front();
        }
        self.ticks.push_back(tick);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// The newest buffered tick.
    pub fn last(&self) -> Option<&Tick> {
        self.ticks.back()
    }

    /// Wall-clock span of the buffered ticks, in seconds.
    pub fn span_secs(&self) -> u64 {
        match (self.ticks.front(), self.ticks.back()) {
            (Some(first), Some(last)) => ((last.timestamp - first.timestamp).max(0) as u64) / 1000,
            _ => 0,
        }
    }

    /// The last `count` ticks, oldest first (all of them if fewer).
    pub fn recent(&self, count: usize) -> Vec<Tick> {
        let skip = self.ticks.len().saturating_sub(count);
        self.ticks.iter().skip(skip).cloned().collect()
    }

    /// Every tick within the last `seconds` seconds, measured from the
    /// newest tick's timestamp (not wall clock), inclusive of the newest.
    ///
    /// Returns an empty vec when the buffer spans less than the requested
    /// window; callers decide whether to skip indicator computation.
    pub fn since(&self, seconds: u64) -> Vec<Tick> {
        let last = match self.ticks.back() {
            Some(t) => t,
            None => return Vec::new(),
        };
        if self.span_secs() < seconds {
            return Vec::new();
        }
        let cutoff = last.timestamp - (seconds as i64) * 1000;
        // Ticks are timestamp-ordered, so walk back from the newest.
        let start = self
            .ticks
            .iter()
            .rposition(|t| t.timestamp < cutoff)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.ticks.iter().skip(start).cloned().collect()
    }
}
