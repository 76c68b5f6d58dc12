//! Sliding history window over a bounded number of items.
//!
//! Items are addressed by a logical index; `current_index` is the newest
//! position and reads are usually expressed as a shift back from it. The
//! valid items always form the contiguous range
//! `first_valid_index..=last_valid_index`, with
//! `first_valid_index <= last_valid_index <= current_index` when non-empty.
//! Positions outside that range are holes; reading one asks a
//! [`HistoryProvider`] to regenerate the missing items first.

use crate::domain::error::GraphError;
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards newer indices (filling holes above `last_valid_index`).
    Forward,
    /// Towards older indices (filling holes below `first_valid_index`).
    Backward,
}

/// Source of items for holes in a [`HistoryWindow`].
pub trait HistoryProvider<T> {
    /// Produces the items for indices `from` to `to` inclusive, ordered from
    /// `from` towards `to`. `neighbour` is the valid item adjacent to the gap.
    /// Returning fewer items than requested leaves the rest of the gap open.
    fn regenerate(
        &mut self,
        from: i64,
        to: i64,
        direction: Direction,
        neighbour: Option<&T>,
    ) -> Result<Vec<T>, GraphError>;
}

/// Provider for windows that have no way to regenerate history.
pub struct NoHistory;

impl<T> HistoryProvider<T> for NoHistory {
    fn regenerate(
        &mut self,
        from: i64,
        to: i64,
        _direction: Direction,
        _neighbour: Option<&T>,
    ) -> Result<Vec<T>, GraphError> {
        Err(GraphError::HistoryGap {
            from,
            to,
            reason: "no history provider".into(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct HistoryWindow<T> {
    items: VecDeque<T>,
    first_valid: i64,
    current: i64,
    max_size: usize,
}

impl<T> HistoryWindow<T> {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            first_valid: 0,
            current: -1,
            max_size: max_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Newest logical position, `-1` before anything was added.
    pub fn current_index(&self) -> i64 {
        self.current
    }

    pub fn first_valid_index(&self) -> Option<i64> {
        (!self.items.is_empty()).then_some(self.first_valid)
    }

    pub fn last_valid_index(&self) -> Option<i64> {
        (!self.items.is_empty()).then(|| self.first_valid + self.items.len() as i64 - 1)
    }

    /// Adds an item right after the newest valid one.
    pub fn append(&mut self, item: T) {
        let index = match self.last_valid_index() {
            Some(last) => last + 1,
            None => {
                self.first_valid = self.current + 1;
                self.current + 1
            }
        };
        self.items.push_back(item);
        self.current = self.current.max(index);

        if self.items.len() > self.max_size {
            self.items.pop_front();
            self.first_valid += 1;
        }
    }

    /// Adds an item right before the oldest valid one.
    pub fn prepend(&mut self, item: T) {
        if self.items.is_empty() {
            if self.current < 0 {
                self.current = 0;
            }
            self.first_valid = self.current;
        } else {
            self.first_valid -= 1;
        }
        self.items.push_front(item);

        if self.items.len() > self.max_size {
            self.items.pop_back();
        }
    }

    /// Moves `current_index` forward without data, opening holes at the newest end.
    pub fn advance(&mut self, count: usize) {
        self.current += count as i64;
    }

    pub fn get(&self, index: i64) -> Option<&T> {
        if index < self.first_valid {
            return None;
        }
        self.items.get((index - self.first_valid) as usize)
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Swaps the newest valid item for `item` without moving any index.
    /// Returns the replaced item; an empty window is left untouched.
    pub fn replace_latest(&mut self, item: T) -> Option<T> {
        let newest = self.items.back_mut()?;
        Some(std::mem::replace(newest, item))
    }

    /// Item `shift` positions back from `current_index`, without regeneration.
    pub fn peek_by_shift(&self, shift: usize) -> Option<&T> {
        self.get(self.current - shift as i64)
    }

    /// Item `shift` positions back from `current_index`, regenerating the gap
    /// through `provider` when the position is a hole.
    pub fn get_by_shift(
        &mut self,
        shift: usize,
        provider: &mut dyn HistoryProvider<T>,
    ) -> Result<&T, GraphError> {
        let index = self.current - shift as i64;
        if shift >= self.max_size {
            return Err(GraphError::HistoryGap {
                from: index,
                to: index,
                reason: format!("shift {} exceeds window size {}", shift, self.max_size),
            });
        }
        let (Some(first), Some(last)) = (self.first_valid_index(), self.last_valid_index()) else {
            return Err(GraphError::HistoryGap {
                from: index,
                to: index,
                reason: "window is empty".into(),
            });
        };

        if index > last {
            self.regenerate(last + 1, index, Direction::Forward, provider)?;
        } else if index < first {
            self.regenerate(first - 1, index, Direction::Backward, provider)?;
        }

        self.get(index).ok_or_else(|| GraphError::HistoryGap {
            from: index,
            to: index,
            reason: "index left the window during regeneration".into(),
        })
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.first_valid = 0;
        self.current = -1;
    }

    /// Valid items, oldest first, with their logical indices.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (i64, &T)> {
        let first = self.first_valid;
        self.items
            .iter()
            .enumerate()
            .map(move |(i, item)| (first + i as i64, item))
    }

    fn regenerate(
        &mut self,
        from: i64,
        to: i64,
        direction: Direction,
        provider: &mut dyn HistoryProvider<T>,
    ) -> Result<(), GraphError> {
        let wanted = (to - from).unsigned_abs() as usize + 1;
        let neighbour = match direction {
            Direction::Forward => self.items.back(),
            Direction::Backward => self.items.front(),
        };
        let produced = provider
            .regenerate(from, to, direction, neighbour)
            .map_err(|e| match e {
                gap @ GraphError::HistoryGap { .. } => gap,
                other => GraphError::HistoryGap {
                    from,
                    to,
                    reason: other.to_string(),
                },
            })?;

        let got = produced.len().min(wanted);
        for item in produced.into_iter().take(wanted) {
            match direction {
                Direction::Forward => self.append(item),
                Direction::Backward => self.prepend(item),
            }
        }
        debug!(from, to, ?direction, wanted, got, "regenerated history gap");

        if got < wanted {
            return Err(GraphError::HistoryGap {
                from,
                to,
                reason: format!("provider returned {} of {} items", got, wanted),
            });
        }
        Ok(())
    }
}
