//! Flagged, timestamped multi-value records exchanged between nodes.

use crate::domain::value::{Value, ValueType};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bit set describing an [`Entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntryFlags(u8);

impl EntryFlags {
    pub const NONE: EntryFlags = EntryFlags(0);
    pub const VALID: EntryFlags = EntryFlags(1 << 0);
    pub const REAL: EntryFlags = EntryFlags(1 << 1);
    pub const INTEGER: EntryFlags = EntryFlags(1 << 2);
    pub const UNSIGNED: EntryFlags = EntryFlags(1 << 3);
    pub const INSUFFICIENT_DATA: EntryFlags = EntryFlags(1 << 4);
    pub const BITWISE: EntryFlags = EntryFlags(1 << 5);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: EntryFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: EntryFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: EntryFlags) {
        self.0 &= !other.0;
    }

    /// Type-class flags for values of `value_type`.
    pub fn for_type(value_type: ValueType) -> EntryFlags {
        if value_type.is_real() {
            EntryFlags::REAL
        } else if value_type.is_unsigned() {
            EntryFlags::INTEGER | EntryFlags::UNSIGNED
        } else {
            EntryFlags::INTEGER
        }
    }
}

impl BitOr for EntryFlags {
    type Output = EntryFlags;

    fn bitor(self, rhs: EntryFlags) -> EntryFlags {
        EntryFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for EntryFlags {
    fn bitor_assign(&mut self, rhs: EntryFlags) {
        self.0 |= rhs.0;
    }
}

/// One row of computed output for one time bucket.
///
/// An entry is either fully valid (`VALID`, every value present and
/// non-sentinel) or flagged `INSUFFICIENT_DATA`; never both.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub timestamp: i64,
    pub flags: EntryFlags,
    pub values: Vec<Value>,
    /// Node generation the entry was resolved under.
    pub generation: u32,
}

impl Entry {
    /// Builds an entry and derives its validity from `values`.
    pub fn new(timestamp: i64, values: Vec<Value>) -> Self {
        let mut entry = Entry {
            timestamp,
            flags: EntryFlags::NONE,
            values,
            generation: 0,
        };
        entry.validate(None);
        entry
    }

    /// Entry for a fully formed row of doubles.
    pub fn from_doubles(timestamp: i64, values: &[f64]) -> Self {
        Entry::new(timestamp, values.iter().map(|&v| Value::Double(v)).collect())
    }

    /// Negative entry: no usable data for `timestamp`.
    pub fn insufficient(timestamp: i64) -> Self {
        Entry {
            timestamp,
            flags: EntryFlags::INSUFFICIENT_DATA,
            values: Vec::new(),
            generation: 0,
        }
    }

    /// Recomputes the validity flags; `expected` is the number of values the
    /// producing node declares per entry.
    pub fn validate(&mut self, expected: Option<usize>) {
        self.flags.remove(EntryFlags::VALID | EntryFlags::INSUFFICIENT_DATA);
        self.flags.remove(EntryFlags::REAL | EntryFlags::INTEGER | EntryFlags::UNSIGNED);

        let complete = expected.is_none_or(|n| self.values.len() == n);
        let ok = complete && !self.values.is_empty() && self.values.iter().all(|v| !v.is_sentinel());

        if let Some(first) = self.values.first() {
            self.flags |= EntryFlags::for_type(first.value_type());
        }
        if ok {
            self.flags |= EntryFlags::VALID;
        } else {
            self.flags |= EntryFlags::INSUFFICIENT_DATA;
        }
    }

    pub fn is_valid(&self) -> bool {
        self.flags.contains(EntryFlags::VALID)
    }

    pub fn is_insufficient(&self) -> bool {
        self.flags.contains(EntryFlags::INSUFFICIENT_DATA)
    }

    pub fn value(&self, mode: usize) -> Option<&Value> {
        self.values.get(mode)
    }

    /// Value for `mode` as `f64`, only when the entry is valid.
    pub fn get(&self, mode: usize) -> Option<f64> {
        if !self.is_valid() {
            return None;
        }
        self.values.get(mode).map(Value::as_f64)
    }

    /// Bit-identical comparison of two entries (NaN-safe).
    pub fn bit_eq(&self, other: &Entry) -> bool {
        self.timestamp == other.timestamp
            && self.flags == other.flags
            && self.values.len() == other.values.len()
            && self.values.iter().zip(&other.values).all(|(a, b)| a.bit_eq(b))
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.timestamp)?;
        if self.is_insufficient() {
            return write!(f, " <insufficient>");
        }
        for v in &self.values {
            write!(f, " {}", v)?;
        }
        Ok(())
    }
}
