//! Resource handles for externally computed values.
//!
//! A resolver is an explicit service passed to the nodes that need it; one
//! resolver may hand out handles for many parameter keys.

use crate::domain::error::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub u64);

pub trait HandleResolver {
    /// Acquires (or re-acquires) the handle for a parameter key.
    fn acquire(&self, key: &str) -> Result<Handle, GraphError>;

    /// Reads the value of `mode` at `shift`. `Ok(None)` means no data yet;
    /// `Err(GraphError::InvalidHandle)` means the handle must be re-acquired.
    fn read(&self, handle: Handle, mode: usize, shift: usize) -> Result<Option<f64>, GraphError>;
}
