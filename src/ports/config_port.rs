//! Configuration access port trait.

use crate::domain::error::GraphError;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// `Ok(None)` for a missing key; a present value that is not an integer
    /// is `ConfigInvalid`.
    fn get_int(&self, section: &str, key: &str) -> Result<Option<i64>, GraphError>;

    fn has(&self, section: &str, key: &str) -> bool {
        self.get_string(section, key).is_some()
    }
}
