/// Cache trait for storing and retrieving values by key.
///
/// Implementations should handle errors gracefully without panicking.
pub trait Cache {
    type Value;

    /// Retrieves a cached value for the given key.
    ///
    /// # Returns
    /// * `Some(value)` - The cached value if present and still live
    /// * `None` - If the key was never set or its entry has expired
    ///
    /// Callers must treat both `None` cases the same way.
    fn get(&self, key: &str) -> Option<Self::Value>;

    /// Stores a value in the cache for the given key, stamping the current time.
    ///
    /// # Notes
    /// Overwrites any existing entry unconditionally. This method does not
    /// return errors to maintain fire-and-forget semantics.
    fn set(&self, key: &str, value: Self::Value);
}
