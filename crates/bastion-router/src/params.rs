//! Path parameter extraction.
//!
//! Parameters borrow both their name (from the tree) and their value (from
//! the matched path), so a match allocates nothing for the common case of a
//! few parameters.

use smallvec::SmallVec;

/// Maximum number of parameters stored inline (stack allocated).
const INLINE_PARAMS: usize = 4;

/// Extracted path parameters from a route match.
///
/// # Example
///
/// ```rust
/// use bastion_router::Params;
///
/// let mut params = Params::new();
/// params.push("orderId", "42");
///
/// assert_eq!(params.get("orderId"), Some("42"));
/// assert_eq!(params.get("unknown"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params<'a> {
    inner: SmallVec<[(&'a str, &'a str); INLINE_PARAMS]>,
}

impl<'a> Params<'a> {
    /// Creates a new empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter to the set.
    pub fn push(&mut self, name: &'a str, value: &'a str) {
        self.inner.push((name, value));
    }

    /// Returns the value for a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.inner
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns an iterator over the parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        self.inner.iter().copied()
    }

    /// Drops parameters pushed after `len`, used when a match backtracks.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.inner.truncate(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_new() {
        let params = Params::new();
        assert!(params.is_empty());
        assert_eq!(params.len(), 0);
    }

    #[test]
    fn test_params_iter_preserves_order() {
        let mut params = Params::new();
        params.push("org", "acme");
        params.push("id", "7");

        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, vec![("org", "acme"), ("id", "7")]);
    }

    #[test]
    fn test_params_truncate() {
        let mut params = Params::new();
        params.push("a", "1");
        params.push("b", "2");
        params.truncate(1);
        assert_eq!(params.get("a"), Some("1"));
        assert_eq!(params.get("b"), None);
    }

    #[test]
    fn test_params_spill_to_heap() {
        let names = ["a", "b", "c", "d", "e", "f"];
        let mut params = Params::new();
        for name in names {
            params.push(name, "v");
        }
        assert_eq!(params.len(), 6);
        assert_eq!(params.get("f"), Some("v"));
    }
}
