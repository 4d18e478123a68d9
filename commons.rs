// Common definitions shared by the IR layer, the analyses and the driver.

/// A module that passed validation.  Analyses and passes only accept values
/// wrapped in this type, so they can index blocks and instructions without
/// re-checking the invariants enforced by `Module::validate`.
#[derive(Clone, Debug, PartialEq)]
pub struct Valid<T>(pub T);

impl<T> Valid<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> AsRef<T> for Valid<T> {
    fn as_ref(&self) -> &T {
        &self.0
    }
}

// Wrap a value without checking it.  Only for tests and for passes that are
// known to preserve validity.
pub fn skip_validation<T>(t: T) -> Valid<T> {
    Valid(t)
}
