//! Readiness conditions and their combinators.

/// A readiness predicate evaluated against a fetched object.
///
/// Implemented for every `Fn(&T) -> bool`, so closures and plain functions
/// can be passed wherever a condition is expected.
///
/// ```
/// use deployflow::poll::Condition;
///
/// let positive = |n: &i32| *n > 0;
/// let even = |n: &i32| n % 2 == 0;
/// let cond = positive.and(even);
/// assert!(cond.matches(&4));
/// assert!(!cond.matches(&3));
/// ```
pub trait Condition<T: ?Sized> {
    /// Returns true if `obj` is in the desired state.
    fn matches(&self, obj: &T) -> bool;

    /// Returns a condition that holds if `self` does not.
    fn not(self) -> Not<Self>
    where
        Self: Sized,
    {
        Not(self)
    }

    /// Returns a condition that holds if `self` and `other` both do.
    fn and<Other: Condition<T>>(self, other: Other) -> And<Self, Other>
    where
        Self: Sized,
    {
        And(self, other)
    }

    /// Returns a condition that holds if either `self` or `other` does.
    fn or<Other: Condition<T>>(self, other: Other) -> Or<Self, Other>
    where
        Self: Sized,
    {
        Or(self, other)
    }
}

impl<T: ?Sized, F: Fn(&T) -> bool> Condition<T> for F {
    fn matches(&self, obj: &T) -> bool {
        (self)(obj)
    }
}

/// See [`Condition::not`].
#[derive(Debug, Clone, Copy)]
pub struct Not<A>(pub(super) A);

impl<T: ?Sized, A: Condition<T>> Condition<T> for Not<A> {
    fn matches(&self, obj: &T) -> bool {
        !self.0.matches(obj)
    }
}

/// See [`Condition::and`].
#[derive(Debug, Clone, Copy)]
pub struct And<A, B>(pub(super) A, pub(super) B);

impl<T: ?Sized, A: Condition<T>, B: Condition<T>> Condition<T> for And<A, B> {
    fn matches(&self, obj: &T) -> bool {
        self.0.matches(obj) && self.1.matches(obj)
    }
}

/// See [`Condition::or`].
#[derive(Debug, Clone, Copy)]
pub struct Or<A, B>(pub(super) A, pub(super) B);

impl<T: ?Sized, A: Condition<T>, B: Condition<T>> Condition<T> for Or<A, B> {
    fn matches(&self, obj: &T) -> bool {
        self.0.matches(obj) || self.1.matches(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn always(_: &()) -> bool {
        true
    }

    fn never(_: &()) -> bool {
        false
    }

    #[test]
    fn test_fn_is_condition() {
        assert!(always.matches(&()));
        assert!(!never.matches(&()));
    }

    #[test]
    fn test_not() {
        assert!(!always.not().matches(&()));
        assert!(never.not().matches(&()));
    }

    #[test]
    fn test_and() {
        assert!(always.and(always).matches(&()));
        assert!(!always.and(never).matches(&()));
        assert!(!never.and(always).matches(&()));
    }

    #[test]
    fn test_or() {
        assert!(always.or(never).matches(&()));
        assert!(never.or(always).matches(&()));
        assert!(!never.or(never).matches(&()));
    }
}
