use thiserror::Error;

/// A closed range `[a, b]` stored as a pair, with `a <= b` enforced on construction.
///
/// Peak matching uses two different boundary rules on top of the same range:
/// m/z windows are closed ([`TupleRange::contains`]) while mobility windows
/// exclude both ends ([`TupleRange::contains_exclusive`]).
///
/// ```
/// use xicquery::TupleRange;
///
/// let range = TupleRange::try_new(0.95, 1.05).unwrap();
/// assert!(range.contains(0.95));
/// assert!(!range.contains_exclusive(0.95));
/// assert!(TupleRange::try_new(2.0, 1.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TupleRange<T: Copy + PartialOrd>(T, T);

#[derive(Error, Debug)]
pub enum TupleRangeError<T: Copy + PartialOrd + std::fmt::Debug> {
    #[error(
        "Expected the first element to be less than or equal to the second, got ({0:?}, {1:?})"
    )]
    ExpectedOrderedRange(T, T),
}

impl<T: Copy + PartialOrd + std::fmt::Debug> TupleRange<T> {
    pub fn try_new(left: T, right: T) -> Result<Self, TupleRangeError<T>> {
        if left > right {
            Err(TupleRangeError::ExpectedOrderedRange(left, right))
        } else {
            Ok(Self(left, right))
        }
    }

    pub(crate) fn from_ordered(left: T, right: T) -> Self {
        debug_assert!(!(left > right));
        Self(left, right)
    }

    pub fn as_tuple(&self) -> (T, T) {
        (self.0, self.1)
    }

    pub fn contains(&self, x: T) -> bool {
        self.0 <= x && x <= self.1
    }

    pub fn contains_exclusive(&self, x: T) -> bool {
        self.0 < x && x < self.1
    }

    pub fn start(&self) -> T {
        self.0
    }

    pub fn end(&self) -> T {
        self.1
    }
}

/// A value that is either restricted to a range or not restricted at all.
///
/// Same shape as `Option<T>`, but `Unrestricted` means "anything goes" rather
/// than "nothing allowed".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionallyRestricted<T: Copy> {
    Restricted(T),
    Unrestricted,
}

impl OptionallyRestricted<TupleRange<f64>> {
    /// Strict containment; unrestricted accepts everything.
    pub fn admits(&self, x: f64) -> bool {
        match self {
            OptionallyRestricted::Restricted(range) => range.contains_exclusive(x),
            OptionallyRestricted::Unrestricted => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_bounds() {
        let range = TupleRange::try_new(1.0, 2.0).unwrap();
        assert!(range.contains(1.0));
        assert!(range.contains(2.0));
        assert!(!range.contains_exclusive(1.0));
        assert!(!range.contains_exclusive(2.0));
        assert!(range.contains_exclusive(1.5));
    }

    #[test]
    fn test_unrestricted_admits_sentinels() {
        let unrestricted: OptionallyRestricted<TupleRange<f64>> =
            OptionallyRestricted::Unrestricted;
        assert!(unrestricted.admits(-1.0));
        let restricted = OptionallyRestricted::Restricted(TupleRange::try_new(0.9, 1.1).unwrap());
        assert!(!restricted.admits(-1.0));
    }
}
