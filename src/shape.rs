use std::sync::Arc;

use derive_more::{Deref, Display, From, Into};
use itertools::Itertools;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Dimensions of a tensor, outermost first. A scalar has an empty shape.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Deref, From, Into, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[display("[{}]", _0.iter().format(", "))]
pub struct Shape(Arc<[usize]>);

impl Shape {
    /// The shape of a rank-0 tensor.
    #[inline]
    pub fn scalar() -> Self {
        Self::default()
    }

    /// Number of dimensions.
    #[inline]
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Number of elements, i.e., the product of all dimensions.
    #[inline]
    pub fn size(&self) -> usize {
        self.0.iter().product()
    }

    /// Number of elements, or `None` if it does not fit in a `usize`.
    #[inline]
    pub fn checked_size(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &x| acc.checked_mul(x))
    }
}

impl From<Vec<usize>> for Shape {
    #[inline]
    fn from(value: Vec<usize>) -> Self {
        Self(value.into())
    }
}

impl From<&[usize]> for Shape {
    #[inline]
    fn from(value: &[usize]) -> Self {
        Self(value.into())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    #[inline]
    fn from(value: [usize; N]) -> Self {
        Self(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::Shape;

    #[test]
    fn test_shape() {
        let shape = Shape::from([4, 3, 2]);
        assert_eq!(shape.rank(), 3);
        assert_eq!(shape.size(), 24);
        assert_eq!(shape.to_string(), "[4, 3, 2]");

        let scalar = Shape::scalar();
        assert_eq!(scalar.rank(), 0);
        assert_eq!(scalar.size(), 1);
        assert_eq!(scalar.to_string(), "[]");

        let empty = Shape::from(vec![3, 0]);
        assert_eq!(empty.size(), 0);
        assert_eq!(empty.checked_size(), Some(0));
    }

    #[test]
    fn test_checked_size() {
        assert_eq!(Shape::from([4, 3, 2]).checked_size(), Some(24));
        assert_eq!(Shape::scalar().checked_size(), Some(1));
        assert_eq!(Shape::from([usize::MAX, 2]).checked_size(), None);
        assert_eq!(Shape::from([usize::MAX / 2 + 1, 2]).checked_size(), None);
        assert_eq!(Shape::from([usize::MAX, 2, 0]).checked_size(), None);
    }
}
