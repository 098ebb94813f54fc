use bytemuck::Pod;
use derive_more::Display;
use half::f16;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Element type tag of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataType {
    #[display("bool")]
    Bool,
    #[display("i8")]
    I8,
    #[display("i16")]
    I16,
    #[display("i32")]
    I32,
    #[display("i64")]
    I64,
    #[display("u8")]
    U8,
    #[display("u16")]
    U16,
    #[display("u32")]
    U32,
    #[display("u64")]
    U64,
    #[display("f16")]
    F16,
    #[display("f32")]
    F32,
    #[display("f64")]
    F64,
}

impl DataType {
    /// Returns the size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            DataType::Bool | DataType::I8 | DataType::U8 => 1,
            DataType::I16 | DataType::U16 | DataType::F16 => 2,
            DataType::I32 | DataType::U32 | DataType::F32 => 4,
            DataType::I64 | DataType::U64 | DataType::F64 => 8,
        }
    }
}

/// A numeric element that can be read from or written to raw tensor bytes.
pub trait Scalar: Sized + Pod + Send + Sync {
    const DATA_TYPE: DataType;
}

macro_rules! impl_scalar {
    ($ty:ty, $variant:ident) => {
        impl Scalar for $ty {
            const DATA_TYPE: DataType = DataType::$variant;
        }
    };
}

impl_scalar!(i8, I8);
impl_scalar!(i16, I16);
impl_scalar!(i32, I32);
impl_scalar!(i64, I64);
impl_scalar!(u8, U8);
impl_scalar!(u16, U16);
impl_scalar!(u32, U32);
impl_scalar!(u64, U64);
impl_scalar!(f16, F16);
impl_scalar!(f32, F32);
impl_scalar!(f64, F64);

#[cfg(test)]
mod tests {
    use half::f16;

    use super::{DataType, Scalar};

    #[test]
    fn test_sizes_match_scalars() {
        fn check<T: Scalar>() {
            assert_eq!(T::DATA_TYPE.size(), size_of::<T>(), "{}", T::DATA_TYPE);
        }
        check::<i8>();
        check::<i16>();
        check::<i32>();
        check::<i64>();
        check::<u8>();
        check::<u16>();
        check::<u32>();
        check::<u64>();
        check::<f16>();
        check::<f32>();
        check::<f64>();
        assert_eq!(DataType::Bool.size(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(DataType::F16.to_string(), "f16");
        assert_eq!(DataType::I32.to_string(), "i32");
    }
}
