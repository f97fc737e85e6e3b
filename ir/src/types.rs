//! Type definitions for IR operations.
//!
//! Constant values and the operator vocabulary shared by the operation tree
//! and the micro-op graph.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem::discriminant;

use tessera_dtype::{DType, ScalarDType};

/// Constant value that can be stored in a UOp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
}

/// Cast to the target width and back to the storage type.
macro_rules! cast_via {
    ($v:expr, $target:ty, $storage:ty) => {
        ($v as $target) as $storage
    };
}

#[inline]
fn cast_bool(v: bool, to: ScalarDType) -> Option<ConstValue> {
    use ScalarDType::*;
    Some(match to {
        Bool => ConstValue::Bool(v),
        Int8 | Int16 | Int32 | Int64 | Index => ConstValue::Int(v as i64),
        UInt8 | UInt16 | UInt32 | UInt64 => ConstValue::UInt(v as u64),
        Float32 | Float64 => ConstValue::Float(v as u8 as f64),
        Void => return None,
    })
}

#[inline]
fn cast_int(v: i64, to: ScalarDType) -> Option<ConstValue> {
    use ScalarDType::*;
    Some(match to {
        Bool => ConstValue::Bool(v != 0),
        Int8 => ConstValue::Int(cast_via!(v, i8, i64)),
        Int16 => ConstValue::Int(cast_via!(v, i16, i64)),
        Int32 => ConstValue::Int(cast_via!(v, i32, i64)),
        Int64 | Index => ConstValue::Int(v),
        UInt8 => ConstValue::UInt(cast_via!(v, u8, u64)),
        UInt16 => ConstValue::UInt(cast_via!(v, u16, u64)),
        UInt32 => ConstValue::UInt(cast_via!(v, u32, u64)),
        UInt64 => ConstValue::UInt(v as u64),
        Float32 => ConstValue::Float(v as f32 as f64),
        Float64 => ConstValue::Float(v as f64),
        Void => return None,
    })
}

#[inline]
fn cast_uint(v: u64, to: ScalarDType) -> Option<ConstValue> {
    use ScalarDType::*;
    Some(match to {
        Bool => ConstValue::Bool(v != 0),
        Int8 => ConstValue::Int(cast_via!(v, i8, i64)),
        Int16 => ConstValue::Int(cast_via!(v, i16, i64)),
        Int32 => ConstValue::Int(cast_via!(v, i32, i64)),
        Int64 | Index => ConstValue::Int(v as i64),
        UInt8 => ConstValue::UInt(cast_via!(v, u8, u64)),
        UInt16 => ConstValue::UInt(cast_via!(v, u16, u64)),
        UInt32 => ConstValue::UInt(cast_via!(v, u32, u64)),
        UInt64 => ConstValue::UInt(v),
        Float32 => ConstValue::Float(v as f32 as f64),
        Float64 => ConstValue::Float(v as f64),
        Void => return None,
    })
}

#[inline]
fn cast_float(v: f64, to: ScalarDType) -> Option<ConstValue> {
    use ScalarDType::*;
    Some(match to {
        Bool => ConstValue::Bool(v != 0.0),
        Int8 => ConstValue::Int(cast_via!(v, i8, i64)),
        Int16 => ConstValue::Int(cast_via!(v, i16, i64)),
        Int32 => ConstValue::Int(cast_via!(v, i32, i64)),
        Int64 | Index => ConstValue::Int(v as i64),
        // Float-to-unsigned goes through i64 first.
        UInt8 => ConstValue::UInt(cast_via!(v as i64, u8, u64)),
        UInt16 => ConstValue::UInt(cast_via!(v as i64, u16, u64)),
        UInt32 => ConstValue::UInt(cast_via!(v as i64, u32, u64)),
        UInt64 => ConstValue::UInt((v as i64) as u64),
        Float32 => ConstValue::Float(v as f32 as f64),
        Float64 => ConstValue::Float(v),
        Void => return None,
    })
}

impl ConstValue {
    pub const fn zero(dtype: ScalarDType) -> Self {
        use ScalarDType::*;
        match dtype {
            Bool => Self::Bool(false),
            Int8 | Int16 | Int32 | Int64 | Index | Void => Self::Int(0),
            UInt8 | UInt16 | UInt32 | UInt64 => Self::UInt(0),
            Float32 | Float64 => Self::Float(0.0),
        }
    }

    pub const fn one(dtype: ScalarDType) -> Self {
        use ScalarDType::*;
        match dtype {
            Bool => Self::Bool(true),
            Int8 | Int16 | Int32 | Int64 | Index | Void => Self::Int(1),
            UInt8 | UInt16 | UInt32 | UInt64 => Self::UInt(1),
            Float32 | Float64 => Self::Float(1.0),
        }
    }

    /// Smallest representable value of `dtype` (`-inf` for floats).
    pub fn min(dtype: ScalarDType) -> Self {
        use ScalarDType::*;
        match dtype {
            Bool => Self::Bool(false),
            Int8 => Self::Int(i8::MIN as i64),
            Int16 => Self::Int(i16::MIN as i64),
            Int32 => Self::Int(i32::MIN as i64),
            Int64 | Index | Void => Self::Int(i64::MIN),
            UInt8 | UInt16 | UInt32 | UInt64 => Self::UInt(0),
            Float32 | Float64 => Self::Float(f64::NEG_INFINITY),
        }
    }

    /// Cast this constant value to the target dtype.
    ///
    /// All casts are allowed, including lossy ones, and follow C semantics:
    /// narrowing truncates, unsigned overflow wraps and float-to-int truncates
    /// toward zero. `Float32` results are rounded to single precision.
    pub fn cast(&self, dtype: &DType) -> Option<Self> {
        let to = dtype.scalar()?;
        match *self {
            ConstValue::Bool(v) => cast_bool(v, to),
            ConstValue::Int(v) => cast_int(v, to),
            ConstValue::UInt(v) => cast_uint(v, to),
            ConstValue::Float(v) => cast_float(v, to),
        }
    }

    pub fn is_zero(&self) -> bool {
        match *self {
            ConstValue::Int(v) => v == 0,
            ConstValue::UInt(v) => v == 0,
            ConstValue::Float(v) => v == 0.0,
            ConstValue::Bool(v) => !v,
        }
    }

    pub fn is_one(&self) -> bool {
        match *self {
            ConstValue::Int(v) => v == 1,
            ConstValue::UInt(v) => v == 1,
            ConstValue::Float(v) => v == 1.0,
            ConstValue::Bool(v) => v,
        }
    }

    /// Truthiness used by `Where`, gates and `If`.
    pub fn truthy(&self) -> bool {
        !self.is_zero()
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            ConstValue::Int(v) => Some(v),
            ConstValue::UInt(v) => i64::try_from(v).ok(),
            ConstValue::Bool(v) => Some(v as i64),
            ConstValue::Float(_) => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            ConstValue::Int(v) => v as f64,
            ConstValue::UInt(v) => v as f64,
            ConstValue::Float(v) => v,
            ConstValue::Bool(v) => v as u8 as f64,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::UInt(v) => write!(f, "{v}u"),
            ConstValue::Float(v) if v.is_infinite() => f.write_str(if *v > 0.0 { "inf" } else { "-inf" }),
            ConstValue::Float(v) => write!(f, "{v:?}"),
            ConstValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// Wrapper for ConstValue that implements Eq and Hash.
///
/// Floats compare by bit pattern, so identical NaNs hash-cons together while
/// `0.0` and `-0.0` stay distinct.
#[derive(Debug, Clone, Copy)]
pub struct ConstValueHash(pub ConstValue);

impl PartialEq for ConstValueHash {
    fn eq(&self, other: &Self) -> bool {
        match (self.0, other.0) {
            (ConstValue::Int(a), ConstValue::Int(b)) => a == b,
            (ConstValue::UInt(a), ConstValue::UInt(b)) => a == b,
            (ConstValue::Float(a), ConstValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ConstValue::Bool(a), ConstValue::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ConstValueHash {}

impl Hash for ConstValueHash {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (discriminant(&self.0)).hash(state);
        match self.0 {
            ConstValue::Int(v) => v.hash(state),
            ConstValue::UInt(v) => v.hash(state),
            ConstValue::Float(v) => v.to_bits().hash(state),
            ConstValue::Bool(v) => v.hash(state),
        }
    }
}

/// Reduction operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ReduceOp {
    Sum,
    Max,
}

impl ReduceOp {
    /// Accumulator seed: `0` for sums, the dtype minimum for max.
    pub fn identity(self, dtype: ScalarDType) -> ConstValue {
        match self {
            Self::Sum => ConstValue::zero(dtype),
            Self::Max => ConstValue::min(dtype),
        }
    }

    /// The binary operation folding one element into the accumulator.
    pub fn binary(self) -> BinaryOp {
        match self {
            Self::Sum => BinaryOp::Add,
            Self::Max => BinaryOp::Max,
        }
    }
}

/// Unary operation types. All preserve the input dtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum UnaryOp {
    Neg,
    Sqrt,
    Exp2,
    Log2,
    Sin,
    Reciprocal,
}

/// Binary operation types.
///
/// Arithmetic operations preserve the LHS dtype; comparisons return `Bool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum BinaryOp {
    Add,
    Mul,
    Sub,
    /// C-style remainder (sign of the dividend).
    Mod,
    Max,
    /// Integer division truncated toward zero.
    Idiv,
    /// IEEE 754 division, float dtypes only.
    Fdiv,

    Lt,
    Eq,
    Ne,

    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Lt | Self::Eq | Self::Ne)
    }

    pub fn is_commutative(self) -> bool {
        matches!(self, Self::Add | Self::Mul | Self::Eq | Self::Ne | Self::And | Self::Or | Self::Xor | Self::Max)
    }

    /// `op(0, 0) == 0`, so a padded (masked-to-zero) input stays zero.
    pub fn preserves_zero(self) -> bool {
        matches!(self, Self::Add | Self::Mul | Self::Sub | Self::Max | Self::And | Self::Or | Self::Xor)
    }
}

impl UnaryOp {
    pub fn preserves_zero(self) -> bool {
        matches!(self, Self::Neg | Self::Sqrt | Self::Sin)
    }
}

/// Ternary operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum TernaryOp {
    /// `cond ? a : b`
    Where,
    /// `a * b + c`
    MulAcc,
}
