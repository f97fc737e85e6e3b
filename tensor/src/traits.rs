//! `std::ops` overloads for tensors and scalars.
//!
//! Operators panic with the error of the matching fallible method, so
//! `&a + &b` behaves like `a.try_add(&b).unwrap()`. Scalars become
//! zero-dimensional constants that broadcast against the tensor:
//!
//! ```ignore
//! let y = &x * 2.0 - 1;
//! let z = 1.0 / &y;
//! ```

use std::fmt::Display;
use std::ops;

use tessera_dtype::DType;
use tessera_ir::ConstValue;

use crate::Tensor;

#[track_caller]
fn or_panic<E: Display>(result: Result<Tensor, E>, op: &str) -> Tensor {
    match result {
        Ok(tensor) => tensor,
        Err(err) => panic!("tensor {op}: {err}"),
    }
}

/// Zero-dimensional constant to combine with `tensor`.
///
/// Keeps `tensor`'s dtype unless the scalar's kind outranks it, in which
/// case the scalar takes the narrowest dtype of its own kind.
fn scalar_for(tensor: &Tensor, value: ConstValue) -> Tensor {
    let own = tensor.dtype();
    let dtype = match value {
        ConstValue::Float(_) if !own.is_float() => DType::Float32,
        ConstValue::Int(_) if own.is_bool() => DType::Int32,
        _ => own,
    };
    Tensor::full(&[], value, dtype)
}

/// One `impl ops::$trait<$rhs> for $lhs` whose body sees the operands as
/// `$a` and `$b`.
macro_rules! operator {
    ($trait:ident :: $method:ident, $lhs:ty, $rhs:ty, |$a:ident, $b:ident| $body:expr) => {
        impl ops::$trait<$rhs> for $lhs {
            type Output = Tensor;

            #[track_caller]
            fn $method(self, $b: $rhs) -> Tensor {
                let $a = self;
                $body
            }
        }
    };
}

/// Every operand pairing of one binary operator. `&Tensor op &Tensor`
/// does the work and the rest borrow their way into it.
macro_rules! binary_operators {
    (@scalar $trait:ident :: $method:ident, $scalar:ty, |$v:ident| $value:expr) => {
        operator!($trait::$method, &Tensor, $scalar, |a, $v| ops::$trait::$method(a, &scalar_for(a, $value)));
        operator!($trait::$method, Tensor, $scalar, |a, $v| ops::$trait::$method(&a, &scalar_for(&a, $value)));
        impl ops::$trait<&Tensor> for $scalar {
            type Output = Tensor;

            #[track_caller]
            fn $method(self, rhs: &Tensor) -> Tensor {
                let $v = self;
                ops::$trait::$method(&scalar_for(rhs, $value), rhs)
            }
        }
        impl ops::$trait<Tensor> for $scalar {
            type Output = Tensor;

            #[track_caller]
            fn $method(self, rhs: Tensor) -> Tensor {
                ops::$trait::$method(self, &rhs)
            }
        }
    };
    ($($trait:ident :: $method:ident => $fallible:ident),* $(,)?) => {$(
        operator!($trait::$method, &Tensor, &Tensor, |a, b| or_panic(a.$fallible(b), stringify!($method)));
        operator!($trait::$method, Tensor, Tensor, |a, b| ops::$trait::$method(&a, &b));
        operator!($trait::$method, &Tensor, Tensor, |a, b| ops::$trait::$method(a, &b));
        operator!($trait::$method, Tensor, &Tensor, |a, b| ops::$trait::$method(&a, b));

        binary_operators!(@scalar $trait::$method, f32, |v| ConstValue::Float(f64::from(v)));
        binary_operators!(@scalar $trait::$method, i32, |v| ConstValue::Int(i64::from(v)));
    )*};
}

binary_operators! {
    Add::add => try_add,
    Sub::sub => try_sub,
    Mul::mul => try_mul,
    Div::div => try_div,
    Rem::rem => try_mod,
}

operator!(BitAnd::bitand, &Tensor, &Tensor, |a, b| or_panic(a.bitwise_and(b), "bitand"));
operator!(BitOr::bitor, &Tensor, &Tensor, |a, b| or_panic(a.bitwise_or(b), "bitor"));
operator!(BitXor::bitxor, &Tensor, &Tensor, |a, b| or_panic(a.bitwise_xor(b), "bitxor"));

impl ops::Neg for &Tensor {
    type Output = Tensor;

    #[track_caller]
    fn neg(self) -> Tensor {
        or_panic(self.try_neg(), "neg")
    }
}

impl ops::Neg for Tensor {
    type Output = Tensor;

    #[track_caller]
    fn neg(self) -> Tensor {
        -&self
    }
}

impl ops::Not for &Tensor {
    type Output = Tensor;

    #[track_caller]
    fn not(self) -> Tensor {
        or_panic(self.logical_not(), "not")
    }
}
