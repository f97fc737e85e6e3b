//! Symbolic integers for shapes, strides and offsets.
//!
//! An [`SInt`] is either a concrete `i64` or an integer polynomial over bounded
//! [`Variable`]s kept in canonical form (sorted monomials, no zero
//! coefficients), so structurally equal expressions compare and hash equal.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{BindValueOutOfRangeSnafu, Result};

/// A named integer placeholder with an inclusive range, optionally bound to a
/// concrete value for one realization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable {
    name: Arc<str>,
    min: i64,
    max: i64,
    value: Option<i64>,
}

impl Variable {
    pub fn new(name: impl Into<Arc<str>>, min: i64, max: i64) -> Self {
        Self { name: name.into(), min, max, value: None }
    }

    /// Bind to a concrete value inside `[min, max]`.
    pub fn bind(&self, value: i64) -> Result<Self> {
        snafu::ensure!(
            (self.min..=self.max).contains(&value),
            BindValueOutOfRangeSnafu { value, min: self.min, max: self.max }
        );
        Ok(Self { value: Some(value), ..self.clone() })
    }

    /// Strip the bound value.
    pub fn unbind(&self) -> (Self, Option<i64>) {
        (Self { value: None, ..self.clone() }, self.value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn value(&self) -> Option<i64> {
        self.value
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(v) => write!(f, "{}={v}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

type Monomial = SmallVec<[Variable; 2]>;

/// Canonical polynomial: monomial (sorted variable multiset) to coefficient.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Poly {
    terms: BTreeMap<Monomial, i64>,
}

/// Symbolic integer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SInt {
    Const(i64),
    Expr(Arc<Poly>),
}

impl SInt {
    fn from_terms(mut terms: BTreeMap<Monomial, i64>) -> Self {
        terms.retain(|_, c| *c != 0);
        match terms.len() {
            0 => SInt::Const(0),
            1 if terms.contains_key(&Monomial::new()) => SInt::Const(terms[&Monomial::new()]),
            _ => SInt::Expr(Arc::new(Poly { terms })),
        }
    }

    fn terms(&self) -> BTreeMap<Monomial, i64> {
        match self {
            SInt::Const(c) => BTreeMap::from([(Monomial::new(), *c)]),
            SInt::Expr(p) => p.terms.clone(),
        }
    }

    pub fn var(var: Variable) -> Self {
        let mut mono = Monomial::new();
        mono.push(var);
        Self::from_terms(BTreeMap::from([(mono, 1)]))
    }

    pub fn is_const(&self) -> bool {
        matches!(self, SInt::Const(_))
    }

    pub fn as_const(&self) -> Option<i64> {
        match self {
            SInt::Const(c) => Some(*c),
            SInt::Expr(_) => None,
        }
    }

    /// Iterate `(coefficient, variables)` terms; the constant term has no variables.
    pub fn iter_terms(&self) -> impl Iterator<Item = (i64, Vec<Variable>)> + '_ {
        self.terms().into_iter().map(|(mono, c)| (c, mono.into_vec()))
    }

    /// Lower bound over all variable assignments within their ranges.
    pub fn vmin(&self) -> i64 {
        self.bounds().0
    }

    /// Upper bound over all variable assignments within their ranges.
    pub fn vmax(&self) -> i64 {
        self.bounds().1
    }

    fn bounds(&self) -> (i64, i64) {
        let mut lo = 0i64;
        let mut hi = 0i64;
        for (mono, coeff) in self.terms() {
            let (mut mlo, mut mhi) = (1i64, 1i64);
            for v in &mono {
                let corners = [
                    mlo.saturating_mul(v.min),
                    mlo.saturating_mul(v.max),
                    mhi.saturating_mul(v.min),
                    mhi.saturating_mul(v.max),
                ];
                mlo = corners.iter().copied().min().unwrap_or(0);
                mhi = corners.iter().copied().max().unwrap_or(0);
            }
            let (a, b) = (mlo.saturating_mul(coeff), mhi.saturating_mul(coeff));
            lo = lo.saturating_add(a.min(b));
            hi = hi.saturating_add(a.max(b));
        }
        (lo, hi)
    }

    /// `Some(true)` if `self < other` for every assignment, `Some(false)` if never.
    pub fn try_lt(&self, other: &SInt) -> Option<bool> {
        let diff = self - other;
        if diff.vmax() < 0 {
            Some(true)
        } else if diff.vmin() >= 0 {
            Some(false)
        } else {
            None
        }
    }

    /// Decidable maximum of two symbolic integers.
    pub fn smax(&self, other: &SInt) -> Option<SInt> {
        Some(if self.try_lt(other)? { other.clone() } else { self.clone() })
    }

    /// Decidable minimum of two symbolic integers.
    pub fn smin(&self, other: &SInt) -> Option<SInt> {
        Some(if self.try_lt(other)? { self.clone() } else { other.clone() })
    }

    /// Divide every coefficient by `d`, if all are divisible.
    pub fn div_exact(&self, d: i64) -> Option<SInt> {
        if d == 0 {
            return None;
        }
        let mut terms = self.terms();
        for c in terms.values_mut() {
            if *c % d != 0 {
                return None;
            }
            *c /= d;
        }
        Some(Self::from_terms(terms))
    }

    /// Replace variables for which `f` yields a value.
    pub fn substitute(&self, f: &impl Fn(&Variable) -> Option<i64>) -> SInt {
        let SInt::Expr(poly) = self else { return self.clone() };
        let mut out = BTreeMap::new();
        for (mono, coeff) in &poly.terms {
            let mut c = *coeff;
            let mut rest = Monomial::new();
            for v in mono {
                match f(v) {
                    Some(val) => c = c.wrapping_mul(val),
                    None => rest.push(v.clone()),
                }
            }
            *out.entry(rest).or_insert(0) += c;
        }
        Self::from_terms(out)
    }

    /// Evaluate using each variable's bound value.
    pub fn eval_bound(&self) -> Option<i64> {
        self.substitute(&|v: &Variable| v.value()).as_const()
    }

    /// Evaluate against `name → value` bindings, falling back to bound values.
    pub fn eval(&self, bindings: &HashMap<String, i64>) -> Option<i64> {
        self.substitute(&|v: &Variable| bindings.get(v.name()).copied().or(v.value())).as_const()
    }

    /// Strip bound values from every variable, returning the bindings found.
    pub fn unbind(&self) -> (SInt, BTreeMap<Variable, i64>) {
        let SInt::Expr(poly) = self else { return (self.clone(), BTreeMap::new()) };
        let mut bindings = BTreeMap::new();
        let mut out = BTreeMap::new();
        for (mono, coeff) in &poly.terms {
            let mut unbound = Monomial::new();
            for v in mono {
                let (u, val) = v.unbind();
                if let Some(val) = val {
                    bindings.insert(u.clone(), val);
                }
                unbound.push(u);
            }
            unbound.sort();
            *out.entry(unbound).or_insert(0) += *coeff;
        }
        (Self::from_terms(out), bindings)
    }

    pub fn vars(&self) -> BTreeSet<Variable> {
        match self {
            SInt::Const(_) => BTreeSet::new(),
            SInt::Expr(p) => p.terms.keys().flat_map(|m| m.iter().cloned()).collect(),
        }
    }
}

impl From<i64> for SInt {
    fn from(v: i64) -> Self {
        SInt::Const(v)
    }
}

impl From<usize> for SInt {
    fn from(v: usize) -> Self {
        SInt::Const(v as i64)
    }
}

impl From<i32> for SInt {
    fn from(v: i32) -> Self {
        SInt::Const(v as i64)
    }
}

impl From<Variable> for SInt {
    fn from(v: Variable) -> Self {
        SInt::var(v)
    }
}

impl PartialEq<i64> for SInt {
    fn eq(&self, other: &i64) -> bool {
        self.as_const() == Some(*other)
    }
}

impl Add for &SInt {
    type Output = SInt;

    fn add(self, rhs: &SInt) -> SInt {
        if let (SInt::Const(a), SInt::Const(b)) = (self, rhs) {
            return SInt::Const(a.wrapping_add(*b));
        }
        let mut terms = self.terms();
        for (mono, c) in rhs.terms() {
            *terms.entry(mono).or_insert(0) += c;
        }
        SInt::from_terms(terms)
    }
}

impl Neg for &SInt {
    type Output = SInt;

    fn neg(self) -> SInt {
        self * &SInt::Const(-1)
    }
}

impl Sub for &SInt {
    type Output = SInt;

    fn sub(self, rhs: &SInt) -> SInt {
        self + &(-rhs)
    }
}

impl Mul for &SInt {
    type Output = SInt;

    fn mul(self, rhs: &SInt) -> SInt {
        if let (SInt::Const(a), SInt::Const(b)) = (self, rhs) {
            return SInt::Const(a.wrapping_mul(*b));
        }
        let mut terms = BTreeMap::new();
        for (ma, ca) in self.terms() {
            for (mb, cb) in rhs.terms() {
                let mut mono: Monomial = ma.iter().chain(mb.iter()).cloned().collect();
                mono.sort();
                *terms.entry(mono).or_insert(0) += ca.wrapping_mul(cb);
            }
        }
        SInt::from_terms(terms)
    }
}

macro_rules! forward_owned_ops {
    ($($trait:ident :: $method:ident),*) => {
        $(
            impl $trait for SInt {
                type Output = SInt;
                fn $method(self, rhs: SInt) -> SInt {
                    (&self).$method(&rhs)
                }
            }

            impl $trait<i64> for &SInt {
                type Output = SInt;
                fn $method(self, rhs: i64) -> SInt {
                    self.$method(&SInt::Const(rhs))
                }
            }

            impl $trait<i64> for SInt {
                type Output = SInt;
                fn $method(self, rhs: i64) -> SInt {
                    (&self).$method(&SInt::Const(rhs))
                }
            }
        )*
    };
}

forward_owned_ops!(Add::add, Sub::sub, Mul::mul);

impl fmt::Display for SInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let SInt::Expr(poly) = self else {
            return write!(f, "{}", self.as_const().unwrap_or_default());
        };
        // Highest-degree terms first, constant last.
        for (i, (mono, coeff)) in poly.terms.iter().rev().enumerate() {
            let sign = if *coeff < 0 { "-" } else if i > 0 { "+" } else { "" };
            f.write_str(sign)?;
            let abs = coeff.unsigned_abs();
            if mono.is_empty() {
                write!(f, "{abs}")?;
                continue;
            }
            if abs != 1 {
                write!(f, "{abs}*")?;
            }
            let names: Vec<&str> = mono.iter().map(|v| v.name()).collect();
            f.write_str(&names.join("*"))?;
        }
        Ok(())
    }
}

impl fmt::Debug for SInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Product of symbolic integers (1 for an empty iterator).
pub fn sint_prod<'a>(values: impl IntoIterator<Item = &'a SInt>) -> SInt {
    values.into_iter().fold(SInt::Const(1), |acc, v| &acc * v)
}
