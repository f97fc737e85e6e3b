use std::collections::{BTreeMap, BTreeSet};

use smallvec::SmallVec;
use snafu::ensure;

use super::{Mask, Shape, merge_views, strides_for_shape};
use crate::error::*;
use crate::sint::{SInt, Variable, sint_prod};

/// One affine re-indexing of a buffer: `offset + Σ idx[i] * strides[i]`,
/// valid only where every `idx[i]` lies inside `mask[i]`.
///
/// Views are immutable; every movement operation returns a new one.
/// `contiguous` holds exactly when the offset is zero, there is no mask and
/// the strides are the canonical row-major strides for the shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct View {
    shape: Shape,
    strides: Shape,
    offset: SInt,
    mask: Option<Mask>,
    contiguous: bool,
}

impl View {
    /// Canonicalizing constructor.
    ///
    /// Size-1 dimensions get stride 0, a mask covering the whole shape is
    /// dropped, an empty mask collapses to the all-invalid view and a masked
    /// dimension with a single valid index folds its stride into the offset.
    pub fn create(shape: Shape, strides: Option<Shape>, offset: SInt, mask: Option<Mask>) -> View {
        let mut strides = match strides {
            Some(strides) => {
                strides.iter().zip(&shape).map(|(st, d)| if *d == 1 { SInt::Const(0) } else { st.clone() }).collect()
            }
            None => strides_for_shape(&shape),
        };
        let mut offset = offset;
        let mut mask = mask;

        if let Some(m) = &mask {
            if m.iter().any(|(b, e)| b.try_lt(e) == Some(false)) {
                return View::invalid(shape);
            }
            if m.iter().zip(&shape).all(|((b, e), d)| *b == 0 && e == d) {
                mask = None;
            }
        }

        if let Some(m) = &mut mask {
            for (i, (b, e)) in m.iter_mut().enumerate() {
                if (&*e - &*b) == 1 && strides[i] != 0 {
                    offset = &offset + &(&*b * &strides[i]);
                    strides[i] = SInt::Const(0);
                }
            }
        }

        let contiguous = offset == 0 && mask.is_none() && strides == strides_for_shape(&shape);
        View { shape, strides, offset, mask, contiguous }
    }

    /// Contiguous row-major view of `shape`.
    pub fn contiguous(shape: Shape) -> View {
        View::create(shape, None, SInt::Const(0), None)
    }

    /// View over `shape` in which every element is invalid.
    pub fn invalid(shape: Shape) -> View {
        let zeros: Shape = shape.iter().map(|_| SInt::Const(0)).collect();
        let mask: Mask = shape.iter().map(|_| (SInt::Const(0), SInt::Const(0))).collect();
        View { shape, strides: zeros, offset: SInt::Const(0), mask: Some(mask), contiguous: false }
    }

    pub fn shape(&self) -> &[SInt] {
        &self.shape
    }

    pub fn strides(&self) -> &[SInt] {
        &self.strides
    }

    pub fn offset(&self) -> &SInt {
        &self.offset
    }

    pub fn mask(&self) -> Option<&[(SInt, SInt)]> {
        self.mask.as_deref()
    }

    pub fn is_contiguous(&self) -> bool {
        self.contiguous
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn size(&self) -> SInt {
        sint_prod(&self.shape)
    }

    /// All elements are masked out.
    pub fn is_invalid(&self) -> bool {
        self.mask.as_ref().is_some_and(|m| m.iter().any(|(b, e)| b.try_lt(e) == Some(false)))
    }

    // ========================================================================
    // Movement operations
    // ========================================================================

    /// Reorder axes; `axes` must be a permutation of `0..ndim`.
    pub fn permute(&self, axes: &[usize]) -> Result<View> {
        let mut seen = vec![false; self.ndim()];
        let valid = axes.len() == self.ndim()
            && axes.iter().all(|&a| a < seen.len() && !std::mem::replace(&mut seen[a], true));
        ensure!(valid, PermuteInvalidPermutationSnafu { permutation: axes.to_vec(), expected_dims: self.ndim() });

        let shape = axes.iter().map(|&a| self.shape[a].clone()).collect();
        let strides = axes.iter().map(|&a| self.strides[a].clone()).collect();
        let mask = self.mask.as_ref().map(|m| axes.iter().map(|&a| m[a].clone()).collect());
        Ok(View::create(shape, Some(strides), self.offset.clone(), mask))
    }

    /// Broadcast size-1 dimensions to `new_shape`.
    pub fn expand(&self, new_shape: &[SInt]) -> Result<View> {
        ensure!(
            new_shape.len() == self.ndim(),
            ExpandRankMismatchSnafu { input_dims: self.ndim(), output_dims: new_shape.len() }
        );
        if self.shape.iter().any(|d| *d == 0) {
            return Ok(View::contiguous(new_shape.iter().cloned().collect()));
        }

        let mut strides = self.strides.clone();
        let mut mask = self.mask.clone();
        for (dim, (old, new)) in self.shape.iter().zip(new_shape).enumerate() {
            if old == new {
                continue;
            }
            ensure!(*old == 1, ExpandInvalidDimensionSnafu { dim, input: old.clone(), output: new.clone() });
            strides[dim] = SInt::Const(0);
            if let Some(m) = &mut mask {
                m[dim] = if m[dim] == (SInt::Const(0), SInt::Const(1)) {
                    (SInt::Const(0), new.clone())
                } else {
                    (SInt::Const(0), SInt::Const(0))
                };
            }
        }
        Ok(View::create(new_shape.iter().cloned().collect(), Some(strides), self.offset.clone(), mask))
    }

    /// Zero-pad each dimension by `(before, after)`; padded elements are masked out.
    pub fn pad(&self, padding: &[(usize, usize)]) -> Result<View> {
        ensure!(
            padding.len() == self.ndim(),
            PadRankMismatchSnafu { padding_dims: padding.len(), shape_dims: self.ndim() }
        );
        if padding.iter().all(|&(b, e)| b == 0 && e == 0) {
            return Ok(self.clone());
        }
        let arg: Mask = padding
            .iter()
            .zip(&self.shape)
            .map(|(&(b, e), s)| (SInt::Const(-(b as i64)), s + e as i64))
            .collect();
        let mask: Mask = padding.iter().zip(&self.shape).map(|(&(b, _), s)| (SInt::from(b), s + b as i64)).collect();
        self.resize(&arg, Some(&mask))
    }

    /// Restrict each dimension to `[begin, end)`.
    pub fn shrink(&self, ranges: &[(SInt, SInt)]) -> Result<View> {
        ensure!(
            ranges.len() == self.ndim(),
            ShrinkRankMismatchSnafu { ranges: ranges.len(), shape_dims: self.ndim() }
        );
        for (dim, ((b, e), s)) in ranges.iter().zip(&self.shape).enumerate() {
            let ok = b.vmin() >= 0 && b.try_lt(&(e + 1)) == Some(true) && e.try_lt(&(s + 1)) == Some(true);
            ensure!(ok, ShrinkBoundsViolationSnafu { dim, begin: b.clone(), end: e.clone(), size: s.clone() });
        }
        if ranges.iter().zip(&self.shape).all(|((b, e), s)| *b == 0 && e == s) {
            return Ok(self.clone());
        }
        self.resize(ranges, None)
    }

    /// Move the window to `arg` ranges (which may extend outside the shape)
    /// and intersect the resulting mask with `mask`.
    fn resize(&self, arg: &[(SInt, SInt)], mask: Option<&[(SInt, SInt)]>) -> Result<View> {
        let shift = arg.iter().zip(&self.strides).fold(SInt::Const(0), |acc, ((b, _), st)| &acc + &(st * b));

        let clamp = |v: SInt, hi: &SInt| -> Result<SInt> {
            let v = v.smin(hi).ok_or_else(|| SymbolicMaskSnafu { bound: v.clone() }.build())?;
            v.smax(&SInt::Const(0)).ok_or_else(|| SymbolicMaskSnafu { bound: v.clone() }.build())
        };

        let mut new_mask: Option<Mask> = match &self.mask {
            Some(old) => Some(
                old.iter()
                    .zip(arg)
                    .map(|((mb, me), (b, e))| {
                        let span = e - b;
                        Ok((clamp(mb - b, &span)?, clamp(me - b, &span)?))
                    })
                    .collect::<Result<_>>()?,
            ),
            None => None,
        };
        if let Some(extra) = mask {
            new_mask = Some(match new_mask {
                None => extra.iter().cloned().collect(),
                Some(current) => current
                    .iter()
                    .zip(extra)
                    .map(|((b1, e1), (b2, e2))| {
                        let b = b1.smax(b2).ok_or_else(|| SymbolicMaskSnafu { bound: b1 - b2 }.build())?;
                        let e = e1.smin(e2).ok_or_else(|| SymbolicMaskSnafu { bound: e1 - e2 }.build())?;
                        Ok((b, e))
                    })
                    .collect::<Result<_>>()?,
            });
        }
        let shape = arg.iter().map(|(b, e)| e - b).collect();
        Ok(View::create(shape, Some(self.strides.clone()), &self.offset + &shift, new_mask))
    }

    /// Take every `|m|`-th element of each dimension; a negative multiplier
    /// also reverses the dimension.
    pub fn stride(&self, mul: &[i64]) -> Result<View> {
        ensure!(mul.len() == self.ndim(), StrideRankMismatchSnafu { multipliers: mul.len(), shape_dims: self.ndim() });
        if let Some(dim) = mul.iter().position(|&m| m == 0) {
            return StrideZeroSnafu { dim }.fail();
        }

        let ceil_div = |v: SInt, d: i64| -> Result<SInt> {
            if d == 1 {
                return Ok(v);
            }
            let c = v.as_const().ok_or_else(|| SymbolicMaskSnafu { bound: v.clone() }.build())?;
            Ok(SInt::Const((c + d - 1).div_euclid(d)))
        };

        let mut shape = Shape::new();
        let mut strides = Shape::new();
        let mut offset = self.offset.clone();
        for ((s, st), &m) in self.shape.iter().zip(&self.strides).zip(mul) {
            shape.push(ceil_div(s.clone(), m.abs())?);
            strides.push(st * m);
            if m < 0 {
                offset = &offset + &(&(s - 1) * st);
            }
        }
        let mask = match &self.mask {
            Some(old) => Some(
                old.iter()
                    .zip(&self.shape)
                    .zip(mul)
                    .map(|(((mb, me), s), &m)| {
                        let (b, e) = if m > 0 { (mb.clone(), me.clone()) } else { (s - me, s - mb) };
                        Ok((ceil_div(b, m.abs())?, ceil_div(e, m.abs())?))
                    })
                    .collect::<Result<Mask>>()?,
            ),
            None => None,
        };
        Ok(View::create(shape, Some(strides), offset, mask))
    }

    /// Reverse the flagged axes.
    pub fn flip(&self, axes: &[bool]) -> Result<View> {
        let mul: SmallVec<[i64; 4]> = axes.iter().map(|&f| if f { -1 } else { 1 }).collect();
        self.stride(&mul)
    }

    /// Reinterpret the view with `new_shape`.
    ///
    /// `Ok(None)` means the reshape is legal but cannot be expressed as a
    /// single view; the caller must stack a new view (materialize).
    pub fn reshape(&self, new_shape: &[SInt]) -> Result<Option<View>> {
        if self.shape.as_slice() == new_shape {
            return Ok(Some(self.clone()));
        }
        ensure!(
            new_shape.iter().all(|d| d.vmin() >= 0),
            ReshapeNegativeDimensionSnafu { shape: new_shape.to_vec() }
        );

        let (old_size, new_size) = (self.size(), sint_prod(new_shape));
        if old_size != new_size {
            match (old_size.eval_bound(), new_size.eval_bound()) {
                (Some(a), Some(b)) if a == b => {}
                _ if old_size.is_const() && new_size.is_const() => {
                    return ReshapeSizeMismatchSnafu { input_size: old_size, output_size: new_size }.fail();
                }
                _ => return SymbolicReshapeSnafu { from: self.shape.to_vec(), to: new_shape.to_vec() }.fail(),
            }
        }

        let new_shape: Shape = new_shape.iter().cloned().collect();
        if self.shape.iter().any(|d| *d == 0) {
            return Ok(Some(View::contiguous(new_shape)));
        }
        if self.contiguous {
            return Ok(Some(View::contiguous(new_shape)));
        }
        Ok(merge_views(self, &View::contiguous(new_shape)))
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Buffer offset of the element at `coords`, or `None` if it is masked out.
    ///
    /// Symbolic quantities are evaluated with their bound values.
    pub fn index(&self, coords: &[i64]) -> Option<i64> {
        if let Some(mask) = &self.mask {
            for ((b, e), &c) in mask.iter().zip(coords) {
                if c < b.eval_bound()? || c >= e.eval_bound()? {
                    return None;
                }
            }
        }
        let mut idx = self.offset.eval_bound()?;
        for (st, &c) in self.strides.iter().zip(coords) {
            idx += st.eval_bound()? * c;
        }
        Some(idx)
    }

    /// Strip bound values from every variable, returning the bindings.
    pub fn unbind(&self) -> (View, BTreeMap<Variable, i64>) {
        let mut bindings = BTreeMap::new();
        let mut strip = |v: &SInt| {
            let (u, b) = v.unbind();
            bindings.extend(b);
            u
        };
        let shape = self.shape.iter().map(&mut strip).collect();
        let strides = self.strides.iter().map(&mut strip).collect();
        let offset = strip(&self.offset);
        let mask = self.mask.as_ref().map(|m| m.iter().map(|(b, e)| (strip(b), strip(e))).collect());
        let view = View { shape, strides, offset, mask, contiguous: self.contiguous };
        (view, bindings)
    }

    pub fn vars(&self) -> BTreeSet<Variable> {
        let mut vars = BTreeSet::new();
        let all = self.shape.iter().chain(&self.strides).chain(std::iter::once(&self.offset));
        for v in all {
            vars.extend(v.vars());
        }
        if let Some(mask) = &self.mask {
            for (b, e) in mask {
                vars.extend(b.vars());
                vars.extend(e.vars());
            }
        }
        vars
    }
}
