//! Collapsing two stacked views into one.
//!
//! `merge_views(inner, outer)` looks for a single view equal to "index through
//! `outer`, unravel the result into `inner`'s shape, index through `inner`" on
//! every element that is valid in the composition. Concrete views are merged
//! by mapping each outer axis onto one coalesced inner dimension and checking
//! that no coordinate can carry into a neighbouring dimension.

use itertools::Itertools;

use super::{Mask, Shape, View};
use crate::sint::SInt;

/// Merge `outer` (applied to logical indices) on top of `inner` (closer to the
/// buffer). Returns `None` when the composition is not a single affine view.
pub fn merge_views(inner: &View, outer: &View) -> Option<View> {
    if inner.is_contiguous() {
        return Some(outer.clone());
    }
    if outer.is_contiguous() && outer.shape() == inner.shape() {
        return Some(inner.clone());
    }
    let inner_c = Concrete::of(inner)?;
    let outer_c = Concrete::of(outer)?;
    merge_concrete(&inner_c, &outer_c, outer)
}

struct Concrete {
    shape: Vec<i64>,
    strides: Vec<i64>,
    offset: i64,
    mask: Option<Vec<(i64, i64)>>,
}

impl Concrete {
    fn of(view: &View) -> Option<Self> {
        Some(Self {
            shape: view.shape().iter().map(SInt::as_const).collect::<Option<_>>()?,
            strides: view.strides().iter().map(SInt::as_const).collect::<Option<_>>()?,
            offset: view.offset().as_const()?,
            mask: match view.mask() {
                Some(m) => Some(m.iter().map(|(b, e)| Some((b.as_const()?, e.as_const()?))).collect::<Option<_>>()?),
                None => None,
            },
        })
    }

    fn range(&self, dim: usize) -> (i64, i64) {
        self.mask.as_ref().map_or((0, self.shape[dim]), |m| m[dim])
    }
}

/// A run of inner dimensions that behaves as one dimension.
#[derive(Debug)]
struct Group {
    size: i64,
    stride: i64,
    /// Row-major stride of this group within the inner shape.
    logical: i64,
    mask: Option<(i64, i64)>,
}

fn coalesce(inner: &Concrete) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    for dim in 0..inner.shape.len() {
        let size = inner.shape[dim];
        if size == 1 {
            continue;
        }
        let range = inner.range(dim);
        let mask = (range != (0, size)).then_some(range);
        let stride = inner.strides[dim];
        match groups.last_mut() {
            Some(last) if last.mask.is_none() && mask.is_none() && last.stride == size * stride => {
                last.size *= size;
                last.stride = stride;
            }
            _ => groups.push(Group { size, stride, logical: 0, mask }),
        }
    }
    let mut acc = 1;
    for g in groups.iter_mut().rev() {
        g.logical = acc;
        acc *= g.size;
    }
    groups
}

fn merge_concrete(inner: &Concrete, outer: &Concrete, outer_view: &View) -> Option<View> {
    let out_shape: Shape = outer_view.shape().iter().cloned().collect();
    let ranges: Vec<(i64, i64)> = (0..outer.shape.len()).map(|d| outer.range(d)).collect();
    if ranges.iter().any(|(b, e)| b >= e) {
        return Some(View::invalid(out_shape));
    }
    let inner_size: i64 = inner.shape.iter().product();
    let inner_empty = inner.mask.as_ref().is_some_and(|m| m.iter().any(|(b, e)| b >= e));
    if inner_size == 0 || inner_empty {
        return Some(View::invalid(out_shape));
    }

    let groups = coalesce(inner);

    // Flat position (in inner's logical space) of the first valid outer element.
    let base = outer.offset + ranges.iter().zip(&outer.strides).map(|((b, _), st)| b * st).sum::<i64>();
    if base < 0 || base >= inner_size {
        return None;
    }
    let coords: Vec<i64> = groups.iter().map(|g| (base / g.logical) % g.size).collect();

    // Assign every varying outer axis to the outermost group whose logical
    // stride divides the axis stride.
    let mut assigned: Vec<Vec<(usize, i64)>> = vec![Vec::new(); groups.len()];
    let mut new_strides = vec![0i64; outer.shape.len()];
    for (axis, (&(b, e), &st)) in ranges.iter().zip(&outer.strides).enumerate() {
        if e - b <= 1 || st == 0 {
            continue;
        }
        let g = groups.iter().position(|g| st % g.logical == 0)?;
        let m = st / groups[g].logical;
        assigned[g].push((axis, m));
        new_strides[axis] = m * groups[g].stride;
    }

    // No carries: each group coordinate must stay inside its dimension.
    for (g, group) in groups.iter().enumerate() {
        let (mut lo, mut hi) = (coords[g], coords[g]);
        for &(axis, m) in &assigned[g] {
            let span = (ranges[axis].1 - ranges[axis].0 - 1) * m;
            lo += span.min(0);
            hi += span.max(0);
        }
        if lo < 0 || hi >= group.size {
            return None;
        }
    }

    let mut mask = ranges.clone();
    for (g, group) in groups.iter().enumerate() {
        let Some((mlo, mhi)) = group.mask else { continue };
        let c = coords[g];
        match assigned[g].as_slice() {
            [] => {
                if c < mlo || c >= mhi {
                    return Some(View::invalid(out_shape));
                }
            }
            &[(axis, m)] => {
                let n = ranges[axis].1 - ranges[axis].0;
                let (t_lo, t_hi) = solve_window(c, m, mlo, mhi);
                let (t_lo, t_hi) = (t_lo.max(0), t_hi.min(n));
                if t_lo >= t_hi {
                    return Some(View::invalid(out_shape));
                }
                let start = ranges[axis].0;
                mask[axis] = (start + t_lo, start + t_hi);
            }
            many => {
                // Several axes feed one masked dimension: only exact when the
                // mask cuts along the coarsest axis and the finer axes never
                // cross a mask boundary.
                if many.iter().any(|&(_, m)| m <= 0) {
                    return None;
                }
                let ordered = many.iter().copied().sorted_by_key(|&(_, m)| std::cmp::Reverse(m)).collect::<Vec<_>>();
                let (axis, m0) = ordered[0];
                let rest: i64 = ordered[1..].iter().map(|&(a, m)| (ranges[a].1 - ranges[a].0 - 1) * m).sum();
                let span = (ranges[axis].1 - ranges[axis].0 - 1) * m0 + rest;
                if c >= mlo && c + span < mhi {
                    continue;
                }
                if c + span < mlo || c >= mhi {
                    return Some(View::invalid(out_shape));
                }
                if rest >= m0 || (mlo - c).rem_euclid(m0) != 0 || (mhi - c).rem_euclid(m0) != 0 {
                    return None;
                }
                let n = ranges[axis].1 - ranges[axis].0;
                let (t_lo, t_hi) = solve_window(c, m0, mlo, mhi);
                let (t_lo, t_hi) = (t_lo.max(0), t_hi.min(n));
                if t_lo >= t_hi {
                    return Some(View::invalid(out_shape));
                }
                let start = ranges[axis].0;
                mask[axis] = (start + t_lo, start + t_hi);
            }
        }
    }

    let inner_base: i64 = groups.iter().zip(&coords).map(|(g, c)| g.stride * c).sum();
    let shift: i64 = ranges.iter().zip(&new_strides).map(|((b, _), st)| b * st).sum();
    let offset = inner.offset + inner_base - shift;

    let strides: Shape = new_strides.into_iter().map(SInt::Const).collect();
    let mask: Mask = mask.into_iter().map(|(b, e)| (SInt::Const(b), SInt::Const(e))).collect();
    Some(View::create(out_shape, Some(strides), SInt::Const(offset), Some(mask)))
}

/// Range `[t_lo, t_hi)` of integers `t` with `lo <= c + t*m < hi` (`m != 0`).
fn solve_window(c: i64, m: i64, lo: i64, hi: i64) -> (i64, i64) {
    if m > 0 {
        (ceil_div(lo - c, m), ceil_div(hi - c, m))
    } else {
        let m = -m;
        ((c - hi).div_euclid(m) + 1, (c - lo).div_euclid(m) + 1)
    }
}

fn ceil_div(a: i64, b: i64) -> i64 {
    -((-a).div_euclid(b))
}
