//! Address arithmetic for shape trackers.
//!
//! A tracker is rendered top view first: the top view maps loop coordinates
//! to a flat index, which is unravelled into the coordinates of the view
//! below it, and so on down to the buffer. Every view with a mask adds a
//! validity term; the result is an `Index` expression plus an optional `Bool`
//! validity expression.

use snafu::ResultExt;
use tessera_ir::shape::strides_for_shape;
use tessera_ir::{ConstValue, DType, SInt, ShapeTracker, UOpGraph, UOpId, View};

use crate::error::{IrSnafu, Result};

/// `(index, valid)` for reading or writing through `st` at `coords`.
pub fn render_st(graph: &mut UOpGraph, st: &ShapeTracker, coords: &[UOpId]) -> Result<(UOpId, Option<UOpId>)> {
    let mut views = st.views().iter().rev();
    let Some(top) = views.next() else {
        return Ok((graph.index_const(0), None));
    };
    let (mut index, mut valid) = render_view(graph, top, coords)?;
    for view in views {
        let coords = unravel(graph, view.shape(), index)?;
        let (next, next_valid) = render_view(graph, view, &coords)?;
        index = next;
        valid = and_valid(graph, valid, next_valid)?;
    }
    Ok((index, valid))
}

/// Flat offset and mask check of a single view.
pub fn render_view(graph: &mut UOpGraph, view: &View, coords: &[UOpId]) -> Result<(UOpId, Option<UOpId>)> {
    if view.is_invalid() {
        let never = graph.const_(ConstValue::Bool(false), DType::Bool);
        return Ok((graph.index_const(0), Some(never)));
    }

    let mut index: Option<UOpId> = None;
    for ((dim, stride), &coord) in view.shape().iter().zip(view.strides()).zip(coords) {
        if *dim == 1 || *stride == 0 {
            continue;
        }
        let term = if *stride == 1 {
            coord
        } else {
            let stride = render_sint(graph, stride)?;
            graph.mul(coord, stride).context(IrSnafu)?
        };
        index = Some(match index {
            Some(acc) => graph.add(acc, term).context(IrSnafu)?,
            None => term,
        });
    }
    let index = match index {
        Some(acc) if *view.offset() == 0 => acc,
        Some(acc) => {
            let offset = render_sint(graph, view.offset())?;
            graph.add(acc, offset).context(IrSnafu)?
        }
        None => render_sint(graph, view.offset())?,
    };

    let mut valid = None;
    if let Some(mask) = view.mask() {
        for ((begin, end), (dim, &coord)) in mask.iter().zip(view.shape().iter().zip(coords)) {
            if *begin != 0 {
                // begin <= coord  <=>  begin - 1 < coord
                let lower = render_sint(graph, &(begin - &SInt::Const(1)))?;
                let check = graph.lt(lower, coord).context(IrSnafu)?;
                valid = and_valid(graph, valid, Some(check))?;
            }
            if end != dim {
                let upper = render_sint(graph, end)?;
                let check = graph.lt(coord, upper).context(IrSnafu)?;
                valid = and_valid(graph, valid, Some(check))?;
            }
        }
    }
    Ok((index, valid))
}

/// Row-major coordinates of `flat` within `shape`.
pub fn unravel(graph: &mut UOpGraph, shape: &[SInt], flat: UOpId) -> Result<Vec<UOpId>> {
    let strides = strides_for_shape(shape);
    let mut coords = Vec::with_capacity(shape.len());
    for (i, (dim, stride)) in shape.iter().zip(&strides).enumerate() {
        if *dim == 1 {
            coords.push(graph.index_const(0));
            continue;
        }
        let mut coord = flat;
        if *stride != 1 {
            let stride = render_sint(graph, stride)?;
            coord = graph.idiv(coord, stride).context(IrSnafu)?;
        }
        // The outermost non-unit dimension needs no wrap.
        if shape[..i].iter().any(|d| *d != 1) {
            let dim = render_sint(graph, dim)?;
            coord = graph.modulo(coord, dim).context(IrSnafu)?;
        }
        coords.push(coord);
    }
    Ok(coords)
}

/// A symbolic integer as an `Index` expression over `DefineVar`s.
pub fn render_sint(graph: &mut UOpGraph, value: &SInt) -> Result<UOpId> {
    if let Some(c) = value.as_const() {
        return Ok(graph.index_const(c));
    }
    let mut sum: Option<UOpId> = None;
    for (coeff, vars) in value.iter_terms() {
        let mut term: Option<UOpId> = None;
        for var in vars {
            let var = graph.define_var(var);
            term = Some(match term {
                Some(t) => graph.mul(t, var).context(IrSnafu)?,
                None => var,
            });
        }
        let term = match term {
            None => graph.index_const(coeff),
            Some(t) if coeff == 1 => t,
            Some(t) => {
                let c = graph.index_const(coeff);
                graph.mul(t, c).context(IrSnafu)?
            }
        };
        sum = Some(match sum {
            Some(s) => graph.add(s, term).context(IrSnafu)?,
            None => term,
        });
    }
    Ok(sum.unwrap_or_else(|| graph.index_const(0)))
}

fn and_valid(graph: &mut UOpGraph, a: Option<UOpId>, b: Option<UOpId>) -> Result<Option<UOpId>> {
    Ok(match (a, b) {
        (Some(a), Some(b)) => Some(graph.and(a, b).context(IrSnafu)?),
        (a, b) => a.or(b),
    })
}
