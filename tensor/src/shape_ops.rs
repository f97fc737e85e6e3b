//! Shape manipulation operations for Tensors.
//!
//! Every operation here is a movement: it rewrites the [`ShapeTracker`] of
//! the tensor's view and never creates compute. Movements that land back on
//! the base's contiguous layout return the base itself.
//!
//! - Reshape: change shape while preserving total elements
//! - Permute / Transpose: reorder dimensions
//! - Expand: broadcast dimensions of size 1
//! - Pad / Shrink: grow with masked zeros or take a window
//! - Flip / Stride: reverse or step through dimensions
//! - Squeeze / Unsqueeze / Flatten: add or remove unit dimensions

use snafu::{OptionExt, ResultExt, ensure};
use tessera_ir::{SInt, Shape, ShapeTracker};

use crate::error::*;
use crate::Tensor;

impl Tensor {
    fn apply_movement(
        &self,
        apply: impl FnOnce(&ShapeTracker) -> tessera_ir::Result<ShapeTracker>,
    ) -> Result<Tensor> {
        self.lazy.movement(apply).map(Self::new).context(IrSnafu)
    }

    /// Reshape tensor to a new shape.
    ///
    /// The total number of elements must remain the same.
    /// Supports negative indices: -1 means "infer this dimension".
    ///
    /// ```ignore
    /// let t = Tensor::from_slice([1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0])?;
    /// let reshaped = t.try_reshape(&[2, 3])?;  // [6] -> [2, 3]
    /// let inferred = t.try_reshape(&[-1, 2])?; // [6] -> [3, 2]
    /// ```
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Shape contains negative values other than -1
    /// - Multiple -1 dimensions specified
    /// - Total elements don't match
    #[track_caller]
    pub fn try_reshape(&self, new_shape: &[isize]) -> Result<Tensor> {
        let shape = self.resolve_shape_with_inference(new_shape)?;
        self.try_reshape_symbolic(&shape)
    }

    /// Reshape to dimensions that may contain symbolic variables.
    pub fn try_reshape_symbolic(&self, new_shape: &[SInt]) -> Result<Tensor> {
        if new_shape == self.shape() {
            return Ok(self.clone());
        }
        self.apply_movement(|st| st.reshape(new_shape))
    }

    /// Permute (reorder) tensor dimensions.
    ///
    /// Each axis index 0..ndim must appear exactly once; negative indices
    /// count from the end.
    ///
    /// # Errors
    ///
    /// Returns error if axes is not a valid permutation.
    #[track_caller]
    pub fn try_permute(&self, axes: &[isize]) -> Result<Tensor> {
        let ndim = self.ndim();
        let normalized = self.normalize_axes(axes, ndim)?;
        if normalized.iter().enumerate().all(|(i, &a)| i == a) {
            return Ok(self.clone());
        }
        self.apply_movement(|st| st.permute(&normalized))
    }

    /// Swap two dimensions.
    #[track_caller]
    pub fn try_transpose(&self, dim0: isize, dim1: isize) -> Result<Tensor> {
        let ndim = self.ndim();
        let d0 = Self::normalize_axis(dim0, ndim)?;
        let d1 = Self::normalize_axis(dim1, ndim)?;

        let mut axes: Vec<isize> = (0..ndim as isize).collect();
        axes.swap(d0, d1);
        self.try_permute(&axes)
    }

    /// Expand (broadcast) dimensions of size 1.
    ///
    /// Use -1 to keep the current dimension size.
    ///
    /// ```ignore
    /// // shape [1, 3, 1]
    /// t.try_expand(&[4, -1, 5])?; // shape [4, 3, 5]
    /// ```
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Number of dimensions doesn't match
    /// - A dimension other than 1 is expanded to a different size
    #[track_caller]
    pub fn try_expand(&self, new_shape: &[isize]) -> Result<Tensor> {
        let shape = self.resolve_expand_shape(new_shape)?;
        self.expand_symbolic(&shape)
    }

    pub(crate) fn expand_symbolic(&self, new_shape: &[SInt]) -> Result<Tensor> {
        if new_shape == self.shape() {
            return Ok(self.clone());
        }
        self.apply_movement(|st| st.expand(new_shape))
    }

    /// Pad each dimension with `(before, after)` zeros.
    pub fn try_pad(&self, padding: &[(usize, usize)]) -> Result<Tensor> {
        self.apply_movement(|st| st.pad(padding))
    }

    /// Keep the window `[begin, end)` of each dimension.
    pub fn try_shrink(&self, ranges: &[(usize, usize)]) -> Result<Tensor> {
        let ranges: Vec<(SInt, SInt)> = ranges.iter().map(|&(b, e)| (SInt::from(b), SInt::from(e))).collect();
        self.try_shrink_symbolic(&ranges)
    }

    /// Window with bounds that may be symbolic, e.g. `[0, n)` for a bound `n`.
    pub fn try_shrink_symbolic(&self, ranges: &[(SInt, SInt)]) -> Result<Tensor> {
        self.apply_movement(|st| st.shrink(ranges))
    }

    /// Reverse the listed axes.
    pub fn try_flip(&self, axes: &[isize]) -> Result<Tensor> {
        let ndim = self.ndim();
        let mut flags = vec![false; ndim];
        for &axis in axes {
            flags[Self::normalize_axis(axis, ndim)?] = true;
        }
        self.apply_movement(|st| st.flip(&flags))
    }

    /// Step through each dimension by `steps[i]`; negative steps walk backwards.
    pub fn try_stride(&self, steps: &[i64]) -> Result<Tensor> {
        self.apply_movement(|st| st.stride(steps))
    }

    /// Remove dimensions of size 1.
    ///
    /// With `None`, every unit dimension is removed; with `Some(axis)`, only
    /// that one, and only if it has size 1.
    #[track_caller]
    pub fn try_squeeze(&self, dim: Option<isize>) -> Result<Tensor> {
        let shape = self.shape();
        let new_shape: Shape = match dim {
            None => shape.iter().filter(|d| **d != 1).cloned().collect(),
            Some(axis) => {
                let axis = Self::normalize_axis(axis, shape.len())?;
                if shape[axis] != 1 {
                    return Ok(self.clone());
                }
                shape.iter().enumerate().filter(|&(i, _)| i != axis).map(|(_, d)| d.clone()).collect()
            }
        };
        self.try_reshape_symbolic(&new_shape)
    }

    /// Insert a dimension of size 1 before `dim`.
    #[track_caller]
    pub fn try_unsqueeze(&self, dim: isize) -> Result<Tensor> {
        let axis = Self::normalize_axis(dim, self.ndim() + 1)?;
        let mut new_shape: Shape = self.shape().iter().cloned().collect();
        new_shape.insert(axis, SInt::from(1usize));
        self.try_reshape_symbolic(&new_shape)
    }

    /// Collapse into one dimension.
    pub fn flatten(&self) -> Result<Tensor> {
        self.try_reshape_symbolic(&[self.numel()])
    }

    // ========================================================================
    // Axis and shape resolution
    // ========================================================================

    pub(crate) fn normalize_axis(axis: isize, ndim: usize) -> Result<usize> {
        let resolved = if axis < 0 { axis + ndim as isize } else { axis };
        ensure!(resolved >= 0 && (resolved as usize) < ndim, AxisOutOfRangeSnafu { axis, ndim });
        Ok(resolved as usize)
    }

    fn normalize_axes(&self, axes: &[isize], ndim: usize) -> Result<Vec<usize>> {
        ensure!(axes.len() == ndim, InvalidPermutationSnafu { axes: axes.to_vec() });
        let normalized = axes.iter().map(|&a| Self::normalize_axis(a, ndim)).collect::<Result<Vec<_>>>()?;

        let mut seen = vec![false; ndim];
        for &axis in &normalized {
            ensure!(!seen[axis], InvalidPermutationSnafu { axes: axes.to_vec() });
            seen[axis] = true;
        }
        Ok(normalized)
    }

    fn resolve_shape_with_inference(&self, new_shape: &[isize]) -> Result<Shape> {
        let mut infer = None;
        for (i, &dim) in new_shape.iter().enumerate() {
            match dim {
                -1 => {
                    ensure!(infer.is_none(), MultipleInferDimensionsSnafu);
                    infer = Some(i);
                }
                d if d < 0 => return NegativeDimensionSnafu { dim: d }.fail(),
                _ => {}
            }
        }

        let Some(infer) = infer else {
            return Ok(new_shape.iter().map(|&d| SInt::from(d as usize)).collect());
        };
        let numel = self.numel().as_const().context(SymbolicShapeUnsupportedSnafu { operation: "reshape with -1" })?;
        let known: isize = new_shape.iter().filter(|&&d| d != -1).product();
        ensure!(
            known > 0 && numel as isize % known == 0,
            InferDimensionSnafu { shape: new_shape.to_vec(), numel: numel as usize }
        );
        Ok(new_shape
            .iter()
            .enumerate()
            .map(|(i, &d)| if i == infer { SInt::from(numel / known as i64) } else { SInt::from(d as usize) })
            .collect())
    }

    fn resolve_expand_shape(&self, new_shape: &[isize]) -> Result<Shape> {
        let shape = self.shape();
        ensure!(
            new_shape.len() == shape.len(),
            BroadcastMismatchSnafu {
                lhs: shape.to_vec(),
                rhs: new_shape.iter().map(|&d| SInt::from(d.max(0) as usize)).collect::<Vec<_>>()
            }
        );
        new_shape
            .iter()
            .zip(shape)
            .map(|(&d, current)| match d {
                -1 => Ok(current.clone()),
                d if d < 0 => NegativeDimensionSnafu { dim: d }.fail(),
                d => Ok(SInt::from(d as usize)),
            })
            .collect()
    }
}
