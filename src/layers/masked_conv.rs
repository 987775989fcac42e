use super::layer::Layer;
use super::masked::{MaskedCore, MaskedLayer, MaskedLayerConfig};
use super::param::MaskedParams;
use crate::error::{MaskError, Result};
use crate::loss::RegularizationLedger;
use crate::math::Matrix;
use crate::tensor::Tensor;

/// 2D convolution with a masked kernel, lowered to a matmul via im2col.
///
/// Inputs are NHWC (`[batch, height, width, channels]`) and the kernel is
/// `[kernel_h, kernel_w, in_channels, filters]`. Padding is "same": the
/// output spatial size is `ceil(input / stride)`, with any odd padding
/// placed at the bottom/right. No bias.
pub struct MaskedConv2d {
    core: MaskedCore,
    kernel_size: (usize, usize),
    filters: usize,
    stride: usize,
    cache: Option<ConvCache>,
}

#[derive(Clone, Copy, Debug)]
struct Geometry {
    batch: usize,
    in_h: usize,
    in_w: usize,
    in_c: usize,
    out_h: usize,
    out_w: usize,
    pad_top: usize,
    pad_left: usize,
}

struct ConvCache {
    geo: Geometry,
    cols: Matrix,
    mask: Tensor,
    eff: Matrix,
    z: Tensor,
    y: Tensor,
}

impl MaskedConv2d {
    /// `stride` defaults to 1 when `None`.
    pub fn new(
        name: impl Into<String>,
        kernel_size: (usize, usize),
        filters: usize,
        stride: Option<usize>,
        config: MaskedLayerConfig,
    ) -> Result<Self> {
        let name = name.into();
        let stride = stride.unwrap_or(1);
        if filters == 0 || kernel_size.0 == 0 || kernel_size.1 == 0 || stride == 0 {
            return Err(MaskError::InvalidArchitecture {
                reason: format!(
                    "{name}: kernel {kernel_size:?}, filters {filters} and stride {stride} \
                     must all be positive"
                ),
            });
        }
        Ok(Self {
            core: MaskedCore::new(name, config),
            kernel_size,
            filters,
            stride,
            cache: None,
        })
    }

    pub fn kernel_size(&self) -> (usize, usize) {
        self.kernel_size
    }

    pub fn filters(&self) -> usize {
        self.filters
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Output extent and leading pad of one spatial axis under "same" padding.
    fn same_axis(&self, input: usize, kernel: usize) -> (usize, usize) {
        let out = (input + self.stride - 1) / self.stride;
        let needed = ((out.saturating_sub(1)) * self.stride + kernel).saturating_sub(input);
        (out, needed / 2)
    }

    fn geometry(&self, x: &Tensor) -> Result<Geometry> {
        if x.rank() != 4 {
            return Err(MaskError::InvalidInputRank {
                layer: self.core.name().to_string(),
                expected: 4,
                got: x.shape.clone(),
            });
        }
        let in_c = self.core.params()?.shape()[2];
        if x.shape[3] != in_c {
            return Err(MaskError::ShapeMismatch {
                expected: vec![x.shape[0], x.shape[1], x.shape[2], in_c],
                got: x.shape.clone(),
            });
        }
        let (out_h, pad_top) = self.same_axis(x.shape[1], self.kernel_size.0);
        let (out_w, pad_left) = self.same_axis(x.shape[2], self.kernel_size.1);
        Ok(Geometry {
            batch: x.shape[0],
            in_h: x.shape[1],
            in_w: x.shape[2],
            in_c,
            out_h,
            out_w,
            pad_top,
            pad_left,
        })
    }

    /// Input coordinate hit by output `o` and kernel tap `k`, if inside.
    fn source(&self, o: usize, k: usize, pad: usize, extent: usize) -> Option<usize> {
        let pos = (o * self.stride + k) as isize - pad as isize;
        (pos >= 0 && pos < extent as isize).then_some(pos as usize)
    }

    fn im2col(&self, x: &Tensor, g: &Geometry) -> Matrix {
        let (kh, kw) = self.kernel_size;
        let mut cols = Matrix::zeros(g.batch * g.out_h * g.out_w, kh * kw * g.in_c);
        let mut row = 0;
        for b in 0..g.batch {
            for oh in 0..g.out_h {
                for ow in 0..g.out_w {
                    for i in 0..kh {
                        let Some(ih) = self.source(oh, i, g.pad_top, g.in_h) else {
                            continue;
                        };
                        for j in 0..kw {
                            let Some(iw) = self.source(ow, j, g.pad_left, g.in_w) else {
                                continue;
                            };
                            let src = ((b * g.in_h + ih) * g.in_w + iw) * g.in_c;
                            let dst = (i * kw + j) * g.in_c;
                            for c in 0..g.in_c {
                                cols.set(row, dst + c, x.data[src + c]);
                            }
                        }
                    }
                    row += 1;
                }
            }
        }
        cols
    }

    fn col2im(&self, cols: &Matrix, g: &Geometry) -> Tensor {
        let (kh, kw) = self.kernel_size;
        let mut img = Tensor::zeros(vec![g.batch, g.in_h, g.in_w, g.in_c]);
        let mut row = 0;
        for b in 0..g.batch {
            for oh in 0..g.out_h {
                for ow in 0..g.out_w {
                    for i in 0..kh {
                        let Some(ih) = self.source(oh, i, g.pad_top, g.in_h) else {
                            continue;
                        };
                        for j in 0..kw {
                            let Some(iw) = self.source(ow, j, g.pad_left, g.in_w) else {
                                continue;
                            };
                            let dst = ((b * g.in_h + ih) * g.in_w + iw) * g.in_c;
                            let src = (i * kw + j) * g.in_c;
                            for c in 0..g.in_c {
                                img.data[dst + c] += cols.get(row, src + c);
                            }
                        }
                    }
                    row += 1;
                }
            }
        }
        img
    }

    /// The kernel tensor is already laid out as a `(kh*kw*cin) x filters`
    /// matrix in row-major order.
    fn kernel_matrix(&self, eff: Tensor) -> Matrix {
        let rows = eff.len() / self.filters;
        Matrix::from_vec(rows, self.filters, eff.data)
    }

    fn convolve(&self, cols: &Matrix, eff: &Matrix, g: &Geometry) -> Tensor {
        // (b*oh*ow) x filters is already NHWC order
        Tensor::new(
            Matrix::matmul(cols, eff).data,
            vec![g.batch, g.out_h, g.out_w, self.filters],
        )
    }
}

impl Layer for MaskedConv2d {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn build(
        &mut self,
        input_shape: &[usize],
        index: usize,
        ledger: &mut RegularizationLedger,
    ) -> Result<Vec<usize>> {
        if input_shape.len() != 3 {
            return Err(MaskError::InvalidInputRank {
                layer: self.core.name().to_string(),
                expected: 3,
                got: input_shape.to_vec(),
            });
        }
        let (kh, kw) = self.kernel_size;
        let cfg = self.core.config().clone();
        self.core.build(
            vec![kh, kw, input_shape[2], self.filters],
            |shape| cfg.initializer.generate(shape, cfg.seed, cfg.p1),
            index,
            ledger,
        )?;
        let (out_h, _) = self.same_axis(input_shape[0], kh);
        let (out_w, _) = self.same_axis(input_shape[1], kw);
        Ok(vec![out_h, out_w, self.filters])
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let g = self.geometry(x)?;
        let (_, eff) = self.core.effective()?;
        let cols = self.im2col(x, &g);
        let z = self.convolve(&cols, &self.kernel_matrix(eff), &g);
        Ok(self.core.config().activation.forward(&z))
    }

    fn forward_train(&mut self, x: &Tensor) -> Result<Tensor> {
        let g = self.geometry(x)?;
        let (mask, eff) = self.core.begin_pass()?;
        let eff = self.kernel_matrix(eff);
        let cols = self.im2col(x, &g);
        let z = self.convolve(&cols, &eff, &g);
        let y = self.core.config().activation.forward(&z);
        self.cache = Some(ConvCache {
            geo: g,
            cols,
            mask,
            eff,
            z,
            y: y.clone(),
        });
        Ok(y)
    }

    fn backward(&mut self, grad_out: &Tensor) -> Result<Tensor> {
        let cache = self.cache.as_ref().ok_or_else(|| MaskError::NoForwardPass {
            layer: self.core.name().to_string(),
        })?;
        let activation = self.core.config().activation;
        let dz = activation.backward(&cache.z, &cache.y, grad_out);
        let dz = dz.to_matrix(cache.cols.rows);
        let grad_kernel = Matrix::tr_matmul(&cache.cols, &dz);
        let grad_cols = Matrix::matmul_tr(&dz, &cache.eff);
        let grad_in = self.col2im(&grad_cols, &cache.geo);
        let mask = cache.mask.clone();
        let grad_eff = Tensor::new(grad_kernel.data, mask.shape.clone());
        self.core.accumulate_effective_grad(&grad_eff, &mask)?;
        Ok(grad_in)
    }

    fn end_pass(&mut self) {
        self.cache = None;
        self.core.end_pass();
    }

    fn zero_grad(&mut self) {
        if let Ok(p) = self.core.params_mut() {
            p.zero_grad();
        }
    }

    fn parameters(&mut self) -> Vec<&mut MaskedParams> {
        self.core.params_mut().into_iter().collect()
    }

    fn as_masked(&self) -> Option<&dyn MaskedLayer> {
        Some(self)
    }

    fn as_masked_mut(&mut self) -> Option<&mut dyn MaskedLayer> {
        Some(self)
    }

    fn describe(&self) -> String {
        let cfg = self.core.config();
        format!(
            "{}: masked conv {}x{} -> {} stride {} ({}, mask={})",
            self.core.name(),
            self.kernel_size.0,
            self.kernel_size.1,
            self.filters,
            self.stride,
            cfg.activation,
            cfg.mask_function
        )
    }
}

impl MaskedLayer for MaskedConv2d {
    fn core(&self) -> &MaskedCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MaskedCore {
        &mut self.core
    }
}
