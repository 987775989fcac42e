use super::layer::Layer;
use super::masked::{MaskedCore, MaskedLayer, MaskedLayerConfig};
use super::param::MaskedParams;
use crate::error::{MaskError, Result};
use crate::init;
use crate::loss::RegularizationLedger;
use crate::math::Matrix;
use crate::tensor::Tensor;

/// Fully connected layer computing `act(x · (W ⊙ mask(S)))`. No bias.
pub struct MaskedDense {
    core: MaskedCore,
    units: usize,
    cache: Option<DenseCache>,
}

struct DenseCache {
    x: Matrix,
    mask: Tensor,
    eff: Matrix,
    z: Tensor,
    y: Tensor,
}

impl MaskedDense {
    pub fn new(name: impl Into<String>, units: usize, config: MaskedLayerConfig) -> Result<Self> {
        let name = name.into();
        if units == 0 {
            return Err(MaskError::InvalidArchitecture {
                reason: format!("{name}: dense width must be positive"),
            });
        }
        Ok(Self {
            core: MaskedCore::new(name, config),
            units,
            cache: None,
        })
    }

    pub fn units(&self) -> usize {
        self.units
    }

    fn input_matrix(&self, x: &Tensor) -> Result<Matrix> {
        if x.rank() != 2 {
            return Err(MaskError::InvalidInputRank {
                layer: self.core.name().to_string(),
                expected: 2,
                got: x.shape.clone(),
            });
        }
        let fan_in = self.core.params()?.shape()[0];
        if x.shape[1] != fan_in {
            return Err(MaskError::ShapeMismatch {
                expected: vec![x.shape[0], fan_in],
                got: x.shape.clone(),
            });
        }
        Ok(x.to_matrix(x.shape[0]))
    }

    fn kernel_matrix(&self, eff: Tensor) -> Matrix {
        Matrix::from_vec(eff.shape[0], eff.shape[1], eff.data)
    }
}

impl Layer for MaskedDense {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn build(
        &mut self,
        input_shape: &[usize],
        index: usize,
        ledger: &mut RegularizationLedger,
    ) -> Result<Vec<usize>> {
        if input_shape.len() != 1 {
            return Err(MaskError::InvalidInputRank {
                layer: self.core.name().to_string(),
                expected: 1,
                got: input_shape.to_vec(),
            });
        }
        let cfg = self.core.config().clone();
        self.core.build(
            vec![input_shape[0], self.units],
            |shape| init::dense_kernel(cfg.initializer, shape, cfg.seed, cfg.p1),
            index,
            ledger,
        )?;
        Ok(vec![self.units])
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let xm = self.input_matrix(x)?;
        let (_, eff) = self.core.effective()?;
        let z = Tensor::from_matrix(Matrix::matmul(&xm, &self.kernel_matrix(eff)));
        Ok(self.core.config().activation.forward(&z))
    }

    fn forward_train(&mut self, x: &Tensor) -> Result<Tensor> {
        let xm = self.input_matrix(x)?;
        let (mask, eff) = self.core.begin_pass()?;
        let eff = self.kernel_matrix(eff);
        let z = Tensor::from_matrix(Matrix::matmul(&xm, &eff));
        let y = self.core.config().activation.forward(&z);
        self.cache = Some(DenseCache {
            x: xm,
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
        let dz = dz.to_matrix(cache.x.rows);
        let grad_eff = Tensor::from_matrix(Matrix::tr_matmul(&cache.x, &dz));
        let grad_in = Tensor::from_matrix(Matrix::matmul_tr(&dz, &cache.eff));
        let mask = cache.mask.clone();
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
            "{}: masked dense -> {} ({}, mask={})",
            self.core.name(),
            self.units,
            cfg.activation,
            cfg.mask_function
        )
    }
}

impl MaskedLayer for MaskedDense {
    fn core(&self) -> &MaskedCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MaskedCore {
        &mut self.core
    }
}
