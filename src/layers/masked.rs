//! State and introspection shared by the convolutional and dense masked
//! layers.

use super::param::{MaskedParams, PruneStats};
use crate::activation::Activation;
use crate::error::{MaskError, Result};
use crate::init::{self, Initializer};
use crate::loss::{RegularizationLedger, Regularizer};
use crate::masks::MaskFunction;
use crate::tensor::Tensor;

/// Per-layer settings fixed at construction time.
#[derive(Clone, Debug, PartialEq)]
pub struct MaskedLayerConfig {
    pub activation: Activation,
    pub seed: u64,
    pub initializer: Initializer,
    pub mask_function: MaskFunction,
    pub train_weight: bool,
    pub train_score: bool,
    pub p1: f32,
    pub regularizer: Option<Regularizer>,
}

/// Lifecycle of a masked layer. Parameters only exist once the input shape
/// is known.
#[derive(Clone, Debug)]
pub enum LayerState {
    Configured,
    Built(MaskedParams),
}

#[derive(Clone, Debug)]
pub struct MaskedCore {
    name: String,
    config: MaskedLayerConfig,
    state: LayerState,
    /// Mask realized by the current training pass, reused by the regularizer.
    pass_mask: Option<Tensor>,
}

impl MaskedCore {
    pub fn new(name: impl Into<String>, config: MaskedLayerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: LayerState::Configured,
            pass_mask: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &MaskedLayerConfig {
        &self.config
    }

    pub fn state(&self) -> &LayerState {
        &self.state
    }

    pub fn is_built(&self) -> bool {
        matches!(self.state, LayerState::Built(_))
    }

    fn not_built(&self) -> MaskError {
        MaskError::NotBuilt {
            layer: self.name.clone(),
        }
    }

    pub fn params(&self) -> Result<&MaskedParams> {
        match &self.state {
            LayerState::Built(p) => Ok(p),
            LayerState::Configured => Err(self.not_built()),
        }
    }

    pub fn params_mut(&mut self) -> Result<&mut MaskedParams> {
        match &mut self.state {
            LayerState::Built(p) => Ok(p),
            LayerState::Configured => Err(MaskError::NotBuilt {
                layer: self.name.clone(),
            }),
        }
    }

    /// Transition `Configured -> Built`.
    ///
    /// Creates the weight with `make_kernel` and the score with the shared
    /// score initializer, both from the layer seed, and registers the
    /// layer's regularizer under `index`. Rebuilding with the same shape is
    /// a no-op; a different shape is rejected.
    pub fn build<F>(
        &mut self,
        kernel_shape: Vec<usize>,
        make_kernel: F,
        index: usize,
        ledger: &mut RegularizationLedger,
    ) -> Result<()>
    where
        F: FnOnce(&[usize]) -> Tensor,
    {
        if let LayerState::Built(p) = &self.state {
            if p.shape() == kernel_shape.as_slice() {
                return Ok(());
            }
            return Err(MaskError::ShapeMismatch {
                expected: p.shape().to_vec(),
                got: kernel_shape,
            });
        }
        let weight = make_kernel(&kernel_shape);
        let score = init::score(&kernel_shape, self.config.seed);
        let params = MaskedParams::new(
            weight,
            score,
            self.config.train_weight,
            self.config.train_score,
        )?;
        if let Some(reg) = self.config.regularizer {
            ledger.register(index, reg);
        }
        let init = if self.config.initializer.uses_p1() {
            format!("{}(p1={})", self.config.initializer, self.config.p1)
        } else {
            self.config.initializer.to_string()
        };
        log::debug!(
            "built {} kernel {:?} init={init} mask={} seed={}",
            self.name,
            kernel_shape,
            self.config.mask_function,
            self.config.seed
        );
        self.state = LayerState::Built(params);
        Ok(())
    }

    /// Realize the mask and the effective weight from the current score.
    pub fn effective(&self) -> Result<(Tensor, Tensor)> {
        let p = self.params()?;
        let mask = p.realized_mask(self.config.mask_function);
        let eff = p.effective_weight(&mask);
        Ok((mask, eff))
    }

    /// Like [`MaskedCore::effective`], remembering the mask for the
    /// regularizer of this pass.
    pub fn begin_pass(&mut self) -> Result<(Tensor, Tensor)> {
        let (mask, eff) = self.effective()?;
        self.pass_mask = Some(mask.clone());
        Ok((mask, eff))
    }

    pub fn end_pass(&mut self) {
        self.pass_mask = None;
    }

    /// Mask the regularizer should see: the one realized by the current
    /// pass if any, otherwise a fresh one.
    pub fn regularization_mask(&self) -> Result<Tensor> {
        match &self.pass_mask {
            Some(m) => Ok(m.clone()),
            None => Ok(self.params()?.realized_mask(self.config.mask_function)),
        }
    }

    pub fn accumulate_effective_grad(&mut self, grad_eff: &Tensor, mask: &Tensor) -> Result<()> {
        let mask_fn = self.config.mask_function;
        self.params_mut()?
            .accumulate_effective_grad(grad_eff, mask, mask_fn);
        Ok(())
    }

    pub fn accumulate_regularization(&mut self, reg: &Regularizer) -> Result<()> {
        let mask = self.regularization_mask()?;
        let grad_mask = reg.mask_gradient(&mask);
        let mask_fn = self.config.mask_function;
        self.params_mut()?.accumulate_mask_grad(&grad_mask, mask_fn);
        Ok(())
    }
}

/// Read-only views and weight replacement for a built masked layer.
pub trait MaskedLayer {
    fn core(&self) -> &MaskedCore;

    fn core_mut(&mut self) -> &mut MaskedCore;

    fn activation(&self) -> Activation {
        self.core().config().activation
    }

    fn mask_function(&self) -> MaskFunction {
        self.core().config().mask_function
    }

    fn kernel_shape(&self) -> Result<&[usize]> {
        Ok(self.core().params()?.shape())
    }

    fn weight(&self) -> Result<&Tensor> {
        Ok(&self.core().params()?.weight.value)
    }

    fn score(&self) -> Result<&Tensor> {
        Ok(&self.core().params()?.score.value)
    }

    fn mask(&self) -> Result<Tensor> {
        Ok(self
            .core()
            .params()?
            .realized_mask(self.core().config().mask_function))
    }

    fn prune_stats(&self) -> Result<PruneStats> {
        Ok(PruneStats::of(&self.mask()?))
    }

    fn seed(&self) -> u64 {
        self.core().config().seed
    }

    fn set_weight(&mut self, weight: Tensor) -> Result<()> {
        self.core_mut().params_mut()?.replace_weight(weight)
    }
}
