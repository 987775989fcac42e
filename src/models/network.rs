use super::options::{conv_arch_to_string, widths_to_string, ConvSpec, MaskedLayerOptions};
use crate::activation::Activation;
use crate::error::{MaskError, Result};
use crate::layers::{
    Flatten, Layer, MaskedConv2d, MaskedDense, MaskedLayer, MaskedParams, MaxPool2d, PruneStats,
};
use crate::loss::{categorical_cross_entropy, RegularizationLedger};
use crate::optim::Optimizer;
use crate::rng::derive_layer_seeds;
use crate::tensor::Tensor;
use uuid::Uuid;

/// Losses observed during one training step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepReport {
    pub data_loss: f32,
    pub regularization_loss: f32,
}

impl StepReport {
    pub fn total(&self) -> f32 {
        self.data_loss + self.regularization_loss
    }
}

/// A chain of built layers ending in a softmax head.
///
/// The topology is fixed once assembled; weights and scores stay mutable.
pub struct Network {
    name: String,
    seed: u64,
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
    layers: Vec<Box<dyn Layer>>,
    ledger: RegularizationLedger,
}

impl Network {
    /// Build every layer in order, threading the per-sample shape through
    /// the chain and collecting regularization terms.
    fn assemble(
        name: String,
        seed: u64,
        input_shape: Vec<usize>,
        mut layers: Vec<Box<dyn Layer>>,
    ) -> Result<Self> {
        let mut ledger = RegularizationLedger::new();
        let mut shape = input_shape.clone();
        for (i, layer) in layers.iter_mut().enumerate() {
            shape = layer.build(&shape, i, &mut ledger)?;
        }
        log::info!(
            "assembled network {name}: {} layers, {} regularization terms, output {:?}",
            layers.len(),
            ledger.len(),
            shape
        );
        Ok(Self {
            name,
            seed,
            input_shape,
            output_shape: shape,
            layers,
            ledger,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    pub fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn ledger(&self) -> &RegularizationLedger {
        &self.ledger
    }

    /// Masked layers in network order, skipping pooling and flatten.
    pub fn masked_layers(&self) -> Vec<&dyn MaskedLayer> {
        self.layers.iter().filter_map(|l| l.as_masked()).collect()
    }

    /// The `n`-th masked layer (counting masked layers only).
    pub fn masked_layer_mut(&mut self, n: usize) -> Option<&mut dyn MaskedLayer> {
        self.layers
            .iter_mut()
            .filter_map(|l| l.as_masked_mut())
            .nth(n)
    }

    /// Inference forward pass over a batch.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mut out = x.clone();
        for layer in &self.layers {
            out = layer.forward(&out)?;
        }
        Ok(out)
    }

    /// Sum of all registered regularization terms for the current scores.
    pub fn regularization_loss(&self) -> Result<f32> {
        self.ledger
            .total(|index| self.masked_at(index)?.core().regularization_mask())
    }

    fn masked_at(&self, index: usize) -> Result<&dyn MaskedLayer> {
        self.layers
            .get(index)
            .and_then(|l| l.as_masked())
            .ok_or_else(|| MaskError::InvalidArchitecture {
                reason: format!("regularization term points at non-masked layer {index}"),
            })
    }

    /// Aggregate prune statistics over every masked layer.
    pub fn prune_summary(&self) -> Result<PruneStats> {
        let mut nonzero = 0;
        let mut total = 0;
        for layer in self.masked_layers() {
            let stats = layer.prune_stats()?;
            nonzero += stats.nonzero;
            total += stats.total;
        }
        Ok(PruneStats::from_counts(nonzero, total))
    }

    /// One optimisation step on a batch with integer class `targets`:
    /// cross-entropy of the softmax head plus the registered regularizers.
    pub fn train_step(
        &mut self,
        x: &Tensor,
        targets: &[usize],
        optimizer: &mut dyn Optimizer,
    ) -> Result<StepReport> {
        let report = self.train_step_inner(x, targets, optimizer);
        for layer in self.layers.iter_mut() {
            layer.end_pass();
        }
        report
    }

    fn train_step_inner(
        &mut self,
        x: &Tensor,
        targets: &[usize],
        optimizer: &mut dyn Optimizer,
    ) -> Result<StepReport> {
        for layer in self.layers.iter_mut() {
            layer.zero_grad();
        }
        let mut out = x.clone();
        for layer in self.layers.iter_mut() {
            out = layer.forward_train(&out)?;
        }
        let (data_loss, mut grad) = categorical_cross_entropy(&out, targets)?;
        // masks cached by this pass feed the regularizer
        let regularization_loss = self.regularization_loss()?;

        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(&grad)?;
        }
        for term in self.ledger.terms() {
            if let Some(layer) = self.layers.get_mut(term.layer).and_then(|l| l.as_masked_mut()) {
                layer.core_mut().accumulate_regularization(&term.regularizer)?;
            }
        }

        let mut params: Vec<&mut MaskedParams> = self
            .layers
            .iter_mut()
            .flat_map(|l| l.parameters())
            .collect();
        optimizer.step(&mut params);

        log::trace!(
            "{} step: data loss {data_loss:.4}, regularization {regularization_loss:.4}",
            self.name
        );
        Ok(StepReport {
            data_loss,
            regularization_loss,
        })
    }

    /// One line per layer.
    pub fn describe(&self) -> String {
        let mut lines = vec![format!("{} (seed {})", self.name, self.seed)];
        lines.extend(self.layers.iter().map(|l| format!("  {}", l.describe())));
        lines.join("\n")
    }
}

/// Bookkeeping identifier: `<arch>_ID<7 hex>_S<seed>`.
fn network_name(arch: &str, seed: u64) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{arch}_ID{}_S{seed}", &id[id.len() - 7..])
}

/// Assemble a masked CNN.
///
/// Each [`ConvSpec::Conv`] entry becomes a masked convolution (stride 1,
/// same padding) and each [`ConvSpec::Pool`] a 2x2 max pool. The feature
/// map is flattened and fed through one masked dense layer per entry of
/// `dense_widths`; the last of them uses softmax. Every layer shares
/// `options.seed`.
pub fn build_conv_network(
    input_shape: &[usize],
    conv_arch: &[ConvSpec],
    dense_widths: &[usize],
    options: &MaskedLayerOptions,
) -> Result<Network> {
    if input_shape.len() != 3 {
        return Err(MaskError::InvalidInputRank {
            layer: "input".to_string(),
            expected: 3,
            got: input_shape.to_vec(),
        });
    }
    let Some((&head, hidden)) = dense_widths.split_last() else {
        return Err(MaskError::InvalidArchitecture {
            reason: "a conv network needs at least one dense width".to_string(),
        });
    };

    let seed = options.seed;
    let conv_reg = options.regularization.conv_regularizer();
    let dense_reg = options.regularization.dense_regularizer();
    let mut layers: Vec<Box<dyn Layer>> = Vec::new();

    for (i, spec) in conv_arch.iter().enumerate() {
        match *spec {
            ConvSpec::Conv { kernel, filters } => {
                layers.push(Box::new(MaskedConv2d::new(
                    format!("masked_conv2d_{i}"),
                    kernel,
                    filters,
                    Some(1),
                    options.layer_config(options.activation, seed, conv_reg),
                )?));
            }
            ConvSpec::Pool => {
                layers.push(Box::new(MaxPool2d::new(format!("max_pool2d_{i}"), 2, 2)));
            }
        }
    }
    layers.push(Box::new(Flatten::new("flatten")));
    for (i, &width) in hidden.iter().enumerate() {
        layers.push(Box::new(MaskedDense::new(
            format!("masked_dense_{i}"),
            width,
            options.layer_config(options.activation, seed, dense_reg),
        )?));
    }
    layers.push(Box::new(MaskedDense::new(
        format!("masked_dense_{}", hidden.len()),
        head,
        options.layer_config(Activation::Softmax, seed, dense_reg),
    )?));

    let arch = format!(
        "CNN{}_FC{}",
        conv_arch_to_string(conv_arch),
        widths_to_string(dense_widths)
    );
    Network::assemble(network_name(&arch, seed), seed, input_shape.to_vec(), layers)
}

/// Assemble a masked MLP from `[input, hidden..., output]`.
///
/// One seed per entry of `widths` is derived from `options.seed`. Hidden
/// layer `i` uses seed `i`; the softmax head uses the last seed, or the
/// first when there are no hidden layers.
pub fn build_dense_network(widths: &[usize], options: &MaskedLayerOptions) -> Result<Network> {
    if widths.len() < 2 {
        return Err(MaskError::InvalidArchitecture {
            reason: format!("dense architecture {widths:?} needs an input and an output width"),
        });
    }
    let seeds = derive_layer_seeds(options.seed, widths.len());
    let hidden = &widths[1..widths.len() - 1];
    let output = widths[widths.len() - 1];
    let reg = options.regularization.dense_regularizer();
    let mut layers: Vec<Box<dyn Layer>> = Vec::new();

    let head_seed = if hidden.is_empty() {
        seeds[0]
    } else {
        for (i, &width) in hidden.iter().enumerate() {
            layers.push(Box::new(MaskedDense::new(
                format!("masked_dense_{i}"),
                width,
                options.layer_config(options.activation, seeds[i], reg),
            )?));
        }
        seeds[seeds.len() - 1]
    };
    layers.push(Box::new(MaskedDense::new(
        format!("masked_dense_{}", hidden.len()),
        output,
        options.layer_config(Activation::Softmax, head_seed, reg),
    )?));

    let arch = format!("FC{}", widths_to_string(widths));
    Network::assemble(
        network_name(&arch, options.seed),
        options.seed,
        vec![widths[0]],
        layers,
    )
}
