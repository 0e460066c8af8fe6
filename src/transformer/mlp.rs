//! burn による小さな全結合ネットワーク
//!
//! 66 → 128 → 64 → 32 → 66（隠れ層はReLU、出力は線形）。
//! 損失は平均二乗誤差、最適化は Adam。学習は `Autodiff<NdArray>` 上で行い、
//! 推論には勾配を持たない `NdArray` 版を使う。

use burn::backend::Autodiff;
use burn::module::{AutodiffModule, Module, Param};
use burn::nn;
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::Backend;
use burn::tensor::activation::relu;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use burn_ndarray::NdArray;
use rand::prelude::*;
use rand::rngs::StdRng;

use super::normalize::NormalizationBounds;
use super::{PoseTransformer, TrainingPair};
use crate::config::TransformerConfig;
use crate::error::{SessionError, SessionResult};
use crate::pose::{PoseVector, POSE_VECTOR_LEN};

const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPSILON: f32 = 1e-7;

/// 推論用バックエンド
pub type InferenceBackend = NdArray<f32>;
/// 学習用バックエンド
pub type TrainingBackend = Autodiff<InferenceBackend>;

/// 多層パーセプトロン
#[derive(Debug, Module)]
pub struct Mlp<B: Backend> {
    layers: Vec<nn::Linear<B>>,
}

impl<B: Backend> Mlp<B> {
    /// `sizes` は入力・隠れ層・出力のユニット数。最後の層だけ線形
    ///
    /// 重みは Glorot uniform、バイアスは 0。乱数は `rng` から取るので
    /// シードが同じなら同じ初期値になる。
    pub fn new<R: Rng>(sizes: &[usize], rng: &mut R, device: &B::Device) -> Self {
        let layers = sizes
            .windows(2)
            .map(|w| glorot_linear(w[0], w[1], rng, device))
            .collect();
        Self { layers }
    }

    pub fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = self.layers.iter().map(|l| l.weight.dims()[0]).collect();
        if let Some(last) = self.layers.last() {
            sizes.push(last.weight.dims()[1]);
        }
        sizes
    }

    /// [バッチ, 入力] → [バッチ, 出力]
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len().saturating_sub(1);
        self.layers.iter().enumerate().fold(input, |x, (i, layer)| {
            let x = layer.forward(x);
            if i < last {
                relu(x)
            } else {
                x
            }
        })
    }
}

fn glorot_linear<B: Backend, R: Rng>(
    inputs: usize,
    outputs: usize,
    rng: &mut R,
    device: &B::Device,
) -> nn::Linear<B> {
    let limit = (6.0 / (inputs + outputs) as f32).sqrt();
    let weights: Vec<f32> = (0..inputs * outputs)
        .map(|_| rng.gen_range(-limit..limit))
        .collect();

    let mut linear = nn::LinearConfig::new(inputs, outputs).init(device);
    // burn の Linear の重みは [入力, 出力]
    linear.weight = Param::from_tensor(Tensor::from_data(TensorData::new(weights, [inputs, outputs]), device));
    linear.bias = Some(Param::from_tensor(Tensor::zeros([outputs], device)));
    linear
}

/// 行ごとに正規化して [行数, 66] のテンソルにする
fn to_tensor<B: Backend>(rows: &[&PoseVector], normalize: impl Fn(f32) -> f32, device: &B::Device) -> Tensor<B, 2> {
    let values: Vec<f32> = rows
        .iter()
        .flat_map(|row| row.as_slice().iter().map(|v| normalize(*v)))
        .collect();
    Tensor::from_data(TensorData::new(values, [rows.len(), POSE_VECTOR_LEN]), device)
}

/// 学習済みネットワークと正規化範囲
#[derive(Debug, Clone)]
pub struct TrainedPoseModel {
    network: Mlp<InferenceBackend>,
    bounds: NormalizationBounds,
    loss_history: Vec<f32>,
}

impl TrainedPoseModel {
    pub fn bounds(&self) -> &NormalizationBounds {
        &self.bounds
    }

    pub fn network(&self) -> &Mlp<InferenceBackend> {
        &self.network
    }

    /// エポックごとの平均損失
    pub fn loss_history(&self) -> &[f32] {
        &self.loss_history
    }

    pub fn final_loss(&self) -> Option<f32> {
        self.loss_history.last().copied()
    }
}

/// MLP による PoseTransformer
#[derive(Debug, Clone)]
pub struct MlpTransformer {
    config: TransformerConfig,
}

impl MlpTransformer {
    pub fn new(config: TransformerConfig) -> Self {
        Self { config }
    }

    pub fn from_config(config: &TransformerConfig) -> Self {
        Self::new(config.clone())
    }

    fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.config.hidden_layers.len() + 2);
        sizes.push(POSE_VECTOR_LEN);
        sizes.extend(self.config.hidden_layers.iter().copied());
        sizes.push(POSE_VECTOR_LEN);
        sizes
    }
}

impl PoseTransformer for MlpTransformer {
    type Model = TrainedPoseModel;

    fn train(&self, pairs: &[TrainingPair]) -> SessionResult<TrainedPoseModel> {
        if pairs.is_empty() {
            return Err(SessionError::Training("no training pairs".to_string()));
        }

        let device = <TrainingBackend as Backend>::Device::default();
        let bounds = NormalizationBounds::fit(pairs);

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut network = Mlp::<TrainingBackend>::new(&self.layer_sizes(), &mut rng, &device);
        let mut optimizer = AdamConfig::new()
            .with_beta_1(ADAM_BETA1)
            .with_beta_2(ADAM_BETA2)
            .with_epsilon(ADAM_EPSILON)
            .init::<TrainingBackend, Mlp<TrainingBackend>>();
        let loss_fn = MseLoss::new();
        let learning_rate = self.config.learning_rate as f64;

        let batch_size = self.config.batch_size.max(1);
        let mut order: Vec<usize> = (0..pairs.len()).collect();
        let mut loss_history = Vec::with_capacity(self.config.epochs);
        for _ in 0..self.config.epochs {
            order.shuffle(&mut rng);
            let mut total = 0.0;
            let mut batches = 0;
            for batch in order.chunks(batch_size) {
                let inputs: Vec<&PoseVector> = batch.iter().map(|&i| &pairs[i].input).collect();
                let labels: Vec<&PoseVector> = batch.iter().map(|&i| &pairs[i].output).collect();
                let x = to_tensor::<TrainingBackend>(&inputs, |v| bounds.normalize_input(v), &device);
                let y = to_tensor::<TrainingBackend>(&labels, |v| bounds.normalize_label(v), &device);

                let loss = loss_fn.forward(network.forward(x), y, Reduction::Mean);
                total += loss.clone().into_scalar().elem::<f32>();
                batches += 1;

                let grads = GradientsParams::from_grads(loss.backward(), &network);
                network = optimizer.step(learning_rate, network, grads);
            }
            let epoch_loss = total / batches.max(1) as f32;
            if !epoch_loss.is_finite() {
                return Err(SessionError::Training(format!("loss diverged: {}", epoch_loss)));
            }
            loss_history.push(epoch_loss);
        }

        Ok(TrainedPoseModel {
            network: network.valid(),
            bounds,
            loss_history,
        })
    }

    fn predict(&self, model: &TrainedPoseModel, input: &PoseVector) -> SessionResult<PoseVector> {
        let device = <InferenceBackend as Backend>::Device::default();
        let row = to_tensor::<InferenceBackend>(&[input], |v| model.bounds.normalize_input(v), &device);
        let output = model
            .network
            .forward(row)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| SessionError::Training(format!("prediction readback failed: {:?}", e)))?;
        let values = output
            .into_iter()
            .map(|v| model.bounds.denormalize_label(v))
            .collect();
        PoseVector::from_vec(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::flatten;
    use crate::pose::synthetic::dancer;

    fn pairs(count: usize) -> Vec<TrainingPair> {
        (0..count)
            .map(|i| {
                let t = i as f32 / count as f32;
                TrainingPair {
                    input: flatten(&dancer(t, 0.0)),
                    output: flatten(&dancer(t + 0.5, 0.1)),
                }
            })
            .collect()
    }

    fn seeded(epochs: usize) -> MlpTransformer {
        MlpTransformer::new(TransformerConfig {
            epochs,
            seed: Some(7),
            ..TransformerConfig::default()
        })
    }

    #[test]
    fn test_layer_sizes() {
        let device = <InferenceBackend as Backend>::Device::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mlp = Mlp::<InferenceBackend>::new(&[66, 128, 64, 32, 66], &mut rng, &device);
        assert_eq!(mlp.layer_sizes(), vec![66, 128, 64, 32, 66]);

        let out = mlp.forward(Tensor::zeros([5, 66], &device));
        assert_eq!(out.dims(), [5, 66]);
    }

    #[test]
    fn test_glorot_limits() {
        let device = <InferenceBackend as Backend>::Device::default();
        let mut rng = StdRng::seed_from_u64(2);
        let mlp = Mlp::<InferenceBackend>::new(&[66, 128], &mut rng, &device);
        let limit = (6.0f32 / (66.0 + 128.0)).sqrt();
        let weights = mlp.layers[0].weight.val().into_data().to_vec::<f32>().unwrap();
        assert_eq!(weights.len(), 66 * 128);
        assert!(weights.iter().all(|w| w.abs() <= limit));
        assert!(weights.iter().any(|w| *w != 0.0));
    }

    #[test]
    fn test_optimizer_reduces_loss() {
        let device = <TrainingBackend as Backend>::Device::default();
        let mut rng = StdRng::seed_from_u64(3);
        let mut mlp = Mlp::<TrainingBackend>::new(&[4, 8, 4], &mut rng, &device);
        let values: Vec<f32> = (0..24).map(|i| i as f32 / 24.0).collect();
        let targets: Vec<f32> = values.iter().map(|v| 1.0 - v).collect();
        let x = Tensor::<TrainingBackend, 2>::from_data(TensorData::new(values, [6, 4]), &device);
        let y = Tensor::<TrainingBackend, 2>::from_data(TensorData::new(targets, [6, 4]), &device);
        let mut adam = AdamConfig::new().init::<TrainingBackend, Mlp<TrainingBackend>>();
        let mse = MseLoss::new();

        let loss_of = |mlp: &Mlp<TrainingBackend>| -> f32 {
            mse.forward(mlp.forward(x.clone()), y.clone(), Reduction::Mean)
                .into_scalar()
                .elem::<f32>()
        };
        let before = loss_of(&mlp);
        for _ in 0..300 {
            let loss = mse.forward(mlp.forward(x.clone()), y.clone(), Reduction::Mean);
            let grads = GradientsParams::from_grads(loss.backward(), &mlp);
            mlp = adam.step(0.01, mlp, grads);
        }
        let after = loss_of(&mlp);
        assert!(after < before * 0.5, "{} -> {}", before, after);
    }

    #[test]
    fn test_train_and_predict() {
        let transformer = seeded(30);
        let model = transformer.train(&pairs(40)).unwrap();
        assert_eq!(model.loss_history().len(), 30);
        let first = model.loss_history()[0];
        let last = model.final_loss().unwrap();
        assert!(last < first, "{} -> {}", first, last);

        let predicted = transformer.predict(&model, &flatten(&dancer(0.2, 0.0))).unwrap();
        assert_eq!(predicted.as_slice().len(), POSE_VECTOR_LEN);
        assert!(predicted.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_seeded_training_is_reproducible() {
        let data = pairs(20);
        let a = seeded(3).train(&data).unwrap();
        let b = seeded(3).train(&data).unwrap();
        assert_eq!(a.loss_history(), b.loss_history());

        let input = flatten(&dancer(0.1, 0.0));
        let t = seeded(3);
        assert_eq!(t.predict(&a, &input).unwrap(), t.predict(&b, &input).unwrap());
    }

    #[test]
    fn test_empty_pairs_rejected() {
        assert!(matches!(seeded(1).train(&[]), Err(SessionError::Training(_))));
    }
}
