use anyhow::{Context, Result};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use super::landmark::{Landmark, Skeleton};
use super::preprocess::Letterbox;
use crate::topology::LandmarkIndex;

/// モデル出力の1ランドマークあたりの値 (x, y, z, visibility, presence)
const VALUES_PER_LANDMARK: usize = 5;

/// 33点ランドマークモデル（BlazePose系）を使った姿勢検出器
///
/// 1フレームにつき最大1人。人物フラグが閾値未満なら空を返す。
pub struct PoseLandmarker {
    session: Session,
    presence_threshold: f32,
}

impl PoseLandmarker {
    /// ONNXモデルを読み込んで初期化
    pub fn new<P: AsRef<Path>>(model_path: P, presence_threshold: f32) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path.as_ref())
            .context("Failed to load pose landmark ONNX model")?;

        Ok(Self {
            session,
            presence_threshold,
        })
    }

    /// 前処理済みテンソルから骨格を検出
    ///
    /// 入力: [1, 256, 256, 3] の f32 テンソル (0.0-1.0) と前処理のレターボックス
    /// 出力: 0〜1人分の Skeleton（元画像の正規化座標）
    pub fn detect(&mut self, input: Array4<f32>, letterbox: &Letterbox) -> Result<Vec<Skeleton>> {
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs!["input_1" => input_tensor])
            .context("Inference failed")?;

        // 人物フラグ [1, 1]
        let flag: ndarray::ArrayViewD<f32> = outputs["Identity_1"]
            .try_extract_array()
            .context("Failed to extract pose flag")?;
        let presence = flag.iter().next().copied().unwrap_or(0.0);
        if presence < self.presence_threshold {
            return Ok(Vec::new());
        }

        // ランドマーク [1, 195] = 39点 × 5 (先頭33点がボディ)
        let raw: ndarray::ArrayViewD<f32> = outputs["Identity"]
            .try_extract_array()
            .context("Failed to extract landmark tensor")?;
        let values: Vec<f32> = raw.iter().copied().collect();
        anyhow::ensure!(
            values.len() >= LandmarkIndex::COUNT * VALUES_PER_LANDMARK,
            "Unexpected landmark tensor size: {}",
            values.len()
        );

        let mut skeleton = Skeleton::empty();
        for (i, slot) in skeleton.landmarks_mut().iter_mut().enumerate() {
            let v = &values[i * VALUES_PER_LANDMARK..(i + 1) * VALUES_PER_LANDMARK];
            // visibility / presence はロジット
            let visibility = sigmoid(v[3]).min(sigmoid(v[4]));
            let (x, y, z) = letterbox.to_frame(v[0], v[1], v[2]);
            *slot = Some(Landmark::new(x, y, z).with_visibility(visibility));
        }

        Ok(vec![skeleton])
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
