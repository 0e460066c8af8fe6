//! person1 のポーズを person2 のポーズへ写す回帰器
//!
//! セッションは [`PoseTransformer`] 越しにしか学習器を触らない。
//! 学習はバックグラウンドスレッドで走るので `Send + Sync` を要求する。

pub mod mlp;
pub mod normalize;

pub use mlp::{Mlp, MlpTransformer, TrainedPoseModel};
pub use normalize::NormalizationBounds;

use crate::error::SessionResult;
use crate::pose::PoseVector;

/// 学習サンプル (person1 → person2)
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingPair {
    pub input: PoseVector,
    pub output: PoseVector,
}

pub trait PoseTransformer: Send + Sync + 'static {
    /// 学習済みモデル。再学習のたびに丸ごと差し替える
    type Model: Send + 'static;

    /// ペア列から新しいモデルを作る。シード未指定なら結果は毎回変わる
    fn train(&self, pairs: &[TrainingPair]) -> SessionResult<Self::Model>;

    /// 入力と同じ幅のポーズを返す。副作用なし
    fn predict(&self, model: &Self::Model, input: &PoseVector) -> SessionResult<PoseVector>;
}
