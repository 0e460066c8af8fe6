use std::collections::VecDeque;

use super::landmark::{Landmark, Skeleton};
use crate::config::SmoothingConfig;
use crate::topology::LandmarkIndex;

/// 移動平均による数値平滑化
///
/// 窓サイズが大きいほど滑らかになるが遅れも増える。
#[derive(Debug, Clone)]
pub struct NumberSmoother {
    history: VecDeque<f32>,
    window_size: usize,
}

impl NumberSmoother {
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            history: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    /// 値を追加して直近N個の平均を返す
    pub fn smooth(&mut self, value: f32) -> f32 {
        self.history.push_back(value);
        while self.history.len() > self.window_size {
            self.history.pop_front();
        }
        let sum: f32 = self.history.iter().sum();
        sum / self.history.len() as f32
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// 窓サイズを変更。小さくした場合は新しい値を残す
    pub fn set_window_size(&mut self, size: usize) {
        self.window_size = size.max(1);
        while self.history.len() > self.window_size {
            self.history.pop_front();
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }
}

/// 1関節分 (x, y, z)
#[derive(Debug, Clone)]
struct JointSmoother {
    x: NumberSmoother,
    y: NumberSmoother,
    z: NumberSmoother,
}

impl JointSmoother {
    fn new(window: usize) -> Self {
        Self {
            x: NumberSmoother::new(window),
            y: NumberSmoother::new(window),
            z: NumberSmoother::new(window),
        }
    }

    fn apply(&mut self, lm: &Landmark) -> Landmark {
        Landmark {
            x: self.x.smooth(lm.x),
            y: self.y.smooth(lm.y),
            z: self.z.smooth(lm.z),
            visibility: lm.visibility,
        }
    }

    fn reset(&mut self) {
        self.x.reset();
        self.y.reset();
        self.z.reset();
    }
}

/// アクタースロットごとのランドマーク平滑化
///
/// 関節が消えたらその関節の履歴を、アクターが消えたらスロット全体を捨てる。
pub struct SkeletonSmoother {
    window: usize,
    slots: Vec<Vec<JointSmoother>>,
}

impl SkeletonSmoother {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            slots: Vec::new(),
        }
    }

    pub fn from_config(config: &SmoothingConfig) -> Self {
        Self::new(config.window)
    }

    /// 窓サイズ1なら素通し
    pub fn is_enabled(&self) -> bool {
        self.window > 1
    }

    pub fn apply(&mut self, skeletons: &[Skeleton]) -> Vec<Skeleton> {
        if !self.is_enabled() {
            return skeletons.to_vec();
        }

        // 居なくなったアクターの履歴を破棄
        self.slots.truncate(skeletons.len());
        while self.slots.len() < skeletons.len() {
            self.slots
                .push((0..LandmarkIndex::COUNT).map(|_| JointSmoother::new(self.window)).collect());
        }

        skeletons
            .iter()
            .zip(self.slots.iter_mut())
            .map(|(skeleton, joints)| {
                let mut out = Skeleton::empty();
                for ((src, dst), joint) in skeleton
                    .landmarks()
                    .iter()
                    .zip(out.landmarks_mut().iter_mut())
                    .zip(joints.iter_mut())
                {
                    *dst = match src {
                        Some(lm) => Some(joint.apply(lm)),
                        None => {
                            joint.reset();
                            None
                        }
                    };
                }
                out
            })
            .collect()
    }

    pub fn reset(&mut self) {
        self.slots.clear();
    }
}
