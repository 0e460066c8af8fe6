use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::topology::LandmarkIndex;

/// 単一ランドマーク
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0, 下向き)
    pub y: f32,
    /// 腰基準の奥行き (おおよそ -1.0〜1.0)
    #[serde(default)]
    pub z: f32,
    /// 可視度 (0.0〜1.0)。検出器が返さない場合は None
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: None,
        }
    }

    pub fn with_visibility(mut self, visibility: f32) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// 可視度。未設定なら完全に見えているとみなす
    pub fn visibility(&self) -> f32 {
        self.visibility.unwrap_or(1.0)
    }

    /// 可視度が閾値以上か
    pub fn is_valid(&self, threshold: f32) -> bool {
        self.visibility() >= threshold
    }

    /// 線形補間。可視度は低い方を採用
    pub fn lerp(&self, other: &Landmark, t: f32) -> Landmark {
        let visibility = match (self.visibility, other.visibility) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Landmark {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
            visibility,
        }
    }
}

/// 1人分の33ランドマーク。各スロットは未検出なら None
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Option<Landmark>>", into = "Vec<Option<Landmark>>")]
pub struct Skeleton {
    landmarks: [Option<Landmark>; LandmarkIndex::COUNT],
}

impl Skeleton {
    pub fn new(landmarks: [Option<Landmark>; LandmarkIndex::COUNT]) -> Self {
        Self { landmarks }
    }

    /// 全スロット未検出
    pub fn empty() -> Self {
        Self {
            landmarks: [None; LandmarkIndex::COUNT],
        }
    }

    /// 全関節を同じ位置に置いた骨格（テスト・デバッグ用）
    pub fn uniform(landmark: Landmark) -> Self {
        Self {
            landmarks: [Some(landmark); LandmarkIndex::COUNT],
        }
    }

    pub fn get(&self, index: LandmarkIndex) -> Option<&Landmark> {
        self.landmarks[index as usize].as_ref()
    }

    /// 可視度が閾値以上のときだけ返す
    pub fn get_valid(&self, index: LandmarkIndex, min_visibility: f32) -> Option<&Landmark> {
        self.get(index).filter(|l| l.is_valid(min_visibility))
    }

    pub fn set(&mut self, index: LandmarkIndex, landmark: Option<Landmark>) {
        self.landmarks[index as usize] = landmark;
    }

    pub fn landmarks(&self) -> &[Option<Landmark>; LandmarkIndex::COUNT] {
        &self.landmarks
    }

    pub fn landmarks_mut(&mut self) -> &mut [Option<Landmark>; LandmarkIndex::COUNT] {
        &mut self.landmarks
    }

    /// 検出済みスロット数
    pub fn present_count(&self) -> usize {
        self.landmarks.iter().filter(|l| l.is_some()).count()
    }

    /// 全ランドマークを平行移動したコピー
    pub fn translated(&self, dx: f32, dy: f32) -> Skeleton {
        let mut moved = self.clone();
        for lm in moved.landmarks.iter_mut().flatten() {
            lm.x += dx;
            lm.y += dy;
        }
        moved
    }
}

impl Default for Skeleton {
    fn default() -> Self {
        Self::empty()
    }
}

impl TryFrom<Vec<Option<Landmark>>> for Skeleton {
    type Error = SessionError;

    fn try_from(value: Vec<Option<Landmark>>) -> Result<Self, Self::Error> {
        let actual = value.len();
        let landmarks: [Option<Landmark>; LandmarkIndex::COUNT] =
            value.try_into().map_err(|_| SessionError::InvalidSkeleton {
                expected: LandmarkIndex::COUNT,
                actual,
            })?;
        Ok(Self { landmarks })
    }
}

impl From<Skeleton> for Vec<Option<Landmark>> {
    fn from(skeleton: Skeleton) -> Self {
        skeleton.landmarks.to_vec()
    }
}
