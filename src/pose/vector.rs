use serde::{Deserialize, Serialize};

use super::landmark::{Landmark, Skeleton};
use crate::error::SessionError;
use crate::topology::LandmarkIndex;

/// ポーズベクトルの幅 (33関節 × {x, y})
pub const POSE_VECTOR_LEN: usize = LandmarkIndex::COUNT * 2;

/// 骨格の2D座標を平坦化した固定長ベクトル
///
/// `values[2i] == joint[i].x`, `values[2i + 1] == joint[i].y`。
/// z と可視度は落とすので、[`unflatten`] は完全な逆変換ではない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct PoseVector {
    values: Vec<f32>,
}

impl PoseVector {
    pub fn zeros() -> Self {
        Self {
            values: vec![0.0; POSE_VECTOR_LEN],
        }
    }

    /// 長さを検証して作成
    pub fn from_vec(values: Vec<f32>) -> Result<Self, SessionError> {
        if values.len() != POSE_VECTOR_LEN {
            return Err(SessionError::InvalidWidth {
                expected: POSE_VECTOR_LEN,
                actual: values.len(),
            });
        }
        Ok(Self { values })
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.values
    }

    /// 関節iの (x, y)
    pub fn joint(&self, index: LandmarkIndex) -> (f32, f32) {
        let i = index as usize;
        (self.values[2 * i], self.values[2 * i + 1])
    }
}

impl TryFrom<Vec<f32>> for PoseVector {
    type Error = SessionError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::from_vec(values)
    }
}

impl From<PoseVector> for Vec<f32> {
    fn from(vector: PoseVector) -> Self {
        vector.values
    }
}

/// 骨格 → ポーズベクトル。未検出の関節は 0.0
pub fn flatten(skeleton: &Skeleton) -> PoseVector {
    let mut values = Vec::with_capacity(POSE_VECTOR_LEN);
    for slot in skeleton.landmarks().iter() {
        match slot {
            Some(lm) => {
                values.push(lm.x);
                values.push(lm.y);
            }
            None => {
                values.push(0.0);
                values.push(0.0);
            }
        }
    }
    PoseVector { values }
}

/// ポーズベクトル → 骨格。z = 0、可視度 = 1 で埋める
///
/// ちょうど (0, 0) の関節は [`flatten`] が未検出を書いた値なので欠損に戻す。
pub fn unflatten(vector: &PoseVector) -> Skeleton {
    let mut skeleton = Skeleton::empty();
    for (slot, xy) in skeleton
        .landmarks_mut()
        .iter_mut()
        .zip(vector.values.chunks_exact(2))
    {
        *slot = if xy[0] == 0.0 && xy[1] == 0.0 {
            None
        } else {
            Some(Landmark::new(xy[0], xy[1], 0.0).with_visibility(1.0))
        };
    }
    skeleton
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_skeleton() -> Skeleton {
        let mut skeleton = Skeleton::empty();
        for idx in LandmarkIndex::ALL.iter() {
            let i = *idx as usize as f32;
            skeleton.set(
                *idx,
                Some(Landmark::new(i / 33.0, 1.0 - i / 33.0, 0.1 * i).with_visibility(0.5)),
            );
        }
        skeleton
    }

    #[test]
    fn test_flatten_layout() {
        let skeleton = sample_skeleton();
        let vector = flatten(&skeleton);
        assert_eq!(vector.as_slice().len(), POSE_VECTOR_LEN);
        for idx in LandmarkIndex::ALL.iter() {
            let lm = skeleton.get(*idx).unwrap();
            let i = *idx as usize;
            assert_eq!(vector.as_slice()[2 * i], lm.x);
            assert_eq!(vector.as_slice()[2 * i + 1], lm.y);
            assert_eq!(vector.joint(*idx), (lm.x, lm.y));
        }
    }

    #[test]
    fn test_flatten_missing_joints_are_zero() {
        let mut skeleton = sample_skeleton();
        skeleton.set(LandmarkIndex::LeftKnee, None);
        let vector = flatten(&skeleton);
        assert_eq!(vector.joint(LandmarkIndex::LeftKnee), (0.0, 0.0));

        let empty = flatten(&Skeleton::empty());
        assert!(empty.as_slice().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_unflatten_defaults() {
        let skeleton = unflatten(&flatten(&sample_skeleton()));
        for slot in skeleton.landmarks().iter() {
            let lm = slot.unwrap();
            assert_eq!(lm.z, 0.0);
            assert_eq!(lm.visibility, Some(1.0));
        }
    }

    #[test]
    fn test_unflatten_restores_missing_joints() {
        let mut skeleton = sample_skeleton();
        skeleton.set(LandmarkIndex::LeftElbow, None);
        let restored = unflatten(&flatten(&skeleton));
        assert!(restored.get(LandmarkIndex::LeftElbow).is_none());
        assert!(restored.get_valid(LandmarkIndex::LeftElbow, 0.0).is_none());
        // 片方の座標だけ 0 なら検出扱い
        assert!(restored.get(LandmarkIndex::Nose).is_some());

        assert!(unflatten(&PoseVector::zeros()).landmarks().iter().all(|s| s.is_none()));
    }

    #[test]
    fn test_flatten_idempotent() {
        let mut partial = sample_skeleton();
        partial.set(LandmarkIndex::Nose, None);
        partial.set(LandmarkIndex::RightAnkle, None);

        for skeleton in [sample_skeleton(), partial, Skeleton::empty()] {
            let once = flatten(&skeleton);
            let twice = flatten(&unflatten(&once));
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_from_vec_checks_width() {
        assert!(PoseVector::from_vec(vec![0.0; POSE_VECTOR_LEN]).is_ok());
        match PoseVector::from_vec(vec![0.0; 10]) {
            Err(SessionError::InvalidWidth { expected, actual }) => {
                assert_eq!(expected, POSE_VECTOR_LEN);
                assert_eq!(actual, 10);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
