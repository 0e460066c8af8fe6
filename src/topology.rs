//! 33点ボディトポロジーの静的テーブル
//!
//! 関節名→インデックス、骨格セグメント、メタボール用の四肢セグメント、
//! 胴体軸などの派生ランドマークをまとめる。デバッグ線描画と
//! メタボールビルダーは必ずここを参照する。

use crate::pose::{Landmark, Skeleton};

/// 33 ランドマークのインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LandmarkIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl LandmarkIndex {
    pub const COUNT: usize = 33;

    pub const ALL: [LandmarkIndex; Self::COUNT] = {
        use LandmarkIndex::*;
        [
            Nose, LeftEyeInner, LeftEye, LeftEyeOuter, RightEyeInner, RightEye,
            RightEyeOuter, LeftEar, RightEar, MouthLeft, MouthRight,
            LeftShoulder, RightShoulder, LeftElbow, RightElbow, LeftWrist, RightWrist,
            LeftPinky, RightPinky, LeftIndex, RightIndex, LeftThumb, RightThumb,
            LeftHip, RightHip, LeftKnee, RightKnee, LeftAnkle, RightAnkle,
            LeftHeel, RightHeel, LeftFootIndex, RightFootIndex,
        ]
    };

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// snake_case の関節名
    pub fn name(self) -> &'static str {
        use LandmarkIndex::*;
        match self {
            Nose => "nose",
            LeftEyeInner => "left_eye_inner",
            LeftEye => "left_eye",
            LeftEyeOuter => "left_eye_outer",
            RightEyeInner => "right_eye_inner",
            RightEye => "right_eye",
            RightEyeOuter => "right_eye_outer",
            LeftEar => "left_ear",
            RightEar => "right_ear",
            MouthLeft => "mouth_left",
            MouthRight => "mouth_right",
            LeftShoulder => "left_shoulder",
            RightShoulder => "right_shoulder",
            LeftElbow => "left_elbow",
            RightElbow => "right_elbow",
            LeftWrist => "left_wrist",
            RightWrist => "right_wrist",
            LeftPinky => "left_pinky",
            RightPinky => "right_pinky",
            LeftIndex => "left_index",
            RightIndex => "right_index",
            LeftThumb => "left_thumb",
            RightThumb => "right_thumb",
            LeftHip => "left_hip",
            RightHip => "right_hip",
            LeftKnee => "left_knee",
            RightKnee => "right_knee",
            LeftAnkle => "left_ankle",
            RightAnkle => "right_ankle",
            LeftHeel => "left_heel",
            RightHeel => "right_heel",
            LeftFootIndex => "left_foot_index",
            RightFootIndex => "right_foot_index",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|idx| idx.name() == name)
    }
}

/// 骨格の接続 (開始, 終了)
pub type BoneSegment = (LandmarkIndex, LandmarkIndex);

/// 骨格の接続定義（顔の9本を除いた26本）
pub const BONE_SEGMENTS: [BoneSegment; 26] = {
    use LandmarkIndex::*;
    [
        // 上半身
        (LeftShoulder, RightShoulder),
        (LeftShoulder, LeftElbow),
        (LeftElbow, LeftWrist),
        (LeftWrist, LeftPinky),
        (LeftWrist, LeftIndex),
        (LeftWrist, LeftThumb),
        (LeftPinky, LeftIndex),
        (RightShoulder, RightElbow),
        (RightElbow, RightWrist),
        (RightWrist, RightPinky),
        (RightWrist, RightIndex),
        (RightWrist, RightThumb),
        (RightPinky, RightIndex),
        // 胴体
        (LeftShoulder, LeftHip),
        (RightShoulder, RightHip),
        (LeftHip, RightHip),
        // 下半身
        (LeftHip, LeftKnee),
        (RightHip, RightKnee),
        (LeftKnee, LeftAnkle),
        (RightKnee, RightAnkle),
        (LeftAnkle, LeftHeel),
        (RightAnkle, RightHeel),
        (LeftHeel, LeftFootIndex),
        (RightHeel, RightFootIndex),
        (LeftAnkle, LeftFootIndex),
        (RightAnkle, RightFootIndex),
    ]
};

/// メタボールを直接置く関節（顔の細部と手指は除外、凹凸が出るため）
pub const LIMB_JOINTS: [LandmarkIndex; 16] = {
    use LandmarkIndex::*;
    [
        LeftShoulder, RightShoulder,
        LeftElbow, RightElbow,
        LeftWrist, RightWrist,
        LeftHip, RightHip,
        LeftKnee, RightKnee,
        LeftAnkle, RightAnkle,
        LeftHeel, RightHeel,
        LeftFootIndex, RightFootIndex,
    ]
};

/// 頭のメタボール位置
pub const HEAD_JOINT: LandmarkIndex = LandmarkIndex::Nose;

/// 中間点を補間する四肢セグメント（上腕・前腕・太もも・すね）
pub const LIMB_SEGMENTS: [BoneSegment; 8] = {
    use LandmarkIndex::*;
    [
        (LeftShoulder, LeftElbow),
        (LeftElbow, LeftWrist),
        (RightShoulder, RightElbow),
        (RightElbow, RightWrist),
        (LeftHip, LeftKnee),
        (LeftKnee, LeftAnkle),
        (RightHip, RightKnee),
        (RightKnee, RightAnkle),
    ]
};

/// 派生ランドマークの基準点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Joint(LandmarkIndex),
    Midpoint(LandmarkIndex, LandmarkIndex),
}

impl Anchor {
    /// 基準点を解決する。必要な関節が欠けていれば None
    pub fn resolve(&self, skeleton: &Skeleton, min_visibility: f32) -> Option<Landmark> {
        match *self {
            Anchor::Joint(idx) => skeleton.get_valid(idx, min_visibility).copied(),
            Anchor::Midpoint(a, b) => {
                let a = skeleton.get_valid(a, min_visibility)?;
                let b = skeleton.get_valid(b, min_visibility)?;
                Some(a.lerp(b, 0.5))
            }
        }
    }

    pub fn joints(&self) -> Vec<LandmarkIndex> {
        match *self {
            Anchor::Joint(idx) => vec![idx],
            Anchor::Midpoint(a, b) => vec![a, b],
        }
    }
}

/// 胴体軸: 腰中点 → 肩中点
pub const TORSO_AXIS: (Anchor, Anchor) = (
    Anchor::Midpoint(LandmarkIndex::LeftHip, LandmarkIndex::RightHip),
    Anchor::Midpoint(LandmarkIndex::LeftShoulder, LandmarkIndex::RightShoulder),
);

/// 胴体メタボールの補間位置（腰から肩へ）
pub const TORSO_FRACTIONS: [f32; 3] = [0.25, 0.5, 0.75];

/// `from` と `to` をtで線形補間した派生ランドマーク
pub fn derive(
    skeleton: &Skeleton,
    from: Anchor,
    to: Anchor,
    t: f32,
    min_visibility: f32,
) -> Option<Landmark> {
    let a = from.resolve(skeleton, min_visibility)?;
    let b = to.resolve(skeleton, min_visibility)?;
    Some(a.lerp(&b, t))
}

/// セグメント上の等間隔な中間点（端点は含まない）
pub fn segment_points(
    skeleton: &Skeleton,
    segment: BoneSegment,
    count: usize,
    min_visibility: f32,
) -> Option<Vec<Landmark>> {
    let a = skeleton.get_valid(segment.0, min_visibility)?;
    let b = skeleton.get_valid(segment.1, min_visibility)?;
    let step = 1.0 / (count as f32 + 1.0);
    Some((1..=count).map(|k| a.lerp(b, step * k as f32)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_index_roundtrip() {
        for (i, idx) in LandmarkIndex::ALL.iter().enumerate() {
            assert_eq!(*idx as usize, i);
            assert_eq!(LandmarkIndex::from_index(i), Some(*idx));
            assert_eq!(LandmarkIndex::from_name(idx.name()), Some(*idx));
        }
        assert_eq!(LandmarkIndex::from_index(33), None);
        assert_eq!(LandmarkIndex::from_name("tail"), None);
    }

    #[test]
    fn test_bone_segments_exclude_face() {
        assert_eq!(BONE_SEGMENTS.len(), 26);
        for (a, b) in BONE_SEGMENTS.iter() {
            assert!(*a as usize > 10 && *b as usize > 10, "{:?}-{:?}", a, b);
            assert_ne!(a, b);
        }
    }

    #[test]
    fn test_limb_segments_are_bones() {
        // 線描画とメタボールが同じ接続を使っていること
        for seg in LIMB_SEGMENTS.iter() {
            assert!(
                BONE_SEGMENTS.contains(seg),
                "limb segment {:?} missing from bone table",
                seg
            );
        }
    }

    #[test]
    fn test_limb_joints_exclude_head_and_hands() {
        use LandmarkIndex::*;
        for idx in LIMB_JOINTS.iter() {
            assert!(*idx as usize >= LeftShoulder as usize);
            assert!(![LeftPinky, RightPinky, LeftIndex, RightIndex, LeftThumb, RightThumb].contains(idx));
        }
        assert!(!LIMB_JOINTS.contains(&HEAD_JOINT));
    }

    #[test]
    fn test_derive_torso_axis() {
        use LandmarkIndex::*;
        let mut skeleton = Skeleton::empty();
        skeleton.set(LeftShoulder, Some(Landmark::new(0.4, 0.2, 0.0)));
        skeleton.set(RightShoulder, Some(Landmark::new(0.6, 0.2, 0.0)));
        skeleton.set(LeftHip, Some(Landmark::new(0.4, 0.6, 0.0)));
        skeleton.set(RightHip, Some(Landmark::new(0.6, 0.6, 0.0)));

        let (from, to) = TORSO_AXIS;
        let center = derive(&skeleton, from, to, 0.5, 0.0).unwrap();
        assert!((center.x - 0.5).abs() < 1e-6);
        assert!((center.y - 0.4).abs() < 1e-6);

        let low = derive(&skeleton, from, to, 0.25, 0.0).unwrap();
        assert!((low.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_derive_missing_joint() {
        use LandmarkIndex::*;
        let mut skeleton = Skeleton::uniform(Landmark::new(0.5, 0.5, 0.0));
        skeleton.set(RightHip, None);
        let (from, to) = TORSO_AXIS;
        assert!(derive(&skeleton, from, to, 0.5, 0.0).is_none());
    }

    #[test]
    fn test_segment_points_evenly_spaced() {
        use LandmarkIndex::*;
        let mut skeleton = Skeleton::empty();
        skeleton.set(LeftShoulder, Some(Landmark::new(0.0, 0.0, 0.0)));
        skeleton.set(LeftElbow, Some(Landmark::new(1.0, 0.0, 0.0)));

        let points = segment_points(&skeleton, (LeftShoulder, LeftElbow), 3, 0.0).unwrap();
        assert_eq!(points.len(), 3);
        let xs: Vec<f32> = points.iter().map(|p| p.x).collect();
        for (x, expected) in xs.iter().zip([0.25, 0.5, 0.75]) {
            assert!((x - expected).abs() < 1e-6);
        }
    }
}
