//! 合成ポーズ（カメラなしのデモ・テスト用）

use std::f32::consts::PI;

use super::landmark::{Landmark, Skeleton};
use crate::topology::LandmarkIndex;

/// 正面立ちの基準ポーズ (x, y)。画像座標なので y は下向き
const REST_POSE: [(f32, f32); LandmarkIndex::COUNT] = [
    (0.50, 0.18), // nose
    (0.49, 0.165), (0.485, 0.165), (0.48, 0.165), // left eye
    (0.51, 0.165), (0.515, 0.165), (0.52, 0.165), // right eye
    (0.47, 0.17), (0.53, 0.17), // ears
    (0.49, 0.20), (0.51, 0.20), // mouth
    (0.44, 0.28), (0.56, 0.28), // shoulders
    (0.42, 0.40), (0.58, 0.40), // elbows
    (0.41, 0.50), (0.59, 0.50), // wrists
    (0.405, 0.53), (0.595, 0.53), // pinky
    (0.41, 0.535), (0.59, 0.535), // index
    (0.415, 0.52), (0.585, 0.52), // thumb
    (0.46, 0.52), (0.54, 0.52), // hips
    (0.455, 0.67), (0.545, 0.67), // knees
    (0.45, 0.82), (0.55, 0.82), // ankles
    (0.445, 0.84), (0.555, 0.84), // heels
    (0.46, 0.85), (0.54, 0.85), // foot index
];

/// 時刻tの踊っている骨格。x_offset で左右にずらす
pub fn dancer(t: f32, x_offset: f32) -> Skeleton {
    use LandmarkIndex::*;

    let mut skeleton = Skeleton::empty();
    for (idx, (x, y)) in LandmarkIndex::ALL.iter().zip(REST_POSE.iter()) {
        skeleton.set(*idx, Some(Landmark::new(*x + x_offset, *y, 0.0).with_visibility(0.99)));
    }

    // 体全体の上下動
    let bob = (t * 2.0 * PI).sin() * 0.01;
    for lm in skeleton.landmarks_mut().iter_mut().flatten() {
        lm.y += bob;
    }

    // 腕を肩まわりに振る
    let swing = (t * PI).sin() * 0.8;
    for (shoulder, elbow, wrist, side) in [
        (LeftShoulder, LeftElbow, LeftWrist, -1.0f32),
        (RightShoulder, RightElbow, RightWrist, 1.0f32),
    ] {
        let Some(s) = skeleton.get(shoulder).copied() else { continue };
        let angle = PI / 2.0 - side * swing;
        let elbow_pos = Landmark::new(
            s.x + side * 0.12 * angle.cos(),
            s.y + 0.12 * angle.sin(),
            0.0,
        )
        .with_visibility(0.99);
        let wrist_pos = Landmark::new(
            elbow_pos.x + side * 0.10 * (angle * 0.8).cos(),
            elbow_pos.y + 0.10 * (angle * 0.8).sin(),
            0.0,
        )
        .with_visibility(0.99);
        skeleton.set(elbow, Some(elbow_pos));
        skeleton.set(wrist, Some(wrist_pos));
    }

    // 膝を交互に曲げる
    let step = (t * 2.0 * PI).sin() * 0.02;
    if let Some(knee) = skeleton.landmarks_mut()[LeftKnee as usize].as_mut() {
        knee.x -= step;
    }
    if let Some(knee) = skeleton.landmarks_mut()[RightKnee as usize].as_mut() {
        knee.x -= step;
    }

    skeleton
}
