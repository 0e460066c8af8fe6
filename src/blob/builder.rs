//! 骨格 → メタボール → 等値面
//!
//! 毎フレーム場を丸ごと作り直す。ボールの置き場所はすべて
//! `topology` のテーブルから決まる。

use nalgebra::Point3;

use super::extract::SurfaceMesh;
use super::field::{Metaball, MetaballField};
use crate::config::{BallConfig, BlobConfig};
use crate::pose::{Landmark, Skeleton};
use crate::topology::{self, HEAD_JOINT, LIMB_JOINTS, LIMB_SEGMENTS, TORSO_AXIS, TORSO_FRACTIONS};

/// アクタースロットごとの色
pub const PALETTE: [[f32; 3]; 4] = [
    [0.95, 0.45, 0.55],
    [0.35, 0.65, 0.95],
    [0.55, 0.85, 0.45],
    [0.95, 0.80, 0.30],
];

/// ボールの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BallKind {
    Joint,
    Head,
    Torso,
    Limb,
}

/// 種類ごとの強さと減衰
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrengthTable {
    pub joint: BallConfig,
    pub head: BallConfig,
    pub torso: BallConfig,
    pub limb: BallConfig,
}

impl StrengthTable {
    pub fn from_config(config: &BlobConfig) -> Self {
        Self {
            joint: config.joint,
            head: config.head,
            torso: config.torso,
            limb: config.limb,
        }
    }

    pub fn get(&self, kind: BallKind) -> BallConfig {
        match kind {
            BallKind::Joint => self.joint,
            BallKind::Head => self.head,
            BallKind::Torso => self.torso,
            BallKind::Limb => self.limb,
        }
    }
}

/// 画像座標 → 場の座標。左右と上下を反転し、zは奥行きとして中央に寄せる
pub fn field_position(landmark: &Landmark, depth_scale: f32) -> Point3<f32> {
    Point3::new(
        1.0 - landmark.x,
        1.0 - landmark.y,
        0.5 + depth_scale * landmark.z,
    )
}

/// スロット番号の色（パレットを循環）
pub fn color_for_slot(slot: usize) -> [f32; 3] {
    PALETTE[slot % PALETTE.len()]
}

/// メタボールで骨格を肉付けするビルダー
pub struct BlobBuilder {
    field: MetaballField,
    strengths: StrengthTable,
    interpolation_points: usize,
    min_visibility: f32,
    depth_scale: f32,
}

impl BlobBuilder {
    pub fn from_config(config: &BlobConfig) -> Self {
        Self {
            field: MetaballField::new(config.resolution, config.isolation, config.max_triangles),
            strengths: StrengthTable::from_config(config),
            interpolation_points: config.interpolation_points,
            min_visibility: config.min_visibility,
            depth_scale: config.depth_scale,
        }
    }

    /// 今フレームの骨格で場を作り直し、等値面を1回だけ抽出する
    pub fn update(&mut self, skeletons: &[Skeleton]) {
        self.field.reset();
        for (slot, skeleton) in skeletons.iter().enumerate() {
            self.add_skeleton(skeleton, color_for_slot(slot));
        }
        self.field.update();
    }

    fn add_skeleton(&mut self, skeleton: &Skeleton, color: [f32; 3]) {
        let min_vis = self.min_visibility;

        for &idx in LIMB_JOINTS.iter() {
            if let Some(lm) = skeleton.get_valid(idx, min_vis) {
                self.add(lm, BallKind::Joint, color);
            }
        }

        if let Some(head) = skeleton.get_valid(HEAD_JOINT, min_vis) {
            self.add(head, BallKind::Head, color);
        }

        for &t in TORSO_FRACTIONS.iter() {
            if let Some(lm) = topology::derive(skeleton, TORSO_AXIS.0, TORSO_AXIS.1, t, min_vis) {
                self.add(&lm, BallKind::Torso, color);
            }
        }

        for &segment in LIMB_SEGMENTS.iter() {
            let Some(points) =
                topology::segment_points(skeleton, segment, self.interpolation_points, min_vis)
            else {
                continue;
            };
            for lm in points.iter() {
                self.add(lm, BallKind::Limb, color);
            }
        }
    }

    fn add(&mut self, landmark: &Landmark, kind: BallKind, color: [f32; 3]) {
        let style = self.strengths.get(kind);
        self.field.add_ball(Metaball::new(
            field_position(landmark, self.depth_scale),
            style.strength,
            style.subtract,
            color,
        ));
    }

    /// 直近の update で置いたボール
    pub fn metaballs(&self) -> &[Metaball] {
        self.field.balls()
    }

    pub fn mesh(&self) -> &SurfaceMesh {
        self.field.mesh()
    }

    pub fn field(&self) -> &MetaballField {
        &self.field
    }

    pub fn interpolation_points(&self) -> usize {
        self.interpolation_points
    }

    pub fn depth_scale(&self) -> f32 {
        self.depth_scale
    }

    /// 全関節が揃った骨格1体あたりのボール数
    pub fn expected_ball_count(&self) -> usize {
        LIMB_JOINTS.len() + 1 + TORSO_FRACTIONS.len() + LIMB_SEGMENTS.len() * self.interpolation_points
    }
}
