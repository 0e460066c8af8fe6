use nalgebra::Point3;

use crate::blob::field_position;
use crate::pose::Skeleton;
use crate::topology::BONE_SEGMENTS;

/// 骨格線の色 (RGB)
pub const SKELETON_COLOR: u32 = 0xFFFF00; // 黄色

/// ゴースト・予測の骨格線の色 (RGB)
pub const GHOST_COLOR: u32 = 0x00FFFF; // シアン

/// 背景色
pub const BACKGROUND_COLOR: u32 = 0x101018;

/// 関節マーカーの半径（ピクセル）
pub const JOINT_RADIUS: i32 = 2;

/// 場の座標での骨格線1本
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneLine {
    pub from: Point3<f32>,
    pub to: Point3<f32>,
}

/// 両端が揃っている骨だけを、メタボールと同じ鏡映で返す
pub fn bone_lines(skeleton: &Skeleton, min_visibility: f32, depth_scale: f32) -> Vec<BoneLine> {
    BONE_SEGMENTS
        .iter()
        .filter_map(|&(a, b)| {
            let a = skeleton.get_valid(a, min_visibility)?;
            let b = skeleton.get_valid(b, min_visibility)?;
            Some(BoneLine {
                from: field_position(a, depth_scale),
                to: field_position(b, depth_scale),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::synthetic::dancer;
    use crate::pose::Landmark;
    use crate::topology::LandmarkIndex;

    #[test]
    fn test_complete_skeleton_has_every_bone() {
        let lines = bone_lines(&dancer(0.0, 0.0), 0.0, 0.0);
        assert_eq!(lines.len(), BONE_SEGMENTS.len());
    }

    #[test]
    fn test_missing_joint_drops_its_bones() {
        let mut skeleton = dancer(0.0, 0.0);
        skeleton.set(LandmarkIndex::LeftWrist, None);
        let lines = bone_lines(&skeleton, 0.0, 0.0);
        // 肘-手首、手首-小指・人差し指・親指
        assert_eq!(lines.len(), BONE_SEGMENTS.len() - 4);
    }

    #[test]
    fn test_lines_use_mirror_convention() {
        let mut skeleton = Skeleton::empty();
        skeleton.set(LandmarkIndex::LeftHip, Some(Landmark::new(0.4, 0.6, 0.0)));
        skeleton.set(LandmarkIndex::RightHip, Some(Landmark::new(0.6, 0.6, 0.0)));
        let lines = bone_lines(&skeleton, 0.0, 0.0);
        assert_eq!(lines.len(), 1);
        assert!((lines[0].from.x - 0.6).abs() < 1e-6);
        assert!((lines[0].from.y - 0.4).abs() < 1e-6);
        assert!((lines[0].to.x - 0.4).abs() < 1e-6);
    }
}
