use super::TrainingPair;

/// 入力・ラベルそれぞれの全要素を通した最小値と最大値
///
/// 関節ごとではなくスカラー1組で min-max 正規化する。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationBounds {
    pub input_min: f32,
    pub input_max: f32,
    pub label_min: f32,
    pub label_max: f32,
}

impl NormalizationBounds {
    pub fn fit(pairs: &[TrainingPair]) -> Self {
        let (input_min, input_max) = min_max(pairs.iter().flat_map(|p| p.input.as_slice().iter()));
        let (label_min, label_max) = min_max(pairs.iter().flat_map(|p| p.output.as_slice().iter()));
        Self {
            input_min,
            input_max,
            label_min,
            label_max,
        }
    }

    pub fn normalize_input(&self, value: f32) -> f32 {
        (value - self.input_min) / range(self.input_min, self.input_max)
    }

    pub fn normalize_label(&self, value: f32) -> f32 {
        (value - self.label_min) / range(self.label_min, self.label_max)
    }

    pub fn denormalize_label(&self, value: f32) -> f32 {
        value * range(self.label_min, self.label_max) + self.label_min
    }
}

fn min_max<'a>(values: impl Iterator<Item = &'a f32>) -> (f32, f32) {
    let (lo, hi) = values.fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if lo > hi {
        (0.0, 1.0)
    } else {
        (lo, hi)
    }
}

/// 幅ゼロの範囲は1として扱う
fn range(min: f32, max: f32) -> f32 {
    let r = max - min;
    if r.abs() < f32::EPSILON {
        1.0
    } else {
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{PoseVector, POSE_VECTOR_LEN};

    fn pair(input: f32, output: f32) -> TrainingPair {
        TrainingPair {
            input: PoseVector::from_vec(vec![input; POSE_VECTOR_LEN]).unwrap(),
            output: PoseVector::from_vec(vec![output; POSE_VECTOR_LEN]).unwrap(),
        }
    }

    #[test]
    fn test_fit_and_roundtrip() {
        let bounds = NormalizationBounds::fit(&[pair(0.2, 0.4), pair(0.6, 0.9)]);
        assert_eq!(bounds.input_min, 0.2);
        assert_eq!(bounds.input_max, 0.6);
        assert!((bounds.normalize_input(0.4) - 0.5).abs() < 1e-6);
        assert!((bounds.normalize_label(0.9) - 1.0).abs() < 1e-6);
        let back = bounds.denormalize_label(bounds.normalize_label(0.65));
        assert!((back - 0.65).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_range() {
        let bounds = NormalizationBounds::fit(&[pair(0.3, 0.3), pair(0.3, 0.3)]);
        assert!((bounds.normalize_input(0.3)).abs() < 1e-6);
        assert!((bounds.normalize_input(1.3) - 1.0).abs() < 1e-6);
        assert!((bounds.denormalize_label(0.0) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_empty_pairs() {
        let bounds = NormalizationBounds::fit(&[]);
        assert_eq!(bounds.input_min, 0.0);
        assert_eq!(bounds.input_max, 1.0);
    }
}
