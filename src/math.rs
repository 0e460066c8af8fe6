use crate::pose::Landmark;

/// 値を [in_min, in_max] から [out_min, out_max] へ線形に写す（クランプしない）
pub fn scale_value(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    let span = in_max - in_min;
    if span.abs() < f32::EPSILON {
        return out_min;
    }
    (value - in_min) * (out_max - out_min) / span + out_min
}

/// 2点間のXY距離。どちらかが欠けていれば None
pub fn distance_2d(a: Option<&Landmark>, b: Option<&Landmark>) -> Option<f32> {
    let (a, b) = (a?, b?);
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    Some((dx * dx + dy * dy).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_value() {
        assert!((scale_value(5.0, 0.0, 10.0, 0.0, 1.0) - 0.5).abs() < 1e-6);
        assert!((scale_value(0.25, 0.0, 1.0, 10.0, 20.0) - 12.5).abs() < 1e-6);
        // 範囲外もそのまま延長
        assert!((scale_value(2.0, 0.0, 1.0, 0.0, 10.0) - 20.0).abs() < 1e-6);
        // 逆向きの出力範囲
        assert!((scale_value(0.0, 0.0, 1.0, 1.0, 0.0) - 1.0).abs() < 1e-6);
        // 入力範囲が潰れている
        assert_eq!(scale_value(3.0, 1.0, 1.0, 4.0, 8.0), 4.0);
    }

    #[test]
    fn test_distance_2d() {
        let a = Landmark::new(0.0, 0.0, 5.0);
        let b = Landmark::new(0.3, 0.4, -5.0);
        let d = distance_2d(Some(&a), Some(&b)).unwrap();
        assert!((d - 0.5).abs() < 1e-6);
        assert_eq!(distance_2d(Some(&a), None), None);
        assert_eq!(distance_2d(None, Some(&b)), None);
    }
}
