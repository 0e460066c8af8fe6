//! 単位立方体上のメタボールのスカラー場

use nalgebra::{Point3, Vector3};

use super::extract::{extract_isosurface, SurfaceMesh};

/// ボール中心で `strength / d²` が発散しないための下駄
const CENTER_EPSILON: f32 = 1e-6;

/// どのボールも届かなかったサンプルの色
const DEFAULT_COLOR: [f32; 3] = [1.0, 1.0, 1.0];

/// 点を中心とする陰関数曲面の要素
///
/// 影響半径 `sqrt(strength / subtract)` 内のサンプルに
/// `strength / (ε + d²) − subtract` を足す。strength が負なら場を削る。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metaball {
    /// 場の座標（単位立方体）での中心
    pub position: Point3<f32>,
    pub strength: f32,
    pub subtract: f32,
    /// リニアRGB (0..=1)
    pub color: [f32; 3],
}

impl Metaball {
    pub fn new(position: Point3<f32>, strength: f32, subtract: f32, color: [f32; 3]) -> Self {
        Self {
            position,
            strength,
            subtract,
            color,
        }
    }

    /// 寄与が 0 になる距離
    pub fn radius(&self) -> f32 {
        (self.strength.abs() / self.subtract.max(f32::EPSILON)).sqrt()
    }

    /// `point` での寄与。半径の外は 0
    pub fn influence(&self, point: &Point3<f32>) -> f32 {
        let d2 = (point - self.position).norm_squared();
        let value = self.strength.abs() / (CENTER_EPSILON + d2) - self.subtract;
        if value > 0.0 {
            value * self.strength.signum()
        } else {
            0.0
        }
    }
}

/// `[0, 1]³` を `resolution³` の格子で標本化したスカラー場
///
/// ボールと抽出済みの表面はこの型だけが持つ。
/// 毎フレーム `reset` → `add_ball`… → `update` の順で使う。
#[derive(Debug, Clone)]
pub struct MetaballField {
    resolution: usize,
    isolation: f32,
    max_triangles: usize,
    /// サンプル値（x が最も速く変わる）
    values: Vec<f32>,
    /// 寄与で重み付けした色
    color_sums: Vec<[f32; 3]>,
    weights: Vec<f32>,
    balls: Vec<Metaball>,
    mesh: SurfaceMesh,
}

impl MetaballField {
    pub fn new(resolution: usize, isolation: f32, max_triangles: usize) -> Self {
        let resolution = resolution.max(2);
        let n = resolution * resolution * resolution;
        Self {
            resolution,
            isolation,
            max_triangles,
            values: vec![0.0; n],
            color_sums: vec![[0.0; 3]; n],
            weights: vec![0.0; n],
            balls: Vec::new(),
            mesh: SurfaceMesh::default(),
        }
    }

    /// サンプルとボールを全部消す。表面は `update` まで前のまま
    pub fn reset(&mut self) {
        self.values.fill(0.0);
        self.color_sums.fill([0.0; 3]);
        self.weights.fill(0.0);
        self.balls.clear();
    }

    pub fn add_ball(&mut self, ball: Metaball) {
        let res = self.resolution;
        let cell = self.cell_size();
        let radius = ball.radius();
        let sign = ball.strength.signum();
        let strength = ball.strength.abs();
        let subtract = ball.subtract.max(f32::EPSILON);

        let range = |center: f32| -> (usize, usize) {
            let lo = ((center - radius) / cell).floor().max(0.0) as usize;
            let hi = ((center + radius) / cell).ceil().min((res - 1) as f32);
            if hi < 0.0 {
                return (1, 0);
            }
            (lo, hi as usize)
        };
        let (x0, x1) = range(ball.position.x);
        let (y0, y1) = range(ball.position.y);
        let (z0, z1) = range(ball.position.z);

        for iz in z0..=z1.min(res - 1) {
            let fz = iz as f32 * cell - ball.position.z;
            for iy in y0..=y1.min(res - 1) {
                let fy = iy as f32 * cell - ball.position.y;
                for ix in x0..=x1.min(res - 1) {
                    let fx = ix as f32 * cell - ball.position.x;
                    let value = strength / (CENTER_EPSILON + fx * fx + fy * fy + fz * fz) - subtract;
                    if value <= 0.0 {
                        continue;
                    }
                    let idx = self.index(ix, iy, iz);
                    self.values[idx] += value * sign;
                    if sign > 0.0 {
                        let sum = &mut self.color_sums[idx];
                        sum[0] += ball.color[0] * value;
                        sum[1] += ball.color[1] * value;
                        sum[2] += ball.color[2] * value;
                        self.weights[idx] += value;
                    }
                }
            }
        }

        self.balls.push(ball);
    }

    /// 今のサンプルから表面を抽出し直す
    pub fn update(&mut self) {
        let mut mesh = std::mem::take(&mut self.mesh);
        extract_isosurface(self, self.isolation, self.max_triangles, &mut mesh);
        self.mesh = mesh;
    }

    pub fn mesh(&self) -> &SurfaceMesh {
        &self.mesh
    }

    pub fn balls(&self) -> &[Metaball] {
        &self.balls
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn isolation(&self) -> f32 {
        self.isolation
    }

    pub fn max_triangles(&self) -> usize {
        self.max_triangles
    }

    /// 隣り合うサンプルの間隔
    pub fn cell_size(&self) -> f32 {
        1.0 / (self.resolution - 1) as f32
    }

    /// サンプル値。格子の外は 0
    pub fn value(&self, ix: usize, iy: usize, iz: usize) -> f32 {
        let res = self.resolution;
        if ix < res && iy < res && iz < res {
            self.values[self.index(ix, iy, iz)]
        } else {
            0.0
        }
    }

    /// サンプルの場の座標
    pub fn position(&self, ix: usize, iy: usize, iz: usize) -> Point3<f32> {
        let cell = self.cell_size();
        Point3::new(ix as f32 * cell, iy as f32 * cell, iz as f32 * cell)
    }

    /// サンプルの色（寄与で重み付け）
    pub fn color(&self, ix: usize, iy: usize, iz: usize) -> [f32; 3] {
        let idx = self.index(ix, iy, iz);
        let w = self.weights[idx];
        if w > 0.0 {
            let s = self.color_sums[idx];
            [s[0] / w, s[1] / w, s[2] / w]
        } else {
            DEFAULT_COLOR
        }
    }

    /// 中心差分の勾配。格子の端では片側差分
    pub fn gradient(&self, ix: usize, iy: usize, iz: usize) -> Vector3<f32> {
        let res = self.resolution;
        let axis = |i: usize, sample: &dyn Fn(usize) -> f32| -> f32 {
            let lo = i.saturating_sub(1);
            let hi = (i + 1).min(res - 1);
            if hi == lo {
                return 0.0;
            }
            (sample(hi) - sample(lo)) / (hi - lo) as f32
        };
        Vector3::new(
            axis(ix, &|x| self.value(x, iy, iz)),
            axis(iy, &|y| self.value(ix, y, iz)),
            axis(iz, &|z| self.value(ix, iy, z)),
        )
    }

    fn index(&self, ix: usize, iy: usize, iz: usize) -> usize {
        ix + iy * self.resolution + iz * self.resolution * self.resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn center_ball(strength: f32) -> Metaball {
        Metaball::new(Point3::new(0.5, 0.5, 0.5), strength, 12.0, [1.0, 0.0, 0.0])
    }

    #[test]
    fn test_radius_and_influence() {
        let ball = center_ball(0.12);
        assert!((ball.radius() - 0.1).abs() < 1e-6);
        assert!(ball.influence(&Point3::new(0.5, 0.5, 0.5)) > 1000.0);
        assert_eq!(ball.influence(&Point3::new(0.7, 0.5, 0.5)), 0.0);

        let carve = Metaball::new(Point3::new(0.5, 0.5, 0.5), -0.12, 12.0, [0.0; 3]);
        assert!(carve.influence(&Point3::new(0.55, 0.5, 0.5)) < 0.0);
    }

    #[test]
    fn test_add_ball_matches_influence() {
        let mut field = MetaballField::new(21, 80.0, 10_000);
        let ball = center_ball(0.12);
        field.add_ball(ball);

        for (ix, iy, iz) in [(10, 10, 10), (11, 10, 10), (10, 12, 9), (0, 0, 0), (20, 20, 20)] {
            let expected = ball.influence(&field.position(ix, iy, iz));
            let actual = field.value(ix, iy, iz);
            assert!(
                (expected - actual).abs() <= expected.abs() * 1e-4 + 1e-4,
                "({},{},{}): {} vs {}",
                ix, iy, iz, expected, actual
            );
        }
    }

    #[test]
    fn test_colors_blend_by_contribution() {
        let mut field = MetaballField::new(21, 80.0, 10_000);
        field.add_ball(Metaball::new(Point3::new(0.45, 0.5, 0.5), 0.12, 12.0, [1.0, 0.0, 0.0]));
        field.add_ball(Metaball::new(Point3::new(0.55, 0.5, 0.5), 0.12, 12.0, [0.0, 0.0, 1.0]));

        // 中央は半々
        let mid = field.color(10, 10, 10);
        assert!((mid[0] - 0.5).abs() < 1e-3);
        assert!((mid[2] - 0.5).abs() < 1e-3);

        // 誰も届かないサンプルは白
        assert_eq!(field.color(0, 0, 0), DEFAULT_COLOR);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut field = MetaballField::new(16, 80.0, 10_000);
        field.add_ball(center_ball(0.3));
        assert_eq!(field.balls().len(), 1);
        field.reset();
        assert!(field.balls().is_empty());
        for iz in 0..16 {
            for iy in 0..16 {
                for ix in 0..16 {
                    assert_eq!(field.value(ix, iy, iz), 0.0);
                }
            }
        }
    }

    #[test]
    fn test_ball_outside_grid_is_ignored() {
        let mut field = MetaballField::new(16, 80.0, 10_000);
        field.add_ball(Metaball::new(Point3::new(3.0, -2.0, 0.5), 0.05, 12.0, [1.0; 3]));
        assert_eq!(field.balls().len(), 1);
        assert_eq!(field.value(15, 0, 8), 0.0);
    }

    #[test]
    fn test_gradient_points_to_center() {
        let mut field = MetaballField::new(21, 80.0, 10_000);
        field.add_ball(center_ball(0.3));
        // 中心より+x側では値が中心に向かって増える
        let g = field.gradient(13, 10, 10);
        assert!(g.x < 0.0);
        assert!(g.y.abs() < 1e-3);
    }
}
