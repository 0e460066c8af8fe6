//! マーチングテトラヘドラによる等値面抽出
//!
//! 各セルを主対角線 (0,0,0)–(1,1,1) を共有する6つの四面体に分ける。
//! 隣のセルとは共有面の分け方が一致するので、表面に割れ目はできない。

use nalgebra::{Point3, Vector3};

use super::field::MetaballField;

/// セルの角のオフセット (0..8)
const CORNERS: [(usize, usize, usize); 8] = [
    (0, 0, 0),
    (1, 0, 0),
    (1, 1, 0),
    (0, 1, 0),
    (0, 0, 1),
    (1, 0, 1),
    (1, 1, 1),
    (0, 1, 1),
];

/// セルあたり6つの四面体（角の番号）
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 5, 1, 6],
    [0, 1, 2, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 7, 4, 6],
    [0, 4, 5, 6],
];

/// 三角形の羅列。連続する3頂点で1枚
#[derive(Debug, Clone, Default)]
pub struct SurfaceMesh {
    pub positions: Vec<Point3<f32>>,
    /// 外向きの単位法線
    pub normals: Vec<Vector3<f32>>,
    pub colors: Vec<[f32; 3]>,
    /// ポリゴン上限で表面が途中で切れた
    pub truncated: bool,
}

impl SurfaceMesh {
    pub fn clear(&mut self) {
        self.positions.clear();
        self.normals.clear();
        self.colors.clear();
        self.truncated = false;
    }

    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// 三角形ごとの3頂点
    pub fn triangles(&self) -> impl Iterator<Item = [SurfaceVertex; 3]> + '_ {
        (0..self.triangle_count()).map(move |t| {
            std::array::from_fn(|k| {
                let i = t * 3 + k;
                SurfaceVertex {
                    position: self.positions[i],
                    normal: self.normals[i],
                    color: self.colors[i],
                }
            })
        })
    }

    fn push(&mut self, vertex: &SurfaceVertex) {
        self.positions.push(vertex.position);
        self.normals.push(vertex.normal);
        self.colors.push(vertex.color);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceVertex {
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
    pub color: [f32; 3],
}

#[derive(Clone, Copy)]
struct Corner {
    value: f32,
    position: Point3<f32>,
    gradient: Vector3<f32>,
    color: [f32; 3],
}

/// `field` の `isolation` 等値面を `mesh` に書き出す（中身は置き換え）
///
/// `max_triangles` 枚に達したらそこで止める。
pub fn extract_isosurface(
    field: &MetaballField,
    isolation: f32,
    max_triangles: usize,
    mesh: &mut SurfaceMesh,
) {
    mesh.clear();
    let res = field.resolution();
    if res < 2 {
        return;
    }

    for iz in 0..res - 1 {
        for iy in 0..res - 1 {
            for ix in 0..res - 1 {
                let values: [f32; 8] =
                    std::array::from_fn(|c| field.value(ix + CORNERS[c].0, iy + CORNERS[c].1, iz + CORNERS[c].2));
                let inside = values.iter().filter(|v| **v > isolation).count();
                if inside == 0 || inside == 8 {
                    continue;
                }

                let corners: [Corner; 8] = std::array::from_fn(|c| {
                    let (x, y, z) = (ix + CORNERS[c].0, iy + CORNERS[c].1, iz + CORNERS[c].2);
                    Corner {
                        value: values[c],
                        position: field.position(x, y, z),
                        gradient: field.gradient(x, y, z),
                        color: field.color(x, y, z),
                    }
                });

                for tet in TETRAHEDRA.iter() {
                    if !polygonize_tetrahedron(&corners, tet, isolation, max_triangles, mesh) {
                        mesh.truncated = true;
                        return;
                    }
                }
            }
        }
    }
}

/// 四面体1つ分の 0〜2 枚の三角形を出す。上限に達したら false
fn polygonize_tetrahedron(
    corners: &[Corner; 8],
    tet: &[usize; 4],
    isolation: f32,
    max_triangles: usize,
    mesh: &mut SurfaceMesh,
) -> bool {
    let mut inside = [0usize; 4];
    let mut outside = [0usize; 4];
    let (mut n_in, mut n_out) = (0, 0);
    for &c in tet {
        if corners[c].value > isolation {
            inside[n_in] = c;
            n_in += 1;
        } else {
            outside[n_out] = c;
            n_out += 1;
        }
    }

    let edge = |a: usize, b: usize| interpolate(&corners[a], &corners[b], isolation);

    match n_in {
        1 => {
            let a = inside[0];
            let tri = [edge(a, outside[0]), edge(a, outside[1]), edge(a, outside[2])];
            emit(mesh, tri, max_triangles)
        }
        3 => {
            let a = outside[0];
            let tri = [edge(a, inside[0]), edge(a, inside[1]), edge(a, inside[2])];
            emit(mesh, tri, max_triangles)
        }
        2 => {
            let (a, b) = (inside[0], inside[1]);
            let (c, d) = (outside[0], outside[1]);
            let ac = edge(a, c);
            let ad = edge(a, d);
            let bd = edge(b, d);
            let bc = edge(b, c);
            emit(mesh, [ac, ad, bd], max_triangles) && emit(mesh, [ac, bd, bc], max_triangles)
        }
        _ => true,
    }
}

/// 辺上で場が `isolation` をまたぐ点
fn interpolate(a: &Corner, b: &Corner, isolation: f32) -> SurfaceVertex {
    let span = b.value - a.value;
    let t = if span.abs() < f32::EPSILON {
        0.5
    } else {
        ((isolation - a.value) / span).clamp(0.0, 1.0)
    };

    let position = a.position + (b.position - a.position) * t;
    // 値は内側ほど大きいので外向き法線は勾配の逆
    let gradient = a.gradient + (b.gradient - a.gradient) * t;
    let normal = (-gradient).try_normalize(f32::EPSILON).unwrap_or_else(Vector3::z);
    let color = std::array::from_fn(|k| a.color[k] + (b.color[k] - a.color[k]) * t);

    SurfaceVertex {
        position,
        normal,
        color,
    }
}

/// 外向き法線に対して反時計回りに三角形を1枚足す
fn emit(mesh: &mut SurfaceMesh, mut tri: [SurfaceVertex; 3], max_triangles: usize) -> bool {
    if mesh.triangle_count() >= max_triangles {
        return false;
    }
    let face = (tri[1].position - tri[0].position).cross(&(tri[2].position - tri[0].position));
    let outward = tri[0].normal + tri[1].normal + tri[2].normal;
    if face.dot(&outward) < 0.0 {
        tri.swap(1, 2);
    }
    for v in tri.iter() {
        mesh.push(v);
    }
    true
}
