//! UV maps and chart packing

use super::boundary::{boundary_sequence, p_norm_boundary};
use super::charts::mesh_to_plane_graphs_limited;
use super::stretch::stretch_minimizing;
use super::weights::shape_preserving_weights;
use crate::coord_map::CoordMap;
use crate::geom::{Segment, Triangle, Vec3};
use crate::mesh::Mesh;
use crate::Error;
use log::info;
use nalgebra::Vector2;
use ordered_float::OrderedFloat;

const AUTOMATIC_UV_MIN_TRIS: usize = 128;
const AUTOMATIC_UV_MAX_TRIS: usize = 16384;
const AUTOMATIC_UV_PARAM_ITERS: usize = 20;
const AUTOMATIC_UV_PARAM_ETA: f64 = 0.75;

/// A mapping from 3D mesh triangles to 2D parameter-space triangles
///
/// Vertex `i` of each 3D triangle corresponds to parameter point `i`.
#[derive(Clone, Debug, Default)]
pub struct MeshUvMap {
    pub faces: Vec<(Triangle, [Vector2<f64>; 3])>,
}

impl MeshUvMap {
    /// Builds a UV map by looking up every mesh vertex in `mapping`
    pub fn for_coords(mesh: &Mesh, mapping: &CoordMap<Vector2<f64>>) -> Result<Self, Error> {
        let mut faces = Vec::with_capacity(mesh.len());
        for t in mesh.triangles() {
            let mut uv = [Vector2::zeros(); 3];
            for (i, &c) in t.0.iter().enumerate() {
                uv[i] = *mapping.get(c).ok_or(Error::UnknownVertex(c))?;
            }
            faces.push((*t, uv));
        }
        Ok(MeshUvMap { faces })
    }

    /// Concatenates several UV maps without touching their coordinates
    pub fn join(maps: impl IntoIterator<Item = MeshUvMap>) -> Self {
        let mut res = MeshUvMap::default();
        for m in maps {
            res.faces.extend(m.faces);
        }
        res
    }

    /// Bounding box of the parameter-space triangles
    pub fn bounds_2d(&self) -> (Vector2<f64>, Vector2<f64>) {
        let mut min = Vector2::new(f64::INFINITY, f64::INFINITY);
        let mut max = -min;
        for (_, uv) in &self.faces {
            for p in uv {
                min = min.inf(p);
                max = max.sup(p);
            }
        }
        (min, max)
    }

    /// Rescales and translates the parameter space into new bounds
    pub fn to_bounds(&self, min: Vector2<f64>, max: Vector2<f64>) -> MeshUvMap {
        let (old_min, old_max) = self.bounds_2d();
        let scale = (max - min).component_div(&(old_max - old_min));
        MeshUvMap {
            faces: self
                .faces
                .iter()
                .map(|(t, uv)| {
                    let uv = uv.map(|p| (p - old_min).component_mul(&scale) + min);
                    (*t, uv)
                })
                .collect(),
        }
    }

    /// Total surface area of the 3D triangles
    pub fn area_3d(&self) -> f64 {
        self.faces.iter().map(|(t, _)| t.area()).sum()
    }
}

/// Rescales and packs UV maps into one rectangle
///
/// Charts are assigned to quadrants of a balanced quad-tree so that surface
/// area is spread as evenly as possible; `border` is the inset kept around
/// each chart so that texture interpolation cannot mix neighbors.
pub fn pack_mesh_uv_maps(
    min: Vector2<f64>,
    max: Vector2<f64>,
    border: f64,
    params: Vec<MeshUvMap>,
) -> MeshUvMap {
    let mut indexed: Vec<(f64, MeshUvMap)> =
        params.into_iter().map(|p| (p.area_3d(), p)).collect();
    indexed.sort_by_key(|(area, _)| std::cmp::Reverse(OrderedFloat(*area)));
    let tree = build_quad_tree(indexed);
    tree.joined(border, min, max)
}

enum QuadTree {
    Leaf(MeshUvMap),
    Branch(Vec<QuadTree>),
}

/// Assigns charts (sorted by descending area) to quadrants, always giving
/// the next chart to the currently-lightest quadrant
fn build_quad_tree(params: Vec<(f64, MeshUvMap)>) -> QuadTree {
    if params.len() == 1 {
        let (_, p) = params.into_iter().next().unwrap();
        return QuadTree::Leaf(p);
    }
    if params.len() <= 4 {
        return QuadTree::Branch(
            params.into_iter().map(|(_, p)| QuadTree::Leaf(p)).collect(),
        );
    }

    // A greedy knapsack split; the exact problem is NP-complete and this is
    // plenty for texture packing.
    let mut piles: [Vec<(f64, MeshUvMap)>; 4] = Default::default();
    let mut totals = [0.0f64; 4];
    for (area, p) in params {
        let dst = (0..4)
            .min_by_key(|&i| OrderedFloat(totals[i]))
            .unwrap();
        totals[dst] += area;
        piles[dst].push((area, p));
    }
    QuadTree::Branch(piles.into_iter().map(build_quad_tree).collect())
}

impl QuadTree {
    fn joined(&self, border: f64, min: Vector2<f64>, max: Vector2<f64>) -> MeshUvMap {
        match self {
            QuadTree::Leaf(map) => map.to_bounds(
                min.add_scalar(border),
                max.add_scalar(-border),
            ),
            QuadTree::Branch(branches) if branches.len() == 2 => {
                // Split along the longer dimension.
                let diff = max - min;
                if diff.y > diff.x {
                    let mp = (min.y + max.y) / 2.0;
                    MeshUvMap::join([
                        branches[0].joined(border, min, Vector2::new(max.x, mp)),
                        branches[1].joined(border, Vector2::new(min.x, mp), max),
                    ])
                } else {
                    let mp = (min.x + max.x) / 2.0;
                    MeshUvMap::join([
                        branches[0].joined(border, min, Vector2::new(mp, max.y)),
                        branches[1].joined(border, Vector2::new(mp, min.y), max),
                    ])
                }
            }
            QuadTree::Branch(branches) => {
                let mp = (min + max) / 2.0;
                let xs = [min.x, mp.x, max.x];
                let ys = [min.y, mp.y, max.y];
                MeshUvMap::join(branches.iter().enumerate().map(|(i, branch)| {
                    let (x, y) = (i % 2, i / 2);
                    branch.joined(
                        border,
                        Vector2::new(xs[x], ys[y]),
                        Vector2::new(xs[x + 1], ys[y + 1]),
                    )
                }))
            }
        }
    }
}

/// Pushes boundary parameter points outward where their triangles have
/// degenerated
///
/// The convex-combination solve can flatten triangles that have two edges
/// on the boundary; this rescues them by moving the middle vertex radially,
/// at most `max_dist`.  Assumes the parametrization is centered on the
/// origin, as produced by the boundary map helpers.
pub fn extend_boundary_uvs(
    m: &mut Mesh,
    param: &mut CoordMap<Vector2<f64>>,
    max_dist: f64,
) -> Result<(), Error> {
    let boundary = boundary_sequence(m)?;
    let n = boundary.len();
    for i in 0..n {
        let p0 = boundary[(i + n - 1) % n];
        let p1 = boundary[i];
        let p2 = boundary[(i + 1) % n];
        if m.find_triangle(p0, p1, p2).len() != 1 {
            continue;
        }
        let uv0 = *param.get(p0).unwrap();
        let uv1 = *param.get(p1).unwrap();
        let uv2 = *param.get(p2).unwrap();

        let seg3d = Segment::new(p0, p2);
        let ratio3d = seg3d.dist(p1) / seg3d.length();

        let chord = uv2 - uv0;
        let dist2d = dist_to_segment_2d(uv1, uv0, uv2);
        let ratio2d = dist2d / chord.norm();

        if ratio2d >= ratio3d {
            // The parameter triangle is already less degenerate than the
            // surface one.
            continue;
        }

        let extra = max_dist.min((ratio3d - ratio2d) * chord.norm());
        let direction = (uv1 - chord * (uv1.dot(&chord) / chord.norm_squared())).normalize();
        param.insert(p1, uv1 + direction * extra);
    }
    Ok(())
}

fn dist_to_segment_2d(p: Vector2<f64>, a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    let d = b - a;
    let len_sq = d.norm_squared();
    if len_sq == 0.0 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&d) / len_sq).clamp(0.0, 1.0);
    (a + d * t - p).norm()
}

/// Builds a UV map for a whole mesh, packed into the unit square
///
/// `resolution` is the side length of the target texture and must be a
/// power of two; it determines the packing border.  The mesh should be
/// manifold but needs no special topology.  Meant for applications that
/// don't need fine control over the parametrization; the splitting and
/// packing details are subject to change.
pub fn build_automatic_uv_map(
    m: &Mesh,
    resolution: usize,
    verbose: bool,
) -> Result<MeshUvMap, Error> {
    if !resolution.is_power_of_two() {
        return Err(Error::BadResolution(resolution));
    }

    // Target a roughly constant number of charts by capping triangles per
    // chart.
    let n_tris = (m.len() / 50).clamp(AUTOMATIC_UV_MIN_TRIS, AUTOMATIC_UV_MAX_TRIS);
    if verbose {
        info!("splitting mesh into plane graphs with max {n_tris} tris");
    }
    let discs = mesh_to_plane_graphs_limited(m, n_tris);
    if verbose {
        info!("mapping {} plane graphs", discs.len());
    }

    let mut params = Vec::with_capacity(discs.len());
    for (i, mut disc) in discs.into_iter().enumerate() {
        // Almost square, but with no colinear boundary points.
        let boundary = p_norm_boundary(&mut disc, 4.0)?;
        let mut weights = shape_preserving_weights(&mut disc)?;
        let mut parameterization = stretch_minimizing(
            &mut disc,
            &boundary,
            &mut weights,
            None,
            Some(AUTOMATIC_UV_PARAM_ITERS),
            AUTOMATIC_UV_PARAM_ETA,
        )?;
        extend_boundary_uvs(&mut disc, &mut parameterization, 0.1)?;
        params.push(MeshUvMap::for_coords(&disc, &parameterization)?);
        if verbose {
            info!("completed {} plane graphs", i + 1);
        }
    }
    Ok(pack_mesh_uv_maps(
        Vector2::new(0.0, 0.0),
        Vector2::new(1.0, 1.0),
        1.0 / resolution as f64,
        params,
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::shapes;

    #[test]
    fn to_bounds_rescales() {
        let t = Triangle::new(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0));
        let map = MeshUvMap {
            faces: vec![(
                t,
                [
                    Vector2::new(-1.0, -1.0),
                    Vector2::new(1.0, -1.0),
                    Vector2::new(-1.0, 1.0),
                ],
            )],
        };
        let scaled = map.to_bounds(Vector2::new(0.0, 0.0), Vector2::new(0.5, 0.5));
        let (min, max) = scaled.bounds_2d();
        assert!((min - Vector2::new(0.0, 0.0)).norm() < 1e-12);
        assert!((max - Vector2::new(0.5, 0.5)).norm() < 1e-12);
    }

    #[test]
    fn packed_charts_stay_inside_and_disjoint() {
        let m = shapes::icosphere(Vec3::ZERO, 1.0, 3);
        let map = build_automatic_uv_map(&m, 512, false).unwrap();
        assert_eq!(map.faces.len(), m.len());

        let (min, max) = map.bounds_2d();
        assert!(min.x >= 0.0 && min.y >= 0.0);
        assert!(max.x <= 1.0 && max.y <= 1.0);
    }

    #[test]
    fn bad_resolution_is_rejected() {
        let m = shapes::icosphere(Vec3::ZERO, 1.0, 1);
        assert!(matches!(
            build_automatic_uv_map(&m, 100, false),
            Err(Error::BadResolution(100))
        ));
    }

    #[test]
    fn packing_preserves_chart_disjointness() {
        // Four square charts of different areas must land in disjoint
        // rectangles.
        let chart = |scale: f64| {
            let t1 = Triangle::new(
                Vec3::ZERO,
                Vec3::new(scale, 0.0, 0.0),
                Vec3::new(0.0, scale, 0.0),
            );
            let t2 = Triangle::new(
                Vec3::new(scale, 0.0, 0.0),
                Vec3::new(scale, scale, 0.0),
                Vec3::new(0.0, scale, 0.0),
            );
            MeshUvMap {
                faces: vec![
                    (
                        t1,
                        [
                            Vector2::new(0.0, 0.0),
                            Vector2::new(1.0, 0.0),
                            Vector2::new(0.0, 1.0),
                        ],
                    ),
                    (
                        t2,
                        [
                            Vector2::new(1.0, 0.0),
                            Vector2::new(1.0, 1.0),
                            Vector2::new(0.0, 1.0),
                        ],
                    ),
                ],
            }
        };
        let charts: Vec<MeshUvMap> = (1..=5).map(|i| chart(i as f64)).collect();
        let packed = pack_mesh_uv_maps(
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 1.0),
            0.01,
            charts.clone(),
        );
        assert_eq!(packed.faces.len(), 10);

        // Recover each chart's rectangle by matching 3D triangles back to
        // their source chart.
        let mut rects: Vec<(Vector2<f64>, Vector2<f64>)> = Vec::new();
        for src in &charts {
            let mut min = Vector2::new(f64::INFINITY, f64::INFINITY);
            let mut max = -min;
            for (t3d, _) in &src.faces {
                for (packed_t, uv) in &packed.faces {
                    if packed_t == t3d {
                        for p in uv {
                            min = min.inf(p);
                            max = max.sup(p);
                        }
                    }
                }
            }
            rects.push((min, max));
        }
        for (min, max) in &rects {
            assert!(min.x >= 0.0 && min.y >= 0.0 && max.x <= 1.0 && max.y <= 1.0);
        }
        for i in 0..rects.len() {
            for j in i + 1..rects.len() {
                let (min_a, max_a) = rects[i];
                let (min_b, max_b) = rects[j];
                let overlap_x = max_a.x.min(max_b.x) - min_a.x.max(min_b.x);
                let overlap_y = max_a.y.min(max_b.y) - min_a.y.max(min_b.y);
                assert!(
                    overlap_x <= 1e-9 || overlap_y <= 1e-9,
                    "charts {i} and {j} overlap"
                );
            }
        }
    }
}
