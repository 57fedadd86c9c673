//! End-to-end meshing scenarios: solid oracle -> mesh -> simplification

use isomesh::dc::DualContouring;
use isomesh::decimate::Decimator;
use isomesh::solid::{Cylinder, Sdf, MeshSdf, MeshSolid, Solid, Sphere};
use isomesh::surface::SurfaceEstimator;
use isomesh::{Mesh, Vec3};
use rand::{Rng, SeedableRng};

#[test]
fn sphere_meshing() {
    let sphere = Sphere { center: Vec3::ZERO, radius: 1.0 };
    let mut dc = DualContouring::new(SurfaceEstimator::new(&sphere));
    dc.delta = 0.05;
    let mut mesh = dc.mesh().unwrap();

    assert!(!mesh.needs_repair());
    let mut min_norm = f64::INFINITY;
    let mut max_norm = 0.0f64;
    for v in mesh.vertices() {
        let n = v.norm();
        min_norm = min_norm.min(n);
        max_norm = max_norm.max(n);
    }
    assert!(max_norm <= 1.01, "max vertex norm {max_norm}");
    assert!(min_norm >= 0.95, "min vertex norm {min_norm}");

    let expected = 4.0 * std::f64::consts::PI / 3.0;
    let volume = mesh.volume();
    assert!(
        (volume - expected).abs() / expected < 0.02,
        "volume {volume} should be within 2% of {expected}"
    );
}

#[test]
fn meshed_sphere_round_trips_through_a_solid() {
    let sphere = Sphere { center: Vec3::new(0.5, -0.25, 0.0), radius: 0.75 };
    let mut dc = DualContouring::new(SurfaceEstimator::new(&sphere));
    dc.delta = 0.05;
    let mesh = dc.mesh().unwrap();

    let solid = MeshSolid::new(mesh.triangle_vec());
    let mut rng = rand::rngs::StdRng::seed_from_u64(99);
    let mut sample = || {
        Vec3::new(
            rng.gen_range(-0.5..1.5),
            rng.gen_range(-1.25..0.75),
            rng.gen_range(-1.0..1.0),
        )
    };
    for _ in 0..500 {
        let p = sample();
        // Points near the surface may legitimately disagree at grid scale.
        if (sphere.sdf(p)).abs() < 0.1 {
            continue;
        }
        assert_eq!(solid.contains(p), sphere.contains(p), "at {p:?}");
    }
}

#[test]
fn cylinder_decimation() {
    let cyl = Cylinder {
        p1: Vec3::new(0.0, 0.0, -1.0),
        p2: Vec3::new(0.0, 0.0, 1.0),
        radius: 0.5,
    };
    let mut dc = DualContouring::new(SurfaceEstimator::new(&cyl));
    dc.delta = 0.025;
    let mesh = dc.mesh().unwrap();
    assert!(!mesh.needs_repair());

    let dec = Decimator {
        plane_distance: 1e-8,
        boundary_distance: 1e-8,
        ..Decimator::default()
    }
    .decimate(&mesh);

    assert!(
        dec.len() < mesh.len(),
        "decimation failed to remove any of {} triangles",
        mesh.len()
    );
    assert!(!dec.needs_repair());
    let (_, flips) = dec.repair_normals(1e-8);
    assert_eq!(flips, 0, "decimation flipped face orientations");

    // The simplified surface must stay metrically close to the original.
    let before = MeshSdf(MeshSolid::new(mesh.triangle_vec()));
    let after = MeshSdf(MeshSolid::new(dec.triangle_vec()));
    let mut rng = rand::rngs::StdRng::seed_from_u64(0xC11);
    for _ in 0..1000 {
        let p = Vec3::new(
            rng.gen_range(-0.55..0.55),
            rng.gen_range(-0.55..0.55),
            rng.gen_range(-1.05..1.05),
        );
        let (d1, d2) = (before.sdf(p), after.sdf(p));
        assert!(
            (d1 - d2).abs() < 1e-5,
            "SDF mismatch at {p:?}: {d1} vs {d2}"
        );
    }
}
