//! Mesh generators for common shapes.
//!
//! Solid shapes use [`DefaultVertex`] with counter-clockwise outward faces;
//! wireframes use [`ColorVertex`] line lists.

use std::f32::consts::PI;

use crate::bounds::Corners;
use crate::material::PbrMaterialData;
use crate::math::{Vec3, Vec4};

use super::data::{IndexType, MeshData, PrimitiveTopology};
use super::vertex::{ColorVertex, DefaultVertex};

/// Generate a UV sphere mesh.
///
/// `segments` splits the equator, `rings` splits pole to pole.
pub fn generate_sphere(radius: f32, segments: u32, rings: u32) -> MeshData {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for ring in 0..=rings {
        let theta = ring as f32 * PI / rings as f32;
        let (sin_theta, cos_theta) = theta.sin_cos();

        for segment in 0..=segments {
            let phi = segment as f32 * 2.0 * PI / segments as f32;
            let (sin_phi, cos_phi) = phi.sin_cos();

            let normal = [sin_theta * cos_phi, cos_theta, sin_theta * sin_phi];
            vertices.push(DefaultVertex::new(
                normal.map(|v| v * radius),
                normal,
                [1.0; 4],
            ));
        }
    }

    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;

            indices.extend_from_slice(&[current, current + 1, next]);
            indices.extend_from_slice(&[current + 1, next + 1, next]);
        }
    }

    MeshData::new(PrimitiveTopology::TriangleList, &vertices, &indices)
}

/// Generate a box spanning `min..max` with one flat-shaded quad per face.
pub fn generate_cuboid(min: Vec3, max: Vec3, color: Vec4) -> MeshData {
    let center = 0.5 * (min + max);
    let half = 0.5 * (max - min);
    // (normal, u, v) with u x v == normal
    let faces = [
        (Vec3::x(), Vec3::y(), Vec3::z()),
        (-Vec3::x(), Vec3::z(), Vec3::y()),
        (Vec3::y(), Vec3::z(), Vec3::x()),
        (-Vec3::y(), Vec3::x(), Vec3::z()),
        (Vec3::z(), Vec3::x(), Vec3::y()),
        (-Vec3::z(), Vec3::y(), Vec3::x()),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices: Vec<IndexType> = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        let base = vertices.len() as IndexType;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let offset = normal + su * u + sv * v;
            let position = center + offset.component_mul(&half);
            vertices.push(DefaultVertex::new(
                position.into(),
                normal.into(),
                color.into(),
            ));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    MeshData::new(PrimitiveTopology::TriangleList, &vertices, &indices)
        .with_material(PbrMaterialData::default().with_base_color(color))
}

/// Unit cube centered at the origin.
pub fn generate_cube() -> MeshData {
    generate_cuboid(
        Vec3::repeat(-0.5),
        Vec3::repeat(0.5),
        Vec4::new(1.0, 1.0, 1.0, 1.0),
    )
}

/// Square on the `z = 0` plane facing `+Z`.
pub fn generate_plane(half_size: f32, color: Vec4) -> MeshData {
    let normal = [0.0, 0.0, 1.0];
    let vertices = [
        [-half_size, -half_size],
        [half_size, -half_size],
        [half_size, half_size],
        [-half_size, half_size],
    ]
    .map(|[x, y]| DefaultVertex::new([x, y, 0.0], normal, color.into()));
    MeshData::new(PrimitiveTopology::TriangleList, &vertices, &[0, 1, 2, 0, 2, 3])
        .with_material(PbrMaterialData::default().with_base_color(color))
}

/// The three axes of a coordinate frame as thin boxes of length `scale`,
/// colored red, green and blue.
pub fn generate_triad(scale: f32) -> Vec<MeshData> {
    let thickness = 0.04 * scale;
    (0..3)
        .map(|axis| {
            let mut max = Vec3::repeat(thickness);
            max[axis] = scale;
            let mut color = Vec4::new(0.0, 0.0, 0.0, 1.0);
            color[axis] = 1.0;
            generate_cuboid(Vec3::repeat(-thickness), max, color)
        })
        .collect()
}

/// Square grid of lines on the `z = 0` plane with `cells` cells per side,
/// each `cell_size` wide.
pub fn generate_line_grid(cells: u32, cell_size: f32, color: Vec4) -> MeshData {
    let half = 0.5 * cells as f32 * cell_size;
    let color: [f32; 4] = color.into();
    let mut vertices = Vec::with_capacity(4 * (cells as usize + 1));
    for i in 0..=cells {
        let t = -half + i as f32 * cell_size;
        vertices.push(ColorVertex::new([t, -half, 0.0], color));
        vertices.push(ColorVertex::new([t, half, 0.0], color));
        vertices.push(ColorVertex::new([-half, t, 0.0], color));
        vertices.push(ColorVertex::new([half, t, 0.0], color));
    }
    MeshData::new(PrimitiveTopology::LineList, &vertices, &[])
}

/// The twelve edges of a box or frustum as an indexed line list.
pub fn generate_wire_box(corners: &Corners, color: Vec4) -> MeshData {
    let color: [f32; 4] = color.into();
    let vertices = corners.map(|c| ColorVertex::new(c.into(), color));
    let mut indices = Vec::with_capacity(24);
    for bit in [1, 2, 4] {
        for i in 0..8 {
            if i & bit == 0 {
                indices.extend_from_slice(&[i, i | bit]);
            }
        }
    }
    MeshData::new(PrimitiveTopology::LineList, &vertices, &indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Aabb;

    fn positions(mesh: &MeshData) -> Vec<Vec3> {
        mesh.vertex_data
            .to_vertices::<DefaultVertex>()
            .unwrap()
            .iter()
            .map(|v| Vec3::from(v.position))
            .collect()
    }

    /// Every triangle's winding agrees with its vertex normals.
    fn assert_outward(mesh: &MeshData) {
        let vertices = mesh.vertex_data.to_vertices::<DefaultVertex>().unwrap();
        for tri in mesh.index_data.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|k| &vertices[tri[k] as usize]);
            let [pa, pb, pc] = [a, b, c].map(|v| Vec3::from(v.position));
            let face = (pb - pa).cross(&(pc - pa));
            if face.norm() < 1e-9 {
                continue;
            }
            assert!(face.dot(&Vec3::from(a.normal)) > 0.0, "{tri:?}");
        }
    }

    #[test]
    fn test_generate_sphere() {
        let mesh = generate_sphere(1.0, 8, 4);
        // (rings+1) * (segments+1) = 5 * 9
        assert_eq!(mesh.num_vertices(), 45);
        // rings * segments * 6
        assert_eq!(mesh.num_indices(), 192);
        assert_outward(&mesh);
    }

    #[test]
    fn test_cuboid_faces_point_outward() {
        let mesh = generate_cuboid(
            Vec3::new(-1.0, 0.0, 2.0),
            Vec3::new(1.0, 3.0, 4.0),
            Vec4::new(1.0, 0.0, 0.0, 1.0),
        );
        assert_eq!(mesh.num_vertices(), 24);
        assert_eq!(mesh.num_indices(), 36);
        assert_outward(&mesh);
        let bounds = Aabb::from_points(positions(&mesh).iter());
        assert_eq!(bounds.min, Vec3::new(-1.0, 0.0, 2.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 3.0, 4.0));
        assert_eq!(mesh.material.base_color, Vec4::new(1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_triad_axes() {
        let triad = generate_triad(1.0);
        assert_eq!(triad.len(), 3);
        for (axis, mesh) in triad.iter().enumerate() {
            let bounds = Aabb::from_points(positions(mesh).iter());
            assert_eq!(bounds.max[axis], 1.0);
            assert_eq!(mesh.material.base_color[axis], 1.0);
        }
    }

    #[test]
    fn test_line_grid_counts() {
        let grid = generate_line_grid(10, 0.5, Vec4::new(0.5, 0.5, 0.5, 1.0));
        assert_eq!(grid.topology, PrimitiveTopology::LineList);
        assert_eq!(grid.num_vertices(), 44);
        assert!(!grid.is_indexed());
    }

    #[test]
    fn test_wire_box_has_twelve_edges() {
        let aabb = Aabb::new(Vec3::zeros(), Vec3::new(1.0, 2.0, 3.0));
        let mesh = generate_wire_box(&aabb.corners(), Vec4::new(1.0, 1.0, 0.0, 1.0));
        assert_eq!(mesh.num_indices(), 24);
        for edge in mesh.index_data.chunks_exact(2) {
            assert_eq!((edge[0] ^ edge[1]).count_ones(), 1);
        }
    }
}
