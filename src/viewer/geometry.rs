use anyhow::{Context, anyhow};
use nalgebra::{Point3, Vector3};

/// Indexed triangle mesh in model units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshGeometry {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f32; 3]>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = Point3::from(*iter.next()?);
        let (min, max) = iter.fold((first, first), |(min, max), p| {
            let p = Point3::from(*p);
            (min.inf(&p), max.sup(&p))
        });
        Some(Self { min, max })
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Radius of the sphere through the box corners (half the diagonal).
    pub fn bounding_radius(&self) -> f32 {
        self.size().norm() * 0.5
    }
}

impl MeshGeometry {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.len() < 3
    }

    /// Bounds of the vertices actually referenced by triangles.
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(
            self.indices
                .iter()
                .filter_map(|&i| self.positions.get(i as usize)),
        )
    }

    /// Appends another mesh, rebasing its indices. `other` should already be
    /// free of invalid triangles, or they may land on this mesh's vertices.
    pub fn append(&mut self, other: MeshGeometry) -> anyhow::Result<()> {
        let base = u32::try_from(self.positions.len()).context("too many vertices")?;
        let indices = other
            .indices
            .into_iter()
            .map(|i| {
                i.checked_add(base)
                    .ok_or_else(|| anyhow!("triangle index {i} out of range"))
            })
            .collect::<anyhow::Result<Vec<u32>>>()?;
        self.positions.extend(other.positions);
        self.indices.extend(indices);
        Ok(())
    }

    /// Drops triangles that point past the vertex list.
    pub fn retain_valid_triangles(&mut self) {
        let n = self.positions.len() as u32;
        let valid: Vec<u32> = self
            .indices
            .chunks_exact(3)
            .filter(|t| t.iter().all(|&i| i < n))
            .flatten()
            .copied()
            .collect();
        self.indices = valid;
    }

    /// De-indexed vertex stream with flat face normals, interleaved as
    /// `xyz nx ny nz` for the GPU.
    pub fn flat_shaded_vertices(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.indices.len() * 6);
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Point3::from(self.positions[i as usize]));
            let normal = (b - a).cross(&(c - a));
            let normal = normal.try_normalize(f32::EPSILON).unwrap_or_else(Vector3::z);
            for p in [a, b, c] {
                out.extend_from_slice(&[p.x, p.y, p.z, normal.x, normal.y, normal.z]);
            }
        }
        out
    }
}
