use glam::{Mat4, Vec3};
use hlod_common::{Aabb, MeshHandle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Primitive topology of a mesh's index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topology {
    Triangles,
    Quads,
    Lines,
    LineStrip,
    Points,
}

/// Minimal mesh: world-agnostic positions plus an index buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub topology: Topology,
}

impl Mesh {
    pub fn new(name: impl Into<String>, positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            positions,
            indices,
            topology: Topology::Triangles,
        }
    }

    /// Empty triangle mesh, used as an output slot for simplification.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new(), Vec::new())
    }

    /// Axis-aligned unit cube centered on the origin (8 vertices, 12 triangles).
    pub fn unit_cube(name: impl Into<String>) -> Self {
        let positions = (0..8)
            .map(|i| {
                Vec3::new(
                    if i & 4 != 0 { 0.5 } else { -0.5 },
                    if i & 2 != 0 { 0.5 } else { -0.5 },
                    if i & 1 != 0 { 0.5 } else { -0.5 },
                )
            })
            .collect();
        #[rustfmt::skip]
        let indices = vec![
            0, 1, 3, 0, 3, 2, // -x
            4, 6, 7, 4, 7, 5, // +x
            0, 4, 5, 0, 5, 1, // -y
            2, 3, 7, 2, 7, 6, // +y
            0, 2, 6, 0, 6, 4, // -z
            1, 5, 7, 1, 7, 3, // +z
        ];
        Self::new(name, positions, indices)
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_triangles(&self) -> bool {
        self.topology == Topology::Triangles
    }

    /// Primitive count derived from the index count and topology.
    pub fn poly_count(&self) -> usize {
        let n = self.indices.len();
        match self.topology {
            Topology::Quads => n / 4,
            Topology::Triangles => n / 3,
            Topology::Lines | Topology::LineStrip => n / 2,
            Topology::Points => n,
        }
    }

    /// Local-space bounds, `None` for a mesh without vertices.
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.positions.iter().copied())
    }

    /// Append `other` transformed by `m`, rebasing its indices.
    pub fn append_transformed(&mut self, other: &Mesh, m: &Mat4) {
        let base = self.positions.len() as u32;
        self.positions
            .extend(other.positions.iter().map(|p| m.transform_point3(*p)));
        self.indices.extend(other.indices.iter().map(|i| i + base));
    }
}

/// Store of every mesh the host and the HLOD builder know about.
///
/// Source meshes are registered by the host; combined and simplified meshes
/// are allocated by the builder and removed again when the combined proxy
/// that owns them is destroyed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshStore {
    meshes: BTreeMap<MeshHandle, Mesh>,
    next_id: u64,
}

impl MeshStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mesh and return its handle.
    pub fn insert(&mut self, mesh: Mesh) -> MeshHandle {
        let handle = MeshHandle(self.next_id);
        self.next_id += 1;
        self.meshes.insert(handle, mesh);
        handle
    }

    pub fn get(&self, handle: MeshHandle) -> Option<&Mesh> {
        self.meshes.get(&handle)
    }

    pub fn get_mut(&mut self, handle: MeshHandle) -> Option<&mut Mesh> {
        self.meshes.get_mut(&handle)
    }

    /// Free a mesh. Returns it if it existed.
    pub fn remove(&mut self, handle: MeshHandle) -> Option<Mesh> {
        self.meshes.remove(&handle)
    }

    pub fn contains(&self, handle: MeshHandle) -> bool {
        self.meshes.contains_key(&handle)
    }

    /// Number of registered meshes.
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}
