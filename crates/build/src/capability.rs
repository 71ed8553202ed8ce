//! Pluggable simplification and batching.
//!
//! The builder only ever talks to these two traits. Concrete strategies are
//! registered by name in a [`CapabilityRegistry`](crate::CapabilityRegistry).

use hlod_common::{MaterialId, Transform};
use hlod_scene::{CombinedProxy, HlodPart, Mesh, MeshStore};
use std::collections::BTreeMap;

use crate::error::BuildError;

/// Mesh decimation.
///
/// Implementations may run on a worker thread, but never concurrently with
/// another simplification: the scheduler serializes them behind one global
/// gate. They must tolerate repeated calls on the same input with different
/// quality values.
pub trait MeshSimplifier: Send + Sync {
    /// Write a version of `input` reduced to roughly `quality` (in `(0, 1]`)
    /// of its primitive count into `output`.
    fn generate(&self, input: &Mesh, output: &mut Mesh, quality: f32) -> Result<(), BuildError>;
}

/// Draw-call reduction over the parts of one combined proxy, in place.
pub trait Batcher: Send + Sync {
    fn batch(&self, proxy: &mut CombinedProxy, meshes: &mut MeshStore) -> Result<(), BuildError>;
}

/// Copies its input unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughSimplifier;

impl MeshSimplifier for PassthroughSimplifier {
    fn generate(&self, input: &Mesh, output: &mut Mesh, quality: f32) -> Result<(), BuildError> {
        if !(quality > 0.0 && quality <= 1.0) {
            return Err(BuildError::Simplify(format!(
                "quality {quality} outside (0, 1]"
            )));
        }
        output.positions.clone_from(&input.positions);
        output.indices.clone_from(&input.indices);
        output.topology = input.topology;
        Ok(())
    }
}

/// Leaves parts as they are.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughBatcher;

impl Batcher for PassthroughBatcher {
    fn batch(&self, _proxy: &mut CombinedProxy, _meshes: &mut MeshStore) -> Result<(), BuildError> {
        Ok(())
    }
}

/// Static batching: parts sharing the same material list are baked into one
/// world-space mesh.
#[derive(Debug, Default, Clone, Copy)]
pub struct MaterialBatcher;

impl Batcher for MaterialBatcher {
    fn batch(&self, proxy: &mut CombinedProxy, meshes: &mut MeshStore) -> Result<(), BuildError> {
        if let Some(missing) = proxy.parts.iter().find(|p| !meshes.contains(p.mesh)) {
            return Err(BuildError::MissingMesh(missing.mesh));
        }
        let mut groups: BTreeMap<Vec<MaterialId>, Vec<HlodPart>> = BTreeMap::new();
        for part in proxy.parts.drain(..) {
            groups.entry(part.materials.clone()).or_default().push(part);
        }

        let mut batched = Vec::with_capacity(groups.len());
        for (materials, parts) in groups {
            if parts.len() == 1 {
                batched.extend(parts);
                continue;
            }
            let mut mesh = Mesh::empty(format!("Batch {}", batched.len()));
            for part in &parts {
                let source = meshes.get(part.mesh).ok_or(BuildError::MissingMesh(part.mesh))?;
                mesh.append_transformed(source, &part.transform.to_matrix());
            }
            // Intermediate meshes made earlier in this build are folded in
            // and no longer needed.
            for part in parts.iter().filter(|p| p.owned) {
                meshes.remove(part.mesh);
            }
            let handle = meshes.insert(mesh);
            batched.push(HlodPart {
                name: format!("Batch {}", batched.len()),
                mesh: handle,
                transform: Transform::default(),
                materials,
                owned: true,
            });
        }
        tracing::trace!(parts = batched.len(), "material batching done");
        proxy.parts = batched;
        Ok(())
    }
}
