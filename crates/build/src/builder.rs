//! Bottom-up construction of combined proxies.
//!
//! A volume whose populated children each already carry a single combined
//! renderer with exactly the volume's material set is built by concatenating
//! those renderers into one mesh. Anything else falls back to gathering the
//! members' own geometry and handing it to the batcher.

use std::collections::{BTreeSet, VecDeque};

use hlod_common::{MaterialId, ProxyId, Transform};
use hlod_scene::{CombinedProxy, HlodPart, Mesh, RendererKind, SimplifiedLevel};
use hlod_sched::{BackgroundJob, JobPoll, Step, Task};
use hlod_volume::VolumeKey;

use crate::error::BuildError;
use crate::world::HlodWorld;

/// Why a volume is built from its members instead of its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligible {
    /// Leaf, or no child has members.
    NoPopulatedChildren,
    /// A populated child has no combined proxy yet.
    ChildUnbuilt(VolumeKey),
    /// A populated child's combined proxy has more than one renderer.
    ChildNotSingle(VolumeKey),
    /// A populated child stands in for a different material set.
    MaterialMismatch(VolumeKey),
}

/// Outcome of the merge check for one volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeCheck {
    Eligible(Vec<VolumeKey>),
    Ineligible(Ineligible),
}

impl MergeCheck {
    pub fn is_eligible(&self) -> bool {
        matches!(self, MergeCheck::Eligible(_))
    }
}

/// Union of the materials of `members` that are still in the scene.
pub fn member_materials<'a>(
    world: &HlodWorld,
    members: impl IntoIterator<Item = &'a ProxyId>,
) -> BTreeSet<MaterialId> {
    members
        .into_iter()
        .filter_map(|id| world.scene.get(*id))
        .flat_map(|p| p.materials.iter().copied())
        .collect()
}

/// Decide whether `node` can be built by merging its children.
pub fn check_merge(world: &mut HlodWorld, node: VolumeKey, expected: &BTreeSet<MaterialId>) -> MergeCheck {
    let children = world.tree.populated_children(node);
    if children.is_empty() {
        return MergeCheck::Ineligible(Ineligible::NoPopulatedChildren);
    }
    for &child in &children {
        let Some(combined) = world.tree.get(child).and_then(|v| v.combined()) else {
            return MergeCheck::Ineligible(Ineligible::ChildUnbuilt(child));
        };
        if combined.materials != *expected {
            return MergeCheck::Ineligible(Ineligible::MaterialMismatch(child));
        }
        if !combined.is_single() {
            return MergeCheck::Ineligible(Ineligible::ChildNotSingle(child));
        }
    }
    MergeCheck::Eligible(children)
}

type SimplifiedOutput = Result<Vec<(f32, Mesh)>, BuildError>;

enum Phase {
    Plan,
    Gather {
        pending: VecDeque<ProxyId>,
        proxy: CombinedProxy,
    },
    Simplify {
        job: BackgroundJob<SimplifiedOutput>,
        proxy: CombinedProxy,
    },
    Install(Option<CombinedProxy>),
}

/// Build (or rebuild) one volume's combined proxy, optionally continuing
/// with each ancestor up to the root.
pub struct BuildTask {
    node: VolumeKey,
    propagate: bool,
    phase: Phase,
}

impl BuildTask {
    pub fn new(node: VolumeKey, propagate: bool) -> Self {
        Self {
            node,
            propagate,
            phase: Phase::Plan,
        }
    }

    pub fn node(&self) -> VolumeKey {
        self.node
    }

    fn plan(&mut self, world: &mut HlodWorld) -> Phase {
        world.flush_released();
        let Some(vol) = world.tree.get(self.node) else {
            return Phase::Install(None);
        };
        let serial = vol.serial();
        let members: Vec<ProxyId> = vol.members().iter().copied().collect();
        if members.is_empty() {
            return Phase::Install(None);
        }
        let expected = member_materials(world, &members);

        match check_merge(world, self.node, &expected) {
            MergeCheck::Eligible(children) => match merge_children(world, serial, &children, expected.clone()) {
                Ok(proxy) => return Self::after_merge(world, proxy),
                Err(err) => {
                    tracing::warn!(volume = serial, %err, "merge failed, batching members instead");
                }
            },
            MergeCheck::Ineligible(reason) => {
                tracing::trace!(volume = serial, ?reason, "not merging children");
            }
        }
        Phase::Gather {
            pending: members.into(),
            proxy: CombinedProxy {
                materials: expected,
                ..CombinedProxy::default()
            },
        }
    }

    fn after_merge(world: &HlodWorld, proxy: CombinedProxy) -> Phase {
        let levels = world.settings().simplified_levels;
        let Some(simplifier) = world.toolset().simplifier.clone() else {
            return Phase::Install(Some(proxy));
        };
        if levels == 0 {
            return Phase::Install(Some(proxy));
        }
        let Some(input) = proxy
            .parts
            .first()
            .and_then(|p| world.scene.meshes().get(p.mesh))
            .cloned()
        else {
            return Phase::Install(Some(proxy));
        };
        let job = BackgroundJob::spawn(move || -> SimplifiedOutput {
            (1..=levels)
                .map(|l| {
                    let quality = 0.5f32.powi(l as i32);
                    let mut output = Mesh::empty(format!("{} LOD{l}", input.name));
                    simplifier.generate(&input, &mut output, quality)?;
                    Ok((quality, output))
                })
                .collect()
        });
        Phase::Simplify { job, proxy }
    }

    fn gather_one(world: &mut HlodWorld, id: ProxyId, proxy: &mut CombinedProxy) {
        let Some(source) = world.scene.get(id) else {
            return;
        };
        if source.kind == RendererKind::Skinned {
            let err = BuildError::UnsupportedGeometry {
                proxy: id,
                reason: "skinned renderer".into(),
            };
            tracing::warn!(%err, "skipping HLOD source");
            world.stats_mut().skipped_sources += 1;
            return;
        }
        let name = source.name.clone();
        let mut skipped = 0;
        for renderer in source.hlod_sources() {
            let Some(mesh) = world.scene.meshes().get(renderer.mesh) else {
                tracing::warn!(err = %BuildError::MissingMesh(renderer.mesh), proxy = %id.short(), "skipping HLOD source");
                skipped += 1;
                continue;
            };
            if !mesh.is_triangles() {
                let err = BuildError::UnsupportedGeometry {
                    proxy: id,
                    reason: format!("{:?} topology", mesh.topology),
                };
                tracing::warn!(%err, "skipping HLOD source");
                skipped += 1;
                continue;
            }
            if let Some(local) = mesh.bounds() {
                let world_bounds = local.transformed(&renderer.transform.to_matrix());
                proxy.bounds = Some(match proxy.bounds {
                    Some(b) => b.encapsulate(&world_bounds),
                    None => world_bounds,
                });
            }
            proxy.parts.push(HlodPart {
                name: name.clone(),
                mesh: renderer.mesh,
                transform: renderer.transform,
                materials: renderer.materials,
                owned: false,
            });
            proxy.source_count += 1;
        }
        world.stats_mut().skipped_sources += skipped;
    }

    fn finish_batch(world: &mut HlodWorld, mut proxy: CombinedProxy) -> Phase {
        if proxy.parts.is_empty() {
            return Phase::Install(None);
        }
        let unbatched = proxy.parts.clone();
        let batcher = world.toolset().batcher.clone();
        if let Err(err) = batcher.batch(&mut proxy, world.scene.meshes_mut()) {
            tracing::error!(%err, batcher = %world.toolset().batcher_name, "batching failed, keeping parts unbatched");
            proxy.parts = unbatched;
        }
        Phase::Install(Some(proxy))
    }

    fn finish_install(&mut self, world: &mut HlodWorld, proxy: Option<CombinedProxy>) -> Step {
        let stats = world.stats_mut();
        stats.builds += 1;
        match &proxy {
            Some(p) if p.merged => stats.merged_builds += 1,
            Some(_) => stats.batched_builds += 1,
            None => stats.empty_builds += 1,
        }
        if let Some(vol) = world.tree.get(self.node) {
            tracing::debug!(
                volume = vol.serial(),
                draw_calls = proxy.as_ref().map_or(0, |p| p.draw_calls()),
                merged = proxy.as_ref().is_some_and(|p| p.merged),
                "built combined proxy"
            );
        }
        world.install(self.node, proxy);

        let parent = world.tree.get(self.node).and_then(|v| v.parent());
        match parent {
            Some(parent) if self.propagate => {
                self.node = parent;
                self.phase = Phase::Plan;
                Step::Continue
            }
            _ => Step::Done,
        }
    }
}

/// Concatenate the children's single renderers into one world-space mesh.
fn merge_children(
    world: &mut HlodWorld,
    serial: u64,
    children: &[VolumeKey],
    materials: BTreeSet<MaterialId>,
) -> Result<CombinedProxy, BuildError> {
    let mut mesh = Mesh::empty(format!("HLOD {serial}"));
    let mut material = None;
    let mut source_count = 0;
    for &child in children {
        let Some(combined) = world.tree.get(child).and_then(|v| v.combined()) else {
            continue;
        };
        source_count += combined.source_count;
        for part in &combined.parts {
            let source = world
                .scene
                .meshes()
                .get(part.mesh)
                .ok_or(BuildError::MissingMesh(part.mesh))?;
            mesh.append_transformed(source, &part.transform.to_matrix());
            if material.is_none() {
                material = part.materials.first().copied();
            }
        }
    }
    let bounds = mesh.bounds();
    let handle = world.scene.meshes_mut().insert(mesh);
    Ok(CombinedProxy {
        parts: vec![HlodPart {
            name: format!("HLOD {serial}"),
            mesh: handle,
            transform: Transform::default(),
            materials: material.into_iter().collect(),
            owned: true,
        }],
        merged: true,
        materials,
        bounds,
        simplified: Vec::new(),
        source_count,
    })
}

impl Task<HlodWorld> for BuildTask {
    fn step(&mut self, world: &mut HlodWorld) -> Step {
        let _span = tracing::trace_span!("hlod_build", volume = ?self.node).entered();
        let phase = std::mem::replace(&mut self.phase, Phase::Install(None));
        self.phase = match phase {
            Phase::Plan => {
                if !world.tree.contains(self.node) {
                    return Step::Done;
                }
                self.plan(world)
            }
            Phase::Gather {
                mut pending,
                mut proxy,
            } => {
                if !world.tree.contains(self.node) {
                    return Step::Done;
                }
                match pending.pop_front() {
                    Some(id) => {
                        Self::gather_one(world, id, &mut proxy);
                        Phase::Gather { pending, proxy }
                    }
                    None => Self::finish_batch(world, proxy),
                }
            }
            Phase::Simplify { mut job, mut proxy } => match job.poll() {
                JobPoll::Pending => {
                    self.phase = Phase::Simplify { job, proxy };
                    return Step::Pending;
                }
                JobPoll::Ready(Ok(levels)) => {
                    for (quality, mesh) in levels {
                        let handle = world.scene.meshes_mut().insert(mesh);
                        proxy.simplified.push(SimplifiedLevel { quality, mesh: handle });
                        world.stats_mut().simplified_meshes += 1;
                    }
                    Phase::Install(Some(proxy))
                }
                JobPoll::Ready(Err(err)) => {
                    tracing::warn!(%err, "simplified HLOD levels skipped");
                    Phase::Install(Some(proxy))
                }
                JobPoll::Lost => {
                    tracing::warn!(err = %BuildError::SimplifierDisconnected, "simplified HLOD levels skipped");
                    Phase::Install(Some(proxy))
                }
            },
            Phase::Install(proxy) => return self.finish_install(world, proxy),
        };
        Step::Continue
    }

    fn label(&self) -> &'static str {
        "build"
    }
}

/// Rebuild every dirty volume, children before parents, clearing dirty as
/// each finishes. A volume dirtied again while its build was suspended stays
/// dirty for the next pass.
#[derive(Default)]
pub struct UpdateAllTask {
    order: Option<VecDeque<VolumeKey>>,
    /// The build in progress and the dirty epoch it started from.
    current: Option<(BuildTask, u64)>,
    built: usize,
}

impl UpdateAllTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Volumes rebuilt so far in this pass.
    pub fn built(&self) -> usize {
        self.built
    }
}

impl Task<HlodWorld> for UpdateAllTask {
    fn step(&mut self, world: &mut HlodWorld) -> Step {
        let _span = tracing::debug_span!("hlod_update_pass", built = self.built).entered();
        if let Some((build, epoch)) = self.current.as_mut() {
            return match build.step(world) {
                Step::Done => {
                    let node = build.node();
                    if !world.tree.clear_dirty_since(node, *epoch) {
                        tracing::debug!(volume = ?node, "volume dirtied during its build, left for next pass");
                    }
                    self.current = None;
                    self.built += 1;
                    Step::Continue
                }
                other => other,
            };
        }

        let order = self.order.get_or_insert_with(|| {
            let order: VecDeque<VolumeKey> = world.tree.post_order().into();
            tracing::debug!(volumes = order.len(), dirty = world.tree.dirty_count(), "update pass started");
            order
        });
        match order.pop_front() {
            Some(key) => {
                let dirty = world.tree.get(key).is_some_and(|v| v.is_dirty());
                if let Some(epoch) = world.tree.dirty_epoch(key).filter(|_| dirty) {
                    self.current = Some((BuildTask::new(key, false), epoch));
                }
                Step::Continue
            }
            None => {
                world.flush_released();
                tracing::debug!(built = self.built, "update pass complete");
                Step::Done
            }
        }
    }

    fn label(&self) -> &'static str {
        "update_all"
    }
}
