use std::time::Duration;

use hlod_build::{
    BuildError, BuildStats, BuildTask, CapabilityRegistry, HlodEvent, HlodWorld, LodChainGenerator,
    Toolset, UpdateAllTask,
};
use hlod_common::ProxyId;
use hlod_scene::{CombinedProxy, LodChain, RenderProxy, Scene, SceneEvent};
use hlod_sched::{QuantumReport, Scheduler};
use hlod_volume::{InsertTask, MoveTask, RemoveTask, TreeStats, VolumeKey, VolumeTree};

use crate::config::HlodConfig;
use crate::error::HlodError;

/// Operational readouts for monitoring.
#[derive(Debug, Clone, PartialEq)]
pub struct Readouts {
    pub queue_depth: usize,
    pub last_execution_time: Duration,
    pub average_execution_time: Duration,
    pub min_execution_time: Duration,
    pub max_execution_time: Duration,
    /// Share of recent quanta that ran out of budget.
    pub suspension_rate: f32,
    pub quanta: u64,
    pub volumes: usize,
    pub tracked_proxies: usize,
    pub dirty_volumes: usize,
    pub tree: TreeStats,
    pub builds: BuildStats,
}

/// The HLOD system as the host sees it.
///
/// Owns the scene, the hierarchy and the task queue. The host reports proxy
/// changes (directly or through the scene's event log), requests update
/// passes, and gives the system one quantum per frame.
pub struct HlodSystem {
    world: HlodWorld,
    scheduler: Scheduler<HlodWorld>,
    config: HlodConfig,
    lod_generator: Option<LodChainGenerator>,
    lod_disabled_reason: Option<String>,
}

impl HlodSystem {
    pub fn new(config: HlodConfig, registry: &CapabilityRegistry) -> Result<Self, HlodError> {
        Self::with_scene(config, registry, Scene::new())
    }

    /// Build a system over an existing scene. Proxies already in the scene
    /// are picked up by the next `sync_scene` only if their events are still
    /// in the scene's log.
    pub fn with_scene(
        config: HlodConfig,
        registry: &CapabilityRegistry,
        scene: Scene,
    ) -> Result<Self, HlodError> {
        config.validate()?;
        let (toolset, lod_disabled_reason) = resolve_toolset(&config, registry)?;
        let lod_generator = toolset
            .simplifier
            .clone()
            .map(|s| LodChainGenerator::new(s, config.max_lod));
        let world = HlodWorld::new(
            VolumeTree::new(config.tree_settings()),
            scene,
            toolset,
            config.build_settings(),
        );
        tracing::info!(
            split_threshold = config.split_threshold,
            budget_ms = config.time_budget_ms,
            batcher = %world.toolset().batcher_name,
            simplifier = ?world.toolset().simplifier_name,
            "HLOD system ready"
        );
        Ok(Self {
            world,
            scheduler: Scheduler::with_budget_ms(config.time_budget_ms),
            config,
            lod_generator,
            lod_disabled_reason,
        })
    }

    /// Re-resolve capabilities, e.g. after more were registered.
    pub fn reload_capabilities(&mut self, registry: &CapabilityRegistry) -> Result<(), HlodError> {
        let (toolset, reason) = resolve_toolset(&self.config, registry)?;
        self.lod_generator = toolset
            .simplifier
            .clone()
            .map(|s| LodChainGenerator::new(s, self.config.max_lod));
        self.lod_disabled_reason = reason;
        self.world.set_toolset(toolset);
        Ok(())
    }

    pub fn config(&self) -> &HlodConfig {
        &self.config
    }

    pub fn world(&self) -> &HlodWorld {
        &self.world
    }

    pub fn scene(&self) -> &Scene {
        &self.world.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.world.scene
    }

    pub fn tree(&self) -> &VolumeTree {
        &self.world.tree
    }

    pub fn root(&self) -> VolumeKey {
        self.world.tree.root()
    }

    pub fn set_time_budget_ms(&mut self, ms: u64) {
        self.config.time_budget_ms = ms;
        self.scheduler
            .set_budget((ms > 0).then(|| Duration::from_millis(ms)));
    }

    /// Queue insertion of a scene proxy. Returns false when the proxy is not
    /// eligible for the hierarchy.
    pub fn notify_proxy_added(&mut self, id: ProxyId) -> bool {
        let Some(proxy) = self.eligible(id) else {
            return false;
        };
        self.scheduler.push(InsertTask::new(id, proxy.bounds));
        true
    }

    /// Queue removal. Unknown proxies are a no-op once the task runs.
    pub fn notify_proxy_removed(&mut self, id: ProxyId) {
        if !self.config.scene_lod_enabled {
            return;
        }
        self.scheduler.push(RemoveTask::new(id));
    }

    /// Queue a move to the proxy's current bounds.
    pub fn notify_proxy_moved(&mut self, id: ProxyId) -> bool {
        let Some(proxy) = self.eligible(id) else {
            return false;
        };
        self.scheduler.push(MoveTask::new(id, proxy.bounds));
        true
    }

    /// Turn the scene's pending events into hierarchy tasks. Returns the
    /// number of events consumed.
    pub fn sync_scene(&mut self) -> usize {
        let events = self.world.scene.drain_events();
        for event in &events {
            match event {
                SceneEvent::ProxyAdded { id, .. } => {
                    self.notify_proxy_added(*id);
                }
                SceneEvent::ProxyMoved { id, .. } => {
                    self.notify_proxy_moved(*id);
                }
                SceneEvent::ProxyRemoved { id } => self.notify_proxy_removed(*id),
            }
        }
        events.len()
    }

    /// Queue a full update pass over dirty volumes.
    pub fn update_all(&mut self) {
        self.scheduler.push(UpdateAllTask::new());
    }

    /// Queue a build of one volume, optionally continuing up to the root.
    pub fn build_volume(&mut self, volume: VolumeKey, propagate: bool) {
        self.scheduler.push(BuildTask::new(volume, propagate));
    }

    /// Run one scheduling quantum.
    pub fn run_quantum(&mut self) -> QuantumReport {
        let report = self.scheduler.run_quantum(&mut self.world);
        self.world.flush_released();
        report
    }

    /// Run quanta until the queue drains. Returns the number of quanta.
    pub fn run_until_idle(&mut self) -> usize {
        let quanta = self.scheduler.run_until_idle(&mut self.world);
        self.world.flush_released();
        quanta
    }

    pub fn queue_depth(&self) -> usize {
        self.scheduler.queue_depth()
    }

    /// Wall time of the most recent quantum.
    pub fn current_execution_time(&self) -> Duration {
        self.scheduler.stats().last_execution_time
    }

    pub fn readouts(&self) -> Readouts {
        let history = self.scheduler.history();
        Readouts {
            queue_depth: self.queue_depth(),
            last_execution_time: self.current_execution_time(),
            average_execution_time: history.average(),
            min_execution_time: history.min(),
            max_execution_time: history.max(),
            suspension_rate: history.suspension_rate(),
            quanta: self.scheduler.stats().quanta,
            volumes: self.world.tree.len(),
            tracked_proxies: self.world.tree.tracked_count(),
            dirty_volumes: self.world.tree.dirty_count(),
            tree: self.world.tree.stats().clone(),
            builds: self.world.stats().clone(),
        }
    }

    pub fn drain_events(&mut self) -> Vec<HlodEvent> {
        self.world.drain_events()
    }

    pub fn combined(&self, volume: VolumeKey) -> Option<&CombinedProxy> {
        self.world.tree.get(volume).and_then(|v| v.combined())
    }

    /// Every installed combined proxy, depth-first from the root.
    pub fn combined_proxies(&self) -> Vec<(VolumeKey, &CombinedProxy)> {
        self.world
            .tree
            .depth_first()
            .into_iter()
            .filter_map(|k| self.combined(k).map(|c| (k, c)))
            .collect()
    }

    /// Why per-proxy LOD generation is off, if it is.
    pub fn lod_generation_disabled(&self) -> Option<&str> {
        self.lod_disabled_reason.as_deref()
    }

    /// Generate and attach a LOD chain for one proxy. Its volume is marked
    /// dirty so the next update pass picks up the coarser source.
    pub fn generate_proxy_lods(&mut self, id: ProxyId) -> Result<LodChain, HlodError> {
        let generator = self.lod_generator.as_ref().ok_or_else(|| HlodError::LodGenerationDisabled {
            reason: self
                .lod_disabled_reason
                .clone()
                .unwrap_or_else(|| "no simplifier".into()),
        })?;
        let chain = generator.generate(&mut self.world.scene, id)?;
        let leaf = self
            .world
            .tree
            .placement(id)
            .and_then(|b| self.world.tree.leaf_for_point(b.center()));
        if let Some(leaf) = leaf {
            self.world.tree.set_dirty(leaf);
        }
        Ok(chain)
    }

    /// The proxy if the hierarchy should track it.
    fn eligible(&self, id: ProxyId) -> Option<RenderProxy> {
        if !self.config.scene_lod_enabled {
            tracing::trace!(proxy = %id.short(), "scene LOD disabled, ignoring notification");
            return None;
        }
        let Some(proxy) = self.world.scene.get(id) else {
            tracing::debug!(proxy = %id.short(), "notification for proxy not in scene");
            return None;
        };
        if proxy.hlod_output {
            return None;
        }
        if !proxy.bounds.min.is_finite() || !proxy.bounds.max.is_finite() {
            tracing::warn!(proxy = %id.short(), "ignoring proxy with non-finite bounds");
            return None;
        }
        let triangles = self
            .world
            .scene
            .meshes()
            .get(proxy.mesh)
            .is_some_and(|m| m.is_triangles());
        if !triangles {
            let err = BuildError::UnsupportedGeometry {
                proxy: id,
                reason: "mesh missing or not triangles".into(),
            };
            tracing::warn!(%err, "ignoring proxy");
            return None;
        }
        Some(proxy.clone())
    }
}

impl std::fmt::Debug for HlodSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HlodSystem")
            .field("config", &self.config)
            .field("queue_depth", &self.queue_depth())
            .field("volumes", &self.world.tree.len())
            .finish_non_exhaustive()
    }
}

/// Resolve the configured strategies. A missing batcher, or a simplifier
/// that was asked for by name, is fatal; with no simplifier at all LOD
/// generation is switched off and the reason returned.
fn resolve_toolset(
    config: &HlodConfig,
    registry: &CapabilityRegistry,
) -> Result<(Toolset, Option<String>), HlodError> {
    if registry.is_empty() {
        tracing::error!("no HLOD capabilities registered");
        return Err(BuildError::NoCapabilities.into());
    }
    let (batcher_name, batcher) = registry
        .resolve_batcher(config.batcher.as_deref())
        .inspect_err(|err| tracing::error!(%err, "HLOD batcher unavailable"))?;

    let (simplifier, disabled) = match registry.resolve_simplifier(config.mesh_simplifier.as_deref()) {
        Ok((name, simplifier)) => (Some((name, simplifier)), None),
        Err(err) if config.mesh_simplifier.is_some() => {
            tracing::error!(%err, "configured mesh simplifier unavailable");
            return Err(err.into());
        }
        Err(err) => {
            tracing::error!(%err, "LOD generation disabled");
            (None, Some(err.to_string()))
        }
    };
    let (simplifier_name, simplifier) = simplifier.unzip();
    Ok((
        Toolset {
            batcher,
            batcher_name,
            simplifier,
            simplifier_name,
        },
        disabled,
    ))
}
