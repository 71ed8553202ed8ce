use std::sync::Arc;

use hlod_scene::{CombinedProxy, Scene};
use hlod_volume::{TreeContext, VolumeKey, VolumeTree};

use crate::capability::{Batcher, MeshSimplifier};

/// Strategies resolved from the registry for this world.
#[derive(Clone)]
pub struct Toolset {
    pub batcher: Arc<dyn Batcher>,
    pub batcher_name: String,
    /// `None` disables per-proxy LOD generation and simplified HLOD levels.
    pub simplifier: Option<Arc<dyn MeshSimplifier>>,
    pub simplifier_name: Option<String>,
}

impl std::fmt::Debug for Toolset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolset")
            .field("batcher", &self.batcher_name)
            .field("simplifier", &self.simplifier_name)
            .finish()
    }
}

/// Build-time knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSettings {
    /// Simplified renditions generated for merged proxies, at quality 0.5^l.
    pub simplified_levels: u32,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            simplified_levels: 1,
        }
    }
}

/// Notifications for the host's draw submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HlodEvent {
    /// A volume has a new combined proxy.
    Installed {
        volume: VolumeKey,
        draw_calls: usize,
        merged: bool,
    },
    /// A volume's combined proxy was destroyed.
    Released {
        volume: VolumeKey,
        meshes_freed: usize,
    },
}

/// Counters for build work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub builds: u64,
    pub merged_builds: u64,
    pub batched_builds: u64,
    pub empty_builds: u64,
    pub skipped_sources: u64,
    pub simplified_meshes: u64,
    pub released_proxies: u64,
    pub freed_meshes: u64,
}

/// Everything the tree owner mutates: the hierarchy, the scene it indexes,
/// and the resolved build strategies. Cooperative tasks run against this.
#[derive(Debug)]
pub struct HlodWorld {
    pub tree: VolumeTree,
    pub scene: Scene,
    toolset: Toolset,
    settings: BuildSettings,
    stats: BuildStats,
    events: Vec<HlodEvent>,
}

impl HlodWorld {
    pub fn new(tree: VolumeTree, scene: Scene, toolset: Toolset, settings: BuildSettings) -> Self {
        Self {
            tree,
            scene,
            toolset,
            settings,
            stats: BuildStats::default(),
            events: Vec::new(),
        }
    }

    pub fn toolset(&self) -> &Toolset {
        &self.toolset
    }

    pub fn set_toolset(&mut self, toolset: Toolset) {
        self.toolset = toolset;
    }

    pub fn settings(&self) -> BuildSettings {
        self.settings
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut BuildStats {
        &mut self.stats
    }

    pub fn events(&self) -> &[HlodEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<HlodEvent> {
        std::mem::take(&mut self.events)
    }

    /// Free the geometry of combined proxies the tree has detached.
    pub fn flush_released(&mut self) -> usize {
        let released = self.tree.take_released();
        let count = released.len();
        for (volume, proxy) in released {
            self.release(volume, proxy);
        }
        count
    }

    pub(crate) fn release(&mut self, volume: VolumeKey, proxy: CombinedProxy) {
        let meshes_freed = proxy.release(self.scene.meshes_mut());
        self.stats.released_proxies += 1;
        self.stats.freed_meshes += meshes_freed as u64;
        self.events.push(HlodEvent::Released {
            volume,
            meshes_freed,
        });
    }

    /// Install `proxy` on `volume`, destroying whatever it replaces.
    pub(crate) fn install(&mut self, volume: VolumeKey, proxy: Option<CombinedProxy>) {
        if !self.tree.contains(volume) {
            if let Some(orphan) = proxy {
                self.release(volume, orphan);
            }
            return;
        }
        let event = proxy.as_ref().map(|p| HlodEvent::Installed {
            volume,
            draw_calls: p.draw_calls(),
            merged: p.merged,
        });
        if let Some(previous) = self.tree.install_combined(volume, proxy) {
            self.release(volume, previous);
        }
        self.events.extend(event);
    }
}

impl TreeContext for HlodWorld {
    fn tree_mut(&mut self) -> &mut VolumeTree {
        &mut self.tree
    }
}
