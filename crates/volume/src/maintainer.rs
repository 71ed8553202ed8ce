//! Cooperative insert / remove / move.
//!
//! Each task advances one tree level (or one node) per step. Structural
//! operations (split, grow, shrink) complete inside a single step, so the
//! tree is consistent at every suspension point.

use crate::tree::{ShrinkOutcome, VolumeKey, VolumeTree};
use hlod_common::{Aabb, Cube, ProxyId};
use hlod_sched::{Step, Task};

/// Gives tasks access to the tree they maintain.
pub trait TreeContext {
    fn tree_mut(&mut self) -> &mut VolumeTree;
}

impl TreeContext for VolumeTree {
    fn tree_mut(&mut self) -> &mut VolumeTree {
        self
    }
}

/// Adds a proxy to the tree, descending from the root.
#[derive(Debug, Clone)]
pub struct InsertTask {
    id: ProxyId,
    bounds: Aabb,
    cursor: Option<VolumeKey>,
    started: bool,
}

impl InsertTask {
    pub fn new(id: ProxyId, bounds: Aabb) -> Self {
        Self {
            id,
            bounds,
            cursor: None,
            started: false,
        }
    }

    pub fn id(&self) -> ProxyId {
        self.id
    }

    fn advance(&mut self, tree: &mut VolumeTree) -> Step {
        let point = self.bounds.center();

        if !self.started {
            self.started = true;
            if !point.is_finite() {
                tracing::warn!(proxy = %self.id.short(), "refusing proxy with non-finite bounds");
                return Step::Done;
            }
            if !tree.is_established() {
                tree.establish(Cube::enclosing(&self.bounds));
            }
            tree.record_placement(self.id, self.bounds);
            self.cursor = Some(tree.root());
        }

        // A handle that no longer resolves means the branch is gone; the
        // descent starts over from whatever root survives.
        let Some(key) = self.cursor.filter(|k| tree.contains(*k)) else {
            tracing::trace!(proxy = %self.id.short(), "insert cursor stale, restarting at root");
            self.cursor = Some(tree.root());
            return Step::Continue;
        };

        // Below the root, the parent already picked the octant holding the
        // point, so only the root needs a containment test.
        if key == tree.root() {
            let Some(root) = tree.get(key) else {
                return Step::Done;
            };
            if !root.bounds().contains_point(point) {
                let threshold = tree.settings().split_threshold;
                if root.is_leaf() && root.members().len() < threshold {
                    tree.encapsulate(&self.bounds);
                } else {
                    self.cursor = Some(tree.grow_toward(point));
                    return Step::Continue;
                }
            }
        }

        tree.add_member(key, self.id);
        if let Some(child) = tree.child_for_point(key, point) {
            self.cursor = Some(child);
            return Step::Continue;
        }

        let settings = tree.settings();
        let count = tree.get(key).map_or(0, |v| v.members().len());
        let depth = tree.depth(key).unwrap_or(0);
        if count > settings.split_threshold && depth < settings.max_depth {
            tree.split(key);
        } else {
            tree.set_dirty(key);
        }
        tracing::trace!(proxy = %self.id.short(), depth, "inserted");
        Step::Done
    }
}

impl<C: TreeContext> Task<C> for InsertTask {
    fn step(&mut self, ctx: &mut C) -> Step {
        self.advance(ctx.tree_mut())
    }

    fn label(&self) -> &'static str {
        "insert"
    }
}

#[derive(Debug, Clone)]
enum RemovePhase {
    Start,
    Walk {
        stack: Vec<VolumeKey>,
        removed_at_root: bool,
    },
    Shrink,
}

/// Removes a proxy from every volume listing it, then collapses the root.
#[derive(Debug, Clone)]
pub struct RemoveTask {
    id: ProxyId,
    phase: RemovePhase,
}

impl RemoveTask {
    pub fn new(id: ProxyId) -> Self {
        Self {
            id,
            phase: RemovePhase::Start,
        }
    }

    pub fn id(&self) -> ProxyId {
        self.id
    }

    fn advance(&mut self, tree: &mut VolumeTree) -> Step {
        match &mut self.phase {
            RemovePhase::Start => {
                self.phase = RemovePhase::Walk {
                    stack: vec![tree.root()],
                    removed_at_root: false,
                };
                Step::Continue
            }
            RemovePhase::Walk {
                stack,
                removed_at_root,
            } => {
                if let Some(key) = stack.pop() {
                    // Missing handles are skipped: nothing left to remove there.
                    if tree.remove_member(key, self.id) {
                        if key == tree.root() {
                            *removed_at_root = true;
                        }
                        match tree.get(key).and_then(|v| v.children()).copied() {
                            Some(children) => stack.extend(children),
                            None => tree.set_dirty(key),
                        }
                    }
                    return Step::Continue;
                }
                let shrink = *removed_at_root;
                tree.forget_placement(self.id);
                tracing::trace!(proxy = %self.id.short(), "removed");
                if shrink {
                    self.phase = RemovePhase::Shrink;
                    Step::Continue
                } else {
                    Step::Done
                }
            }
            RemovePhase::Shrink => match tree.shrink_root() {
                ShrinkOutcome::Promoted(_) => Step::Continue,
                ShrinkOutcome::Collapsed | ShrinkOutcome::Unchanged => Step::Done,
            },
        }
    }
}

impl<C: TreeContext> Task<C> for RemoveTask {
    fn step(&mut self, ctx: &mut C) -> Step {
        self.advance(ctx.tree_mut())
    }

    fn label(&self) -> &'static str {
        "remove"
    }
}

/// Remove followed by a fresh insert at the new bounds.
#[derive(Debug, Clone)]
pub struct MoveTask {
    remove: Option<RemoveTask>,
    insert: InsertTask,
}

impl MoveTask {
    pub fn new(id: ProxyId, bounds: Aabb) -> Self {
        Self {
            remove: Some(RemoveTask::new(id)),
            insert: InsertTask::new(id, bounds),
        }
    }
}

impl<C: TreeContext> Task<C> for MoveTask {
    fn step(&mut self, ctx: &mut C) -> Step {
        let tree = ctx.tree_mut();
        if let Some(remove) = self.remove.as_mut() {
            if remove.advance(tree) == Step::Done {
                self.remove = None;
            }
            return Step::Continue;
        }
        // The insert starts from whichever root survived the removal.
        self.insert.advance(tree)
    }

    fn label(&self) -> &'static str {
        "move"
    }
}
