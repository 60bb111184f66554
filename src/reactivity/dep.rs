// ============================================================================
// spark-weave - Dependency Sets
// Subscriber sets with per-depth "was tracked" / "newly tracked" markers
// ============================================================================
//
// Each reactive cell (one key of one target, or one ref) owns a Dep. While an
// effect runs at nesting depth d, bit `1 << d` of `w` marks deps the effect
// read in its previous run and the same bit of `n` marks deps read in this
// run. When the run ends, deps with w-but-not-n lose the effect; the effect's
// dep list is compacted in place. Both bits are cleared afterwards.
// =============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::types::FxIndexMap;
use crate::primitives::effect::EffectInner;

pub struct DepInner {
    subscribers: RefCell<FxIndexMap<u64, Weak<EffectInner>>>,
    /// "was tracked" markers, one bit per nesting depth
    w: Cell<u32>,
    /// "newly tracked" markers, one bit per nesting depth
    n: Cell<u32>,
}

/// Subscriber set of one reactive cell.
#[derive(Clone)]
pub struct Dep(Rc<DepInner>);

impl Dep {
    pub fn new() -> Self {
        Dep(Rc::new(DepInner {
            subscribers: RefCell::new(FxIndexMap::default()),
            w: Cell::new(0),
            n: Cell::new(0),
        }))
    }

    pub fn ptr_eq(&self, other: &Dep) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // =========================================================================
    // MARKERS
    // =========================================================================

    pub fn was_tracked(&self, bit: u32) -> bool {
        self.0.w.get() & bit != 0
    }

    pub fn new_tracked(&self, bit: u32) -> bool {
        self.0.n.get() & bit != 0
    }

    pub fn mark_was_tracked(&self, bit: u32) {
        self.0.w.set(self.0.w.get() | bit);
    }

    pub fn mark_new_tracked(&self, bit: u32) {
        self.0.n.set(self.0.n.get() | bit);
    }

    pub fn clear_markers(&self, bit: u32) {
        self.0.w.set(self.0.w.get() & !bit);
        self.0.n.set(self.0.n.get() & !bit);
    }

    // =========================================================================
    // SUBSCRIBERS
    // =========================================================================

    pub fn contains(&self, effect: &EffectInner) -> bool {
        self.0.subscribers.borrow().contains_key(&effect.id)
    }

    pub fn add(&self, effect: &Rc<EffectInner>) {
        self.0
            .subscribers
            .borrow_mut()
            .insert(effect.id, Rc::downgrade(effect));
    }

    pub fn remove(&self, effect: &EffectInner) {
        self.0.subscribers.borrow_mut().shift_remove(&effect.id);
    }

    pub fn len(&self) -> usize {
        self.0.subscribers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live subscribers in subscription order. Dropped effects are pruned.
    pub fn effects(&self) -> Vec<Rc<EffectInner>> {
        let mut live = Vec::new();
        self.0.subscribers.borrow_mut().retain(|_, weak| match weak.upgrade() {
            Some(effect) => {
                live.push(effect);
                true
            }
            None => false,
        });
        live
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

/// Mark every dep of the effect as "was tracked" for the current depth.
pub fn init_dep_markers(deps: &[Dep], bit: u32) {
    for dep in deps {
        dep.mark_was_tracked(bit);
    }
}

/// Drop subscriptions that were not renewed by this run and compact the
/// effect's dep list. Clears the current depth's bits on every dep.
pub fn finalize_dep_markers(effect: &EffectInner, bit: u32) {
    let mut deps = effect.deps.borrow_mut();
    deps.retain(|dep| {
        let keep = !(dep.was_tracked(bit) && !dep.new_tracked(bit));
        if !keep {
            dep.remove(effect);
        }
        dep.clear_markers(bit);
        keep
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_are_per_bit() {
        let dep = Dep::new();
        dep.mark_was_tracked(2);
        dep.mark_new_tracked(4);
        assert!(dep.was_tracked(2));
        assert!(!dep.was_tracked(4));
        assert!(dep.new_tracked(4));
        dep.clear_markers(2);
        assert!(!dep.was_tracked(2));
        assert!(dep.new_tracked(4));
    }
}
