use crate::types::now_ms;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// Observer callbacks fired this soon after a repaint finishes are
/// treated as echoes of our own DOM writes.
pub const SUPPRESS_WINDOW_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    CharacterData,
    Attributes,
}

/// One entry of an observer batch, pre-resolved to whether its target
/// sits inside our own UI root.
#[derive(Debug, Clone, Copy)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub inside_own_root: bool,
}

/// Coordination state that keeps highlight repaints from re-triggering
/// themselves: a reentrancy flag while a pass runs, then a fixed
/// suppression window once it finishes.
#[derive(Debug, Default)]
pub struct HighlightWatcher {
    repainting: AtomicBool,
    suppress_until: AtomicU64,
}

impl HighlightWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the repaint slot. Returns `None` while another pass holds
    /// it. The guard releases the slot and arms the suppression window
    /// on drop, so even an aborted pass cannot wedge the watcher.
    pub fn begin_repaint(&self) -> Option<RepaintGuard<'_>> {
        if self
            .repainting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("repaint already in progress, skipping");
            return None;
        }
        Some(RepaintGuard { watcher: self })
    }

    pub fn is_repainting(&self) -> bool {
        self.repainting.load(Ordering::Acquire)
    }

    /// Decide whether an observer batch warrants a repaint: never during
    /// a pass or inside the suppression window, never with nothing to
    /// highlight, and only when some mutation outside our own root
    /// touched page text or structure.
    pub fn should_process(
        &self,
        batch: &[MutationRecord],
        collection_len: usize,
        now: u64,
    ) -> bool {
        if self.is_repainting() {
            return false;
        }
        if now < self.suppress_until.load(Ordering::Acquire) {
            return false;
        }
        if collection_len == 0 {
            return false;
        }
        batch.iter().any(|record| {
            !record.inside_own_root
                && matches!(
                    record.kind,
                    MutationKind::ChildList | MutationKind::CharacterData
                )
        })
    }
}

pub struct RepaintGuard<'a> {
    watcher: &'a HighlightWatcher,
}

impl Drop for RepaintGuard<'_> {
    fn drop(&mut self) {
        self.watcher
            .suppress_until
            .store(now_ms() + SUPPRESS_WINDOW_MS, Ordering::Release);
        self.watcher.repainting.store(false, Ordering::Release);
    }
}
