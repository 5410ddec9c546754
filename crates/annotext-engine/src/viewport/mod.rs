//! The viewport stabilizer: keeps previously-visible content visually
//! anchored across reconciliation passes that change layout heights.
//!
//! Before a pass, `record` picks the block under a configurable height
//! within the viewport and remembers it by token-range identity. After the
//! pass, `restore` walks a fallback chain from "same block, same offset"
//! down to "block with maximum token overlap", then runs a damped
//! fixed-point loop against the live geometry, since scrolling can itself
//! trigger reflow.

use std::ops::Range;

use tracing::{debug, trace};

use crate::document::annotations::range_overlap;
use crate::layout::block::{BlockArena, TextBlock};

/// Geometry the stabilizer reads from and writes to the rendering surface.
/// All distances are pixels (or rows, for cell-based surfaces); blocks are
/// addressed by their serial stamp.
pub trait BlockMetrics {
    fn viewport_height(&self) -> i64;
    fn scroll_offset(&self) -> i64;
    fn set_scroll_offset(&mut self, offset: i64);
    /// Top of the block in document coordinates; None when the block is not
    /// rendered (folded away or absent).
    fn block_top(&self, serial: u64) -> Option<i64>;
    fn block_height(&self, serial: u64) -> Option<i64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilizerConfig {
    /// Height within the viewport to stabilize, in percent of the viewport
    /// height (0..=100).
    pub stable_fraction: u8,
    /// Strictness 0 (loose) to 10 (strict): the convergence tolerance starts
    /// at 2^(10 - level) pixels and widens by 3x per retry.
    pub stabilization_level: u8,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            stable_fraction: 33,
            stabilization_level: 5,
        }
    }
}

impl StabilizerConfig {
    pub fn clamped(self) -> Self {
        Self {
            stable_fraction: self.stable_fraction.min(100),
            stabilization_level: self.stabilization_level.min(10),
        }
    }

    fn base_tolerance(&self) -> i64 {
        1 << (10 - i64::from(self.stabilization_level.min(10)))
    }

    fn target_line(&self, viewport_height: i64) -> i64 {
        viewport_height * i64::from(self.stable_fraction.min(100)) / 100
    }
}

/// What `record` captured: the anchor block by content identity, its offset
/// within the viewport, and where within the block the target line sat.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportAnchor {
    serial: u64,
    token_range: Range<usize>,
    /// The block's top relative to the viewport top at record time.
    viewport_offset: i64,
    /// Position of the target line within the block, 0.0..=1.0.
    relative: f64,
}

/// Which rung of the restore fallback chain matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePath {
    SameBlock,
    SameTokenRange,
    SubRange,
    SuperRange,
    BestOverlap,
    /// Nothing matched; the scroll offset is left alone.
    Lost,
}

#[derive(Debug, Clone, Default)]
pub struct ViewportStabilizer {
    config: StabilizerConfig,
}

impl ViewportStabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            config: config.clamped(),
        }
    }

    pub fn config(&self) -> StabilizerConfig {
        self.config
    }

    pub fn set_config(&mut self, config: StabilizerConfig) {
        self.config = config.clamped();
    }

    /// Pick the anchor block under the stabilization line. Blocks folded out
    /// of the render are skipped in favor of the nearest rendered neighbor.
    pub fn record(
        &self,
        arena: &BlockArena,
        metrics: &impl BlockMetrics,
    ) -> Option<ViewportAnchor> {
        let target_y = metrics.scroll_offset() + self.config.target_line(metrics.viewport_height());

        let rendered: Vec<(&TextBlock, i64, i64)> = arena
            .text_blocks()
            .filter_map(|b| {
                let top = metrics.block_top(b.serial)?;
                let height = metrics.block_height(b.serial)?;
                Some((b, top, height))
            })
            .collect();
        if rendered.is_empty() {
            return None;
        }

        // Tops are monotone in visual order, so a partition point finds the
        // block whose extent contains the target line (or its predecessor
        // when the line falls into a fold gap).
        let idx = rendered.partition_point(|&(_, top, _)| top <= target_y);
        let (block, top, height) = rendered[idx.saturating_sub(1).min(rendered.len() - 1)];

        let anchor = ViewportAnchor {
            serial: block.serial,
            token_range: block.token_range.clone(),
            viewport_offset: top - metrics.scroll_offset(),
            relative: if height > 0 {
                ((target_y - top).clamp(0, height) as f64) / height as f64
            } else {
                0.0
            },
        };
        trace!(serial = anchor.serial, offset = anchor.viewport_offset, "viewport anchor recorded");
        Some(anchor)
    }

    /// Re-anchor the viewport after a pass, walking the fallback chain and
    /// converging against live geometry.
    pub fn restore(
        &self,
        anchor: &ViewportAnchor,
        arena: &BlockArena,
        metrics: &mut impl BlockMetrics,
    ) -> RestorePath {
        let Some((path, block)) = self.find_anchor_block(anchor, arena) else {
            debug!("viewport anchor lost; scroll offset unchanged");
            return RestorePath::Lost;
        };
        let serial = block.serial;

        let desired = match path {
            // The old relative offset scaled into the (larger) new block,
            // pinned back under the stabilization line.
            RestorePath::SuperRange => {
                let height = metrics.block_height(serial).unwrap_or(0);
                let within = (anchor.relative * height as f64) as i64;
                self.config.target_line(metrics.viewport_height()) - within
            }
            _ => anchor.viewport_offset,
        };
        self.converge(serial, desired, metrics);
        debug!(?path, serial, "viewport restored");
        path
    }

    fn find_anchor_block<'a>(
        &self,
        anchor: &ViewportAnchor,
        arena: &'a BlockArena,
    ) -> Option<(RestorePath, &'a TextBlock)> {
        if let Some(key) = arena.find_by_serial(anchor.serial) {
            return Some((RestorePath::SameBlock, arena.text(key)?));
        }
        if let Some(block) = arena
            .text_blocks()
            .find(|b| b.token_range == anchor.token_range)
        {
            return Some((RestorePath::SameTokenRange, block));
        }
        // Split: the sub-block now holding the old range's first token.
        if let Some(block) = arena.text_blocks().find(|b| {
            b.token_range.start >= anchor.token_range.start
                && b.token_range.end <= anchor.token_range.end
                && b.contains_token(anchor.token_range.start)
        }) {
            return Some((RestorePath::SubRange, block));
        }
        // Merged: a block swallowing the whole old range.
        if let Some(block) = arena.text_blocks().find(|b| {
            b.token_range.start <= anchor.token_range.start
                && b.token_range.end >= anchor.token_range.end
                && !b.token_range.is_empty()
        }) {
            return Some((RestorePath::SuperRange, block));
        }
        arena
            .text_blocks()
            .map(|b| (range_overlap(&b.token_range, &anchor.token_range), b))
            .filter(|(overlap, _)| *overlap > 0)
            .max_by_key(|(overlap, _)| *overlap)
            .map(|(_, block)| (RestorePath::BestOverlap, block))
    }

    /// Damped fixed-point iteration: apply the scroll delta, re-measure,
    /// retry with a widened tolerance while the anchor is off target. The
    /// widening rule bounds the loop; no wall-clock limit is needed.
    fn converge(&self, serial: u64, desired: i64, metrics: &mut impl BlockMetrics) {
        let mut tolerance = self.config.base_tolerance();
        let viewport = metrics.viewport_height().max(1);

        loop {
            let Some(top) = metrics.block_top(serial) else {
                return;
            };
            let actual = top - metrics.scroll_offset();
            if (actual - desired).abs() <= tolerance {
                return;
            }
            metrics.set_scroll_offset((top - desired).max(0));

            // Best effort once the anchor cannot fit, or the tolerance has
            // widened past the viewport itself.
            if metrics.block_height(serial).is_some_and(|h| h > viewport) {
                return;
            }
            tolerance = tolerance.saturating_mul(3);
            if tolerance > viewport * 4 {
                return;
            }
        }
    }
}
