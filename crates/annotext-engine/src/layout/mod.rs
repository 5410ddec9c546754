//! Layout: the Block Model and the reconciliation engine that keeps it in
//! sync with the document and the per-kind display modes.

pub mod block;
pub mod dirty;
pub mod display;
pub mod reconcile;
pub(crate) mod tags;

pub use block::{
    Block, BlockArena, BlockKey, ContainerBlock, Fragment, SelectionPaint, TagBlock, TextBlock,
    HIGHLIGHT_END_CAP, HIGHLIGHT_START_CAP,
};
pub use dirty::{AnnotationEdge, DirtyRegion, Effect};
pub use display::{DisplayMode, DisplayModeRegistry, ModeTransition};
pub use reconcile::ReconcileStats;
