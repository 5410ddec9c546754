pub mod document;
pub mod layout;
pub mod selection;
pub mod view;
pub mod viewport;

// Re-export key types for easier usage
pub use document::{DocChange, Document, DocumentError, Token};
pub use document::annotations::{Annotation, AnnotationId, AnnotationIndex};
pub use layout::block::{Block, BlockArena, BlockKey, ContainerBlock, Fragment, TagBlock, TextBlock};
pub use layout::display::{DisplayMode, DisplayModeRegistry, ModeTransition};
pub use layout::dirty::DirtyRegion;
pub use layout::reconcile::ReconcileStats;
pub use selection::{
    NormalizedRange, PointTarget, ResolvedSelection, SelectionKind, SelectionOutcome,
    SelectionState, TagRegion,
};
pub use view::{SelectionListener, PendingActionListener, ViewController, VisibilityTarget};
pub use viewport::{
    BlockMetrics, RestorePath, StabilizerConfig, ViewportAnchor, ViewportStabilizer,
};
