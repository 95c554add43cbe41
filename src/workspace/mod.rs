//! On-disk workspace for intermediate artifacts.
//!
//! Every artifact is addressed by frame index and, for upscaled regions,
//! by region position. Writes go to a `.temp` sibling first and are
//! renamed into place, so a crash never leaves a half-written file under
//! the final name.

mod layout;
mod manifest;
mod store;

pub use layout::Area;
pub use manifest::{FrameEntry, RunManifest};
pub use store::{CorrectionDescriptor, RegionDescriptor, Workspace, WorkspaceError};
