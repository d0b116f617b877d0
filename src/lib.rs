//! Desktop pet overlay: global input capture and state synchronization.
//!
//! ```text
//! egui window ─┐                                   ┌─► ParameterBoard ─► overlay drawing
//!              ├─► input hub ─► watch<Snapshot> ─► bridge
//! OS hook ─────┘                                   └─► model reload on mode change
//! ```

pub mod bridge;
pub mod input;
pub mod menu;
pub mod persistence;
pub mod ui;
