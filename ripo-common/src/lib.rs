pub mod config;
pub mod enums;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    ArenaConfig, GridConfig, GroupConfig, InputConfig, OutputConfig, OutputSpecConfig, RunConfig,
    SimulationConfig,
};
pub use enums::{Activation, AgentKind, Arena, Normalization, OutputAction, Perception};
pub use snapshot::Snapshot;
pub use vecmath::{angle_to_vec, vec_to_angle, wrap_angle, Vec2};
