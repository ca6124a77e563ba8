use serde::{Deserialize, Serialize};

/// A snapshot of the simulation state at a specific step.
///
/// This is the narrow interface consumed by storage and display
/// collaborators: the step index, a couple of cheap aggregate metrics and,
/// optionally, the full per-agent state arrays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// The step index at which the snapshot was taken (0 = initial state).
    pub step: u32,
    /// The total number of agents in the simulation.
    pub agent_count: u32,
    /// Mean speed over all agents.
    pub mean_speed: f32,
    /// Magnitude of the mean heading unit vector, in [0, 1].
    /// 1 means all agents point the same way.
    pub polarization: f32,
    /// Raw [x, y] positions of all agents, in agent-index order.
    #[serde(skip_serializing_if = "Option::is_none")] // Don't write "positions": null
    pub positions: Option<Vec<(f32, f32)>>,
    /// Polar [speed, heading] velocities of all agents, in agent-index order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocities: Option<Vec<(f32, f32)>>,
}
