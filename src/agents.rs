use ripo_common::{AgentKind, Vec2};

/// Per-agent behavioral limits and process noise.
#[derive(Debug, Clone, Copy)]
pub struct AgentParams {
    pub vmin: f32,
    pub vmax: f32,
    /// Maximum turn per step (radians).
    pub damax: f32,
    /// Speed noise standard deviation (0 disables the draw).
    pub vnoise: f32,
    /// Heading noise standard deviation (0 disables the draw).
    pub anoise: f32,
}

/// Flat structure-of-arrays container for all agents.
///
/// Invariant: every vector has exactly `count` rows, and each group id
/// indexes a row of the group parameter table.
#[derive(Debug, Default)]
pub struct Agents {
    pub count: usize,
    pub kinds: Vec<AgentKind>,
    pub group_ids: Vec<u16>,
    pub params: Vec<AgentParams>,
    // Initial state, in the same layout the step buffers use.
    pub pos_x: Vec<f32>,
    pub pos_y: Vec<f32>,
    pub vel_v: Vec<f32>,
    pub vel_a: Vec<f32>,
}

impl Agents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one group's worth of agents.
    pub fn push_group(
        &mut self,
        kind: AgentKind,
        group_id: u16,
        params: AgentParams,
        positions: &[Vec2],
        speeds: &[f32],
        orientations: &[f32],
    ) {
        debug_assert_eq!(positions.len(), speeds.len());
        debug_assert_eq!(positions.len(), orientations.len());
        let n = positions.len();
        self.count += n;
        self.kinds.extend(std::iter::repeat(kind).take(n));
        self.group_ids.extend(std::iter::repeat(group_id).take(n));
        self.params.extend(std::iter::repeat(params).take(n));
        self.pos_x.extend(positions.iter().map(|p| p.x));
        self.pos_y.extend(positions.iter().map(|p| p.y));
        self.vel_v.extend_from_slice(speeds);
        self.vel_a.extend_from_slice(orientations);
    }

    /// Checks the equal-row-count invariant.
    pub fn is_consistent(&self) -> bool {
        [
            self.kinds.len(),
            self.group_ids.len(),
            self.params.len(),
            self.pos_x.len(),
            self.pos_y.len(),
            self.vel_v.len(),
            self.vel_a.len(),
        ]
        .iter()
        .all(|&len| len == self.count)
    }
}
