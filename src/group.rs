use anyhow::Result;
use log::warn;
use ripo_common::{Activation, AgentKind, Normalization, OutputAction, Perception, Vec2};

/// Polar perception grid: radial bands delimited by `radii` (the last band is
/// open-ended) times `slices` angular sectors.
#[derive(Debug, Clone)]
pub struct PolarGrid {
    /// Radial zone boundaries, strictly ascending.
    pub radii: Vec<f32>,
    pub slices: u32,
}

impl PolarGrid {
    pub fn validate(&self) -> Result<()> {
        if self.slices == 0 {
            anyhow::bail!("zone grid must have at least one angular slice.");
        }
        for w in self.radii.windows(2) {
            if w[1] <= w[0] {
                anyhow::bail!("zone radii must be strictly ascending.");
            }
        }
        if self.radii.first().is_some_and(|&r| r <= 0.0) {
            anyhow::bail!("zone radii must be positive.");
        }
        Ok(())
    }

    /// Number of radial bands (radii delimit `len + 1` bands).
    pub fn radial_count(&self) -> usize {
        self.radii.len() + 1
    }

    pub fn zone_count(&self) -> usize {
        self.radial_count() * self.slices as usize
    }
}

#[derive(Debug, Clone)]
pub struct InputSpec {
    pub perception: Perception,
    pub normalization: Normalization,
    /// Translated weights, length = outputs x zones x perceived groups.
    /// Starts out all-zero until coefficients are assigned.
    pub weights: Vec<f32>,
}

#[derive(Debug, Clone, Copy)]
pub struct OutputSpec {
    pub action: OutputAction,
    pub activation: Activation,
}

/// Initial-condition policy for a group.
#[derive(Debug, Clone, Default)]
pub struct InitialCondition {
    /// Explicit positions; `None` samples uniformly over the arena.
    pub positions: Option<Vec<Vec2>>,
    /// Explicit headings; `None` samples uniformly in [0, 2pi).
    pub orientations: Option<Vec<f32>>,
    /// Initial speed; `None` defaults to the group's vmax.
    pub speed: Option<f32>,
}

/// Full description of one agent group, as registered through the setup API.
#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub name: String,
    pub kind: AgentKind,
    pub count: usize,
    pub grid: Option<PolarGrid>,
    /// Hard perception cutoff; `None` means unlimited range.
    pub rmax: Option<f32>,
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<OutputSpec>,
    pub vmin: f32,
    pub vmax: f32,
    pub damax: f32,
    pub vnoise: f32,
    pub anoise: f32,
    pub initial: InitialCondition,
}

/// Flat, rectangular per-group parameter table.
///
/// One row per group, fixed f32 layout:
///
/// ```text
/// ├── nR                    (1)  radial band count
/// ├── nSa                   (1)  angular slice count
/// ├── radii                 (nR-1)
/// ├── rmax                  (1)  0 encodes "no cutoff"
/// ├── nIn                   (1)
/// ├── nOut                  (1)
/// ├──── perception          (1)  ┐
/// ├──── normalization       (1)  │ per input
/// ├──── nW                  (1)  │
/// ├──── weights             (nW) ┘
/// ├──── action              (1)  ┐ per output
/// ├──── activation          (1)  ┘
/// ```
///
/// The table only grows: adding a longer row pads every existing row with
/// trailing zeros, which decode as benign no-ops. This layout is the wire
/// contract between setup and the kernel and stays positionally stable
/// within a run.
#[derive(Debug, Clone, Default)]
pub struct GroupTable {
    names: Vec<String>,
    kinds: Vec<AgentKind>,
    data: Vec<f32>,
    cols: usize,
}

impl GroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn name(&self, gid: usize) -> &str {
        &self.names[gid]
    }

    pub fn kind(&self, gid: usize) -> AgentKind {
        self.kinds[gid]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn row(&self, gid: usize) -> &[f32] {
        &self.data[gid * self.cols..(gid + 1) * self.cols]
    }

    /// Serializes and appends a group row. Returns the new group id.
    pub fn push(&mut self, spec: &GroupSpec) -> usize {
        let row = serialize_row(spec);
        let gid = self.names.len();
        self.names.push(spec.name.clone());
        self.kinds.push(spec.kind);
        self.insert_row(gid, row);
        gid
    }

    /// Re-serializes an existing group's row after a coefficient
    /// re-assignment. Columns may grow (padding all rows), never shrink.
    pub fn replace(&mut self, gid: usize, spec: &GroupSpec) {
        let new_row = serialize_row(spec);
        let new_cols = self.cols.max(new_row.len());
        let mut data = Vec::with_capacity(self.len() * new_cols);
        for g in 0..self.len() {
            if g == gid {
                data.extend_from_slice(&new_row);
            } else {
                data.extend_from_slice(self.row(g));
            }
            data.resize((g + 1) * new_cols, 0.0);
        }
        self.data = data;
        self.cols = new_cols;
    }

    fn insert_row(&mut self, at: usize, mut row: Vec<f32>) {
        debug_assert_eq!(at * self.cols, self.data.len());
        if row.len() > self.cols {
            // Widen the table: pad every existing row with trailing zeros.
            let new_cols = row.len();
            let mut data = Vec::with_capacity((at + 1) * new_cols);
            for g in 0..at {
                data.extend_from_slice(&self.data[g * self.cols..(g + 1) * self.cols]);
                data.resize((g + 1) * new_cols, 0.0);
            }
            self.data = data;
            self.cols = new_cols;
        } else {
            row.resize(self.cols, 0.0);
        }
        self.data.extend_from_slice(&row);
        self.data.resize((at + 1) * self.cols, 0.0);
    }
}

/// Serializes one group into its parameter row.
///
/// Fixed groups get a trivial all-zero header: the kernel short-circuits on
/// the agent type before ever decoding their row, but every group owns a row
/// so that group ids index the table directly.
fn serialize_row(spec: &GroupSpec) -> Vec<f32> {
    let Some(grid) = &spec.grid else {
        return vec![0.0; 6];
    };

    let mut row = Vec::new();
    row.push(grid.radial_count() as f32);
    row.push(grid.slices as f32);
    row.extend_from_slice(&grid.radii);
    row.push(spec.rmax.unwrap_or(0.0));
    row.push(spec.inputs.len() as f32);
    row.push(spec.outputs.len() as f32);
    for input in &spec.inputs {
        row.push(input.perception.code());
        row.push(input.normalization.code());
        row.push(input.weights.len() as f32);
        row.extend_from_slice(&input.weights);
    }
    for output in &spec.outputs {
        row.push(output.action.code());
        row.push(output.activation.code());
    }
    row
}

/// Decoded view over one serialized group row.
///
/// All access is index arithmetic over the raw f32 row; nothing is copied.
#[derive(Debug, Clone, Copy)]
pub struct GroupRow<'a> {
    row: &'a [f32],
}

#[derive(Debug, Clone, Copy)]
pub struct InputView<'a> {
    pub perception: Perception,
    pub normalization: Normalization,
    pub weights: &'a [f32],
}

#[derive(Debug, Clone, Copy)]
pub struct OutputView {
    pub action: Option<OutputAction>,
    pub activation: Option<Activation>,
}

impl<'a> GroupRow<'a> {
    pub fn new(row: &'a [f32]) -> Self {
        Self { row }
    }

    pub fn radial_count(&self) -> usize {
        self.row[0] as usize
    }

    pub fn slice_count(&self) -> usize {
        self.row[1] as usize
    }

    pub fn zone_count(&self) -> usize {
        self.radial_count() * self.slice_count()
    }

    pub fn radii(&self) -> &'a [f32] {
        let n_r = self.radial_count();
        &self.row[2..2 + n_r.saturating_sub(1)]
    }

    pub fn cutoff(&self) -> Option<f32> {
        let rmax = self.row[2 + self.radial_count().saturating_sub(1)];
        (rmax > 0.0).then_some(rmax)
    }

    pub fn input_count(&self) -> usize {
        self.row[self.radial_count() + 2] as usize
    }

    pub fn output_count(&self) -> usize {
        self.row[self.radial_count() + 3] as usize
    }

    /// Start of the input blocks: header is [nR, nSa, radii.., rmax, nIn, nOut].
    fn inputs_base(&self) -> usize {
        self.radial_count() + 4
    }

    pub fn inputs(&self) -> InputIter<'a> {
        InputIter { row: self.row, at: self.inputs_base(), remaining: self.input_count() }
    }

    /// Iterates the (action, activation) output pairs.
    pub fn outputs(&self) -> impl Iterator<Item = OutputView> + 'a {
        let mut at = self.inputs_base();
        for _ in 0..self.input_count() {
            at += 3 + self.row[at + 2] as usize;
        }
        let row = self.row;
        (0..self.output_count()).map(move |o| OutputView {
            action: OutputAction::from_code(row[at + 2 * o]),
            activation: Activation::from_code(row[at + 2 * o + 1]),
        })
    }
}

pub struct InputIter<'a> {
    row: &'a [f32],
    at: usize,
    remaining: usize,
}

impl<'a> Iterator for InputIter<'a> {
    type Item = Option<InputView<'a>>;

    /// Yields `None` items for undecodable perception kinds so callers can
    /// treat them as neutral no-ops while still advancing past their block.
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let n_w = self.row[self.at + 2] as usize;
        let view = match (
            Perception::from_code(self.row[self.at]),
            Normalization::from_code(self.row[self.at + 1]),
        ) {
            (Some(perception), Some(normalization)) => Some(InputView {
                perception,
                normalization,
                weights: &self.row[self.at + 3..self.at + 3 + n_w],
            }),
            _ => None,
        };
        self.at += 3 + n_w;
        Some(view)
    }
}

/// Validates a group spec at registration time.
///
/// All configuration errors surface here, before the first step runs.
/// Unimplemented extension points are accepted with a warning so a neutral
/// kernel output is distinguishable in the logs from a computed zero.
pub fn validate_spec(spec: &GroupSpec) -> Result<()> {
    if spec.count == 0 {
        anyhow::bail!("group '{}': count must be greater than 0.", spec.name);
    }
    if spec.vmax < spec.vmin {
        anyhow::bail!("group '{}': vmax must be >= vmin.", spec.name);
    }
    if spec.vnoise < 0.0 || spec.anoise < 0.0 {
        anyhow::bail!("group '{}': noise standard deviations must be >= 0.", spec.name);
    }
    if let Some(positions) = &spec.initial.positions {
        if positions.len() != spec.count {
            anyhow::bail!(
                "group '{}': {} initial positions given for {} agents.",
                spec.name,
                positions.len(),
                spec.count
            );
        }
    }
    if let Some(orientations) = &spec.initial.orientations {
        if orientations.len() != spec.count {
            anyhow::bail!(
                "group '{}': {} initial orientations given for {} agents.",
                spec.name,
                orientations.len(),
                spec.count
            );
        }
    }

    match spec.kind {
        AgentKind::Fixed => {
            if !spec.inputs.is_empty() || !spec.outputs.is_empty() {
                anyhow::bail!("group '{}': fixed groups take no inputs or outputs.", spec.name);
            }
            Ok(())
        }
        AgentKind::Ripo => {
            let Some(grid) = &spec.grid else {
                if spec.inputs.is_empty() {
                    return Ok(());
                }
                anyhow::bail!(
                    "group '{}': perception inputs require a zone grid.",
                    spec.name
                );
            };
            grid.validate()
                .map_err(|e| anyhow::anyhow!("group '{}': {}", spec.name, e))?;
            if let Some(rmax) = spec.rmax {
                if rmax <= 0.0 {
                    anyhow::bail!("group '{}': rmax must be positive.", spec.name);
                }
                if grid.radii.last().is_some_and(|&r| r >= rmax) {
                    anyhow::bail!(
                        "group '{}': zone radii must stay below the cutoff radius.",
                        spec.name
                    );
                }
            }
            for input in &spec.inputs {
                if input.normalization != Normalization::None {
                    warn!(
                        "group '{}': normalization mode {:?} is not implemented; \
                         zone values are used unnormalized.",
                        spec.name, input.normalization
                    );
                }
            }
            for output in &spec.outputs {
                match output.action {
                    OutputAction::SpeedModulation => warn!(
                        "group '{}': speed modulation is an extension point; \
                         its contribution is always zero.",
                        spec.name
                    ),
                    OutputAction::Reorientation => {
                        if output.activation != Activation::HsmCentered {
                            warn!(
                                "group '{}': activation {:?} is not implemented for \
                                 reorientation; the turn output stays neutral.",
                                spec.name, output.activation
                            );
                        }
                    }
                }
            }
            Ok(())
        }
    }
}
