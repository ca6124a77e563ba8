use crate::agents::{AgentParams, Agents};
use crate::coefficients;
use crate::geometry::Geometry;
use crate::group::{
    validate_spec, GroupSpec, GroupTable, InitialCondition, InputSpec, OutputSpec, PolarGrid,
};
use crate::simulation::Simulation;
use anyhow::Result;
use log::info;
use rand::prelude::*;
use ripo_common::{AgentKind, GroupConfig, SimulationConfig, Vec2};

/// Setup-phase builder for a [`Simulation`].
///
/// Groups are registered one at a time; each registration serializes the
/// group into the parameter table and places its agents. Coefficients can be
/// (re-)assigned at any point before `build`, typically after all groups
/// exist so the assignment can cover every perceived group.
pub struct Engine {
    geometry: Geometry,
    table: GroupTable,
    specs: Vec<GroupSpec>,
    agents: Agents,
    seed: u64,
    /// Host-side RNG for initial placement; per-step draws use their own
    /// per-agent streams.
    rng: StdRng,
}

impl Engine {
    pub fn new(geometry: Geometry, seed: u64) -> Self {
        Self {
            geometry,
            table: GroupTable::new(),
            specs: Vec::new(),
            agents: Agents::new(),
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Registers a group: validates it, serializes its parameter row, and
    /// places its agents. Returns the new group id.
    ///
    /// Inputs registered without weights get an all-zero vector sized for
    /// every group registered so far (this one included); assigning
    /// coefficients for a wider span later grows the table, never shrinks it.
    pub fn add_group(&mut self, mut spec: GroupSpec) -> Result<usize> {
        validate_spec(&spec)?;
        if self.table.index_of(&spec.name).is_some() {
            anyhow::bail!("a group named '{}' is already registered.", spec.name);
        }
        if self.specs.len() >= u16::MAX as usize {
            anyhow::bail!("group id space exhausted ({} groups).", u16::MAX);
        }

        if let Some(grid) = spec.grid.as_ref() {
            let span = spec.outputs.len() * grid.zone_count() * (self.specs.len() + 1);
            for input in &mut spec.inputs {
                if input.weights.is_empty() {
                    input.weights = vec![0.0; span];
                }
            }
        }

        let positions = match &spec.initial.positions {
            Some(explicit) => explicit.clone(),
            None => self.geometry.sample_positions(spec.count, &mut self.rng),
        };
        let orientations = match &spec.initial.orientations {
            Some(explicit) => explicit.clone(),
            None => self.geometry.sample_orientations(spec.count, &mut self.rng),
        };
        let speed = match spec.kind {
            AgentKind::Fixed => 0.0,
            AgentKind::Ripo => spec.initial.speed.unwrap_or(spec.vmax),
        };
        let params = AgentParams {
            vmin: spec.vmin,
            vmax: spec.vmax,
            damax: spec.damax,
            vnoise: spec.vnoise,
            anoise: spec.anoise,
        };

        let gid = self.table.push(&spec);
        self.agents.push_group(
            spec.kind,
            gid as u16,
            params,
            &positions,
            &vec![speed; spec.count],
            &orientations,
        );
        info!(
            "Registered group '{}' (id {}, {:?}, {} agents).",
            spec.name, gid, spec.kind, spec.count
        );
        self.specs.push(spec);
        Ok(gid)
    }

    /// Assigns raw coefficients to one input of a group.
    ///
    /// The raw vector indexes as `output x perceived-group x zone` and is
    /// translated into signed kernel weights before the group's parameter
    /// row is re-serialized. Its length fixes how many perceived groups the
    /// input covers; agents from groups beyond that span are ignored by it.
    pub fn set_coefficients(&mut self, gid: usize, input_idx: usize, raw: &[f32]) -> Result<()> {
        let spec = self
            .specs
            .get(gid)
            .ok_or_else(|| anyhow::anyhow!("no group with id {}.", gid))?;
        let (zones_per_output, slices) = checked_input_span(spec, input_idx, raw.len())?;
        let weights = coefficients::translate(raw, &spec.outputs, zones_per_output, slices)?;
        let spec = &mut self.specs[gid];
        spec.inputs[input_idx].weights = weights;
        self.table.replace(gid, spec);
        Ok(())
    }

    /// Assigns pre-signed kernel weights directly, bypassing the sign-rule
    /// translation. The vector must have the same
    /// `outputs x (whole groups) x zones` shape as a raw coefficient vector.
    pub fn set_weights(&mut self, gid: usize, input_idx: usize, weights: Vec<f32>) -> Result<()> {
        let spec = self
            .specs
            .get(gid)
            .ok_or_else(|| anyhow::anyhow!("no group with id {}.", gid))?;
        checked_input_span(spec, input_idx, weights.len())?;
        let spec = &mut self.specs[gid];
        spec.inputs[input_idx].weights = weights;
        self.table.replace(gid, spec);
        Ok(())
    }

    /// Builds an engine from a parsed configuration: all groups are
    /// registered first, then coefficients are resolved, so a group's
    /// coefficients may cover groups declared after it.
    pub fn from_config(cfg: &SimulationConfig) -> Result<Self> {
        let geometry = Geometry::from_config(&cfg.arena)?;
        let mut engine = Self::new(geometry, cfg.run.seed);
        for group in &cfg.groups {
            engine.add_group(spec_from_config(group))?;
        }
        for (gid, group) in cfg.groups.iter().enumerate() {
            for (input_idx, input) in group.inputs.iter().enumerate() {
                if let Some(raw) = &input.coefficients {
                    engine.set_coefficients(gid, input_idx, raw)?;
                }
            }
        }
        Ok(engine)
    }

    pub fn group_count(&self) -> usize {
        self.specs.len()
    }

    pub fn group_id(&self, name: &str) -> Option<usize> {
        self.table.index_of(name)
    }

    /// Finalizes setup and hands the state over to the step loop.
    pub fn build(self) -> Result<Simulation> {
        if self.table.is_empty() {
            anyhow::bail!("cannot build a simulation with no groups.");
        }
        Simulation::new(self.geometry, self.table, self.agents, self.seed)
    }
}

/// Checks that a coefficient or weight vector for one input splits into
/// `outputs x (whole groups) x zones`. Returns the per-output span and the
/// grid's angular slice count.
fn checked_input_span(spec: &GroupSpec, input_idx: usize, len: usize) -> Result<(usize, u32)> {
    let grid = spec.grid.as_ref().ok_or_else(|| {
        anyhow::anyhow!("group '{}' has no zone grid to assign coefficients over.", spec.name)
    })?;
    if input_idx >= spec.inputs.len() {
        anyhow::bail!(
            "group '{}' has {} inputs, no input {}.",
            spec.name,
            spec.inputs.len(),
            input_idx
        );
    }

    let n_out = spec.outputs.len().max(1);
    let zones_per_output = len / n_out;
    if zones_per_output * n_out != len
        || zones_per_output == 0
        || zones_per_output % grid.zone_count() != 0
    {
        anyhow::bail!(
            "group '{}': vector of length {} does not split into \
             {} outputs x (a whole number of groups) x {} zones.",
            spec.name,
            len,
            n_out,
            grid.zone_count()
        );
    }
    Ok((zones_per_output, grid.slices))
}

fn spec_from_config(group: &GroupConfig) -> GroupSpec {
    GroupSpec {
        name: group.name.clone(),
        kind: group.kind,
        count: group.count as usize,
        grid: group
            .grid
            .as_ref()
            .map(|g| PolarGrid { radii: g.radii.clone(), slices: g.slices }),
        rmax: group.rmax,
        inputs: group
            .inputs
            .iter()
            .map(|input| InputSpec {
                perception: input.perception,
                normalization: input.normalization,
                weights: Vec::new(), // sized at registration, filled by set_coefficients
            })
            .collect(),
        outputs: group
            .outputs
            .iter()
            .map(|output| OutputSpec { action: output.action, activation: output.activation })
            .collect(),
        vmin: group.vmin,
        vmax: group.vmax,
        damax: group.damax,
        vnoise: group.vnoise,
        anoise: group.anoise,
        initial: InitialCondition {
            positions: group
                .position
                .as_ref()
                .map(|ps| ps.iter().map(|&[x, y]| Vec2::new(x, y)).collect()),
            orientations: group.orientation.clone(),
            speed: group.speed,
        },
    }
}
