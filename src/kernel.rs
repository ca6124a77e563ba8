use crate::agents::AgentParams;
use crate::geometry::Geometry;
use crate::group::{GroupRow, GroupTable};
use rand::prelude::*;
use rand_distr::StandardNormal;
use ripo_common::{angle_to_vec, wrap_angle, Activation, AgentKind, OutputAction, Perception, Vec2};
use std::f32::consts::PI;

/// Read-only inputs shared by every logical thread of one step.
pub struct StepContext<'a> {
    pub geometry: &'a Geometry,
    pub groups: &'a GroupTable,
    pub kinds: &'a [AgentKind],
    pub group_ids: &'a [u16],
    pub params: &'a [AgentParams],
    pub seed: u64,
    pub step: u32,
}

/// The previous-step state buffers, immutable for the whole step.
pub struct StateView<'a> {
    pub pos_x: &'a [f32],
    pub pos_y: &'a [f32],
    pub vel_v: &'a [f32],
    pub vel_a: &'a [f32],
}

/// Per-thread scratch buffers, sized once at setup from the global maxima
/// over all configured groups so no logical thread ever reallocates.
#[derive(Debug, Clone)]
pub struct Scratch {
    /// Zone values, one block per input (perceived-group x zone, angular fastest).
    values: Vec<f32>,
    /// Complex accumulators for orientation inputs.
    acc_re: Vec<f32>,
    acc_im: Vec<f32>,
    /// Weighted sum per output.
    sums: Vec<f32>,
}

impl Scratch {
    pub fn for_table(table: &GroupTable) -> Self {
        let mut max_values = 1;
        let mut max_outputs = 1;
        for gid in 0..table.len() {
            if table.kind(gid) != AgentKind::Ripo {
                continue;
            }
            let row = GroupRow::new(table.row(gid));
            let n_out = row.output_count().max(1);
            let total: usize = row
                .inputs()
                .flatten()
                .map(|input| input.weights.len() / n_out)
                .sum();
            max_values = max_values.max(total);
            max_outputs = max_outputs.max(row.output_count());
        }
        Self {
            values: vec![0.0; max_values],
            acc_re: vec![0.0; max_values],
            acc_im: vec![0.0; max_values],
            sums: vec![0.0; max_outputs],
        }
    }
}

/// Radial zone lookup: first boundary strictly exceeding the distance wins;
/// the last band catches everything further out.
#[inline(always)]
pub fn radial_zone(dist: f32, radii: &[f32], radial_count: usize) -> usize {
    radii
        .iter()
        .position(|&r| dist < r)
        .unwrap_or(radial_count - 1)
}

/// Angular zone lookup from an observer-frame offset.
#[inline(always)]
pub fn angular_zone(offset: Vec2, slices: usize) -> usize {
    let phase = wrap_angle(offset.y.atan2(offset.x));
    (((phase / (2.0 * PI)) * slices as f32) as usize).min(slices - 1)
}

/// Bounded odd sigmoid used by the reorientation activation.
/// Strictly inside (-1, 1) for finite inputs, 0 at 0, monotonic.
#[inline(always)]
pub fn hsm_centered(s: f32) -> f32 {
    4.0 / PI * (s / 2.0).exp().atan() - 1.0
}

/// Perception scan for agent `i`: iterates all other agents, bins the
/// visible ones into each configured input's (perceived-group, zone)
/// histogram, and extracts orientation phases. Returns the total number of
/// zone values written into `scratch.values`.
fn accumulate_perception(
    i: usize,
    ctx: &StepContext<'_>,
    prev: &StateView<'_>,
    grp: &GroupRow<'_>,
    scratch: &mut Scratch,
) -> usize {
    let n_out = grp.output_count().max(1);
    let n_z = grp.zone_count();
    let n_sa = grp.slice_count();
    let radii = grp.radii();
    let n_r = grp.radial_count();
    let cutoff = grp.cutoff();

    let total: usize = grp
        .inputs()
        .flatten()
        .map(|input| input.weights.len() / n_out)
        .sum();
    scratch.values[..total].fill(0.0);
    scratch.acc_re[..total].fill(0.0);
    scratch.acc_im[..total].fill(0.0);
    if total == 0 || n_z == 0 {
        return total;
    }

    let self_pos = Vec2::new(prev.pos_x[i], prev.pos_y[i]);
    let self_heading = prev.vel_a[i];

    for j in 0..prev.pos_x.len() {
        if j == i {
            continue;
        }
        let rel = ctx.geometry.relative_state(
            self_pos,
            self_heading,
            Vec2::new(prev.pos_x[j], prev.pos_y[j]),
            prev.vel_a[j],
            cutoff,
        );
        if !rel.visible {
            continue;
        }

        let zone = radial_zone(rel.offset.length(), radii, n_r) * n_sa
            + angular_zone(rel.offset, n_sa);
        let perceived_group = ctx.group_ids[j] as usize;

        let mut offset = 0;
        for input in grp.inputs().flatten() {
            let span = input.weights.len() / n_out;
            // Agents from groups beyond this input's coefficient span have
            // no weight slot and are ignored.
            if perceived_group < span / n_z {
                let idx = offset + perceived_group * n_z + zone;
                match input.perception {
                    Perception::Presence => scratch.values[idx] += 1.0,
                    Perception::Orientation => {
                        scratch.acc_re[idx] += rel.heading.cos();
                        scratch.acc_im[idx] += rel.heading.sin();
                    }
                }
            }
            offset += span;
        }
    }

    // Phase extraction for orientation inputs. Empty zones stay at 0.
    let mut offset = 0;
    for input in grp.inputs().flatten() {
        let span = input.weights.len() / n_out;
        if input.perception == Perception::Orientation {
            for k in offset..offset + span {
                if scratch.acc_re[k] != 0.0 || scratch.acc_im[k] != 0.0 {
                    scratch.values[k] = scratch.acc_im[k].atan2(scratch.acc_re[k]);
                }
            }
        }
        offset += span;
    }

    total
}

/// One logical thread of the step kernel: updates agent `i` from the
/// previous-step buffers into its own disjoint output slot.
#[allow(clippy::too_many_arguments)]
pub fn update_agent(
    i: usize,
    ctx: &StepContext<'_>,
    prev: &StateView<'_>,
    scratch: &mut Scratch,
    out_x: &mut f32,
    out_y: &mut f32,
    out_v: &mut f32,
    out_a: &mut f32,
) {
    // Fixed points copy straight through.
    if ctx.kinds[i] == AgentKind::Fixed {
        *out_x = prev.pos_x[i];
        *out_y = prev.pos_y[i];
        *out_v = prev.vel_v[i];
        *out_a = prev.vel_a[i];
        return;
    }

    let params = ctx.params[i];
    let grp = GroupRow::new(ctx.groups.row(ctx.group_ids[i] as usize));
    let n_out = grp.output_count();

    let mut d_a = 0.0f32;
    let d_v = 0.0f32; // speed modulation: extension point, always neutral

    if n_out > 0 && grp.input_count() > 0 {
        accumulate_perception(i, ctx, prev, &grp, scratch);

        // Weighted sum per output. Only the "none" normalization mode is
        // functional; the other modes were flagged at setup and use the raw
        // zone values here.
        scratch.sums[..n_out].fill(0.0);
        let mut offset = 0;
        for input in grp.inputs().flatten() {
            let span = input.weights.len() / n_out;
            for (o, sum) in scratch.sums[..n_out].iter_mut().enumerate() {
                let weights = &input.weights[o * span..(o + 1) * span];
                for (value, weight) in scratch.values[offset..offset + span].iter().zip(weights) {
                    *sum += value * weight;
                }
            }
            offset += span;
        }

        // Activation. Unimplemented variants stay neutral; they were flagged
        // at setup so a zero here is attributable.
        for (o, output) in grp.outputs().enumerate() {
            match output.action {
                Some(OutputAction::Reorientation) => {
                    if output.activation == Some(Activation::HsmCentered) {
                        d_a = params.damax * hsm_centered(scratch.sums[o]);
                    }
                }
                Some(OutputAction::SpeedModulation) | None => {}
            }
        }
    }

    // Integration
    let mut heading = prev.vel_a[i] + d_a;
    let mut speed = prev.vel_v[i] + d_v;

    let thread_seed = ctx
        .seed
        .wrapping_add((i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add((ctx.step as u64).wrapping_mul(0xD1B5_4A32_D192_ED03));
    let mut rng = StdRng::seed_from_u64(thread_seed);

    if params.anoise > 0.0 {
        let draw: f32 = rng.sample(StandardNormal);
        heading += params.anoise * draw;
    }
    if params.vnoise > 0.0 {
        let draw: f32 = rng.sample(StandardNormal);
        speed = (speed + params.vnoise * draw).clamp(params.vmin, params.vmax);
    }

    let pos = Vec2::new(prev.pos_x[i], prev.pos_y[i]);
    let candidate = pos.add(angle_to_vec(heading).scale(speed));
    let (final_pos, final_speed, final_heading) =
        ctx.geometry.resolve_boundary(pos, candidate, speed, heading);

    *out_x = final_pos.x;
    *out_y = final_pos.y;
    *out_v = final_speed;
    *out_a = final_heading;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{GroupSpec, GroupTable, InitialCondition, InputSpec, OutputSpec, PolarGrid};
    use ripo_common::{Arena, Normalization};

    fn presence_table(weights: Vec<f32>, slices: u32) -> GroupTable {
        let mut table = GroupTable::new();
        table.push(&GroupSpec {
            name: "agents".into(),
            kind: AgentKind::Ripo,
            count: 1,
            grid: Some(PolarGrid { radii: vec![], slices }),
            rmax: None,
            inputs: vec![InputSpec {
                perception: Perception::Presence,
                normalization: Normalization::None,
                weights,
            }],
            outputs: vec![OutputSpec {
                action: OutputAction::Reorientation,
                activation: Activation::HsmCentered,
            }],
            vmin: 0.0,
            vmax: 0.01,
            damax: PI / 2.0,
            vnoise: 0.0,
            anoise: 0.0,
            initial: InitialCondition::default(),
        });
        table
    }

    fn context<'a>(
        geometry: &'a Geometry,
        table: &'a GroupTable,
        kinds: &'a [AgentKind],
        group_ids: &'a [u16],
        params: &'a [AgentParams],
    ) -> StepContext<'a> {
        StepContext { geometry, groups: table, kinds, group_ids, params, seed: 0, step: 0 }
    }

    #[test]
    fn radial_zone_scans_ascending_boundaries() {
        let radii = [0.1, 0.3];
        assert_eq!(radial_zone(0.05, &radii, 3), 0);
        assert_eq!(radial_zone(0.2, &radii, 3), 1);
        assert_eq!(radial_zone(0.9, &radii, 3), 2); // open-ended last band
        assert_eq!(radial_zone(0.5, &[], 1), 0);
    }

    #[test]
    fn angular_zone_quadrants() {
        assert_eq!(angular_zone(Vec2::new(1.0, 0.1), 4), 0);
        assert_eq!(angular_zone(Vec2::new(-0.1, 1.0), 4), 1);
        assert_eq!(angular_zone(Vec2::new(-1.0, -0.1), 4), 2);
        assert_eq!(angular_zone(Vec2::new(0.1, -1.0), 4), 3);
    }

    #[test]
    fn hsm_centered_is_bounded_odd_and_zero_at_zero() {
        assert!(hsm_centered(0.0).abs() < 1e-6);
        for s in [-50.0f32, -3.0, -0.5, 0.5, 3.0, 50.0] {
            let t = hsm_centered(s);
            assert!(t > -1.0 && t < 1.0, "activation {} out of (-1, 1) for {}", t, s);
            // odd symmetry
            assert!((hsm_centered(s) + hsm_centered(-s)).abs() < 1e-5);
        }
        // monotonic on a sample
        assert!(hsm_centered(1.0) > hsm_centered(0.5));
    }

    #[test]
    fn presence_histogram_sums_to_neighbors() {
        // 5 agents, one group, no cutoff: every agent sees the 4 others once.
        let geometry = Geometry::new(Arena::Rectangular, [1.0, 1.0], [true, true]);
        let table = presence_table(vec![0.0; 4], 4);
        let n = 5;
        let kinds = vec![AgentKind::Ripo; n];
        let group_ids = vec![0u16; n];
        let params = vec![
            AgentParams { vmin: 0.0, vmax: 0.01, damax: 1.0, vnoise: 0.0, anoise: 0.0 };
            n
        ];
        let pos_x = [0.0, 0.1, -0.2, 0.45, -0.45];
        let pos_y = [0.0, -0.1, 0.3, 0.45, -0.45];
        let vel_v = [0.0; 5];
        let vel_a = [0.0, 1.0, 2.0, 3.0, 4.0];
        let prev = StateView { pos_x: &pos_x, pos_y: &pos_y, vel_v: &vel_v, vel_a: &vel_a };
        let ctx = context(&geometry, &table, &kinds, &group_ids, &params);

        let mut scratch = Scratch::for_table(&table);
        for i in 0..n {
            let grp = GroupRow::new(table.row(0));
            let total = accumulate_perception(i, &ctx, &prev, &grp, &mut scratch);
            assert_eq!(total, 4);
            let sum: f32 = scratch.values[..total].iter().sum();
            assert!((sum - (n as f32 - 1.0)).abs() < 1e-6);
        }
    }

    #[test]
    fn cutoff_limits_the_histogram() {
        let geometry = Geometry::new(Arena::Rectangular, [1.0, 1.0], [false, false]);
        let mut table = presence_table(vec![0.0; 4], 4);
        // Rebuild with a cutoff that hides the far agent.
        let spec = GroupSpec {
            name: "agents".into(),
            kind: AgentKind::Ripo,
            count: 1,
            grid: Some(PolarGrid { radii: vec![], slices: 4 }),
            rmax: Some(0.2),
            inputs: vec![InputSpec {
                perception: Perception::Presence,
                normalization: Normalization::None,
                weights: vec![0.0; 4],
            }],
            outputs: vec![OutputSpec {
                action: OutputAction::Reorientation,
                activation: Activation::HsmCentered,
            }],
            vmin: 0.0,
            vmax: 0.01,
            damax: 1.0,
            vnoise: 0.0,
            anoise: 0.0,
            initial: InitialCondition::default(),
        };
        table.replace(0, &spec);

        let kinds = vec![AgentKind::Ripo; 3];
        let group_ids = vec![0u16; 3];
        let params = vec![
            AgentParams { vmin: 0.0, vmax: 0.01, damax: 1.0, vnoise: 0.0, anoise: 0.0 };
            3
        ];
        let pos_x = [0.0, 0.1, 0.45];
        let pos_y = [0.0; 3];
        let vel_v = [0.0; 3];
        let vel_a = [0.0; 3];
        let prev = StateView { pos_x: &pos_x, pos_y: &pos_y, vel_v: &vel_v, vel_a: &vel_a };
        let ctx = context(&geometry, &table, &kinds, &group_ids, &params);

        let mut scratch = Scratch::for_table(&table);
        let grp = GroupRow::new(table.row(0));
        let total = accumulate_perception(0, &ctx, &prev, &grp, &mut scratch);
        let sum: f32 = scratch.values[..total].iter().sum();
        assert!((sum - 1.0).abs() < 1e-6); // only the near neighbor counted
    }

    #[test]
    fn orientation_input_extracts_relative_phase() {
        let geometry = Geometry::new(Arena::Rectangular, [1.0, 1.0], [false, false]);
        let mut table = GroupTable::new();
        table.push(&GroupSpec {
            name: "agents".into(),
            kind: AgentKind::Ripo,
            count: 1,
            grid: Some(PolarGrid { radii: vec![], slices: 1 }),
            rmax: None,
            inputs: vec![InputSpec {
                perception: Perception::Orientation,
                normalization: Normalization::None,
                weights: vec![0.0; 1],
            }],
            outputs: vec![OutputSpec {
                action: OutputAction::Reorientation,
                activation: Activation::HsmCentered,
            }],
            vmin: 0.0,
            vmax: 0.01,
            damax: 1.0,
            vnoise: 0.0,
            anoise: 0.0,
            initial: InitialCondition::default(),
        });

        let kinds = vec![AgentKind::Ripo; 2];
        let group_ids = vec![0u16; 2];
        let params = vec![
            AgentParams { vmin: 0.0, vmax: 0.01, damax: 1.0, vnoise: 0.0, anoise: 0.0 };
            2
        ];
        let pos_x = [0.0, 0.2];
        let pos_y = [0.0; 2];
        let vel_v = [0.0; 2];
        let vel_a = [0.25, 1.0]; // neighbor's relative heading: 0.75
        let prev = StateView { pos_x: &pos_x, pos_y: &pos_y, vel_v: &vel_v, vel_a: &vel_a };
        let ctx = context(&geometry, &table, &kinds, &group_ids, &params);

        let mut scratch = Scratch::for_table(&table);
        let grp = GroupRow::new(table.row(0));
        let total = accumulate_perception(0, &ctx, &prev, &grp, &mut scratch);
        assert_eq!(total, 1);
        assert!((scratch.values[0] - 0.75).abs() < 1e-5);
    }

    #[test]
    fn fixed_agents_copy_through() {
        let geometry = Geometry::new(Arena::Rectangular, [1.0, 1.0], [false, false]);
        let table = presence_table(vec![0.0; 4], 4);
        let kinds = [AgentKind::Fixed];
        let group_ids = [0u16];
        let params =
            [AgentParams { vmin: 0.0, vmax: 0.0, damax: 0.0, vnoise: 0.0, anoise: 0.0 }];
        let pos_x = [0.3];
        let pos_y = [-0.2];
        let vel_v = [0.5];
        let vel_a = [1.2];
        let prev = StateView { pos_x: &pos_x, pos_y: &pos_y, vel_v: &vel_v, vel_a: &vel_a };
        let ctx = context(&geometry, &table, &kinds, &group_ids, &params);

        let mut scratch = Scratch::for_table(&table);
        let (mut x, mut y, mut v, mut a) = (0.0, 0.0, 0.0, 0.0);
        update_agent(0, &ctx, &prev, &mut scratch, &mut x, &mut y, &mut v, &mut a);
        assert_eq!((x, y, v, a), (0.3, -0.2, 0.5, 1.2));
    }

    #[test]
    fn turn_is_bounded_by_damax() {
        // One agent with a huge positive weight on every zone: the weighted
        // sum saturates the activation but the turn stays below damax.
        let geometry = Geometry::new(Arena::Rectangular, [1.0, 1.0], [true, true]);
        let table = presence_table(vec![30.0, 30.0, 30.0, 30.0], 4);
        let kinds = vec![AgentKind::Ripo; 2];
        let group_ids = vec![0u16; 2];
        let damax = PI / 2.0;
        let params = vec![
            AgentParams { vmin: 0.0, vmax: 0.01, damax, vnoise: 0.0, anoise: 0.0 };
            2
        ];
        let pos_x = [0.0, 0.05];
        let pos_y = [0.0, 0.05];
        let vel_v = [0.01; 2];
        let vel_a = [0.0; 2];
        let prev = StateView { pos_x: &pos_x, pos_y: &pos_y, vel_v: &vel_v, vel_a: &vel_a };
        let ctx = context(&geometry, &table, &kinds, &group_ids, &params);

        let mut scratch = Scratch::for_table(&table);
        let (mut x, mut y, mut v, mut a) = (0.0, 0.0, 0.0, 0.0);
        update_agent(0, &ctx, &prev, &mut scratch, &mut x, &mut y, &mut v, &mut a);
        assert!((a - prev.vel_a[0]).abs() < damax);
        assert!((v - 0.01).abs() < 1e-6);
    }
}
