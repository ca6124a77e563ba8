use crate::group::OutputSpec;
use anyhow::Result;
use ripo_common::OutputAction;

/// Translates raw coefficients into the signed weight layout the kernel
/// consumes.
///
/// Raw coefficients index linearly as `output * zones_per_output + zone`,
/// where the per-output span covers every perceived group and zone (angular
/// index fastest). Each output action applies its own sign rule over the
/// angular sweep:
///
/// - Reorientation: the trailing half of the angular sweep pushes the other
///   way, so a symmetric coefficient magnitude yields a turn.
/// - Speed modulation: the same rule shifted by a quarter cycle, so lateral
///   and frontal zones push in opposite directions.
///
/// This is a pure function of the group configuration; it runs once per
/// coefficient assignment, never inside the step kernel.
pub fn translate(
    raw: &[f32],
    outputs: &[OutputSpec],
    zones_per_output: usize,
    slices: u32,
) -> Result<Vec<f32>> {
    if outputs.is_empty() {
        anyhow::bail!("coefficients assigned to a group with no outputs.");
    }
    if zones_per_output == 0 || raw.len() != outputs.len() * zones_per_output {
        anyhow::bail!(
            "coefficient vector has length {}, expected {} (outputs) x {} (zones per output).",
            raw.len(),
            outputs.len(),
            zones_per_output
        );
    }

    let n_sa = slices as f32;
    let mut weights = Vec::with_capacity(raw.len());
    for (o, output) in outputs.iter().enumerate() {
        for j in 0..zones_per_output {
            let c = raw[o * zones_per_output + j];
            let keep = match output.action {
                OutputAction::Reorientation => (j as f32) % n_sa < n_sa / 2.0,
                OutputAction::SpeedModulation => (j as f32 + n_sa / 4.0) % n_sa < n_sa / 2.0,
            };
            weights.push(if keep { c } else { -c });
        }
    }
    Ok(weights)
}
