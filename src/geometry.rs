use anyhow::Result;
use log::warn;
use rand::prelude::*;
use ripo_common::{angle_to_vec, vec_to_angle, Arena, ArenaConfig, Vec2};
use std::f32::consts::PI;

/// Relative position of one agent as seen by another.
#[derive(Debug, Clone, Copy)]
pub struct RelativeState {
    /// Offset to the other agent, expressed in the observer's own frame
    /// (angle 0 = straight ahead). Zero when not visible.
    pub offset: Vec2,
    /// Heading of the other agent relative to the observer's heading.
    pub heading: f32,
    pub visible: bool,
}

impl RelativeState {
    fn hidden() -> Self {
        Self { offset: Vec2::zero(), heading: 0.0, visible: false }
    }
}

/// Arena shape, size and boundary conditions.
///
/// Periodic boundary conditions are not possible with a circular arena:
/// coherent rules for a single agent exist, but the distance between two
/// agents moving in parallel would not be conserved. Requesting them falls
/// back to reflective with a warning.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub arena: Arena,
    /// Half-extent per axis; `half_extent[0]` is the radius for circular arenas.
    pub half_extent: [f32; 2],
    pub periodic: [bool; 2],
}

impl Geometry {
    pub fn new(arena: Arena, shape: [f32; 2], periodic: [bool; 2]) -> Self {
        let periodic = match arena {
            Arena::Circular => {
                if periodic[0] || periodic[1] {
                    warn!(
                        "Periodic boundary conditions are not possible with a circular arena. \
                         Switching to reflective boundary conditions."
                    );
                }
                [false, false]
            }
            Arena::Rectangular => periodic,
        };
        Self { arena, half_extent: [shape[0] / 2.0, shape[1] / 2.0], periodic }
    }

    pub fn from_config(cfg: &ArenaConfig) -> Result<Self> {
        if cfg.dimension != 2 {
            // 1D and 3D perception binning are unimplemented extension
            // points; they are rejected here rather than degrading silently.
            anyhow::bail!(
                "dimension {} is not supported (only 2D arenas are implemented).",
                cfg.dimension
            );
        }
        let shape = [cfg.shape[0], cfg.shape[1]];
        let periodic = match &cfg.periodic {
            Some(p) if p.len() == 2 => [p[0], p[1]],
            Some(p) => anyhow::bail!("arena.periodic must have 2 entries, got {}.", p.len()),
            // Rectangular arenas default to fully periodic.
            None => [matches!(cfg.kind, Arena::Rectangular); 2],
        };
        Ok(Self::new(cfg.kind, shape, periodic))
    }

    /// Samples `n` initial positions, uniform over the arena.
    ///
    /// Circular arenas use the exact uniform-in-disk transform
    /// `(sqrt(u2)*cos(2*pi*u1), sqrt(u2)*sin(2*pi*u1)) * R`, which is
    /// rejection-free.
    pub fn sample_positions<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<Vec2> {
        match self.arena {
            Arena::Rectangular => (0..n)
                .map(|_| {
                    Vec2::new(
                        (rng.random::<f32>() - 0.5) * 2.0 * self.half_extent[0],
                        (rng.random::<f32>() - 0.5) * 2.0 * self.half_extent[1],
                    )
                })
                .collect(),
            Arena::Circular => (0..n)
                .map(|_| {
                    let u1 = rng.random::<f32>();
                    let u2 = rng.random::<f32>();
                    let r = u2.sqrt() * self.half_extent[0];
                    let theta = 2.0 * PI * u1;
                    Vec2::new(r * theta.cos(), r * theta.sin())
                })
                .collect(),
        }
    }

    /// Samples `n` initial headings, uniform in `[0, 2*pi)`.
    pub fn sample_orientations<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<f32> {
        (0..n).map(|_| 2.0 * PI * rng.random::<f32>()).collect()
    }

    /// Relative position and orientation between two agents.
    ///
    /// On periodic rectangular axes the offset is minimum-image-wrapped, then
    /// rotated into the observer's frame. When `cutoff` is set and the offset
    /// magnitude exceeds it, a not-visible result with a zero offset is
    /// returned.
    pub fn relative_state(
        &self,
        self_pos: Vec2,
        self_heading: f32,
        other_pos: Vec2,
        other_heading: f32,
        cutoff: Option<f32>,
    ) -> RelativeState {
        let mut d = other_pos.sub(self_pos);
        if self.arena == Arena::Rectangular {
            if self.periodic[0] {
                d.x = minimum_image(d.x, self.half_extent[0]);
            }
            if self.periodic[1] {
                d.y = minimum_image(d.y, self.half_extent[1]);
            }
        }

        if let Some(rmax) = cutoff {
            if d.length() > rmax {
                return RelativeState::hidden();
            }
        }

        RelativeState {
            offset: d.rotate(-self_heading),
            heading: other_heading - self_heading,
            visible: true,
        }
    }

    /// Resolves boundary conditions for a move from `prev` to `candidate`.
    ///
    /// Returns the final position, speed and heading. Reflections are
    /// specular and preserve speed; the circular wall uses a single-bounce
    /// chord reflection (step displacements are assumed small relative to the
    /// arena, so multi-bounce steps are not iterated).
    pub fn resolve_boundary(
        &self,
        prev: Vec2,
        candidate: Vec2,
        speed: f32,
        heading: f32,
    ) -> (Vec2, f32, f32) {
        if speed == 0.0 {
            return (candidate, speed, heading);
        }

        match self.arena {
            Arena::Circular => {
                let radius = self.half_extent[0];
                if candidate.length() <= radius {
                    return (candidate, speed, heading);
                }
                // Angle of the chord crossing point on the boundary circle.
                let (sin_a, cos_a) = heading.sin_cos();
                let phi = heading + ((prev.y * cos_a - prev.x * sin_a) / radius).asin();
                let crossing = Vec2::new(radius * phi.cos(), radius * phi.sin());
                let travelled = crossing.sub(prev).length();
                let reflected = PI + 2.0 * phi - heading;
                let remaining = (speed - travelled).max(0.0);
                let pos = crossing.add(angle_to_vec(reflected).scale(remaining));
                (pos, speed, reflected)
            }
            Arena::Rectangular => {
                let mut pos = candidate;
                let mut vel = angle_to_vec(heading).scale(speed);

                // First axis
                let hx = self.half_extent[0];
                if self.periodic[0] {
                    if pos.x > hx {
                        pos.x -= 2.0 * hx;
                    } else if pos.x < -hx {
                        pos.x += 2.0 * hx;
                    }
                } else if pos.x > hx {
                    pos.x = 2.0 * hx - pos.x;
                    vel.x = -vel.x;
                } else if pos.x < -hx {
                    pos.x = -2.0 * hx - pos.x;
                    vel.x = -vel.x;
                }

                // Second axis
                let hy = self.half_extent[1];
                if self.periodic[1] {
                    if pos.y > hy {
                        pos.y -= 2.0 * hy;
                    } else if pos.y < -hy {
                        pos.y += 2.0 * hy;
                    }
                } else if pos.y > hy {
                    pos.y = 2.0 * hy - pos.y;
                    vel.y = -vel.y;
                } else if pos.y < -hy {
                    pos.y = -2.0 * hy - pos.y;
                    vel.y = -vel.y;
                }

                (pos, vel.length(), vec_to_angle(vel))
            }
        }
    }
}

/// Shortest representation of a displacement on a periodic axis.
#[inline(always)]
fn minimum_image(d: f32, half_extent: f32) -> f32 {
    if d.abs() <= half_extent {
        d
    } else if d > 0.0 {
        d - 2.0 * half_extent
    } else {
        d + 2.0 * half_extent
    }
}
