use serde::{Deserialize, Serialize};

/// Arena geometries.
///
/// The numeric codes double as the values written into the serialized
/// parameter tables, so they must stay stable.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Arena {
    Circular,
    Rectangular,
}

/// Agent types.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Fixed points: position is copied through unchanged every step.
    Fixed,
    /// Mobile agents driven by radially/angularly binned perception.
    Ripo,
}

/// Per-neighbor quantity aggregated into each perception zone.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Perception {
    /// Presence (count agents per zone).
    Presence,
    /// Average relative orientation per zone (phase of a complex sum).
    Orientation,
}

impl Perception {
    pub fn code(self) -> f32 {
        match self {
            Perception::Presence => 0.0,
            Perception::Orientation => 1.0,
        }
    }

    pub fn from_code(code: f32) -> Option<Self> {
        match code as i32 {
            0 => Some(Perception::Presence),
            1 => Some(Perception::Orientation),
            _ => None,
        }
    }
}

/// Grouping used to scale a zone's raw aggregate before the weighted sum.
///
/// Only `None` is functional; the other modes are accepted in configuration
/// and currently defer to `None` (surfaced as a warning at setup time).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    None,
    SameRadius,
    SameSlice,
    SameGroup,
    All,
}

impl Normalization {
    pub fn code(self) -> f32 {
        match self {
            Normalization::None => 0.0,
            Normalization::SameRadius => 1.0,
            Normalization::SameSlice => 2.0,
            Normalization::SameGroup => 3.0,
            Normalization::All => 4.0,
        }
    }

    pub fn from_code(code: f32) -> Option<Self> {
        match code as i32 {
            0 => Some(Normalization::None),
            1 => Some(Normalization::SameRadius),
            2 => Some(Normalization::SameSlice),
            3 => Some(Normalization::SameGroup),
            4 => Some(Normalization::All),
            _ => None,
        }
    }
}

/// Control quantity an output drives.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputAction {
    /// Speed modulation (extension point: currently always zero).
    SpeedModulation,
    /// Reorientation in the transverse plane.
    Reorientation,
}

impl OutputAction {
    pub fn code(self) -> f32 {
        match self {
            OutputAction::SpeedModulation => 0.0,
            OutputAction::Reorientation => 1.0,
        }
    }

    pub fn from_code(code: f32) -> Option<Self> {
        match code as i32 {
            0 => Some(OutputAction::SpeedModulation),
            1 => Some(OutputAction::Reorientation),
            _ => None,
        }
    }
}

/// Function mapping a weighted perceptual sum to a bounded control output.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Identity,
    /// Half-sigmoid with output in [0, 1] (extension point: neutral).
    HsmPositive,
    /// Half-sigmoid with output in [-1, 1]; the only functional activation
    /// for reorientation outputs.
    HsmCentered,
}

impl Activation {
    pub fn code(self) -> f32 {
        match self {
            Activation::Identity => 0.0,
            Activation::HsmPositive => 1.0,
            Activation::HsmCentered => 2.0,
        }
    }

    pub fn from_code(code: f32) -> Option<Self> {
        match code as i32 {
            0 => Some(Activation::Identity),
            1 => Some(Activation::HsmPositive),
            2 => Some(Activation::HsmCentered),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for p in [Perception::Presence, Perception::Orientation] {
            assert_eq!(Perception::from_code(p.code()), Some(p));
        }
        for n in [
            Normalization::None,
            Normalization::SameRadius,
            Normalization::SameSlice,
            Normalization::SameGroup,
            Normalization::All,
        ] {
            assert_eq!(Normalization::from_code(n.code()), Some(n));
        }
        for a in [OutputAction::SpeedModulation, OutputAction::Reorientation] {
            assert_eq!(OutputAction::from_code(a.code()), Some(a));
        }
        for a in [Activation::Identity, Activation::HsmPositive, Activation::HsmCentered] {
            assert_eq!(Activation::from_code(a.code()), Some(a));
        }
    }

    #[test]
    fn unknown_codes_are_rejected() {
        assert_eq!(Perception::from_code(42.0), None);
        assert_eq!(OutputAction::from_code(-1.0), None);
        assert_eq!(Activation::from_code(7.0), None);
    }
}
