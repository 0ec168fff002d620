//! Turn-by-turn instruction generation.
//!
//! Bearing changes at intermediate nodes are classified into maneuvers with
//! mode-specific thresholds; consecutive straight legs are merged into one
//! step. Output is German.

use serde::{Deserialize, Serialize};

use crate::geo::{signed_bearing_change, Coordinate};
use crate::graph::Graph;
use crate::locale::german_verbs;
use crate::path::SolvedPath;
use crate::routing::TravelMode;

/// Text of the final step.
pub const ARRIVAL_TEXT: &str = "Sie haben Ihr Ziel erreicht";

/// Maneuver implied by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Maneuver {
    Straight,
    SlightLeft,
    SlightRight,
    TurnLeft,
    TurnRight,
    SharpLeft,
    SharpRight,
    UTurn,
    Arrive,
}

impl Maneuver {
    /// Classify a signed bearing change (positive turns right).
    pub fn from_angle(angle: f64, thresholds: &TurnThresholds) -> Self {
        let magnitude = angle.abs();
        let right = angle > 0.0;
        if magnitude < thresholds.straight {
            Maneuver::Straight
        } else if magnitude < thresholds.slight {
            if right {
                Maneuver::SlightRight
            } else {
                Maneuver::SlightLeft
            }
        } else if magnitude < thresholds.turn {
            if right {
                Maneuver::TurnRight
            } else {
                Maneuver::TurnLeft
            }
        } else if magnitude < thresholds.sharp {
            if right {
                Maneuver::SharpRight
            } else {
                Maneuver::SharpLeft
            }
        } else {
            Maneuver::UTurn
        }
    }

    /// Infer the maneuver of provider text from keywords.
    pub fn infer(text: &str, is_last: bool) -> Self {
        let lower = text.to_lowercase();
        let has = |needle: &str| lower.contains(needle);
        let left = has("links") || has("left");
        let right = has("rechts") || has("right");

        if is_last || has("ziel erreicht") || has("arrived") {
            Maneuver::Arrive
        } else if has("wenden") || has("u-turn") {
            Maneuver::UTurn
        } else if has("scharf") || has("sharp") {
            if left {
                Maneuver::SharpLeft
            } else {
                Maneuver::SharpRight
            }
        } else if has("leicht links") || has("keep left") || has("slight left") {
            Maneuver::SlightLeft
        } else if has("leicht rechts") || has("keep right") || has("slight right") {
            Maneuver::SlightRight
        } else if has("links abbiegen") || has("turn left") {
            Maneuver::TurnLeft
        } else if has("rechts abbiegen") || has("turn right") {
            Maneuver::TurnRight
        } else if left && !right {
            Maneuver::TurnLeft
        } else if right && !left {
            Maneuver::TurnRight
        } else {
            Maneuver::Straight
        }
    }

    /// Map a provider maneuver code such as `turn-slight-left`.
    pub fn from_provider_code(code: &str) -> Option<Self> {
        let maneuver = match code {
            "turn-left" => Maneuver::TurnLeft,
            "turn-right" => Maneuver::TurnRight,
            "turn-slight-left" | "keep-left" | "fork-left" | "ramp-left" => Maneuver::SlightLeft,
            "turn-slight-right" | "keep-right" | "fork-right" | "ramp-right" => {
                Maneuver::SlightRight
            }
            "turn-sharp-left" => Maneuver::SharpLeft,
            "turn-sharp-right" => Maneuver::SharpRight,
            "uturn-left" | "uturn-right" => Maneuver::UTurn,
            "straight" | "merge" => Maneuver::Straight,
            _ => return None,
        };
        Some(maneuver)
    }

    /// German phrase opening a step with this maneuver.
    pub fn phrase(self) -> &'static str {
        match self {
            Maneuver::Straight => "Geradeaus",
            Maneuver::SlightLeft => "Leicht links abbiegen",
            Maneuver::SlightRight => "Leicht rechts abbiegen",
            Maneuver::TurnLeft => "Links abbiegen",
            Maneuver::TurnRight => "Rechts abbiegen",
            Maneuver::SharpLeft => "Scharf links abbiegen",
            Maneuver::SharpRight => "Scharf rechts abbiegen",
            Maneuver::UTurn => "Wenden",
            Maneuver::Arrive => ARRIVAL_TEXT,
        }
    }
}

/// Absolute bearing-change limits in degrees separating the maneuver classes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnThresholds {
    pub straight: f64,
    pub slight: f64,
    pub turn: f64,
    pub sharp: f64,
}

impl TurnThresholds {
    pub fn for_mode(mode: TravelMode) -> Self {
        match mode {
            TravelMode::Walking => Self {
                straight: 10.0,
                slight: 30.0,
                turn: 100.0,
                sharp: 170.0,
            },
            TravelMode::Cycling | TravelMode::Driving => Self {
                straight: 15.0,
                slight: 45.0,
                turn: 120.0,
                sharp: 170.0,
            },
        }
    }
}

/// One step of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub text: String,
    pub maneuver: Maneuver,
    /// Length of the step in meters.
    pub distance_m: f64,
}

impl Instruction {
    pub fn new(text: impl Into<String>, maneuver: Maneuver, distance_m: f64) -> Self {
        Self {
            text: text.into(),
            maneuver,
            distance_m,
        }
    }

    pub fn arrival() -> Self {
        Self::new(ARRIVAL_TEXT, Maneuver::Arrive, 0.0)
    }
}

/// Human-readable German distance.
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{} Meter", meters.round() as i64)
    } else {
        format!("{:.1} Kilometer", meters / 1000.0).replace('.', ",")
    }
}

/// Templated single instruction used when no turn information exists.
pub fn generic_instruction(distance_m: f64, mode: TravelMode) -> Instruction {
    let verbs = german_verbs(mode);
    Instruction::new(
        format!("{} {} zum Ziel", verbs.imperative, format_distance(distance_m)),
        Maneuver::Straight,
        distance_m,
    )
}

/// Instruction of a straight-line route.
pub fn synthetic_instruction(distance_m: f64) -> Instruction {
    Instruction::new(
        format!("Geradeaus {}m zum Ziel", distance_m.round() as i64),
        Maneuver::Straight,
        distance_m,
    )
}

struct Step {
    maneuver: Maneuver,
    name: Option<String>,
    distance_m: f64,
}

/// Build instructions for a solved path.
pub fn generate(graph: &Graph, path: &SolvedPath, mode: TravelMode) -> Vec<Instruction> {
    if path.is_trivial() {
        return vec![generic_instruction(path.distance_m, mode)];
    }

    let thresholds = TurnThresholds::for_mode(mode);
    let edges: Vec<_> = path.edges.iter().filter_map(|&id| graph.edge(id)).collect();
    let mut steps: Vec<Step> = Vec::new();

    for (index, edge) in edges.iter().enumerate() {
        let maneuver = match index.checked_sub(1).and_then(|prev| edges.get(prev)) {
            None => Maneuver::Straight,
            Some(previous) => {
                let incoming = tail_bearing(&previous.geometry);
                let outgoing = head_bearing(&edge.geometry);
                match (incoming, outgoing) {
                    (Some(a), Some(b)) => {
                        Maneuver::from_angle(signed_bearing_change(a, b), &thresholds)
                    }
                    _ => Maneuver::Straight,
                }
            }
        };

        match steps.last_mut() {
            Some(step) if maneuver == Maneuver::Straight => {
                step.distance_m += edge.length_m;
                if step.name.is_none() {
                    step.name = edge.name.clone();
                }
            }
            _ => steps.push(Step {
                maneuver,
                name: edge.name.clone(),
                distance_m: edge.length_m,
            }),
        }
    }

    let verb = german_verbs(mode).infinitive;
    let mut instructions: Vec<Instruction> = steps
        .into_iter()
        .enumerate()
        .map(|(index, step)| {
            let distance = format_distance(step.distance_m);
            let text = match (index, step.name.as_deref()) {
                (0, Some(name)) => format!("Auf {name} {distance} geradeaus {verb}"),
                (0, None) => format!("Geradeaus {distance} {verb}"),
                (_, Some(name)) => {
                    format!("{} auf {name} und {distance} {verb}", step.maneuver.phrase())
                }
                (_, None) => format!("{} und {distance} {verb}", step.maneuver.phrase()),
            };
            Instruction::new(text, step.maneuver, step.distance_m)
        })
        .collect();
    instructions.push(Instruction::arrival());
    instructions
}

fn head_bearing(geometry: &[Coordinate]) -> Option<f64> {
    let first = geometry.first()?;
    let next = geometry.iter().find(|point| *point != first)?;
    Some(first.bearing_to(next))
}

fn tail_bearing(geometry: &[Coordinate]) -> Option<f64> {
    let last = geometry.last()?;
    let previous = geometry.iter().rev().find(|point| *point != last)?;
    Some(previous.bearing_to(last))
}
