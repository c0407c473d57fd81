// src/scoring/scale.rs

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// One anchor of the raw-fraction -> scaled-score curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScaleAnchor {
    /// Fraction of the section answered correctly, in [0, 1].
    pub fraction: f64,
    /// Scaled score at that fraction.
    pub scaled: i32,
}

/// Monotonic mapping from a section's raw fraction to its scaled score.
///
/// The production mapping is an official scoring table, not a formula,
/// so the curve is data: a set of ascending anchors interpolated
/// linearly and rounded to the nearest 10. A replacement table can be
/// loaded from JSON at startup.
#[derive(Debug, Clone)]
pub struct ScaleTable {
    anchors: Vec<ScaleAnchor>,
}

#[derive(Debug)]
pub enum ScaleTableError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(&'static str),
}

impl fmt::Display for ScaleTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleTableError::Io(e) => write!(f, "failed to read scale table: {}", e),
            ScaleTableError::Parse(e) => write!(f, "failed to parse scale table: {}", e),
            ScaleTableError::Invalid(msg) => write!(f, "invalid scale table: {}", msg),
        }
    }
}

impl std::error::Error for ScaleTableError {}

impl ScaleTable {
    /// Anchors must span [0, 1] with strictly ascending fractions and
    /// non-decreasing scaled scores.
    pub fn new(anchors: Vec<ScaleAnchor>) -> Result<Self, ScaleTableError> {
        if anchors.len() < 2 {
            return Err(ScaleTableError::Invalid("need at least two anchors"));
        }
        if anchors.first().map(|a| a.fraction) != Some(0.0)
            || anchors.last().map(|a| a.fraction) != Some(1.0)
        {
            return Err(ScaleTableError::Invalid("anchors must span 0.0 to 1.0"));
        }
        for pair in anchors.windows(2) {
            if pair[1].fraction <= pair[0].fraction {
                return Err(ScaleTableError::Invalid("fractions must ascend"));
            }
            if pair[1].scaled < pair[0].scaled {
                return Err(ScaleTableError::Invalid("scaled scores must not descend"));
            }
        }
        Ok(Self { anchors })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ScaleTableError> {
        let raw = std::fs::read_to_string(path).map_err(ScaleTableError::Io)?;
        let anchors: Vec<ScaleAnchor> =
            serde_json::from_str(&raw).map_err(ScaleTableError::Parse)?;
        Self::new(anchors)
    }

    /// Scaled score for `raw` correct out of `total`. An empty section
    /// scores the floor of the scale.
    pub fn scaled(&self, raw: i32, total: i32) -> i32 {
        let floor = self.anchors[0].scaled;
        if total <= 0 {
            return floor;
        }
        let fraction = (raw.max(0) as f64 / total as f64).clamp(0.0, 1.0);

        let mut value = self.anchors.last().map(|a| a.scaled as f64).unwrap_or(0.0);
        for pair in self.anchors.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if fraction <= hi.fraction {
                let span = hi.fraction - lo.fraction;
                let t = (fraction - lo.fraction) / span;
                value = lo.scaled as f64 + t * (hi.scaled - lo.scaled) as f64;
                break;
            }
        }

        // Scaled scores display in steps of 10.
        ((value / 10.0).round() * 10.0) as i32
    }
}

impl Default for ScaleTable {
    fn default() -> Self {
        Self::new(vec![
            ScaleAnchor {
                fraction: 0.0,
                scaled: 200,
            },
            ScaleAnchor {
                fraction: 0.2,
                scaled: 330,
            },
            ScaleAnchor {
                fraction: 0.4,
                scaled: 440,
            },
            ScaleAnchor {
                fraction: 0.6,
                scaled: 550,
            },
            ScaleAnchor {
                fraction: 0.8,
                scaled: 660,
            },
            ScaleAnchor {
                fraction: 1.0,
                scaled: 800,
            },
        ])
        .expect("built-in scale table is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_hit_the_scale_bounds() {
        let table = ScaleTable::default();
        assert_eq!(table.scaled(0, 27), 200);
        assert_eq!(table.scaled(27, 27), 800);
    }

    #[test]
    fn lookup_is_monotonic_in_raw() {
        let table = ScaleTable::default();
        let mut last = 0;
        for raw in 0..=27 {
            let scaled = table.scaled(raw, 27);
            assert!(scaled >= last, "raw {} regressed", raw);
            assert_eq!(scaled % 10, 0);
            last = scaled;
        }
    }

    #[test]
    fn empty_section_scores_the_floor() {
        let table = ScaleTable::default();
        assert_eq!(table.scaled(0, 0), 200);
    }

    #[test]
    fn rejects_non_monotonic_anchors() {
        let anchors = vec![
            ScaleAnchor {
                fraction: 0.0,
                scaled: 400,
            },
            ScaleAnchor {
                fraction: 0.5,
                scaled: 300,
            },
            ScaleAnchor {
                fraction: 1.0,
                scaled: 800,
            },
        ];
        assert!(ScaleTable::new(anchors).is_err());
    }
}
