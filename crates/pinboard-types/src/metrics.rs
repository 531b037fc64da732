//! User activity scoring.
//!
//! Score and segment are derived from the user's counters and are never
//! accepted from a client. Storage recomputes them on every user write.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const PIN_WEIGHT: f64 = 0.3;
const COMMENT_WEIGHT: f64 = 0.2;
const BOARD_WEIGHT: f64 = 0.2;
const FOLLOWER_WEIGHT: f64 = 0.3;

const INFLUENCER_ABOVE: f64 = 80.0;
const CREATOR_ABOVE: f64 = 50.0;
const POWER_ABOVE: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    #[default]
    Casual,
    Power,
    Creator,
    Influencer,
}

impl Segment {
    /// Thresholds are strict: a score of exactly 80 is still `Creator`.
    pub fn from_score(score: f64) -> Self {
        if score > INFLUENCER_ABOVE {
            Segment::Influencer
        } else if score > CREATOR_ABOVE {
            Segment::Creator
        } else if score > POWER_ABOVE {
            Segment::Power
        } else {
            Segment::Casual
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::Casual => "casual",
            Segment::Power => "power",
            Segment::Creator => "creator",
            Segment::Influencer => "influencer",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Segment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "casual" => Ok(Segment::Casual),
            "power" => Ok(Segment::Power),
            "creator" => Ok(Segment::Creator),
            "influencer" => Ok(Segment::Influencer),
            other => Err(format!("unknown segment '{}'", other)),
        }
    }
}

/// Inputs to the scoring rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityCounters {
    pub pins_created: u64,
    pub comments: u64,
    pub boards: u64,
    pub followers: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityMetrics {
    pub activity_score: f64,
    pub segment: Segment,
}

impl ActivityCounters {
    pub fn activity_score(&self) -> f64 {
        self.pins_created as f64 * PIN_WEIGHT
            + self.comments as f64 * COMMENT_WEIGHT
            + self.boards as f64 * BOARD_WEIGHT
            + self.followers as f64 * FOLLOWER_WEIGHT
    }

    pub fn metrics(&self) -> ActivityMetrics {
        let activity_score = self.activity_score();
        ActivityMetrics {
            activity_score,
            segment: Segment::from_score(activity_score),
        }
    }
}
