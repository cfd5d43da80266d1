//! EMG-specific electrode and channel identity types

use serde::{Deserialize, Serialize};

/// Electrode placement for one EMG channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MuscleSite {
    LeftWrist,
    RightWrist,
    LeftElbow,
    RightElbow,
    LeftLeg,
    RightLeg,
    Other(u8), // For extensibility
}

impl MuscleSite {
    /// The six-electrode layout used by the arm rig, in wire order
    pub const ARM_RIG: [MuscleSite; 6] = [
        MuscleSite::LeftWrist,
        MuscleSite::RightWrist,
        MuscleSite::LeftElbow,
        MuscleSite::RightElbow,
        MuscleSite::LeftLeg,
        MuscleSite::RightLeg,
    ];

    /// Human label used in logs and on the console monitor
    pub fn label(&self, index: usize) -> String {
        format!("A{} - {}", index, self)
    }
}

impl std::fmt::Display for MuscleSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MuscleSite::LeftWrist => write!(f, "Left Wrist"),
            MuscleSite::RightWrist => write!(f, "Right Wrist"),
            MuscleSite::LeftElbow => write!(f, "Left Elbow"),
            MuscleSite::RightElbow => write!(f, "Right Elbow"),
            MuscleSite::LeftLeg => write!(f, "Left Leg"),
            MuscleSite::RightLeg => write!(f, "Right Leg"),
            MuscleSite::Other(id) => write!(f, "Other({})", id),
        }
    }
}
