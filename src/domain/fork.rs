//! Fork steps of block notifications

use serde::{Deserialize, Serialize};

/// Chain-reorganization status of a block notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForkStep {
    New,
    Undo,
    Redo,
    Irreversible,
    Handoff,
    Unknown,
}

impl ForkStep {
    /// Steps that move the chain forward (everything but undo/unknown)
    pub fn is_forward(self) -> bool {
        matches!(
            self,
            Self::New | Self::Redo | Self::Irreversible | Self::Handoff
        )
    }

    /// Bit value used by the block stream (`1 << n`), `0` for unknown
    pub fn code(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::New => 1,
            Self::Undo => 2,
            Self::Redo => 4,
            Self::Handoff => 8,
            Self::Irreversible => 16,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::New,
            2 => Self::Undo,
            4 => Self::Redo,
            8 => Self::Handoff,
            16 => Self::Irreversible,
            _ => Self::Unknown,
        }
    }

    /// Lower-case name carried in message context
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::Irreversible => "irreversible",
            Self::Handoff => "handoff",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ForkStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
