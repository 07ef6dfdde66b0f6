use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Whether the target's process tree is captured or carved out of the mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopbackMode {
    /// Capture only the target process and its descendants.
    #[default]
    IncludeTree,
    /// Capture everything except the target process and its descendants.
    ExcludeTree,
}

impl std::str::FromStr for LoopbackMode {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "includetree" => Ok(Self::IncludeTree),
            "excludetree" => Ok(Self::ExcludeTree),
            other => Err(CaptureError::InvalidParameter(format!(
                "loopback mode must be includetree or excludetree, got {:?}",
                other
            ))),
        }
    }
}

/// The process whose rendered audio is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTargetProcess", into = "RawTargetProcess")]
pub struct TargetProcess {
    process_id: u32,
    mode: LoopbackMode,
}

impl TargetProcess {
    pub fn new(process_id: u32, mode: LoopbackMode) -> Result<Self, CaptureError> {
        if process_id == 0 {
            return Err(CaptureError::InvalidParameter("process id must be non-zero".into()));
        }
        Ok(Self { process_id, mode })
    }

    /// Capture `process_id` and its descendants.
    pub fn include_tree(process_id: u32) -> Result<Self, CaptureError> {
        Self::new(process_id, LoopbackMode::IncludeTree)
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn mode(&self) -> LoopbackMode {
        self.mode
    }

    pub fn is_inclusive(&self) -> bool {
        self.mode == LoopbackMode::IncludeTree
    }
}

#[derive(Serialize, Deserialize)]
struct RawTargetProcess {
    process_id: u32,
    mode: LoopbackMode,
}

impl From<TargetProcess> for RawTargetProcess {
    fn from(target: TargetProcess) -> Self {
        Self {
            process_id: target.process_id,
            mode: target.mode,
        }
    }
}

impl TryFrom<RawTargetProcess> for TargetProcess {
    type Error = CaptureError;

    fn try_from(raw: RawTargetProcess) -> Result<Self, Self::Error> {
        Self::new(raw.process_id, raw.mode)
    }
}
