//! Allowed actions and forward navigation, derived from phase and preconditions

use openapi_client::{RunId, RunPhase};

use crate::lifecycle::route::{Route, Stage};

/// State of the GPU inventory as far as starting prepare is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuInventory {
    /// The stage does not need a GPU
    NotRequired,

    /// Listing still outstanding
    Loading,

    /// Listing failed; start proceeds without a GPU
    Unavailable,

    /// Listing answered
    Loaded { options: usize, selected: bool },
}

/// Stage-specific inputs to the gate
#[derive(Debug, Clone, Copy)]
pub struct Preconditions<'a> {
    pub stage: Stage,
    pub run_id: Option<&'a RunId>,
    /// A request triggered by the primary action is outstanding
    pub action_in_flight: bool,
    pub gpu: GpuInventory,
}

impl<'a> Preconditions<'a> {
    pub fn new(stage: Stage, run_id: Option<&'a RunId>) -> Self {
        Self {
            stage,
            run_id,
            action_in_flight: false,
            gpu: GpuInventory::NotRequired,
        }
    }

    pub fn in_flight(mut self, in_flight: bool) -> Self {
        self.action_in_flight = in_flight;
        self
    }

    pub fn gpu(mut self, gpu: GpuInventory) -> Self {
        self.gpu = gpu;
        self
    }
}

/// What the user may do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub can_start: bool,
    pub can_advance: bool,
    pub advance_target: Option<Route>,
}

/// Derive the enabled actions. Pure; no remote calls.
pub fn gate(phase: Option<RunPhase>, preconditions: &Preconditions<'_>) -> GateDecision {
    let run_id = preconditions.run_id.filter(|id| !id.is_empty());

    let can_start = match preconditions.stage {
        Stage::Upload => !preconditions.action_in_flight,
        Stage::Monitor => false,
        Stage::Prepare => {
            run_id.is_some() && !preconditions.action_in_flight && gpu_ready(preconditions.gpu)
        }
        Stage::Deploy => run_id.is_some() && !preconditions.action_in_flight,
    };

    let can_advance = phase == Some(RunPhase::Succeeded);

    let advance_target = match (can_advance, run_id) {
        (true, Some(run_id)) => preconditions
            .stage
            .next()
            .map(|stage| Route::new(stage, Some(run_id.clone()))),
        _ => None,
    };

    GateDecision {
        can_start,
        can_advance,
        advance_target,
    }
}

fn gpu_ready(gpu: GpuInventory) -> bool {
    match gpu {
        GpuInventory::NotRequired | GpuInventory::Unavailable => true,
        GpuInventory::Loading => false,
        // An empty inventory blocks start entirely
        GpuInventory::Loaded { options: 0, .. } => false,
        GpuInventory::Loaded { selected, .. } => selected,
    }
}
