//! Stage-independent run lifecycle logic

pub mod gate;
pub mod reconcile;
pub mod route;

pub use gate::{gate, GateDecision, GpuInventory, Preconditions};
pub use reconcile::{
    PhaseChange, Reconciled, Reconciler, StatusPayload, StatusView, NO_STATUS_YET,
};
pub use route::{Route, Stage};
