// Library root
// ------------
// One-shot provisioning of an administrative account on a hosted
// backend-as-a-service, plus its row in the application's profile table.
// The binary (`main.rs`) wires these modules together.
//
// Module responsibilities:
// - `config`: environment-sourced settings, built once at startup.
// - `error`: the failure taxonomy shared by every step.
// - `api`: blocking HTTP client for the remote authority and its wire
//   types.
// - `provision`: the create-or-adopt account step, the profile link step
//   and the orchestrator running them in order.
// - `ui`: the operator-facing console flow.
//
// `provision` only talks to the `AdminBackend` trait, so the steps can be
// exercised without a network.
pub mod api;
pub mod config;
pub mod error;
pub mod provision;
pub mod ui;

#[cfg(test)]
mod testing;
