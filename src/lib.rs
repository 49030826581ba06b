//! Discrete-time fleet EV-charging simulator.

/// Command-line argument parsing.
pub mod cli;
/// TOML scenario configuration and preset definitions.
pub mod config;
/// EmCS adapter: opaque charging-subroutine contract.
pub mod emcs;
/// Error kinds for the simulation core and its ambient I/O layer.
pub mod error;
/// Per-break candidate scoring.
pub mod evaluator;
/// Input loaders and output exporters.
pub mod io;
/// Data model: locations/chargers, vehicles/tasks.
pub mod model;
/// Greedy round-robin charging-slot allocation.
pub mod resolver;
/// n-dimensional consumption interpolation and trip calculation.
pub mod ride;
/// Simulation registry wiring the Resolver and Stepper to one run.
pub mod simulation;
/// Per-timestep task dispatch.
pub mod stepper;
