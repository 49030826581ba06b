//! Error kinds for the fleet charging simulator.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the simulation core and its ambient I/O layer.
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid matrix index, non-positive average speed at construction,
    /// negative distance, or a malformed timestamp for a critical input.
    #[error("bad input: {0}")]
    BadInput(String),

    /// Duplicate task start time on one vehicle.
    #[error("timeline conflict for vehicle {vehicle_id} at timestep {timestep}")]
    TimelineConflict { vehicle_id: String, timestep: i64 },

    /// Vehicle driven to `soc <= 0`.
    #[error("vehicle {vehicle_id} battery emptied at timestep {timestep}")]
    EmptyBattery { vehicle_id: String, timestep: i64 },

    /// Resolver could not satisfy `soc_min` with available candidates and
    /// `delete_rides` is disabled.
    #[error("infeasible schedule for vehicle {vehicle_id}: {reason}")]
    Infeasible { vehicle_id: String, reason: String },

    /// Failure to read or parse an ambient input (CSV/TOML).
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failure to parse an input CSV file.
    #[error("csv error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Convenience alias used across the crate.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_vehicle_and_timestep() {
        let err = SimError::Infeasible {
            vehicle_id: "veh_1".to_string(),
            reason: "no remaining candidates".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("veh_1"));
        assert!(msg.contains("no remaining candidates"));
    }
}
