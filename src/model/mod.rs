//! Data model: locations/chargers, vehicles/tasks.

pub mod location;
pub mod task;
pub mod vehicle;

pub use location::{Charger, ChargingPoint, GeneratorInfo, Location, LocationOutput, PlugType};
pub use task::{Task, TaskKind};
pub use vehicle::{OutputRow, Vehicle, VehicleType};
