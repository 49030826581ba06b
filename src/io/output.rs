//! CSV and JSON export for simulation results.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::json;

use crate::model::location::Location;
use crate::model::vehicle::Vehicle;

/// Writes one CSV file per vehicle, named `<vehicle_id>.csv`, containing its
/// full output trace.
pub fn export_vehicle_csvs(vehicles: &[Vehicle], out_dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(out_dir)?;
    for vehicle in vehicles {
        let path = out_dir.join(format!("{}.csv", vehicle.id));
        let file = File::create(path)?;
        write_vehicle_csv(&vehicle.output, BufWriter::new(file))?;
    }
    Ok(())
}

fn write_vehicle_csv(rows: &[crate::model::vehicle::OutputRow], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()
}

/// One row of a location's power/occupancy CSV.
#[derive(Debug, Serialize)]
struct LocationOutputRow {
    timestep: usize,
    total_power_kw: f64,
    total_connected_vehicles: u32,
}

/// Writes one CSV file per location with an output series, named
/// `<location_name>.csv`.
pub fn export_location_csvs(locations: &std::collections::BTreeMap<String, Location>, out_dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(out_dir)?;
    for (name, location) in locations {
        let Some(output) = &location.output else { continue };
        let path = out_dir.join(format!("{name}.csv"));
        let file = File::create(path)?;
        let mut wtr = csv::WriterBuilder::new().from_writer(BufWriter::new(file));
        for t in 0..output.total_power_kw.len() {
            wtr.serialize(LocationOutputRow {
                timestep: t,
                total_power_kw: output.total_power_kw[t],
                total_connected_vehicles: output.total_connected_vehicles[t],
            })?;
        }
        wtr.flush()?;
    }
    Ok(())
}

/// Assembles the aggregate scenario summary: totals across the fleet plus
/// per-vehicle deleted-ride counters and derived self-sufficiency.
pub fn build_scenario_summary(vehicles: &[Vehicle]) -> serde_json::Value {
    let mut total_distance = 0.0;
    let mut total_charging_demand_kwh = 0.0;
    let mut total_consumption_kwh = 0.0;
    let mut total_cost = 0.0;
    let mut total_emission = 0.0;
    let mut total_energy_from_feed_in = 0.0;
    let mut total_energy_from_grid = 0.0;
    let mut deleted_rides = serde_json::Map::new();

    for vehicle in vehicles {
        deleted_rides.insert(vehicle.id.clone(), json!(vehicle.deleted_ride_count));
        for row in &vehicle.output {
            total_distance += row.distance;
            total_consumption_kwh += row.consumption;
            total_charging_demand_kwh += row.energy.max(0.0);
            total_cost += row.energy_cost;
            total_emission += row.emission;
            total_energy_from_feed_in += row.energy_from_feed_in;
            total_energy_from_grid += row.energy_from_grid;
        }
    }

    let total_energy = total_energy_from_feed_in + total_energy_from_grid;
    let self_sufficiency = if total_energy > 0.0 { total_energy_from_feed_in / total_energy } else { 0.0 };

    json!({
        "totals": {
            "distance_km": total_distance,
            "charging_demand_kwh": total_charging_demand_kwh,
            "consumption_kwh": total_consumption_kwh,
            "cost": total_cost,
            "emission": total_emission,
            "energy_from_feed_in_kwh": total_energy_from_feed_in,
            "energy_from_grid_kwh": total_energy_from_grid,
            "self_sufficiency": self_sufficiency,
        },
        "deleted_rides": deleted_rides,
    })
}

/// Writes the aggregate scenario summary to a JSON file.
pub fn export_scenario_json(vehicles: &[Vehicle], path: &Path) -> io::Result<()> {
    let summary = build_scenario_summary(vehicles);
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &summary)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::vehicle::VehicleType;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    fn vt() -> Rc<VehicleType> {
        Rc::new(VehicleType {
            name: "van".to_string(),
            battery_capacity_kwh: 40.0,
            soc_min: 0.2,
            base_consumption_kwh_per_km: 0.2,
            charging_curve: vec![(0.0, 22.0), (1.0, 22.0)],
            charging_capacity: BTreeMap::from([("CCS".to_string(), 22.0)]),
            min_charging_power: 0.1,
            v2g: false,
            v2g_power_factor: 0.0,
        })
    }

    #[test]
    fn scenario_summary_counts_deleted_rides_per_vehicle() {
        let mut v = Vehicle::new("v1", vt(), "depot", 1.0);
        v.drive(0, 0, 10.0, "site", 0.9, 5.0, 0.0, 2.0).unwrap();
        let summary = build_scenario_summary(&[v]);
        assert_eq!(summary["deleted_rides"]["v1"], json!(0));
        assert_eq!(summary["totals"]["distance_km"], json!(5.0));
    }

    #[test]
    fn self_sufficiency_is_zero_with_no_energy() {
        let v = Vehicle::new("v1", vt(), "depot", 1.0);
        let summary = build_scenario_summary(&[v]);
        assert_eq!(summary["totals"]["self_sufficiency"], json!(0.0));
    }
}
