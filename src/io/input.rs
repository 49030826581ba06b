//! CSV loaders for schedule, fleet, network and environment inputs.

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use serde::Deserialize;

use crate::error::{SimError, SimResult};
use crate::model::location::{Charger, ChargingPoint, Location, PlugType};
use crate::model::task::Task;
use crate::model::vehicle::{Vehicle, VehicleType};
use crate::ride::{ConsumptionRow, ConsumptionTable, RouteMatrix, TemperatureTable};

fn open_reader(path: &Path) -> SimResult<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .from_path(path)
        .map_err(|source| SimError::Csv { path: path.to_path_buf(), source })
}

/// One row of the schedule CSV: a single vehicle's planned drive.
#[derive(Debug, Deserialize)]
struct ScheduleRow {
    vehicle_id: String,
    vehicle_type: String,
    departure_name: String,
    arrival_name: String,
    departure_time: i64,
    arrival_time: i64,
    occupation: f64,
}

/// Loads the schedule CSV and returns one [`Vehicle`] per distinct
/// `vehicle_id`, each with its DRIVING tasks already inserted.
///
/// `level_of_loading` is derived as `occupation / capacity_of(vehicle_type)`.
pub fn load_schedule(path: &Path, vehicle_types: &BTreeMap<String, Rc<VehicleType>>, start_soc: f64) -> SimResult<Vec<Vehicle>> {
    let mut reader = open_reader(path)?;
    let mut vehicles: BTreeMap<String, Vehicle> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();

    for record in reader.deserialize() {
        let row: ScheduleRow = record.map_err(|source| SimError::Csv { path: path.to_path_buf(), source })?;
        let vt = vehicle_types
            .get(&row.vehicle_type)
            .ok_or_else(|| SimError::BadInput(format!("schedule references unknown vehicle type {}", row.vehicle_type)))?;

        if !vehicles.contains_key(&row.vehicle_id) {
            vehicles.insert(row.vehicle_id.clone(), Vehicle::new(row.vehicle_id.clone(), vt.clone(), row.departure_name.clone(), start_soc));
            order.push(row.vehicle_id.clone());
        }
        let vehicle = vehicles.get_mut(&row.vehicle_id).expect("just inserted above");
        let level_of_loading = if vt.battery_capacity_kwh > 0.0 { (row.occupation / vt.battery_capacity_kwh).clamp(0.0, 1.0) } else { 0.0 };
        vehicle.add_task(Task::driving(row.departure_time, row.arrival_time, row.departure_name, row.arrival_name, level_of_loading))?;
    }

    Ok(order.into_iter().map(|id| vehicles.remove(&id).expect("inserted above")).collect())
}

/// One row of the vehicle-types CSV. `charging_curve` is encoded as
/// `soc:power_kw;soc:power_kw;...` pairs sorted by SoC.
#[derive(Debug, Deserialize)]
struct VehicleTypeRow {
    name: String,
    capacity_kwh: f64,
    soc_min: f64,
    base_consumption_kwh_per_km: f64,
    charging_curve: String,
    charging_capacity: String,
    min_charging_power: f64,
    v2g: bool,
    v2g_power_factor: f64,
}

fn parse_pairs(s: &str) -> SimResult<Vec<(f64, f64)>> {
    s.split(';')
        .filter(|p| !p.is_empty())
        .map(|pair| {
            let (a, b) = pair.split_once(':').ok_or_else(|| SimError::BadInput(format!("malformed pair \"{pair}\"")))?;
            let a: f64 = a.trim().parse().map_err(|_| SimError::BadInput(format!("non-numeric value in \"{pair}\"")))?;
            let b: f64 = b.trim().parse().map_err(|_| SimError::BadInput(format!("non-numeric value in \"{pair}\"")))?;
            Ok((a, b))
        })
        .collect()
}

fn parse_capacity_map(s: &str) -> SimResult<BTreeMap<String, f64>> {
    let mut map = BTreeMap::new();
    for entry in s.split(';').filter(|p| !p.is_empty()) {
        let (plug, power) = entry.split_once(':').ok_or_else(|| SimError::BadInput(format!("malformed plug capacity \"{entry}\"")))?;
        let power: f64 = power.trim().parse().map_err(|_| SimError::BadInput(format!("non-numeric power in \"{entry}\"")))?;
        map.insert(plug.trim().to_string(), power);
    }
    Ok(map)
}

/// Loads the vehicle-types CSV, keyed by type name.
pub fn load_vehicle_types(path: &Path) -> SimResult<BTreeMap<String, Rc<VehicleType>>> {
    let mut reader = open_reader(path)?;
    let mut out = BTreeMap::new();
    for record in reader.deserialize() {
        let row: VehicleTypeRow = record.map_err(|source| SimError::Csv { path: path.to_path_buf(), source })?;
        let mut curve = parse_pairs(&row.charging_curve)?;
        curve.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("non-NaN soc"));
        let vt = VehicleType {
            name: row.name.clone(),
            battery_capacity_kwh: row.capacity_kwh,
            soc_min: row.soc_min,
            base_consumption_kwh_per_km: row.base_consumption_kwh_per_km,
            charging_curve: curve,
            charging_capacity: parse_capacity_map(&row.charging_capacity)?,
            min_charging_power: row.min_charging_power,
            v2g: row.v2g,
            v2g_power_factor: row.v2g_power_factor,
        };
        out.insert(row.name, Rc::new(vt));
    }
    Ok(out)
}

/// One row of the charging-points CSV: one plug offered by one point of one
/// charger at one location.
#[derive(Debug, Deserialize)]
struct ChargingPointRow {
    location: String,
    location_type: String,
    charger: String,
    point_id: String,
    plug_name: String,
    plug_kind: String,
    capacity_kw: f64,
    grid_power_kw: Option<f64>,
}

/// Loads the charging-points CSV into one [`Location`] per distinct
/// `location`, grouping rows into chargers and charging points.
pub fn load_locations(path: &Path) -> SimResult<BTreeMap<String, Location>> {
    let mut reader = open_reader(path)?;
    let mut locations: BTreeMap<String, Location> = BTreeMap::new();

    for record in reader.deserialize() {
        let row: ChargingPointRow = record.map_err(|source| SimError::Csv { path: path.to_path_buf(), source })?;
        let location = locations
            .entry(row.location.clone())
            .or_insert_with(|| Location::new(row.location.clone(), row.location_type.clone(), Vec::new()));
        location.grid_power_kw = row.grid_power_kw.or(location.grid_power_kw);

        let charger = match location.chargers.iter_mut().find(|c| c.name == row.charger) {
            Some(c) => c,
            None => {
                location.chargers.push(Charger { name: row.charger.clone(), points: Vec::new() });
                location.chargers.last_mut().expect("just pushed")
            }
        };
        let point = match charger.points.iter_mut().find(|p| p.id == row.point_id) {
            Some(p) => p,
            None => {
                charger.points.push(ChargingPoint { id: row.point_id.clone(), plugs: Vec::new() });
                charger.points.last_mut().expect("just pushed")
            }
        };
        point.plugs.push(PlugType { name: row.plug_name, capacity_kw: row.capacity_kw, plug_kind: row.plug_kind });
    }

    Ok(locations)
}

/// Loads a square distance or incline matrix: header row and first column
/// both carry location names.
pub fn load_route_matrix(path: &Path) -> SimResult<RouteMatrix> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(|source| SimError::Csv { path: path.to_path_buf(), source })?.clone();
    let names: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut matrix = RouteMatrix::new();
    for record in reader.records() {
        let record = record.map_err(|source| SimError::Csv { path: path.to_path_buf(), source })?;
        let from = record.get(0).ok_or_else(|| SimError::BadInput("route matrix row missing origin name".to_string()))?.to_string();
        for (i, to) in names.iter().enumerate() {
            let Some(raw) = record.get(i + 1) else { continue };
            let value: f64 = raw.parse().map_err(|_| SimError::BadInput(format!("non-numeric route entry {from} -> {to}")))?;
            matrix.insert(from.clone(), to.clone(), value);
        }
    }
    Ok(matrix)
}

/// Loads the tidy consumption CSV into a [`ConsumptionTable`].
pub fn load_consumption_table(path: &Path) -> SimResult<ConsumptionTable> {
    let mut reader = open_reader(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: ConsumptionRow = record.map_err(|source| SimError::Csv { path: path.to_path_buf(), source })?;
        rows.push(row);
    }
    Ok(ConsumptionTable::from_rows(rows))
}

/// Loads the hourly temperature CSV: `hour` first column, one or more named
/// data columns.
pub fn load_temperature_table(path: &Path) -> SimResult<TemperatureTable> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(|source| SimError::Csv { path: path.to_path_buf(), source })?.clone();
    let column_names: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); column_names.len()];

    for record in reader.records() {
        let record = record.map_err(|source| SimError::Csv { path: path.to_path_buf(), source })?;
        for (i, column) in columns.iter_mut().enumerate() {
            let Some(raw) = record.get(i + 1) else { continue };
            let value: f64 = raw.parse().map_err(|_| SimError::BadInput(format!("non-numeric temperature entry in column {}", i + 1)))?;
            column.push(value);
        }
    }

    Ok(TemperatureTable::new(column_names.into_iter().zip(columns).collect()))
}

/// Loads a single-column time series CSV (cost or emission) named `column`.
pub fn load_series(path: &Path, column: &str) -> SimResult<Vec<f64>> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(|source| SimError::Csv { path: path.to_path_buf(), source })?.clone();
    let idx = headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| SimError::BadInput(format!("series column \"{column}\" not found in {}", path.display())))?;

    let mut values = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| SimError::Csv { path: path.to_path_buf(), source })?;
        let raw = record.get(idx).ok_or_else(|| SimError::BadInput(format!("series row missing column {idx}")))?;
        values.push(raw.parse().map_err(|_| SimError::BadInput(format!("non-numeric series entry \"{raw}\"")))?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile_path::TempCsv {
        tempfile_path::TempCsv::new(contents)
    }

    mod tempfile_path {
        use std::fs;
        use std::path::PathBuf;

        /// Minimal scratch-file helper: writes `contents` under the system
        /// temp dir and removes it on drop.
        pub struct TempCsv {
            pub path: PathBuf,
        }

        impl TempCsv {
            pub fn new(contents: &str) -> Self {
                let path = std::env::temp_dir().join(format!("fleet-charge-sim-test-{}.csv", std::process::id()));
                fs::write(&path, contents).expect("write temp csv");
                Self { path }
            }
        }

        impl Drop for TempCsv {
            fn drop(&mut self) {
                let _ = fs::remove_file(&self.path);
            }
        }
    }

    #[test]
    fn parse_pairs_reads_semicolon_separated_colon_pairs() {
        let pairs = parse_pairs("0.0:50.0;0.8:50.0;1.0:10.0").unwrap();
        assert_eq!(pairs, vec![(0.0, 50.0), (0.8, 50.0), (1.0, 10.0)]);
    }

    #[test]
    fn parse_capacity_map_reads_plug_entries() {
        let map = parse_capacity_map("CCS:22.0;Schuko:3.7").unwrap();
        assert_eq!(map.get("CCS"), Some(&22.0));
        assert_eq!(map.get("Schuko"), Some(&3.7));
    }

    #[test]
    fn load_route_matrix_reads_square_csv() {
        let file = write_temp("name,depot,site\ndepot,0.0,5.0\nsite,5.0,0.0\n");
        let matrix = load_route_matrix(&file.path).unwrap();
        assert_eq!(matrix.get("depot", "site").unwrap(), 5.0);
        assert_eq!(matrix.get("site", "depot").unwrap(), 5.0);
    }

    #[test]
    fn load_series_reads_named_column() {
        let mut f = std::fs::File::create(std::env::temp_dir().join(format!("fleet-charge-sim-series-{}.csv", std::process::id()))).unwrap();
        writeln!(f, "price,other").unwrap();
        writeln!(f, "0.2,1").unwrap();
        writeln!(f, "0.3,2").unwrap();
        drop(f);
        let path = std::env::temp_dir().join(format!("fleet-charge-sim-series-{}.csv", std::process::id()));
        let values = load_series(&path, "price").unwrap();
        assert_eq!(values, vec![0.2, 0.3]);
        let _ = std::fs::remove_file(&path);
    }
}
