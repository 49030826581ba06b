//! Stepper: per-timestep task dispatch for every vehicle.

use std::collections::HashMap;

use crate::emcs::{ChargingRequest, ChargingSimulator, select_strategy};
use crate::error::SimResult;
use crate::model::location::Location;
use crate::model::task::TaskKind;
use crate::model::vehicle::Vehicle;
use crate::ride::RideCalc;

/// Fixed parameters the Stepper needs on every call, independent of vehicle
/// or timestep.
pub struct StepperParams<'a> {
    pub ride: &'a RideCalc,
    pub simulator: &'a dyn ChargingSimulator,
    pub steps_per_hour: f64,
    pub price_per_kwh: &'a [f64],
    pub feed_in_kw: &'a [f64],
    pub feed_in_price_per_kwh: f64,
    pub emission_per_kwh: Option<&'a [f64]>,
    pub charging_step_size_minutes: f64,
    pub alt_strategy_min_standing_time: f64,
    pub record_location_output: bool,
    pub time_steps: usize,
}

pub struct Stepper;

impl Stepper {
    /// Steps every vehicle from `t = 0` to `time_steps - 1`, in vehicle
    /// construction order within each step.
    pub fn run(vehicles: &mut [Vehicle], locations: &mut HashMap<String, Location>, params: &StepperParams) -> SimResult<()> {
        for t in 0..params.time_steps as i64 {
            for vehicle in vehicles.iter_mut() {
                let Some(task) = vehicle.get_task(t).cloned() else { continue };
                match task.kind {
                    TaskKind::Driving => {
                        if task.is_calculated() {
                            Self::drive_precalculated(vehicle, params, t, &task)?;
                        } else {
                            Self::drive_recompute(vehicle, params, t, &task)?;
                        }
                    }
                    TaskKind::Charging => Self::charge(vehicle, locations, params, t, &task)?,
                    TaskKind::Parking | TaskKind::Break => vehicle.park(t, task.start_time, task.float_time),
                }
            }
        }
        Ok(())
    }

    fn hour_of(t: i64, steps_per_hour: f64) -> usize {
        ((t as f64 / steps_per_hour) as i64).rem_euclid(24) as usize
    }

    fn drive_recompute(vehicle: &mut Vehicle, params: &StepperParams, t: i64, task: &crate::model::task::Task) -> SimResult<()> {
        let hour = Self::hour_of(task.start_time, params.steps_per_hour);
        let trip = params.ride.calculate_trip(
            &vehicle.vehicle_type.name,
            vehicle.vehicle_type.battery_capacity_kwh,
            &task.start_point,
            &task.end_point,
            task.level_of_loading,
            params.ride.average_speed,
            hour,
        )?;
        let distance = params.ride.distance.get(&task.start_point, &task.end_point)?;
        let new_soc = vehicle.current_soc + trip.soc_delta;
        vehicle.drive(t, task.start_time, trip.trip_time_minutes, &task.end_point, new_soc, distance, task.level_of_loading, trip.consumption_kwh)
    }

    fn drive_precalculated(vehicle: &mut Vehicle, params: &StepperParams, t: i64, task: &crate::model::task::Task) -> SimResult<()> {
        let distance = params.ride.distance.get(&task.start_point, &task.end_point).unwrap_or(0.0);
        let new_soc = vehicle.current_soc + task.delta_soc;
        vehicle.drive(t, task.start_time, task.float_time, &task.end_point, new_soc, distance, task.level_of_loading, task.consumption)
    }

    fn charge(vehicle: &mut Vehicle, locations: &mut HashMap<String, Location>, params: &StepperParams, t: i64, task: &crate::model::task::Task) -> SimResult<()> {
        let station_power_kw = locations
            .get(&task.start_point)
            .map(|loc| {
                loc.chargers
                    .iter()
                    .flat_map(|c| c.points.iter())
                    .map(|p| p.power_for(&vehicle.vehicle_type.plugs()))
                    .fold(0.0, f64::max)
            })
            .unwrap_or(0.0);

        let lo = task.start_time.max(0) as usize;
        let hi = (task.end_time.max(0) as usize).min(params.price_per_kwh.len());
        let price_slice = params.price_per_kwh.get(lo..hi).unwrap_or(&[]).to_vec();
        let feed_in_slice = params.feed_in_kw.get(lo..hi).unwrap_or(&[]).to_vec();
        let emission_slice = params.emission_per_kwh.and_then(|s| s.get(lo..hi)).map(|s| s.to_vec());

        let window_minutes = (task.end_time - task.start_time) as f64;
        let request = ChargingRequest {
            start: task.start_time,
            end: task.end_time,
            step_minutes: 60.0 / params.steps_per_hour,
            strategy: select_strategy(window_minutes, params.alt_strategy_min_standing_time),
            location_power_kw: station_power_kw,
            vehicle_max_power_kw: vehicle.vehicle_type.max_power_at(vehicle.current_soc),
            start_soc: vehicle.current_soc,
            battery_capacity_kwh: vehicle.vehicle_type.battery_capacity_kwh,
            v2g: vehicle.vehicle_type.v2g,
            v2g_power_factor: vehicle.vehicle_type.v2g_power_factor,
            price_per_kwh: price_slice,
            feed_in_kw: feed_in_slice,
            feed_in_price_per_kwh: params.feed_in_price_per_kwh,
            emission_per_kwh: emission_slice,
            charging_step_size_minutes: params.charging_step_size_minutes,
        };

        let Some(result) = params.simulator.run(&request)? else {
            tracing::warn!(vehicle = %vehicle.id, start = task.start_time, end = task.end_time, "charging window below resolution, parking instead");
            vehicle.park(t, task.start_time, task.float_time);
            return Ok(());
        };

        let n_steps = (task.end_time - task.start_time).max(1) as f64;
        let avg_power_kw = result.outcome.grid_energy_kwh * params.steps_per_hour / n_steps;
        vehicle.charge(t, task.start_time, task.float_time, avg_power_kw, result.final_soc, station_power_kw, &result.outcome)?;

        if params.record_location_output {
            if let Some(loc) = locations.get_mut(&task.start_point) {
                let per_step = vec![avg_power_kw; n_steps as usize];
                loc.update_output(task.start_time, task.end_time, params.time_steps, per_step);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emcs::GreedyChargingSimulator;
    use crate::model::location::{Charger, ChargingPoint, PlugType};
    use crate::model::task::Task;
    use crate::model::vehicle::VehicleType;
    use crate::ride::{ConsumptionRow, ConsumptionTable, Defaults, RouteMatrix, TemperatureTable};
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

    fn ride_calc() -> RideCalc {
        let mut distance = RouteMatrix::new();
        distance.insert("depot", "site", 5.0);
        distance.insert("site", "depot", 5.0);
        let mut incline = RouteMatrix::new();
        incline.insert("depot", "site", 0.0);
        incline.insert("site", "depot", 0.0);
        let temperature = TemperatureTable::new(vec![("default".to_string(), vec![20.0; 24])]);
        let consumption = ConsumptionTable::from_rows(vec![ConsumptionRow {
            vehicle_type: "van".to_string(),
            level_of_loading: 0.0,
            incline: 0.0,
            mean_speed: 30.0,
            t_amb: 20.0,
            consumption: -0.2,
        }]);
        RideCalc::new(consumption, distance, incline, temperature, "default", Defaults::default(), 30.0).unwrap()
    }

    fn depot_location() -> Location {
        let mut loc = Location::new(
            "depot",
            "depot",
            vec![Charger {
                name: "c1".to_string(),
                points: vec![ChargingPoint {
                    id: "c1_0".to_string(),
                    plugs: vec![PlugType { name: "ccs".to_string(), capacity_kw: 22.0, plug_kind: "CCS".to_string() }],
                }],
            }],
        );
        loc.init_occupation(48);
        loc
    }

    #[test]
    fn driving_task_updates_soc_and_location() {
        let ride = ride_calc();
        let sim = GreedyChargingSimulator;
        let mut vehicles = vec![Vehicle::new("v1", vt(), "depot", 1.0)];
        vehicles[0].add_task(Task::driving(0, 10, "depot", "site", 0.0)).unwrap();
        let mut locations = HashMap::from([("depot".to_string(), depot_location())]);
        let params = StepperParams {
            ride: &ride,
            simulator: &sim,
            steps_per_hour: 4.0,
            price_per_kwh: &[0.2; 48],
            feed_in_kw: &[0.0; 48],
            feed_in_price_per_kwh: 0.05,
            emission_per_kwh: None,
            charging_step_size_minutes: 15.0,
            alt_strategy_min_standing_time: 120.0,
            record_location_output: false,
            time_steps: 48,
        };
        Stepper::run(&mut vehicles, &mut locations, &params).unwrap();
        assert_eq!(vehicles[0].current_location, "site");
        assert!(vehicles[0].current_soc < 1.0);
    }

    #[test]
    fn charging_task_below_resolution_parks_instead() {
        let ride = ride_calc();
        let sim = GreedyChargingSimulator;
        let mut vehicles = vec![Vehicle::new("v1", vt(), "depot", 0.5)];
        vehicles[0].add_task(Task::charging(0, 1, "depot", 0.0, 0.0)).unwrap();
        let mut locations = HashMap::from([("depot".to_string(), depot_location())]);
        let params = StepperParams {
            ride: &ride,
            simulator: &sim,
            steps_per_hour: 4.0,
            price_per_kwh: &[0.2; 48],
            feed_in_kw: &[0.0; 48],
            feed_in_price_per_kwh: 0.05,
            emission_per_kwh: None,
            charging_step_size_minutes: 60.0,
            alt_strategy_min_standing_time: 120.0,
            record_location_output: false,
            time_steps: 48,
        };
        Stepper::run(&mut vehicles, &mut locations, &params).unwrap();
        assert_eq!(vehicles[0].output.last().unwrap().status, "parking");
    }
}
