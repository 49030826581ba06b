//! Vehicle & Task store: per-vehicle timeline, SoC trace, break derivation.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::json;

use crate::error::{SimError, SimResult};
use crate::evaluator::Candidate;

use super::task::{Task, TaskKind};

/// Immutable vehicle model shared by every vehicle of that type.
#[derive(Debug, Clone)]
pub struct VehicleType {
    pub name: String,
    pub battery_capacity_kwh: f64,
    pub soc_min: f64,
    pub base_consumption_kwh_per_km: f64,
    /// Piecewise-linear `(soc, max_power_kw)` pairs, sorted by soc.
    pub charging_curve: Vec<(f64, f64)>,
    /// Plug kind -> max power in kW this vehicle type can draw through it.
    pub charging_capacity: BTreeMap<String, f64>,
    /// Minimum usable charging power, as a fraction of the curve's peak.
    pub min_charging_power: f64,
    pub v2g: bool,
    pub v2g_power_factor: f64,
}

impl VehicleType {
    /// Plug kinds this vehicle type is compatible with.
    pub fn plugs(&self) -> Vec<String> {
        self.charging_capacity.keys().cloned().collect()
    }

    /// Maximum charging power at a given SoC, from the piecewise-linear curve.
    pub fn max_power_at(&self, soc: f64) -> f64 {
        let curve = &self.charging_curve;
        if curve.is_empty() {
            return 0.0;
        }
        if soc <= curve[0].0 {
            return curve[0].1;
        }
        if soc >= curve[curve.len() - 1].0 {
            return curve[curve.len() - 1].1;
        }
        for w in curve.windows(2) {
            let (s0, p0) = w[0];
            let (s1, p1) = w[1];
            if soc >= s0 && soc <= s1 {
                if (s1 - s0).abs() < f64::EPSILON {
                    return p1;
                }
                let frac = (soc - s0) / (s1 - s0);
                return p0 + frac * (p1 - p0);
            }
        }
        curve[curve.len() - 1].1
    }
}

/// One row of a vehicle's output trace — one state transition per row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OutputRow {
    pub timestamp: i64,
    pub event_start: i64,
    pub event_time: f64,
    pub end_location: String,
    pub status: String,
    pub soc_start: f64,
    pub soc_end: f64,
    pub energy: f64,
    pub actual_energy_from_grid: f64,
    pub station_charging_capacity: f64,
    pub average_charging_power: f64,
    pub distance: f64,
    pub energy_from_feed_in: f64,
    pub energy_from_grid: f64,
    pub energy_cost: f64,
    pub emission: f64,
    pub consumption: f64,
    pub level_of_loading: f64,
    pub v2g_energy: f64,
}

/// One live vehicle: mutable SoC/location state plus its task timeline.
pub struct Vehicle {
    pub id: String,
    pub vehicle_type: Rc<VehicleType>,
    pub current_soc: f64,
    pub current_location: String,
    pub soc_start: f64,
    tasks: BTreeMap<i64, Task>,
    pub output: Vec<OutputRow>,
    /// Cached, score-sorted candidate list from the Evaluator; recomputed
    /// only when the vehicle's task set or the environment changes.
    pub charging_list: Option<Vec<Candidate>>,
    pub deleted_ride_count: u32,
}

impl Vehicle {
    pub fn new(id: impl Into<String>, vehicle_type: Rc<VehicleType>, start_location: impl Into<String>, soc_start: f64) -> Self {
        Self {
            id: id.into(),
            vehicle_type,
            current_soc: soc_start,
            current_location: start_location.into(),
            soc_start,
            tasks: BTreeMap::new(),
            output: Vec::new(),
            charging_list: None,
            deleted_ride_count: 0,
        }
    }

    pub fn usable_soc(&self) -> f64 {
        (self.current_soc - self.vehicle_type.soc_min).max(0.0)
    }

    pub fn set_charging_list(&mut self, list: Vec<Candidate>) {
        self.charging_list = Some(list);
    }

    /// Inserts a task, keyed by its unique start time.
    ///
    /// Fatal on a duplicate start time — that indicates a planning bug, not
    /// a recoverable condition.
    pub fn add_task(&mut self, task: Task) -> SimResult<()> {
        if self.tasks.contains_key(&task.start_time) {
            return Err(SimError::TimelineConflict {
                vehicle_id: self.id.clone(),
                timestep: task.start_time,
            });
        }
        self.tasks.insert(task.start_time, task);
        self.charging_list = None;
        Ok(())
    }

    pub fn remove_task(&mut self, start_time: i64) -> Option<Task> {
        self.charging_list = None;
        self.tasks.remove(&start_time)
    }

    pub fn get_task(&self, t: i64) -> Option<&Task> {
        self.tasks.get(&t)
    }

    /// First task starting strictly after `t`.
    pub fn get_next_task(&self, t: i64) -> Option<&Task> {
        self.tasks.range((t + 1)..).next().map(|(_, task)| task)
    }

    /// Checks the timeline-adjacency invariant: for every consecutive pair
    /// of tasks, `task[i].end_time <= task[i+1].start_time` and
    /// `task[i].end_point == task[i+1].start_point`.
    pub fn has_valid_task_list(&self) -> bool {
        let mut iter = self.tasks.values();
        let Some(mut prev) = iter.next() else {
            return true;
        };
        for task in iter {
            if prev.end_time > task.start_time || prev.end_point != task.start_point {
                return false;
            }
            prev = task;
        }
        true
    }

    /// SoC immediately before time `t`, replaying DRIVING contributions from
    /// the vehicle's starting SoC. CHARGING contributions are not replayed
    /// here — they are reserved for future on-demand variants.
    pub fn soc_at(&self, t: i64) -> f64 {
        let mut soc = self.soc_start;
        for task in self.tasks.values() {
            if task.start_time >= t {
                break;
            }
            if task.kind == TaskKind::Driving {
                soc += task.delta_soc;
            }
        }
        soc
    }

    /// Analytically replays this vehicle's current tasks over `[start, end]`,
    /// returning `(timestep, predicted_soc)` at `start` and at every
    /// DRIVING task boundary within the window.
    pub fn predicted_soc(&self, start: i64, end: i64) -> Vec<(i64, f64)> {
        let mut soc = self.soc_at(start);
        let mut trace = vec![(start, soc)];
        for task in self.tasks.values() {
            if task.start_time < start || task.start_time >= end {
                continue;
            }
            if task.kind == TaskKind::Driving {
                soc += task.delta_soc;
            }
            trace.push((task.end_time.min(end), soc));
        }
        trace
    }

    /// Deletes the first DRIVING task starting in `[start, end)`, splicing
    /// the following task to begin at the deleted task's origin and marking
    /// it uncalculated so the next pass recomputes a shorter route. Returns
    /// `true` if a task was deleted.
    pub fn delete_ride(&mut self, start: i64, end: i64) -> bool {
        let Some(key) = self.tasks.range(start..end).find(|(_, t)| t.kind == TaskKind::Driving).map(|(k, _)| *k) else {
            return false;
        };
        let deleted = self.tasks.remove(&key).expect("key just found by range()");
        self.charging_list = None;
        self.deleted_ride_count += 1;
        if let Some(next_key) = self.tasks.range((key + 1)..).next().map(|(k, _)| *k) {
            let mut next = self.tasks.remove(&next_key).expect("key just found by range()");
            next.start_point = deleted.start_point.clone();
            next.start_time = deleted.start_time;
            next.is_calculated = false;
            self.tasks.insert(next.start_time, next);
        }
        true
    }

    /// Latest `end_time` across this vehicle's timeline, or `0` if it has no
    /// tasks yet.
    pub fn max_task_end_time(&self) -> i64 {
        self.tasks.values().map(|t| t.end_time).max().unwrap_or(0)
    }

    /// Pre-calculates every not-yet-calculated DRIVING task on this
    /// vehicle's timeline via `ride`, the same way the Evaluator precomputes
    /// its bracketing driving legs. Without this, a freshly loaded schedule's
    /// `delta_soc` reads as zero and [`Vehicle::predicted_soc`] can't see
    /// upcoming consumption — this makes the Resolver's SoC lookahead
    /// accurate before it decides whether any charging is needed.
    pub fn precalculate_driving_tasks(&mut self, ride: &crate::ride::RideCalc, steps_per_hour: f64) -> SimResult<()> {
        let pending: Vec<i64> = self.tasks.iter().filter(|(_, t)| t.kind == TaskKind::Driving && !t.is_calculated).map(|(k, _)| *k).collect();
        for key in pending {
            let mut task = self.tasks.remove(&key).expect("key just found by iter()");
            let hour = ((task.start_time as f64 / steps_per_hour) as i64).rem_euclid(24) as usize;
            let trip = ride.calculate_trip(&self.vehicle_type.name, self.vehicle_type.battery_capacity_kwh, &task.start_point, &task.end_point, task.level_of_loading, ride.average_speed, hour)?;
            task.delta_soc = trip.soc_delta;
            task.consumption = trip.consumption_kwh;
            task.float_time = trip.trip_time_minutes;
            task.is_calculated = true;
            self.tasks.insert(key, task);
        }
        self.charging_list = None;
        Ok(())
    }

    /// End-point of the task ending at-or-before `t`, falling back to the
    /// vehicle's starting location when no such task exists.
    fn location_before(&self, t: i64) -> String {
        self.tasks
            .values()
            .filter(|task| task.end_time <= t)
            .next_back()
            .map(|task| task.end_point.clone())
            .unwrap_or_else(|| self.current_location.clone())
    }

    /// Derives BREAK tasks covering every gap between consecutive DRIVING
    /// tasks within `[start, end)`, plus leading/trailing gaps against the
    /// window. Non-driving tasks already on the timeline (e.g. previously
    /// committed CHARGING tasks) do not terminate a break.
    pub fn get_breaks(&self, start: i64, end: i64) -> Vec<Task> {
        let mut driving: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.kind == TaskKind::Driving && t.start_time < end && t.end_time > start)
            .collect();
        driving.sort_by_key(|t| t.start_time);

        let mut breaks = Vec::new();
        let mut cursor_time = start;
        let mut cursor_point = self.location_before(start);
        for task in driving {
            if task.start_time > cursor_time {
                breaks.push(Task::break_task(cursor_time, task.start_time, cursor_point.clone()));
            }
            cursor_time = task.end_time.max(cursor_time);
            cursor_point = task.end_point.clone();
        }
        if cursor_time < end {
            breaks.push(Task::break_task(cursor_time, end, cursor_point));
        }
        breaks
    }

    /// Executes a DRIVING task: preconditions `new_soc <= current_soc` and
    /// `new_soc > 0` (else `EmptyBattery`); updates SoC and location and
    /// appends an output row.
    #[allow(clippy::too_many_arguments)]
    pub fn drive(
        &mut self,
        ts: i64,
        start: i64,
        duration: f64,
        destination: &str,
        new_soc: f64,
        distance: f64,
        level_of_loading: f64,
        consumption: f64,
    ) -> SimResult<()> {
        if new_soc > self.current_soc + 1e-9 {
            return Err(SimError::BadInput(format!(
                "drive() for vehicle {} would increase soc from {} to {new_soc}",
                self.id, self.current_soc
            )));
        }
        if new_soc <= 0.0 {
            return Err(SimError::EmptyBattery { vehicle_id: self.id.clone(), timestep: ts });
        }
        let soc_start = self.current_soc;
        self.current_soc = new_soc;
        self.current_location = destination.to_string();
        self.output.push(OutputRow {
            timestamp: ts,
            event_start: start,
            event_time: duration,
            end_location: destination.to_string(),
            status: TaskKind::Driving.to_string(),
            soc_start,
            soc_end: new_soc,
            energy: 0.0,
            actual_energy_from_grid: 0.0,
            station_charging_capacity: 0.0,
            average_charging_power: 0.0,
            distance,
            energy_from_feed_in: 0.0,
            energy_from_grid: 0.0,
            energy_cost: 0.0,
            emission: 0.0,
            consumption,
            level_of_loading,
            v2g_energy: 0.0,
        });
        Ok(())
    }

    /// Executes a CHARGING task from a summarized [`crate::emcs::ChargingOutcome`].
    #[allow(clippy::too_many_arguments)]
    pub fn charge(
        &mut self,
        ts: i64,
        start: i64,
        duration: f64,
        avg_power_kw: f64,
        new_soc: f64,
        station_power_kw: f64,
        outcome: &crate::emcs::ChargingOutcome,
    ) -> SimResult<()> {
        if new_soc + 1e-9 < self.current_soc {
            return Err(SimError::BadInput(format!(
                "charge() for vehicle {} would decrease soc from {} to {new_soc}",
                self.id, self.current_soc
            )));
        }
        let soc_start = self.current_soc;
        let energy = (new_soc - soc_start) * self.vehicle_type.battery_capacity_kwh;
        let energy_from_feed_in = energy * outcome.feed_in_share;
        let energy_from_grid = energy - energy_from_feed_in;
        self.current_soc = new_soc;
        self.output.push(OutputRow {
            timestamp: ts,
            event_start: start,
            event_time: duration,
            end_location: self.current_location.clone(),
            status: TaskKind::Charging.to_string(),
            soc_start,
            soc_end: new_soc,
            energy,
            actual_energy_from_grid: outcome.grid_energy_kwh,
            station_charging_capacity: station_power_kw,
            average_charging_power: avg_power_kw,
            distance: 0.0,
            energy_from_feed_in,
            energy_from_grid,
            energy_cost: outcome.cost,
            emission: outcome.emission,
            consumption: 0.0,
            level_of_loading: 0.0,
            v2g_energy: if energy < 0.0 { -energy } else { 0.0 },
        });
        Ok(())
    }

    /// Executes a PARKING (or BREAK) task: no SoC change, zero-energy row.
    pub fn park(&mut self, ts: i64, start: i64, duration: f64) {
        self.output.push(OutputRow {
            timestamp: ts,
            event_start: start,
            event_time: duration,
            end_location: self.current_location.clone(),
            status: TaskKind::Parking.to_string(),
            soc_start: self.current_soc,
            soc_end: self.current_soc,
            energy: 0.0,
            actual_energy_from_grid: 0.0,
            station_charging_capacity: 0.0,
            average_charging_power: 0.0,
            distance: 0.0,
            energy_from_feed_in: 0.0,
            energy_from_grid: 0.0,
            energy_cost: 0.0,
            emission: 0.0,
            consumption: 0.0,
            level_of_loading: 0.0,
            v2g_energy: 0.0,
        });
    }

    /// Per-vehicle EmCS scenario fragment: battery capacity, curve, mileage,
    /// min charging power, V2G flags, desired SoC (always 1), current SoC.
    pub fn scenario_info(&self) -> serde_json::Value {
        json!({
            "vehicles": {
                self.id.clone(): {
                    "battery": { "capacity": self.vehicle_type.battery_capacity_kwh, "charging_curve": self.vehicle_type.charging_curve },
                    "min_charging_power": self.vehicle_type.min_charging_power,
                    "v2g": self.vehicle_type.v2g,
                    "v2g_power_factor": self.vehicle_type.v2g_power_factor,
                    "desired_soc": 1.0,
                    "soc": self.current_soc,
                }
            }
        })
    }
}
