//! Resolver: greedy round-robin charging-slot allocation across the fleet.
//!
//! Reproduces `get_next_index(i, len(vehicles))`'s round-robin arithmetic —
//! the index advance happens modulo the *current*, possibly-shrunk, working
//! set, so the same numeric index can point at a different vehicle on the
//! next iteration.

use std::collections::HashMap;

use crate::emcs::ChargingSimulator;
use crate::error::{SimError, SimResult};
use crate::evaluator::{Candidate, EvaluatorContext, Weights, evaluate_charging_location};
use crate::model::location::Location;
use crate::model::vehicle::Vehicle;
use crate::ride::RideCalc;

/// Per-scenario parameters shared by every candidate evaluation this run.
pub struct ResolverParams<'a> {
    pub ride: &'a RideCalc,
    pub simulator: &'a dyn ChargingSimulator,
    pub weights: Weights,
    pub min_price: f64,
    pub max_price: f64,
    pub charging_step_size_minutes: f64,
    pub alt_strategy_min_standing_time: f64,
    pub steps_per_hour: f64,
    pub feed_in_price_per_kwh: f64,
    pub price_per_kwh: &'a [f64],
    pub feed_in_kw: &'a [f64],
    pub emission_per_kwh: Option<&'a [f64]>,
    pub soc_min: f64,
    pub end_of_day_soc: f64,
    pub delete_rides: bool,
}

/// Resolves charging demand for every vehicle over `[start, end)`.
pub struct Resolver;

impl Resolver {
    /// Greedy round-robin allocation across the whole fleet: each pass
    /// commits at most one candidate per vehicle, draining vehicles that
    /// have nothing left to satisfy out of the working set.
    pub fn resolve(
        vehicles: &mut [Vehicle],
        locations: &mut HashMap<String, Location>,
        charger_names: &[String],
        start: i64,
        end: i64,
        params: &ResolverParams,
    ) -> SimResult<()> {
        let mut working: Vec<usize> = (0..vehicles.len()).collect();
        if working.is_empty() {
            return Ok(());
        }
        let mut i = 0usize;
        while !working.is_empty() {
            let slot = i % working.len();
            let vehicle_idx = working[slot];
            let next = Self::find_next_charging_slot(&mut vehicles[vehicle_idx], locations, charger_names, start, end, params)?;
            match next {
                Some(candidate) => {
                    Self::commit_candidate(&mut vehicles[vehicle_idx], locations, candidate)?;
                    i = (slot + 1) % working.len();
                }
                None => {
                    working.remove(slot);
                    if working.is_empty() {
                        break;
                    }
                    i = slot % working.len();
                }
            }
        }
        Ok(())
    }

    /// Builds and caches the score-sorted candidate list for one vehicle,
    /// evaluating every charging Location against every derived break.
    fn ensure_candidates(
        vehicle: &mut Vehicle,
        locations: &HashMap<String, Location>,
        charger_names: &[String],
        start: i64,
        end: i64,
        params: &ResolverParams,
    ) -> SimResult<()> {
        if vehicle.charging_list.is_some() {
            return Ok(());
        }
        let plug_kinds = vehicle.vehicle_type.plugs();
        let mut candidates: Vec<Candidate> = Vec::new();
        for brk in vehicle.get_breaks(start, end) {
            let current_soc = vehicle.soc_at(brk.start_time);
            let mut best: Option<Candidate> = None;
            for charger_name in charger_names {
                let Some(loc) = locations.get(charger_name) else { continue };
                let station_power_kw = loc
                    .chargers
                    .iter()
                    .flat_map(|c| c.points.iter())
                    .map(|p| p.power_for(&plug_kinds))
                    .fold(0.0, f64::max);
                if station_power_kw <= 0.0 {
                    continue;
                }
                let hour = ((brk.start_time as f64 / params.steps_per_hour) as i64).rem_euclid(24) as usize;
                let ctx = EvaluatorContext {
                    ride: params.ride,
                    weights: params.weights,
                    min_price: params.min_price,
                    max_price: params.max_price,
                    charging_step_size_minutes: params.charging_step_size_minutes,
                    alt_strategy_min_standing_time: params.alt_strategy_min_standing_time,
                    station_power_kw,
                    plug_kinds: &plug_kinds,
                    hour,
                    feed_in_price_per_kwh: params.feed_in_price_per_kwh,
                    price_per_kwh: params.price_per_kwh,
                    feed_in_kw: params.feed_in_kw,
                    emission_per_kwh: params.emission_per_kwh,
                };
                let candidate = evaluate_charging_location(
                    &vehicle.vehicle_type,
                    params.simulator,
                    &ctx,
                    charger_name,
                    &brk.start_point,
                    &brk.end_point,
                    brk.start_time,
                    brk.end_time,
                    current_soc,
                )?;
                if best.as_ref().map(|b| candidate.rank_key() > b.rank_key()).unwrap_or(true) {
                    best = Some(candidate);
                }
            }
            if let Some(candidate) = best {
                if candidate.charge_event.is_some() {
                    candidates.push(candidate);
                }
            }
        }
        candidates.sort_by(|a, b| b.rank_key().cmp(&a.rank_key()));
        vehicle.set_charging_list(candidates);
        Ok(())
    }

    /// Finds the single best next charging slot for one vehicle, or `None`
    /// if the vehicle's SoC needs are already satisfied (or cannot be
    /// improved and the miss is tolerated).
    fn find_next_charging_slot(
        vehicle: &mut Vehicle,
        locations: &HashMap<String, Location>,
        charger_names: &[String],
        start: i64,
        end: i64,
        params: &ResolverParams,
    ) -> SimResult<Option<Candidate>> {
        Self::ensure_candidates(vehicle, locations, charger_names, start, end, params)?;

        let trace = vehicle.predicted_soc(start, end);
        let last_soc = trace.last().map(|(_, soc)| *soc).unwrap_or_else(|| vehicle.soc_at(end));
        let min_charge_needed = (params.soc_min - last_soc).max(0.0);
        let end_of_day_needed = (params.end_of_day_soc - last_soc).max(0.0);
        if min_charge_needed <= 0.0 && end_of_day_needed <= 0.0 {
            return Ok(None);
        }

        let chosen_index = vehicle.charging_list.as_ref().and_then(|list| {
            list.iter().position(|candidate| {
                let Some(event) = &candidate.charge_event else { return false };
                locations.get(&event.start_point).map(|loc| loc.is_available(event.start_time, event.end_time)).unwrap_or(false)
            })
        });

        let Some(idx) = chosen_index else {
            if min_charge_needed <= 0.0 {
                tracing::warn!(vehicle = %vehicle.id, "end-of-day SoC target missed, no available charging candidate");
                return Ok(None);
            }
            return Self::handle_infeasible(vehicle, start, end, params);
        };

        let candidate = vehicle.charging_list.as_mut().expect("ensured above").remove(idx);
        if candidate.score > 0.0 {
            Ok(Some(candidate))
        } else if min_charge_needed <= 0.0 {
            tracing::warn!(vehicle = %vehicle.id, "end-of-day SoC target missed, best remaining candidate scored zero");
            Ok(None)
        } else {
            Self::handle_infeasible(vehicle, start, end, params)
        }
    }

    fn handle_infeasible(vehicle: &mut Vehicle, start: i64, end: i64, params: &ResolverParams) -> SimResult<Option<Candidate>> {
        if !params.delete_rides {
            return Err(SimError::Infeasible {
                vehicle_id: vehicle.id.clone(),
                reason: "no available charging candidate can satisfy soc_min".to_string(),
            });
        }
        if vehicle.delete_ride(start, end) {
            tracing::warn!(vehicle = %vehicle.id, start, end, "deleted a ride to resolve an infeasible charging requirement");
        }
        Ok(None)
    }

    /// Commits a resolved candidate: inserts its tasks into the vehicle's
    /// timeline and marks the charger Location occupied over the window.
    fn commit_candidate(vehicle: &mut Vehicle, locations: &mut HashMap<String, Location>, candidate: Candidate) -> SimResult<()> {
        let Some(charge_event) = candidate.charge_event else {
            return Ok(());
        };
        if let Some(task) = candidate.task_to {
            vehicle.add_task(task)?;
        }
        if let Some(loc) = locations.get_mut(&charge_event.start_point) {
            loc.add_occupation(charge_event.start_time, charge_event.end_time);
        }
        vehicle.add_task(charge_event)?;
        if let Some(task) = candidate.task_from {
            vehicle.add_task(task)?;
        }
        Ok(())
    }
}
