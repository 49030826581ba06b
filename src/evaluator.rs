//! Evaluator: scores one candidate charging stop against one break.

use crate::emcs::{ChargingRequest, ChargingSimulator, select_strategy};
use crate::error::SimResult;
use crate::model::task::{Task, TaskKind};
use crate::model::vehicle::VehicleType;
use crate::ride::RideCalc;

/// Composite scoring weights, one factor per score component.
#[derive(Debug, Clone, Copy)]
pub struct Weights {
    pub time_factor: f64,
    pub energy_factor: f64,
    pub cost_factor: f64,
    pub local_renewables_factor: f64,
    pub soc_factor: f64,
}

/// Fixed per-scenario parameters an evaluation needs beyond the break itself.
pub struct EvaluatorContext<'a> {
    pub ride: &'a RideCalc,
    pub weights: Weights,
    pub min_price: f64,
    pub max_price: f64,
    pub charging_step_size_minutes: f64,
    pub alt_strategy_min_standing_time: f64,
    pub station_power_kw: f64,
    pub plug_kinds: &'a [String],
    pub hour: usize,
    pub feed_in_price_per_kwh: f64,
    pub price_per_kwh: &'a [f64],
    pub feed_in_kw: &'a [f64],
    pub emission_per_kwh: Option<&'a [f64]>,
}

/// One scored, fully specified proposal to charge a vehicle during a break.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub timestep: i64,
    pub score: f64,
    pub consumption: f64,
    pub charge: f64,
    pub delta_soc: f64,
    pub charge_event: Option<Task>,
    pub task_to: Option<Task>,
    pub task_from: Option<Task>,
}

impl Candidate {
    fn empty(timestep: i64) -> Self {
        Self { timestep, score: 0.0, consumption: 0.0, charge: 0.0, delta_soc: 0.0, charge_event: None, task_to: None, task_from: None }
    }

    /// Sort key for ranking candidates: highest score first, then highest
    /// delta_soc, then highest charge, then lowest consumption.
    pub fn rank_key(&self) -> (i64, i64, i64, i64) {
        let to_ord = |x: f64| (x * 1e6) as i64;
        (to_ord(self.score), to_ord(self.delta_soc), to_ord(self.charge), -to_ord(self.consumption))
    }
}

/// Scores charging at `charger_loc` during the window `[start, end)` that
/// bridges `current_loc` (where the vehicle already is) and `next_loc`
/// (where it must be by `end`).
#[allow(clippy::too_many_arguments)]
pub fn evaluate_charging_location(
    vt: &VehicleType,
    simulator: &dyn ChargingSimulator,
    ctx: &EvaluatorContext,
    charger_loc: &str,
    current_loc: &str,
    next_loc: &str,
    start: i64,
    end: i64,
    current_soc: f64,
) -> SimResult<Candidate> {
    let trip_to = ctx.ride.calculate_trip(&vt.name, vt.battery_capacity_kwh, current_loc, charger_loc, 0.0, ctx.ride.average_speed, ctx.hour)?;
    let trip_from = ctx.ride.calculate_trip(&vt.name, vt.battery_capacity_kwh, charger_loc, next_loc, 0.0, ctx.ride.average_speed, ctx.hour)?;

    let driving_time = trip_to.trip_time_minutes.ceil() as i64 + trip_from.trip_time_minutes.ceil() as i64;
    let drive_soc = trip_to.soc_delta + trip_from.soc_delta;

    let window = end - start;
    if window <= 0 {
        return Ok(Candidate::empty(start));
    }
    let time_score = 1.0 - driving_time as f64 / window as f64;
    if time_score <= 0.0 {
        return Ok(Candidate::empty(start));
    }

    let charging_start = start + trip_to.trip_time_minutes.round() as i64;
    let charging_window = window - driving_time;

    let soc_at_charger = (current_soc + trip_to.soc_delta).max(0.0);
    let strategy = select_strategy(charging_window as f64, ctx.alt_strategy_min_standing_time);
    let request = ChargingRequest {
        start: charging_start,
        end: charging_start + charging_window,
        step_minutes: 1.0,
        strategy,
        location_power_kw: ctx.station_power_kw,
        vehicle_max_power_kw: vt.max_power_at(soc_at_charger),
        start_soc: soc_at_charger,
        battery_capacity_kwh: vt.battery_capacity_kwh,
        v2g: vt.v2g,
        v2g_power_factor: vt.v2g_power_factor,
        price_per_kwh: ctx.price_per_kwh.to_vec(),
        feed_in_kw: ctx.feed_in_kw.to_vec(),
        feed_in_price_per_kwh: ctx.feed_in_price_per_kwh,
        emission_per_kwh: ctx.emission_per_kwh.map(|s| s.to_vec()),
        charging_step_size_minutes: ctx.charging_step_size_minutes,
    };

    let Some(result) = simulator.run(&request)? else {
        return Ok(Candidate::empty(start));
    };

    let charged_soc = result.final_soc - soc_at_charger;
    if charged_soc <= 0.0 && !vt.v2g {
        return Ok(Candidate::empty(start));
    }
    let charge_score = if charged_soc.abs() < 1e-9 {
        0.0
    } else {
        (1.0 - (-drive_soc) / charged_soc).max(0.0)
    };

    let charged_energy = charged_soc * vt.battery_capacity_kwh;
    let cost_score = if charged_energy > 0.0 && ctx.max_price > ctx.min_price {
        ((ctx.max_price - result.outcome.cost / charged_energy) / (ctx.max_price - ctx.min_price)).max(0.0)
    } else if vt.v2g && result.outcome.cost < 0.0 && ctx.max_price > ctx.min_price {
        ((ctx.max_price - result.outcome.cost) / (ctx.max_price - ctx.min_price)).max(0.0)
    } else {
        0.0
    };

    let renewables_score = result.outcome.feed_in_share;
    let soc_score = if current_soc < 0.8 { 0.1 } else { 0.0 };

    let score = ctx.weights.time_factor * time_score
        + ctx.weights.energy_factor * charge_score
        + ctx.weights.cost_factor * cost_score
        + ctx.weights.local_renewables_factor * renewables_score
        + ctx.weights.soc_factor * soc_score;
    if score <= 0.0 {
        return Ok(Candidate::empty(start));
    }

    let charge_event = Task::charging(charging_start, charging_start + charging_window, charger_loc, charged_soc, charged_energy);

    let task_to = (current_loc != charger_loc).then(|| {
        let mut t = Task::driving(start, charging_start, current_loc, charger_loc, 0.0);
        t.float_time = trip_to.trip_time_minutes;
        t.delta_soc = trip_to.soc_delta;
        t.consumption = trip_to.consumption_kwh;
        t.is_calculated = true;
        t
    });
    let task_from = (charger_loc != next_loc).then(|| {
        let mut t = Task::driving(charging_start + charging_window, end, charger_loc, next_loc, 0.0);
        t.float_time = trip_from.trip_time_minutes;
        t.delta_soc = trip_from.soc_delta;
        t.consumption = trip_from.consumption_kwh;
        t.is_calculated = true;
        t
    });

    Ok(Candidate {
        timestep: charging_start,
        score,
        consumption: charged_energy,
        charge: charged_energy,
        delta_soc: charged_soc,
        charge_event: Some(charge_event),
        task_to,
        task_from,
    })
}
