//! EmCS adapter: opaque charging-subroutine contract and output summarization.
//!
//! The low-level charging controller is treated as an external, opaque
//! subroutine. This module defines that contract as a trait,
//! [`ChargingSimulator`], with one concrete, self-contained implementation,
//! [`GreedyChargingSimulator`].

use crate::error::SimResult;

/// Charging strategy selected for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Charge at maximum available power until full or the window ends.
    Greedy,
    /// Spread the remaining energy need evenly across the window.
    Balanced,
}

/// Selects `alternative_strategy` when the window exceeds
/// `alt_strategy_min_standing_time`, else the default `charging_strategy`.
pub fn select_strategy(window_minutes: f64, alt_strategy_min_standing_time: f64) -> Strategy {
    if window_minutes > alt_strategy_min_standing_time {
        Strategy::Balanced
    } else {
        Strategy::Greedy
    }
}

/// Input to one EmCS invocation over `[start, end)` at a fixed location.
pub struct ChargingRequest {
    pub start: i64,
    pub end: i64,
    pub step_minutes: f64,
    pub strategy: Strategy,
    pub location_power_kw: f64,
    pub vehicle_max_power_kw: f64,
    pub start_soc: f64,
    pub battery_capacity_kwh: f64,
    pub v2g: bool,
    pub v2g_power_factor: f64,
    /// Price per kWh, one entry per step in `[start, end)`.
    pub price_per_kwh: Vec<f64>,
    /// Local generation available in kW, one entry per step.
    pub feed_in_kw: Vec<f64>,
    pub feed_in_price_per_kwh: f64,
    /// Emission factor per kWh, one entry per step, if configured.
    pub emission_per_kwh: Option<Vec<f64>>,
    /// Minimum resolvable window, in minutes; shorter windows return `None`.
    pub charging_step_size_minutes: f64,
}

/// Summary of one (possibly multi-fragment) charging outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargingOutcome {
    pub cost: f64,
    pub feed_in_share: f64,
    pub emission: f64,
    pub grid_energy_kwh: f64,
}

impl ChargingOutcome {
    /// Weight-averages feed-in share by grid energy when summing fragments
    /// from a split window.
    pub fn combine(parts: &[(Self, f64)]) -> Self {
        let mut cost = 0.0;
        let mut emission = 0.0;
        let mut grid_energy_kwh = 0.0;
        let mut weighted_feed_in = 0.0;
        for (outcome, _final_soc) in parts {
            cost += outcome.cost;
            emission += outcome.emission;
            grid_energy_kwh += outcome.grid_energy_kwh;
            weighted_feed_in += outcome.feed_in_share * outcome.grid_energy_kwh;
        }
        let feed_in_share = if grid_energy_kwh > 0.0 { (weighted_feed_in / grid_energy_kwh).min(1.0) } else { 0.0 };
        Self { cost, feed_in_share, emission, grid_energy_kwh }
    }
}

/// Result of a charging subroutine invocation: the summarized outcome plus
/// the SoC the vehicle ends the window at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargingResult {
    pub outcome: ChargingOutcome,
    pub final_soc: f64,
}

/// The embedded low-level charging subroutine contract.
pub trait ChargingSimulator {
    /// Runs one charging window. Returns `Ok(None)` if the window is below
    /// `charging_step_size_minutes` rather than raising an error.
    fn run(&self, request: &ChargingRequest) -> SimResult<Option<ChargingResult>>;
}

/// Deterministic reference charging subroutine. Charges at the vehicle's
/// curve-limited power each step, capped by station power and (for V2G
/// vehicles) discharges into attractive price spikes.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyChargingSimulator;

impl ChargingSimulator for GreedyChargingSimulator {
    fn run(&self, request: &ChargingRequest) -> SimResult<Option<ChargingResult>> {
        let window_minutes = (request.end - request.start) as f64 * request.step_minutes;
        if window_minutes < request.charging_step_size_minutes {
            return Ok(None);
        }

        let n_steps = (request.end - request.start).max(0) as usize;
        let steps_per_hour = 60.0 / request.step_minutes;
        let cap_kw = request.vehicle_max_power_kw.min(request.location_power_kw);
        let avg_price = if request.price_per_kwh.is_empty() {
            0.0
        } else {
            request.price_per_kwh.iter().sum::<f64>() / request.price_per_kwh.len() as f64
        };
        let spike_threshold = avg_price * 1.5;

        let mut soc = request.start_soc;
        let mut total_charge_kw_steps = 0.0;
        let mut charge_from_feed_in_kw_steps = 0.0;
        let mut cost = 0.0;
        let mut emission = 0.0;

        for i in 0..n_steps {
            let price = request.price_per_kwh.get(i).copied().unwrap_or(0.0);
            let feed_in = request.feed_in_kw.get(i).copied().unwrap_or(0.0);

            let c = if request.v2g && price > spike_threshold && soc > 0.1 {
                -(cap_kw * request.v2g_power_factor)
            } else if soc >= 1.0 {
                0.0
            } else {
                match request.strategy {
                    Strategy::Greedy => cap_kw,
                    Strategy::Balanced => {
                        let remaining_kwh = (1.0 - soc) * request.battery_capacity_kwh;
                        let remaining_steps = (n_steps - i) as f64;
                        (remaining_kwh * steps_per_hour / remaining_steps.max(1.0)).min(cap_kw)
                    }
                }
            };

            total_charge_kw_steps += c;
            charge_from_feed_in_kw_steps += c.min(feed_in);
            cost += (((c - feed_in).max(0.0)) * price + c.min(feed_in) * request.feed_in_price_per_kwh) / steps_per_hour;
            if let Some(emission_series) = &request.emission_per_kwh {
                let e = emission_series.get(i).copied().unwrap_or(0.0);
                emission += (c - feed_in).max(0.0) * e / steps_per_hour;
            }

            soc += c / steps_per_hour / request.battery_capacity_kwh;
            soc = soc.clamp(-1.0, 1.0);
        }

        let feed_in_share = if total_charge_kw_steps > 0.0 {
            (charge_from_feed_in_kw_steps / total_charge_kw_steps).min(1.0)
        } else {
            0.0
        };
        let grid_energy_kwh = total_charge_kw_steps / steps_per_hour;

        Ok(Some(ChargingResult {
            outcome: ChargingOutcome { cost, feed_in_share, emission, grid_energy_kwh },
            final_soc: soc,
        }))
    }
}
