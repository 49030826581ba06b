//! RideCalc: n-dimensional consumption interpolation and trip calculation.

use std::collections::HashMap;

use crate::error::{SimError, SimResult};

/// One row of the tidy consumption lookup table.
///
/// `consumption` is signed such that negating it gives a positive kWh/km
/// figure — `calculate_consumption` performs that negation.
#[derive(Debug, Clone)]
pub struct ConsumptionRow {
    pub vehicle_type: String,
    pub level_of_loading: f64,
    pub incline: f64,
    pub mean_speed: f64,
    pub t_amb: f64,
    pub consumption: f64,
}

/// Default values substituted for out-of-range query inputs.
#[derive(Debug, Clone)]
pub struct Defaults {
    pub level_of_loading: f64,
    pub incline: f64,
    pub temperature: f64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self { level_of_loading: 0.0, incline: 0.0, temperature: 20.0 }
    }
}

/// Outcome of one trip calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trip {
    pub consumption_kwh: f64,
    pub soc_delta: f64,
    pub trip_time_minutes: f64,
}

impl Trip {
    pub fn zero() -> Self {
        Self { consumption_kwh: 0.0, soc_delta: 0.0, trip_time_minutes: 0.0 }
    }
}

/// Precomputed per-axis sorted unique grids plus the tidy rows themselves.
pub struct ConsumptionTable {
    rows: Vec<ConsumptionRow>,
    loading_grid: Vec<f64>,
    incline_grid: Vec<f64>,
    speed_grid: Vec<f64>,
    temp_grid: Vec<f64>,
}

fn sorted_unique(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| a.partial_cmp(b).expect("non-NaN consumption axis"));
    values.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    values
}

/// Axis bracket: `(lower, upper)`. Constant-value extrapolation at the
/// boundaries; exact grid hits collapse both bounds to that value.
fn bracket(grid: &[f64], x: f64) -> (f64, f64) {
    if grid.is_empty() {
        return (x, x);
    }
    let min = grid[0];
    let max = grid[grid.len() - 1];
    if x <= min {
        return (min, min);
    }
    if x >= max {
        return (max, max);
    }
    if let Some(&v) = grid.iter().find(|&&v| (v - x).abs() < 1e-9) {
        return (v, v);
    }
    for w in grid.windows(2) {
        if w[0] <= x && x <= w[1] {
            return (w[0], w[1]);
        }
    }
    (min, max)
}

/// Point in the 4-D interpolation space plus the accumulated output value.
type BoxRow = [f64; 5];

impl ConsumptionTable {
    pub fn from_rows(rows: Vec<ConsumptionRow>) -> Self {
        let loading_grid = sorted_unique(rows.iter().map(|r| r.level_of_loading).collect());
        let incline_grid = sorted_unique(rows.iter().map(|r| r.incline).collect());
        let speed_grid = sorted_unique(rows.iter().map(|r| r.mean_speed).collect());
        let temp_grid = sorted_unique(rows.iter().map(|r| r.t_amb).collect());
        Self { rows, loading_grid, incline_grid, speed_grid, temp_grid }
    }

    /// n-D linear interpolation over `(level_of_loading, incline, mean_speed, t_amb)`.
    ///
    /// Returns the signed table `consumption` value (not yet negated into
    /// positive kWh/km — that happens in [`RideCalc::calculate_consumption`]).
    pub fn interpolate(&self, vehicle_type: &str, loading: f64, incline: f64, speed: f64, t_amb: f64) -> Option<f64> {
        let (lo_l, hi_l) = bracket(&self.loading_grid, loading);
        let (lo_i, hi_i) = bracket(&self.incline_grid, incline);
        let (lo_s, hi_s) = bracket(&self.speed_grid, speed);
        let (lo_t, hi_t) = bracket(&self.temp_grid, t_amb);

        let on_boundary = |v: f64, lo: f64, hi: f64| (v - lo).abs() < 1e-9 || (v - hi).abs() < 1e-9;
        let mut box_rows: Vec<BoxRow> = self
            .rows
            .iter()
            .filter(|r| {
                r.vehicle_type == vehicle_type
                    && on_boundary(r.level_of_loading, lo_l, hi_l)
                    && on_boundary(r.incline, lo_i, hi_i)
                    && on_boundary(r.mean_speed, lo_s, hi_s)
                    && on_boundary(r.t_amb, lo_t, hi_t)
            })
            .map(|r| [r.level_of_loading, r.incline, r.mean_speed, r.t_amb, r.consumption])
            .collect();
        if box_rows.is_empty() {
            return None;
        }

        box_rows = collapse_axis(box_rows, 0, loading);
        box_rows = collapse_axis(box_rows, 1, incline);
        box_rows = collapse_axis(box_rows, 2, speed);
        box_rows = collapse_axis(box_rows, 3, t_amb);

        box_rows.first().map(|r| r[4])
    }
}

/// Collapses the box of candidate rows along one axis: pairs of rows that
/// differ only in `axis` are linearly interpolated at `x` and replaced by a
/// single synthesized row; singleton rows (degenerate axis) pass through.
fn collapse_axis(rows: Vec<BoxRow>, axis: usize, x: f64) -> Vec<BoxRow> {
    let mut result = Vec::with_capacity(rows.len());
    let mut used = vec![false; rows.len()];
    for i in 0..rows.len() {
        if used[i] {
            continue;
        }
        let mut partner = None;
        for j in (i + 1)..rows.len() {
            if used[j] {
                continue;
            }
            let same_other_axes = (0..4).filter(|&k| k != axis).all(|k| (rows[i][k] - rows[j][k]).abs() < 1e-9);
            if same_other_axes && (rows[i][axis] - rows[j][axis]).abs() > 1e-9 {
                partner = Some(j);
                break;
            }
        }
        used[i] = true;
        match partner {
            Some(j) => {
                used[j] = true;
                let (lo_row, hi_row) = if rows[i][axis] < rows[j][axis] { (rows[i], rows[j]) } else { (rows[j], rows[i]) };
                let lo = lo_row[axis];
                let hi = hi_row[axis];
                let frac = if (hi - lo).abs() < 1e-9 { 0.0 } else { (x - lo) / (hi - lo) };
                let mut merged = lo_row;
                merged[4] = lo_row[4] + frac * (hi_row[4] - lo_row[4]);
                merged[axis] = x;
                result.push(merged);
            }
            None => result.push(rows[i]),
        }
    }
    result
}

/// Square distance or incline matrix indexed by location name. Self-loops
/// default to zero; directed (A->B may differ from B->A).
#[derive(Debug, Clone, Default)]
pub struct RouteMatrix {
    entries: HashMap<(String, String), f64>,
}

impl RouteMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>, value: f64) {
        self.entries.insert((from.into(), to.into()), value);
    }

    pub fn get(&self, from: &str, to: &str) -> SimResult<f64> {
        if from == to {
            return Ok(0.0);
        }
        self.entries
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .ok_or_else(|| SimError::BadInput(format!("no route matrix entry for {from} -> {to}")))
    }
}

/// Daily ambient-temperature profile: 24 hourly samples per named column.
#[derive(Debug, Clone, Default)]
pub struct TemperatureTable {
    columns: Vec<(String, Vec<f64>)>,
}

impl TemperatureTable {
    pub fn new(columns: Vec<(String, Vec<f64>)>) -> Self {
        Self { columns }
    }

    /// Samples the configured column at `hour`; falls back to the second
    /// column (index 1) with a warning if `column` is missing, and to the
    /// fixed canonical-noon default if no columns are loaded at all.
    pub fn sample(&self, column: &str, hour: usize, fallback_noon: f64) -> f64 {
        if let Some((_, series)) = self.columns.iter().find(|(name, _)| name == column) {
            return series.get(hour % 24.max(1)).copied().unwrap_or(fallback_noon);
        }
        if let Some((name, series)) = self.columns.get(1) {
            tracing::warn!(requested = column, fallback = name, "temperature column missing, using fallback");
            return series.get(hour % 24.max(1)).copied().unwrap_or(fallback_noon);
        }
        fallback_noon
    }
}

/// Interpolates per-km energy and converts routes into [`Trip`]s.
pub struct RideCalc {
    pub consumption: ConsumptionTable,
    pub distance: RouteMatrix,
    pub incline: RouteMatrix,
    pub temperature: TemperatureTable,
    pub temperature_column: String,
    pub defaults: Defaults,
    /// Average driving speed (km/h); must be strictly positive.
    pub average_speed: f64,
}

const CANONICAL_NOON_TEMPERATURE: f64 = 20.0;

impl RideCalc {
    pub fn new(
        consumption: ConsumptionTable,
        distance: RouteMatrix,
        incline: RouteMatrix,
        temperature: TemperatureTable,
        temperature_column: impl Into<String>,
        defaults: Defaults,
        average_speed: f64,
    ) -> SimResult<Self> {
        if average_speed <= 0.0 {
            return Err(SimError::BadInput("average_speed must be strictly positive".to_string()));
        }
        Ok(Self {
            consumption,
            distance,
            incline,
            temperature,
            temperature_column: temperature_column.into(),
            defaults,
            average_speed,
        })
    }

    /// Samples ambient temperature for an hour-of-day index.
    pub fn get_temperature(&self, hour: usize) -> f64 {
        self.temperature.sample(&self.temperature_column, hour, CANONICAL_NOON_TEMPERATURE)
    }

    /// `trip_time = max(distance / speed * 60, 1)` minutes.
    fn trip_time_minutes(distance_km: f64, speed_kmh: f64) -> f64 {
        (distance_km / speed_kmh * 60.0).max(1.0)
    }

    /// Converts the signed table lookup to a positive kWh/km figure and
    /// scales by distance and battery capacity to get a Trip.
    fn calculate_consumption(&self, vehicle_type: &str, battery_capacity_kwh: f64, distance_km: f64, loading: f64, incline: f64, speed: f64, t_amb: f64) -> Trip {
        let per_km = -self
            .consumption
            .interpolate(vehicle_type, loading, incline, speed, t_amb)
            .unwrap_or(0.0);
        let consumption_kwh = per_km * distance_km;
        let soc_delta = -(consumption_kwh / battery_capacity_kwh);
        let trip_time_minutes = Self::trip_time_minutes(distance_km, speed);
        Trip { consumption_kwh, soc_delta, trip_time_minutes }
    }

    /// Computes a full trip between two named locations for a vehicle type.
    ///
    /// `distance == 0` short-circuits to a zero trip; `distance < 0` raises
    /// `BadInput`. Invalid `level_of_loading`/`speed` are replaced by
    /// configured defaults with a warning rather than rejected.
    pub fn calculate_trip(
        &self,
        vehicle_type: &str,
        battery_capacity_kwh: f64,
        origin: &str,
        destination: &str,
        level_of_loading: f64,
        speed: f64,
        hour: usize,
    ) -> SimResult<Trip> {
        let distance = self.distance.get(origin, destination)?;
        if distance == 0.0 {
            return Ok(Trip::zero());
        }
        if distance < 0.0 {
            return Err(SimError::BadInput(format!("negative distance {origin} -> {destination}")));
        }
        let incline = self.incline.get(origin, destination)?;

        let loading = if (0.0..=1.0).contains(&level_of_loading) {
            level_of_loading
        } else {
            tracing::warn!(level_of_loading, "invalid level_of_loading, using default");
            self.defaults.level_of_loading
        };
        let speed = if speed >= 0.0 {
            speed
        } else {
            tracing::warn!(speed, "invalid speed, using average_speed default");
            self.average_speed
        };
        let t_amb = self.get_temperature(hour);

        Ok(self.calculate_consumption(vehicle_type, battery_capacity_kwh, distance, loading, incline, speed, t_amb))
    }
}
