//! ChargerGraph: locations, chargers, plug types and charging points.

use serde_json::{Value, json};

/// A plug type a [`ChargingPoint`] can offer.
#[derive(Debug, Clone)]
pub struct PlugType {
    pub name: String,
    pub capacity_kw: f64,
    pub plug_kind: String,
}

/// A single charging point, offering one or more plug types.
#[derive(Debug, Clone)]
pub struct ChargingPoint {
    pub id: String,
    pub plugs: Vec<PlugType>,
}

impl ChargingPoint {
    /// Maximum power this point can deliver to a vehicle compatible with any
    /// of `plug_kinds`; zero if none of the point's plugs overlap.
    pub fn power_for(&self, plug_kinds: &[String]) -> f64 {
        self.plugs
            .iter()
            .filter(|p| plug_kinds.iter().any(|k| k == &p.plug_kind))
            .map(|p| p.capacity_kw)
            .fold(0.0, f64::max)
    }
}

/// A charging station with one or more charging points.
#[derive(Debug, Clone)]
pub struct Charger {
    pub name: String,
    pub points: Vec<ChargingPoint>,
}

impl Charger {
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Builds the EmCS scenario fragment for a single charging point.
    ///
    /// Errors on an unknown `point_id` and on a charger with no points at
    /// all.
    pub fn scenario_info(&self, point_id: &str, plug_kinds: &[String]) -> Result<Value, String> {
        if self.points.is_empty() {
            return Err(format!(
                "scenario dictionary requested of charger {} with no charging points",
                self.name
            ));
        }
        let Some(point) = self.points.iter().find(|p| p.id == point_id) else {
            return Err(format!(
                "point id {point_id} doesn't match any points in charger {}",
                self.name
            ));
        };
        Ok(json!({
            "components": {
                "charging_stations": {
                    point.id.clone(): {
                        "max_power": point.power_for(plug_kinds),
                        "min_power": 0,
                        "parent": "GC1",
                    }
                }
            }
        }))
    }
}

/// An optional local generator descriptor for a location's grid connection.
#[derive(Debug, Clone)]
pub struct GeneratorInfo {
    pub series: Vec<f64>,
}

/// A named place vehicles can drive to, park at, and (if it has chargers)
/// charge at.
#[derive(Clone)]
pub struct Location {
    pub name: String,
    pub location_type: String,
    pub chargers: Vec<Charger>,
    pub grid_power_kw: Option<f64>,
    pub generator: Option<GeneratorInfo>,
    /// Concurrent-vehicle count per timestep, `occupation[t] <= num_points`.
    occupation: Vec<u32>,
    pub output: Option<LocationOutput>,
}

/// Per-location power/occupancy time series, recorded as charging tasks run.
#[derive(Debug, Clone, Default)]
pub struct LocationOutput {
    pub total_power_kw: Vec<f64>,
    pub total_connected_vehicles: Vec<u32>,
    pub per_charger_power_kw: Vec<(String, Vec<f64>)>,
    pub per_charger_connected: Vec<(String, Vec<u32>)>,
}

impl Location {
    pub fn new(name: impl Into<String>, location_type: impl Into<String>, chargers: Vec<Charger>) -> Self {
        Self {
            name: name.into(),
            location_type: location_type.into(),
            chargers,
            grid_power_kw: None,
            generator: None,
            occupation: Vec::new(),
            output: None,
        }
    }

    pub fn num_points(&self) -> usize {
        self.chargers.iter().map(Charger::num_points).sum()
    }

    pub fn init_occupation(&mut self, time_steps: usize) {
        self.occupation = vec![0; time_steps];
    }

    /// Increments occupancy over `[start, end]`, inclusive of both
    /// endpoints.
    pub fn add_occupation(&mut self, start: i64, end: i64) {
        let len = self.occupation.len() as i64;
        let lo = start.max(0);
        let hi = end.min(len - 1);
        if lo > hi {
            tracing::warn!(location = %self.name, start, end, "occupation range out of bounds");
            return;
        }
        for t in lo..=hi {
            self.occupation[t as usize] += 1;
        }
    }

    /// True if every step in `[start, end]` has strictly fewer concurrent
    /// users than this location's total charging points.
    pub fn is_available(&self, start: i64, end: i64) -> bool {
        let num_points = self.num_points() as u32;
        let len = self.occupation.len() as i64;
        let lo = start.max(0);
        let hi = end.min(len - 1);
        if lo > hi {
            return true;
        }
        self.occupation[lo as usize..=hi as usize]
            .iter()
            .all(|&c| c < num_points)
    }

    /// Builds the EmCS scenario fragment for this location: the grid
    /// connector, optional feed-in event, and either the requested point,
    /// or — with no `point_id` — the point with maximal power for
    /// `plug_kinds` across all chargers at this location.
    pub fn scenario_info(&self, plug_kinds: &[String], point_id: Option<&str>) -> Value {
        let power = self.grid_power_kw.unwrap_or(0.0);
        let mut scenario = json!({
            "components": {
                "grid_connectors": {
                    "GC1": { "max_power": power }
                }
            }
        });
        if let Some(gen) = &self.generator {
            scenario["events"] = json!({
                "energy_feed_in": { "GC1 feed-in": { "csv_file": format!("{}_feed_in.csv", self.name), "values": gen.series } }
            });
        }

        let chosen = match point_id {
            Some(id) => Some(id.to_string()),
            None => self.best_point_id(plug_kinds),
        };
        let Some(chosen) = chosen else {
            return scenario;
        };
        for charger in &self.chargers {
            if let Ok(frag) = charger.scenario_info(&chosen, plug_kinds) {
                merge_json(&mut scenario, &frag);
            }
        }
        scenario
    }

    /// The single point with the highest power for `plug_kinds` across all
    /// chargers at this location; ties keep the first point encountered in
    /// charger/point declaration order.
    fn best_point_id(&self, plug_kinds: &[String]) -> Option<String> {
        let mut best: Option<(String, f64)> = None;
        for charger in &self.chargers {
            for point in &charger.points {
                let power = point.power_for(plug_kinds);
                if power > best.as_ref().map(|(_, p)| *p).unwrap_or(0.0) {
                    best = Some((point.id.clone(), power));
                }
            }
        }
        best.map(|(id, _)| id)
    }

    /// Records a charging event's per-step power into the running output
    /// series, growing the schema lazily the first time it is called.
    pub fn update_output(&mut self, start: i64, end: i64, time_steps: usize, mut power_per_step: Vec<f64>) {
        let multi = self.chargers.len() > 1;
        let output = self.output.get_or_insert_with(|| {
            let mut out = LocationOutput {
                total_power_kw: vec![0.0; time_steps],
                total_connected_vehicles: vec![0; time_steps],
                ..Default::default()
            };
            if multi {
                for charger in &self.chargers {
                    out.per_charger_power_kw.push((charger.name.clone(), vec![0.0; time_steps]));
                    out.per_charger_connected.push((charger.name.clone(), vec![0; time_steps]));
                }
            }
            out
        });
        for t in start..end {
            if t as usize >= time_steps {
                tracing::warn!(location = %self.name, t, "charging time is out of time schedule");
                break;
            }
            let power = if power_per_step.is_empty() { 0.0 } else { power_per_step.remove(0) };
            let idx = t as usize;
            if multi {
                if let Some((_, series)) = output.per_charger_power_kw.first_mut() {
                    series[idx] += power;
                }
                if let Some((_, series)) = output.per_charger_connected.first_mut() {
                    series[idx] += 1;
                }
            }
            output.total_power_kw[idx] += power;
            output.total_connected_vehicles[idx] += 1;
        }
    }
}

fn merge_json(base: &mut Value, overlay: &Value) {
    if let (Value::Object(base_map), Value::Object(overlay_map)) = (base.as_object_mut(), overlay) {
        for (k, v) in overlay_map {
            match base_map.get_mut(k) {
                Some(existing) => merge_json(existing, v),
                None => {
                    base_map.insert(k.clone(), v.clone());
                }
            }
        }
    } else {
        *base = overlay.clone();
    }
}
