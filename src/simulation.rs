//! Simulation registry: owns the fleet, the charger network and the shared
//! environment tables, and drives one full Resolver + Stepper run.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::rc::Rc;

use crate::config::ScenarioConfig;
use crate::emcs::GreedyChargingSimulator;
use crate::error::SimResult;
use crate::evaluator::Weights;
use crate::io::{input, output};
use crate::model::location::Location;
use crate::model::vehicle::{Vehicle, VehicleType};
use crate::resolver::{Resolver, ResolverParams};
use crate::ride::{Defaults, RideCalc};
use crate::stepper::{Stepper, StepperParams};

/// One fully loaded, ready-to-run scenario.
pub struct Simulation {
    pub config: ScenarioConfig,
    pub vehicles: Vec<Vehicle>,
    pub locations: HashMap<String, Location>,
    pub vehicle_types: BTreeMap<String, Rc<VehicleType>>,
    pub ride: RideCalc,
    pub price_per_kwh: Vec<f64>,
    pub feed_in_kw: Vec<f64>,
    pub emission_per_kwh: Option<Vec<f64>>,
    pub time_steps: usize,
}

/// Fixed evaluation resolution: four 15-minute steps per hour.
const STEPS_PER_HOUR: f64 = 4.0;

impl Simulation {
    /// Loads every input named in `config.files` and assembles a ready-to-run
    /// simulation. `time_steps` is derived from the latest task end time in
    /// the loaded schedule, since the input pack carries no explicit horizon.
    pub fn from_config(config: ScenarioConfig) -> SimResult<Self> {
        let vehicle_types = input::load_vehicle_types(&config.files.vehicle_types)?;
        let vehicles = input::load_schedule(&config.files.schedule, &vehicle_types, config.charging.end_of_day_soc)?;

        let locations: HashMap<String, Location> = input::load_locations(&config.files.charging_points)?.into_iter().collect();
        let distance = input::load_route_matrix(&config.files.distance)?;
        let incline = input::load_route_matrix(&config.files.incline)?;
        let consumption = input::load_consumption_table(&config.files.consumption)?;
        let temperature = input::load_temperature_table(&config.files.temperature)?;

        let ride = RideCalc::new(
            consumption,
            distance,
            incline,
            temperature,
            config.temperature_options.column.clone(),
            Defaults {
                level_of_loading: config.defaults.level_of_loading_default,
                incline: config.defaults.incline_default,
                temperature: config.defaults.temperature_default,
            },
            config.charging.average_speed,
        )?;

        let price_per_kwh = input::load_series(&config.files.cost, &config.cost_options.column)?;
        let emission_per_kwh = match &config.files.emission {
            Some(path) => Some(input::load_series(path, &config.emission_options.column)?),
            None => None,
        };

        let time_steps = vehicles
            .iter()
            .map(Vehicle::max_task_end_time)
            .max()
            .unwrap_or(0)
            .max(price_per_kwh.len() as i64) as usize;

        let mut locations = locations;
        for location in locations.values_mut() {
            location.init_occupation(time_steps);
        }

        // No solar/generation input is modeled yet; every location reads a
        // flat zero feed-in series until a generator config section exists.
        let feed_in_kw = vec![0.0; time_steps];

        Ok(Self { config, vehicles, locations, vehicle_types, ride, price_per_kwh, feed_in_kw, emission_per_kwh, time_steps })
    }

    /// Resolves charging demand for the whole horizon, then replays every
    /// vehicle's finalized timeline through the Stepper.
    pub fn run(&mut self) -> SimResult<()> {
        for vehicle in &mut self.vehicles {
            vehicle.precalculate_driving_tasks(&self.ride, STEPS_PER_HOUR)?;
        }

        let simulator = GreedyChargingSimulator;
        let charger_names: Vec<String> = self.locations.iter().filter(|(_, loc)| loc.num_points() > 0).map(|(name, _)| name.clone()).collect();

        let min_price = self.price_per_kwh.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_price = self.price_per_kwh.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        let weights = Weights {
            time_factor: self.config.weights.time_factor,
            energy_factor: self.config.weights.energy_factor,
            cost_factor: self.config.weights.cost_factor,
            local_renewables_factor: self.config.weights.local_renewables_factor,
            soc_factor: self.config.weights.soc_factor,
        };

        let resolver_params = ResolverParams {
            ride: &self.ride,
            simulator: &simulator,
            weights,
            min_price,
            max_price,
            charging_step_size_minutes: self.config.charging.charging_step_size,
            alt_strategy_min_standing_time: self.config.charging.alternative_strategy_min_standing_time,
            steps_per_hour: STEPS_PER_HOUR,
            feed_in_price_per_kwh: self.config.cost_options.feed_in_price,
            price_per_kwh: &self.price_per_kwh,
            feed_in_kw: &self.feed_in_kw,
            emission_per_kwh: self.emission_per_kwh.as_deref(),
            soc_min: self.config.charging.soc_min,
            end_of_day_soc: self.config.charging.end_of_day_soc,
            delete_rides: self.config.sim_params.delete_rides,
        };
        Resolver::resolve(&mut self.vehicles, &mut self.locations, &charger_names, 0, self.time_steps as i64, &resolver_params)?;

        let stepper_params = StepperParams {
            ride: &self.ride,
            simulator: &simulator,
            steps_per_hour: STEPS_PER_HOUR,
            price_per_kwh: &self.price_per_kwh,
            feed_in_kw: &self.feed_in_kw,
            feed_in_price_per_kwh: self.config.cost_options.feed_in_price,
            emission_per_kwh: self.emission_per_kwh.as_deref(),
            charging_step_size_minutes: self.config.charging.charging_step_size,
            alt_strategy_min_standing_time: self.config.charging.alternative_strategy_min_standing_time,
            record_location_output: self.config.outputs.location_csv,
            time_steps: self.time_steps,
        };
        Stepper::run(&mut self.vehicles, &mut self.locations, &stepper_params)
    }

    /// Writes the configured export artifacts under `out_dir`.
    pub fn export(&self, out_dir: &Path) -> SimResult<()> {
        std::fs::create_dir_all(out_dir).map_err(|source| crate::error::SimError::Io { path: out_dir.to_path_buf(), source })?;
        if self.config.outputs.vehicle_csv {
            output::export_vehicle_csvs(&self.vehicles, &out_dir.join("vehicles")).map_err(|source| crate::error::SimError::Io { path: out_dir.to_path_buf(), source })?;
        }
        if self.config.outputs.location_csv {
            let locations: BTreeMap<String, Location> = self.locations.iter().map(|(name, loc)| (name.clone(), loc.clone())).collect();
            output::export_location_csvs(&locations, &out_dir.join("locations")).map_err(|source| crate::error::SimError::Io { path: out_dir.to_path_buf(), source })?;
        }
        output::export_scenario_json(&self.vehicles, &out_dir.join("scenario.json")).map_err(|source| crate::error::SimError::Io { path: out_dir.to_path_buf(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::location::{Charger, ChargingPoint, PlugType};
    use std::io::Write;

    struct TempDir {
        path: std::path::PathBuf,
    }

    impl TempDir {
        fn new(name: &str) -> Self {
            let path = std::env::temp_dir().join(format!("fleet-charge-sim-{name}-{}", std::process::id()));
            std::fs::create_dir_all(&path).expect("create temp dir");
            Self { path }
        }

        fn write(&self, name: &str, contents: &str) -> std::path::PathBuf {
            let p = self.path.join(name);
            std::fs::File::create(&p).unwrap().write_all(contents.as_bytes()).unwrap();
            p
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }

    fn minimal_scenario(dir: &TempDir) -> ScenarioConfig {
        dir.write("vehicle_types.csv", "name,capacity_kwh,soc_min,base_consumption_kwh_per_km,charging_curve,charging_capacity,min_charging_power,v2g,v2g_power_factor\nvan,40.0,0.2,0.2,0.0:22.0;1.0:22.0,CCS:22.0,0.1,false,0.0\n");
        dir.write("schedule.csv", "vehicle_id,vehicle_type,departure_name,arrival_name,departure_time,arrival_time,occupation\nv1,van,depot,site,0,10,0.0\nv1,van,site,depot,100,110,0.0\n");
        dir.write("charging_points.csv", "location,location_type,charger,point_id,plug_name,plug_kind,capacity_kw,grid_power_kw\ndepot,depot,c1,c1_0,ccs,CCS,22.0,22.0\n");
        dir.write("distance.csv", "name,depot,site\ndepot,0.0,5.0\nsite,5.0,0.0\n");
        dir.write("incline.csv", "name,depot,site\ndepot,0.0,0.0\nsite,0.0,0.0\n");
        dir.write("consumption.csv", "vehicle_type,level_of_loading,incline,mean_speed,t_amb,consumption\nvan,0.0,0.0,30.0,20.0,-0.2\n");
        dir.write("temperature.csv", &format!("hour,default\n{}\n", (0..24).map(|h| format!("{h},20.0")).collect::<Vec<_>>().join("\n")));
        dir.write("cost.csv", &format!("value\n{}\n", vec!["0.2"; 200].join("\n")));

        let toml = format!(
            "[files]\nschedule = \"schedule.csv\"\nvehicle_types = \"vehicle_types.csv\"\ncharging_points = \"charging_points.csv\"\ndistance = \"distance.csv\"\nincline = \"incline.csv\"\nconsumption = \"consumption.csv\"\ntemperature = \"temperature.csv\"\ncost = \"cost.csv\"\n"
        );
        let scenario_path = dir.write("scenario.toml", &toml);
        ScenarioConfig::from_toml_file(&scenario_path).unwrap()
    }

    #[test]
    fn from_config_loads_all_inputs_and_derives_time_steps() {
        let dir = TempDir::new("load");
        let config = minimal_scenario(&dir);
        let sim = Simulation::from_config(config).unwrap();
        assert_eq!(sim.vehicles.len(), 1);
        assert!(sim.locations.contains_key("depot"));
        assert!(sim.time_steps >= 110);
    }

    #[test]
    fn run_produces_output_rows_for_every_vehicle() {
        let dir = TempDir::new("run");
        let config = minimal_scenario(&dir);
        let mut sim = Simulation::from_config(config).unwrap();
        sim.run().unwrap();
        assert!(!sim.vehicles[0].output.is_empty());
    }

    #[test]
    fn export_writes_vehicle_and_location_csvs_and_summary() {
        let dir = TempDir::new("export");
        let config = minimal_scenario(&dir);
        let mut sim = Simulation::from_config(config).unwrap();
        sim.run().unwrap();
        let out_dir = dir.path.join("out");
        sim.export(&out_dir).unwrap();
        assert!(out_dir.join("vehicles").join("v1.csv").exists());
        assert!(out_dir.join("scenario.json").exists());
    }

    #[test]
    fn run_precalculates_driving_tasks_before_resolving_charge_demand() {
        let dir = TempDir::new("precalc");
        let config = minimal_scenario(&dir);
        let mut sim = Simulation::from_config(config).unwrap();
        assert_eq!(sim.vehicles[0].get_task(0).unwrap().delta_soc, 0.0);
        sim.run().unwrap();
        assert_ne!(sim.vehicles[0].get_task(0).unwrap().delta_soc, 0.0);
    }

    #[test]
    fn charger_names_only_include_locations_with_points() {
        let mut locations: HashMap<String, Location> = HashMap::new();
        locations.insert("depot".to_string(), Location::new("depot", "depot", vec![Charger { name: "c1".to_string(), points: vec![ChargingPoint { id: "c1_0".to_string(), plugs: vec![PlugType { name: "ccs".to_string(), capacity_kw: 22.0, plug_kind: "CCS".to_string() }] }] }]));
        locations.insert("waypoint".to_string(), Location::new("waypoint", "waypoint", vec![]));
        let names: Vec<&String> = locations.iter().filter(|(_, loc)| loc.num_points() > 0).map(|(name, _)| name).collect();
        assert_eq!(names, vec!["depot"]);
    }
}
