//! Shared scenario fixtures for integration tests.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use fleet_charge_sim::config::ScenarioConfig;

/// A scratch directory removed on drop, holding one scenario's input files.
pub struct ScenarioDir {
    pub path: PathBuf,
}

impl ScenarioDir {
    pub fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("fleet-charge-sim-it-{name}-{}", std::process::id()));
        fs::create_dir_all(&path).expect("create scenario dir");
        Self { path }
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let p = self.path.join(name);
        fs::File::create(&p).unwrap().write_all(contents.as_bytes()).unwrap();
        p
    }
}

impl Drop for ScenarioDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Writes a two-location (depot/site), single-charger, single-vehicle-type
/// scenario and returns its parsed config. `extra_toml` is appended to the
/// generated `[files]` block, letting callers override `[charging]`,
/// `[weights]`, `[sim_params]`, etc.
pub fn two_location_scenario(dir: &ScenarioDir, extra_toml: &str) -> ScenarioConfig {
    dir.write(
        "vehicle_types.csv",
        "name,capacity_kwh,soc_min,base_consumption_kwh_per_km,charging_curve,charging_capacity,min_charging_power,v2g,v2g_power_factor\n\
         van,40.0,0.2,0.2,0.0:22.0;1.0:22.0,CCS:22.0,0.1,false,0.0\n\
         v2g_van,40.0,0.2,0.2,0.0:22.0;1.0:22.0,CCS:22.0,0.1,true,0.8\n",
    );
    dir.write(
        "charging_points.csv",
        "location,location_type,charger,point_id,plug_name,plug_kind,capacity_kw,grid_power_kw\n\
         depot,depot,c1,c1_0,ccs,CCS,22.0,22.0\n",
    );
    dir.write("distance.csv", "name,depot,site\ndepot,0.0,5.0\nsite,5.0,0.0\n");
    dir.write("incline.csv", "name,depot,site\ndepot,0.0,0.0\nsite,0.0,0.0\n");
    dir.write(
        "consumption.csv",
        "vehicle_type,level_of_loading,incline,mean_speed,t_amb,consumption\n\
         van,0.0,0.0,2.626,20.0,-0.1\n\
         van,0.0,0.0,50.0,20.0,-0.3\n\
         v2g_van,0.0,0.0,2.626,20.0,-0.1\n\
         v2g_van,0.0,0.0,50.0,20.0,-0.3\n",
    );
    dir.write("temperature.csv", &format!("hour,default\n{}\n", (0..24).map(|h| format!("{h},20.0")).collect::<Vec<_>>().join("\n")));
    dir.write("cost.csv", &format!("value\n{}\n", vec!["0.2"; 400].join("\n")));

    let toml = format!(
        "[files]\n\
         schedule = \"schedule.csv\"\n\
         vehicle_types = \"vehicle_types.csv\"\n\
         charging_points = \"charging_points.csv\"\n\
         distance = \"distance.csv\"\n\
         incline = \"incline.csv\"\n\
         consumption = \"consumption.csv\"\n\
         temperature = \"temperature.csv\"\n\
         cost = \"cost.csv\"\n\
         {extra_toml}\n"
    );
    let scenario_path = dir.write("scenario.toml", &toml);
    ScenarioConfig::from_toml_file(&scenario_path).unwrap()
}

/// Overwrites the scenario's cost series with explicit per-step values.
pub fn write_cost_series(dir: &ScenarioDir, values: &[f64]) {
    let body = format!("value\n{}\n", values.iter().map(f64::to_string).collect::<Vec<_>>().join("\n"));
    dir.write("cost.csv", &body);
}

/// Writes a schedule CSV with one row per `(vehicle_id, departure, arrival)`.
pub fn write_schedule(dir: &ScenarioDir, rows: &[(&str, &str, &str, &str, i64, i64)]) {
    let mut body = "vehicle_id,vehicle_type,departure_name,arrival_name,departure_time,arrival_time,occupation\n".to_string();
    for (id, vt, from, to, dep, arr) in rows {
        body.push_str(&format!("{id},{vt},{from},{to},{dep},{arr},0.0\n"));
    }
    dir.write("schedule.csv", &body);
}
