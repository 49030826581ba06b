//! A V2G-capable vehicle should earn back cost by discharging into a price spike.

mod common;

use common::{ScenarioDir, write_cost_series};
use fleet_charge_sim::config::ScenarioConfig;
use fleet_charge_sim::simulation::Simulation;

/// Builds the same depot/site scenario as `common::two_location_scenario`, but
/// parameterized on which vehicle type drives the one schedule row, so the
/// v2g and non-v2g runs are otherwise identical.
fn scenario_for(dir: &ScenarioDir, vehicle_type: &str) -> ScenarioConfig {
    std::fs::write(
        dir.path.join("vehicle_types.csv"),
        "name,capacity_kwh,soc_min,base_consumption_kwh_per_km,charging_curve,charging_capacity,min_charging_power,v2g,v2g_power_factor\n\
         van,40.0,0.2,0.2,0.0:22.0;1.0:22.0,CCS:22.0,0.1,false,0.0\n\
         v2g_van,40.0,0.2,0.2,0.0:22.0;1.0:22.0,CCS:22.0,0.1,true,0.8\n",
    )
    .unwrap();
    std::fs::write(
        dir.path.join("charging_points.csv"),
        "location,location_type,charger,point_id,plug_name,plug_kind,capacity_kw,grid_power_kw\n\
         depot,depot,c1,c1_0,ccs,CCS,22.0,22.0\n",
    )
    .unwrap();
    std::fs::write(dir.path.join("distance.csv"), "name,depot,site\ndepot,0.0,5.0\nsite,5.0,0.0\n").unwrap();
    std::fs::write(dir.path.join("incline.csv"), "name,depot,site\ndepot,0.0,0.0\nsite,0.0,0.0\n").unwrap();
    std::fs::write(
        dir.path.join("consumption.csv"),
        "vehicle_type,level_of_loading,incline,mean_speed,t_amb,consumption\n\
         van,0.0,0.0,2.626,20.0,-0.1\n\
         van,0.0,0.0,50.0,20.0,-0.3\n\
         v2g_van,0.0,0.0,2.626,20.0,-0.1\n\
         v2g_van,0.0,0.0,50.0,20.0,-0.3\n",
    )
    .unwrap();
    std::fs::write(dir.path.join("temperature.csv"), format!("hour,default\n{}\n", (0..24).map(|h| format!("{h},20.0")).collect::<Vec<_>>().join("\n"))).unwrap();

    std::fs::write(
        dir.path.join("schedule.csv"),
        format!(
            "vehicle_id,vehicle_type,departure_name,arrival_name,departure_time,arrival_time,occupation\n\
             v1,{vehicle_type},depot,site,0,10,0.0\n\
             v1,{vehicle_type},site,depot,50,60,0.0\n"
        ),
    )
    .unwrap();

    // Cheap for the first three quarters of the charging window, then a
    // sharp spike for the last quarter, mirroring the emcs price-spike unit
    // test's ratio so the discharge condition (price > 1.5x window average)
    // is comfortably cleared.
    let mut prices = vec![0.1; 300];
    prices.extend(std::iter::repeat(5.0).take(100));
    write_cost_series(dir, &prices);

    let toml = "[files]\n\
         schedule = \"schedule.csv\"\n\
         vehicle_types = \"vehicle_types.csv\"\n\
         charging_points = \"charging_points.csv\"\n\
         distance = \"distance.csv\"\n\
         incline = \"incline.csv\"\n\
         consumption = \"consumption.csv\"\n\
         temperature = \"temperature.csv\"\n\
         cost = \"cost.csv\"\n\
         [charging]\n\
         soc_min = 0.2\n\
         end_of_day_soc = 0.95\n";
    let scenario_path = dir.path.join("scenario.toml");
    std::fs::write(&scenario_path, toml).unwrap();
    ScenarioConfig::from_toml_file(&scenario_path).unwrap()
}

fn total_energy_cost(sim: &Simulation) -> f64 {
    sim.vehicles[0].output.iter().map(|row| row.energy_cost).sum()
}

#[test]
fn v2g_vehicle_ends_up_cheaper_than_an_otherwise_identical_non_v2g_vehicle() {
    let van_dir = ScenarioDir::new("v2g-baseline");
    let van_config = scenario_for(&van_dir, "van");
    let mut van_sim = Simulation::from_config(van_config).unwrap();
    van_sim.run().unwrap();

    let v2g_dir = ScenarioDir::new("v2g-discharging");
    let v2g_config = scenario_for(&v2g_dir, "v2g_van");
    let mut v2g_sim = Simulation::from_config(v2g_config).unwrap();
    v2g_sim.run().unwrap();

    assert!(
        total_energy_cost(&v2g_sim) < total_energy_cost(&van_sim),
        "v2g vehicle should earn back cost discharging into the price spike: v2g={}, van={}",
        total_energy_cost(&v2g_sim),
        total_energy_cost(&van_sim)
    );
}

#[test]
fn v2g_vehicle_draws_its_soc_back_down_during_the_price_spike() {
    let dir = ScenarioDir::new("v2g-soc-drawdown");
    let config = scenario_for(&dir, "v2g_van");
    let mut sim = Simulation::from_config(config).unwrap();
    sim.run().unwrap();

    let vehicle = &sim.vehicles[0];
    let peak_soc = vehicle.output.iter().map(|row| row.soc_end).fold(0.0_f64, f64::max);
    assert!(vehicle.current_soc < peak_soc, "soc should fall back from its peak once the spike triggers discharge");
}
