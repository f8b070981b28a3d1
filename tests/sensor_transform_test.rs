use glowmarkt_bridge::config::GasConfig;
use glowmarkt_bridge::glowmarkt::{Resource, SupplyType};
use glowmarkt_bridge::sensor::{
    SensorKind, consumption_sensors, cost_sensor, kwh_to_cubic_metres, pence_to_pounds, round_to,
};

#[test]
fn gas_volume_conversion_matches_reference() {
    let gas = GasConfig::default();
    let m3 = kwh_to_cubic_metres(10.0, gas.volume_correction, gas.calorific_value);
    assert_eq!(round_to(m3, 3), 0.882);
}

#[test]
fn pence_to_pounds_conversion() {
    assert_eq!(round_to(pence_to_pounds(1234.0), 2), 12.34);
    assert_eq!(round_to(pence_to_pounds(0.5), 4), 0.005);
}

#[test]
fn electricity_has_no_volume_sensor() {
    let res = Resource {
        id: "e".into(),
        name: "electricity consumption".into(),
        classifier: "electricity.consumption".into(),
        base_unit: Some("kWh".into()),
        supply: SupplyType::Electricity,
    };
    let sensors = consumption_sensors(&res, &GasConfig::default());
    let kinds: Vec<SensorKind> = sensors.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![
            SensorKind::Usage,
            SensorKind::Standing,
            SensorKind::Rate,
            SensorKind::Demand
        ]
    );
    assert!(sensors.iter().all(|s| s.device_id == "e"));

    let cost = Resource {
        id: "ec".into(),
        classifier: "electricity.consumption.cost".into(),
        ..res.clone()
    };
    let c = cost_sensor(&cost, Some(&res));
    assert_eq!(c.kind, SensorKind::Cost);
    assert_eq!(c.unit, "GBP");
    assert_eq!(c.device_id, "e");
}
