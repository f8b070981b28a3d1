use glowmarkt_bridge::error::GlowError;
use glowmarkt_bridge::mqtt::payload::{MeteringDeviceType, SupplyStatus, UnitOfMeasure};
use glowmarkt_bridge::mqtt::{ELECTRICITY_CLASSIFIER, GAS_CLASSIFIER, MeterRouter, decode};

// Shape of a publish from a Glow CAD with both meters paired
const DUAL_FUEL: &str = r#"{
  "gasMtr": {"0702": {
    "03": {"01": "000001", "02": "0003E8", "00": "01", "06": "80", "07": "1234567890",
           "08": "G4A00000000000", "12": "00", "04": "00", "03": "FB"},
    "0C": {"01": "0005AC", "30": "000F3C", "40": "005DC0"},
    "00": {"00": "0000000F4240", "14": "02"},
    "02": {"00": "00"}
  }},
  "elecMtr": {"0702": {
    "03": {"01": "000001", "02": "0003E8", "00": "00", "06": "00", "07": "1900000000000",
           "08": "21E0000000", "04": "00", "03": "FB"},
    "04": {"00": "000001C2", "01": "001B58", "30": "00AFC8", "40": "02BF20"},
    "00": {"00": "000000A7D8C0", "01": "000000000000", "14": "02"},
    "02": {"00": "00"}
  }},
  "pan": {"rssi": "-62", "status": "joined"},
  "hversion": "GLOW-IHD-01-1v4-SMETS2",
  "time": "65A6B3C0"
}"#;

#[test]
fn decodes_dual_fuel_payload() {
    let msg = decode(DUAL_FUEL.as_bytes()).unwrap();

    let elec = msg.electricity.unwrap();
    assert_eq!(elec.formatting.metering_device_type, Some(MeteringDeviceType::Electric));
    assert_eq!(elec.formatting.unit_of_measure, Some(UnitOfMeasure::Kwh));
    assert_eq!(elec.formatting.site_id.as_deref(), Some("1900000000000"));
    assert!((elec.summation_delivered().unwrap() - 11_000.0).abs() < 1e-9);
    assert!((elec.instantaneous_demand().unwrap() - 0.45).abs() < 1e-9);
    assert!((elec.day_consumption().unwrap() - 7.0).abs() < 1e-9);
    assert_eq!(elec.historical_consumption.current_week_consumption_delivered, Some(45_000));
    assert_eq!(elec.historical_consumption.current_month_consumption_delivered, Some(180_000));
    assert_eq!(elec.reading_information_set.supply_status, Some(SupplyStatus::On));

    let gas = msg.gas.unwrap();
    assert_eq!(gas.formatting.metering_device_type, Some(MeteringDeviceType::Gas));
    assert_eq!(gas.formatting.unit_of_measure, Some(UnitOfMeasure::CubicMetres));
    assert_eq!(gas.formatting.alternative_unit_of_measure, Some(UnitOfMeasure::Kwh));
    assert!((gas.summation_delivered().unwrap() - 1_000.0).abs() < 1e-9);
    assert_eq!(gas.historical_consumption.instantaneous_demand, None);
    assert_eq!(gas.alternative_historical_consumption.current_day_consumption_delivered, Some(1_452));
    assert_eq!(gas.alternative_historical_consumption.current_week_consumption_delivered, Some(3_900));
    assert_eq!(gas.alternative_historical_consumption.current_month_consumption_delivered, Some(24_000));
}

#[test]
fn meter_without_formatting_is_absent() {
    let json = r#"{"elecMtr": {"0702": {"00": {"00": "000000000010"}}}, "gasMtr": {"0702": {}}}"#;
    let msg = decode(json.as_bytes()).unwrap();
    assert!(msg.electricity.is_none());
    assert!(msg.gas.is_none());
}

#[test]
fn missing_attributes_are_absent_not_zero() {
    let json = r#"{"elecMtr": {"0702": {"03": {}}}}"#;
    let elec = decode(json.as_bytes()).unwrap().electricity.unwrap();
    assert_eq!(elec.reading_information_set.current_summation_delivered, None);
    assert_eq!(elec.reading_information_set.supply_status, None);
    assert_eq!(elec.formatting.multiplier, None);
    assert_eq!(elec.meter_status.status, None);
    assert_eq!(elec.summation_delivered(), None);
}

#[test]
fn malformed_inputs() {
    let cases: [&[u8]; 7] = [
        b"",
        b"{",
        b"null",
        br#"{"pan": {}}"#,
        br#"{"elecMtr": {"0702": []}}"#,
        br#"{"elecMtr": {"0702": {"03": {"01": 7}}}}"#,
        br#"{"elecMtr": {"0702": {"03": {}, "00": {"00": "12G"}}}}"#,
    ];
    for bad in cases {
        assert!(
            matches!(decode(bad), Err(GlowError::MalformedPayload { .. })),
            "input {:?}",
            String::from_utf8_lossy(bad)
        );
    }
}

#[test]
fn router_survives_bad_messages() {
    let router = MeterRouter::new();
    let elec = router.register(ELECTRICITY_CLASSIFIER);
    let gas = router.register(GAS_CLASSIFIER);

    assert!(router.handle_payload(b"garbage").is_err());
    assert_eq!(router.handle_payload(DUAL_FUEL.as_bytes()).unwrap(), 2);
    assert!(router.handle_payload(b"{").is_err());

    let e = elec.borrow().clone().unwrap();
    assert!((e.cumulative.unwrap() - 11_000.0).abs() < 1e-9);
    let g = gas.borrow().clone().unwrap();
    assert_eq!(g.unit, Some(UnitOfMeasure::CubicMetres));
}
