#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Any input must decode or fail cleanly
    if let Ok(msg) = glowmarkt_bridge::mqtt::decode(data) {
        for meter in [msg.electricity.as_ref(), msg.gas.as_ref()].into_iter().flatten() {
            let _ = meter.summation_delivered();
            let _ = meter.instantaneous_demand();
        }
    }

    let router = glowmarkt_bridge::mqtt::MeterRouter::new();
    router.register(glowmarkt_bridge::mqtt::ELECTRICITY_CLASSIFIER);
    let _ = router.handle_payload(data);
});
