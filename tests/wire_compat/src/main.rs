fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use chrono::{TimeZone, Utc};
    use sentinel_protocol::{CollectorAck, RecordKind, WireRecord};
    use sentinel_telemetry::TelemetryEncoder;

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (key order is ignored).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  collector: {fixture}\n  agent:     {reserialized}"
        );
        parsed
    }

    // --- Agent → collector ---

    #[test]
    fn fixture_telemetry_record() {
        let record = roundtrip_test::<WireRecord>("telemetry_record.json");
        assert_eq!(record.kind, RecordKind::LowLevelScan);
        assert_eq!(record.payload.anomalies, 3);
    }

    #[test]
    fn encoder_output_matches_fixture() {
        let encoder = TelemetryEncoder::new("sentinel-agent-rust-001");
        // Sub-second precision is dropped on the wire.
        let now = Utc.timestamp_opt(1_700_000_000, 450_000_000).unwrap();
        let record = encoder.encode("/proc/mem", 3, now);

        let json = record.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, load_fixture("telemetry_record.json"));
    }

    #[test]
    fn scan_target_stays_local() {
        let record = TelemetryEncoder::new("a").encode("/secret/path", 0, Utc::now());
        let json = record.to_json().unwrap();
        assert!(!json.contains("/secret/path"));
    }

    #[test]
    fn unknown_record_type_is_rejected() {
        let mut value = load_fixture("telemetry_record.json");
        value["type"] = serde_json::json!("high_level_scan");
        assert!(serde_json::from_value::<WireRecord>(value).is_err());
    }

    #[test]
    fn negative_anomaly_count_is_rejected() {
        let mut value = load_fixture("telemetry_record.json");
        value["payload"]["anomalies"] = serde_json::json!(-1);
        assert!(serde_json::from_value::<WireRecord>(value).is_err());
    }

    // --- Collector → agent ---

    #[test]
    fn fixture_collector_ack() {
        let ack = roundtrip_test::<CollectorAck>("collector_ack.json");
        assert_eq!(ack, CollectorAck::accepted("a1b2c3"));
    }

    #[test]
    fn fixture_collector_ack_rejected() {
        let ack = roundtrip_test::<CollectorAck>("collector_ack_rejected.json");
        assert_eq!(ack, CollectorAck::rejected("unknown source"));
    }

    #[test]
    fn collector_ack_tolerates_extra_fields() {
        let ack: CollectorAck =
            serde_json::from_value(load_fixture("collector_ack_extended.json")).unwrap();
        assert!(ack.success);
        assert_eq!(ack.message, "stored");
        assert_eq!(ack.alert_id, "a1b2c4");
    }
}
