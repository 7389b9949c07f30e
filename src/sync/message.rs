//! Wire format of the sync link
//!
//! Frames are JSON text. SP frames are a controller snapshot with `"mode": "SP"`
//! added, DP frames carry both players plus a timestamp under `"mode": "DP"`.
//! Frames without a mode come from older peers and are read as SP.

use serde_json::Value;
use std::sync::Arc;

use super::sync_handler::SyncError;
use crate::controller::{ControllerSnapshot, DualSnapshot, MonitorSnapshot};

const MODE_FIELD: &str = "mode";

pub fn encode(snapshot: &MonitorSnapshot) -> Result<String, SyncError> {
    let body = match snapshot {
        MonitorSnapshot::Single(single) => serde_json::to_value(single.as_ref()),
        MonitorSnapshot::Dual(dual) => serde_json::to_value(dual),
    };
    let mut body = body.map_err(|e| SyncError::Encode(e.to_string()))?;
    let mode = serde_json::to_value(snapshot.mode()).map_err(|e| SyncError::Encode(e.to_string()))?;

    match &mut body {
        Value::Object(fields) => {
            fields.insert(MODE_FIELD.to_string(), mode);
        }
        other => {
            return Err(SyncError::Encode(format!(
                "snapshot did not serialize to an object: {}",
                other
            )))
        }
    }

    serde_json::to_string(&body).map_err(|e| SyncError::Encode(e.to_string()))
}

pub fn decode(text: &str) -> Result<MonitorSnapshot, SyncError> {
    let body: Value = serde_json::from_str(text).map_err(|e| SyncError::Decode(e.to_string()))?;

    match body.get(MODE_FIELD).and_then(Value::as_str) {
        Some("DP") => serde_json::from_value::<DualSnapshot>(body)
            .map(MonitorSnapshot::Dual)
            .map_err(|e| SyncError::Decode(e.to_string())),
        _ => serde_json::from_value::<ControllerSnapshot>(body)
            .map(|single| MonitorSnapshot::Single(Arc::new(single)))
            .map_err(|e| SyncError::Decode(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::input_source::Device;
    use crate::controller::SamplerSettings;

    fn busy_snapshot() -> ControllerSnapshot {
        let settings = SamplerSettings::default();
        let mut buttons = vec![false; 17];
        buttons[5] = true;
        let mut device = Device {
            index: 0,
            name: "pad".into(),
            buttons,
            axes: vec![0.0, 0.25],
        };

        let first = ControllerSnapshot::next(&device, None, 1_000, &settings);
        device.buttons[5] = false;
        device.axes[1] = 0.5;
        ControllerSnapshot::next(&device, Some(&first), 1_040, &settings)
    }

    #[test]
    fn single_round_trip_is_lossless() {
        let snapshot = MonitorSnapshot::Single(Arc::new(busy_snapshot()));

        let text = encode(&snapshot).unwrap_or_default();
        let decoded = decode(&text).ok();

        assert_eq!(decoded, Some(snapshot));
    }

    #[test]
    fn dual_round_trip_keeps_missing_player() {
        let snapshot = MonitorSnapshot::Dual(DualSnapshot {
            player1: Some(Arc::new(busy_snapshot())),
            player2: None,
            timestamp: 1_040,
        });

        let text = encode(&snapshot).unwrap_or_default();
        assert_eq!(decode(&text).ok(), Some(snapshot));
    }

    #[test]
    fn frames_use_camel_case_layout() {
        let text = encode(&MonitorSnapshot::Single(Arc::new(busy_snapshot()))).unwrap_or_default();
        let value: Value = serde_json::from_str(&text).unwrap_or_default();

        assert_eq!(value["mode"], "SP");
        assert_eq!(value["keys"][0]["isPressed"], false);
        assert_eq!(value["keys"][0]["strokeCount"], 1);
        assert_eq!(value["keys"][0]["releaseTime"], 40);
        assert_eq!(value["record"]["releaseTimes"][0], 40);
        assert_eq!(value["scratch"]["state"], 1);
        assert!(value["scratch"]["currentAxes"].is_number());
    }

    #[test]
    fn untagged_frame_reads_as_single() {
        let mut value = serde_json::to_value(busy_snapshot()).unwrap_or_default();
        if let Value::Object(fields) = &mut value {
            fields.remove("mode");
        }

        let decoded = decode(&value.to_string()).ok();
        assert!(matches!(decoded, Some(MonitorSnapshot::Single(_))));
    }

    #[test]
    fn legacy_frame_without_newer_fields_still_decodes() {
        let mut value = serde_json::to_value(busy_snapshot()).unwrap_or_default();
        if let Some(record) = value.get_mut("record").and_then(Value::as_object_mut) {
            record.remove("keyReleaseTimes");
            record.remove("scratchTimes");
            record.remove("scratchRotationDistances");
        }
        if let Some(scratch) = value.get_mut("scratch").and_then(Value::as_object_mut) {
            scratch.remove("rotationDistance");
            scratch.remove("rotationTime");
            scratch.remove("strokeDistance");
        }

        match decode(&value.to_string()) {
            Ok(MonitorSnapshot::Single(snapshot)) => {
                assert_eq!(snapshot.stats.release_latencies.front(), Some(&40));
                assert!(snapshot.stats.per_key_release_latencies.iter().all(|key| key.is_empty()));
                assert_eq!(snapshot.scratch.cumulative_stroke_distance, 0.0);
                assert_eq!(snapshot.scratch.rotation_timestamp, 0);
            }
            other => panic!("expected SP snapshot, got {:?}", other),
        }
    }

    #[test]
    fn unknown_mode_reads_as_single() {
        let mut value = serde_json::to_value(busy_snapshot()).unwrap_or_default();
        if let Value::Object(fields) = &mut value {
            fields.insert("mode".into(), Value::String("XP".into()));
        }

        assert!(matches!(
            decode(&value.to_string()),
            Ok(MonitorSnapshot::Single(_))
        ));
    }

    #[test]
    fn malformed_frames_are_decode_errors() {
        assert!(matches!(decode("{not json"), Err(SyncError::Decode(_))));
        assert!(matches!(
            decode(r#"{"mode":"DP","player1":42}"#),
            Err(SyncError::Decode(_))
        ));
    }
}
