// src/hal/tests.rs
//! Unit tests for HAL types

use crate::hal::*;

#[test]
fn test_channel_selection_maps_outputs_to_channels() {
    let selection = ChannelSelection::new(vec![false, true, false, true]);

    assert_eq!(selection.len(), 4);
    assert_eq!(selection.active_count(), 2);
    assert_eq!(selection.active_channels(), vec![1, 3]);
    assert!(selection.is_active(3));
    assert!(!selection.is_active(0));
    assert!(!selection.is_active(17));
}

#[test]
fn test_channel_selection_default() {
    let selection = ChannelSelection::default();
    assert_eq!(selection.flags(), &[true, true]);
    assert_eq!(selection.active_channels(), vec![0, 1]);
}

#[test]
fn test_channel_selection_serializes_as_plain_list() {
    let selection: ChannelSelection = vec![true, false].into();
    let json = serde_json::to_string(&selection).unwrap();
    assert_eq!(json, "[true,false]");
}

#[test]
fn test_input_range_full_scale() {
    assert_eq!(InputRange::default(), InputRange::PlusMinus25V);
    assert_eq!(InputRange::PlusMinus25V.full_scale_volts(), 25.0);
    assert_eq!(InputRange::PlusMinus2_5V.full_scale_volts(), 2.5);
}

#[test]
fn test_trigger_enums_use_snake_case() {
    assert_eq!(
        serde_json::to_string(&TriggerSource::Channel1XorChannel2).unwrap(),
        "\"channel1_xor_channel2\""
    );
    assert_eq!(
        serde_json::to_string(&TriggerMode::DigitalOrAnalog).unwrap(),
        "\"digital_or_analog\""
    );

    let trigger: ChannelTrigger =
        serde_json::from_str(r#"{"condition":"low_level","mode":"external","level":0.25}"#).unwrap();
    assert_eq!(trigger.condition, TriggerCondition::LowLevel);
    assert_eq!(trigger.mode, TriggerMode::External);
    assert_eq!(trigger.level, 0.25);
}

#[test]
fn test_device_error_display() {
    let err = DeviceError::InvalidChannel { channel: 4, available: 2 };
    assert!(err.to_string().contains('4'));
    assert_eq!(DeviceError::Cancelled, DeviceError::Cancelled.clone());
}

#[test]
fn test_devices_are_object_safe() {
    fn assert_send_sync<T: Send + Sync + ?Sized>() {}
    assert_send_sync::<dyn AnalogInDevice>();
    assert_send_sync::<dyn DeviceConnector>();
}

#[test]
fn test_fetch_cancel_clones_share_one_flag() {
    let cancel = FetchCancel::new();
    let seen_by_device = cancel.clone();
    let sibling = FetchCancel::new();

    cancel.arm();
    assert!(seen_by_device.is_cancelled());
    assert!(!sibling.is_cancelled());

    seen_by_device.disarm();
    assert!(!cancel.is_cancelled());
}
