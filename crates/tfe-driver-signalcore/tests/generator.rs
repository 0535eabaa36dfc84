//! SC5511A driver against the simulated vendor library.

use std::sync::Arc;
use tfe_core::codec::Identity;
use tfe_core::error::ErrorKind;
use tfe_core::parameter::Value;
use tfe_core::registry::Bundle;
use tfe_driver_signalcore::{Sc5511a, SimulatedSc5511a};

const SERIAL: &str = "10001A2B";

async fn generator() -> (Arc<SimulatedSc5511a>, Sc5511a) {
    let lib = Arc::new(SimulatedSc5511a::new(SERIAL));
    let generator = Sc5511a::open("lo", SERIAL, lib.clone()).await.unwrap();
    (lib, generator)
}

#[tokio::test]
async fn test_open_enables_leveling_and_external_reference() {
    let (lib, generator) = generator().await;

    let status = lib.status();
    assert_eq!(status.operate.auto_pwr_disable, 1);
    assert_eq!(status.operate.ext_ref_lock_enable, 1);
    assert_eq!(generator.parameters().auto_level_disable.get().await.unwrap(), 0);
    assert_eq!(generator.parameters().reference_source.get().await.unwrap(), 1);
    assert_eq!(lib.open_handles(), 0);
}

#[tokio::test]
async fn test_open_keeps_external_lock_when_already_enabled() {
    let lib = Arc::new(SimulatedSc5511a::new(SERIAL));
    lib.set_ext_ref_lock(1);
    lib.fail_on("set_clock_reference");

    let generator = Sc5511a::open("lo", SERIAL, lib.clone()).await.unwrap();
    assert_eq!(generator.serial(), SERIAL);
}

#[tokio::test]
async fn test_identify() {
    let (_lib, generator) = generator().await;

    let id = generator.identify().await.unwrap();
    assert_eq!(id.vendor, "SignalCore");
    assert_eq!(id.model, "SC5511A");
    assert_eq!(id.serial_number, SERIAL);
    assert_eq!(id.manufacture_date.to_string(), "3/15/2021");

    let generic = Identity::from(&id);
    assert_eq!(generic.serial, SERIAL);
}

#[tokio::test]
async fn test_parameters_reach_the_device() {
    let (lib, generator) = generator().await;
    let params = generator.parameters();

    params.frequency.set(6.5e9).await.unwrap();
    params.power.set(-3.5).await.unwrap();
    params.output_status.set(1).await.unwrap();

    let rf = lib.rf_parameters();
    assert_eq!(rf.rf1_freq, 6_500_000_000);
    assert_eq!(rf.rf_level, -3.5);
    assert_eq!(lib.status().operate.rf1_out_enable, 1);

    assert_eq!(params.frequency.get().await.unwrap(), 6.5e9);
    assert_eq!(params.power.get().await.unwrap(), -3.5);
    assert_eq!(params.output_status.get().await.unwrap(), 1);
}

#[tokio::test]
async fn test_auto_level_is_inverted_on_the_wire() {
    let (lib, generator) = generator().await;
    let auto_level = &generator.parameters().auto_level_disable;

    auto_level.set(1).await.unwrap();
    assert_eq!(lib.status().operate.auto_pwr_disable, 0);
    assert_eq!(auto_level.get().await.unwrap(), 1);

    auto_level.set(0).await.unwrap();
    assert_eq!(lib.status().operate.auto_pwr_disable, 1);
}

#[tokio::test]
async fn test_out_of_range_values_rejected_without_io() {
    let (lib, generator) = generator().await;
    let (opens, _) = lib.handle_counts();

    let err = generator.parameters().power.set(25.0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = generator.parameters().frequency.set(21e9).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert_eq!(lib.handle_counts().0, opens);
}

#[tokio::test]
async fn test_temperature_is_read_only() {
    let (lib, generator) = generator().await;
    lib.set_temperature(38.25);

    assert_eq!(generator.parameters().temperature.get().await.unwrap(), 38.25);
    let err = generator.parameters().temperature.set(20.0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
}

#[tokio::test]
async fn test_every_call_closes_its_handle() {
    let (lib, generator) = generator().await;
    let (opens, closes) = lib.handle_counts();
    assert_eq!(opens, closes);

    generator.parameters().frequency.set(1e9).await.unwrap();
    generator.rf_parameters().await.unwrap();
    generator.device_status().await.unwrap();

    let (opens_after, closes_after) = lib.handle_counts();
    assert_eq!(opens_after, opens + 3);
    assert_eq!(closes_after, closes + 3);

    lib.fail_on("set_level");
    let err = generator.parameters().power.set(0.0).await.unwrap_err();
    assert!(err.is_transport());
    assert_eq!(lib.open_handles(), 0);
}

#[tokio::test]
async fn test_bundle_shares_one_handle() {
    let (lib, mut generator) = generator().await;
    let (opens, _) = lib.handle_counts();

    let mut bundle = Bundle::new();
    bundle.insert("frequency".into(), Value::Float(7e9));
    bundle.insert("output_status".into(), Value::Int(1));
    bundle.insert("power".into(), Value::Float(5.0));
    generator.apply_bundle(&bundle).await.unwrap();

    assert_eq!(lib.handle_counts().0, opens + 1);
    assert_eq!(lib.open_handles(), 0);
    assert_eq!(lib.rf_parameters().rf1_freq, 7_000_000_000);

    let read = generator
        .read_bundle(["frequency", "output_status"])
        .await
        .unwrap();
    assert_eq!(read["output_status"], Value::Int(1));
}

#[tokio::test]
async fn test_invalid_bundle_writes_nothing() {
    let (lib, mut generator) = generator().await;

    let mut bundle = Bundle::new();
    bundle.insert("frequency".into(), Value::Float(7e9));
    bundle.insert("power".into(), Value::Float(99.0));
    let err = generator.apply_bundle(&bundle).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(lib.rf_parameters().rf1_freq, 5_000_000_000);
    assert_eq!(lib.open_handles(), 0);
}

#[tokio::test]
async fn test_bundle_error_survives_failed_release() {
    let (lib, mut generator) = generator().await;
    lib.fail_on("set_freq");
    lib.fail_on("close_device");

    let mut bundle = Bundle::new();
    bundle.insert("frequency".into(), Value::Float(7e9));
    let err = generator.apply_bundle(&bundle).await.unwrap_err();

    assert!(err.to_string().contains("set_freq"));
    assert_eq!(lib.open_handles(), 0);
}

#[tokio::test]
async fn test_held_session_across_calls() {
    let (lib, mut generator) = generator().await;
    let (opens, _) = lib.handle_counts();

    generator.hold_open().unwrap();
    generator.parameters().power.set(1.0).await.unwrap();
    generator.parameters().power.set(2.0).await.unwrap();
    assert_eq!(lib.open_handles(), 1);
    generator.release().unwrap();

    assert_eq!(lib.handle_counts().0, opens + 1);
    assert_eq!(lib.open_handles(), 0);
}
