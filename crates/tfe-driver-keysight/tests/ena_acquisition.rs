//! Averaged acquisition on the ENA against the simulated SCPI device.

use std::sync::Arc;
use std::time::Duration;
use tfe_core::codec::TraceData;
use tfe_core::error::{ErrorKind, InstrumentError};
use tfe_core::mock::{MockFailure, MockScpiTransport};
use tfe_core::parameter::Value;
use tfe_core::registry::Bundle;
use tfe_core::transport::{Transport, DEFAULT_TIMEOUT};
use tfe_driver_keysight::{EnaE5071c, TraceRecord};

fn analyzer() -> (Arc<MockScpiTransport>, EnaE5071c) {
    let mock = Arc::new(
        MockScpiTransport::new()
            .with_value(":CALC1:FORM", "MLOG")
            .with_value("TRIG:SOUR", "INT")
            .with_value(":SENS1:SWE:TIME", "+2.50000000000E-001")
            .with_value(":SENS1:FREQ:DATA", "4.0E9,5.0E9")
            .with_reply(":CALC:DATA:FDATA?", "-10.5,45.0,-11.25,46.0"),
    );
    let vna = EnaE5071c::with_transport("vna", mock.clone());
    (mock, vna)
}

#[tokio::test]
async fn test_single_shot_never_enables_averaging() {
    let (mock, mut vna) = analyzer();

    let trace = vna.average(1).await.unwrap();
    assert_eq!(trace, TraceData::Paired(vec![(-10.5, 45.0), (-11.25, 46.0)]));

    assert_eq!(
        mock.writes(),
        vec![
            ":CALC1:FORM PLOG",
            "TRIG:SOUR BUS",
            ":SENS1:AVER 0",
            ":TRIG:AVER 0",
            ":TRIG:SING",
            "TRIG:SOUR INT",
            ":CALC1:FORM MLOG",
        ]
    );
    assert!(!mock.calls().iter().any(|c| c.command() == "*OPC?"));
    assert_eq!(
        mock.timeout_history(),
        vec![Duration::from_millis(750), DEFAULT_TIMEOUT]
    );
}

#[tokio::test]
async fn test_averaged_acquisition_waits_for_completion() {
    let (mock, mut vna) = analyzer();

    let trace = vna.average(5).await.unwrap();
    assert_eq!(trace.len(), 2);

    let writes = mock.writes();
    assert!(writes.contains(&":SENS1:AVER 1".to_string()));
    assert!(writes.contains(&":TRIG:AVER 1".to_string()));
    assert!(writes.contains(&":SENS1:AVER:COUN 5".to_string()));

    let opc = mock
        .calls()
        .iter()
        .position(|c| c.command() == "*OPC?")
        .unwrap();
    let trigger = mock
        .calls()
        .iter()
        .position(|c| c.command() == ":TRIG:SING")
        .unwrap();
    assert!(trigger < opc);

    // 5 sweeps of 0.25 s plus the 0.5 s buffer
    assert_eq!(mock.timeout_history()[0], Duration::from_millis(1750));
}

#[tokio::test]
async fn test_state_restored_when_completion_wait_times_out() {
    let (mock, mut vna) = analyzer();
    mock.fail_on("*OPC?", MockFailure::Timeout);

    let err = vna.average(5).await.unwrap_err();
    assert!(matches!(err, InstrumentError::Timeout { .. }));
    assert_eq!(err.kind(), ErrorKind::Transport);

    let writes = mock.writes();
    assert_eq!(
        &writes[writes.len() - 2..],
        &["TRIG:SOUR INT".to_string(), ":CALC1:FORM MLOG".to_string()]
    );
    assert_eq!(mock.value("TRIG:SOUR").as_deref(), Some("INT"));
    assert_eq!(mock.timeout(), DEFAULT_TIMEOUT);
    assert!(!mock
        .calls()
        .iter()
        .any(|c| c.command() == ":CALC:DATA:FDATA?"));
}

#[tokio::test]
async fn test_reported_state_restored_even_when_unlisted() {
    let (mock, mut vna) = analyzer();
    mock.set_value("TRIG:SOUR", "HOLD");
    mock.set_value(":CALC1:FORM", "MLIN");

    vna.average(1).await.unwrap();

    let writes = mock.writes();
    assert_eq!(
        &writes[writes.len() - 2..],
        &["TRIG:SOUR HOLD".to_string(), ":CALC1:FORM MLIN".to_string()]
    );
    assert_eq!(mock.value("TRIG:SOUR").as_deref(), Some("HOLD"));
}

#[tokio::test]
async fn test_zero_averages_rejected_without_io() {
    let (mock, mut vna) = analyzer();
    let err = vna.average(0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_save_trace_writes_record_and_remembers_path() {
    let (mock, mut vna) = analyzer();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resonator.json");

    let record = vna.save_trace(1, &path).await.unwrap();
    assert_eq!(record.frequency, vec![4.0e9, 5.0e9]);
    assert_eq!(record.power_db, vec![-10.5, -11.25]);
    assert_eq!(record.phase_deg, vec![45.0, 46.0]);
    assert_eq!(TraceRecord::read_json(&path).await.unwrap(), record);
    assert_eq!(vna.previous_save(), Some(path.as_path()));
    assert_eq!(mock.writes().last().map(String::as_str), Some("TRIG:SOUR INT"));

    std::fs::remove_file(&path).unwrap();
    vna.save_trace_previous(1).await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn test_unwritable_format_rejected_before_acquiring() {
    if cfg!(feature = "storage_hdf5") {
        return;
    }
    let (mock, mut vna) = analyzer();
    let dir = tempfile::tempdir().unwrap();

    let err = vna
        .save_trace(100, &dir.path().join("resonator.h5"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(mock.call_count(), 0);
    assert_eq!(vna.previous_save(), None);
}

#[tokio::test]
async fn test_bundle_rejected_before_any_write() {
    let (mock, mut vna) = analyzer();

    let mut bundle = Bundle::new();
    bundle.insert("fcenter".into(), Value::Float(6.5e9));
    bundle.insert("power".into(), Value::Int(30));
    let err = vna.apply_bundle(&bundle).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(mock.writes().is_empty());

    let mut bundle = Bundle::new();
    bundle.insert("fspan".into(), Value::Float(1.0e6));
    bundle.insert("colour".into(), Value::from("red"));
    let err = vna.apply_bundle(&bundle).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    assert!(mock.writes().is_empty());

    let mut bundle = Bundle::new();
    bundle.insert("fcenter".into(), Value::Float(6.5e9));
    bundle.insert("trform".into(), Value::from("PHAS"));
    vna.apply_bundle(&bundle).await.unwrap();
    assert_eq!(
        mock.writes(),
        vec![":SENS1:FREQ:CENT 6500000000", ":CALC1:FORM PHAS"]
    );

    let read = vna.read_bundle(["fcenter", "trform"]).await.unwrap();
    assert_eq!(read.get("fcenter"), Some(&Value::Float(6.5e9)));
    assert_eq!(read.get("trform"), Some(&Value::from("PHAS")));
}
