//! AD5760 driver against the simulated board.

use std::sync::Arc;
use std::time::Duration;
use tfe_core::error::ErrorKind;
use tfe_core::parameter::Value;
use tfe_core::registry::Bundle;
use tfe_driver_sinko::conversion::voltage_to_code;
use tfe_driver_sinko::{Ad5760, SimulatedBoard};

/// One 16-bit step of the -10..10 V span.
const LSB: f64 = 20.0 / 65536.0;

async fn source() -> (Arc<SimulatedBoard>, Ad5760) {
    let board = Arc::new(SimulatedBoard::new());
    let source = Ad5760::with_client("coil", board.clone()).await.unwrap();
    (board, source)
}

fn data_writes(board: &SimulatedBoard) -> Vec<u32> {
    board
        .writes()
        .into_iter()
        .filter(|(address, _)| address == "1")
        .map(|(_, value)| value.parse().unwrap())
        .collect()
}

#[tokio::test]
async fn test_initialization_enables_output() {
    let (board, source) = source().await;
    assert_eq!(board.writes(), vec![("2".to_string(), "786".to_string())]);
    assert_eq!(source.parameters().output.get().await.unwrap(), "on");
}

#[tokio::test]
async fn test_output_toggles_ground_clamp() {
    let (board, source) = source().await;

    source.off().await.unwrap();
    assert_eq!(board.register("2"), Some(790));
    assert_eq!(source.parameters().output.get().await.unwrap(), "off");

    source.on().await.unwrap();
    assert_eq!(board.register("2"), Some(786));

    let err = source
        .parameters()
        .output
        .set("standby".to_string())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_voltage_written_as_decimal_code() {
    let (board, source) = source().await;
    board.clear_writes();

    source.parameters().voltage.set(5.0).await.unwrap();
    assert_eq!(board.writes(), vec![("1".to_string(), "49152".to_string())]);
    assert_eq!(board.register("1"), Some(0xC0000));
    assert_eq!(source.parameters().voltage.get().await.unwrap(), 5.0);
}

#[tokio::test]
async fn test_current_is_voltage_over_hundred() {
    let (board, source) = source().await;
    board.clear_writes();

    source.parameters().current.set(0.05).await.unwrap();
    assert_eq!(data_writes(&board), vec![voltage_to_code(5.0)]);

    let amps = source.parameters().current.get().await.unwrap();
    assert!((amps - 0.05).abs() < LSB / 100.0);

    let err = source.parameters().current.set(0.2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(data_writes(&board).len(), 1);
}

#[tokio::test]
async fn test_out_of_range_voltage_not_sent() {
    let (board, source) = source().await;
    board.clear_writes();

    let err = source.parameters().voltage.set(10.5).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(board.writes().is_empty());
}

#[tokio::test]
async fn test_unreachable_board_is_transport_error() {
    let board = Arc::new(SimulatedBoard::new());
    let source = Ad5760::with_client("coil", board.clone()).await.unwrap();
    board.set_offline(true);

    let err = source.parameters().voltage.get().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test(start_paused = true)]
async fn test_ramp_voltage_up() {
    let (board, mut source) = source().await;
    board.clear_writes();
    let start = tokio::time::Instant::now();

    let writes = source
        .ramp_voltage(1.0, 0.25, Duration::from_millis(10))
        .await
        .unwrap();

    assert_eq!(writes, 4);
    assert_eq!(
        data_writes(&board),
        vec![
            voltage_to_code(0.25),
            voltage_to_code(0.5),
            voltage_to_code(0.75),
            voltage_to_code(1.0),
        ]
    );
    assert_eq!(start.elapsed(), Duration::from_millis(30));
    let volts = source.parameters().voltage.get().await.unwrap();
    assert!((volts - 1.0).abs() < LSB);
}

#[tokio::test(start_paused = true)]
async fn test_ramp_current_down_ends_on_target() {
    let (board, mut source) = source().await;
    source.parameters().current.set(0.02).await.unwrap();
    board.clear_writes();

    let writes = source
        .ramp_current(-0.01, 0.01, Duration::from_millis(5))
        .await
        .unwrap();

    assert_eq!(writes, 3);
    assert_eq!(
        data_writes(&board).last().copied(),
        Some(voltage_to_code(-1.0))
    );
}

#[tokio::test(start_paused = true)]
async fn test_ramp_to_unreachable_target_moves_nothing() {
    let (board, mut source) = source().await;
    board.clear_writes();

    let err = source
        .ramp_voltage(12.0, 0.5, Duration::from_millis(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(board.writes().is_empty());
}

#[tokio::test]
async fn test_bundle() {
    let (board, mut source) = source().await;
    board.clear_writes();

    let mut bundle = Bundle::new();
    bundle.insert("output".into(), Value::from("off"));
    bundle.insert("voltage".into(), Value::Float(-2.5));
    source.apply_bundle(&bundle).await.unwrap();

    assert_eq!(board.register("2"), Some(790));
    let read = source.read_bundle(["output", "voltage"]).await.unwrap();
    assert_eq!(read["output"], Value::from("off"));
    assert_eq!(read["voltage"], Value::Float(-2.5));
}
