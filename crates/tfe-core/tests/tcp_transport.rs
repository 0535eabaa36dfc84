//! TCP SCPI transport against a loopback fake instrument.

use std::sync::Arc;
use std::time::Duration;
use tfe_core::error::{ErrorKind, InstrumentError};
use tfe_core::parameter::{Domain, Parameter};
use tfe_core::transport::{SharedTransport, TcpScpiTransport, Transport};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Accept one connection and answer queries from a tiny lookup table.
/// `*OPC?` is never answered so callers can exercise the timeout path.
async fn spawn_fake_instrument() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = socket.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let mut power = "-10".to_string();

        while let Ok(Some(line)) = lines.next_line().await {
            let reply = match line.trim() {
                "*IDN?" => Some("Agilent Technologies,E5071C,MY46100000,A.09.10".to_string()),
                ":SOUR1:POW?" => Some(power.clone()),
                ":SENS1:SWE:POIN?" => Some("+201".to_string()),
                "*OPC?" => None,
                "BYE" => break,
                other => {
                    if let Some(value) = other.strip_prefix(":SOUR1:POW ") {
                        power = value.to_string();
                    }
                    None
                }
            };
            if let Some(reply) = reply {
                write_half
                    .write_all(format!("{}\n", reply).as_bytes())
                    .await
                    .unwrap();
            }
        }
    });

    address
}

#[tokio::test]
async fn test_query_and_parameter_round_trip() {
    let address = spawn_fake_instrument().await;
    let transport: SharedTransport = Arc::new(
        TcpScpiTransport::connect(&address, Duration::from_secs(2))
            .await
            .unwrap(),
    );

    let idn = transport.ask("*IDN?").await.unwrap();
    assert!(idn.starts_with("Agilent Technologies,E5071C"));

    let power = Parameter::<f64>::new("power")
        .with_domain(Domain::numbers(-85.0, 10.0))
        .scpi_query(&transport, ":SOUR1:POW?")
        .scpi_command(&transport, ":SOUR1:POW {}");
    power.set(-25.5).await.unwrap();
    assert_eq!(power.get().await.unwrap(), -25.5);

    let points = Parameter::<i64>::new("num_points").scpi_query(&transport, ":SENS1:SWE:POIN?");
    assert_eq!(points.get().await.unwrap(), 201);
}

#[tokio::test]
async fn test_unanswered_query_times_out() {
    let address = spawn_fake_instrument().await;
    let transport = TcpScpiTransport::connect(&address, Duration::from_secs(2))
        .await
        .unwrap()
        .with_timeout(Duration::from_millis(100));

    let err = transport.ask("*OPC?").await.unwrap_err();
    assert!(matches!(err, InstrumentError::Timeout { .. }));
    assert_eq!(err.kind(), ErrorKind::Transport);

    // The channel stays usable after a timeout
    assert_eq!(transport.ask(":SENS1:SWE:POIN?").await.unwrap(), "+201");
}

#[tokio::test]
async fn test_closed_connection_is_transport_error() {
    let address = spawn_fake_instrument().await;
    let transport = TcpScpiTransport::connect(&address, Duration::from_secs(2))
        .await
        .unwrap();

    transport.write("BYE").await.unwrap();
    let err = transport.ask("*IDN?").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}
