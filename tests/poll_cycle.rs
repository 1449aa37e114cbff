//! End-to-end poll cycle tests against an in-process mock controller.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use heatsrv::config::{ControllerConfig, LogConfig, PollConfig};
use heatsrv::{FieldUpdate, FieldValue, HeatSrvConfig, PollService};

/// Mock controller serving fixed register groups over the socket protocol.
/// Reads are answered from the payload tables; writes are echoed verbatim.
async fn run_mock_controller(listener: TcpListener, params: Vec<i32>, calc: Vec<i32>) {
    loop {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let params = params.clone();
        let calc = calc.clone();
        tokio::spawn(async move {
            let mut header = [0u8; 8];
            while socket.read_exact(&mut header).await.is_ok() {
                let code = i32::from_be_bytes([header[0], header[1], header[2], header[3]]);
                let payload: Vec<i32> = match code {
                    3002 => {
                        let mut value = [0u8; 4];
                        if socket.read_exact(&mut value).await.is_err() {
                            break;
                        }
                        let index =
                            i32::from_be_bytes([header[4], header[5], header[6], header[7]]);
                        vec![index, i32::from_be_bytes(value)]
                    },
                    3003 => params.clone(),
                    3004 => calc.clone(),
                    3005 => Vec::new(),
                    _ => break,
                };
                let mut frame = Vec::new();
                frame.extend_from_slice(&code.to_be_bytes());
                frame.extend_from_slice(&(payload.len() as i32).to_be_bytes());
                for v in &payload {
                    frame.extend_from_slice(&v.to_be_bytes());
                }
                if socket.write_all(&frame).await.is_err() {
                    break;
                }
            }
        });
    }
}

fn calc_payload() -> Vec<i32> {
    let mut p = vec![0i32; 300];
    p[10] = 455; // supply 45.5 °C
    p[11] = 400; // return 40.0 °C
    p[15] = -53; // outside -5.3 °C
    p[19] = 92;
    p[20] = 58;
    p[80] = 0; // heating
    p[173] = 1200;
    p[231] = 64;
    p[257] = 3000;
    p[268] = 1000;
    p
}

fn params_payload() -> Vec<i32> {
    let mut p = vec![0i32; 120];
    p[1] = 5;
    p[3] = 0;
    p[4] = 0;
    p[105] = 450;
    p[108] = 0;
    p
}

fn config(port: u16) -> HeatSrvConfig {
    HeatSrvConfig {
        controller: ControllerConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout_ms: 500,
            read_timeout_ms: 300,
            retry_attempts: 2,
            retry_backoff_ms: 10,
        },
        poll: PollConfig {
            interval_secs: 3600,
            heartbeat_secs: 300,
            epsilon: 0.0,
        },
        log: LogConfig::default(),
    }
}

async fn drain(rx: &mut mpsc::Receiver<FieldUpdate>) -> Vec<FieldUpdate> {
    let mut updates = Vec::new();
    while let Ok(Some(update)) = tokio::time::timeout(Duration::from_millis(400), rx.recv()).await
    {
        updates.push(update);
    }
    updates
}

#[tokio::test]
async fn full_poll_cycle_decodes_and_forwards() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(run_mock_controller(listener, params_payload(), calc_payload()));

    let (tx, mut rx) = mpsc::channel(256);
    let service = PollService::new(config(port), tx);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(service.run(shutdown.clone()));

    let updates = drain(&mut rx).await;
    assert!(!updates.is_empty());

    let find = |id: &str| {
        updates
            .iter()
            .find(|u| u.field == id)
            .unwrap_or_else(|| panic!("missing update for {id}"))
    };

    assert_eq!(find("supply_temperature").value, FieldValue::Numeric(45.5));
    assert_eq!(find("outside_temperature").value, FieldValue::Numeric(-5.3));
    assert_eq!(
        find("operating_state").value,
        FieldValue::Label("heating".to_string())
    );
    assert_eq!(find("dhw_temperature_target").value, FieldValue::Numeric(45.0));
    assert_eq!(find("cooling_enabled").value, FieldValue::Flag(false));

    // Derived fields from the same cycle.
    assert_eq!(find("cop").value, FieldValue::Numeric(3.0));
    let FieldValue::Numeric(flow_delta) = find("flow_temperature_delta").value else {
        panic!("flow delta should be numeric");
    };
    assert!((flow_delta - 5.5).abs() < 1e-9);
    let FieldValue::Numeric(brine_delta) = find("brine_temperature_delta").value else {
        panic!("brine delta should be numeric");
    };
    assert!((brine_delta - 3.4).abs() < 1e-9);

    // All updates of one cycle carry the same timestamp.
    assert!(updates.iter().all(|u| u.timestamp == updates[0].timestamp));

    shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn write_path_validates_and_refreshes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(run_mock_controller(listener, params_payload(), calc_payload()));

    let (tx, mut rx) = mpsc::channel(256);
    let service = PollService::new(config(port), tx);
    let handle = service.handle();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(service.run(shutdown.clone()));

    // Initial burst.
    let initial = drain(&mut rx).await;
    assert!(!initial.is_empty());

    // Out-of-set value never reaches the wire.
    assert!(handle
        .write_parameter("dhw_temperature_target", 123)
        .await
        .is_err());

    // Valid write is acknowledged by the echoing mock.
    handle
        .write_parameter("dhw_temperature_target", 455)
        .await
        .unwrap();

    shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn snapshot_failure_keeps_previous_state() {
    // A controller that answers the first connection, then goes silent:
    // reads time out and the cycle is abandoned without killing the service.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut header = [0u8; 8];
        // Answer exactly three reads (one full cycle), then stop responding.
        for _ in 0..3 {
            if socket.read_exact(&mut header).await.is_err() {
                return;
            }
            let code = i32::from_be_bytes([header[0], header[1], header[2], header[3]]);
            let payload = match code {
                3004 => calc_payload(),
                3003 => params_payload(),
                _ => Vec::new(),
            };
            let mut frame = Vec::new();
            frame.extend_from_slice(&code.to_be_bytes());
            frame.extend_from_slice(&(payload.len() as i32).to_be_bytes());
            for v in &payload {
                frame.extend_from_slice(&v.to_be_bytes());
            }
            socket.write_all(&frame).await.unwrap();
        }
        // Hold the socket open without answering further requests.
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let (tx, mut rx) = mpsc::channel(256);
    let mut cfg = config(port);
    cfg.poll.interval_secs = 1;
    let service = PollService::new(cfg, tx);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(service.run(shutdown.clone()));

    let initial = drain(&mut rx).await;
    assert!(!initial.is_empty());

    // Subsequent cycles fail; nothing is forwarded and the service lives on.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!task.is_finished());

    shutdown.cancel();
    task.await.unwrap().unwrap();
}
