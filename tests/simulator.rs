//! End-to-end tests against an in-process AMTRON register simulator
//!
//! The simulator speaks Modbus TCP (FC03/FC06) over a real socket so the
//! whole stack runs: transport framing, client, acquirer, coordinator and
//! control mediator.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use amtron_modbus::{
    BlockKind, ChargerError, ControlMediator, Coordinator, ModbusTcpClient, OcppStatus,
    PollScheduler, RegisterTransport, SnapshotAcquirer,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Default)]
struct ChargerState {
    registers: HashMap<u16, u16>,
    /// Addresses answered with exception 02
    unavailable: HashSet<u16>,
    writes: Vec<(u16, u16)>,
}

type SharedState = Arc<Mutex<ChargerState>>;

fn charging_state() -> ChargerState {
    let mut registers = HashMap::new();
    let mut put = |start: u16, words: &[u16]| {
        for (i, w) in words.iter().enumerate() {
            registers.insert(start + i as u16, *w);
        }
    };

    put(104, &[3]);
    put(122, &[3]);
    put(124, &[1]);
    put(140, &[1]);
    put(
        206,
        &[
            0, 100, 0, 50, 0, 25, 0, 2000, 0, 1000, 0, 500, 0x0001, 0xE078, 0, 5000, 0, 230, 0,
            231, 0, 229,
        ],
    );
    put(706, &[16]);
    put(716, &[0, 4500, 0, 1800]);
    put(2000, &[16, 160, 11040]);
    put(2011, &[0]);
    put(2020, &[2, 0, 0, 2]);
    put(2030, &[1]);

    ChargerState {
        registers,
        ..ChargerState::default()
    }
}

fn exception(pdu_fc: u8, code: u8) -> Vec<u8> {
    vec![pdu_fc | 0x80, code]
}

fn handle_pdu(state: &SharedState, pdu: &[u8]) -> Vec<u8> {
    let mut state = state.lock().unwrap();
    let fc = pdu[0];
    let address = u16::from_be_bytes([pdu[1], pdu[2]]);
    let operand = u16::from_be_bytes([pdu[3], pdu[4]]);

    match fc {
        0x03 => {
            let mut out = vec![0x03, (operand * 2) as u8];
            for reg in address..address + operand {
                if state.unavailable.contains(&reg) {
                    return exception(fc, 0x02);
                }
                match state.registers.get(&reg) {
                    Some(w) => out.extend_from_slice(&w.to_be_bytes()),
                    None => return exception(fc, 0x02),
                }
            }
            out
        }
        0x06 => {
            if state.unavailable.contains(&address) {
                return exception(fc, 0x02);
            }
            state.registers.insert(address, operand);
            state.writes.push((address, operand));
            pdu[..5].to_vec()
        }
        _ => exception(fc, 0x01),
    }
}

async fn serve_connection(mut socket: TcpStream, state: SharedState) {
    loop {
        let mut header = [0u8; 7];
        if socket.read_exact(&mut header).await.is_err() {
            return;
        }
        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        let mut pdu = vec![0u8; length - 1];
        if socket.read_exact(&mut pdu).await.is_err() {
            return;
        }

        let reply = handle_pdu(&state, &pdu);
        let mut frame = Vec::with_capacity(7 + reply.len());
        frame.extend_from_slice(&header[..4]);
        frame.extend_from_slice(&((reply.len() + 1) as u16).to_be_bytes());
        frame.push(header[6]);
        frame.extend_from_slice(&reply);
        if socket.write_all(&frame).await.is_err() {
            return;
        }
    }
}

async fn start_simulator(state: ChargerState) -> (u16, SharedState) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let state = Arc::new(Mutex::new(state));

    let shared = state.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve_connection(socket, shared.clone()));
        }
    });
    (port, state)
}

fn coordinator_for(port: u16) -> Arc<Coordinator<ModbusTcpClient>> {
    let client = Arc::new(ModbusTcpClient::new(
        "127.0.0.1",
        port,
        1,
        Duration::from_secs(2),
    ));
    Arc::new(Coordinator::new(SnapshotAcquirer::new(client)))
}

#[tokio::test]
async fn test_full_poll_cycle() {
    let (port, _state) = start_simulator(charging_state()).await;
    let coordinator = coordinator_for(port);

    let snapshot = coordinator.refresh().await.unwrap();

    assert_eq!(snapshot.ocpp_status(), OcppStatus::Charging);
    assert_eq!(snapshot.power_l1, 100);
    assert_eq!(snapshot.power, 175);
    assert_eq!(snapshot.current_l1, 2.0);
    assert_eq!(snapshot.current_l3, 0.5);
    assert_eq!(snapshot.total_energy, 123.0);
    assert_eq!(snapshot.total_power, 5000);
    assert_eq!(snapshot.voltage_l2, 231);
    assert_eq!(snapshot.session_energy, 4.5);
    assert_eq!(snapshot.charging_duration, 1800);
    assert_eq!(snapshot.hems_current_limit, 16);
    assert_eq!(snapshot.hems_power_limit, 11040);
    assert_eq!(snapshot.assigned_phases, 2);
    assert!(snapshot.is_charging_enabled());

    assert!(coordinator.last_update_success());
    assert!(coordinator.last_report().unwrap().is_complete());
    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_meter_exception_degrades_only_meter() {
    let mut state = charging_state();
    state.unavailable.insert(210);
    let (port, _state) = start_simulator(state).await;
    let coordinator = coordinator_for(port);

    let snapshot = coordinator.refresh().await.unwrap();

    assert_eq!(snapshot.power_l1, 0);
    assert_eq!(snapshot.power, 0);
    assert_eq!(snapshot.total_energy, 0.0);
    assert_eq!(snapshot.ocpp_status(), OcppStatus::Charging);
    assert_eq!(snapshot.hems_current_limit, 16);

    let report = coordinator.last_report().unwrap();
    assert!(report.is_degraded(BlockKind::Meter));
    assert_eq!(report.degraded.len(), 1);
}

#[tokio::test]
async fn test_status_exception_fails_cycle() {
    let mut state = charging_state();
    state.unavailable.insert(104);
    let (port, _state) = start_simulator(state).await;
    let coordinator = coordinator_for(port);

    let err = coordinator.refresh().await.unwrap_err();

    assert!(matches!(err, ChargerError::StatusUnavailable(_)));
    assert!(coordinator.latest().is_none());
    assert!(!coordinator.last_update_success());
    // Register errors leave the session usable
    assert!(coordinator.transport().is_connected());
}

#[tokio::test]
async fn test_control_writes_and_refreshes() {
    let (port, state) = start_simulator(charging_state()).await;
    let coordinator = coordinator_for(port);
    let control = ControlMediator::new(coordinator.clone());

    assert_eq!(control.set_current_limit(3.0).await.unwrap(), 0);
    assert_eq!(coordinator.latest().unwrap().hems_current_limit, 0);
    assert_eq!(control.is_charging_enabled(), Some(false));

    assert_eq!(control.set_power_limit(4600.0).await.unwrap(), 4600);
    assert_eq!(coordinator.latest().unwrap().hems_power_limit, 4600);

    assert_eq!(control.enable_charging().await.unwrap(), 16);
    assert_eq!(control.is_charging_enabled(), Some(true));

    let writes = state.lock().unwrap().writes.clone();
    assert_eq!(writes, vec![(2000, 0), (2002, 4600), (2000, 16)]);
}

#[tokio::test]
async fn test_rejected_write_reports_point() {
    let mut state = charging_state();
    state.unavailable.insert(2002);
    let (port, _state) = start_simulator(state).await;
    let coordinator = coordinator_for(port);
    let control = ControlMediator::new(coordinator.clone());

    let err = control.set_power_limit(7360.0).await.unwrap_err();

    assert!(matches!(err, ChargerError::WriteFailed { .. }));
    assert!(err.to_string().contains("power limit"));
}

#[tokio::test]
async fn test_unreachable_charger() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let coordinator = coordinator_for(port);

    let err = coordinator.refresh().await.unwrap_err();
    assert!(matches!(err, ChargerError::Connectivity(_)));
}

#[tokio::test]
async fn test_scheduler_publishes_snapshots() {
    let (port, _state) = start_simulator(charging_state()).await;
    let coordinator = coordinator_for(port);
    let mut updates = coordinator.subscribe();

    let scheduler = Arc::new(PollScheduler::new(
        coordinator.clone(),
        Duration::from_secs(5),
    ));
    let runner = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.start().await })
    };

    tokio::time::timeout(Duration::from_secs(5), updates.changed())
        .await
        .unwrap()
        .unwrap();
    let published = updates.borrow().clone().unwrap();
    assert_eq!(published.power, 175);

    scheduler.stop();
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .unwrap()
        .unwrap();
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn test_out_of_range_write_not_sent() {
    let (port, state) = start_simulator(charging_state()).await;
    let coordinator = coordinator_for(port);
    let control = ControlMediator::new(coordinator.clone());

    let err = control.set_power_limit(70000.0).await.unwrap_err();
    assert!(matches!(err, ChargerError::InvalidRequest { .. }));
    let err = control.set_current_limit(f64::NAN).await.unwrap_err();
    assert!(matches!(err, ChargerError::InvalidRequest { .. }));

    assert!(state.lock().unwrap().writes.is_empty());
    assert_eq!(state.lock().unwrap().registers[&2000], 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_writes_during_polls_share_one_session() {
    let (port, state) = start_simulator(charging_state()).await;
    let coordinator = coordinator_for(port);
    let control = Arc::new(ControlMediator::new(coordinator.clone()));

    let mut tasks = Vec::new();
    for i in 0..20u16 {
        let coordinator = coordinator.clone();
        tasks.push(tokio::spawn(async move {
            coordinator.refresh().await.map(|_| ())
        }));
        let control = control.clone();
        tasks.push(tokio::spawn(async move {
            control.set_current_limit(f64::from(6 + i)).await.map(|_| ())
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let writes = state.lock().unwrap().writes.clone();
    assert_eq!(writes.len(), 20);
    let mut values: Vec<u16> = writes.iter().map(|(_, v)| *v).collect();
    values.sort_unstable();
    assert_eq!(values, (6..26).collect::<Vec<u16>>());

    // Last write wins on the device; a final cycle must see it
    let last = state.lock().unwrap().registers[&2000];
    let snapshot = coordinator.refresh().await.unwrap();
    assert_eq!(snapshot.hems_current_limit, last);
    assert_eq!(coordinator.latest().unwrap().hems_current_limit, last);
}
