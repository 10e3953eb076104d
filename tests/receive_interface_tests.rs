//! Receive-interface integration tests against the mock controller.

mod common;

use common::{MockController, MockOptions};
use std::time::{Duration, Instant};
use ur_rtde::{RtdeError, RtdeReceiveInterface};

fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut predicate: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    predicate()
}

#[test]
fn handshake_pins_v2_and_streams_first_frame() {
    let mock = MockController::spawn(MockOptions::default());
    let receive = RtdeReceiveInterface::with_variables(
        "127.0.0.1",
        mock.rtde_port(),
        &["timestamp", "robot_status_bits"],
        Some(500.0),
    )
    .unwrap();

    assert!(receive.is_connected());
    // The constructor already waited for the first frame.
    assert!(receive.timestamp() > 0.0);
    // Power-on bit from the mock's initial status word.
    assert_eq!(receive.robot_status_bits() & 0b1, 0b1);
}

#[test]
fn snapshot_advances_at_controller_rate() {
    let mock = MockController::spawn(MockOptions::default());
    let receive = RtdeReceiveInterface::with_variables(
        "127.0.0.1",
        mock.rtde_port(),
        &["timestamp", "actual_q", "actual_TCP_pose"],
        None,
    )
    .unwrap();

    let first = receive.timestamp();
    assert!(wait_until(Duration::from_secs(1), || {
        receive.timestamp() > first
    }));
    assert_eq!(receive.actual_q(), [0.0, -1.57, 0.0, -1.57, 0.0, 0.0]);
}

#[test]
fn falls_back_to_protocol_v1() {
    let options = MockOptions {
        accept_v2: false,
        version: (3, 14, 0, 0),
        ..MockOptions::default()
    };
    let mock = MockController::spawn(options);
    let receive = RtdeReceiveInterface::with_variables(
        "127.0.0.1",
        mock.rtde_port(),
        &["timestamp"],
        None,
    )
    .unwrap();

    // CB-series native rate is selected when no override is given.
    assert_eq!(receive.frequency(), 125.0);
    assert!(receive.timestamp() > 0.0);
}

#[test]
fn unknown_variable_is_fatal() {
    let mock = MockController::spawn(MockOptions::default());
    let err = match RtdeReceiveInterface::with_variables(
        "127.0.0.1",
        mock.rtde_port(),
        &["timestamp", "definitely_not_a_variable"],
        None,
    ) {
        Ok(_) => panic!("setup should fail for an unknown variable"),
        Err(e) => e,
    };
    assert!(matches!(err, RtdeError::Protocol(_)));
    assert!(err.to_string().contains("definitely_not_a_variable"));
}

#[test]
fn reconnect_restores_streaming() {
    let mock = MockController::spawn(MockOptions::default());
    let receive = RtdeReceiveInterface::with_variables(
        "127.0.0.1",
        mock.rtde_port(),
        &["timestamp"],
        None,
    )
    .unwrap();
    assert!(receive.is_connected());

    mock.kill_connections();
    assert!(wait_until(Duration::from_secs(2), || !receive.is_connected()));
    assert!(receive.take_receive_error().is_some());

    receive.reconnect().unwrap();
    assert!(receive.is_connected());
    let t = receive.timestamp();
    assert!(wait_until(Duration::from_millis(500), || {
        receive.timestamp() > t
    }));
}

#[test]
fn digital_out_word_reaches_getters() {
    let mock = MockController::spawn(MockOptions::default());
    mock.state().lock().unwrap().digital_output_bits = 0b1010;

    let receive = RtdeReceiveInterface::with_variables(
        "127.0.0.1",
        mock.rtde_port(),
        &["timestamp", "actual_digital_output_bits"],
        None,
    )
    .unwrap();

    assert!(wait_until(Duration::from_secs(1), || {
        receive.actual_digital_output_bits() == 0b1010
    }));
    assert!(receive.digital_out_state(1));
    assert!(receive.digital_out_state(3));
    assert!(!receive.digital_out_state(0));
    assert!(!receive.digital_out_state(2));
}
