use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use railbench::error::RigError;
use railbench::sync::barrier::{AwaitService, WaitOutcome};

fn http_get(addr: SocketAddr, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).unwrap();
    write!(
        stream,
        "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
    )
    .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();

    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap();
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_default();
    (status, body)
}

fn bind_local() -> Arc<AwaitService> {
    Arc::new(AwaitService::bind("127.0.0.1:0").unwrap())
}

#[test]
fn test_liveness_endpoint_responds() {
    let service = bind_local();
    let (status, body) = http_get(service.local_addr(), "/");
    assert_eq!(status, 200);
    assert!(body.contains("up and running"));
}

#[test]
fn test_unknown_path_is_not_found() {
    let service = bind_local();
    let (status, _) = http_get(service.local_addr(), "/nope");
    assert_eq!(status, 404);
}

#[test]
fn test_continue_without_an_armed_wait_is_a_client_error() {
    let service = bind_local();
    let (status, _) = http_get(service.local_addr(), "/continue");
    assert_eq!(status, 400);
}

#[test]
fn test_continue_releases_an_armed_wait() {
    let service = bind_local();
    let addr = service.local_addr();

    let signaller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        let (status, _) = http_get(addr, "/continue");
        assert_eq!(status, 200);
    });

    let outcome = service.arm(Some(Duration::from_secs(5))).unwrap();
    assert_eq!(outcome, WaitOutcome::Satisfied);
    signaller.join().unwrap();
}

#[test]
fn test_timed_out_wait_leaves_the_barrier_re_armable() {
    let service = bind_local();

    let outcome = service.arm(Some(Duration::from_millis(200))).unwrap();
    assert_eq!(outcome, WaitOutcome::TimedOut);

    // the slot was cleared; a later arm works
    let outcome = service.arm(Some(Duration::from_millis(200))).unwrap();
    assert_eq!(outcome, WaitOutcome::TimedOut);
}

#[test]
fn test_arming_twice_is_an_error() {
    let service = bind_local();
    let waiter_service = Arc::clone(&service);

    let waiter = thread::spawn(move || waiter_service.arm(Some(Duration::from_secs(1))));
    thread::sleep(Duration::from_millis(100));

    let err = service.arm(Some(Duration::from_millis(50))).unwrap_err();
    assert!(matches!(err, RigError::BarrierAlreadyArmed));

    assert_eq!(waiter.join().unwrap().unwrap(), WaitOutcome::TimedOut);
}
