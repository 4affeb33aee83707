//! Raw-socket tests against a live host server.
//!
//! These speak the wire protocol directly over blocking TCP so they pin the
//! exact bytes-on-the-wire behavior independent of the client layer.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use serde_json::Value;

use crate::common;

fn connect(addr: std::net::SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("connect to test host");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set read timeout");
    stream
}

fn read_json_line(reader: &mut BufReader<TcpStream>) -> Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(line.ends_with('\n'), "response must be newline-terminated");
    serde_json::from_str(&line).expect("response must be valid JSON")
}

#[test]
fn test_ping_round_trip_wire_shape() {
    let handle = common::start_host("modeler");
    let mut stream = connect(handle.local_addr());
    stream
        .write_all(b"{\"method\":\"ping\",\"params\":{},\"id\":\"1\"}\n")
        .unwrap();

    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let response = read_json_line(&mut reader);
    assert_eq!(response["status"], "success");
    assert_eq!(response["result"]["status"], "pong");
    assert_eq!(response["result"]["message"], "modeler is running");
    assert_eq!(response["id"], "1");

    handle.shutdown();
}

#[test]
fn test_method_not_found_wire_shape() {
    let handle = common::start_host("modeler");
    let mut stream = connect(handle.local_addr());
    stream
        .write_all(b"{\"method\":\"missing_method\",\"params\":{},\"id\":\"2\"}\n")
        .unwrap();

    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let response = read_json_line(&mut reader);
    assert_eq!(response["status"], "error");
    assert_eq!(response["error"]["code"], "METHOD_NOT_FOUND");
    assert_eq!(
        response["error"]["message"],
        "Method not found: missing_method"
    );
    assert_eq!(response["error"]["details"]["method"], "missing_method");
    assert_eq!(response["id"], "2");

    handle.shutdown();
}

#[test]
fn test_parse_error_response_has_no_id() {
    let handle = common::start_host("modeler");
    let mut stream = connect(handle.local_addr());
    stream.write_all(b"{this is not json\n").unwrap();

    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let response = read_json_line(&mut reader);
    assert_eq!(response["status"], "error");
    assert_eq!(response["error"]["code"], "PARSE_ERROR");
    assert!(response.get("id").is_none());

    handle.shutdown();
}

#[test]
fn test_partial_line_dispatches_only_once_complete() {
    let handle = common::start_host("modeler");
    let mut stream = connect(handle.local_addr());

    // First half of the request, no newline yet.
    stream.write_all(b"{\"method\":\"ping\",\"par").unwrap();
    std::thread::sleep(Duration::from_millis(50));
    stream.write_all(b"ams\":{},\"id\":\"7\"}\n").unwrap();

    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let response = read_json_line(&mut reader);
    assert_eq!(response["status"], "success");
    assert_eq!(response["id"], "7");

    handle.shutdown();
}

#[test]
fn test_multiple_envelopes_in_one_segment_answered_in_order() {
    let handle = common::start_host("modeler");
    let mut stream = connect(handle.local_addr());
    stream
        .write_all(
            b"{\"method\":\"ping\",\"params\":{},\"id\":\"1\"}\n\
              {\"method\":\"echo\",\"params\":{\"n\":2},\"id\":\"2\"}\n",
        )
        .unwrap();

    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let first = read_json_line(&mut reader);
    let second = read_json_line(&mut reader);
    assert_eq!(first["id"], "1");
    assert_eq!(first["result"]["status"], "pong");
    assert_eq!(second["id"], "2");
    assert_eq!(second["result"]["n"], 2);

    handle.shutdown();
}

#[test]
fn test_blank_lines_are_skipped() {
    let handle = common::start_host("modeler");
    let mut stream = connect(handle.local_addr());
    stream
        .write_all(b"\n\n{\"method\":\"ping\",\"params\":{},\"id\":\"3\"}\n")
        .unwrap();

    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let response = read_json_line(&mut reader);
    assert_eq!(response["id"], "3");

    handle.shutdown();
}

#[test]
fn test_handler_error_travels_as_error_envelope() {
    let handle = common::start_host("modeler");
    let mut stream = connect(handle.local_addr());
    stream
        .write_all(b"{\"method\":\"reject\",\"params\":{},\"id\":\"4\"}\n")
        .unwrap();

    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let response = read_json_line(&mut reader);
    assert_eq!(response["status"], "error");
    assert_eq!(response["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(response["error"]["message"], "rejected by handler");
    assert_eq!(response["id"], "4");

    handle.shutdown();
}

#[test]
fn test_connection_survives_a_bad_request() {
    let handle = common::start_host("modeler");
    let mut stream = connect(handle.local_addr());
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    stream.write_all(b"{broken\n").unwrap();
    let error = read_json_line(&mut reader);
    assert_eq!(error["error"]["code"], "PARSE_ERROR");

    // Same connection still serves well-formed requests.
    stream
        .write_all(b"{\"method\":\"ping\",\"params\":{},\"id\":\"5\"}\n")
        .unwrap();
    let response = read_json_line(&mut reader);
    assert_eq!(response["status"], "success");
    assert_eq!(response["id"], "5");

    handle.shutdown();
}

#[test]
fn test_shutdown_unblocks_idle_connections() {
    let handle = common::start_host("modeler");
    let stream = connect(handle.local_addr());
    let mut reader = BufReader::new(stream);

    handle.shutdown();

    // The idle connection is closed by shutdown; the read ends with EOF
    // rather than hanging.
    let mut line = String::new();
    let read = reader.read_line(&mut line).unwrap_or(0);
    assert_eq!(read, 0);
}
