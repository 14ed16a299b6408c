// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use lupa_app::MAX_RESULT_ROWS;
use lupa_query::Client;
use std::io::Read;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Response, Server};

fn json_header() -> Header {
    Header::from_bytes("Content-Type", "application/json").expect("valid content type header")
}

#[test]
fn execute_decodes_columns_and_rows() -> Result<()> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}/v1", server.server_addr());

    let handle = thread::spawn(move || {
        let mut request = server.recv().expect("request expected");
        assert_eq!(request.url(), "/v1/query");

        let mut body = String::new();
        request
            .as_reader()
            .read_to_string(&mut body)
            .expect("read request body");
        assert!(body.contains("SELECT * FROM sales_db.orders"));

        let auth = request
            .headers()
            .iter()
            .find(|header| header.field.equiv("Authorization"))
            .map(|header| header.value.as_str().to_owned());
        assert_eq!(auth.as_deref(), Some("Bearer secret-token"));

        let response = Response::from_string(
            r#"{"columns":["order_id","amount"],"rows":[[1,19.5],[2,3.25]]}"#,
        )
        .with_status_code(200)
        .with_header(json_header());
        request.respond(response).expect("response should succeed");
    });

    let client = Client::new(&addr, "secret-token", Duration::from_secs(1))?;
    let result = client
        .execute("SELECT * FROM sales_db.orders WHERE month='2025-01'")
        .map_err(|error| anyhow!("{error}"))?;

    assert_eq!(result.columns, vec!["order_id", "amount"]);
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.total_count, Some(2));

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn oversized_results_are_capped_with_total_retained() -> Result<()> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}/v1", server.server_addr());

    let row_count = MAX_RESULT_ROWS + 25;
    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        let rows: Vec<String> = (0..row_count).map(|index| format!("[{index}]")).collect();
        let body = format!(r#"{{"columns":["n"],"rows":[{}]}}"#, rows.join(","));
        let response = Response::from_string(body)
            .with_status_code(200)
            .with_header(json_header());
        request.respond(response).expect("response should succeed");
    });

    let client = Client::new(&addr, "secret-token", Duration::from_secs(2))?;
    let result = client
        .execute("SELECT n FROM big_table")
        .map_err(|error| anyhow!("{error}"))?;

    assert_eq!(result.rows.len(), MAX_RESULT_ROWS);
    assert_eq!(result.total_count, Some(row_count));

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn backend_http_errors_are_wrapped_not_fatal() -> Result<()> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}/v1", server.server_addr());

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        let response = Response::from_string(r#"{"error":"syntax error at or near \"FORM\""}"#)
            .with_status_code(400)
            .with_header(json_header());
        request.respond(response).expect("response should succeed");
    });

    let client = Client::new(&addr, "secret-token", Duration::from_secs(1))?;
    let error = client
        .execute("SELECT * FORM orders")
        .expect_err("bad query should fail");
    let message = error.to_string();
    assert!(message.contains("400"));
    assert!(message.contains("syntax error"));

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn unreachable_backend_names_the_endpoint() -> Result<()> {
    let client = Client::new("http://127.0.0.1:1/v1", "secret-token", Duration::from_millis(50))?;
    let error = client
        .execute("SELECT 1")
        .expect_err("unreachable backend should fail");
    assert!(error.to_string().contains("http://127.0.0.1:1/v1"));
    Ok(())
}
