//! Fake tool-provider child process for integration tests.
//!
//! Reads newline-delimited JSON-RPC from stdin, writes newline-delimited
//! JSON-RPC responses to stdout. Understands `initialize`, `tools/list`, and
//! `tools/call` for a single `echo` tool plus a few special-cased tool names
//! used to exercise failure paths.
//!
//! Special tool names recognized by `tools/call`:
//! - `slow` — sleeps 3 seconds before responding (timeout testing).
//! - `crash` — exits immediately with a nonzero status (death during call).
//! - `raw` — returns a bare `result` object with no `content` array (tests
//!   the unwrap-falls-through-to-raw-result path).

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};

fn main() {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let reader = BufReader::new(stdin.lock());
    let mut writer = stdout.lock();

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        let msg: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(_) => continue,
        };
        handle(&msg, &mut writer);
    }
}

fn handle(msg: &Value, writer: &mut impl Write) {
    let method = msg.get("method").and_then(Value::as_str);
    let id = msg.get("id").cloned();

    match method {
        Some("initialize") => {
            write_msg(
                writer,
                &json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "protocolVersion": "2025-03-26",
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "fake-provider", "version": "0.1.0"}
                    }
                }),
            );
        }
        Some("tools/list") => {
            write_msg(
                writer,
                &json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "tools": [
                            {
                                "name": "echo",
                                "description": "echoes its input back",
                                "inputSchema": {"type": "object"}
                            }
                        ]
                    }
                }),
            );
        }
        Some("tools/call") => {
            let tool_name = msg.pointer("/params/name").and_then(Value::as_str).unwrap_or("");
            let arguments = msg.pointer("/params/arguments").cloned().unwrap_or(json!({}));

            if tool_name == "crash" {
                std::process::exit(7);
            }
            if tool_name == "slow" {
                std::thread::sleep(std::time::Duration::from_secs(3));
            }
            if tool_name == "raw" {
                write_msg(
                    writer,
                    &json!({"jsonrpc": "2.0", "id": id, "result": {"plain": true}}),
                );
                return;
            }

            write_msg(
                writer,
                &json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "content": [{"type": "text", "text": serde_json::to_string(&arguments).unwrap()}]
                    }
                }),
            );
        }
        Some("notifications/initialized") => {}
        Some(unknown) => {
            if let Some(req_id) = id {
                write_msg(
                    writer,
                    &json!({
                        "jsonrpc": "2.0",
                        "id": req_id,
                        "error": {"code": -32601, "message": format!("method not found: {unknown}")}
                    }),
                );
            }
        }
        None => {}
    }
}

fn write_msg(writer: &mut impl Write, msg: &Value) {
    let s = serde_json::to_string(msg).expect("serialize JSON");
    writeln!(writer, "{s}").expect("write to stdout");
    writer.flush().expect("flush stdout");
}
