//! Property tests for response correlation.

use std::sync::Arc;

use aerogate_core::audit::AuditLog;
use aerogate_core::capability::EmptyRegistry;
use aerogate_core::protocol::AccessRole;
use aerogate_core::rate_limiter::RateLimiter;
use aerogate_core::validator::Validator;
use aerogate_core::{Dispatcher, RequestContext, TransportKind};
use proptest::prelude::*;
use serde_json::{Value, json};

fn dispatcher() -> Dispatcher {
    Dispatcher::new(
        Arc::new(EmptyRegistry),
        AccessRole::Admin,
        Arc::new(RateLimiter::disabled()),
        Arc::new(AuditLog::disabled()),
        Validator::default(),
    )
}

fn run(frame: Value) -> Option<Value> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let bytes = serde_json::to_vec(&frame).unwrap();
    runtime.block_on(async {
        dispatcher()
            .handle_bytes(&RequestContext::detached(TransportKind::Stdio), &bytes)
            .await
            .map(|out| serde_json::from_slice(&out).unwrap())
    })
}

fn any_id() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        // Eighths are exact in binary, so the text form parses back to the same value.
        any::<i32>().prop_map(|n| Value::from(f64::from(n) / 8.0)),
        "[a-zA-Z0-9_-]{0,24}".prop_map(Value::from),
        "\\PC{0,256}".prop_map(Value::from),
        Just(Value::Null),
    ]
}

fn any_method() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("initialize".to_string()),
        Just("ping".to_string()),
        Just("capabilities/list".to_string()),
        Just("tools/call".to_string()),
        Just("resources/read".to_string()),
        "[a-z/]{1,16}",
    ]
}

proptest! {
    #[test]
    fn every_request_gets_its_id_back(id in any_id(), method in any_method()) {
        let response = run(json!({"version": "2.0", "id": id.clone(), "method": method}))
            .expect("requests are always answered");
        prop_assert_eq!(&response["id"], &id);
        prop_assert_eq!(&response["version"], "2.0");
        prop_assert!(response.get("result").is_some() != response.get("error").is_some());
    }

    #[test]
    fn notifications_are_silent(method in any_method(), with_params in any::<bool>()) {
        let mut frame = json!({"version": "2.0", "method": method});
        if with_params {
            frame["params"] = json!({"name": "anything", "arguments": {}});
        }
        prop_assert!(run(frame).is_none());
    }
}
