#![allow(clippy::unwrap_used, clippy::expect_used)]

use conductor_core::*;

// ---------------------------------------------------------------------------
// 1. Message serialization roundtrip keeps engine metadata
// ---------------------------------------------------------------------------

#[test]
fn message_serialization_keeps_scope_and_kind() {
    let call = ToolCall::new("call_1", "write_file", serde_json::json!({"path": "a.txt"}));
    let msg = Message::assistant("writing the report")
        .with_kind(MessageKind::ApprovalRequest)
        .with_name("executor")
        .with_tool_calls(vec![call.clone()])
        .with_scope(WorkScope {
            plan_revision: 2,
            subtask_index: 1,
        });

    let json = serde_json::to_string(&msg).unwrap();
    let back: Message = serde_json::from_str(&json).unwrap();

    assert_eq!(back, msg);
    assert_eq!(back.tool_calls, vec![call]);
    assert_eq!(back.scope.unwrap().plan_revision, 2);
}

// ---------------------------------------------------------------------------
// 2. Role and consent wire names
// ---------------------------------------------------------------------------

#[test]
fn wire_names_are_lowercase() {
    assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
    assert_eq!(serde_json::to_string(&Consent::Declined).unwrap(), "\"declined\"");
    assert_eq!(
        serde_json::to_string(&MessageKind::FinalAnswer).unwrap(),
        "\"final_answer\""
    );
}

// ---------------------------------------------------------------------------
// 3. Error conversion from serde_json
// ---------------------------------------------------------------------------

#[test]
fn json_errors_convert() {
    fn parse(input: &str) -> ConductorResult<serde_json::Value> {
        Ok(serde_json::from_str(input)?)
    }
    let err = parse("{not json").unwrap_err();
    assert!(matches!(err, ConductorError::Json(_)));
    assert!(!err.is_transient());
}
