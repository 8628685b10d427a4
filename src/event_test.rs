use super::*;
use serde_json::json;

#[test]
fn join_deserializes_with_default_role() {
    let ev: ClientEvent = serde_json::from_value(json!({
        "type": "join",
        "username": "ann"
    }))
    .unwrap();
    assert_eq!(ev, ClientEvent::Join { username: "ann".into(), role: Role::Standard });
}

#[test]
fn join_deserializes_administrator_role() {
    let ev: ClientEvent = serde_json::from_value(json!({
        "type": "join",
        "username": "cara",
        "role": "administrator"
    }))
    .unwrap();
    assert_eq!(ev, ClientEvent::Join { username: "cara".into(), role: Role::Administrator });
}

#[test]
fn unknown_event_type_is_rejected() {
    let result: Result<ClientEvent, _> = serde_json::from_value(json!({
        "type": "teleport",
        "x": 1.0
    }));
    assert!(result.is_err());
}

#[test]
fn draw_requires_stroke() {
    let result: Result<ClientEvent, _> = serde_json::from_value(json!({ "type": "draw" }));
    assert!(result.is_err());

    let ev: ClientEvent = serde_json::from_value(json!({
        "type": "draw",
        "stroke": { "points": [{"x": 0.0, "y": 1.0}], "color": "#fff", "width": 3.0 }
    }))
    .unwrap();
    let ClientEvent::Draw { stroke } = ev else {
        panic!("expected draw");
    };
    assert_eq!(stroke.points.len(), 1);
    assert_eq!(stroke.color, "#fff");
}

#[test]
fn stroke_style_defaults_apply() {
    let stroke: StrokePayload = serde_json::from_value(json!({
        "points": [{"x": 0.0, "y": 0.0}]
    }))
    .unwrap();
    assert_eq!(stroke.color, "#000000");
    assert!((stroke.width - 2.0).abs() < f64::EPSILON);
}

#[test]
fn create_text_owner_is_optional() {
    let ev: ClientEvent = serde_json::from_value(json!({
        "type": "createText",
        "text": { "content": "hello", "x": 10.0, "y": 20.0 }
    }))
    .unwrap();
    let ClientEvent::CreateText { text } = ev else {
        panic!("expected createText");
    };
    assert_eq!(text.content, "hello");
    assert!(text.owner.is_none());
    assert!((text.font_size - 16.0).abs() < f64::EPSILON);
}

#[test]
fn move_text_carries_declared_owner() {
    let ev: ClientEvent = serde_json::from_value(json!({
        "type": "moveText",
        "id": 1,
        "x": 5.0,
        "y": 6.0,
        "owner": "bob"
    }))
    .unwrap();
    assert_eq!(
        ev,
        ClientEvent::MoveText { id: 1, x: 5.0, y: 6.0, owner: Some("bob".into()) }
    );
}

#[test]
fn server_event_tags_are_camel_case() {
    let cleared = serde_json::to_value(&ServerEvent::BoardCleared).unwrap();
    assert_eq!(cleared["type"], "boardCleared");

    let left = serde_json::to_value(&ServerEvent::ParticipantLeft { username: "ann".into() }).unwrap();
    assert_eq!(left["type"], "participantLeft");

    let err = serde_json::to_value(&ServerEvent::ClearError { message: "nope".into() }).unwrap();
    assert_eq!(err["type"], "clearError");
}

#[test]
fn server_event_json_round_trip() {
    let original = ServerEvent::Draw {
        id: 7,
        stroke: StrokePayload {
            points: vec![Point { x: 1.0, y: 2.0 }, Point { x: 3.0, y: 4.0 }],
            color: "#ff0000".into(),
            width: 4.0,
        },
        by: "ann".into(),
        ts: 1_700_000_000_000,
    };
    let json = serde_json::to_string(&original).unwrap();
    let restored: ServerEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, original);
}

#[test]
fn error_from_typed() {
    #[derive(Debug, thiserror::Error)]
    #[error("item not found")]
    struct NotFound;

    impl ErrorCode for NotFound {
        fn error_code(&self) -> &'static str {
            "E_NOT_FOUND"
        }
    }

    let ev = ServerEvent::error_from(&NotFound);
    let ServerEvent::Error { code, message } = ev else {
        panic!("expected error event");
    };
    assert_eq!(code, "E_NOT_FOUND");
    assert_eq!(message, "item not found");
}

#[test]
fn now_ms_is_positive() {
    assert!(now_ms() > 0);
}
