use lc_protocol::export_bindings;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_export_bindings_writes_wire_types() {
    let dir = tempdir().expect("Failed to create temp dir");

    export_bindings(dir.path()).expect("Failed to export bindings");

    for name in [
        "Event",
        "Message",
        "StepState",
        "SessionState",
        "ChatSourceSettings",
        "VersionedPayload",
    ] {
        let path = dir.path().join(format!("{name}.ts"));
        assert!(path.is_file(), "missing binding for {name}");
    }

    let event = fs::read_to_string(dir.path().join("Event.ts")).expect("Failed to read Event.ts");
    assert!(event.contains("stepStateChanged"));
    assert!(event.contains("import type { Message }"));
}
