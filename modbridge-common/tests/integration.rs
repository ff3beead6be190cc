//! Integration tests for modbridge-common library.

use modbridge_common::{
    BridgeCommand, BridgeEvent, CommandEnvelope, DataEvent, ErrorEvent, Flag, Format,
    KeyExprBuilder, ReadRequest, RegisterData, RegisterType, decode, decode_auto, encode,
};

#[test]
fn test_full_event_workflow() {
    let event: BridgeEvent = DataEvent::new(
        1,
        RegisterType::InputRegister,
        8,
        RegisterData::Words(vec![8, 9, 10]),
        Flag::Get,
    )
    .into();

    // Encode as JSON
    let json_bytes = encode(&event, Format::Json).expect("JSON encode failed");
    assert!(!json_bytes.is_empty());

    // Decode from JSON
    let decoded: BridgeEvent = decode(&json_bytes, Format::Json).expect("JSON decode failed");
    let data = decoded.as_data().expect("expected a data event");
    assert_eq!(data.unit, 1);
    assert_eq!(data.register_type, RegisterType::InputRegister);
    assert_eq!(data.address, 8);
    assert_eq!(data.data, RegisterData::Words(vec![8, 9, 10]));
    assert_eq!(data.flag, Flag::Get);

    // Encode as CBOR
    let cbor_bytes = encode(&event, Format::Cbor).expect("CBOR encode failed");
    assert!(
        cbor_bytes.len() < json_bytes.len(),
        "CBOR should be smaller than JSON"
    );

    // Auto-decode CBOR
    let auto_decoded: BridgeEvent = decode_auto(&cbor_bytes).expect("Auto decode failed");
    assert_eq!(auto_decoded, decoded);
}

#[test]
fn test_key_expression_building_and_parsing() {
    let builder = KeyExprBuilder::default();
    let key = builder.data(4, RegisterType::Coil, 120);

    assert_eq!(key, "modbridge/data/4/coil/120");

    let parsed = builder.parse_data_key(&key).expect("Parse failed");
    assert_eq!(parsed.unit, 4);
    assert_eq!(parsed.register_type, RegisterType::Coil);
    assert_eq!(parsed.address, 120);
}

#[test]
fn test_coil_events_carry_booleans() {
    let raw = [0u16, 1, 1, 0];
    for register_type in [RegisterType::Coil, RegisterType::DiscreteInput] {
        let event = DataEvent::new(
            1,
            register_type,
            0,
            RegisterData::from_raw(register_type, &raw),
            Flag::Get,
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["data"], serde_json::json!([false, true, true, false]));
    }
}

#[test]
fn test_error_event_roundtrip() {
    let event: BridgeEvent = ErrorEvent::new("Modbus exception: IllegalDataAddress").into();

    for format in [Format::Json, Format::Cbor] {
        let encoded = encode(&event, format).unwrap();
        let decoded: BridgeEvent = decode(&encoded, format).unwrap();
        assert_eq!(
            decoded.as_error().map(|e| e.err.as_str()),
            Some("Modbus exception: IllegalDataAddress")
        );
    }
}

#[test]
fn test_client_command_from_raw_json() {
    // What a browser or script would publish.
    let raw = br#"{"command":"readHoldingRegisters","unit":1,"address":8,"length":3}"#;
    let env: CommandEnvelope = decode_auto(raw).unwrap();

    assert_eq!(
        env.command,
        BridgeCommand::ReadHoldingRegisters(ReadRequest {
            unit: 1,
            address: 8,
            length: 3
        })
    );
}

#[test]
fn test_length_defaults_to_one() {
    let raw = br#"{"command":"readCoils","unit":1,"address":8}"#;
    let env: CommandEnvelope = decode_auto(raw).unwrap();
    assert_eq!(env.command.as_read().map(|r| r.length), Some(1));
}

#[test]
fn test_out_of_range_unit_rejected() {
    let raw = br#"{"command":"readCoils","unit":256,"address":0,"length":1}"#;
    assert!(decode_auto::<CommandEnvelope>(raw).is_err());
}
