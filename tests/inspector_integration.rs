
use inspector_bridge::inspector::StopSource;
use inspector_bridge::protocol::{codec, key, Dictionary, MessageName, Value};
use inspector_client::{
    listed_connection, listing_of, start_inspector, wait_until, EchoTarget, InspectorClient,
};
use serial_test::serial;

#[test]
#[serial]
fn test_get_listing() -> anyhow::Result<()> {
    let (inspector, addr) = start_inspector()?;
    let target = EchoTarget::new(42, "Main");
    inspector.target_updated(target.clone());

    let mut client = InspectorClient::connect(addr)?;
    client.get_listing()?;
    let payload = client.wait_for(MessageName::Listing)?;
    let listing = listing_of(&payload, 42).expect("listing of target 42");
    assert_eq!(
        listing
            .get(key::TARGET_IDENTIFIER)
            .and_then(Value::as_unsigned_integer),
        Some(42)
    );
    assert_eq!(
        listing.get(key::TITLE).and_then(Value::as_string),
        Some("Main")
    );
    assert_eq!(
        listing.get(key::TYPE).and_then(Value::as_string),
        Some("WIRTypeJavaScript")
    );
    assert!(listing.get(key::CONNECTION_IDENTIFIER).is_none());

    // a new target is announced without asking
    let worker = EchoTarget::new(7, "Worker");
    inspector.target_updated(worker.clone());
    client.wait_for_listing(|payload| listing_of(payload, 7).is_some())?;

    inspector.unregister_target(7);
    client.wait_for_listing(|payload| listing_of(payload, 7).is_none())?;
    Ok(())
}

#[test]
#[serial]
fn test_debug_session() -> anyhow::Result<()> {
    let (inspector, addr) = start_inspector()?;
    let target = EchoTarget::new(42, "Main");
    inspector.target_updated(target.clone());

    let mut client = InspectorClient::connect(addr)?;
    client.setup(42, "conn-1", "client-app")?;
    client.wait_for_listing(|payload| {
        listed_connection(payload, 42).as_deref() == Some("conn-1")
    })?;
    assert_eq!(target.connects(), 1);
    assert!(inspector.has_active_debug_session());

    let message = r#"{"id":1,"method":"Runtime.enable"}"#;
    client.socket_data(42, message)?;
    let raw = client.wait_for(MessageName::RawData)?;
    assert_eq!(
        raw.get(key::RAW_DATA).and_then(Value::as_string),
        Some(message)
    );
    assert_eq!(
        raw.get(key::CONNECTION_IDENTIFIER)
            .and_then(Value::as_string),
        Some("conn-1")
    );
    assert_eq!(
        raw.get(key::DESTINATION).and_then(Value::as_string),
        Some("client-app")
    );

    // second setup for the same target is ignored
    client.setup(42, "conn-2", "client-app")?;
    client.get_listing()?;
    let payload = client.wait_for(MessageName::Listing)?;
    assert_eq!(listed_connection(&payload, 42).as_deref(), Some("conn-1"));
    assert_eq!(target.connects(), 1);

    // close with a stale identifier is ignored
    client.close(42, "conn-2")?;
    client.close(42, "conn-1")?;
    client.wait_for_listing(|payload| {
        listing_of(payload, 42).is_some() && listed_connection(payload, 42).is_none()
    })?;
    assert_eq!(target.disconnects(), 1);
    assert!(!inspector.has_connection(42));
    assert!(!inspector.has_active_debug_session());
    Ok(())
}

#[test]
#[serial]
fn test_client_disconnect_closes_sessions() -> anyhow::Result<()> {
    let (inspector, addr) = start_inspector()?;
    let main = EchoTarget::new(1, "Main");
    let worker = EchoTarget::new(2, "Worker");
    inspector.target_updated(main.clone());
    inspector.target_updated(worker.clone());

    let mut client = InspectorClient::connect(addr)?;
    client.setup(1, "conn-1", "client")?;
    client.setup(2, "conn-2", "client")?;
    wait_until("two sessions", || inspector.connection_count() == 2)?;
    drop(client);

    wait_until("sessions closed", || inspector.connection_count() == 0)?;
    assert_eq!(main.disconnects(), 1);
    assert_eq!(worker.disconnects(), 1);

    // targets survive the client
    let mut client = InspectorClient::connect(addr)?;
    client.get_listing()?;
    let payload = client.wait_for(MessageName::Listing)?;
    assert!(listing_of(&payload, 1).is_some());
    assert!(listing_of(&payload, 2).is_some());
    assert_eq!(listed_connection(&payload, 1), None);
    assert_eq!(listed_connection(&payload, 2), None);
    Ok(())
}

#[test]
#[serial]
fn test_second_client_rejected() -> anyhow::Result<()> {
    let (inspector, addr) = start_inspector()?;
    let target = EchoTarget::new(42, "Main");
    inspector.target_updated(target.clone());

    let mut first = InspectorClient::connect(addr)?;
    first.get_listing()?;
    first.wait_for(MessageName::Listing)?;

    let mut second = InspectorClient::connect(addr)?;
    assert!(second.is_closed_by_peer());

    first.get_listing()?;
    let payload = first.wait_for(MessageName::Listing)?;
    assert!(listing_of(&payload, 42).is_some());
    Ok(())
}

#[test]
#[serial]
fn test_invalid_frames_skipped() -> anyhow::Result<()> {
    inspector_bridge::log::enable_wire_trace();
    let (inspector, addr) = start_inspector()?;
    let target = EchoTarget::new(42, "Main");
    inspector.target_updated(target.clone());

    let mut client = InspectorClient::connect(addr)?;
    // oversized length prefix
    client.send_raw(b"GET ")?;
    // frame with a broken binary plist body
    let body = b"bplist00\x01\x02";
    let mut frame = (body.len() as u32).to_be_bytes().to_vec();
    frame.extend_from_slice(body);
    client.send_raw(&frame)?;
    // dictionary without a message name
    client.send_raw(&codec::encode(Dictionary::new())?)?;

    client.get_listing()?;
    let payload = client.wait_for(MessageName::Listing)?;
    assert!(listing_of(&payload, 42).is_some());

    inspector_bridge::log::disable_wire_trace();
    Ok(())
}

#[test]
#[serial]
fn test_stop() -> anyhow::Result<()> {
    let (inspector, addr) = start_inspector()?;
    let target = EchoTarget::new(42, "Main");
    inspector.target_updated(target.clone());

    let mut client = InspectorClient::connect(addr)?;
    client.setup(42, "conn-1", "client")?;
    wait_until("session", || inspector.has_connection(42))?;

    inspector.stop(StopSource::Api);
    assert!(!inspector.is_enabled());
    assert_eq!(target.disconnects(), 1);
    assert!(client.is_closed_by_peer());
    assert!(InspectorClient::connect(addr).is_err());
    Ok(())
}
