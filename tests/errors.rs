//! Conductor error records surfaced through requests.

mod common;

use std::time::Duration;

use common::{MockConductor, error_payload, response_frame};
use holochain_websocket::error::tags;
use holochain_websocket::{ConductorError, Connection, ConnectionOptions, Error};
use rmpv::Value;

async fn connect(mock: &MockConductor) -> anyhow::Result<Connection> {
    let conn = Connection::new(
        mock.url(),
        ConnectionOptions::new().with_timeout(Duration::from_secs(5)),
    )?;
    conn.open().await?;
    Ok(conn)
}

/// Issues one request and answers it with an error record.
async fn fail_with(
    conn: &Connection,
    mock: &mut MockConductor,
    args: Value,
    tag: &str,
    message: &str,
) -> anyhow::Result<Error> {
    let (result, served) = tokio::join!(conn.request("call_zome", args), async {
        let (id, _) = mock.next_request().await?;
        mock.respond_error(id, tag, message);
        anyhow::Ok(())
    });

    served?;
    Ok(result.expect_err("conductor error"))
}

#[tokio::test]
async fn test_internal_error_carries_message() -> anyhow::Result<()> {
    let mut mock = MockConductor::start().await?;
    let conn = connect(&mock).await?;

    let err = fail_with(&conn, &mut mock, Value::Nil, tags::INTERNAL_ERROR, "boom").await?;

    assert!(err.is_conductor_error());
    assert!(matches!(
        err.conductor_kind(),
        Some(ConductorError::Internal { message }) if message == "boom"
    ));
    assert!(err.to_string().contains("boom"));
    Ok(())
}

#[tokio::test]
async fn test_each_known_tag_maps_to_its_kind() -> anyhow::Result<()> {
    let mut mock = MockConductor::start().await?;
    let conn = connect(&mock).await?;

    let cases: [(&str, fn(&ConductorError) -> bool); 6] = [
        (tags::INTERNAL_ERROR, |k| matches!(k, ConductorError::Internal { .. })),
        (tags::DESERIALIZATION, |k| {
            matches!(k, ConductorError::Deserialization { .. })
        }),
        (tags::DNA_READ_ERROR, |k| matches!(k, ConductorError::DnaRead { .. })),
        (tags::RIBOSOME_ERROR, |k| matches!(k, ConductorError::Ribosome { .. })),
        (tags::ACTIVATE_APP, |k| matches!(k, ConductorError::ActivateApp { .. })),
        (tags::ZOME_CALL_UNAUTHORIZED, |k| {
            matches!(k, ConductorError::ZomeCallUnauthorized { .. })
        }),
    ];

    for (tag, expected) in cases {
        let err = fail_with(&conn, &mut mock, Value::Nil, tag, "failed").await?;
        let kind = err.conductor_kind().expect("classified");
        assert!(expected(kind), "{tag} classified as {kind:?}");
        assert_eq!(kind.tag(), tag);
        assert!(err.call_site().is_some());
    }

    assert_eq!(conn.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_ribosome_deserialize_names_the_target() -> anyhow::Result<()> {
    let mut mock = MockConductor::start().await?;
    let conn = connect(&mock).await?;

    let args = Value::Map(vec![
        (Value::from("zome_name"), Value::from("mere_memory")),
        (Value::from("fn_name"), Value::from("save_bytes")),
    ]);
    let message = "Wasm runtime error while working with Ribosome: RuntimeError: \
                   WasmError { file: \"src/lib.rs\", line: 1, error: Deserialize([146, 1, 2]) }";

    let err = fail_with(&conn, &mut mock, args.clone(), tags::RIBOSOME_ERROR, message).await?;

    let Some(ConductorError::RibosomeDeserialize {
        message,
        zome,
        function,
        bytes,
        data,
        context,
    }) = err.conductor_kind()
    else {
        panic!("expected ribosome deserialize, got {err:?}");
    };

    assert_eq!(zome.as_deref(), Some("mere_memory"));
    assert_eq!(function.as_deref(), Some("save_bytes"));
    assert_eq!(bytes, &vec![146, 1, 2]);
    assert_eq!(
        data.as_ref(),
        Some(&Value::Array(vec![Value::from(1), Value::from(2)]))
    );
    assert_eq!(context, &args);
    assert_eq!(
        message,
        "Failed to deserialize input for 'mere_memory->save_bytes' [ 146, 1, 2 ]"
    );
    Ok(())
}

#[tokio::test]
async fn test_unknown_tag_falls_back() -> anyhow::Result<()> {
    let mut mock = MockConductor::start().await?;
    let conn = connect(&mock).await?;

    let err = fail_with(&conn, &mut mock, Value::Nil, "quantum_flux", "odd").await?;

    assert!(matches!(
        err.conductor_kind(),
        Some(ConductorError::Unknown { tag, message }) if tag == "quantum_flux" && message == "odd"
    ));
    Ok(())
}

#[tokio::test]
async fn test_structured_error_message_is_rendered() -> anyhow::Result<()> {
    let mut mock = MockConductor::start().await?;
    let conn = connect(&mock).await?;

    let (result, served) = tokio::join!(conn.request("install_app", ()), async {
        let (id, _) = mock.next_request().await?;
        let detail = Value::Map(vec![(Value::from("path"), Value::from("/tmp/app.happ"))]);
        mock.send_frame(response_frame(
            Some(id),
            Some(&error_payload(tags::DNA_READ_ERROR, detail)),
        ));
        anyhow::Ok(())
    });

    served?;
    let err = result.expect_err("conductor error");
    let kind = err.conductor_kind().expect("classified");
    assert!(matches!(kind, ConductorError::DnaRead { .. }));
    assert!(kind.message().contains("/tmp/app.happ"));
    Ok(())
}

#[tokio::test]
async fn test_errors_point_at_the_caller() -> anyhow::Result<()> {
    let mut mock = MockConductor::start().await?;
    let conn = connect(&mock).await?;

    let err = fail_with(&conn, &mut mock, Value::Nil, tags::ACTIVATE_APP, "nope").await?;

    let call_site = err.call_site().expect("call site recorded");
    assert!(call_site.file().ends_with("errors.rs"), "{call_site}");
    assert!(err.to_string().contains("errors.rs"));
    Ok(())
}
