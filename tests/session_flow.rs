//! End-to-end flows through the public API: bytes in, frames out, replies
//! matched, sequences run against a simulated device.

use std::sync::Arc;
use std::time::Duration;

use device_link::script::ScriptRegistry;
use device_link::session::{
    Direction, FrameObserver, FrameRecord, Level, NotificationSink, TelemetrySink,
};
use device_link::transport::RecordingTransport;
use device_link::{
    CancelToken, Command, CommandCatalog, Error, FramingConfig, LineEnding, Params, Sequence,
    SequenceStep, SessionId, SessionManager, Sinks, ValidationConfig,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio_test::{assert_err, assert_ok};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Logging
// ============================================================================

/// Routes library logs to the test harness. Filter with `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Recorders
// ============================================================================

#[derive(Default)]
struct Recorder {
    variables: Mutex<Vec<(String, Value)>>,
    notices: Mutex<Vec<(Level, String)>>,
    frames: Mutex<Vec<FrameRecord>>,
}

impl TelemetrySink for Recorder {
    fn set_variable(&self, _session_id: SessionId, name: &str, value: &Value) {
        self.variables.lock().push((name.to_string(), value.clone()));
    }
}

impl NotificationSink for Recorder {
    fn notify(&self, _session_id: SessionId, level: Level, message: &str) {
        self.notices.lock().push((level, message.to_string()));
    }
}

impl FrameObserver for Recorder {
    fn on_frame(&self, record: &FrameRecord) {
        self.frames.lock().push(record.clone());
    }
}

impl Recorder {
    fn rx_frames(&self) -> Vec<Vec<u8>> {
        self.frames
            .lock()
            .iter()
            .filter(|r| r.direction == Direction::Rx)
            .map(|r| r.frame.bytes.clone())
            .collect()
    }
}

fn sinks(recorder: &Arc<Recorder>) -> Sinks {
    Sinks::default()
        .with_telemetry(recorder.clone())
        .with_notify(recorder.clone())
        .with_frames(recorder.clone())
}

// ============================================================================
// Simulated Device
// ============================================================================

/// Answers `AT\r\n` with `OK` and anything else with `ERROR`.
fn attach_device(manager: &SessionManager, transport: &RecordingTransport) {
    let manager = manager.clone();
    transport.set_hook(Arc::new(move |session: SessionId, bytes: &[u8]| {
        let reply: &[u8] = if bytes == b"AT\r\n" { b"OK\r\n" } else { b"ERROR\r\n" };
        let _ = manager.ingest(session, reply, device_link::unix_millis());
    }));
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_chunked_reply_with_transform() {
    init_tracing();
    let scripts = ScriptRegistry::new();
    scripts.transform_fn("parse_temp", |ctx| {
        let reading = ctx
            .text()
            .trim()
            .strip_prefix("TEMP=")
            .ok_or_else(|| "not a reading".to_string())?
            .parse::<f64>()
            .map_err(|e| e.to_string())?;
        ctx.set_variable("temp", reading);
        ctx.log(format!("temperature {reading}"));
        Ok(Value::Null)
    });

    let recorder = Arc::new(Recorder::default());
    let manager = assert_ok!(
        SessionManager::builder()
            .transport(Arc::new(RecordingTransport::new()))
            .scripts(Arc::new(scripts))
            .sinks(sinks(&recorder))
            .build()
    );
    let session = assert_ok!(manager.open_new(FramingConfig::delimiter("\\r\\n")));

    let command = Command::text("temp", "Read temperature", "AT+TEMP?")
        .with_line_ending(LineEnding::CrLf)
        .with_validation(
            ValidationConfig::regex(r"^TEMP=\d+")
                .with_transform("parse_temp")
                .with_timeout(2000),
        );
    let receipt = assert_ok!(
        manager
            .executor()
            .send_command(session, &command, &Params::new())
            .await
    );

    for (i, chunk) in [&b"TE"[..], b"MP=21", b".5\r", b"\n"].iter().enumerate() {
        assert_ok!(manager.ingest(session, chunk, i as u64));
    }

    let outcome = assert_ok!(receipt.wait().await).unwrap();
    assert_eq!(outcome.frame.bytes, b"TEMP=21.5\r\n");
    assert_eq!(outcome.frame.timestamp_ms, 0);
    assert_eq!(outcome.variable("temp"), Some(&Value::from(21.5)));
    assert!(outcome.transform_error.is_none());
    assert_eq!(
        *recorder.variables.lock(),
        vec![("temp".to_string(), Value::from(21.5))]
    );
}

#[tokio::test]
async fn test_sequence_against_simulated_device() {
    init_tracing();
    let recorder = Arc::new(Recorder::default());
    let transport = Arc::new(RecordingTransport::new());
    let catalog: CommandCatalog = vec![
        Command::text("at", "Attention", "AT")
            .with_line_ending(LineEnding::CrLf)
            .with_validation(ValidationConfig::contains("OK").with_timeout(500)),
        Command::text("unsupported", "Unsupported", "AT+NOPE")
            .with_line_ending(LineEnding::CrLf)
            .with_validation(ValidationConfig::contains("OK").with_timeout(150)),
        Command::text("reset", "Reset", "ATZ").with_line_ending(LineEnding::CrLf),
    ]
    .into_iter()
    .collect();

    let manager = assert_ok!(
        SessionManager::builder()
            .transport(transport.clone())
            .sinks(sinks(&recorder))
            .commands(Arc::new(catalog))
            .build()
    );
    attach_device(&manager, &transport);
    let session = assert_ok!(manager.open_new(FramingConfig::delimiter("\\r\\n")));

    let sequence = Sequence::new("bring-up")
        .step(SequenceStep::new("at"))
        .step(SequenceStep::new("unsupported"))
        .step(SequenceStep::new("reset"));
    let outcome = manager
        .sequence_runner()
        .run(session, &sequence, &Params::new(), &CancelToken::new())
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.failed_step, Some(1));
    assert_eq!(outcome.steps.len(), 2);
    assert_eq!(
        outcome.steps[0].validation.as_ref().unwrap().frame.bytes,
        b"OK\r\n"
    );
    assert_eq!(
        transport.writes_for(session),
        vec![b"AT\r\n".to_vec(), b"AT+NOPE\r\n".to_vec()]
    );
    assert_eq!(recorder.rx_frames(), vec![b"OK\r\n".to_vec(), b"ERROR\r\n".to_vec()]);

    let notices = recorder.notices.lock();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].0, Level::Warn);
}

#[tokio::test]
async fn test_concurrent_sessions_are_isolated() {
    init_tracing();
    let manager = assert_ok!(
        SessionManager::builder()
            .transport(Arc::new(RecordingTransport::new()))
            .build()
    );
    let a = assert_ok!(manager.open_new(FramingConfig::delimiter("\\n")));
    let b = assert_ok!(manager.open_new(FramingConfig::delimiter("\\n")));

    let command = Command::text("ping", "Ping", "PING")
        .with_validation(ValidationConfig::contains("PONG").with_timeout(150));
    let mut receipts = Vec::new();
    for session in [a, b] {
        receipts.push(assert_ok!(
            manager
                .executor()
                .send_command(session, &command, &Params::new())
                .await
        ));
    }

    assert_ok!(manager.ingest(b, b"PONG\n", 1));

    let results =
        futures_util::future::join_all(receipts.into_iter().map(|r| r.wait())).await;
    assert!(matches!(&results[0], Err(Error::ValidationTimeout { .. })));
    assert!(matches!(&results[1], Ok(Some(_))));
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_pending_without_notifications() {
    init_tracing();
    let recorder = Arc::new(Recorder::default());
    let manager = assert_ok!(
        SessionManager::builder()
            .transport(Arc::new(RecordingTransport::new()))
            .sinks(sinks(&recorder))
            .build()
    );
    let session = assert_ok!(manager.open_new(FramingConfig::timeout(50)));

    let command = Command::text("slow", "Slow", "AT+SLOW")
        .with_validation(ValidationConfig::contains("DONE").with_timeout(300));
    let receipt = assert_ok!(
        manager
            .executor()
            .send_command(session, &command, &Params::new())
            .await
    );
    assert_ok!(manager.ingest(session, b"partial", 0));

    assert_eq!(assert_ok!(manager.close(session)), 1);
    let err = assert_err!(receipt.wait().await);
    assert!(matches!(err, Error::ValidationCancelled { .. }));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(recorder.notices.lock().is_empty());
    assert_eq!(recorder.rx_frames(), vec![b"partial".to_vec()]);
    assert_err!(manager.ingest(session, b"late", 1));
}

#[tokio::test]
async fn test_imported_framing_config() {
    init_tracing();
    let recorder = Arc::new(Recorder::default());
    let manager = assert_ok!(
        SessionManager::builder()
            .transport(Arc::new(RecordingTransport::new()))
            .sinks(sinks(&recorder))
            .build()
    );
    let framing = assert_ok!(FramingConfig::from_json(
        r#"{"strategy":"PREFIX_LENGTH","prefixLengthSize":1}"#
    ));
    let session = assert_ok!(manager.open_new(framing));

    assert_ok!(manager.ingest(session, &[3, b'a', b'b'], 0));
    assert_ok!(manager.ingest(session, &[b'c', 1], 1));
    assert_eq!(recorder.rx_frames(), vec![b"abc".to_vec()]);
    assert_eq!(assert_ok!(manager.buffered_len(session)), 1);
}
