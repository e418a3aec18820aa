//! Log lines of a session carry its trace and the stage spans under it

mod common;

use cardano_tx::Assets;
use common::*;
use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap().lines().map(str::to_string).collect()
    }
}

#[tokio::test(flavor = "current_thread")]
async fn test_stage_lines_log_under_child_spans() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (_emulator, client) = funded(&[100_000_000]).await;
    let builder = client
        .new_tx()
        .pay_to_address(receiver(), Assets::from_lovelace(5_000_000));
    let session = builder.trace_context().clone();
    builder
        .complete()
        .await
        .unwrap()
        .sign_with_wallet()
        .await
        .unwrap()
        .complete()
        .unwrap()
        .submit()
        .await
        .unwrap();

    let lines = captured.lines();
    let line = |message: &str| {
        lines
            .iter()
            .find(|line| line.contains(message))
            .unwrap_or_else(|| panic!("no {message:?} line"))
            .clone()
    };

    let drained = line("Deferred programs drained");
    assert!(drained.contains(session.trace_id()));
    assert!(drained.contains(session.span_id()), "drain names the session span as parent");

    let submitted = line("Transaction submitted");
    assert!(submitted.contains(session.trace_id()));
    assert!(submitted.contains(session.correlation_id().as_str()));
    assert!(submitted.contains("span_id"));
    assert!(!submitted.contains(session.span_id()));
}
