use std::path::PathBuf;

use progress_events::{
    normalize, validate_normalized, validate_normalized_value, validate_raw, EventType,
    NormalizedProgressEvent, Phase, SseDecoder, TransactionDescriptor, ValidationError,
    ValidationErrorKind,
};

fn fixture(name: &str) -> Vec<u8> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read(&path).unwrap_or_else(|err| panic!("read {}: {err}", path.display()))
}

fn accept(body: &str) -> Result<NormalizedProgressEvent, ValidationError> {
    validate_raw(body)
        .map(|raw| normalize(&raw, "intent-7"))
        .and_then(validate_normalized)
}

fn decode_run() -> Vec<Result<NormalizedProgressEvent, ValidationError>> {
    let bytes = fixture("intent_run.sse");
    let mut decoder = SseDecoder::default();
    // Uneven chunking exercises frame reassembly.
    let mut outcomes = Vec::new();
    for chunk in bytes.chunks(37) {
        for frame in decoder.push(chunk) {
            let frame = frame.expect("fixture frames decode");
            outcomes.push(accept(&frame.data));
        }
    }
    assert_eq!(decoder.finish(), None);
    outcomes
}

#[test]
fn recorded_run_yields_one_event_per_accepted_payload() {
    let outcomes = decode_run();
    assert_eq!(outcomes.len(), 8);

    let rejected: Vec<ValidationErrorKind> = outcomes
        .iter()
        .filter_map(|outcome| outcome.as_ref().err().map(|err| err.kind))
        .collect();
    assert_eq!(
        rejected,
        vec![ValidationErrorKind::Parse, ValidationErrorKind::Schema]
    );

    let events: Vec<_> = outcomes.into_iter().filter_map(Result::ok).collect();
    let steps: Vec<_> = events.iter().map(|event| event.current_step).collect();
    assert_eq!(
        steps,
        vec![
            Some(Phase::Connected),
            Some(Phase::Parsing),
            Some(Phase::TokenAnalysis),
            Some(Phase::ProtocolAnalysis),
            Some(Phase::GasEstimation),
            Some(Phase::Complete),
        ]
    );
    assert!(events.iter().all(|event| event.intent_id == "intent-7"));
    assert!(events
        .iter()
        .all(|event| (0.0..=1.0).contains(&event.progress)));
}

#[test]
fn recorded_run_scales_and_resolves_fields() {
    let events: Vec<_> = decode_run().into_iter().filter_map(Result::ok).collect();

    assert_eq!(events[1].progress, 0.05);
    assert_eq!(events[2].progress, 0.4);
    assert_eq!(events[3].progress, 0.55);

    let protocol = events[3].metadata.as_ref().unwrap();
    assert_eq!(protocol.total_strategies, Some(6));
    assert_eq!(protocol.chain_breakdown.as_ref().map(Vec::len), Some(1));

    let gas = events[4].metadata.as_ref().unwrap();
    assert_eq!(gas.estimated_duration, Some(3.0));
    assert!(events[4].transactions.is_none());

    let complete = &events[5];
    assert_eq!(complete.event_type, EventType::COMPLETE);
    assert_eq!(complete.progress, 1.0);
    let mut first = TransactionDescriptor::new("0xabc", "0x1");
    first.gas_price = Some("100".to_string());
    first.chain_id = Some(1);
    let mut second = TransactionDescriptor::new("0xdef", "0x3");
    second.chain_id = Some(10);
    assert_eq!(complete.transactions, Some(vec![first, second]));
    assert_eq!(
        complete.metadata.as_ref().and_then(|m| m.message.as_deref()),
        Some("Ready to sign")
    );
}

#[test]
fn canonical_events_survive_strict_revalidation() {
    for event in decode_run().into_iter().filter_map(Result::ok) {
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("transactions").map_or(true, |t| t.is_array()));
        let back = validate_normalized_value(value).unwrap();
        assert_eq!(back, event);
    }
}
