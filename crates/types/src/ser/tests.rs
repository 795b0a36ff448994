use super::*;
use crate::{AssetAmount, Intent, SolutionSubmittedEvent};

#[test]
fn amount_from_string_and_integer() {
    let a: Amount = serde_json::from_str("\"340282366920938463463374607431768211455\"").unwrap();
    assert_eq!(a, Amount(u128::MAX));
    let b: Amount = serde_json::from_str("100000").unwrap();
    assert_eq!(b, Amount(100_000));
    assert!(serde_json::from_str::<Amount>("\"-5\"").is_err());
    assert!(serde_json::from_str::<Amount>("\"nope\"").is_err());
}

#[test]
fn amount_round_trips_as_string() {
    let json = serde_json::to_string(&Amount(42)).unwrap();
    assert_eq!(json, "\"42\"");
    let back: Amount = serde_json::from_str(&json).unwrap();
    assert_eq!(back, Amount(42));
}

#[test]
fn signed_amount_accepts_negatives() {
    let a: SignedAmount = serde_json::from_str("\"-101000\"").unwrap();
    assert_eq!(a, SignedAmount(-101_000));
    let b: SignedAmount = serde_json::from_str("-5").unwrap();
    assert_eq!(b, SignedAmount(-5));
}

#[test]
fn amount_spec_forms() {
    let exact: AmountSpec = serde_json::from_str("\"100000\"").unwrap();
    assert_eq!(exact, AmountSpec::Exact(Amount(100_000)));

    let exact_int: AmountSpec = serde_json::from_str("7").unwrap();
    assert_eq!(exact_int, AmountSpec::Exact(Amount(7)));

    let range: AmountSpec = serde_json::from_str(r#"{"min":"1","max":"10"}"#).unwrap();
    assert_eq!(
        range,
        AmountSpec::Range {
            min: Amount(1),
            max: Amount(10)
        }
    );

    let all: AmountSpec = serde_json::from_str("\"all\"").unwrap();
    assert_eq!(all, AmountSpec::All);
}

#[test]
fn asset_amount_accepts_camel_case() {
    let leg: AssetAmount =
        serde_json::from_str(r#"{"assetId":"0xa::usdc::USDC","amount":"100000","decimals":6}"#)
            .unwrap();
    assert_eq!(leg.asset_id, "0xa::usdc::USDC");
    assert_eq!(leg.exact(), Some(Amount(100_000)));
}

#[test]
fn intent_parses_both_casings() {
    let snake = r#"{
        "intent_id": "i-1",
        "user_address": "0xuser",
        "window_start_ms": 1000,
        "window_end_ms": 6000,
        "operation": {"mode": "swap", "inputs": [], "outputs": []}
    }"#;
    let camel = r#"{
        "intentId": "i-1",
        "userAddress": "0xuser",
        "windowStartMs": 1000,
        "windowEndMs": 6000,
        "operation": {"mode": "swap", "inputs": [], "outputs": []}
    }"#;
    let a: Intent = serde_json::from_str(snake).unwrap();
    let b: Intent = serde_json::from_str(camel).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.window_end_ms, 6000);
}

#[test]
fn event_seq_accepts_string() {
    let ev: SolutionSubmittedEvent = serde_json::from_str(
        r#"{
            "id": {"txDigest": "0xabc", "eventSeq": "17"},
            "intentId": "i-1",
            "solutionId": "s-1",
            "blobId": "b-1",
            "timestampMs": "1700000000000"
        }"#,
    )
    .unwrap();
    assert_eq!(ev.id.event_seq, 17);
    assert_eq!(ev.timestamp_ms, Some(1_700_000_000_000));
}
