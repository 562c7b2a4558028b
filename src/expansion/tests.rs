use std::sync::Arc;
use std::thread;

use super::MacroExpander;
use crate::payload::Payload;

fn payload() -> Payload {
    Payload::from_string("x")
        .with_correlation_id("corr")
        .with_timestamp(1_725_000_000_123)
}

#[test]
fn test_no_macros_is_unchanged() {
    let expander = MacroExpander::new();
    let p = payload();
    assert_eq!(expander.expand("plain/path.bin", Some(&p)), "plain/path.bin");
    assert_eq!(expander.expand("", Some(&p)), "");
}

#[test]
fn test_missing_payload_is_noop() {
    let expander = MacroExpander::new();
    assert_eq!(expander.expand("${id}/${count}", None), "${id}/${count}");
    // the counter was not touched
    assert_eq!(expander.peek_count("${id}/${count}"), 0);
}

#[test]
fn test_all_tokens_replaced() {
    let expander = MacroExpander::new();
    let p = payload();
    let out = expander.expand("${id}-${c_id}-${timestamp}-${count}", Some(&p));
    assert_eq!(out, format!("{}-corr-1725000000123-0", p.id()));
}

#[test]
fn test_counter_per_template() {
    let expander = MacroExpander::new();
    let p = payload();
    let first: Vec<String> = (0..3)
        .map(|_| expander.expand("${count}_frame", Some(&p)))
        .collect();
    assert_eq!(first, vec!["0_frame", "1_frame", "2_frame"]);

    assert_eq!(expander.expand("clip_${count}", Some(&p)), "clip_0");
    assert_eq!(expander.expand("${count}_frame", Some(&p)), "3_frame");
}

#[test]
fn test_repeated_count_shares_value() {
    let expander = MacroExpander::new();
    let p = payload();
    assert_eq!(expander.expand("${count}/${count}", Some(&p)), "0/0");
    assert_eq!(expander.expand("${count}/${count}", Some(&p)), "1/1");
}

#[test]
fn test_substituted_text_is_not_rescanned() {
    let expander = MacroExpander::new();
    let p = Payload::from_string("x").with_correlation_id("${id}");
    assert_eq!(expander.expand("a/${c_id}/b", Some(&p)), "a/${id}/b");
}

#[test]
fn test_partial_tokens_are_left_alone() {
    let expander = MacroExpander::new();
    let p = payload();
    assert_eq!(expander.expand("${ids}${c_id", Some(&p)), "${ids}${c_id");
}

#[test]
fn test_concurrent_counters_are_distinct() {
    let expander = Arc::new(MacroExpander::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let expander = expander.clone();
            thread::spawn(move || {
                let p = Payload::from_string("x");
                (0..25)
                    .map(|_| expander.expand("${count}", Some(&p)))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .map(|s| s.parse().unwrap())
        .collect();
    all.sort_unstable();
    assert_eq!(all, (0..200).collect::<Vec<u64>>());
}

#[test]
fn test_validate_template() {
    use super::validate_template;
    assert!(validate_template("out/${count}_${id}.jpg").is_ok());
    assert!(validate_template("${c_id}/${timestamp}").is_ok());
    assert!(validate_template("no macros").is_ok());
    assert!(validate_template("price ${ 5 }").is_ok());
    assert!(validate_template("${frame}.jpg").is_err());
}
