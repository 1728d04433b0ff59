use std::sync::Arc;

use ng12_rag::citations::{self, excerpt};
use ng12_rag::gate::{decide, GroundingGate};
use ng12_rag::index::{Passage, ScoredPassage};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn scored(id: &str, page: u32, text: &str, score: f32) -> ScoredPassage {
    ScoredPassage {
        passage: Arc::new(Passage {
            chunk_id: id.to_string(),
            page,
            text: text.to_string(),
            embedding: vec![1.0],
        }),
        score,
    }
}

#[test]
fn one_strong_passage_is_enough_and_only_it_is_cited() {
    let gate = GroundingGate::new(0.75, 1, 3);
    let result = gate.evaluate(vec![
        scored("ng12_0012_00", 12, "Refer using a suspected cancer pathway referral.", 0.91),
        scored("ng12_0030_02", 30, "Consider a chest X-ray.", 0.60),
        scored("ng12_0051_01", 51, "Safety-net advice.", 0.40),
    ]);
    assert!(result.sufficient);
    assert_eq!(result.passages.len(), 3);

    let accepted = gate.accepted(&result);
    let cites = citations::extract(&accepted, 500);
    assert_eq!(cites.len(), 1);
    assert_eq!(cites[0].page, 12);
    assert_eq!(cites[0].chunk_id, "ng12_0012_00");
    assert_eq!(cites[0].excerpt, "Refer using a suspected cancer pathway referral.");
}

#[test]
fn weak_passages_are_insufficient_and_yield_nothing() {
    let gate = GroundingGate::new(0.75, 1, 3);
    let result = gate.evaluate(vec![
        scored("a", 1, "x", 0.50),
        scored("b", 2, "y", 0.40),
    ]);
    assert!(!result.sufficient);
    assert!(gate.accepted(&result).is_empty());

    assert!(!decide(&[], 0.0, 0));
    // A zero min_count never turns sub-threshold passages into evidence.
    let lenient = GroundingGate::new(0.75, 0, 3);
    let result = lenient.evaluate(vec![scored("a", 1, "x", 0.0)]);
    assert!(!result.sufficient);
    assert!(lenient.accepted(&result).is_empty());
    assert!(!decide(&[scored("a", 1, "x", f32::NAN)], 0.0, 1));
}

#[test]
fn accepted_evidence_is_capped_and_keeps_retrieval_order() {
    let gate = GroundingGate::new(0.5, 2, 2);
    let result = gate.evaluate(vec![
        scored("a", 1, "x", 0.9),
        scored("b", 2, "y", 0.8),
        scored("c", 3, "z", 0.7),
    ]);
    let ids: Vec<String> = gate
        .accepted(&result)
        .iter()
        .map(|p| p.chunk_id().to_string())
        .collect();
    assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn duplicate_chunks_are_cited_once() {
    let p = scored("ng12_0012_00", 12, "Refer.", 0.9);
    let cites = citations::extract(&[p.clone(), scored("other", 3, "Other.", 0.8), p], 100);
    let ids: Vec<&str> = cites.iter().map(|c| c.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["ng12_0012_00", "other"]);
}

#[test]
fn long_passage_excerpt_respects_limit_and_word_boundary() {
    let sentence = "Refer people aged 40 and over with unexplained weight loss and abdominal pain. ";
    let text: String = sentence.repeat(7).chars().take(500).collect();
    assert_eq!(text.chars().count(), 500);

    let e = excerpt(&text, 120);
    assert!(e.chars().count() <= 120);
    assert!(text.starts_with(e));
    let rest = &text[e.len()..];
    assert!(rest.starts_with(char::is_whitespace));
    assert!(e.ends_with('.'));
}

proptest! {
    #[test]
    fn excerpt_is_a_bounded_verbatim_prefix(text in "[a-z .]{0,300}", max in 1usize..200) {
        let e = excerpt(&text, max);
        prop_assert!(e.chars().count() <= max);
        prop_assert!(text.trim_start().starts_with(e));
    }

    #[test]
    fn gate_matches_threshold_count(
        scores in prop::collection::vec(-1.0f32..1.0, 0..20),
        min_score in -1.0f32..1.0,
        min_count in 1usize..5,
    ) {
        let passages: Vec<ScoredPassage> = scores
            .iter()
            .enumerate()
            .map(|(i, s)| scored(&format!("c{i}"), 1, "t", *s))
            .collect();
        let strong = scores.iter().filter(|s| **s >= min_score).count();
        prop_assert_eq!(decide(&passages, min_score, min_count), strong >= min_count);
    }
}
