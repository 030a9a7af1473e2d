//! End-to-end tests for the tutor: full cycles over the bundled packs,
//! multi-turn clarification dialogues, runtime rule additions, and the
//! enrichment boundary.

use std::sync::Arc;
use std::time::Duration;

use paideia::cf::ConfidenceLevel;
use paideia::enrich::{EnrichConfig, EnrichMode, EnrichRequest, Enricher};
use paideia::error::EnrichError;
use paideia::kb::{Assertion, KnowledgeBase, ResponseTemplate, Rule};
use paideia::trace::EnrichmentStatus;
use paideia::tutor::{Response, Tutor, TutorConfig};

fn answer(response: Response) -> (String, f32, ConfidenceLevel, Vec<String>) {
    match response {
        Response::Answer {
            concept,
            aggregate_cf,
            confidence_level,
            fired_rule_ids,
            ..
        } => (concept, aggregate_cf, confidence_level, fired_rule_ids),
        other => panic!("expected answer, got {other:?}"),
    }
}

fn test_rule(id: &str, topic: &str, cf: f32, priority: i32) -> Rule {
    Rule {
        id: id.into(),
        topic: topic.into(),
        constraints: Vec::new(),
        cf,
        priority,
        response: ResponseTemplate {
            concept: format!("concept for {id}"),
            explanation: "test explanation".into(),
            subject: "test".into(),
            topic: topic.into(),
            subtopic: String::new(),
            examples: Vec::new(),
        },
        asserts: Vec::new(),
        halt: false,
    }
}

#[test]
fn profile_aware_memory_advice() {
    let mut tutor = Tutor::new();
    tutor.update_profile("sleep_hours", 5i64).unwrap();
    tutor.update_profile("stress_level", "high").unwrap();

    let response = tutor.process_query("How can I remember more information?");
    let Response::Answer {
        topic,
        confidence_level,
        inferred_facts,
        fired_rule_ids,
        ..
    } = response
    else {
        panic!("expected answer");
    };

    assert_eq!(topic, "memory_techniques");
    assert!(
        matches!(confidence_level, ConfidenceLevel::High | ConfidenceLevel::VeryHigh),
        "got {confidence_level:?}"
    );
    // Low sleep flags impaired consolidation...
    assert!(
        inferred_facts
            .iter()
            .any(|f| f.name == "memory_state" && f.value.to_string() == "sleep_impaired")
    );
    // ...and the advice rule chains on the inferred fact.
    assert!(fired_rule_ids.contains(&"ss-mem-sleep-advice".to_string()));
}

#[test]
fn animal_tissues_clarifies_before_answering() {
    let mut tutor = Tutor::new();
    let response = tutor.process_query("What are animal tissues?");
    let Response::Clarify {
        prompt,
        allowed_values,
        fact_name,
    } = response
    else {
        panic!("expected clarify");
    };
    assert_eq!(fact_name, "tissue_type");
    assert!(!prompt.is_empty());
    assert!(allowed_values.contains(&"epithelial".to_string()));
}

#[test]
fn clarification_dialogue_walks_the_chain_to_an_answer() {
    let mut tutor = Tutor::new();

    let first = tutor.process_query("What are animal tissues?");
    assert!(matches!(
        first,
        Response::Clarify { ref fact_name, .. } if fact_name == "tissue_type"
    ));

    // The follow-up is interpreted against the pending node.
    let second = tutor.process_query("epithelial");
    assert!(
        matches!(
            second,
            Response::Clarify { ref fact_name, .. } if fact_name == "detail_level"
        ),
        "got {second:?}"
    );

    let third = tutor.process_query("overview");
    let Response::Answer {
        concept,
        subtopic,
        fired_rule_ids,
        ..
    } = third
    else {
        panic!("expected answer, got {third:?}");
    };
    assert_eq!(concept, "Epithelial tissue");
    assert_eq!(subtopic, "epithelial");
    assert!(fired_rule_ids.contains(&"bio-tissue-epithelial-overview".to_string()));
}

#[test]
fn bonding_chain_reaches_an_answer_in_chain_length_turns() {
    let mut tutor = Tutor::new();

    let first = tutor.process_query("What is a chemical bond?");
    assert!(matches!(
        first,
        Response::Clarify { ref fact_name, .. } if fact_name == "bond_type"
    ));

    let (concept, aggregate_cf, _, fired) = answer(tutor.process_query("ionic"));
    assert_eq!(concept, "Ionic bonding");
    // chem-bond-ionic (0.9) combines with the generic rule (0.7).
    assert!((aggregate_cf - 0.97).abs() < 1e-4);
    assert!(fired.contains(&"chem-bond-ionic".to_string()));
}

#[test]
fn out_of_domain_answer_reprompts_idempotently() {
    let mut tutor = Tutor::new();
    tutor.process_query("What are animal tissues?");

    let first = tutor.process_query("cartilage");
    let second = tutor.process_query("cartilage");
    let (Response::Clarify { prompt: p1, fact_name: f1, .. },
         Response::Clarify { prompt: p2, fact_name: f2, .. }) = (first, second)
    else {
        panic!("expected two clarifications");
    };
    assert_eq!(f1, "tissue_type");
    assert_eq!(f1, f2);
    assert_eq!(p1, p2, "re-prompt is idempotent");

    // The out-of-domain value lands in the trace.
    let trace = tutor.last_trace().unwrap();
    let note = trace.clarification.as_ref().unwrap();
    assert_eq!(note.out_of_domain.as_deref(), Some("cartilage"));
}

#[test]
fn nonsense_is_no_match_with_empty_fact_set() {
    let mut tutor = Tutor::new();
    let response = tutor.process_query("xyzzy");
    assert!(matches!(response, Response::NoMatch { .. }));

    let trace = tutor.last_trace().unwrap();
    assert_eq!(trace.aggregate_cf, 0.0);
    assert!(trace.extracted_facts.is_empty());
    assert!(trace.topic_candidates.is_empty());
}

#[test]
fn two_matching_rules_combine_certainty_factors() {
    let mut tutor = Tutor::new();
    // photosynthesis fires bio-photo-overview (0.8) and bio-photo-equation
    // (0.7); the intent-gated limiting-factors rule stays silent.
    let (_, aggregate_cf, level, fired) =
        answer(tutor.process_query("What is photosynthesis?"));
    assert_eq!(fired.len(), 2);
    // 0.8 + 0.7·(1 − 0.8) = 0.94
    assert!((aggregate_cf - 0.94).abs() < 1e-4, "got {aggregate_cf}");
    assert_eq!(level, ConfidenceLevel::VeryHigh);
}

#[test]
fn enrichment_timeout_degrades_to_the_authored_answer() {
    let slow: Arc<dyn Enricher> = Arc::new(|_: &EnrichRequest| {
        std::thread::sleep(Duration::from_millis(500));
        Ok("too late".to_string())
    });

    let enriched_config = TutorConfig {
        enrich: EnrichConfig {
            enabled: true,
            timeout: Duration::from_millis(30),
            mode: EnrichMode::Replace,
        },
        ..TutorConfig::default()
    };

    let mut plain = Tutor::new();
    let mut enriched = Tutor::with_config(enriched_config).with_enricher(slow);

    let a = plain.process_query("What is photosynthesis?");
    let b = enriched.process_query("What is photosynthesis?");
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap(),
        "a timed-out hook must leave the response identical to the enrichment-disabled run"
    );
    assert_eq!(
        enriched.last_trace().unwrap().enrichment,
        EnrichmentStatus::TimedOut
    );
    assert_eq!(
        plain.last_trace().unwrap().enrichment,
        EnrichmentStatus::NotAttempted
    );
}

#[test]
fn enrichment_polishes_text_but_never_the_reasoning_outputs() {
    let hook: Arc<dyn Enricher> =
        Arc::new(|req: &EnrichRequest| Ok(format!("In short: {}", req.concept)));

    let config = TutorConfig {
        enrich: EnrichConfig {
            enabled: true,
            timeout: Duration::from_secs(1),
            mode: EnrichMode::Replace,
        },
        ..TutorConfig::default()
    };
    let mut tutor = Tutor::with_config(config).with_enricher(hook);

    let Response::Answer {
        concept,
        explanation,
        aggregate_cf,
        fired_rule_ids,
        ..
    } = tutor.process_query("What is photosynthesis?")
    else {
        panic!("expected answer");
    };
    assert_eq!(explanation, "In short: Photosynthesis");
    // Identity, CF, and fired rules are computed before enrichment.
    assert_eq!(concept, "Photosynthesis");
    assert!((aggregate_cf - 0.94).abs() < 1e-4);
    assert_eq!(fired_rule_ids.len(), 2);
    assert_eq!(
        tutor.last_trace().unwrap().enrichment,
        EnrichmentStatus::Applied
    );
}

#[test]
fn failing_enricher_degrades_silently() {
    let hook: Arc<dyn Enricher> = Arc::new(|_: &EnrichRequest| {
        Err(EnrichError::RequestFailed {
            message: "connection refused".into(),
        })
    });
    let config = TutorConfig {
        enrich: EnrichConfig {
            enabled: true,
            timeout: Duration::from_secs(1),
            mode: EnrichMode::Replace,
        },
        ..TutorConfig::default()
    };
    let mut tutor = Tutor::with_config(config).with_enricher(hook);

    let response = tutor.process_query("What is photosynthesis?");
    assert!(matches!(response, Response::Answer { .. }));
    assert!(matches!(
        tutor.last_trace().unwrap().enrichment,
        EnrichmentStatus::Failed(_)
    ));
}

#[test]
fn added_rule_is_returned_by_lookup_in_priority_order() {
    let kb = KnowledgeBase::bundled();
    kb.add("biology", test_rule("zz-added-low", "photosynthesis", 0.6, -5))
        .unwrap();
    kb.add("biology", test_rule("zz-added-high", "photosynthesis", 0.6, 9))
        .unwrap();

    let ids: Vec<String> = kb
        .lookup("photosynthesis")
        .iter()
        .map(|r| r.id.clone())
        .collect();
    assert_eq!(ids.first().map(String::as_str), Some("zz-added-high"));
    assert_eq!(ids.last().map(String::as_str), Some("zz-added-low"));
}

#[test]
fn add_rule_to_kb_rejects_duplicates_and_bad_cfs() {
    let tutor = Tutor::new();
    assert!(
        tutor
            .add_rule_to_kb("biology", test_rule("bio-photo-overview", "photosynthesis", 0.9, 0))
            .is_err(),
        "duplicate id within the subject"
    );
    assert!(
        tutor
            .add_rule_to_kb("biology", test_rule("zz-bad-cf", "photosynthesis", 1.5, 0))
            .is_err()
    );
    assert!(
        tutor
            .add_rule_to_kb("biology", test_rule("zz-fine", "photosynthesis", 0.5, 0))
            .is_ok()
    );
}

#[test]
fn erroring_rule_is_isolated_and_aggregate_covers_fired_rules_only() {
    let mut tutor = Tutor::new();
    let mut broken = test_rule("zz-broken-assert", "photosynthesis", 0.9, 3);
    broken.asserts = vec![Assertion {
        fact: "note".into(),
        value: "needs {missing_fact}".into(),
    }];
    tutor.add_rule_to_kb("biology", broken).unwrap();

    let (_, aggregate_cf, _, fired) = answer(tutor.process_query("What is photosynthesis?"));
    assert!(!fired.contains(&"zz-broken-assert".to_string()));
    assert!((aggregate_cf - 0.94).abs() < 1e-4, "aggregate over fired rules only");

    let trace = tutor.last_trace().unwrap();
    assert!(
        trace
            .errored
            .iter()
            .any(|e| e.rule_id == "zz-broken-assert" && e.message.contains("missing_fact"))
    );
}

#[test]
fn topic_tie_breaks_lexicographically() {
    let mut tutor = Tutor::new();
    // "acids" and "bonding" are both single-keyword hits (0.6 each);
    // acids_bases wins the tie alphabetically.
    let response = tutor.process_query("acids and bonding");
    match response {
        Response::Answer { topic, .. } => assert_eq!(topic, "acids_bases"),
        Response::Clarify { .. } => panic!("acids_bases has no clarification chain"),
        Response::NoMatch { reason } => panic!("expected a topic: {reason}"),
    }
}

#[test]
fn halting_rule_is_terminal() {
    let mut tutor = Tutor::new();
    tutor.update_profile("stress_level", "high").unwrap();

    let (concept, _, _, fired) =
        answer(tutor.process_query("my exam is in 1 day and I am panicking"));
    assert_eq!(concept, "Exam-eve reset");
    assert_eq!(fired, vec!["ss-exam-eve".to_string()]);
}

#[test]
fn new_topic_resets_a_pending_dialogue() {
    let mut tutor = Tutor::new();
    let first = tutor.process_query("What are animal tissues?");
    assert!(matches!(first, Response::Clarify { .. }));

    // Asking about a different topic abandons the tissue dialogue.
    let second = tutor.process_query("What is photosynthesis?");
    assert!(matches!(second, Response::Answer { .. }));

    // And the dialogue is really gone: a bare value is now a no-match.
    let third = tutor.process_query("epithelial");
    assert!(matches!(third, Response::NoMatch { .. }));
}

#[test]
fn explanation_renders_the_full_cycle() {
    let mut tutor = Tutor::new();
    tutor.update_profile("sleep_hours", 5i64).unwrap();
    tutor.process_query("How can I remember more information?");

    let report = tutor.get_explanation();
    assert!(report.contains("active topic: memory_techniques"));
    assert!(report.contains("fired rules:"));
    assert!(report.contains("ss-mem-sleep-flag"));
    assert!(report.contains("inferred facts:"));
    assert!(report.contains("memory_state = sleep_impaired"));
    assert!(report.contains("outcome: answer"));
}

#[test]
fn external_pack_directory_extends_the_kb() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("geology.toml"),
        r#"
[pack]
id = "geology"
name = "Geology"
subject = "geology"

[[topics]]
tag = "rock_cycle"
triggers = ["rock cycle", "igneous", "sedimentary"]

[[rules]]
id = "geo-rock-overview"
topic = "rock_cycle"
concept = "The rock cycle"
explanation = "Rocks transform between igneous, sedimentary, and metamorphic forms."
cf = 0.8
"#,
    )
    .unwrap();

    let kb = KnowledgeBase::bundled_with_dir(dir.path()).unwrap();
    assert!(kb.all_topics().contains(&"rock_cycle".to_string()));

    let mut tutor = Tutor::with_kb(kb, TutorConfig::default());
    let (concept, aggregate_cf, level, _) =
        answer(tutor.process_query("how does the rock cycle work"));
    assert_eq!(concept, "The rock cycle");
    // A rule firing in isolation passes its intrinsic CF through unchanged.
    assert!((aggregate_cf - 0.8).abs() < 1e-6);
    assert_eq!(level, ConfidenceLevel::High);
}
