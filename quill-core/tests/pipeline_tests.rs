//! End-to-end tests for the content-writer pipeline

use std::sync::Arc;

use quill_core::llm::providers::ScriptedProvider;
use quill_core::prelude::*;
use quill_core::prompt::system_prompt;
use quill_core::retrieval::FeedbackEntry;

const USER: &str = "user-1";
const PROFILE: &str = "acme-health";

const CONCEPTS: &str = r#"```json
[
  {"title": "Faster diagnostics", "summary": "How models read scans."},
  {"title": "Clinical paperwork", "summary": "Automating notes and coding."},
  {"title": "Privacy by design", "summary": "Keeping patient data safe."},
  {"title": "Drug discovery", "summary": "Shortening the pipeline."},
  {"title": "Remote monitoring", "summary": "Care outside the clinic."}
]
```"#;

const SUBTOPICS: &str = r#"[
  {"title": "Consent", "summary": "What patients agree to."},
  {"title": "De-identification", "summary": "Removing identifiers."},
  {"title": "Audit trails", "summary": "Who saw what."}
]"#;

const DRAFT: &str = "# Privacy by design in clinical AI\n\nHospitals adopting AI must protect patient data.";

fn review(score: u32, issues: &[&str]) -> String {
    serde_json::json!({ "score": score, "issues": issues }).to_string()
}

fn marker(kind: PromptKind) -> &'static str {
    system_prompt(kind)
}

/// Ideation and drafting replies; reviews fall back to a clean score
fn writer_script() -> ScriptedProvider {
    ScriptedProvider::new()
        .on(marker(PromptKind::Concepts), [CONCEPTS])
        .on(marker(PromptKind::Subtopics), [SUBTOPICS])
        .on(marker(PromptKind::Draft), [DRAFT])
        .fallback(review(95, &[]))
}

fn guidelines() -> Arc<InMemoryGuidelineStore> {
    Arc::new(InMemoryGuidelineStore::new().with_profile(GuidelineProfile {
        id: PROFILE.to_string(),
        user_id: USER.to_string(),
        name: Some("Acme Health".to_string()),
        content: GuidelineContent::Legacy("Warm, plain-spoken, never alarmist.".to_string()),
        regulatory: None,
    }))
}

fn workflow(provider: &Arc<ScriptedProvider>) -> ContentWorkflow {
    ContentWorkflow::builder()
        .provider(provider.clone())
        .guidelines(guidelines())
        .build()
        .unwrap()
}

fn candidate_ids(report: &WorkflowReport) -> Vec<String> {
    report
        .pending
        .as_ref()
        .expect("workflow should be suspended")
        .candidates
        .ids()
        .into_iter()
        .map(String::from)
        .collect()
}

async fn to_subtopic_gate(workflow: &ContentWorkflow) -> WorkflowReport {
    let report = workflow
        .start(ContentRequest::new("AI in healthcare", USER).with_profile(PROFILE))
        .await
        .unwrap();
    let concepts = candidate_ids(&report);
    workflow
        .resume(
            &report.request_id,
            HumanDecision::SelectConcept {
                concept_id: concepts[2].clone(),
            },
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_healthcare_article_regenerates_once_then_completes() {
    let provider = Arc::new(
        writer_script()
            .on(
                marker(PromptKind::BrandReview),
                [review(65, &["Tone is too alarmist"]), review(85, &[])],
            )
            .on(marker(PromptKind::FactReview), [review(90, &[])]),
    );
    let workflow = workflow(&provider);

    let report = workflow
        .start(ContentRequest::new("AI in healthcare", USER).with_profile(PROFILE))
        .await
        .unwrap();
    assert_eq!(report.status, WorkflowStatus::AwaitingHuman);
    assert_eq!(report.step, WorkflowStep::AwaitingConcept);
    let prompt = provider.requests_matching(marker(PromptKind::Concepts))[0].user_content();
    assert!(prompt.contains("never alarmist"));

    let concepts = candidate_ids(&report);
    assert_eq!(concepts.len(), 5);
    let mut distinct = concepts.clone();
    distinct.sort();
    distinct.dedup();
    assert_eq!(distinct.len(), 5);

    let report = workflow
        .resume(
            &report.request_id,
            HumanDecision::SelectConcept {
                concept_id: concepts[2].clone(),
            },
        )
        .await
        .unwrap();
    assert_eq!(report.step, WorkflowStep::AwaitingSubtopics);

    let subtopic_requests = provider.requests_matching(marker(PromptKind::Subtopics));
    assert_eq!(subtopic_requests.len(), 1);
    let prompt = subtopic_requests[0].user_content();
    assert!(prompt.contains("Privacy by design"));
    assert!(!prompt.contains("Faster diagnostics"));

    let subtopics = candidate_ids(&report);
    let report = workflow
        .resume(
            &report.request_id,
            HumanDecision::SelectSubtopics {
                subtopic_ids: subtopics[..2].to_vec(),
            },
        )
        .await
        .unwrap();

    assert_eq!(report.status, WorkflowStatus::Complete);
    assert_eq!(report.step, WorkflowStep::Done);
    assert_eq!(report.regeneration_count, 1);
    assert_eq!(report.brand_score, Some(85.0));
    assert_eq!(report.fact_score, Some(90.0));

    let draft = report.draft.expect("complete workflows carry the draft");
    assert_eq!(draft.revision, 2);
    assert_eq!(draft.title, "Privacy by design in clinical AI");

    let drafts = provider.requests_matching(marker(PromptKind::Draft));
    assert_eq!(drafts.len(), 2);
    assert!(!drafts[0].user_content().contains("Tone is too alarmist"));
    assert!(drafts[1].user_content().contains("Tone is too alarmist"));

    let state = workflow
        .store()
        .load(&report.request_id)
        .await
        .unwrap()
        .unwrap();
    assert!(state.errors.is_empty());
    assert_eq!(state.metadata.last_decision, Some(PolicyDecision::Complete));
    assert_eq!(state.selected_subtopic_ids, subtopics[..2].to_vec());
}

#[tokio::test]
async fn test_malformed_concepts_fail_the_workflow() {
    let provider = Arc::new(ScriptedProvider::new().on(marker(PromptKind::Concepts), ["not json"]));
    let workflow = workflow(&provider);

    let report = workflow
        .start(ContentRequest::new("AI in healthcare", USER))
        .await
        .unwrap();
    assert_eq!(report.status, WorkflowStatus::Failed);
    assert_eq!(report.error.as_ref().unwrap().step, "generateConcepts");
    assert!(report.pending.is_none());

    let state = workflow
        .store()
        .load(&report.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.errors.len(), 1);
    assert!(state.concepts.is_empty());
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_blank_topic_surfaces_clarifying_question() {
    let provider = Arc::new(
        ScriptedProvider::new().on(
            marker(PromptKind::Concepts),
            ["Which area of healthcare should the article cover?"],
        ),
    );
    let workflow = workflow(&provider);

    let report = workflow
        .start(ContentRequest::new("   ", USER))
        .await
        .unwrap();
    assert_eq!(report.status, WorkflowStatus::Failed);
    let error = report.error.unwrap();
    assert_eq!(error.step, "generateConcepts");
    assert!(error.message.contains("Which area of healthcare"));

    let request = &provider.requests_matching(marker(PromptKind::Concepts))[0];
    assert!(request.user_content().contains("Do not choose or invent a topic"));
}

#[tokio::test]
async fn test_suspended_workflow_resumes_in_fresh_engine() {
    let dir = tempfile::tempdir().unwrap();

    let first = Arc::new(writer_script());
    let request_id = {
        let workflow = ContentWorkflow::builder()
            .provider(first.clone())
            .store(Arc::new(FileJobStore::new(dir.path())))
            .build()
            .unwrap();
        let report = to_subtopic_gate(&workflow).await;
        assert_eq!(report.step, WorkflowStep::AwaitingSubtopics);
        report.request_id
    };

    let second = Arc::new(writer_script());
    let workflow = ContentWorkflow::builder()
        .provider(second.clone())
        .store(Arc::new(FileJobStore::new(dir.path())))
        .build()
        .unwrap();

    let report = workflow.report(&request_id).await.unwrap();
    assert_eq!(report.status, WorkflowStatus::AwaitingHuman);
    assert_eq!(report.step, WorkflowStep::AwaitingSubtopics);
    let subtopics = candidate_ids(&report);
    assert_eq!(subtopics.len(), 3);

    let report = workflow
        .resume(
            &request_id,
            HumanDecision::SelectSubtopics {
                subtopic_ids: vec![subtopics[1].clone()],
            },
        )
        .await
        .unwrap();
    assert_eq!(report.status, WorkflowStatus::Complete);

    // Nothing before the gate ran again
    assert!(second.requests_matching(marker(PromptKind::Concepts)).is_empty());
    assert!(second.requests_matching(marker(PromptKind::Subtopics)).is_empty());
    assert_eq!(second.requests_matching(marker(PromptKind::Draft)).len(), 1);
}

#[tokio::test]
async fn test_stale_selection_re_suspends() {
    let provider = Arc::new(writer_script());
    let workflow = workflow(&provider);

    let report = workflow
        .start(ContentRequest::new("AI in healthcare", USER))
        .await
        .unwrap();
    let report = workflow
        .resume(
            &report.request_id,
            HumanDecision::SelectConcept {
                concept_id: "not-a-concept".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(report.status, WorkflowStatus::AwaitingHuman);
    assert_eq!(report.step, WorkflowStep::AwaitingConcept);
    assert!(provider.requests_matching(marker(PromptKind::Subtopics)).is_empty());

    let state = workflow
        .store()
        .load(&report.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.selected_concept_id, None);

    let concepts = candidate_ids(&report);
    let report = workflow
        .resume(
            &report.request_id,
            HumanDecision::SelectConcept {
                concept_id: concepts[0].clone(),
            },
        )
        .await
        .unwrap();
    let subtopics = candidate_ids(&report);

    let report = workflow
        .resume(
            &report.request_id,
            HumanDecision::SelectSubtopics {
                subtopic_ids: vec![subtopics[0].clone(), "ghost".to_string()],
            },
        )
        .await
        .unwrap();
    assert_eq!(report.step, WorkflowStep::AwaitingSubtopics);
    assert!(provider.requests_matching(marker(PromptKind::Draft)).is_empty());
}

#[tokio::test]
async fn test_decision_for_wrong_gate_is_rejected() {
    let provider = Arc::new(writer_script());
    let workflow = workflow(&provider);

    let report = workflow
        .start(ContentRequest::new("AI in healthcare", USER))
        .await
        .unwrap();
    let err = workflow
        .resume(
            &report.request_id,
            HumanDecision::FinalReview {
                decision: ReviewDecision::Accept,
                feedback: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, QuillError::InvalidDecision(_)));

    let err = workflow
        .resume(
            "missing",
            HumanDecision::SelectConcept {
                concept_id: "c".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, QuillError::WorkflowNotFound(_)));
}

#[tokio::test]
async fn test_concurrent_resumes_are_serialized() {
    let provider = Arc::new(writer_script());
    let workflow = workflow(&provider);

    let report = workflow
        .start(ContentRequest::new("AI in healthcare", USER))
        .await
        .unwrap();
    let concept_id = candidate_ids(&report)[0].clone();
    let decision = HumanDecision::SelectConcept { concept_id };

    let (a, b) = tokio::join!(
        workflow.resume(&report.request_id, decision.clone()),
        workflow.resume(&report.request_id, decision),
    );
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    assert_eq!(provider.requests_matching(marker(PromptKind::Subtopics)).len(), 1);
}

#[tokio::test]
async fn test_cancel() {
    let provider = Arc::new(writer_script());
    let workflow = workflow(&provider);

    let report = workflow
        .start(ContentRequest::new("AI in healthcare", USER))
        .await
        .unwrap();
    let report = workflow
        .cancel(&report.request_id, "topic withdrawn")
        .await
        .unwrap();
    assert_eq!(report.status, WorkflowStatus::Failed);
    let error = report.error.unwrap();
    assert_eq!(error.step, "cancelled");
    assert_eq!(error.message, "topic withdrawn");

    let err = workflow
        .resume(
            &report.request_id,
            HumanDecision::SelectConcept {
                concept_id: "c".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, QuillError::InvalidDecision(_)));

    // Failed is terminal
    assert!(workflow.cancel(&report.request_id, "again").await.is_err());
}

#[tokio::test]
async fn test_regeneration_ceiling_hands_off_to_human() {
    let provider = Arc::new(
        writer_script().on(
            marker(PromptKind::BrandReview),
            [review(40, &["Off-brand vocabulary"])],
        ),
    );
    let workflow = workflow(&provider);

    let report = to_subtopic_gate(&workflow).await;
    let subtopics = candidate_ids(&report);
    let report = workflow
        .resume(
            &report.request_id,
            HumanDecision::SelectSubtopics {
                subtopic_ids: subtopics,
            },
        )
        .await
        .unwrap();

    assert_eq!(report.status, WorkflowStatus::AwaitingHuman);
    assert_eq!(report.step, WorkflowStep::AwaitingFinalReview);
    assert_eq!(report.regeneration_count, 3);
    assert_eq!(report.brand_score, Some(40.0));
    assert!(report.draft.is_some());
    assert_eq!(candidate_ids(&report), vec!["accept".to_string()]);
    assert_eq!(provider.requests_matching(marker(PromptKind::Draft)).len(), 4);

    // Regenerate is no longer offered; the gate clears it and waits again
    let report = workflow
        .resume(
            &report.request_id,
            HumanDecision::FinalReview {
                decision: ReviewDecision::Regenerate,
                feedback: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(report.step, WorkflowStep::AwaitingFinalReview);
    assert_eq!(report.regeneration_count, 3);
    assert_eq!(provider.requests_matching(marker(PromptKind::Draft)).len(), 4);

    let report = workflow
        .resume(
            &report.request_id,
            HumanDecision::FinalReview {
                decision: ReviewDecision::Accept,
                feedback: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(report.status, WorkflowStatus::Complete);
    assert_eq!(report.regeneration_count, 3);
}

#[tokio::test]
async fn test_required_final_approval_with_reviewer_feedback() {
    let provider = Arc::new(writer_script());
    let workflow = ContentWorkflow::builder()
        .provider(provider.clone())
        .guidelines(guidelines())
        .policy(PolicyConfig {
            require_final_approval: true,
            ..Default::default()
        })
        .build()
        .unwrap();

    let report = to_subtopic_gate(&workflow).await;
    let subtopics = candidate_ids(&report);
    let report = workflow
        .resume(
            &report.request_id,
            HumanDecision::SelectSubtopics {
                subtopic_ids: subtopics,
            },
        )
        .await
        .unwrap();
    assert_eq!(report.step, WorkflowStep::AwaitingFinalReview);
    assert_eq!(
        candidate_ids(&report),
        vec!["accept".to_string(), "regenerate".to_string()]
    );

    let report = workflow
        .resume(
            &report.request_id,
            HumanDecision::FinalReview {
                decision: ReviewDecision::Regenerate,
                feedback: Some("Open with a patient story".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(report.step, WorkflowStep::AwaitingFinalReview);
    assert_eq!(report.regeneration_count, 1);

    let drafts = provider.requests_matching(marker(PromptKind::Draft));
    assert_eq!(drafts.len(), 2);
    assert!(drafts[1].user_content().contains("Open with a patient story"));

    let report = workflow
        .resume(
            &report.request_id,
            HumanDecision::FinalReview {
                decision: ReviewDecision::Accept,
                feedback: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(report.status, WorkflowStatus::Complete);

    let state = workflow
        .store()
        .load(&report.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.metadata.reviewer_feedback, None);
    assert_eq!(state.metadata.final_decision, Some(ReviewDecision::Accept));
}

#[tokio::test]
async fn test_past_feedback_reaches_generation_prompts() {
    let retriever = Arc::new(InMemoryRetriever::new());
    retriever
        .add_feedback(FeedbackEntry {
            user_id: USER.to_string(),
            tool_name: "content_writer".to_string(),
            profile_id: None,
            text: "Readers want concrete hospital examples".to_string(),
        })
        .await;

    let provider = Arc::new(writer_script());
    let workflow = ContentWorkflow::builder()
        .provider(provider.clone())
        .retriever(retriever)
        .build()
        .unwrap();

    workflow
        .start(ContentRequest::new("AI in healthcare", USER))
        .await
        .unwrap();
    let concepts = provider.requests_matching(marker(PromptKind::Concepts));
    assert!(concepts[0]
        .user_content()
        .contains("Readers want concrete hospital examples"));
}

#[tokio::test]
async fn test_unknown_profile_is_ignored() {
    let provider = Arc::new(writer_script());
    let workflow = workflow(&provider);

    let report = workflow
        .start(ContentRequest::new("AI in healthcare", "someone-else").with_profile(PROFILE))
        .await
        .unwrap();
    assert_eq!(report.status, WorkflowStatus::AwaitingHuman);

    let prompt = provider.requests_matching(marker(PromptKind::Concepts))[0].user_content();
    assert!(!prompt.contains("never alarmist"));
}

#[tokio::test]
async fn test_regulatory_issues_reach_the_reviewer() {
    let provider = Arc::new(
        writer_script().on(
            marker(PromptKind::RegulatoryReview),
            [review(40, &["Claims AI cures cancer"])],
        ),
    );
    let guidelines = InMemoryGuidelineStore::new().with_profile(GuidelineProfile {
        id: PROFILE.to_string(),
        user_id: USER.to_string(),
        name: Some("Acme Health".to_string()),
        content: GuidelineContent::Legacy("Warm, plain-spoken, never alarmist.".to_string()),
        regulatory: Some(GuidelineContent::Legacy(
            "No treatment or cure claims.".to_string(),
        )),
    });
    let workflow = ContentWorkflow::builder()
        .provider(provider.clone())
        .guidelines(Arc::new(guidelines))
        .policy(PolicyConfig {
            require_final_approval: true,
            ..Default::default()
        })
        .build()
        .unwrap();

    let report = to_subtopic_gate(&workflow).await;
    let subtopics = candidate_ids(&report);
    let report = workflow
        .resume(
            &report.request_id,
            HumanDecision::SelectSubtopics {
                subtopic_ids: subtopics,
            },
        )
        .await
        .unwrap();

    // Brand and fact pass, so only the reviewer can catch the claim
    assert_eq!(report.step, WorkflowStep::AwaitingFinalReview);
    assert_eq!(report.regeneration_count, 0);
    assert_eq!(report.brand_score, Some(95.0));
    let message = &report.pending.as_ref().unwrap().message;
    assert!(message.contains("[regulatory] Claims AI cures cancer"));

    let regulatory = &report.reviews[&QualityDimension::Regulatory];
    assert_eq!(regulatory.score, 40.0);
    assert_eq!(regulatory.issues, vec!["Claims AI cures cancer"]);
    assert_eq!(report.reviews.len(), 4);
}

#[tokio::test]
async fn test_recover_redrives_interrupted_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(writer_script());
    let workflow = ContentWorkflow::builder()
        .provider(provider.clone())
        .store(Arc::new(FileJobStore::new(dir.path())))
        .build()
        .unwrap();

    let report = workflow
        .start(ContentRequest::new("AI in healthcare", USER))
        .await
        .unwrap();
    let concepts = candidate_ids(&report);

    // Left behind by a process that died after taking the decision
    workflow
        .store()
        .merge(
            &report.request_id,
            StatePatch::new()
                .selected_concept(Some(concepts[0].clone()))
                .status(WorkflowStatus::Processing)
                .pending(None),
        )
        .await
        .unwrap();

    let report = workflow.recover(&report.request_id).await.unwrap();
    assert_eq!(report.status, WorkflowStatus::AwaitingHuman);
    assert_eq!(report.step, WorkflowStep::AwaitingSubtopics);
    assert_eq!(provider.requests_matching(marker(PromptKind::Subtopics)).len(), 1);

    let state = workflow
        .store()
        .load(&report.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        state.metadata.annotations.get("recovered_from").map(String::as_str),
        Some("awaiting_concept")
    );

    let err = workflow.recover(&report.request_id).await.unwrap_err();
    assert!(matches!(err, QuillError::InvalidInput(_)));
}
