//! Integration tests for the character → story `Workflow`.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;

use cartoon_core::{JobId, JobKind, JobSnapshot, StageState, StoryRequest};
use cartoon_pipeline::{
    CharacterStep, Phase, PollEvent, PollIntervals, PollerState, StopReason, StoryStep, Workflow,
    WorkflowError, WorkflowUpdate,
};
use common::{completed, failed, running, ScriptedService, Step, FOX_IMAGE};

fn workflow(service: &std::sync::Arc<ScriptedService>) -> Workflow {
    Workflow::new(service.clone(), PollIntervals::default())
}

/// Pull updates until `pred` matches one; panics if polling ends first.
async fn wait_for(
    wf: &mut Workflow,
    pred: impl Fn(&WorkflowUpdate) -> bool,
) -> (Vec<WorkflowUpdate>, WorkflowUpdate) {
    let mut seen = Vec::new();
    loop {
        let update = tokio::time::timeout(Duration::from_secs(120), wf.next_update())
            .await
            .expect("timed out waiting for update")
            .expect("polling ended before the expected update");
        if pred(&update) {
            return (seen, update);
        }
        seen.push(update);
    }
}

fn states(stages: &[cartoon_core::StageView]) -> Vec<StageState> {
    stages.iter().map(|s| s.state).collect()
}

// ---------------------------------------------------------------------------
// Test: happy path with a linked character
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn character_then_linked_story() {
    let service = ScriptedService::new();
    service.issue_ids(&["char-1", "story-1"]);
    service.script(
        "char-1",
        vec![
            Step::ok(JobSnapshot::new("char-1", cartoon_core::JobStatus::Queued, 0)),
            Step::ok(running("char-1", 40)),
            Step::ok(running("char-1", 90).with_character_image(FOX_IMAGE)),
        ],
    );
    service.script(
        "story-1",
        vec![
            Step::ok(running("story-1", 10).with_label("planning")),
            Step::ok(running("story-1", 50).with_label("rendering")),
            Step::ok(completed("story-1")),
        ],
    );

    let mut wf = workflow(&service);
    let char_id = wf.submit_character("  A fox in a red scarf ").await.unwrap();
    assert_eq!(char_id, JobId::from("char-1"));
    assert_eq!(service.character_requests()[0].prompt, "A fox in a red scarf");
    assert_eq!(wf.poller().active_job(), Some(&char_id));

    let (progress, ready) =
        wait_for(&mut wf, |u| matches!(u, WorkflowUpdate::CharacterReady(_))).await;
    assert_eq!(progress.len(), 2);
    assert_matches!(ready, WorkflowUpdate::CharacterReady(c) if c.image == FOX_IMAGE);
    assert_matches!(wf.phase(), Phase::Character(CharacterStep::Ready(_)));

    wf.proceed_to_story().unwrap();
    assert_matches!(
        wf.phase(),
        Phase::Story { character: Some(c), step: StoryStep::AwaitingStory } if c.job_id == char_id
    );

    let story_id = wf.submit_story("Once upon a time...").await.unwrap();
    assert_eq!(story_id, JobId::from("story-1"));
    let sent = service.story_requests();
    assert_eq!(sent[0].character_job_id, Some(char_id.clone()));
    assert_eq!(sent[0].duration_seconds, 300);

    let (_, done) = wait_for(&mut wf, |u| matches!(u, WorkflowUpdate::StoryCompleted { .. })).await;
    assert_matches!(
        done,
        WorkflowUpdate::StoryCompleted { download_url, stages, .. }
            if download_url == "fake://download/story-1"
                && stages.iter().all(|s| s.state == StageState::Completed)
    );

    assert_eq!(wf.download_url().as_deref(), Some("fake://download/story-1"));
    assert_eq!(wf.character().map(|c| &c.job_id), Some(&char_id));

    // Remaining events drain and the stream ends.
    assert_matches!(
        wf.next_update().await,
        Some(WorkflowUpdate::PollingStopped {
            reason: StopReason::Terminal(cartoon_core::JobStatus::Completed),
            ..
        })
    );
    assert!(wf.next_update().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn story_progress_carries_stage_view() {
    let service = ScriptedService::new();
    service.issue_ids(&["story-1"]);
    service.script("story-1", vec![Step::ok(running("story-1", 50))]);

    let mut wf = workflow(&service);
    wf.skip_character().unwrap();
    wf.submit_story("A short tale").await.unwrap();

    let update = wf.next_update().await.unwrap();
    use StageState::{Active as A, Completed as C, Pending as P};
    assert_matches!(
        update,
        WorkflowUpdate::StoryProgress { stages, .. } if states(&stages) == vec![C, C, C, C, A, P]
    );
    assert_eq!(
        states(&wf.stage_view().unwrap()),
        vec![C, C, C, C, A, P]
    );
    assert!(wf.download_url().is_none());
}

// ---------------------------------------------------------------------------
// Test: failure paths
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn failed_story_marks_stage_and_allows_start_over() {
    let service = ScriptedService::new();
    service.issue_ids(&["story-1"]);
    service.script(
        "story-1",
        vec![
            Step::ok(running("story-1", 30)),
            Step::ok(failed("story-1", 45, "Scene planner crashed")),
        ],
    );

    let mut wf = workflow(&service);
    wf.skip_character().unwrap();
    wf.submit_story("A short tale").await.unwrap();
    assert_eq!(service.story_requests()[0].character_job_id, None);

    let (_, update) = wait_for(&mut wf, |u| matches!(u, WorkflowUpdate::StoryFailed { .. })).await;
    use StageState::{Completed as C, Failed as F, Pending as P};
    assert_matches!(
        update,
        WorkflowUpdate::StoryFailed { snapshot, stages }
            if snapshot.message == "Scene planner crashed"
                && states(&stages) == vec![C, C, C, F, P, P]
    );
    assert!(wf.download_url().is_none());

    wf.start_over().unwrap();
    assert_eq!(wf.phase(), &Phase::Character(CharacterStep::AwaitingPrompt));
}

#[tokio::test(start_paused = true)]
async fn character_without_image_fails() {
    let service = ScriptedService::new();
    service.issue_ids(&["char-1"]);
    service.script("char-1", vec![Step::ok(completed("char-1"))]);

    let mut wf = workflow(&service);
    wf.submit_character("A fox").await.unwrap();

    let update = wf.next_update().await.unwrap();
    assert_matches!(update, WorkflowUpdate::CharacterFailed { job_id, .. } if job_id.as_str() == "char-1");
    assert_matches!(wf.phase(), Phase::Character(CharacterStep::Failed { .. }));
    assert_matches!(
        wf.proceed_to_story(),
        Err(WorkflowError::InvalidTransition { .. })
    );

    wf.start_over().unwrap();
    assert_eq!(wf.phase(), &Phase::Character(CharacterStep::AwaitingPrompt));
}

#[tokio::test(start_paused = true)]
async fn fetch_failures_surface_without_stopping() {
    let service = ScriptedService::new();
    service.issue_ids(&["char-1"]);
    service.script(
        "char-1",
        vec![
            Step::fail(),
            Step::ok(running("char-1", 80).with_character_image(FOX_IMAGE)),
        ],
    );

    let mut wf = workflow(&service);
    wf.submit_character("A fox").await.unwrap();

    assert_matches!(
        wf.next_update().await,
        Some(WorkflowUpdate::FetchFailed { tick: 1, .. })
    );
    assert_matches!(
        wf.next_update().await,
        Some(WorkflowUpdate::CharacterReady(_))
    );
}

#[tokio::test(start_paused = true)]
async fn rejected_submission_leaves_state_unchanged() {
    let service = ScriptedService::new();
    service.reject_submissions(true);

    let mut wf = workflow(&service);
    let err = wf.submit_character("A fox").await.unwrap_err();
    assert_matches!(err, WorkflowError::Submission(e) if e.kind == JobKind::Character);
    assert_eq!(wf.phase(), &Phase::Character(CharacterStep::AwaitingPrompt));
    assert_eq!(wf.poller().state(), PollerState::Idle);

    // The user can simply try again.
    service.reject_submissions(false);
    wf.submit_character("A fox").await.unwrap();
    assert!(wf.poller().is_polling());
}

// ---------------------------------------------------------------------------
// Test: guards
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn actions_are_guarded_by_phase() {
    let service = ScriptedService::new();
    let mut wf = workflow(&service);

    assert_matches!(
        wf.submit_story("too early").await,
        Err(WorkflowError::InvalidTransition { .. })
    );
    assert_matches!(
        wf.proceed_to_story(),
        Err(WorkflowError::InvalidTransition { .. })
    );
    assert_matches!(wf.start_over(), Err(WorkflowError::InvalidTransition { .. }));
    assert_matches!(
        wf.submit_character("   ").await,
        Err(WorkflowError::Invalid(_))
    );
    assert!(service.character_requests().is_empty());

    wf.skip_character().unwrap();
    assert_matches!(
        wf.submit_character("A fox").await,
        Err(WorkflowError::InvalidTransition { .. })
    );
    assert_matches!(wf.retry_character(), Err(WorkflowError::InvalidTransition { .. }));
    assert_matches!(wf.submit_story("").await, Err(WorkflowError::Invalid(_)));

    // Start over only once a job has finished.
    assert_matches!(wf.start_over(), Err(WorkflowError::InvalidTransition { .. }));
}

#[tokio::test(start_paused = true)]
async fn story_link_comes_from_the_workflow() {
    let service = ScriptedService::new();
    service.issue_ids(&["story-1"]);
    service.script("story-1", vec![Step::ok(running("story-1", 10))]);

    let mut wf = workflow(&service);
    wf.skip_character().unwrap();
    let request = StoryRequest::new("A tale").with_character(JobId::from("someone-else"));
    wf.submit_story_request(request).await.unwrap();

    assert_eq!(service.story_requests()[0].character_job_id, None);
}

// ---------------------------------------------------------------------------
// Test: teardown and stale responses
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn retry_tears_down_the_character_poller() {
    let service = ScriptedService::new();
    service.issue_ids(&["char-1", "char-2"]);
    service.script("char-1", vec![Step::ok(running("char-1", 20))]);
    service.script(
        "char-2",
        vec![Step::ok(running("char-2", 90).with_character_image(FOX_IMAGE))],
    );

    let mut wf = workflow(&service);
    wf.submit_character("A fox").await.unwrap();
    assert_matches!(
        wf.next_update().await,
        Some(WorkflowUpdate::CharacterProgress(_))
    );

    wf.retry_character().unwrap();
    assert_eq!(wf.phase(), &Phase::Character(CharacterStep::AwaitingPrompt));
    assert_eq!(wf.poller().state(), PollerState::Stopped);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let fetched = service.fetch_count("char-1");
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(service.fetch_count("char-1"), fetched);

    wf.submit_character("A wolf").await.unwrap();
    let (seen, _) = wait_for(&mut wf, |u| matches!(u, WorkflowUpdate::CharacterReady(_))).await;
    // Nothing from the abandoned job leaks into the new attempt.
    assert!(seen.iter().all(|u| !matches!(u, WorkflowUpdate::CharacterProgress(_))));
    assert_eq!(wf.character().unwrap().job_id, JobId::from("char-2"));
}

#[tokio::test(start_paused = true)]
async fn stale_events_are_discarded() {
    let service = ScriptedService::new();
    service.issue_ids(&["char-1"]);
    service.script("char-1", vec![Step::ok(running("char-1", 20))]);

    let mut wf = workflow(&service);
    wf.submit_character("A fox").await.unwrap();
    let session = wf.poller().session().unwrap();

    let from_old_session = PollEvent::Snapshot {
        session: session - 1,
        job_id: JobId::from("char-1"),
        kind: JobKind::Character,
        tick: 9,
        snapshot: running("char-1", 99).with_character_image(FOX_IMAGE),
        received_at: chrono::Utc::now(),
    };
    assert!(wf.apply(from_old_session).is_none());

    let for_other_job = PollEvent::Snapshot {
        session,
        job_id: JobId::from("char-0"),
        kind: JobKind::Character,
        tick: 1,
        snapshot: running("char-0", 99).with_character_image(FOX_IMAGE),
        received_at: chrono::Utc::now(),
    };
    assert!(wf.apply(for_other_job).is_none());
    assert_matches!(
        wf.phase(),
        Phase::Character(CharacterStep::Generating { latest: None, .. })
    );
}

#[tokio::test(start_paused = true)]
async fn progress_regression_still_applies_newest_snapshot() {
    let service = ScriptedService::new();
    service.issue_ids(&["story-1"]);
    service.script(
        "story-1",
        vec![
            Step::ok(running("story-1", 60)),
            Step::ok(running("story-1", 40)),
        ],
    );

    let mut wf = workflow(&service);
    wf.skip_character().unwrap();
    wf.submit_story("A tale").await.unwrap();
    wf.next_update().await.unwrap();
    wf.next_update().await.unwrap();

    assert_matches!(
        wf.phase(),
        Phase::Story {
            step: StoryStep::Running { latest: Some(s), .. },
            ..
        } if s.progress_current == 40
    );
}

// ---------------------------------------------------------------------------
// Test: adopting an existing character
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn adopted_character_links_the_story() {
    let service = ScriptedService::new();
    service.issue_ids(&["story-9"]);
    service.script(
        "char-7",
        vec![Step::ok(completed("char-7").with_character_image(FOX_IMAGE))],
    );
    service.script("story-9", vec![Step::ok(completed("story-9"))]);

    let mut wf = workflow(&service);
    wf.adopt_character(JobId::from("char-7")).await.unwrap();
    assert_eq!(wf.character().unwrap().image, FOX_IMAGE);

    wf.submit_story("A tale").await.unwrap();
    assert_eq!(
        service.story_requests()[0].character_job_id,
        Some(JobId::from("char-7"))
    );
}

#[tokio::test(start_paused = true)]
async fn adopting_a_character_without_image_is_rejected() {
    let service = ScriptedService::new();
    service.script("char-7", vec![Step::ok(running("char-7", 40))]);

    let mut wf = workflow(&service);
    assert_matches!(
        wf.adopt_character(JobId::from("char-7")).await,
        Err(WorkflowError::CharacterNotReady(id)) if id.as_str() == "char-7"
    );
    assert_matches!(
        wf.adopt_character(JobId::from("missing")).await,
        Err(WorkflowError::Status(_))
    );
    assert_eq!(wf.phase(), &Phase::Character(CharacterStep::AwaitingPrompt));
}

// ---------------------------------------------------------------------------
// Test: end of polling on a multi-threaded runtime
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn terminal_snapshot_is_delivered_when_polling_ends() {
    for round in 0..200 {
        let service = ScriptedService::new();
        let job_id = format!("story-{round}");
        service.issue_ids(&[job_id.as_str()]);
        service.script(&job_id, vec![Step::ok(completed(&job_id))]);

        let mut wf = workflow(&service);
        wf.skip_character().unwrap();
        wf.submit_story("A tale").await.unwrap();

        let update = tokio::time::timeout(Duration::from_secs(5), wf.next_update())
            .await
            .expect("timed out waiting for update");
        assert_matches!(
            update,
            Some(WorkflowUpdate::StoryCompleted { .. }),
            "round {round}"
        );
    }
}
