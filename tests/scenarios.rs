//! End-to-end transactions through `Config::run`.
//!
//! Every test runs on a paused clock, so receive timeouts elapse as soon as
//! all processes are idle and the runs are deterministic.

use std::time::Duration;

use tempfile::TempDir;
use threepc::storage::{Directory, Memory};
use threepc::{Cause, Config, CoordinatorState, FaultInjection, ParticipantState, Report};

const TIMEOUT: Duration = Duration::from_millis(500);

fn coordinator_log(store: &Memory, report: &Report) -> Vec<String> {
    let id = report.coordinator.as_ref().unwrap().id;
    store.entries(&format!("coordinator-{}", id))
}

fn participant_logs(store: &Memory, report: &Report) -> Vec<Vec<String>> {
    report.participants
        .iter()
        .map(|result| result.as_ref().unwrap().id)
        .map(|id| store.entries(&format!("participant-{}", id)))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn healthy_run_commits() {
    let store = Memory::new();
    let report = Config::new(3)
        .with_timeout(TIMEOUT)
        .run(store.clone())
        .await
        .unwrap();

    assert!(!report.has_errors());
    assert_eq!(coordinator_log(&store, &report), vec!["INIT", "WAIT", "PRECOMMIT", "COMMIT"]);
    for log in participant_logs(&store, &report) {
        assert_eq!(log, vec!["INIT", "READY", "PRECOMMIT", "COMMIT"]);
    }
    for participant in &report.participants {
        assert!(participant.as_ref().unwrap().to_string().ends_with("GLOBAL_COMMIT."));
    }
    assert_eq!(report.decision(), Some(ParticipantState::Commit));
}

#[tokio::test(start_paused = true)]
async fn failed_local_work_aborts_everyone() {
    let store = Memory::new();
    let report = Config::new(3)
        .with_timeout(TIMEOUT)
        .with_failing(1)
        .run(store.clone())
        .await
        .unwrap();

    let coordinator = report.coordinator.as_ref().unwrap();
    let failing = report.participants[1].as_ref().unwrap();
    assert_eq!(coordinator.state, CoordinatorState::Abort);
    assert_eq!(coordinator.cause, Cause::LocalAbortFrom(failing.id));
    assert_eq!(
        coordinator.to_string(),
        format!("Coordinator {} terminated in state ABORT due to local_abort from {}.", coordinator.id, failing.id),
    );
    assert_eq!(coordinator_log(&store, &report).last().map(String::as_str), Some("ABORT"));

    assert_eq!(failing.cause, Cause::LocalAbort);
    let logs = participant_logs(&store, &report);
    assert_eq!(logs[0], vec!["INIT", "READY", "ABORT"]);
    assert_eq!(logs[1], vec!["INIT", "ABORT"]);
    assert_eq!(logs[2], vec!["INIT", "READY", "ABORT"]);
    assert_eq!(report.decision(), Some(ParticipantState::Abort));
}

#[tokio::test(start_paused = true)]
async fn coordinator_crash_in_wait_aborts() {
    let store = Memory::new();
    let report = Config::new(3)
        .with_timeout(TIMEOUT)
        .with_faults(FaultInjection::none().crash_in_wait(1.0))
        .run(store.clone())
        .await
        .unwrap();

    let coordinator = report.coordinator.as_ref().unwrap();
    assert_eq!(coordinator.to_string(), format!("Coordinator {} crashed in state WAIT.", coordinator.id));
    assert_eq!(coordinator_log(&store, &report), vec!["INIT", "WAIT"]);

    for log in participant_logs(&store, &report) {
        assert_eq!(log, vec!["INIT", "READY", "ABORT"]);
    }
    for participant in &report.participants {
        assert_eq!(participant.as_ref().unwrap().cause, Cause::GlobalAbort);
    }
    assert_eq!(report.decision(), Some(ParticipantState::Abort));
}

#[tokio::test(start_paused = true)]
async fn coordinator_crash_in_precommit_commits() {
    let store = Memory::new();
    let report = Config::new(3)
        .with_timeout(TIMEOUT)
        .with_faults(FaultInjection::none().crash_in_precommit(1.0))
        .run(store.clone())
        .await
        .unwrap();

    let coordinator = report.coordinator.as_ref().unwrap();
    assert_eq!(coordinator.state, CoordinatorState::Precommit);
    assert_eq!(coordinator.cause, Cause::Crashed);
    assert_eq!(coordinator_log(&store, &report), vec!["INIT", "WAIT", "PRECOMMIT"]);

    for log in participant_logs(&store, &report) {
        assert_eq!(log, vec!["INIT", "READY", "PRECOMMIT", "COMMIT"]);
    }
    assert_eq!(report.decision(), Some(ParticipantState::Commit));
}

#[tokio::test(start_paused = true)]
async fn silent_coordinator_aborts_lone_participant() {
    let store = Memory::new();
    let start = tokio::time::Instant::now();
    let report = Config::new(1)
        .with_timeout(TIMEOUT)
        .with_faults(FaultInjection::none().crash_in_init(1.0))
        .run(store.clone())
        .await
        .unwrap();

    let coordinator = report.coordinator.as_ref().unwrap();
    assert_eq!(coordinator.to_string(), format!("Coordinator {} crashed in state INIT.", coordinator.id));

    let participant = report.participants[0].as_ref().unwrap();
    assert_eq!(
        participant.to_string(),
        format!("Participant {} terminated in state ABORT due to LOCAL_ABORT.", participant.id),
    );
    assert_eq!(participant_logs(&store, &report), vec![vec!["INIT", "ABORT"]]);

    // One receive timeout, no peer consultation
    assert!(start.elapsed() < TIMEOUT * 2);
}

#[tokio::test(start_paused = true)]
async fn stable_log_on_disk_records_every_state() {
    let temp_dir = TempDir::new().unwrap();
    let store = Directory::new(temp_dir.path()).unwrap();
    let report = Config::new(2)
        .with_timeout(TIMEOUT)
        .run(store.clone())
        .await
        .unwrap();

    let coordinator = report.coordinator.as_ref().unwrap().id;
    let states = store.entries(&format!("coordinator-{}", coordinator))
        .unwrap()
        .into_iter()
        .map(|record| record.state)
        .collect::<Vec<_>>();
    assert_eq!(states, vec!["INIT", "WAIT", "PRECOMMIT", "COMMIT"]);
}

fn parse(state: &str) -> ParticipantState {
    match state {
    | "NEW" => ParticipantState::New,
    | "INIT" => ParticipantState::Init,
    | "READY" => ParticipantState::Ready,
    | "PRECOMMIT" => ParticipantState::Precommit,
    | "COMMIT" => ParticipantState::Commit,
    | "ABORT" => ParticipantState::Abort,
    | other => panic!("unknown state {}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn randomized_runs_agree_and_stay_monotone() {
    let faults = FaultInjection::none()
        .crash_in_init(0.1)
        .crash_in_wait(0.25)
        .crash_in_precommit(0.25);

    for seed in 0..40 {
        let store = Memory::new();
        let report = Config::new(4)
            .with_timeout(TIMEOUT)
            .with_faults(faults)
            .with_failure_rate(0.15)
            .with_seed(seed)
            .run(store.clone())
            .await
            .unwrap();

        assert!(!report.has_errors(), "seed {}: {}", seed, report);
        let decision = report.decision();
        assert!(decision.is_some(), "seed {} split brain: {}", seed, report);

        let coordinator = report.coordinator.as_ref().unwrap();
        let local_abort = report.participants
            .iter()
            .any(|result| result.as_ref().unwrap().cause == Cause::LocalAbort);

        if local_abort {
            assert_eq!(decision, Some(ParticipantState::Abort), "seed {}: {}", seed, report);
            assert_ne!(coordinator.state, CoordinatorState::Commit, "seed {}: {}", seed, report);
        }
        if coordinator.cause != Cause::Crashed && !local_abort {
            assert_eq!(coordinator.state, CoordinatorState::Commit, "seed {}: {}", seed, report);
            assert_eq!(decision, Some(ParticipantState::Commit), "seed {}: {}", seed, report);
        }
        if coordinator.state == CoordinatorState::Precommit && coordinator.cause == Cause::Crashed {
            assert_eq!(decision, Some(ParticipantState::Commit), "seed {}: {}", seed, report);
        }

        for log in participant_logs(&store, &report) {
            let states = log.iter().map(|state| parse(state)).collect::<Vec<_>>();
            for pair in states.windows(2) {
                assert!(pair[0].can_advance_to(pair[1]), "seed {} regressed: {:?}", seed, states);
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn rejects_invalid_configuration() {
    let result = Config::new(2)
        .with_failure_rate(3.0)
        .run(Memory::new())
        .await;
    assert!(matches!(result, Err(threepc::Error::Config(_))));
}
