use std::error::Error;

use taskdag::dag::{Dag, Scheduler, Task};
use taskdag::state::TaskState;
use taskdag_test_utils::builders::{diamond, ok_task, DagBuilder};
use taskdag_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn ids(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(Task::id).collect()
}

fn state_of(dag: &Dag, id: &str) -> TaskState {
    dag.get_task(id).map(Task::state).unwrap_or_default()
}

#[test]
fn only_roots_are_ready_initially() {
    init_tracing();
    let mut dag = diamond("ready");
    let mut scheduler = Scheduler::new(&mut dag);

    assert_eq!(ids(&scheduler.get_ready_tasks()), vec!["root"]);
    assert!(scheduler.is_consistent());
}

#[test]
fn dependents_become_ready_after_success() {
    let mut dag = diamond("ready");
    let mut scheduler = Scheduler::new(&mut dag);

    scheduler.mark_task_running("root");
    assert!(scheduler.is_running("root"));
    assert_eq!(scheduler.running_count(), 1);
    // A running task is never offered again.
    assert!(scheduler.get_ready_tasks().is_empty());

    scheduler.mark_task_completed("root", true);
    assert_eq!(ids(&scheduler.get_ready_tasks()), vec!["left", "right"]);

    scheduler.mark_task_running("left");
    scheduler.mark_task_completed("left", true);
    assert_eq!(ids(&scheduler.get_ready_tasks()), vec!["right"]);
    assert_eq!(scheduler.get_blocking_tasks("join"), vec!["right"]);

    scheduler.mark_task_running("right");
    scheduler.mark_task_completed("right", true);
    assert_eq!(ids(&scheduler.get_ready_tasks()), vec!["join"]);
    assert!(scheduler.get_blocking_tasks("join").is_empty());
    assert!(scheduler.is_consistent());
}

#[test]
fn failure_skips_all_transitive_dependents() {
    init_tracing();
    let mut dag = DagBuilder::new("skip")
        .ok("a", &[])
        .ok("b", &["a"])
        .ok("c", &["b"])
        .ok("other", &[])
        .build();

    {
        let mut scheduler = Scheduler::new(&mut dag);
        scheduler.mark_task_running("a");
        scheduler.mark_task_completed("a", false);

        assert_eq!(ids(&scheduler.get_ready_tasks()), vec!["other"]);
        assert!(scheduler.is_consistent());
    }

    assert_eq!(state_of(&dag, "a"), TaskState::Failed);
    assert_eq!(state_of(&dag, "b"), TaskState::Skipped);
    assert_eq!(state_of(&dag, "c"), TaskState::Skipped);
    assert_eq!(state_of(&dag, "other"), TaskState::Pending);
}

#[test]
fn skip_does_not_touch_tasks_already_finished() {
    // join depends on both branches; the left branch already succeeded.
    let mut dag = diamond("finished");
    {
        let mut scheduler = Scheduler::new(&mut dag);
        scheduler.mark_task_running("root");
        scheduler.mark_task_completed("root", true);
        scheduler.mark_task_running("left");
        scheduler.mark_task_completed("left", true);
        scheduler.mark_task_running("right");
        scheduler.mark_task_completed("right", false);
    }

    assert_eq!(state_of(&dag, "left"), TaskState::Success);
    assert_eq!(state_of(&dag, "right"), TaskState::Failed);
    assert_eq!(state_of(&dag, "join"), TaskState::Skipped);
}

#[test]
fn has_runnable_tasks_tracks_pending_and_running() {
    let mut dag = DagBuilder::new("runnable").ok("only", &[]).build();
    let mut scheduler = Scheduler::new(&mut dag);

    assert!(scheduler.has_runnable_tasks());
    scheduler.mark_task_running("only");
    assert!(scheduler.has_runnable_tasks());
    scheduler.mark_task_completed("only", true);
    assert!(!scheduler.has_runnable_tasks());
}

#[test]
fn empty_dag_has_nothing_runnable() {
    let mut dag = Dag::new("empty");
    let mut scheduler = Scheduler::new(&mut dag);
    assert!(!scheduler.has_runnable_tasks());
    assert!(scheduler.get_ready_tasks().is_empty());

    let progress = scheduler.get_progress();
    assert_eq!(progress.total, 0);
    assert_eq!(progress.percentage, 0.0);
}

#[test]
fn progress_counts_every_bucket() {
    let mut dag = DagBuilder::new("progress")
        .ok("a", &[])
        .ok("b", &["a"])
        .ok("c", &[])
        .ok("d", &[])
        .ok("e", &["d"])
        .ok("f", &[])
        .build();
    let mut scheduler = Scheduler::new(&mut dag);

    scheduler.mark_task_running("a");
    scheduler.mark_task_completed("a", true);
    scheduler.mark_task_running("d");
    scheduler.mark_task_completed("d", false);
    scheduler.mark_task_running("c");

    let progress = scheduler.get_progress();
    assert_eq!(progress.total, 6);
    assert_eq!(progress.completed, 1);
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.running, 1);
    assert_eq!(progress.skipped, 1);
    assert_eq!(progress.pending, 2);
    assert_eq!(progress.percentage, 50.0);

    let json = serde_json::to_value(progress).unwrap();
    assert_eq!(json["pending"], 2);
}

#[test]
fn percentage_is_rounded_to_two_decimals() {
    let mut dag = DagBuilder::new("thirds")
        .ok("a", &[])
        .ok("b", &[])
        .ok("c", &[])
        .build();
    let mut scheduler = Scheduler::new(&mut dag);
    scheduler.mark_task_running("a");
    scheduler.mark_task_completed("a", true);

    assert_eq!(scheduler.get_progress().percentage, 33.33);
}

#[test]
fn next_batch_is_truncated() {
    let mut dag = DagBuilder::new("batch")
        .ok("a", &[])
        .ok("b", &[])
        .ok("c", &[])
        .build();
    let mut scheduler = Scheduler::new(&mut dag);

    assert_eq!(ids(&scheduler.get_next_batch(Some(2))), vec!["a", "b"]);
    assert_eq!(scheduler.get_next_batch(None).len(), 3);
    assert!(scheduler.get_next_batch(Some(0)).is_empty());
}

#[test]
fn unknown_ids_are_ignored() {
    let mut dag = diamond("unknown");
    let mut scheduler = Scheduler::new(&mut dag);

    scheduler.mark_task_running("ghost");
    scheduler.mark_task_completed("ghost", false);

    assert_eq!(scheduler.running_count(), 0);
    assert!(scheduler.get_blocking_tasks("ghost").is_empty());
    assert!(scheduler.is_consistent());
}

#[test]
fn execution_plan_matches_dag_order() -> TestResult {
    let mut dag = diamond("plan");
    let expected = dag.get_execution_order()?;
    let scheduler = Scheduler::new(&mut dag);
    assert_eq!(scheduler.get_execution_plan()?, expected);
    Ok(())
}

#[test]
fn reset_clears_tracking_sets_only() {
    let mut dag = diamond("reset");
    let mut scheduler = Scheduler::new(&mut dag);
    scheduler.mark_task_running("root");
    scheduler.mark_task_completed("root", true);

    scheduler.reset();
    assert_eq!(scheduler.get_progress().completed, 0);
    assert_eq!(scheduler.dag().get_task("root").map(Task::state), Some(TaskState::Success));
    // The task still says Success but the set no longer does.
    assert!(!scheduler.is_consistent());
}

#[test]
fn new_scheduler_seeds_from_finished_tasks() {
    let mut dag = diamond("seeded");
    {
        let mut scheduler = Scheduler::new(&mut dag);
        scheduler.mark_task_running("root");
        scheduler.mark_task_completed("root", true);
    }

    let mut scheduler = Scheduler::new(&mut dag);
    assert!(scheduler.is_consistent());
    assert_eq!(scheduler.get_progress().completed, 1);
    assert_eq!(ids(&scheduler.get_ready_tasks()), vec!["left", "right"]);
}

#[test]
fn new_scheduler_skips_tasks_added_behind_a_skipped_one() -> TestResult {
    let mut dag = DagBuilder::new("late").ok("a", &[]).ok("b", &["a"]).build();
    {
        let mut scheduler = Scheduler::new(&mut dag);
        scheduler.mark_task_running("a");
        scheduler.mark_task_completed("a", false);
    }
    assert_eq!(state_of(&dag, "b"), TaskState::Skipped);

    dag.add_task(ok_task("c", &["b"]))?;
    dag.add_task(ok_task("d", &["c"]))?;

    let mut scheduler = Scheduler::new(&mut dag);
    assert!(scheduler.get_ready_tasks().is_empty());
    assert!(!scheduler.has_runnable_tasks());
    assert!(scheduler.is_consistent());
    assert_eq!(scheduler.get_progress().skipped, 3);
    drop(scheduler);

    assert_eq!(state_of(&dag, "c"), TaskState::Skipped);
    assert_eq!(state_of(&dag, "d"), TaskState::Skipped);
    Ok(())
}
