use std::error::Error;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::{json, Value};
use taskdag::dag::{RetryBackoff, Task};
use taskdag::errors::{DagError, TaskError};
use taskdag::exec::{FunctionRegistry, TaskArgs, TaskBody};
use taskdag::state::TaskState;
use taskdag::types::{ExecutionMode, TaskKind};
use taskdag_test_utils::builders::{fast_backoff, failing_task, ok_task, shell_task};
use taskdag_test_utils::functions::{always_fail, flaky, panicking, sleepy};
use taskdag_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn function_task(id: &str, body: TaskBody) -> Task {
    Task::new(id, body).unwrap().with_backoff(fast_backoff())
}

#[tokio::test]
async fn successful_task_returns_value_on_first_attempt() {
    init_tracing();
    let mut task = ok_task("hello", &[]);

    let result = with_timeout(task.execute(ExecutionMode::Threaded)).await;

    assert!(result.success());
    assert_eq!(result.return_value, Some(Value::String("hello".into())));
    assert_eq!(result.attempt, 1);
    assert!(result.error.is_none());
    assert!(result.start_time.is_some() && result.end_time.is_some());
    assert_eq!(task.state(), TaskState::Success);
    assert_eq!(task.current_attempt(), 1);
}

#[tokio::test]
async fn failing_task_uses_every_retry() {
    init_tracing();
    let (func, calls) = always_fail("boom");
    let mut task = function_task("fail", TaskBody::function("fail", func, TaskArgs::default()))
        .with_retries(2);

    let result = with_timeout(task.execute(ExecutionMode::Threaded)).await;

    assert_eq!(result.state, TaskState::Failed);
    assert_eq!(result.attempt, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(result.error, Some(TaskError::Execution("boom".to_string())));
    assert_eq!(task.state(), TaskState::Failed);
    assert!(!task.can_retry());
}

#[tokio::test]
async fn flaky_task_succeeds_on_a_later_attempt() {
    let (func, calls) = flaky(2);
    let mut task = function_task("flaky", TaskBody::function("flaky", func, TaskArgs::default()))
        .with_retries(3);

    let result = with_timeout(task.execute(ExecutionMode::Threaded)).await;

    assert!(result.success());
    assert_eq!(result.attempt, 3);
    assert_eq!(result.return_value, Some(json!(3)));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn process_mode_runs_function_bodies() {
    let (func, _) = flaky(1);
    let mut task = function_task("proc", TaskBody::function("proc", func, TaskArgs::default()))
        .with_retries(1);

    let result = with_timeout(task.execute(ExecutionMode::Process)).await;
    assert!(result.success());
    assert_eq!(result.attempt, 2);
}

#[tokio::test]
async fn slow_function_times_out() {
    init_tracing();
    let mut task = function_task(
        "slow",
        TaskBody::function("slow", sleepy(Duration::from_millis(400)), TaskArgs::default()),
    )
    .with_timeout(Some(Duration::from_millis(200)));

    let result = with_timeout(task.execute(ExecutionMode::Threaded)).await;

    assert_eq!(result.state, TaskState::Failed);
    let error = result.error.expect("timeout error");
    assert!(error.is_timeout(), "got {error:?}");
    assert!(error.to_string().contains("timed out"));
}

#[tokio::test]
async fn fast_function_beats_its_timeout() {
    let mut task = function_task(
        "quick",
        TaskBody::function("quick", sleepy(Duration::from_millis(20)), TaskArgs::default()),
    )
    .with_timeout(Some(Duration::from_secs(2)));

    let result = with_timeout(task.execute(ExecutionMode::Process)).await;
    assert!(result.success());
    assert_eq!(result.return_value, Some(Value::Bool(true)));
}

#[tokio::test]
async fn panicking_body_is_reported_as_failure() {
    init_tracing();
    let mut task = function_task(
        "panic",
        TaskBody::function("panic", panicking("kaboom"), TaskArgs::default()),
    );

    let result = with_timeout(task.execute(ExecutionMode::Threaded)).await;

    assert_eq!(result.state, TaskState::Failed);
    assert_eq!(result.error, Some(TaskError::Panicked("kaboom".to_string())));
}

#[cfg(unix)]
#[tokio::test]
async fn shell_task_captures_stdout() {
    init_tracing();
    let mut task = shell_task("echo", "echo hello", &[]);

    let result = with_timeout(task.execute(ExecutionMode::Threaded)).await;

    assert!(result.success());
    assert_eq!(result.return_value, Some(Value::String("hello\n".into())));
    assert_eq!(task.kind(), TaskKind::Shell);
}

#[cfg(unix)]
#[tokio::test]
async fn shell_task_nonzero_exit_fails() {
    let mut task = shell_task("exit", "echo oops >&2; exit 3", &[]).with_retries(1);

    let result = with_timeout(task.execute(ExecutionMode::Threaded)).await;

    assert_eq!(result.state, TaskState::Failed);
    assert_eq!(result.attempt, 2);
    assert_eq!(
        result.error,
        Some(TaskError::CommandFailed {
            code: 3,
            stderr: "oops".to_string()
        })
    );
}

#[cfg(unix)]
#[tokio::test]
async fn shell_task_is_killed_on_timeout() {
    let mut task = shell_task("sleep", "sleep 5", &[])
        .with_timeout(Some(Duration::from_millis(200)));

    let started = std::time::Instant::now();
    let result = with_timeout(task.execute(ExecutionMode::Threaded)).await;

    assert!(result.error.as_ref().is_some_and(TaskError::is_timeout));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn exhausted_task_must_be_reset_before_rerun() {
    let mut task = failing_task("again", &[]);
    let first = task.execute(ExecutionMode::Threaded).await;
    assert_eq!(first.attempt, 1);

    // No attempts left: the task fails without running its body.
    let second = task.execute(ExecutionMode::Threaded).await;
    assert_eq!(second.state, TaskState::Failed);
    assert_eq!(second.attempt, 1);

    task.reset();
    assert_eq!(task.state(), TaskState::Pending);
    assert_eq!(task.current_attempt(), 0);
    let third = task.execute(ExecutionMode::Threaded).await;
    assert_eq!(third.attempt, 1);
}

#[test]
fn backoff_doubles_and_caps() {
    let backoff = RetryBackoff::default();
    assert_eq!(backoff.delay(1), Duration::from_secs(1));
    assert_eq!(backoff.delay(2), Duration::from_secs(2));
    assert_eq!(backoff.delay(4), Duration::from_secs(8));
    assert_eq!(backoff.delay(7), Duration::from_secs(60));
    assert_eq!(backoff.delay(40), Duration::from_secs(60));

    let small = RetryBackoff::new(Duration::from_millis(100), Duration::from_millis(250));
    assert_eq!(small.delay(2), Duration::from_millis(200));
    assert_eq!(small.delay(3), Duration::from_millis(250));
}

#[test]
fn task_builders_normalise_input() -> TestResult {
    let task = Task::new("t", TaskBody::shell("true"))?
        .with_dependencies(["a", "b", "a"])
        .with_timeout(Some(Duration::ZERO))
        .with_retries(2);

    assert_eq!(task.dependencies(), ["a".to_string(), "b".to_string()]);
    assert_eq!(task.timeout(), None);
    assert!(task.can_retry());

    let dict = task.to_dict();
    assert_eq!(dict["task_type"], "shell");
    assert_eq!(dict["command"], "true");
    assert_eq!(dict["state"], "pending");
    Ok(())
}

#[test]
fn task_new_rejects_bad_input() {
    assert!(matches!(
        Task::new("  ", TaskBody::shell("true")),
        Err(DagError::Config(_))
    ));
    assert!(matches!(
        Task::new("empty", TaskBody::shell("")),
        Err(DagError::Config(_))
    ));
}

#[tokio::test]
async fn builtin_functions() -> TestResult {
    let registry = FunctionRegistry::with_builtins();
    assert_eq!(
        registry.names(),
        vec!["builtin.echo", "builtin.fail", "builtin.hello", "builtin.sleep"]
    );

    let hello = TaskBody::from_registry(
        &registry,
        "builtin.hello",
        TaskArgs::new(vec![json!("Rust")], Default::default()),
    )?;
    let mut task = Task::new("hello", hello)?;
    let result = task.execute(ExecutionMode::Threaded).await;
    assert_eq!(result.return_value, Some(json!("Hello, Rust!")));

    let fail = TaskBody::from_registry(&registry, "builtin.fail", TaskArgs::default())?;
    let mut task = Task::new("fail", fail)?;
    let result = task.execute(ExecutionMode::Threaded).await;
    assert_eq!(
        result.error,
        Some(TaskError::Execution("Simulated task failure".to_string()))
    );

    assert!(TaskBody::from_registry(&registry, "nope", TaskArgs::default()).is_err());
    Ok(())
}
