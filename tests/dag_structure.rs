use std::collections::BTreeSet;
use std::error::Error;

use taskdag::dag::Dag;
use taskdag::errors::DagError;
use taskdag::state::{DagState, TaskState};
use taskdag_test_utils::builders::{diamond, ok_task, DagBuilder};
use taskdag_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[test]
fn add_task_rejects_duplicate_ids() {
    init_tracing();
    let mut dag = Dag::new("dup");
    dag.add_task(ok_task("a", &[])).unwrap();

    let err = dag.add_task(ok_task("a", &[])).unwrap_err();
    assert!(matches!(err, DagError::DuplicateTask(ref id) if id == "a"));
    assert!(err.is_structural());
    assert_eq!(dag.len(), 1);
}

#[test]
fn add_task_with_unknown_dependency_is_deferred_to_validation() {
    init_tracing();
    let mut dag = Dag::new("deferred");
    dag.add_task(ok_task("b", &["a"])).unwrap();
    assert_eq!(dag.len(), 1);

    // Adding the dependency afterwards makes the DAG valid.
    dag.add_task(ok_task("a", &[])).unwrap();
    assert!(dag.validate().unwrap());
    assert_eq!(dag.get_execution_order().unwrap(), vec![vec!["a"], vec!["b"]]);
}

#[test]
fn remove_task_unknown_id_fails() {
    let mut dag = Dag::new("remove");
    let err = dag.remove_task("ghost").unwrap_err();
    assert!(matches!(err, DagError::TaskNotFound(ref id) if id == "ghost"));
}

#[test]
fn remove_task_drops_node_and_edges() -> TestResult {
    let mut dag = DagBuilder::new("remove")
        .ok("a", &[])
        .ok("b", &["a"])
        .ok("c", &[])
        .build();

    let removed = dag.remove_task("b")?;
    assert_eq!(removed.id(), "b");
    assert!(!dag.contains("b"));
    assert_eq!(dag.task_ids().collect::<Vec<_>>(), vec!["a", "c"]);
    assert!(dag.get_task_dependents("a")?.is_empty());
    assert!(dag.validate()?);
    Ok(())
}

#[test]
fn removed_task_added_back_keeps_its_dependents() -> TestResult {
    let mut dag = DagBuilder::new("readd").ok("a", &[]).ok("b", &["a"]).build();

    dag.remove_task("a")?;
    dag.add_task(ok_task("a", &[]))?;

    assert_eq!(dag.get_task_dependents("a")?, set(&["b"]));
    assert_eq!(dag.get_execution_order()?, vec![vec!["a"], vec!["b"]]);
    Ok(())
}

#[test]
fn validate_detects_cycles() {
    init_tracing();
    let mut dag = DagBuilder::new("cycle")
        .ok("a", &["c"])
        .ok("b", &["a"])
        .ok("c", &["b"])
        .build();

    let err = dag.validate().unwrap_err();
    assert!(matches!(err, DagError::DagCycle(_)), "got {err:?}");
    assert!(err.is_structural());
}

#[test]
fn validate_detects_self_dependency_as_cycle() {
    let mut dag = DagBuilder::new("self").ok("a", &["a"]).build();
    assert!(matches!(dag.validate(), Err(DagError::DagCycle(_))));
}

#[test]
fn validate_reports_every_missing_dependency() {
    let mut dag = DagBuilder::new("missing")
        .ok("a", &["x"])
        .ok("b", &["a", "y"])
        .build();

    match dag.validate() {
        Err(DagError::MissingDependency(missing)) => {
            let pairs: Vec<(String, String)> = missing
                .into_iter()
                .map(|m| (m.task, m.dependency))
                .collect();
            assert_eq!(
                pairs,
                vec![
                    ("a".to_string(), "x".to_string()),
                    ("b".to_string(), "y".to_string()),
                ]
            );
        }
        other => panic!("expected MissingDependency, got {other:?}"),
    }
}

#[test]
fn validate_prunes_orphan_nodes() -> TestResult {
    let mut dag = Dag::new("orphans");
    dag.add_task(ok_task("a", &[]))?;
    dag.add_task(ok_task("b", &["placeholder"]))?;
    dag.remove_task("b")?;

    // "placeholder" is still a graph node but no task references it.
    assert_eq!(dag.node_count(), 2);
    assert!(dag.validate()?);
    assert_eq!(dag.node_count(), 1);
    Ok(())
}

#[test]
fn roots_and_leaves() {
    let dag = diamond("shape");
    assert_eq!(dag.get_root_tasks(), vec!["root"]);
    assert_eq!(dag.get_leaf_tasks(), vec!["join"]);

    let flat = DagBuilder::new("flat").ok("x", &[]).ok("y", &[]).build();
    assert_eq!(flat.get_root_tasks(), vec!["x", "y"]);
    assert_eq!(flat.get_leaf_tasks(), vec!["x", "y"]);
}

#[test]
fn transitive_dependencies_and_dependents() -> TestResult {
    let dag = DagBuilder::new("chain")
        .ok("a", &[])
        .ok("b", &["a"])
        .ok("c", &["b"])
        .ok("d", &["c"])
        .ok("side", &[])
        .build();

    assert_eq!(dag.get_task_dependencies("d")?, set(&["a", "b", "c"]));
    assert_eq!(dag.get_task_dependents("a")?, set(&["b", "c", "d"]));
    assert!(dag.get_task_dependencies("a")?.is_empty());
    assert!(dag.get_task_dependents("side")?.is_empty());

    assert!(matches!(
        dag.get_task_dependencies("nope"),
        Err(DagError::TaskNotFound(_))
    ));
    assert!(matches!(
        dag.get_task_dependents("nope"),
        Err(DagError::TaskNotFound(_))
    ));
    Ok(())
}

#[test]
fn stats_and_dict() {
    let dag = diamond("stats").with_description("four tasks");
    let stats = dag.get_stats();

    assert_eq!(stats.total_tasks, 4);
    assert_eq!(stats.pending_tasks, 4);
    assert_eq!(stats.root_tasks, 1);
    assert_eq!(stats.leaf_tasks, 1);
    assert_eq!(stats.max_depth, 3);

    let dict = dag.to_dict();
    assert_eq!(dict["dag_id"], "stats");
    assert_eq!(dict["description"], "four tasks");
    assert_eq!(dict["execution_mode"], "threaded");
    assert_eq!(dict["tasks"]["join"]["dependencies"][0], "left");
    assert_eq!(dict["tasks"]["root"]["task_type"], "function");
    assert_eq!(dict["stats"]["max_depth"], 3);
}

#[test]
fn max_workers_is_clamped_to_one() {
    let mut dag = Dag::new("workers");
    dag.set_max_workers(0);
    assert_eq!(dag.max_workers(), 1);
    assert_eq!(Dag::new("default").max_workers(), 4);
}

#[tokio::test]
async fn reset_returns_everything_to_pending() -> TestResult {
    use taskdag::engine::Runner;

    let mut dag = diamond("reset");
    let runner = Runner::default();
    runner.run_dag(&mut dag).await?;
    assert_eq!(dag.state(), DagState::Success);
    assert!(dag.tasks().all(|t| t.state() == TaskState::Success));

    dag.reset();
    assert_eq!(dag.state(), DagState::Pending);
    assert!(dag.tasks().all(|t| t.state() == TaskState::Pending && t.current_attempt() == 0));
    Ok(())
}
