use std::collections::HashSet;

use taskdag::dag::Dag;
use taskdag::errors::DagError;
use taskdag_test_utils::builders::{diamond, DagBuilder};

fn sorted(level: &[String]) -> Vec<String> {
    let mut level = level.to_vec();
    level.sort();
    level
}

#[test]
fn diamond_levels() {
    let dag = diamond("diamond");
    let levels = dag.get_execution_order().unwrap();

    assert_eq!(levels.len(), 3);
    assert_eq!(levels[0], vec!["root"]);
    assert_eq!(sorted(&levels[1]), vec!["left", "right"]);
    assert_eq!(levels[2], vec!["join"]);
}

#[test]
fn independent_tasks_share_one_level_in_insertion_order() {
    let dag = DagBuilder::new("flat")
        .ok("c", &[])
        .ok("a", &[])
        .ok("b", &[])
        .build();
    assert_eq!(dag.get_execution_order().unwrap(), vec![vec!["c", "a", "b"]]);
}

#[test]
fn task_lands_after_its_deepest_dependency() {
    // d depends on a (level 1) and c (level 3), so it belongs in level 4.
    let dag = DagBuilder::new("uneven")
        .ok("a", &[])
        .ok("b", &["a"])
        .ok("c", &["b"])
        .ok("d", &["a", "c"])
        .ok("e", &["a"])
        .build();

    let levels = dag.get_execution_order().unwrap();
    assert_eq!(levels, vec![vec!["a"], vec!["b", "e"], vec!["c"], vec!["d"]]);
}

#[test]
fn levels_partition_all_tasks() {
    let dag = DagBuilder::new("wide")
        .ok("r1", &[])
        .ok("r2", &[])
        .ok("m1", &["r1"])
        .ok("m2", &["r1", "r2"])
        .ok("leaf", &["m1", "m2"])
        .build();

    let levels = dag.get_execution_order().unwrap();
    let flat: Vec<&String> = levels.iter().flatten().collect();
    let unique: HashSet<&String> = flat.iter().copied().collect();
    assert_eq!(flat.len(), dag.len());
    assert_eq!(unique.len(), dag.len());
}

#[test]
fn empty_dag_has_no_levels() {
    let dag = Dag::new("empty");
    assert!(dag.get_execution_order().unwrap().is_empty());
}

#[test]
fn cyclic_graph_cannot_be_ordered() {
    let dag = DagBuilder::new("cycle").ok("a", &["b"]).ok("b", &["a"]).build();
    assert!(matches!(dag.get_execution_order(), Err(DagError::DagCycle(_))));
}
