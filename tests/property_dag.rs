use std::collections::HashMap;

use proptest::prelude::*;
use taskdag::dag::Dag;
use taskdag_test_utils::builders::DagBuilder;

fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Dag> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..4),
            num_tasks,
        )
        .prop_map(|raw_deps| {
            let mut builder = DagBuilder::new("prop");
            for (i, potential) in raw_deps.into_iter().enumerate() {
                let deps: Vec<String> = if i == 0 {
                    Vec::new()
                } else {
                    potential.iter().map(|idx| format!("n{}", idx % i)).collect()
                };
                let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
                builder = builder.ok(&format!("n{i}"), &deps);
            }
            builder.build()
        })
    })
}

proptest! {
    #[test]
    fn levels_are_minimal_and_respect_dependencies(dag in dag_strategy(15)) {
        let levels = dag.get_execution_order().unwrap();
        let level_of: HashMap<&str, usize> = levels
            .iter()
            .enumerate()
            .flat_map(|(lvl, ids)| ids.iter().map(move |id| (id.as_str(), lvl)))
            .collect();

        prop_assert_eq!(level_of.len(), dag.len());
        for task in dag.tasks() {
            let expected = task
                .dependencies()
                .iter()
                .map(|d| level_of[d.as_str()] + 1)
                .max()
                .unwrap_or(0);
            prop_assert_eq!(level_of[task.id()], expected);
        }
    }

    #[test]
    fn generated_dags_validate(mut dag in dag_strategy(15)) {
        prop_assert!(dag.validate().unwrap());
        prop_assert_eq!(dag.node_count(), dag.len());

        let stats = dag.get_stats();
        prop_assert_eq!(stats.pending_tasks, dag.len());
        prop_assert!(stats.root_tasks >= 1);
        prop_assert!(stats.leaf_tasks >= 1);
    }

    #[test]
    fn dependents_mirror_dependencies(dag in dag_strategy(10)) {
        for task in dag.tasks() {
            for ancestor in dag.get_task_dependencies(task.id()).unwrap() {
                let below = dag.get_task_dependents(&ancestor).unwrap();
                prop_assert!(below.contains(task.id()));
            }
        }
    }
}
