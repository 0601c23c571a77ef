// Property-based testing for the task dependency graph
// Arbitrary create/addDep/removeDep sequences must never produce a cycle

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tempfile::TempDir;

use team_ai::{
    CoordinationError, Coordinator, LockSettings, NewTask, SystemClock, TaskFilter, TaskId,
    TaskPatch,
};

#[derive(Debug, Clone)]
enum GraphOp {
    Create { deps: Vec<usize> },
    AddDep { task: usize, dep: usize },
    RemoveDep { task: usize, dep: usize },
}

fn op_strategy() -> impl Strategy<Value = GraphOp> {
    prop_oneof![
        prop::collection::vec(0usize..8, 0..3).prop_map(|deps| GraphOp::Create { deps }),
        (0usize..8, 0usize..8).prop_map(|(task, dep)| GraphOp::AddDep { task, dep }),
        (0usize..8, 0usize..8).prop_map(|(task, dep)| GraphOp::RemoveDep { task, dep }),
    ]
}

fn has_cycle(edges: &HashMap<TaskId, Vec<TaskId>>) -> bool {
    fn visit(
        node: TaskId,
        edges: &HashMap<TaskId, Vec<TaskId>>,
        visiting: &mut HashSet<TaskId>,
        done: &mut HashSet<TaskId>,
    ) -> bool {
        if done.contains(&node) {
            return false;
        }
        if !visiting.insert(node) {
            return true;
        }
        for next in edges.get(&node).into_iter().flatten() {
            if visit(*next, edges, visiting, done) {
                return true;
            }
        }
        visiting.remove(&node);
        done.insert(node);
        false
    }

    let mut visiting = HashSet::new();
    let mut done = HashSet::new();
    edges
        .keys()
        .any(|node| visit(*node, edges, &mut visiting, &mut done))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn graph_stays_acyclic(ops in prop::collection::vec(op_strategy(), 1..25)) {
        let dir = TempDir::new().unwrap();
        let coordinator = Coordinator::with_clock(
            dir.path(),
            LockSettings::default(),
            Duration::from_secs(900),
            std::sync::Arc::new(SystemClock),
        )
        .unwrap();
        let tasks = coordinator.tasks();
        let mut ids: Vec<TaskId> = vec![tasks.create(NewTask::new("root")).unwrap()];

        for op in ops {
            match op {
                GraphOp::Create { deps } => {
                    let deps: Vec<TaskId> = deps.iter().map(|i| ids[i % ids.len()]).collect();
                    ids.push(tasks.create(NewTask::new("t").depends_on(deps)).unwrap());
                }
                GraphOp::AddDep { task, dep } => {
                    let (task, dep) = (ids[task % ids.len()], ids[dep % ids.len()]);
                    let result = tasks.update(task, TaskPatch { add_dep: Some(dep), ..Default::default() });
                    match result {
                        Ok(updated) => prop_assert!(updated.depends_on.contains(&dep)),
                        Err(CoordinationError::CyclicDependency { .. }) => {}
                        Err(other) => prop_assert!(false, "unexpected error: {}", other),
                    }
                }
                GraphOp::RemoveDep { task, dep } => {
                    let (task, dep) = (ids[task % ids.len()], ids[dep % ids.len()]);
                    let updated = tasks
                        .update(task, TaskPatch { remove_dep: Some(dep), ..Default::default() })
                        .unwrap();
                    prop_assert!(!updated.depends_on.contains(&dep));
                }
            }

            let edges: HashMap<TaskId, Vec<TaskId>> = tasks
                .list(&TaskFilter::default())
                .unwrap()
                .into_iter()
                .map(|t| (t.id, t.depends_on.into_iter().collect()))
                .collect();
            prop_assert!(!has_cycle(&edges));
        }
    }
}
