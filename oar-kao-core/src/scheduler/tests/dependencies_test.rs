use crate::error::DiagnosticKind;
use crate::model::interval::ProcSet;
use crate::model::job::{JobBuilder, Moldable};
use crate::platform::PlatformConfig;
use crate::scheduler::hierarchy::{HierarchyRequest, HierarchyRequests};
use crate::scheduler::scheduling;
use crate::scheduler::slotset::SlotSet;
use crate::scheduler::tests::platform_mock::{generate_mock_platform_config, init_test_logger};
use indexmap::indexmap;
use std::collections::HashMap;
use std::rc::Rc;

fn dependencies_platform_config() -> Rc<PlatformConfig> {
    let platform_config = generate_mock_platform_config(false, 256, 8, 4, 8);
    Rc::new(platform_config)
}

#[test]
fn test_find_slots_for_moldable_with_dependencies() {
    let platform_config = dependencies_platform_config();
    let available = platform_config.resource_set.default_resources.clone();
    let ss = SlotSet::from_platform_config(&platform_config, 0, 1000);
    let mut all_ss = HashMap::from([("default".into(), ss)]);

    // Job 1: no dependency
    let moldable1 = Moldable::new(1, 100, HierarchyRequests::from_requests(vec![HierarchyRequest::new(available.clone(), vec![("nodes".into(), 1)])]));
    let job1 = JobBuilder::new(1)
        .user("user1".into())
        .queue("default".into())
        .moldable(moldable1)
        .build();

    // Job 2: depends on job 1
    let moldable2 = Moldable::new(2, 100, HierarchyRequests::from_requests(vec![HierarchyRequest::new(available.clone(), vec![("nodes".into(), 1)])]));
    let job2 = JobBuilder::new(2)
        .user("user2".into())
        .queue("default".into())
        .moldable(moldable2)
        .add_valid_dependency(1)
        .build();

    let mut jobs = indexmap![1 => job1, 2 => job2];
    scheduling::schedule_jobs(&platform_config, &mut all_ss, &mut jobs);
    let j1 = &jobs[0];
    let j2 = &jobs[1];
    assert!(j1.assignment.is_some(), "Job 1 is not scheduled");
    assert!(j2.assignment.is_some(), "Job 2 is not scheduled");
    let sched1 = j1.assignment.as_ref().unwrap();
    let sched2 = j2.assignment.as_ref().unwrap();
    assert!(sched2.begin >= sched1.end + 1, "Job 2 does not starts after the end of Job 1");
}

#[test]
fn test_find_slots_for_moldable_with_container_and_inner_jobs() {
    init_test_logger();

    let platform_config = dependencies_platform_config();
    let available = platform_config.resource_set.default_resources.clone();
    let ss = SlotSet::from_platform_config(&platform_config, 0, 1000);
    let mut all_ss = HashMap::from([("default".into(), ss)]);

    // Container job
    let moldable_container = Moldable::new(10, 200, HierarchyRequests::from_requests(vec![HierarchyRequest::new(available.clone(), vec![("nodes".into(), 2)])]));
    let job_container = JobBuilder::new(10)
        .user("container_user".into())
        .queue("default".into())
        .add_type_key("container".into())
        .moldable(moldable_container)
        .build();

    // Inner job
    let moldable_inner = Moldable::new(11, 100, HierarchyRequests::from_requests(vec![HierarchyRequest::new(available.clone(), vec![("nodes".into(), 1)])]));
    let job_inner = JobBuilder::new(11)
        .user("inner_user".into())
        .queue("default".into())
        .add_type("inner".into(), "10".into())
        .moldable(moldable_inner)
        .build();

    // Normal job depending on the inner job.
    let moldable_normal = Moldable::new(12, 50, HierarchyRequests::from_requests(vec![HierarchyRequest::new(available.clone(), vec![("nodes".into(), 1)])]));
    let job_normal = JobBuilder::new(12)
        .user("normal_user".into())
        .queue("default".into())
        .moldable(moldable_normal)
        .add_valid_dependency(11)
        .build();

    let mut jobs = indexmap![10 => job_container, 11 => job_inner, 12 => job_normal];
    scheduling::schedule_jobs(&platform_config, &mut all_ss, &mut jobs);
    let j_container = &jobs[0];
    let j_inner = &jobs[1];
    let j_normal = &jobs[2];

    assert!(j_container.assignment.is_some(), "Container job is not scheduled");
    assert!(j_inner.assignment.is_some(), "Inner job is not scheduled");
    assert!(j_normal.assignment.is_some(), "Normal job is not scheduled");
    let sched_container = j_container.assignment.as_ref().unwrap();
    let sched_inner = j_inner.assignment.as_ref().unwrap();
    let sched_normal = j_normal.assignment.as_ref().unwrap();
    assert!(sched_inner.end <= sched_container.end);

    assert_eq!(sched_normal.begin, 100, "Normal job should start right after the inner job, at begin = 100");
}

fn node_job(id: i64, walltime: i64, available: &ProcSet) -> JobBuilder {
    JobBuilder::new(id).moldable(Moldable::new(id, walltime, HierarchyRequests::new_single(available.clone(), vec![("nodes".into(), 1)])))
}

#[test]
fn test_terminated_and_error_dependencies() {
    let platform_config = dependencies_platform_config();
    let available = platform_config.resource_set.default_resources.clone();
    let mut all_ss = HashMap::from([("default".into(), SlotSet::from_platform_config(&platform_config, 0, 1000))]);

    let job1 = node_job(1, 100, &available).add_dependency(100, "Terminated".into(), Some(0)).build();
    let job2 = node_job(2, 100, &available).add_dependency(101, "Terminated".into(), None).build();
    let job3 = node_job(3, 100, &available).add_dependency(102, "Error".into(), Some(1)).build();
    let job4 = node_job(4, 100, &available).add_dependency(103, "Terminated".into(), Some(2)).build();
    let job5 = node_job(5, 100, &available).add_dependency(104, "Running".into(), None).build();

    let mut jobs = indexmap![1 => job1, 2 => job2, 3 => job3, 4 => job4, 5 => job5];
    let diagnostics = scheduling::schedule_jobs(&platform_config, &mut all_ss, &mut jobs);

    for id in [1i64, 2, 3] {
        assert_eq!(jobs[&id].begin(), Some(0), "Job {} should start immediately", id);
    }
    assert!(jobs[&4].assignment.is_none());
    assert!(jobs[&5].assignment.is_none());
    let skipped = diagnostics.iter().map(|d| (d.job_id, d.kind.clone())).collect::<Vec<_>>();
    assert_eq!(
        skipped,
        vec![(4, DiagnosticKind::UnsatisfiedDependencies), (5, DiagnosticKind::UnsatisfiedDependencies)]
    );
}

#[test]
fn test_dependency_on_unscheduled_job() {
    let platform_config = dependencies_platform_config();
    let available = platform_config.resource_set.default_resources.clone();
    let mut all_ss = HashMap::from([("default".into(), SlotSet::from_platform_config(&platform_config, 0, 1000))]);

    // Job 1 needs 9 nodes and is never scheduled.
    let job1 = JobBuilder::new(1)
        .moldable(Moldable::new(1, 100, HierarchyRequests::new_single(available.clone(), vec![("nodes".into(), 9)])))
        .build();
    let job2 = node_job(2, 100, &available).add_valid_dependency(1).build();
    // Dependencies are only resolved on jobs placed before.
    let job3 = node_job(3, 100, &available).add_valid_dependency(4).build();
    let job4 = node_job(4, 100, &available).build();

    let mut jobs = indexmap![1 => job1, 2 => job2, 3 => job3, 4 => job4];
    let diagnostics = scheduling::schedule_jobs(&platform_config, &mut all_ss, &mut jobs);
    assert!(jobs[&1].assignment.is_none());
    assert!(jobs[&2].assignment.is_none());
    assert!(jobs[&3].assignment.is_none());
    assert_eq!(jobs[&4].begin(), Some(0));
    assert_eq!(diagnostics.iter().map(|d| d.job_id).collect::<Vec<_>>(), vec![2, 3]);
}

#[test]
fn test_dependency_and_earliest_start_time() {
    let platform_config = dependencies_platform_config();
    let available = platform_config.resource_set.default_resources.clone();
    let mut all_ss = HashMap::from([("default".into(), SlotSet::from_platform_config(&platform_config, 0, 1000))]);

    let job1 = node_job(1, 100, &available).build();
    let job2 = node_job(2, 50, &available).add_valid_dependency(1).earliest_start_time(150).build();
    let job3 = node_job(3, 50, &available).add_valid_dependency(1).earliest_start_time(20).build();

    let mut jobs = indexmap![1 => job1, 2 => job2, 3 => job3];
    scheduling::schedule_jobs(&platform_config, &mut all_ss, &mut jobs);
    assert_eq!(jobs[&1].begin(), Some(0));
    assert_eq!(jobs[&2].begin(), Some(150));
    assert_eq!(jobs[&3].begin(), Some(100));
}
