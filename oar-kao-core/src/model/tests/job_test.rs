use crate::model::interval::ProcSet;
use crate::model::job::{Allocation, DependencyState, FindPolicy, JobAssignment, JobBuilder, Moldable};
use crate::model::resource::ResourceIdMap;
use crate::scheduler::hierarchy::HierarchyRequests;

fn moldable(id: i64, walltime: i64) -> Moldable {
    Moldable::new(id, walltime, HierarchyRequests::new_single(ProcSet::from_iter([0..=7]), vec![("resource_id".into(), 2)]))
}

#[test]
fn test_assignment_from_walltime() {
    let assignment = JobAssignment::from_walltime(100, 60, 30, ProcSet::from_iter([0..=1]), 0);
    assert_eq!((assignment.begin, assignment.end), (100, 189));
}

#[test]
fn test_moldable_cache_key() {
    assert_eq!(moldable(1, 60).cache_key, moldable(2, 60).cache_key);
    assert_ne!(moldable(1, 60).cache_key, moldable(1, 61).cache_key);
}

#[test]
fn test_slot_set_names() {
    let regular = JobBuilder::new(1).build();
    assert_eq!(regular.slot_set_name().as_ref(), "default");
    assert_eq!(regular.container_slot_set_name(), None);
    assert!(!regular.is_container());

    let container = JobBuilder::new(2).add_type_key("container".into()).build();
    assert!(container.is_container());
    assert_eq!(container.container_slot_set_name().as_deref(), Some("2"));
    let named = JobBuilder::new(3).add_type("container".into(), "big".into()).build();
    assert_eq!(named.container_slot_set_name().as_deref(), Some("big"));

    let inner = JobBuilder::new(4).add_type("inner".into(), "big".into()).build();
    assert_eq!(inner.slot_set_name().as_ref(), "big");
    let orphan = JobBuilder::new(5).add_type_key("inner".into()).build();
    assert_eq!(orphan.slot_set_name().as_ref(), "default");
}

#[test]
fn test_cache_flags() {
    let plain = JobBuilder::new(1).moldable(moldable(1, 60)).build();
    assert!(plain.can_use_cache() && plain.can_set_cache());

    let delayed = JobBuilder::new(2).moldable(moldable(2, 60)).earliest_start_time(50).build();
    assert!(delayed.can_use_cache());
    assert!(!delayed.can_set_cache());

    let dependent = JobBuilder::new(3).moldable(moldable(3, 60)).add_valid_dependency(1).build();
    assert!(!dependent.can_set_cache());
}

#[test]
fn test_allocation() {
    let waiting = JobBuilder::new(1).moldable(moldable(10, 60)).moldable(moldable(11, 30)).build();
    assert_eq!(Allocation::from_job(&waiting), None);
    assert!(!waiting.is_scheduled());

    let scheduled = JobBuilder::new(1)
        .moldable(moldable(10, 60))
        .moldable(moldable(11, 30))
        .assign(JobAssignment::new(0, 29, ProcSet::from_iter([1..=2]), 1))
        .build();
    let allocation = Allocation::from_job(&scheduled).unwrap();
    assert_eq!(allocation.moldable_id, 11);
    assert_eq!(scheduled.resource_count(), Some(2));

    let id_map = ResourceIdMap::new(vec![40, 30, 20]).unwrap();
    assert_eq!(allocation.external_resources(&id_map), vec![30, 20]);
}

#[test]
fn test_dependency_states() {
    let job = JobBuilder::new(1)
        .add_valid_dependency(2)
        .add_dependency(3, "Terminated".into(), Some(1))
        .add_dependency(4, "Error".into(), None)
        .add_dependency(5, "toLaunch".into(), None)
        .build();
    let states = job.dependencies.iter().map(|d| (d.job_id, d.state.clone())).collect::<Vec<_>>();
    assert_eq!(
        states,
        vec![
            (2, DependencyState::Waiting),
            (3, DependencyState::Terminated { exit_code: Some(1) }),
            (4, DependencyState::Error),
            (5, DependencyState::Other("toLaunch".into())),
        ]
    );
    assert!(!job.can_set_cache());
}

#[test]
fn test_find_types() {
    let find = |value: &str| JobBuilder::new(1).add_type("find".into(), value.into()).build().find;
    assert_eq!(JobBuilder::new(1).build().find, FindPolicy::Scattered);
    assert_eq!(find("contiguous_1h"), FindPolicy::Contiguous);
    assert_eq!(find("contiguous_sorted_1h"), FindPolicy::ContiguousBestFit);
    assert_eq!(find("local:128"), FindPolicy::Local);
    assert_eq!(find("coorm:tcp:host:4242"), FindPolicy::Scattered);
    assert_eq!(JobBuilder::new(1).add_type_key("find".into()).build().find, FindPolicy::Scattered);

    // Custom matchers don't share the cache with the scattered one.
    let contiguous = JobBuilder::new(2).moldable(moldable(2, 60)).find(FindPolicy::Contiguous).build();
    assert!(!contiguous.can_use_cache());
    assert!(!contiguous.can_set_cache());
}
