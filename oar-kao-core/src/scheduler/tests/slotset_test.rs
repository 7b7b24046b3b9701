use crate::model::interval::{ProcSet, ProcSetOp};
use crate::model::job::{JobAssignment, JobBuilder, Moldable};
use crate::scheduler::hierarchy::HierarchyRequests;
use crate::scheduler::slot::Slot;
use crate::scheduler::slotset::{SlotSet, MAX_TIME};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

fn procset(low: u32, high: u32) -> ProcSet {
    ProcSet::from_iter([low..=high])
}

/// (begin, end, resources) of every slot, in time order.
fn slots_summary(ss: &SlotSet) -> Vec<(i64, i64, ProcSet)> {
    ss.iter().map(|s| (s.begin, s.end, s.proc_set.clone())).collect()
}

#[test]
fn test_new_slot_set() {
    let ss = SlotSet::new(procset(0, 3), 10);
    assert_eq!(ss.slot_count(), 1);
    assert_eq!(ss.begin(), 10);
    assert_eq!(ss.end(), MAX_TIME);
    assert_eq!(slots_summary(&ss), vec![(10, MAX_TIME, procset(0, 3))]);
}

#[test]
fn test_split_at() {
    let mut ss = SlotSet::new(procset(0, 3), 0);
    let first_id = ss.first_slot().unwrap().id;

    // Splitting at the beginning of a slot is a no-op.
    assert_eq!(ss.split_at(first_id, 0), first_id);
    assert_eq!(ss.slot_count(), 1);

    let new_id = ss.split_at(first_id, 10);
    assert_ne!(new_id, first_id);
    assert_eq!(ss.slot_count(), 2);
    // The original slot keeps its id and its beginning.
    let first = ss.get_slot(first_id).unwrap();
    assert_eq!((first.begin, first.end, first.next), (0, 9, Some(new_id)));
    let second = ss.get_slot(new_id).unwrap();
    assert_eq!((second.begin, second.end, second.prev), (10, MAX_TIME, Some(first_id)));
    assert_eq!(ss.last_slot().unwrap().id, new_id);
    ss.assert_consistency();

    assert_eq!(ss.find_and_split_at(5), Some(ss.slot_id_at(5, None).unwrap()));
    assert_eq!(ss.slot_count(), 3);
    assert_eq!(ss.find_and_split_at(-1), None);
    ss.assert_consistency();
}

#[test]
fn test_slot_at() {
    let mut ss = SlotSet::new(procset(0, 3), 0);
    ss.subtract(&procset(0, 1), 10, 19);
    assert_eq!(ss.slot_at(0, None).unwrap().end, 9);
    assert_eq!(ss.slot_at(9, None).unwrap().end, 9);
    assert_eq!(ss.slot_at(10, None).unwrap().begin, 10);
    assert_eq!(ss.slot_at(25, None).unwrap().begin, 20);
    assert!(ss.slot_at(-5, None).is_none());

    // Searching from a later slot can't find earlier times.
    let later = ss.slot_id_at(25, None);
    assert!(ss.slot_at(5, later).is_none());
}

#[test]
fn test_split_slots_for_range() {
    let mut ss = SlotSet::from_slot(Slot::new(1, None, None, 0, 99, procset(0, 7)));
    let (first, last) = ss.split_slots_for_range(10, 19, None).unwrap();
    assert_eq!(first, last);
    assert_eq!(ss.get_slot(first).map(|s| (s.begin, s.end)), Some((10, 19)));
    assert_eq!(ss.slot_count(), 3);

    // Ranges are clipped to the slot set.
    let (first, last) = ss.split_slots_for_range(-50, 4, None).unwrap();
    assert_eq!(ss.get_slot(first).map(|s| s.begin), Some(0));
    assert_eq!(ss.get_slot(last).map(|s| s.end), Some(4));
    let (_first, last) = ss.split_slots_for_range(50, 500, None).unwrap();
    assert_eq!(ss.get_slot(last).map(|s| s.end), Some(99));

    assert_eq!(ss.split_slots_for_range(100, 200, None), None);
    ss.assert_consistency();
}

#[test]
fn test_subtract_and_add() {
    let mut ss = SlotSet::new(procset(0, 7), 0);
    ss.subtract(&procset(0, 3), 10, 19);
    ss.subtract(&procset(2, 5), 15, 29);
    assert_eq!(
        slots_summary(&ss),
        vec![
            (0, 9, procset(0, 7)),
            (10, 14, procset(4, 7)),
            (15, 19, procset(6, 7)),
            (20, 29, procset(0, 1) | procset(6, 7)),
            (30, MAX_TIME, procset(0, 7)),
        ]
    );

    ss.add(&procset(2, 5), 15, 29);
    assert_eq!(ss.slot_at(15, None).unwrap().proc_set, procset(2, 7));
    assert_eq!(ss.slot_at(20, None).unwrap().proc_set, procset(0, 7));
    // Slots are not merged back.
    assert_eq!(ss.slot_count(), 5);

    // Empty ranges are ignored.
    ss.subtract(&procset(0, 7), 50, 49);
    assert_eq!(ss.slot_count(), 5);
    ss.assert_consistency();
}

#[test]
fn test_commit_two_ids() {
    // 4 ids, a job of 2 ids for 10 seconds.
    let mut ss = SlotSet::new(procset(0, 3), 0);
    let (start, resources) = ss.find_first_window(0, 10, |free| free.first_n(2)).unwrap();
    assert_eq!(start, 0);
    assert_eq!(resources, procset(0, 1));

    ss.commit(start, 10, &resources);
    assert_eq!(slots_summary(&ss), vec![(0, 9, procset(2, 3)), (10, MAX_TIME, procset(0, 3))]);
}

#[test]
fn test_find_first_window() {
    let mut ss = SlotSet::new(procset(0, 3), 0);
    ss.commit(0, 10, &procset(0, 3));
    ss.commit(20, 5, &procset(0, 1));

    // Not enough room before 10, nor between 10 and 20 for a 15 seconds job.
    assert_eq!(ss.find_first_window(0, 15, |free| free.first_n(4)), Some((25, procset(0, 3))));
    assert_eq!(ss.find_first_window(0, 15, |free| free.first_n(2)), Some((10, procset(2, 3))));
    assert_eq!(ss.find_first_window(0, 5, |free| free.first_n(4)), Some((10, procset(0, 3))));
    // start_after is honored inside a slot.
    assert_eq!(ss.find_first_window(12, 3, |free| free.first_n(4)), Some((12, procset(0, 3))));
    assert_eq!(ss.find_first_window(0, 0, |free| free.first_n(1)), None);
}

#[test]
fn test_find_first_window_insufficient_resources() {
    let ss = SlotSet::new(procset(0, 1), 0);
    assert_eq!(ss.find_first_window(0, 10, |free| free.first_n(3)), None);
}

#[test]
fn test_find_window_beyond_end() {
    let ss = SlotSet::from_slot(Slot::new(1, None, None, 0, 99, procset(0, 3)));
    assert!(ss.find_first_window(0, 100, |free| free.first_n(1)).is_some());
    assert_eq!(ss.find_first_window(0, 101, |free| free.first_n(1)), None);
    assert_eq!(ss.find_first_window(50, 51, |free| free.first_n(1)), None);
}

#[test]
fn test_window_ids() {
    let mut ss = SlotSet::new(procset(0, 3), 0);
    ss.commit(0, 10, &procset(0, 1));
    ss.commit(10, 10, &procset(2, 3));
    let window = ss
        .find_window(0, 30, None, |slot| slot.proc_set.clone(), |free| free.first_n(3))
        .unwrap();
    assert_eq!((window.begin, window.end), (20, 49));
    assert_eq!(window.begin_slot_id, ss.slot_id_at(20, None).unwrap());
    assert_eq!(window.end_slot_id, window.begin_slot_id);

    let window = ss
        .find_window(0, 15, None, |slot| slot.proc_set.clone(), |free| free.first_n(3))
        .unwrap();
    assert_eq!((window.begin, window.end), (20, 34));
}

#[test]
fn test_iterator() {
    let mut ss = SlotSet::new(procset(0, 3), 0);
    ss.subtract(&procset(0, 0), 10, 19);
    ss.subtract(&procset(1, 1), 30, 39);
    let begins = ss.iter().map(|s| s.begin).collect::<Vec<_>>();
    assert_eq!(begins, vec![0, 10, 20, 30, 40]);
    let reversed = ss.iter().rev().map(|s| s.begin).collect::<Vec<_>>();
    assert_eq!(reversed, vec![40, 30, 20, 10, 0]);

    let second = ss.slot_id_at(10, None).unwrap();
    let fourth = ss.slot_id_at(30, None).unwrap();
    let between = ss.iter().between(second, fourth).map(|s| s.begin).collect::<Vec<_>>();
    assert_eq!(between, vec![10, 20, 30]);
    let mut iter = ss.iter().start_at(fourth);
    assert_eq!(iter.peek().map(|s| s.begin), Some(30));
    iter.next();
    iter.next();
    assert!(iter.next().is_none());
    assert!(iter.peek().is_none());
}

#[test]
fn test_from_map() {
    let slots = HashMap::from([
        (1, Slot::new(1, None, Some(3), 0, 9, procset(0, 3))),
        (3, Slot::new(3, Some(1), Some(2), 10, 19, procset(0, 1))),
        (2, Slot::new(2, Some(3), None, 20, 29, procset(0, 3))),
    ]);
    let mut ss = SlotSet::from_map(slots, 1);
    assert_eq!(ss.begin(), 0);
    assert_eq!(ss.end(), 29);
    assert_eq!(ss.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 3, 2]);
    // New ids do not collide with existing ones.
    let new_id = ss.split_at(2, 25);
    assert_eq!(new_id, 4);
}

#[test]
#[should_panic]
fn test_from_map_with_gap() {
    let slots = HashMap::from([
        (1, Slot::new(1, None, Some(2), 0, 9, procset(0, 3))),
        (2, Slot::new(2, Some(1), None, 11, 29, procset(0, 3))),
    ]);
    SlotSet::from_map(slots, 1);
}

#[test]
fn test_job_update_keeps_entries() {
    let mut ss = SlotSet::new(procset(0, 7), 0);
    let job = JobBuilder::new(1)
        .user("alice".into())
        .name("sim".into())
        .add_type("timesharing".into(), "user,name".into())
        .assign(JobAssignment::new(10, 19, procset(0, 3), 0))
        .build();
    ss.split_slots_for_job_and_update_resources(&job, true, None);

    let slot = ss.slot_at(15, None).unwrap();
    assert_eq!(slot.proc_set, procset(4, 7));
    assert_eq!(slot.get_time_sharing_proc_set("alice", "sim"), procset(0, 3));
    assert_eq!(slot.get_time_sharing_proc_set("alice", "other"), ProcSet::new());
    assert_eq!(slot.available_for(Some(("alice", "sim")), &job.placeholder), procset(0, 7));
    assert_eq!(ss.slot_at(20, None).unwrap().get_time_sharing_proc_set("alice", "sim"), ProcSet::new());

    // Splitting duplicates the entries.
    ss.find_and_split_at(12);
    assert_eq!(ss.slot_at(12, None).unwrap().get_time_sharing_proc_set("alice", "sim"), procset(0, 3));

    ss.split_slots_for_job_and_update_resources(&job, false, None);
    assert_eq!(ss.slot_at(15, None).unwrap().proc_set, procset(0, 7));
}

#[test]
fn test_cache_cleared_when_resources_are_added() {
    let mut ss = SlotSet::new(procset(0, 7), 0);
    let moldable = Moldable::new(1, 10, HierarchyRequests::new_single(procset(0, 7), vec![("core".into(), 2)]));
    ss.insert_cache_entry(moldable.cache_key.clone(), 1);
    ss.subtract(&procset(0, 1), 0, 9);
    assert_eq!(ss.get_cache_first_slot(&moldable), Some(1));
    ss.add(&procset(0, 1), 0, 9);
    assert_eq!(ss.get_cache_first_slot(&moldable), None);
    assert_eq!(ss.cache_len(), 0);
}

#[test]
fn test_random_updates_keep_chain_consistent() {
    let mut rng = StdRng::seed_from_u64(42);
    let all = procset(0, 63);
    let mut ss = SlotSet::new(all.clone(), 0);
    for _ in 0..200 {
        let begin = rng.random_range(0..1000);
        let duration = rng.random_range(1..200);
        let low = rng.random_range(0..64);
        let high = rng.random_range(low..64);
        let resources = procset(low, high);
        if rng.random_bool(0.7) {
            ss.commit(begin, duration, &resources);
        } else {
            ss.add(&resources, begin, begin + duration - 1);
        }
        ss.assert_consistency();
    }
    assert_eq!(ss.begin(), 0);
    assert_eq!(ss.end(), MAX_TIME);
    assert!(ss.iter().all(|s| s.proc_set.is_subset(&all)));
}

#[test]
fn test_random_windows_are_free() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut ss = SlotSet::new(procset(0, 31), 0);
    for _ in 0..100 {
        let count = rng.random_range(1..=32);
        let duration = rng.random_range(1..100);
        let start_after = rng.random_range(0..500);
        let Some((start, resources)) = ss.find_first_window(start_after, duration, |free| free.first_n(count)) else {
            panic!("A window always exists after the last allocation");
        };
        assert!(start >= start_after);
        assert_eq!(resources.cardinality(), count as u64);
        let end = start + duration - 1;
        for slot in ss.iter().filter(|s| s.end >= start && s.begin <= end) {
            assert!(resources.is_subset(&slot.proc_set), "Window resources must be free in slot {:?}", slot);
        }
        // No earlier start fits.
        if start > start_after {
            let earlier = ss
                .iter()
                .filter(|s| s.end >= start - 1 && s.begin <= end - 1)
                .fold(procset(0, 31), |acc, s| acc & &s.proc_set);
            assert!(earlier.cardinality() < count as u64);
        }
        ss.commit(start, duration, &resources);
        ss.assert_consistency();
    }
}
