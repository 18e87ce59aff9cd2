//! Multi-threaded storms over the shared-heap engine.

mod support;

use pilardb::prelude::*;
use std::{sync::Arc, thread};
use support::*;

const WRITERS: usize = 8;
const PER_WRITER: usize = 10_000;

#[test]
fn concurrent_save_and_count() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();

    let mut handles = Vec::new();
    for w in 0..WRITERS {
        let repo = people.clone();
        handles.push(thread::spawn(move || {
            for i in 0..PER_WRITER {
                let name = format!("w{w}-{i}");
                repo.save(Person::new(&name, (i % 90) as i32)).unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let total = (WRITERS * PER_WRITER) as u64;
    assert_eq!(people.count(), total);
    assert_eq!(people.find_all().unwrap().len() as u64, total);

    // No duplicate ids.
    let mut ids: Vec<i64> = people
        .find_all()
        .unwrap()
        .iter()
        .map(|p| p.id.unwrap())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len() as u64, total);

    // Every inserted name is retrievable through the hash index.
    for w in 0..WRITERS {
        for i in (0..PER_WRITER).step_by(997) {
            let name = format!("w{w}-{i}");
            let hits = run(&people, "findByName", &[Value::from(name.as_str())])
                .many()
                .unwrap();
            assert_eq!(hits.len(), 1, "missing {name}");
        }
    }
}

#[test]
fn concurrent_readers_see_only_published_rows() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let mut handles = Vec::new();
    for w in 0..4 {
        let repo = people.clone();
        handles.push(thread::spawn(move || {
            for i in 0..2000 {
                repo.save(Person::new(&format!("r{w}-{i}"), i)).unwrap();
            }
        }));
    }

    // Readers race the writers; every materialized row must be complete
    // (a published row always carries its name).
    let mut readers = Vec::new();
    for _ in 0..3 {
        let repo = people.clone();
        let stop = Arc::clone(&stop);
        readers.push(thread::spawn(move || {
            let mut max_seen = 0usize;
            while !stop.load(std::sync::atomic::Ordering::Acquire) {
                let all = repo.find_all().unwrap();
                assert!(all.len() >= max_seen, "live set shrank under inserts");
                max_seen = all.len();
                for p in &all {
                    assert!(p.id.is_some());
                    assert!(p.name.is_some(), "torn row surfaced to a reader");
                }
            }
            max_seen
        }));
    }

    for h in handles {
        h.join().unwrap();
    }
    stop.store(true, std::sync::atomic::Ordering::Release);
    for r in readers {
        let seen = r.join().unwrap();
        assert!(seen <= 8000);
    }
    assert_eq!(people.count(), 8000);
}

#[test]
fn concurrent_delete_is_counted_once() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();
    let saved = people
        .save_all((0..1000).map(|i| Person::new(&format!("p{i}"), i)))
        .unwrap();
    let ids: Vec<i64> = saved.iter().map(|p| p.id.unwrap()).collect();
    let ids = Arc::new(ids);

    // Every thread tries to delete every row; each row dies exactly once.
    let mut handles = Vec::new();
    for _ in 0..4 {
        let repo = people.clone();
        let ids = Arc::clone(&ids);
        handles.push(thread::spawn(move || {
            let mut won = 0u64;
            for &id in ids.iter() {
                if repo.delete_by_id(id).unwrap() {
                    won += 1;
                }
            }
            won
        }));
    }

    let total_wins: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total_wins, 1000);
    assert_eq!(people.count(), 0);
}

#[test]
fn null_scan_under_concurrent_inserts_matches_nothing() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();
    let query = people.query_id("findByNameIsNull").unwrap();
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

    // Every writer stores a non-null name, so a null match can only come
    // from a slot caught mid-insert below the shared watermark.
    let mut writers = Vec::new();
    for w in 0..4 {
        let repo = people.clone();
        writers.push(thread::spawn(move || {
            for i in 0..3000 {
                repo.save(Person::new(&format!("n{w}-{i}"), i)).unwrap();
            }
        }));
    }

    let mut readers = Vec::new();
    for _ in 0..2 {
        let repo = people.clone();
        let stop = Arc::clone(&stop);
        readers.push(thread::spawn(move || {
            while !stop.load(std::sync::atomic::Ordering::Acquire) {
                let ghosts = repo.invoke(query, &[]).unwrap().many().unwrap();
                assert!(
                    ghosts.is_empty(),
                    "IsNull matched a row that was still mid-insert"
                );
            }
        }));
    }

    for h in writers {
        h.join().unwrap();
    }
    stop.store(true, std::sync::atomic::Ordering::Release);
    for h in readers {
        h.join().unwrap();
    }

    assert_eq!(people.count(), 12_000);
    assert!(run(&people, "findByNameIsNull", &[]).many().unwrap().is_empty());
}

#[test]
fn delete_reinsert_storm_leaves_no_ghosts() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();

    // Hammer the free list: every row dies right after it is born, so
    // slots recycle constantly across threads.
    let mut handles = Vec::new();
    for w in 0..4 {
        let repo = people.clone();
        handles.push(thread::spawn(move || {
            for i in 0..1500 {
                let p = repo.save(Person::new(&format!("g{w}-{i}"), i)).unwrap();
                assert!(repo.delete_by_id(p.id.unwrap()).unwrap());
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(people.count(), 0);
    assert!(people.find_all().unwrap().is_empty());
    assert!(
        run(&people, "findByAgeGreaterThan", &[Value::Int(-1)])
            .many()
            .unwrap()
            .is_empty()
    );
}

#[test]
fn interleaved_save_delete_keeps_indexes_consistent() {
    let arena = person_arena();
    let people = arena.repository::<Person>().unwrap();

    let mut handles = Vec::new();
    for w in 0..4 {
        let repo = people.clone();
        handles.push(thread::spawn(move || {
            for i in 0..1000 {
                let p = repo.save(Person::new(&format!("x{w}-{i}"), i)).unwrap();
                if i % 3 == 0 {
                    repo.delete_by_id(p.id.unwrap()).unwrap();
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let expected: usize = 4 * (1000 - 334);
    assert_eq!(people.count(), expected as u64);

    // Index-driven lookups agree with the live set.
    let survivors = run(&people, "findByAgeGreaterThan", &[Value::Int(-1)])
        .many()
        .unwrap();
    assert_eq!(survivors.len(), expected);
}
