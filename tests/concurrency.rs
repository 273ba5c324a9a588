mod common;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use common::{Recorder, init_test_logging, keys, test_db, test_db_with_dir};
use wordstore::{DedicatedThread, Dispatcher, SqliteStorage, TableStore, WordDatabase, main_loop};

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn concurrent_writers_are_serialized() {
    let db = test_db();
    let recorder = Recorder::new();
    let _sub = db.repository().get_all().subscribe(recorder.callback()).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let repo = db.repository();
            thread::spawn(move || {
                for n in 0..25 {
                    repo.insert_word(&format!("t{t}-{n:02}")).unwrap();
                }
                repo.flush().unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    db.repository().flush().unwrap();

    let last = recorder.last().unwrap();
    assert_eq!(last.len(), 100);
    let mut sorted = last.clone();
    sorted.sort();
    assert_eq!(last, sorted);

    // Inserts only ever grow the table, so snapshots must too.
    let lengths: Vec<usize> = recorder.snapshots().iter().map(Vec::len).collect();
    assert!(lengths.windows(2).all(|w| w[0] < w[1]), "{lengths:?}");
    db.close().unwrap();
}

#[test]
fn writes_from_one_caller_apply_in_submission_order() {
    let db = test_db();
    let repo = db.repository();
    let recorder = Recorder::new();
    let _sub = repo.get_all().subscribe(recorder.callback()).unwrap();

    repo.insert_word("first").unwrap();
    repo.delete_all().unwrap();
    repo.insert_word("second").unwrap();
    repo.flush().unwrap();

    assert_eq!(recorder.last().unwrap(), vec!["second"]);
    db.close().unwrap();
}

#[test]
fn subscribing_during_writes_never_goes_back_in_time() {
    let db = test_db();
    let repo = db.repository();

    let writer = {
        let repo = repo.clone();
        thread::spawn(move || {
            for n in 0..200 {
                repo.insert_word(&format!("w{n:03}")).unwrap();
            }
            repo.flush().unwrap();
        })
    };

    let recorders: Vec<Recorder> = (0..5).map(|_| Recorder::new()).collect();
    let subs: Vec<_> = recorders
        .iter()
        .map(|recorder| {
            thread::sleep(Duration::from_millis(2));
            repo.get_all().subscribe(recorder.callback()).unwrap()
        })
        .collect();

    writer.join().unwrap();
    repo.flush().unwrap();

    for recorder in &recorders {
        let lengths: Vec<usize> = recorder.snapshots().iter().map(Vec::len).collect();
        assert!(lengths.windows(2).all(|w| w[0] < w[1]), "{lengths:?}");
        assert_eq!(recorder.last().unwrap().len(), 200);
    }
    drop(subs);
    db.close().unwrap();
}

#[test]
fn dedicated_thread_delivery_runs_off_the_writer() {
    init_test_logging();
    let ui = Arc::new(DedicatedThread::spawn("ui-context").unwrap());
    let db = WordDatabase::builder()
        .delivery(Arc::clone(&ui) as Arc<dyn Dispatcher>)
        .open()
        .unwrap();
    let repo = db.repository();

    let threads: Arc<Mutex<BTreeSet<String>>> = Arc::default();
    let recorder = Recorder::new();
    let record = recorder.callback();
    let names = Arc::clone(&threads);
    let _sub = repo
        .get_all()
        .subscribe(move |words| {
            let name = thread::current().name().unwrap_or_default().to_string();
            names.lock().unwrap().insert(name);
            record(words);
        })
        .unwrap();

    repo.insert_word("b").unwrap();
    repo.insert_word("a").unwrap();
    assert!(recorder.wait_for_last(&["a", "b"], WAIT));

    let threads = threads.lock().unwrap().clone();
    assert_eq!(threads, BTreeSet::from(["ui-context".to_string()]));
    db.close().unwrap();
    ui.shutdown();
}

#[test]
fn main_loop_delivery_waits_for_the_driver() {
    init_test_logging();
    let (main, driver) = main_loop();
    let db = WordDatabase::builder()
        .delivery(Arc::new(main))
        .open()
        .unwrap();
    let repo = db.repository();
    let recorder = Recorder::new();
    let _sub = repo.get_all().subscribe(recorder.callback()).unwrap();
    assert_eq!(recorder.count(), 0);

    repo.insert_word("queued").unwrap();
    repo.flush().unwrap();
    assert_eq!(recorder.count(), 0);

    driver.run_pending();
    assert_eq!(recorder.snapshots(), vec![vec![], vec!["queued"]]);
    db.close().unwrap();
}

#[test]
fn subscribers_may_choose_their_own_context() {
    let db = test_db();
    let repo = db.repository();
    let (main, driver) = main_loop();

    let inline = Recorder::new();
    let deferred = Recorder::new();
    let _a = repo.get_all().subscribe(inline.callback()).unwrap();
    let _b = repo
        .get_all()
        .subscribe_on(Arc::new(main), deferred.callback())
        .unwrap();

    repo.insert_word("x").unwrap();
    repo.flush().unwrap();
    assert_eq!(inline.last().unwrap(), vec!["x"]);
    assert_eq!(deferred.count(), 0);

    driver.run_pending();
    assert_eq!(deferred.last().unwrap(), vec!["x"]);
    db.close().unwrap();
}

#[test]
fn file_database_reads_see_committed_writes() {
    let (db, dir) = test_db_with_dir();
    let repo = db.repository();
    for n in 0..10 {
        repo.insert_word(&format!("k{n}")).unwrap();
    }
    repo.flush().unwrap();

    let other = SqliteStorage::open(&dir.path().join("words.db")).unwrap();
    assert_eq!(keys(&other.select_all().unwrap()).len(), 10);
    drop(other);
    db.close().unwrap();
}
