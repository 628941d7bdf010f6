//! Pool workers reporting to a live collector over a real socket.

use std::fs;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use farm_collector::Collector;
use farm_core::compute::weighted_sum;
use farm_core::Message;
use farm_runtime::{connect_with_retry, Task, TaskPool, UnixConnector};

fn parse(out: &[u8]) -> Vec<(i64, String)> {
    String::from_utf8(out.to_vec())
        .unwrap()
        .lines()
        .map(|line| {
            let (v, name) = line.split_once(' ').unwrap();
            (v.parse().unwrap(), name.to_string())
        })
        .collect()
}

#[test]
fn pool_results_arrive_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("farm.sck");

    let collector = Collector::bind_with_output(&sock, Vec::new()).unwrap();
    let server = thread::spawn(move || collector.run().unwrap());

    let connector = Arc::new(UnixConnector::new(&sock, Duration::from_millis(10)));
    let pool = TaskPool::create(3, Some(2), connector).unwrap();

    let values = [40i64, -3, 17, 17, 0, 99, 5, -3, 12, 8];
    for (i, v) in values.iter().enumerate() {
        let v = *v;
        assert!(pool.submit(Task::new(format!("t{}", i), move |_| Ok(v))).unwrap().is_accepted());
    }
    let summary = pool.shutdown(false);
    assert_eq!(summary.executed, values.len());

    let mut control = connect_with_retry(&sock, Duration::from_millis(10), &|| false).unwrap();
    Message::Terminate.write_to(&mut control).unwrap();
    drop(control);

    let (stats, out) = server.join().unwrap();
    let got = parse(&out);
    assert_eq!(got.len(), values.len());
    assert!(got.windows(2).all(|w| w[0].0 <= w[1].0));
    let mut names: Vec<_> = got.iter().map(|(_, n)| n.clone()).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), values.len());
    assert_eq!(stats.results, values.len());
    assert!(!sock.exists());
}

#[test]
fn workers_wait_for_late_collector() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("late.sck");

    let a = dir.path().join("a.bin");
    let b = dir.path().join("b.bin");
    fs::write(&a, 7i64.to_ne_bytes()).unwrap();
    fs::write(&b, [1u8; 20]).unwrap();

    let connector = Arc::new(UnixConnector::new(&sock, Duration::from_millis(5)));
    let pool = TaskPool::create(2, None, connector).unwrap();

    thread::sleep(Duration::from_millis(30));
    let collector = Collector::bind_with_output(&sock, Vec::new()).unwrap();
    let server = thread::spawn(move || collector.run().unwrap());

    for path in [&a, &b] {
        let mut task = Task::weighted_sum(path.to_string_lossy().into_owned());
        // Direct handoff answers Busy while both workers are busy
        loop {
            match pool.submit(task).unwrap() {
                farm_runtime::SubmitStatus::Accepted => break,
                farm_runtime::SubmitStatus::Busy(t) => {
                    task = t;
                    thread::sleep(Duration::from_millis(1));
                }
                farm_runtime::SubmitStatus::Full(t) => panic!("pool closed before {}", t.input()),
            }
        }
    }
    pool.shutdown(false);

    let mut control = UnixStream::connect(&sock).unwrap();
    Message::Terminate.write_to(&mut control).unwrap();
    drop(control);

    let (_, out) = server.join().unwrap();
    let mut expected = vec![
        (weighted_sum(&a).unwrap(), a.to_string_lossy().into_owned()),
        (weighted_sum(&b).unwrap(), b.to_string_lossy().into_owned()),
    ];
    expected.sort_by_key(|(v, _)| *v);
    assert_eq!(parse(&out), expected);
}

#[test]
fn print_request_emits_snapshot_before_final() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("p.sck");
    let collector = Collector::bind_with_output(&sock, Vec::new()).unwrap();
    let server = thread::spawn(move || collector.run().unwrap());

    let mut worker = UnixStream::connect(&sock).unwrap();
    Message::Submit { result: 2, name: "two".into() }.write_to(&mut worker).unwrap();
    Message::Submit { result: 1, name: "one".into() }.write_to(&mut worker).unwrap();
    Message::Print.write_to(&mut worker).unwrap();

    let mut control = UnixStream::connect(&sock).unwrap();
    Message::Terminate.write_to(&mut control).unwrap();
    drop(control);
    drop(worker);

    let (_, out) = server.join().unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "1 one\n2 two\n1 one\n2 two\n");
}
