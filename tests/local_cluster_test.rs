use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stormlite_rs::engine::config::{
    BATCH_SIZE, INPUT_FILE, MAP_CLASS, OUTPUT, REDUCE_CLASS, STORAGE_DIRECTORY, WORKER_INDEX,
    WORKER_LIST,
};
use stormlite_rs::{
    Cluster, ComponentRegistry, Config, Fields, OutputCollector, RemoteTransport, Result,
    RuntimeConfig, Spout, StormError, Topology, TopologyBuilder, Tuple, Value,
};

struct Unreachable;

impl RemoteTransport for Unreachable {
    fn push(&self, address: &str, _: &str, _: &str, _: &Tuple) -> Result<()> {
        Err(StormError::http(0, format!("unexpected push to {}", address)))
    }

    fn push_batch(&self, address: &str, _: &str, _: &str, _: &[Tuple]) -> Result<()> {
        Err(StormError::http(0, format!("unexpected push to {}", address)))
    }
}

// Emits a fixed list of (key, value) records
struct Records {
    records: Vec<(String, String)>,
    next: usize,
}

impl Spout for Records {
    fn next_tuple(&mut self, collector: &OutputCollector) -> Result<bool> {
        let Some((key, value)) = self.records.get(self.next) else {
            return Ok(false);
        };
        collector.emit(vec![Value::from(key.as_str()), Value::from(value.as_str())])?;
        self.next += 1;
        Ok(true)
    }

    fn output_fields(&self) -> Fields {
        Fields::new(["key", "value"])
    }
}

fn registry(records: &[(&str, &str)]) -> ComponentRegistry {
    let records: Vec<(String, String)> = records
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let mut registry = ComponentRegistry::with_builtins();
    registry.register_spout("records", move |_, _| {
        Ok(Box::new(Records {
            records: records.clone(),
            next: 0,
        }))
    });
    registry
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn cluster(registry: ComponentRegistry) -> Cluster {
    init_logging();
    Cluster::new(
        registry,
        Arc::new(Unreachable),
        RuntimeConfig::default().with_pool_size(2),
    )
}

fn map_reduce(spout: &str, reducers: usize) -> Topology {
    let mut builder = TopologyBuilder::new();
    builder.set_spout("SPOUT", spout, 1);
    builder.set_bolt("MAP", "map", 2).shuffle_grouping("SPOUT");
    builder
        .set_bolt("REDUCE", "reduce", reducers)
        .fields_grouping("MAP", ["key"]);
    builder.set_bolt("PRINT", "print", 1).first_grouping("REDUCE");
    builder.create_topology().unwrap()
}

fn single_worker(job: &str) -> Config {
    Config::new()
        .with(WORKER_LIST, "[127.0.0.1:8001]")
        .with(WORKER_INDEX, "0")
        .with(MAP_CLASS, job)
        .with(REDUCE_CLASS, job)
}

fn sorted(mut results: Vec<(String, String)>) -> Vec<(String, String)> {
    results.sort();
    results
}

fn pair(k: &str, v: &str) -> (String, String) {
    (k.to_string(), v.to_string())
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "stormlite-{}-{}",
        name,
        uuid::Uuid::now_v7()
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_sum_by_key_single_worker() {
    let cluster = cluster(registry(&[("a", "1"), ("b", "1"), ("a", "1")]));
    cluster
        .submit_topology("sum", single_worker("sum_by_key"), map_reduce("records", 1))
        .unwrap();
    cluster.start_job("sum").unwrap();

    assert!(cluster.await_completion("sum", Duration::from_secs(10)).unwrap());

    let job = cluster.job("sum").unwrap();
    assert_eq!(
        job.context().results(),
        vec![pair("a", "2"), pair("b", "1")]
    );
    assert!(job.spouts().iter().all(|s| s.has_sent_eos()));
    assert!(job.bolts().iter().all(|b| b.has_sent_eos()));
    assert_eq!(job.context().map_inputs(), 3);
    assert_eq!(job.context().reduce_outputs(), 2);
    assert!(job.context().errors().is_empty());
}

#[test]
fn test_same_key_reaches_one_reducer() {
    let records: Vec<(String, String)> = (0..50)
        .map(|i| (format!("k{}", i % 5), "1".to_string()))
        .collect();
    let records: Vec<(&str, &str)> = records.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    let cluster = cluster(registry(&records));
    cluster
        .submit_topology("sum", single_worker("sum_by_key"), map_reduce("records", 3))
        .unwrap();
    cluster.start_job("sum").unwrap();
    assert!(cluster.await_completion("sum", Duration::from_secs(10)).unwrap());

    // One result per key means no key was split across reducers
    let results = sorted(cluster.context("sum").unwrap().results());
    let expected: Vec<(String, String)> = (0..5).map(|i| pair(&format!("k{}", i), "10")).collect();
    assert_eq!(results, expected);
}

#[test]
fn test_word_count_from_file() {
    let dir = temp_dir("wordcount");
    let input = dir.join("words.txt");
    fs::write(&input, "the quick fox\nThe lazy dog\n\nthe end\n").unwrap();

    let config = single_worker("word_count")
        .with(INPUT_FILE, input.to_string_lossy())
        .with(STORAGE_DIRECTORY, dir.to_string_lossy())
        .with(OUTPUT, "out");

    let cluster = cluster(ComponentRegistry::with_builtins());
    cluster
        .submit_topology("wc", config, map_reduce("file", 2))
        .unwrap();
    cluster.start_job("wc").unwrap();
    assert!(cluster.await_completion("wc", Duration::from_secs(10)).unwrap());

    let results = sorted(cluster.context("wc").unwrap().results());
    assert_eq!(
        results,
        vec![
            pair("dog", "1"),
            pair("end", "1"),
            pair("fox", "1"),
            pair("lazy", "1"),
            pair("quick", "1"),
            pair("the", "3"),
        ]
    );

    let written = fs::read_to_string(dir.join("out").join("output.txt")).unwrap();
    assert_eq!(written.lines().count(), 6);
    assert!(written.contains("(the, 3)"));
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_empty_input_still_completes() {
    let cluster = cluster(registry(&[]));
    cluster
        .submit_topology("empty", single_worker("sum_by_key"), map_reduce("records", 2))
        .unwrap();
    cluster.start_job("empty").unwrap();

    assert!(cluster.await_completion("empty", Duration::from_secs(10)).unwrap());
    let job = cluster.job("empty").unwrap();
    assert!(job.context().results().is_empty());
    assert!(job.bolts().iter().all(|b| b.has_sent_eos()));
}

#[test]
fn test_concurrent_jobs_are_isolated() {
    let cluster = cluster(registry(&[("x", "2"), ("y", "3"), ("x", "4")]));
    cluster
        .submit_topology("first", single_worker("sum_by_key"), map_reduce("records", 2))
        .unwrap();
    cluster
        .submit_topology(
            "second",
            single_worker("sum_by_key").with(BATCH_SIZE, "4"),
            map_reduce("records", 1),
        )
        .unwrap();
    assert_eq!(cluster.start_pending(), 2);

    for job in ["first", "second"] {
        assert!(cluster.await_completion(job, Duration::from_secs(10)).unwrap());
        assert_eq!(
            sorted(cluster.context(job).unwrap().results()),
            vec![pair("x", "6"), pair("y", "3")]
        );
    }
    assert_eq!(cluster.last_job().unwrap().context().job_id(), "second");
}

#[test]
fn test_reduce_failure_fails_job() {
    let cluster = cluster(registry(&[("a", "1"), ("a", "not a number")]));
    cluster
        .submit_topology("bad", single_worker("sum_by_key"), map_reduce("records", 1))
        .unwrap();
    cluster.start_job("bad").unwrap();

    let outcome = cluster.await_completion("bad", Duration::from_secs(10));
    assert!(outcome.is_err());
    let context = cluster.context("bad").unwrap();
    assert!(context.is_failed());
    assert_eq!(context.errors().len(), 1);
    assert_eq!(context.errors()[0].code, "EXECUTION_ERROR");
}
