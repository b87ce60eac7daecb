use std::sync::atomic::Ordering;

use fedsim::{
    trainer::{Metric, Split},
    Config, FedErr, Runner,
};

fn small(json: &str) -> Config {
    let mut cfg = Config::from_json(json).unwrap();
    cfg.data.train_samples = 60;
    cfg.data.test_samples = 30;
    cfg.data.features = 4;
    cfg.data.batch_size = 8;
    cfg
}

#[test]
fn every_client_trains_and_evaluates_in_order() {
    let cfg = small(r#"{ "data": { "type": "ModeB" }, "federate": { "client_num": 3 } }"#);
    let reports = Runner::default().run(&cfg).unwrap();

    let ids: Vec<_> = reports.iter().map(|r| r.client_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    for report in &reports {
        assert_eq!(report.train.split, Split::Train);
        assert_eq!(report.val.split, Split::Val);
        assert_eq!(report.test.split, Split::Test);
        assert!(report.train.num_samples > 0);
        assert!(matches!(report.test.metric, Metric::Accuracy(a) if (0.0..=1.0).contains(&a)));
    }
}

#[test]
fn contrastive_mode_evaluates_on_the_train_shards() {
    let cfg = small(
        r#"{
            "data": { "type": "ModeA", "shuffle": false },
            "federate": { "client_num": 2 },
            "train": { "local_update_steps": 2 }
        }"#,
    );
    let reports = Runner::default().run(&cfg).unwrap();

    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert_eq!(report.train.num_samples, 2 * report.val.num_samples);
    }
}

#[test]
fn graph_trainer_counts_flops_on_graph_data() {
    let cfg = small(
        r#"{
            "data": { "source": "synthetic_graph" },
            "federate": { "client_num": 2 },
            "eval": { "count_flops": true },
            "trainer": { "type": "graphminibatch_trainer" }
        }"#,
    );
    let reports = Runner::default().run(&cfg).unwrap();

    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert!(matches!(report.train.total_flops, Some(f) if f > 0.0));
        assert!(report.test.total_flops >= report.train.total_flops);
    }
}

#[test]
fn graph_trainer_rejects_dense_data() {
    let cfg = small(r#"{ "trainer": { "type": "graphminibatch_trainer" } }"#);
    assert!(matches!(Runner::default().run(&cfg), Err(FedErr::Ml(_))));
}

#[test]
fn regression_reports_mean_squared_error() {
    let cfg = small(
        r#"{
            "data": { "source": "synthetic_regression" },
            "federate": { "client_num": 2 },
            "model": { "task": "regression" }
        }"#,
    );
    let reports = Runner::default().run(&cfg).unwrap();

    for report in &reports {
        assert!(matches!(report.val.metric, Metric::Mse(m) if m.is_finite() && m >= 0.0));
    }
}

#[test]
fn unset_client_count_uses_every_shard() {
    let mut cfg = small("{}");
    cfg.data.num_shards = 4;

    let reports = Runner::default().run(&cfg).unwrap();
    assert_eq!(reports.len(), 4);
}

#[test]
fn unknown_trainer_has_no_handler() {
    let cfg = small(r#"{ "trainer": { "type": "fedprox" } }"#);
    assert!(matches!(
        Runner::default().run(&cfg),
        Err(FedErr::NoMatchingHandler { kind: "trainer", .. })
    ));
}

#[test]
fn raised_stop_flag_runs_no_client() {
    let cfg = small(r#"{ "federate": { "client_num": 2 } }"#);
    let runner = Runner::default();
    runner.stop_handle().store(true, Ordering::Relaxed);

    assert!(runner.run(&cfg).unwrap().is_empty());
}
