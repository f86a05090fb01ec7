use pybridge::ffi::live_handles;
use pybridge::{
    synthetic_fleet, top_pods, BridgeError, Config, EmbeddedRuntime, MetricsRecord, RuntimeConfig, Scorer,
    SymbolRef,
};
use std::fs;
use std::time::Duration;

/// Put the bundled demo scorer on `sys.path`.
fn demo_runtime() -> &'static EmbeddedRuntime {
    let runtime = EmbeddedRuntime::global();
    let python_dir = format!("{}/python", env!("CARGO_MANIFEST_DIR"));
    runtime
        .configure(&RuntimeConfig {
            python_path: vec![python_dir],
            preload: vec!["scorer".to_string()],
        })
        .unwrap();
    runtime
}

#[test]
fn test_batch_scores_are_ranked() {
    demo_runtime();
    let scorer = Scorer::from_config(&Config::default().scorer);
    let fleet = synthetic_fleet(20, 2);
    let live = live_handles();

    let scores = scorer.score(&fleet).unwrap();
    assert_eq!(scores.len(), fleet.len());
    assert!(scores.windows(2).all(|pair| pair[0].score >= pair[1].score));
    assert_eq!(live_handles(), live);

    // An empty queue always beats any queued pod
    let best = fleet.iter().find(|r| r.pod_name == scores[0].pod_name).unwrap();
    assert_eq!(best.queue_count, 0);
}

#[test]
fn test_json_path_matches_batch_path() {
    demo_runtime();
    let scorer = Scorer::from_config(&Config::default().scorer);
    let fleet = synthetic_fleet(12, 3);

    let by_objects = scorer.score(&fleet).unwrap();
    let by_json = scorer.score_json(&fleet).unwrap();
    assert_eq!(by_objects, by_json);
}

#[test]
fn test_top_pods_truncates() {
    demo_runtime();
    let scorer = Scorer::from_config(&Config::default().scorer);
    let scores = scorer.score(&synthetic_fleet(10, 1)).unwrap();

    let top = top_pods(scores.clone(), 3);
    assert_eq!(top.len(), 3);
    assert_eq!(top[..], scores[..3]);
    assert_eq!(top_pods(scores, 50).len(), 10);
}

#[test]
fn test_missing_scorer_attribute_is_resolution_error() {
    demo_runtime();
    let scorer = Scorer::new(SymbolRef::new("scorer", "no_such_callable"));

    let err = scorer.score(&synthetic_fleet(2, 1)).unwrap_err();
    assert!(matches!(err, BridgeError::Resolution { attribute: Some(_), .. }));
}

#[test]
fn test_modules_found_through_configured_path() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("pybridge_tmp_scorer.py"),
        "import time\n\
         \n\
         def echo(pod):\n    return pod\n\
         \n\
         def reverse(pods):\n    return [(p['pod_name'], -i) for i, p in enumerate(pods)]\n\
         \n\
         def sleepy(pods):\n    time.sleep(1.0)\n    return []\n\
         \n\
         def sleepy_json(data):\n    time.sleep(1.0)\n    return []\n",
    )
    .unwrap();

    let runtime = EmbeddedRuntime::global();
    runtime
        .configure(&RuntimeConfig {
            python_path: vec![dir.path().to_string_lossy().to_string()],
            preload: vec!["pybridge_tmp_scorer".to_string()],
        })
        .unwrap();
    assert!(runtime.preloaded().contains(&"pybridge_tmp_scorer".to_string()));

    // Single-record echo
    let record = MetricsRecord::new("pod-7", 3, 0.42, 5);
    let echoed = Scorer::new(SymbolRef::new("pybridge_tmp_scorer", "echo"))
        .call_record(&record)
        .unwrap();
    assert_eq!(echoed, record);

    // Batch decoded in the callable's order
    let fleet = synthetic_fleet(3, 1);
    let scores = Scorer::new(SymbolRef::new("pybridge_tmp_scorer", "reverse"))
        .score_within(&fleet, 0)
        .unwrap();
    let names: Vec<_> = scores.iter().map(|s| s.pod_name.as_str()).collect();
    assert_eq!(names, ["Pod0", "Pod1", "Pod2"]);
    assert_eq!(scores[2].score, -2);

    // A call that outlives its deadline is abandoned
    let err = Scorer::new(SymbolRef::new("pybridge_tmp_scorer", "sleepy"))
        .score_with_deadline(&fleet, Duration::from_millis(50))
        .unwrap_err();
    match err {
        BridgeError::Timeout { symbol, after } => {
            assert_eq!(symbol, "pybridge_tmp_scorer.sleepy");
            assert_eq!(after, Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {:?}", other),
    }

    // The JSON path honours the same deadline and names its own callable
    let err = Scorer::new(SymbolRef::new("pybridge_tmp_scorer", "echo"))
        .with_json_symbol(SymbolRef::new("pybridge_tmp_scorer", "sleepy_json"))
        .score_json_within(&fleet, 50)
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Timeout { ref symbol, .. } if symbol == "pybridge_tmp_scorer.sleepy_json"
    ));
}

#[test]
fn test_sessions_are_serialized_and_counted() {
    let runtime = EmbeddedRuntime::global();
    let before = runtime.sequences();

    let handles: Vec<_> = (0..4)
        .map(|_| std::thread::spawn(move || EmbeddedRuntime::global().session(|s| s.sequence())))
        .collect();
    let mut seen: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    seen.sort_unstable();
    seen.dedup();

    assert_eq!(seen.len(), 4);
    assert!(runtime.sequences() >= before + 4);
}
