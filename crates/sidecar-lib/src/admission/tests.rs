//! Behavioural tests for the admission engine
//!
//! Draws are scripted so every backoff branch is reachable deterministically.

#[cfg(test)]
mod engine_tests {
    use crate::admission::{
        AdmissionEngine, AdmissionStatus, BackoffState, RandomSource, Thresholds,
    };
    use crate::models::ResourceSnapshot;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;

    /// Replays queued draws and counts how often it was consulted
    #[derive(Clone, Default)]
    struct ScriptedDraws {
        draws: Arc<Mutex<VecDeque<f64>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedDraws {
        fn new(draws: &[f64]) -> Self {
            Self {
                draws: Arc::new(Mutex::new(draws.iter().copied().collect())),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RandomSource for ScriptedDraws {
        fn draw_percent(&mut self) -> f64 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.draws
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected backoff draw")
        }
    }

    fn thresholds() -> Thresholds {
        Thresholds {
            cpu_percent: 80.0,
            memory_percent: 80.0,
            minimum_available_percent: 50.0,
        }
    }

    fn snapshot(cpu_usage: i64, mem_usage: i64, available: i32, replicas: i32) -> ResourceSnapshot {
        ResourceSnapshot {
            deployment_replicas: replicas,
            deployment_available_replicas: available,
            container_name: "app".to_string(),
            container_cpu_limit: 1000,
            container_mem_limit: 1000,
            container_ready: true,
            container_cpu_usage: cpu_usage,
            container_mem_usage: mem_usage,
            degraded_fields: Vec::new(),
        }
    }

    fn overloaded() -> ResourceSnapshot {
        snapshot(900, 900, 10, 10)
    }

    fn calm() -> ResourceSnapshot {
        snapshot(500, 500, 10, 10)
    }

    fn locked_engine() -> (AdmissionEngine, ScriptedDraws) {
        let draws = ScriptedDraws::new(&[70.0]);
        let engine = AdmissionEngine::with_random_source(thresholds(), draws.clone());
        engine.evaluate(&overloaded());
        assert_eq!(engine.backoff_state(), BackoffState::LockedReject);
        (engine, draws)
    }

    #[test]
    fn test_healthy_within_thresholds() {
        let draws = ScriptedDraws::new(&[]);
        let engine = AdmissionEngine::with_random_source(thresholds(), draws.clone());

        let verdict = engine.evaluate(&calm());

        assert_eq!(verdict.status, AdmissionStatus::Healthy);
        assert!(verdict.accept);
        assert_eq!(verdict.ratios.cpu_percent, 50.0);
        assert_eq!(verdict.ratios.memory_percent, 50.0);
        assert_eq!(verdict.ratios.available_percent, 100.0);
        assert_eq!(verdict.random_draw, None);
        assert_eq!(draws.calls(), 0);
    }

    #[test]
    fn test_overloaded_draw_within_threshold_keeps_serving() {
        let draws = ScriptedDraws::new(&[30.0]);
        let engine = AdmissionEngine::with_random_source(thresholds(), draws.clone());

        let verdict = engine.evaluate(&overloaded());

        assert_eq!(verdict.status, AdmissionStatus::ResourceOverloadedButKeeping);
        assert!(verdict.accept);
        assert_eq!(verdict.random_draw, Some(30.0));
        assert_eq!(engine.backoff_state(), BackoffState::Unlocked);
    }

    #[test]
    fn test_draw_equal_to_threshold_keeps_serving() {
        let draws = ScriptedDraws::new(&[50.0]);
        let engine = AdmissionEngine::with_random_source(thresholds(), draws);

        let verdict = engine.evaluate(&overloaded());

        assert_eq!(verdict.status, AdmissionStatus::ResourceOverloadedButKeeping);
        assert_eq!(engine.backoff_state(), BackoffState::Unlocked);
    }

    #[test]
    fn test_unlocked_overload_draws_on_every_call() {
        let draws = ScriptedDraws::new(&[10.0, 20.0, 90.0]);
        let engine = AdmissionEngine::with_random_source(thresholds(), draws.clone());

        assert!(engine.evaluate(&overloaded()).accept);
        assert!(engine.evaluate(&overloaded()).accept);
        assert!(!engine.evaluate(&overloaded()).accept);
        assert_eq!(draws.calls(), 3);
    }

    #[test]
    fn test_reject_draw_locks_and_sticks() {
        let draws = ScriptedDraws::new(&[70.0]);
        let engine = AdmissionEngine::with_random_source(thresholds(), draws.clone());

        let first = engine.evaluate(&overloaded());
        assert_eq!(first.status, AdmissionStatus::ResourceExhausted);
        assert!(!first.accept);
        assert_eq!(first.random_draw, Some(70.0));
        assert_eq!(engine.backoff_state(), BackoffState::LockedReject);

        for _ in 0..5 {
            let again = engine.evaluate(&overloaded());
            assert_eq!(again.status, AdmissionStatus::ResourceExhausted);
            assert_eq!(again.random_draw, None);
        }
        assert_eq!(draws.calls(), 1);
    }

    #[test]
    fn test_reported_state_matches_each_verdict_under_contention() {
        let draws = ScriptedDraws::new(&[99.0; 1600]);
        let engine = Arc::new(AdmissionEngine::with_random_source(thresholds(), draws));

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let engine = engine.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        let snapshot = if (i + worker) % 2 == 0 {
                            overloaded()
                        } else {
                            calm()
                        };
                        let (verdict, state) = engine.evaluate_with_state(&snapshot);
                        let expected = match verdict.status {
                            AdmissionStatus::ResourceExhausted => BackoffState::LockedReject,
                            AdmissionStatus::Healthy => BackoffState::Unlocked,
                            other => panic!("unexpected status {other}"),
                        };
                        assert_eq!(state, expected);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_calm_snapshot_resets_lock() {
        let draws = ScriptedDraws::new(&[70.0, 10.0]);
        let engine = AdmissionEngine::with_random_source(thresholds(), draws.clone());

        engine.evaluate(&overloaded());
        assert_eq!(engine.backoff_state(), BackoffState::LockedReject);

        let verdict = engine.evaluate(&calm());
        assert_eq!(verdict.status, AdmissionStatus::Healthy);
        assert_eq!(engine.backoff_state(), BackoffState::Unlocked);

        // A new episode draws fresh
        let verdict = engine.evaluate(&overloaded());
        assert_eq!(verdict.status, AdmissionStatus::ResourceOverloadedButKeeping);
        assert_eq!(draws.calls(), 2);
    }

    #[test]
    fn test_not_ready_never_touches_state() {
        let (engine, draws) = locked_engine();

        let mut not_ready = calm();
        not_ready.container_ready = false;
        let verdict = engine.evaluate(&not_ready);

        assert_eq!(verdict.status, AdmissionStatus::NotReady);
        assert!(verdict.accept);
        assert_eq!(engine.backoff_state(), BackoffState::LockedReject);

        let mut not_ready_overloaded = overloaded();
        not_ready_overloaded.container_ready = false;
        let fresh = AdmissionEngine::with_random_source(thresholds(), ScriptedDraws::new(&[]));
        assert_eq!(
            fresh.evaluate(&not_ready_overloaded).status,
            AdmissionStatus::NotReady
        );
        assert_eq!(fresh.backoff_state(), BackoffState::Unlocked);
        assert_eq!(draws.calls(), 1);
    }

    #[test]
    fn test_pod_shortage_takes_precedence_over_overload() {
        let draws = ScriptedDraws::new(&[]);
        let engine = AdmissionEngine::with_random_source(thresholds(), draws.clone());

        let verdict = engine.evaluate(&snapshot(900, 900, 2, 10));

        assert_eq!(verdict.status, AdmissionStatus::PodShortage);
        assert!(verdict.accept);
        assert_eq!(verdict.ratios.available_percent, 20.0);
        assert_eq!(draws.calls(), 0);
    }

    #[test]
    fn test_pod_shortage_keeps_lock() {
        let (engine, _draws) = locked_engine();

        let verdict = engine.evaluate(&snapshot(100, 100, 1, 10));

        assert_eq!(verdict.status, AdmissionStatus::PodShortage);
        assert_eq!(engine.backoff_state(), BackoffState::LockedReject);
    }

    #[test]
    fn test_zero_replicas_is_shortage() {
        let engine = AdmissionEngine::with_random_source(thresholds(), ScriptedDraws::new(&[]));

        let verdict = engine.evaluate(&snapshot(100, 100, 0, 0));

        assert_eq!(verdict.status, AdmissionStatus::PodShortage);
        assert_eq!(verdict.ratios.available_percent, 0.0);
    }

    #[test]
    fn test_single_resource_spike_is_not_overload() {
        let draws = ScriptedDraws::new(&[]);
        let engine = AdmissionEngine::with_random_source(thresholds(), draws.clone());

        assert_eq!(
            engine.evaluate(&snapshot(990, 100, 10, 10)).status,
            AdmissionStatus::Healthy
        );
        assert_eq!(
            engine.evaluate(&snapshot(100, 990, 10, 10)).status,
            AdmissionStatus::Healthy
        );
        // Exactly at threshold does not breach
        assert_eq!(
            engine.evaluate(&snapshot(800, 800, 10, 10)).status,
            AdmissionStatus::Healthy
        );
        assert_eq!(draws.calls(), 0);
    }

    #[test]
    fn test_zero_filled_usage_fails_open() {
        let engine = AdmissionEngine::with_random_source(thresholds(), ScriptedDraws::new(&[]));

        let verdict = engine.evaluate(&snapshot(0, 0, 10, 10));

        assert_eq!(verdict.status, AdmissionStatus::Healthy);
        assert_eq!(verdict.ratios.cpu_percent, 0.0);
    }

    #[test]
    fn test_minimum_zero_always_rejects_on_overload() {
        let t = Thresholds {
            minimum_available_percent: 0.0,
            ..thresholds()
        };
        let engine = AdmissionEngine::with_random_source(t, ScriptedDraws::new(&[0.5]));

        let verdict = engine.evaluate(&overloaded());

        assert_eq!(verdict.status, AdmissionStatus::ResourceExhausted);
    }

    #[test]
    fn test_concurrent_overloaded_evaluations_draw_once() {
        // Every draw rejects: only the first evaluator may draw, the rest
        // must observe the lock it set.
        let draws = ScriptedDraws::new(&[99.0; 64]);
        let engine = Arc::new(AdmissionEngine::with_random_source(
            thresholds(),
            draws.clone(),
        ));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let engine = engine.clone();
                thread::spawn(move || {
                    (0..8)
                        .map(|_| engine.evaluate(&overloaded()).status)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            for status in handle.join().unwrap() {
                assert_eq!(status, AdmissionStatus::ResourceExhausted);
            }
        }
        assert_eq!(draws.calls(), 1);
        assert_eq!(engine.backoff_state(), BackoffState::LockedReject);
    }

    #[test]
    fn test_entropy_source_range() {
        use crate::admission::EntropySource;

        let mut source = EntropySource::new();
        for _ in 0..1000 {
            let draw = source.draw_percent();
            assert!((0.0..100.0).contains(&draw));
        }
    }

    #[test]
    fn test_threshold_validation() {
        assert!(thresholds().validate().is_ok());

        let bad = Thresholds {
            cpu_percent: f64::NAN,
            ..thresholds()
        };
        assert!(bad.validate().is_err());

        let bad = Thresholds {
            memory_percent: -1.0,
            ..thresholds()
        };
        assert!(bad.validate().is_err());

        let bad = Thresholds {
            minimum_available_percent: 120.0,
            ..thresholds()
        };
        assert!(bad.validate().is_err());
    }
}
