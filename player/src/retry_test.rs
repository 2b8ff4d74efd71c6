#[cfg(test)]
mod tests {
    use crate::generation::GenerationCounter;
    use crate::retry::{AttemptOutcome, RetryController, RetryFailure, RetryPolicy};
    use common::{ErrorCode, PlayerError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            fuzz_factor: 0.0,
            timeout: None,
        }
    }

    fn network_error() -> PlayerError {
        PlayerError::recoverable(ErrorCode::HttpError, "connection reset")
    }

    #[test]
    fn test_delay_schedule_without_fuzz() {
        let policy = policy(5);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_fuzz_stays_within_bounds() {
        let policy = RetryPolicy {
            fuzz_factor: 0.5,
            ..policy(3)
        };
        for _ in 0..100 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(50));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_recoverable_failures() {
        let generations = Arc::new(GenerationCounter::new());
        let (_, generation) = generations.advance().unwrap();
        let controller = RetryController::new(policy(3), generations.clone());
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let (value, state) = controller
            .run(generation, move |_| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        AttemptOutcome::Recoverable(network_error())
                    } else {
                        AttemptOutcome::Success(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(state.attempts, 3);
        assert_eq!(state.last_error, Some(network_error()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recoverable_failure_exhausts_attempts() {
        let generations = Arc::new(GenerationCounter::new());
        let (_, generation) = generations.advance().unwrap();
        let controller = RetryController::new(policy(2), generations);

        let result = controller
            .run(generation, |_| async { AttemptOutcome::<()>::Recoverable(network_error()) })
            .await;

        match result {
            Err(RetryFailure::Failed { error, attempts }) => {
                assert_eq!(attempts, 2);
                assert_eq!(error.code, ErrorCode::HttpError);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_failure_is_not_retried() {
        let generations = Arc::new(GenerationCounter::new());
        let (_, generation) = generations.advance().unwrap();
        let controller = RetryController::new(policy(5), generations);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result = controller
            .run(generation, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    AttemptOutcome::<()>::Fatal(PlayerError::critical(
                        ErrorCode::BadHttpStatus,
                        "404",
                    ))
                }
            })
            .await;

        assert!(matches!(result, Err(RetryFailure::Failed { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseding_generation_cancels_backoff() {
        let generations = Arc::new(GenerationCounter::new());
        let (_, generation) = generations.advance().unwrap();
        let controller = RetryController::new(
            RetryPolicy {
                base_delay: Duration::from_secs(60),
                ..policy(5)
            },
            generations.clone(),
        );
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let run = tokio::spawn(async move {
            controller
                .run(generation, move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { AttemptOutcome::<()>::Recoverable(network_error()) }
                })
                .await
                .map(|_| ())
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        generations.advance();

        let result = tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("backoff was not cancelled")
            .unwrap();
        assert_eq!(result, Err(RetryFailure::Superseded));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_is_discarded() {
        let generations = Arc::new(GenerationCounter::new());
        let (_, generation) = generations.advance().unwrap();
        let controller = RetryController::new(policy(3), generations.clone());

        let counter = generations.clone();
        let result = controller
            .run(generation, move |_| {
                // Superseded while the attempt is in flight.
                counter.advance();
                async { AttemptOutcome::Success(42) }
            })
            .await;

        assert!(matches!(result, Err(RetryFailure::Superseded)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_never_attempts() {
        let generations = Arc::new(GenerationCounter::new());
        let (_, stale) = generations.advance().unwrap();
        generations.advance();
        let controller = RetryController::new(policy(3), generations);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result = controller
            .run(stale, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { AttemptOutcome::Success(()) }
            })
            .await;

        assert!(matches!(result, Err(RetryFailure::Superseded)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_as_recoverable() {
        let generations = Arc::new(GenerationCounter::new());
        let (_, generation) = generations.advance().unwrap();
        let controller = RetryController::new(
            RetryPolicy {
                timeout: Some(Duration::from_millis(500)),
                ..policy(2)
            },
            generations,
        );

        let result = controller
            .run(generation, |_| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                AttemptOutcome::Success(())
            })
            .await;

        match result {
            Err(RetryFailure::Failed { error, attempts }) => {
                assert_eq!(attempts, 2);
                assert_eq!(error.code, ErrorCode::Timeout);
                assert!(error.is_recoverable());
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
