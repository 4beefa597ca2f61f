use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use push_worker::{
    clients::circuit_breaker::CircuitBreaker,
    error::BreakerError,
    models::circuit_breaker::{CircuitBreakerConfig, CircuitState},
};
use tokio::{sync::oneshot, time::sleep};
use tokio_test::{assert_pending, assert_ready, task};

fn breaker(timeout: Duration) -> CircuitBreaker {
    CircuitBreaker::new(
        "test",
        CircuitBreakerConfig {
            min_requests: 10,
            failure_ratio: 0.6,
            timeout,
            half_open_requests: 1,
            window: Duration::ZERO,
        },
    )
}

async fn fail(breaker: &CircuitBreaker) {
    let _ = breaker.execute(async { Err::<(), _>("boom") }).await;
}

async fn succeed(breaker: &CircuitBreaker) {
    let _ = breaker.execute(async { Ok::<_, &str>(()) }).await;
}

async fn trip(breaker: &CircuitBreaker) {
    for _ in 0..10 {
        fail(breaker).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);
}

/// Test: Ten consecutive failures open the breaker and the eleventh call never runs
#[tokio::test]
async fn test_breaker_opens_after_ten_failures() -> Result<()> {
    let breaker = breaker(Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..10 {
        let calls = Arc::clone(&calls);
        let result = breaker
            .execute(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("gateway down")
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Inner("gateway down"))));
    }

    assert_eq!(breaker.state(), CircuitState::Open);

    let eleventh = {
        let calls = Arc::clone(&calls);
        breaker
            .execute(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await
    };

    assert!(matches!(eleventh, Err(BreakerError::Open)));
    assert!(eleventh.is_err_and(|e| e.is_rejection()));
    assert_eq!(calls.load(Ordering::SeqCst), 10, "Open breaker must not run the call");

    Ok(())
}

/// Test: Sixty percent failures over ten requests trip the breaker
#[tokio::test]
async fn test_breaker_trips_at_failure_ratio() -> Result<()> {
    let breaker = breaker(Duration::from_secs(60));

    for _ in 0..6 {
        fail(&breaker).await;
    }
    for _ in 0..3 {
        succeed(&breaker).await;
    }
    assert_eq!(breaker.state(), CircuitState::Closed);

    succeed(&breaker).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    Ok(())
}

/// Test: Failure ratios below the threshold keep the breaker closed
#[tokio::test]
async fn test_breaker_stays_closed_below_ratio() -> Result<()> {
    let breaker = breaker(Duration::from_secs(60));

    for _ in 0..5 {
        fail(&breaker).await;
        succeed(&breaker).await;
    }

    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.counts().requests, 10);
    assert_eq!(breaker.counts().total_failures, 5);

    Ok(())
}

/// Test: Too few requests never trip the breaker
#[tokio::test]
async fn test_breaker_needs_minimum_requests() -> Result<()> {
    let breaker = breaker(Duration::from_secs(60));

    for _ in 0..9 {
        fail(&breaker).await;
    }

    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.counts().consecutive_failures, 9);

    Ok(())
}

/// Test: After the cool-down a successful trial closes the breaker
#[tokio::test]
async fn test_half_open_success_closes() -> Result<()> {
    let breaker = breaker(Duration::from_millis(50));
    trip(&breaker).await;

    sleep(Duration::from_millis(80)).await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    let trial = breaker.execute(async { Ok::<_, &str>("sent") }).await;

    assert!(matches!(trial, Ok("sent")));
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.counts().requests, 0, "Closing starts a fresh generation");

    Ok(())
}

/// Test: A failed trial reopens the breaker for another cool-down
#[tokio::test]
async fn test_half_open_failure_reopens() -> Result<()> {
    let breaker = breaker(Duration::from_millis(50));
    trip(&breaker).await;

    sleep(Duration::from_millis(80)).await;
    fail(&breaker).await;

    assert_eq!(breaker.state(), CircuitState::Open);
    let rejected = breaker.execute(async { Ok::<_, &str>(()) }).await;
    assert!(matches!(rejected, Err(BreakerError::Open)));

    Ok(())
}

/// Test: Only one trial call is admitted while half-open
#[tokio::test]
async fn test_half_open_admits_single_trial() -> Result<()> {
    let breaker = breaker(Duration::from_millis(50));
    trip(&breaker).await;
    sleep(Duration::from_millis(80)).await;

    let (release, gate) = oneshot::channel::<()>();
    let mut trial = task::spawn(breaker.execute(async move {
        gate.await.map_err(|_| "gate dropped")
    }));
    assert_pending!(trial.poll());

    let second = breaker.execute(async { Ok::<_, &str>(()) }).await;
    assert!(matches!(second, Err(BreakerError::TooManyRequests)));

    release.send(()).ok();
    assert!(trial.is_woken());
    let outcome = assert_ready!(trial.poll());
    assert!(outcome.is_ok());
    drop(trial);

    assert_eq!(breaker.state(), CircuitState::Closed);

    Ok(())
}

/// Test: Abandoning an admitted trial counts as a failure
#[tokio::test]
async fn test_dropped_trial_counts_as_failure() -> Result<()> {
    let breaker = breaker(Duration::from_millis(50));
    trip(&breaker).await;
    sleep(Duration::from_millis(80)).await;

    let (_release, gate) = oneshot::channel::<()>();
    let mut trial = task::spawn(breaker.execute(async move {
        gate.await.map_err(|_| "gate dropped")
    }));
    assert_pending!(trial.poll());
    drop(trial);

    assert_eq!(breaker.state(), CircuitState::Open);

    Ok(())
}

/// Test: Closed-state counts are cleared when the window rolls over
#[tokio::test]
async fn test_counts_reset_each_window() -> Result<()> {
    let breaker = CircuitBreaker::new(
        "windowed",
        CircuitBreakerConfig {
            window: Duration::from_millis(50),
            ..CircuitBreakerConfig::default()
        },
    );

    for _ in 0..9 {
        fail(&breaker).await;
    }
    assert_eq!(breaker.counts().requests, 9);

    sleep(Duration::from_millis(80)).await;
    assert_eq!(breaker.counts().requests, 0);

    fail(&breaker).await;
    assert_eq!(breaker.state(), CircuitState::Closed);

    Ok(())
}

/// Test: Every transition is reported to the state listener
#[tokio::test]
async fn test_state_listener_sees_transitions() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let breaker = breaker(Duration::from_millis(50)).with_state_listener(move |name, from, to| {
        sink.lock().unwrap().push((name.to_string(), from, to));
    });

    trip(&breaker).await;
    sleep(Duration::from_millis(80)).await;
    succeed(&breaker).await;

    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            ("test".to_string(), CircuitState::Closed, CircuitState::Open),
            ("test".to_string(), CircuitState::Open, CircuitState::HalfOpen),
            ("test".to_string(), CircuitState::HalfOpen, CircuitState::Closed),
        ]
    );

    Ok(())
}
