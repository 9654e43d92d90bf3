//! Circuit Breaker Example
//!
//! Demonstrates retrying a flaky dependency behind a circuit breaker.
//! Shows practical patterns including:
//! - Exponential backoff with jitter
//! - Terminal errors that are never retried
//! - Observing retries through a hook
//! - The breaker opening, failing fast and closing again
//!
//! Engine logs are printed at debug level:
//!
//! ```text
//! cargo run --example circuit_breaker
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use breakwater::{CircuitBreaker, RetryManager, RetryPolicy};
use tokio_util::sync::CancellationToken;

// ==================== Backoff ====================

/// Example 1: a dependency that recovers after two failures.
async fn example_backoff() {
    println!("\n=== Example 1: Backoff ===");

    let manager = RetryManager::builder(
        RetryPolicy::exponential(Duration::from_millis(50))
            .with_max_retries(4)
            .with_jitter(true),
    )
    .with_on_retry(|event| {
        println!(
            "  attempt {} failed ({}), waiting {:?}",
            event.attempt, event.error, event.next_delay
        );
    })
    .build()
    .expect("valid policy");

    let attempts = Arc::new(AtomicU32::new(0));
    let result = manager
        .execute(|| {
            let attempts = attempts.clone();
            async move {
                match attempts.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err("503 service unavailable"),
                    _ => Ok("inventory loaded"),
                }
            }
        })
        .await;

    println!("  result: {:?}", result);
    println!("  stats: {:?}", manager.statistics());
}

// ==================== Terminal Errors ====================

/// Example 2: errors that look permanent are returned immediately.
async fn example_terminal() {
    println!("\n=== Example 2: Terminal Errors ===");

    let manager = RetryManager::new(RetryPolicy::exponential(Duration::from_millis(50)))
        .expect("valid policy");
    let result = manager
        .execute(|| async { Err::<(), _>("401 authentication failed") })
        .await;

    match result {
        Err(err) if err.is_terminal() => println!("  gave up at once: {}", err),
        other => println!("  unexpected: {:?}", other),
    }
    println!("  attempts: {}", manager.statistics().total_attempts);
}

// ==================== Circuit Breaker ====================

/// Example 3: repeated failures open the circuit until the timeout passes.
async fn example_breaker() {
    println!("\n=== Example 3: Circuit Breaker ===");

    let breaker = CircuitBreaker::new(
        RetryPolicy::exponential(Duration::from_millis(10)).with_max_retries(1),
        2,
        Duration::from_millis(300),
    )
    .expect("valid settings");

    for i in 1..=3 {
        let result = breaker
            .execute(|| async { Err::<(), _>("connection refused") })
            .await;
        match result {
            Err(err) => println!("  call {}: {} (state {:?})", i, err, breaker.state()),
            Ok(()) => println!("  call {}: ok", i),
        }
    }

    tokio::time::sleep(Duration::from_millis(350)).await;
    let result = breaker.execute(|| async { Ok::<_, String>("healthy") }).await;
    println!("  after reset timeout: {:?} (state {:?})", result, breaker.state());
}

// ==================== Cancellation ====================

/// Example 4: a shutdown signal interrupts the backoff wait.
async fn example_cancel() {
    println!("\n=== Example 4: Cancellation ===");

    let manager = RetryManager::new(
        RetryPolicy::exponential(Duration::from_secs(5)).with_max_retries(3),
    )
    .expect("valid policy");
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let result = manager
        .execute_with_cancel(&token, || async { Err::<(), _>("timeout") })
        .await;
    println!("  result: {:?}", result);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    example_backoff().await;
    example_terminal().await;
    example_breaker().await;
    example_cancel().await;
}
