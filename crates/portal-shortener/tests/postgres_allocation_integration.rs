//! Concurrent allocation against a disposable Postgres container; needs Docker.
//! `cargo test -p portal-shortener -- --ignored`

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use portal_core::{CreateShortUrlParams, DefaultValidator, ReadRepository};
use portal_generator::RandomCodeGenerator;
use portal_shortener::{AllocationConfig, AllocationService};
use portal_storage::PostgresStore;
use portal_test_infra::postgres::{PostgresConfig, PostgresServer};

const ALLOCATIONS: usize = 40;

async fn start() -> (PostgresServer, PostgresStore) {
    let postgres = PostgresServer::new(PostgresConfig::builder().build())
        .await
        .expect("start postgres");
    let url = postgres.database_url().await.expect("postgres url");

    let mut last_error = None;
    for _ in 0..20 {
        match PostgresStore::connect_with(&url, 20).await {
            Ok(store) => {
                store.migrate().await.expect("apply migrations");
                return (postgres, store);
            }
            Err(err) => {
                last_error = Some(err);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    panic!("failed to connect postgres: {last_error:?}");
}

fn contended_config() -> AllocationConfig {
    AllocationConfig::builder()
        .max_transaction_retries(30)
        .retry_base_delay(Duration::from_millis(10))
        .retry_max_delay(Duration::from_millis(250))
        .build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "requires docker"]
async fn parallel_allocations_are_distinct() {
    let (_postgres, store) = start().await;

    // A one-character space forces collisions and counter growth under load.
    sqlx::query("UPDATE short_code_length SET min_length = 1 WHERE id = 1")
        .execute(store.pool())
        .await
        .unwrap();

    let service = Arc::new(AllocationService::new(
        Arc::new(store),
        RandomCodeGenerator::new(),
        DefaultValidator,
        contended_config(),
    ));

    let tasks: Vec<_> = (0..ALLOCATIONS)
        .map(|i| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .create_short_url(CreateShortUrlParams::new(
                        format!("user_{i}"),
                        format!("https://example.com/{i}"),
                    ))
                    .await
            })
        })
        .collect();

    let mut codes = HashSet::new();
    for task in tasks {
        let code = task.await.unwrap().unwrap();
        assert!(codes.insert(code.clone()), "code {code} issued twice");
    }
    assert_eq!(codes.len(), ALLOCATIONS);

    for code in &codes {
        assert!(service.store().get_long_url(code).await.unwrap().is_some());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "requires docker"]
async fn parallel_preferred_codes_have_one_winner() {
    let (_postgres, store) = start().await;
    let service = Arc::new(AllocationService::new(
        Arc::new(store),
        RandomCodeGenerator::new(),
        DefaultValidator,
        contended_config(),
    ));

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .create_short_url(
                        CreateShortUrlParams::new(format!("user_{i}"), "https://example.com")
                            .with_preferred_code("shared"),
                    )
                    .await
            })
        })
        .collect();

    let mut winners = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(code) => {
                assert_eq!(code.as_str(), "shared");
                winners += 1;
            }
            Err(err) => assert!(
                matches!(err, portal_core::ServiceError::Conflict(_)),
                "unexpected error: {err}"
            ),
        }
    }
    assert_eq!(winners, 1);
}
