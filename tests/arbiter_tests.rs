
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rcc_arbiter::ArbiterError;
use test_harness::*;
use uuid::Uuid;

#[tokio::test]
async fn test_start_kill_list_scenario() {
    let arbiter = test_arbiter(3000);

    let first = arbiter.start_game_server("42", LONG_RUNNING).await.unwrap();
    assert_eq!(first.port, 7000);
    assert_eq!(first.ticket.place_id, "42");
    assert_eq!(first.ticket.port, 7000);

    let second = arbiter.start_game_server("7", LONG_RUNNING).await.unwrap();
    assert_eq!(second.port, 7001);
    assert_ne!(first.job_id, second.job_id);

    arbiter.kill_game_server(first.job_id).await.unwrap();

    let games = arbiter.list_active_games().await;
    assert_eq!(games.len(), 1);
    assert_eq!(games[0].job_id, second.job_id);
    assert_eq!(games[0].workload_id, "7");
    assert_eq!(games[0].port, 7001);
    assert_eq!(games[0].variant, LONG_RUNNING);

    arbiter.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_started_job_is_listed_with_pid() {
    let arbiter = test_arbiter(3000);

    let started = arbiter.start_game_server("42", LONG_RUNNING).await.unwrap();
    let games = arbiter.list_active_games().await;

    assert_eq!(games.len(), 1);
    assert_eq!(games[0].job_id, started.job_id);
    assert!(games[0].pid.is_some());
    assert_eq!(games[0].restarts, 0);

    arbiter.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_ports_unique_across_sequential_starts() {
    let arbiter = test_arbiter(3000);

    let mut ports = HashSet::new();
    for i in 0..5 {
        let started = arbiter
            .start_game_server(i.to_string(), LONG_RUNNING)
            .await
            .unwrap();
        assert!(ports.insert(started.port), "port {} handed out twice", started.port);
    }

    let expected: HashSet<u16> = (7000..7005).collect();
    assert_eq!(ports, expected);

    arbiter.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_never_share_a_port() {
    let arbiter = Arc::new(test_arbiter(3000));

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let arbiter = arbiter.clone();
            tokio::spawn(async move {
                arbiter
                    .start_game_server(format!("place-{}", i), LONG_RUNNING)
                    .await
            })
        })
        .collect();

    let mut ports = HashSet::new();
    for handle in handles {
        let started = handle.await.unwrap().unwrap();
        assert!(ports.insert(started.port), "port {} handed out twice", started.port);
    }

    let games = arbiter.list_active_games().await;
    assert_eq!(games.len(), 20);
    let listed: HashSet<u16> = games.iter().map(|g| g.port).collect();
    assert_eq!(listed, ports);

    arbiter.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_kill_twice_fails_second_time() {
    let arbiter = test_arbiter(3000);
    let started = arbiter.start_game_server("42", LONG_RUNNING).await.unwrap();

    assert!(arbiter.kill_game_server(started.job_id).await.is_ok());
    assert!(matches!(
        arbiter.kill_game_server(started.job_id).await,
        Err(ArbiterError::NotFound(id)) if id == started.job_id
    ));
}

#[tokio::test]
async fn test_kill_unknown_job_leaves_registry_unchanged() {
    let arbiter = test_arbiter(3000);
    arbiter.start_game_server("42", LONG_RUNNING).await.unwrap();
    let before = arbiter.list_active_games().await;

    let unknown = Uuid::new_v4();
    assert!(matches!(
        arbiter.kill_game_server(unknown).await,
        Err(ArbiterError::NotFound(id)) if id == unknown
    ));

    assert_eq!(arbiter.list_active_games().await, before);
    assert_eq!(allocated_ports(&arbiter).await, 1);

    arbiter.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_invalid_variant_does_not_touch_registry() {
    let arbiter = test_arbiter(3000);

    let result = arbiter.start_game_server("42", 2012).await;
    assert!(matches!(result, Err(ArbiterError::InvalidVariant(2012))));

    assert!(arbiter.list_active_games().await.is_empty());
    assert_eq!(allocated_ports(&arbiter).await, 0);

    // The next start still gets the first port
    let started = arbiter.start_game_server("42", LONG_RUNNING).await.unwrap();
    assert_eq!(started.port, 7000);

    arbiter.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_spawn_failure_is_reported_and_not_registered() {
    let arbiter = test_arbiter(3000);

    let result = arbiter.start_game_server("42", MISSING_BINARY).await;
    assert!(matches!(
        result,
        Err(ArbiterError::SpawnFailure { variant: MISSING_BINARY, .. })
    ));

    assert!(arbiter.list_active_games().await.is_empty());
    assert_eq!(allocated_ports(&arbiter).await, 0);
}

#[tokio::test]
async fn test_killed_port_is_reused_after_exit() {
    let arbiter = test_arbiter(3000);

    let first = arbiter.start_game_server("42", LONG_RUNNING).await.unwrap();
    let second = arbiter.start_game_server("7", LONG_RUNNING).await.unwrap();
    arbiter.kill_game_server(first.job_id).await.unwrap();

    // The port comes back once the process is confirmed gone
    assert_eventually(
        || {
            let arbiter = &arbiter;
            async move { allocated_ports(arbiter).await == 1 }
        },
        Duration::from_secs(5),
        "killed worker's port was never released",
    )
    .await;

    let third = arbiter.start_game_server("9", LONG_RUNNING).await.unwrap();
    assert_eq!(third.port, first.port);
    assert_ne!(third.port, second.port);

    arbiter.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_port_range_exhaustion() {
    let mut config = test_config(3000);
    config.port_capacity = 2;
    let arbiter = rcc_arbiter::ArbiterService::new(&config);

    arbiter.start_game_server("1", LONG_RUNNING).await.unwrap();
    arbiter.start_game_server("2", LONG_RUNNING).await.unwrap();

    assert!(matches!(
        arbiter.start_game_server("3", LONG_RUNNING).await,
        Err(ArbiterError::PortsExhausted)
    ));
    assert_eq!(arbiter.list_active_games().await.len(), 2);

    arbiter.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_evict_player_always_succeeds() {
    let arbiter = test_arbiter(3000);
    assert!(arbiter.evict_player("1234", "42").is_ok());
    assert!(arbiter.evict_player("1234", "no-such-game").is_ok());
}

#[tokio::test]
async fn test_custom_eviction_hook_receives_request() {
    use rcc_arbiter::EvictionHook;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, String)>>);

    impl EvictionHook for Recorder {
        fn evict(&self, user_id: &str, workload_id: &str) -> rcc_arbiter::Result<()> {
            self.0
                .lock()
                .unwrap()
                .push((user_id.to_string(), workload_id.to_string()));
            Ok(())
        }
    }

    let recorder = Arc::new(Recorder::default());
    let arbiter = test_arbiter(3000).with_eviction_hook(recorder.clone());

    arbiter.evict_player("1234", "42").unwrap();

    let calls = recorder.0.lock().unwrap();
    assert_eq!(calls.as_slice(), &[("1234".to_string(), "42".to_string())]);
}
