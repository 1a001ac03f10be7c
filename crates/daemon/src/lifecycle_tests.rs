// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> Config {
    let state_dir = dir.path().to_path_buf();
    Config {
        socket_path: state_dir.join("daemon.sock"),
        lock_path: state_dir.join("daemon.pid"),
        version_path: state_dir.join("daemon.version"),
        log_path: state_dir.join("daemon.log"),
        tasks_dir: state_dir.join("tasks"),
        state_dir,
    }
}

#[tokio::test]
async fn startup_creates_socket_lock_and_version() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let result = startup(&config).await.unwrap();
    assert!(config.socket_path.exists());
    assert!(config.lock_path.exists());
    assert_eq!(
        std::fs::read_to_string(&config.version_path).unwrap(),
        env!("CARGO_PKG_VERSION")
    );
    let pid: u32 = std::fs::read_to_string(&config.lock_path)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(pid, std::process::id());

    drop(result);
}

#[tokio::test]
async fn second_startup_fails_with_lock_held() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let _first = startup(&config).await.unwrap();
    let err = startup(&config).await.unwrap_err();
    assert!(matches!(err, LifecycleError::LockFailed(_)));

    // The running daemon's files must be left alone.
    assert!(config.socket_path.exists());
    assert!(config.lock_path.exists());
}

#[tokio::test]
async fn shutdown_removes_state_files() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let StartupResult {
        mut daemon,
        listener,
    } = startup(&config).await.unwrap();
    drop(listener);

    daemon.shutdown(SHUTDOWN_DEADLINE).await;
    assert!(!config.socket_path.exists());
    assert!(!config.lock_path.exists());
    assert!(!config.version_path.exists());
    assert!(daemon.shutting_down.load(Ordering::SeqCst));
}

#[tokio::test]
async fn shutdown_meets_deadline_with_stubborn_child() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let StartupResult {
        mut daemon,
        listener,
    } = startup(&config).await.unwrap();
    drop(listener);

    daemon
        .procs
        .start(spot_core::ProcessSpec {
            id: "stubborn".to_string(),
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "trap '' TERM; while :; do sleep 1; done".to_string(),
            ],
            cwd: None,
            env: Default::default(),
            mode: Default::default(),
            raw: true,
            project_path: None,
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    daemon.shutdown(SHUTDOWN_DEADLINE).await;
    assert!(
        started.elapsed() <= SHUTDOWN_DEADLINE + Duration::from_secs(2),
        "shutdown took {:?}",
        started.elapsed()
    );
    assert_eq!(daemon.procs.count_active(), 0);
}

#[tokio::test]
async fn stale_socket_is_replaced_on_startup() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    // Leftover socket file from a crashed daemon.
    std::fs::create_dir_all(&config.state_dir).unwrap();
    std::fs::write(&config.socket_path, b"").unwrap();

    let result = startup(&config).await.unwrap();
    assert!(config.socket_path.exists());
    drop(result);
}

#[tokio::test]
async fn scheduler_state_survives_restart_cycle() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    {
        let StartupResult {
            mut daemon,
            listener,
        } = startup(&config).await.unwrap();
        drop(listener);
        daemon
            .scheduler
            .schedule("s1", Duration::from_secs(300), "later", None)
            .unwrap();
        daemon.shutdown(SHUTDOWN_DEADLINE).await;
    }

    let StartupResult { daemon, listener } = startup(&config).await.unwrap();
    drop(listener);
    assert_eq!(daemon.scheduler.count_pending(), 1);
}
