use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use std::path::Path;
use tempfile::{tempdir, TempDir};

/// Writes a config pointing at a drop directory nobody listens on, with archive,
/// staging and database inside `root`.
fn write_config(root: &Path) -> std::path::PathBuf {
    let archive = root.join("archive");
    std::fs::create_dir_all(&archive).expect("create archive dir");
    let config_path = root.join("settlement-sync.yaml");
    let yaml = format!(
        "remote:\n  host: 127.0.0.1\n  port: 1\narchive_dir: {}\nstaging_dir: {}\ndatabase:\n  url: \"sqlite://{}?mode=rwc\"\n",
        archive.display(),
        root.join("staging").display(),
        root.join("ledger.db").display(),
    );
    write(&config_path, yaml).expect("Writing temp config failed");
    config_path
}

fn command(root: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("settlement-sync").expect("Binary exists");
    cmd.current_dir(root.path())
        .env("DROP_USER", "settlement")
        .env("DROP_PASSWORD", "secret")
        .env_remove("DATABASE_URL")
        .env("RUST_LOG", "info");
    cmd
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("settlement-sync")
        .expect("Binary exists")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sync").and(predicate::str::contains("plan")));
}

#[test]
fn missing_config_file_fails() {
    let root = tempdir().unwrap();
    command(&root)
        .arg("sync")
        .arg("--config")
        .arg(root.path().join("absent.yaml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn missing_credentials_fail_before_connecting() {
    let root = tempdir().unwrap();
    let config = write_config(root.path());
    command(&root)
        .env_remove("DROP_PASSWORD")
        .arg("sync")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("DROP_PASSWORD"));
    assert!(!root.path().join("ledger.db").exists());
}

#[test]
fn sync_with_unreachable_remote_completes_and_reports() {
    let root = tempdir().unwrap();
    let config = write_config(root.path());
    command(&root)
        .arg("sync")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"remote_available\": false")
                .and(predicate::str::contains("\"files\": []")),
        );
    assert!(root.path().join("ledger.db").exists());
    assert!(root.path().join("staging").is_dir());
}

#[test]
fn plan_with_unreachable_remote_prints_empty_plan() {
    let root = tempdir().unwrap();
    let config = write_config(root.path());
    command(&root)
        .arg("plan")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"remote_available\": false")
                .and(predicate::str::contains("\"to_process\": []")),
        );
    assert!(!root.path().join("staging").exists());
    assert!(!root.path().join("ledger.db").exists());
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*; // needed for .with()
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use settlement_sync::cli::{run, Cli, Commands};

    // The config does not exist, so the run stops right after start-up.
    let cli = Cli {
        command: Commands::Plan {
            config: std::path::PathBuf::from("dummy.yaml"),
        },
    };

    let result = run(cli).await;
    assert!(result.is_err());

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
