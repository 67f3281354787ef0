use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use labsync_api::{ExporterConfigTemplate, ExporterConfigTemplateSpec, ExporterMetadata};
use labsync_exec::{CommandResult, ExecError, RemoteExecutor};
use labsync_host::remote::SERVICE_TIMEOUT;
use labsync_host::*;

/// Executor backed by an in-memory file system and scripted command results
#[derive(Default)]
struct FakeHost {
    files: Mutex<HashMap<String, Vec<u8>>>,
    scripted: Mutex<HashMap<String, CommandResult>>,
    hanging: Mutex<Vec<String>>,
    commands: Mutex<Vec<String>>,
    deadlines: Mutex<HashMap<String, Duration>>,
}

impl FakeHost {
    fn with_file(self, path: &str, content: &str) -> Self {
        self.with_raw_file(path, content.as_bytes())
    }

    fn with_raw_file(self, path: &str, content: &[u8]) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
        self
    }

    fn script(self, cmd: &str, result: CommandResult) -> Self {
        self.scripted.lock().unwrap().insert(cmd.to_string(), result);
        self
    }

    /// Make `cmd` never return
    fn hang(self, cmd: &str) -> Self {
        self.hanging.lock().unwrap().push(cmd.to_string());
        self
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn deadline(&self, cmd: &str) -> Option<Duration> {
        self.deadlines.lock().unwrap().get(cmd).copied()
    }

    fn raw_file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    fn file(&self, path: &str) -> Option<String> {
        self.raw_file(path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    fn handle(&self, cmd: &str) -> CommandResult {
        if let Some(result) = self.scripted.lock().unwrap().get(cmd) {
            return result.clone();
        }

        let words = shell_like_split(cmd);
        if words.first().map(String::as_str) == Some("test") && words.len() >= 3 {
            return match self.files.lock().unwrap().get(&words[2]) {
                Some(content) => CommandResult::ok(STANDARD.encode(content)),
                None => CommandResult::failed(1, ""),
            };
        }
        if let Some(pos) = words.iter().position(|w| w == "printf") {
            let encoded = &words[pos + 2];
            let path = words.last().unwrap().clone();
            let content = STANDARD.decode(encoded).unwrap();
            self.files.lock().unwrap().insert(path, content);
            return CommandResult::ok("");
        }
        CommandResult::ok("")
    }
}

fn shell_like_split(cmd: &str) -> Vec<String> {
    cmd.split_whitespace()
        .map(|w| w.trim_matches('\'').to_string())
        .collect()
}

#[async_trait]
impl RemoteExecutor for FakeHost {
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.commands.lock().unwrap().push(cmd.to_string());
        Ok(self.handle(cmd))
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        self.deadlines
            .lock()
            .unwrap()
            .insert(cmd.to_string(), timeout);
        let hangs = self.hanging.lock().unwrap().iter().any(|c| c == cmd);
        if hangs {
            self.commands.lock().unwrap().push(cmd.to_string());
            let _ = tokio::time::timeout(timeout, std::future::pending::<()>()).await;
            return Err(ExecError::Timeout { timeout });
        }
        self.run(cmd).await
    }

    fn executor_type(&self) -> &'static str {
        "fake"
    }
}

struct Unreachable;

#[async_trait]
impl RemoteExecutor for Unreachable {
    async fn run(&self, _cmd: &str) -> Result<CommandResult, ExecError> {
        Err(ExecError::ConnectionFailed("no route to host".to_string()))
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        _timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        self.run(cmd).await
    }

    async fn connect(&self) -> Result<(), ExecError> {
        Err(ExecError::ConnectionFailed("no route to host".to_string()))
    }

    fn executor_type(&self) -> &'static str {
        "unreachable"
    }
}

fn template(config: &str, container: &str) -> ExporterConfigTemplate {
    ExporterConfigTemplate::new(
        "sidekick",
        ExporterConfigTemplateSpec {
            exporter_metadata: ExporterMetadata {
                name: "rig-1".to_string(),
                ..ExporterMetadata::default()
            },
            config_template: config.to_string(),
            systemd_container_template: container.to_string(),
            ..ExporterConfigTemplateSpec::default()
        },
    )
}

const CONFIG_PATH: &str = "/etc/jumpstarter/exporters/rig-1.yaml";
const UNIT_PATH: &str = "/etc/containers/systemd/rig-1.container";

fn session(fake: &Arc<FakeHost>) -> (RemoteHostSession, LogSink) {
    let mut session = RemoteHostSession::new("host-a", Arc::clone(fake) as Arc<dyn RemoteExecutor>);
    let sink = LogSink::new();
    session.set_writer(sink.clone());
    (session, sink)
}

#[tokio::test]
async fn test_apply_creates_files_and_restarts() {
    let fake = Arc::new(FakeHost::default());
    let (session, sink) = session(&fake);

    let changed = session
        .apply(&template("token: abc\n", "[Container]\n"), false)
        .await
        .unwrap();

    assert!(changed);
    assert_eq!(fake.file(CONFIG_PATH).as_deref(), Some("token: abc\n"));
    assert_eq!(fake.file(UNIT_PATH).as_deref(), Some("[Container]\n"));

    let commands = fake.commands();
    assert!(commands.contains(&"systemctl daemon-reload".to_string()));
    assert!(commands.contains(&"systemctl start rig-1".to_string()));
    assert!(commands.contains(&"systemctl restart rig-1".to_string()));
    assert!(sink.contents().contains("Created file: /etc/jumpstarter/exporters/rig-1.yaml"));
}

#[tokio::test]
async fn test_apply_unchanged_is_noop() {
    let fake = Arc::new(
        FakeHost::default()
            .with_file(CONFIG_PATH, "token: abc\n")
            .with_file(UNIT_PATH, "[Container]\n"),
    );
    let (session, sink) = session(&fake);

    let changed = session
        .apply(&template("token: abc\n", "[Container]\n"), false)
        .await
        .unwrap();

    assert!(!changed);
    assert!(!fake.commands().iter().any(|c| c.starts_with("systemctl")));
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_apply_config_only_change_restarts() {
    let fake = Arc::new(
        FakeHost::default()
            .with_file(CONFIG_PATH, "token: old\n")
            .with_file(UNIT_PATH, "[Container]\n"),
    );
    let (session, _sink) = session(&fake);

    assert!(
        session
            .apply(&template("token: new\n", "[Container]\n"), false)
            .await
            .unwrap()
    );
    assert_eq!(fake.file(CONFIG_PATH).as_deref(), Some("token: new\n"));
    assert!(fake.commands().contains(&"systemctl restart rig-1".to_string()));
}

#[tokio::test]
async fn test_apply_dry_run_reports_without_mutating() {
    let fake = Arc::new(FakeHost::default().with_file(CONFIG_PATH, "token: old\n"));
    let (session, sink) = session(&fake);

    let changed = session
        .apply(&template("token: new\n", "[Container]\n"), true)
        .await
        .unwrap();

    assert!(changed);
    assert_eq!(fake.file(CONFIG_PATH).as_deref(), Some("token: old\n"));
    assert!(fake.file(UNIT_PATH).is_none());
    assert!(!fake.commands().iter().any(|c| c.starts_with("systemctl") || c.contains("base64 -d")));

    let log = sink.contents();
    assert!(log.contains("Would update file: /etc/jumpstarter/exporters/rig-1.yaml"));
    assert!(log.contains("Would create file: /etc/containers/systemd/rig-1.container"));
}

#[tokio::test]
async fn test_apply_skips_empty_container_template() {
    let fake = Arc::new(FakeHost::default());
    let (session, _sink) = session(&fake);

    session.apply(&template("a: b\n", ""), false).await.unwrap();

    assert!(fake.file(UNIT_PATH).is_none());
    assert!(!fake.commands().iter().any(|c| c.contains(UNIT_PATH)));
}

#[tokio::test]
async fn test_apply_requires_service_name() {
    let fake = Arc::new(FakeHost::default());
    let (session, _sink) = session(&fake);
    let mut config = template("a: b\n", "");
    config.spec.exporter_metadata.name.clear();

    let err = session.apply(&config, false).await.unwrap_err();
    assert!(matches!(err, HostError::Config { .. }));
}

#[tokio::test]
async fn test_failed_restart_is_reported() {
    let fake = Arc::new(
        FakeHost::default().script("systemctl daemon-reload", CommandResult::failed(1, "denied")),
    );
    let (session, _sink) = session(&fake);

    let err = session
        .apply(&template("a: b\n", ""), false)
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::CommandFailed { ref command, .. } if command == "systemctl daemon-reload"));
}

#[tokio::test]
async fn test_bootc_absent() {
    let fake = Arc::new(
        FakeHost::default().script("command -v bootc", CommandResult::failed(1, "")),
    );
    let (session, _sink) = session(&fake);

    assert!(!session.handle_bootc_upgrade(false).await.unwrap());
    assert_eq!(fake.commands(), vec!["command -v bootc".to_string()]);
}

#[tokio::test]
async fn test_bootc_in_progress_skips() {
    let fake = Arc::new(FakeHost::default().script(
        "systemctl is-active labsync-bootc-upgrade.timer",
        CommandResult::ok("active\n"),
    ));
    let (session, sink) = session(&fake);

    assert!(!session.handle_bootc_upgrade(false).await.unwrap());
    assert!(!fake.commands().iter().any(|c| c.starts_with("bootc")));
    assert!(sink.contents().contains("already in progress"));
}

#[tokio::test]
async fn test_bootc_upgrade_scheduled() {
    let fake = Arc::new(
        FakeHost::default()
            .script(
                "systemctl is-active bootc-fetch-apply-updates.service",
                CommandResult::failed(3, ""),
            )
            .script(
                "systemctl is-active labsync-bootc-upgrade.timer",
                CommandResult::failed(3, ""),
            )
            .script(
                "bootc upgrade --check",
                CommandResult::ok("Update available for: docker://quay.io/lab/os\n"),
            ),
    );
    let (session, _sink) = session(&fake);

    assert!(session.handle_bootc_upgrade(false).await.unwrap());
    assert!(fake.commands().contains(
        &"systemd-run --unit=labsync-bootc-upgrade --on-active=30s bootc upgrade --apply"
            .to_string()
    ));
}

#[tokio::test]
async fn test_bootc_dry_run_only_reports() {
    let fake = Arc::new(FakeHost::default().script(
        "bootc upgrade --check",
        CommandResult::ok("Update available for: docker://quay.io/lab/os\n"),
    ));
    let (session, sink) = session(&fake);

    assert!(session.handle_bootc_upgrade(true).await.unwrap());
    assert!(!fake.commands().iter().any(|c| c.starts_with("systemd-run")));
    assert!(sink.contents().contains("would schedule upgrade"));
}

#[tokio::test]
async fn test_bootc_check_failure_is_error() {
    let fake = Arc::new(
        FakeHost::default().script("bootc upgrade --check", CommandResult::failed(1, "registry down")),
    );
    let (session, _sink) = session(&fake);

    let err = session.handle_bootc_upgrade(false).await.unwrap_err();
    assert!(matches!(err, HostError::CommandFailed { status: 1, ref stderr, .. } if stderr == "registry down"));
}

#[tokio::test]
async fn test_unreachable_host_status() {
    let session = RemoteHostSession::new("host-b", Arc::new(Unreachable));
    let err = session.status().await.unwrap_err();

    assert!(matches!(err, HostError::Exec(ExecError::ConnectionFailed(_))));
}

#[tokio::test]
async fn test_invalid_utf8_file_is_compared_byte_exact() {
    let fake = Arc::new(
        FakeHost::default()
            .with_raw_file(CONFIG_PATH, b"token: abc\xff\n")
            .with_file(UNIT_PATH, "[Container]\n"),
    );
    let (session, _sink) = session(&fake);
    let rendered = template("token: abc\u{fffd}\n", "[Container]\n");

    // lossy decoding would make these look identical
    assert!(session.apply(&rendered, false).await.unwrap());
    assert_eq!(
        fake.raw_file(CONFIG_PATH).unwrap(),
        "token: abc\u{fffd}\n".as_bytes()
    );

    // once rewritten, the next run is a no-op
    assert!(!session.apply(&rendered, false).await.unwrap());
}

#[tokio::test]
async fn test_commands_run_with_deadlines() {
    let fake = Arc::new(FakeHost::default().script(
        "bootc upgrade --check",
        CommandResult::ok("Update available for: docker://quay.io/lab/os\n"),
    ));
    let (session, _sink) = session(&fake);

    session.apply(&template("a: b\n", ""), false).await.unwrap();
    session.handle_bootc_upgrade(false).await.unwrap();

    assert_eq!(fake.deadline(&format!("test -f {CONFIG_PATH} && base64 {CONFIG_PATH}")), Some(files::FILE_TIMEOUT));
    assert_eq!(fake.deadline("systemctl restart rig-1"), Some(SERVICE_TIMEOUT));
    assert_eq!(fake.deadline("bootc upgrade --check"), Some(bootc::CHECK_TIMEOUT));
    assert_eq!(
        fake.deadline("systemd-run --unit=labsync-bootc-upgrade --on-active=30s bootc upgrade --apply"),
        Some(SERVICE_TIMEOUT)
    );
}

#[tokio::test(start_paused = true)]
async fn test_hung_restart_times_out() {
    let fake = Arc::new(FakeHost::default().hang("systemctl restart rig-1"));
    let (session, _sink) = session(&fake);

    let err = session
        .apply(&template("a: b\n", ""), false)
        .await
        .unwrap_err();

    assert!(matches!(err, HostError::Exec(ExecError::Timeout { timeout }) if timeout == SERVICE_TIMEOUT));
}

#[tokio::test(start_paused = true)]
async fn test_hung_bootc_check_times_out() {
    let fake = Arc::new(FakeHost::default().hang("bootc upgrade --check"));
    let (session, _sink) = session(&fake);

    let err = session.handle_bootc_upgrade(false).await.unwrap_err();

    assert!(matches!(err, HostError::Exec(ExecError::Timeout { timeout }) if timeout == bootc::CHECK_TIMEOUT));
    assert!(!fake.commands().iter().any(|c| c.starts_with("systemd-run")));
}
