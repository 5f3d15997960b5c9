//! Exit codes of the `service-host` binary.

#![cfg(unix)]

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

const BIN: &str = env!("CARGO_BIN_EXE_service-host");

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn host(config: &std::path::Path) -> Command {
    let mut command = Command::new(BIN);
    command
        .arg("--config")
        .arg(config)
        .env("RUST_LOG", "service_host=info");
    command
}

/// Spawn the host and block until it logs that every server is running.
fn spawn_running(config: &std::path::Path) -> Child {
    let mut child = host(config)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let stdout = child.stdout.take().unwrap();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            let _ = tx.send(line);
        }
    });

    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(line) if line.contains("Application running") => return child,
            Ok(_) => continue,
            Err(_) => {
                let _ = child.kill();
                panic!("service-host never reported running");
            }
        }
    }
}

fn wait_exit(child: &mut Child) -> ExitStatus {
    let deadline = Instant::now() + Duration::from_secs(20);
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        thread::sleep(Duration::from_millis(50));
    }
    let _ = child.kill();
    panic!("service-host did not exit after the signal");
}

fn send(child: &Child, signal: Signal) {
    kill(Pid::from_raw(child.id() as i32), signal).unwrap();
}

const RUNNING_CONFIG: &str = r#"
[grpc]
port = 0

[exporter]
port = 0

[observability]
log_format = "json"

[services.abs]

[services.child]
parent = "abs"
"#;

#[test]
fn test_sigterm_exits_cleanly() {
    let config = write_config(RUNNING_CONFIG);
    let mut child = spawn_running(config.path());

    send(&child, Signal::SIGTERM);

    assert_eq!(wait_exit(&mut child).code(), Some(0));
}

#[test]
fn test_repeated_sigint_exits_cleanly() {
    let config = write_config(RUNNING_CONFIG);
    let mut child = spawn_running(config.path());

    send(&child, Signal::SIGINT);
    send(&child, Signal::SIGINT);

    assert_eq!(wait_exit(&mut child).code(), Some(0));
}

#[test]
fn test_missing_config_exits_with_failure() {
    let output = host(std::path::Path::new("/definitely/not/here.toml"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_unknown_service_exits_with_failure() {
    let config = write_config(
        r#"
        [grpc]
        port = 0

        [exporter]
        port = 0

        [services.nope]
        "#,
    );
    let output = host(config.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_bind_failure_exits_with_failure() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let config = write_config(
        r#"
        [exporter]
        port = 0

        [services.abs]
        "#,
    );

    let output = host(config.path())
        .arg("--grpc-port")
        .arg(port.to_string())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_unroutable_exporter_path_exits_with_failure() {
    let config = write_config(
        r#"
        [grpc]
        port = 0

        [exporter]
        port = 0
        "#,
    );
    let output = host(config.path())
        .arg("--exporter-path")
        .arg("/:metrics")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}
