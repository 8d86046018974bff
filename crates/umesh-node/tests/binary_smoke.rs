//! Smoke test for the `umesh-node` binary.

#[cfg(unix)]
#[test]
fn binary_starts_and_stops_cleanly() {
    use std::io::{BufRead, BufReader};
    use std::process::{Command, Stdio};

    let bin = env!("CARGO_BIN_EXE_umesh-node");

    let config_content = b"[node]\nuuid = \"0102030405060708\"\n\n[storage]\nenable = false\n\n[[radios]]\nmedia = \"ble\"\nmac = \"02:00:00:00:00:01\"\n";
    let mut config_file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut config_file, config_content).unwrap();

    // tracing_subscriber writes to stdout by default
    let stdout_file = tempfile::NamedTempFile::new().unwrap();
    let stdout_writer = stdout_file.reopen().unwrap();

    let child = Command::new(bin)
        .args(["--config", config_file.path().to_str().unwrap(), "--log-format", "json"])
        .env("RUST_LOG", "info")
        .stdout(Stdio::from(stdout_writer))
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn umesh-node");

    let pid = child.id();
    std::thread::sleep(std::time::Duration::from_millis(500));

    Command::new("kill")
        .args(["-INT", &pid.to_string()])
        .status()
        .expect("failed to send SIGINT");

    // Hard kill if the node hangs on shutdown.
    let guard = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_secs(5));
        let _ = Command::new("kill").args(["-9", &pid.to_string()]).status();
    });

    let output = child.wait_with_output().expect("failed to wait on child");
    drop(guard);

    assert!(
        output.status.success(),
        "expected exit code 0, got {:?}",
        output.status.code()
    );

    let stdout_content = std::fs::read_to_string(stdout_file.path()).unwrap();
    let lines: Vec<String> = BufReader::new(stdout_content.as_bytes())
        .lines()
        .map_while(Result::ok)
        .collect();
    assert!(
        lines.iter().any(|l| l.starts_with('{')),
        "expected at least one JSON log line, got: {stdout_content}"
    );
    assert!(
        lines.iter().any(|l| l.contains("node started")),
        "expected a startup line, got: {stdout_content}"
    );
}

#[test]
fn binary_rejects_missing_config() {
    let bin = env!("CARGO_BIN_EXE_umesh-node");
    let output = std::process::Command::new(bin)
        .args(["--config", "/nonexistent/umesh.toml"])
        .output()
        .expect("failed to run umesh-node");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load config"), "stderr: {stderr}");
}
