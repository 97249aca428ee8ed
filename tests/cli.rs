use std::{
    ffi::OsStr,
    io::{BufRead, BufReader},
    process::{Child, ChildStdout, Command, Stdio},
};

use anyhow::{Context, Result};

fn spawn(name: &OsStr, serial: &str) -> Result<(Child, BufReader<ChildStdout>)> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_heartbeat"))
        .env("DEVICE_NAME", name)
        .env("DEVICE_SERIAL_NUMBER", serial)
        .env("RUST_LOG", "debug")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;
    let stdout = child.stdout.take().context("missing child stdout")?;
    Ok((child, BufReader::new(stdout)))
}

fn read_lines(reader: &mut BufReader<ChildStdout>, n: usize) -> Result<Vec<String>> {
    (0..n)
        .map(|_| {
            let mut line = String::new();
            reader.read_line(&mut line)?;
            Ok(line.trim_end_matches('\n').to_owned())
        })
        .collect()
}

#[test]
fn stdout_carries_only_heartbeat_lines() -> Result<()> {
    let (mut child, mut stdout) = spawn(OsStr::new("edge-01"), "XYZ123")?;
    let lines = read_lines(&mut stdout, 4);
    child.kill()?;
    child.wait()?;

    let lines = lines?;
    assert_eq!(lines[0], "Running on http://edge-01:8000");
    assert_eq!(lines[1], " -- Device: edge-01 Serial Number: XYZ123");
    assert!(lines[2].starts_with(" Hey Testing Reswarm @ "), "{lines:?}");
    assert_eq!(lines[3], " -- Device: edge-01 Serial Number: XYZ123");
    Ok(())
}

#[cfg(unix)]
#[test]
fn non_utf8_name_is_rendered_lossily() -> Result<()> {
    use std::os::unix::ffi::OsStrExt;

    let (mut child, mut stdout) = spawn(OsStr::from_bytes(b"edge-\xff"), "XYZ123")?;
    let lines = read_lines(&mut stdout, 2);
    child.kill()?;
    child.wait()?;

    let lines = lines?;
    assert_eq!(lines[0], "Running on http://edge-\u{FFFD}:8000");
    assert_eq!(lines[1], " -- Device: edge-\u{FFFD} Serial Number: XYZ123");
    Ok(())
}

#[cfg(unix)]
#[test]
fn sigint_exits_with_interrupted_status() -> Result<()> {
    let (mut child, mut stdout) = spawn(OsStr::new("edge-01"), "XYZ123")?;
    // The first tick means the runtime, and with it the SIGINT handler, is up.
    let lines = read_lines(&mut stdout, 3);
    let sent = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status();
    let status = child.wait()?;

    lines?;
    assert!(sent?.success());
    assert_eq!(status.code(), Some(130));
    Ok(())
}
