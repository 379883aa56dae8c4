//! End-to-end dispatcher tests against scripted stand-in tools.
//!
//! The settings tool paths point at shell scripts in a tempdir, so the
//! full validate → spawn → stream → reap pipeline runs without real
//! network probes.

#![cfg(unix)]

use lg_common::{Error, ProbeKind, ProbeRequest};
use lg_config::{EgressLink, Settings, ToolPaths};
use lg_core::dispatch::ProbeDispatcher;
use lg_core::{OutputLine, ProbeStatus};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};

fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path.to_string_lossy().into_owned()
}

fn settings_with(tools: ToolPaths) -> Settings {
    Settings {
        links: vec![EgressLink {
            name: "default".into(),
            ipv4: Some("198.51.100.14".parse().unwrap()),
            ipv6: None,
        }],
        tools,
        ..Settings::default()
    }
}

fn raw_text(line: &OutputLine) -> String {
    String::from_utf8_lossy(&line.raw).into_owned()
}

/// Poll until the pid (and hence its group) is gone.
fn assert_eventually_dead(pid: i32) {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        if !alive {
            return;
        }
        if Instant::now() > deadline {
            panic!("pid {pid} still alive after dispatch returned");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn test_ping_completes_with_bound_source() {
    let dir = tempfile::tempdir().unwrap();
    let ping = write_script(
        dir.path(),
        "ping",
        r#"echo "ARGS: $@"
for i in 1 2 3 4; do echo "64 bytes from 8.8.8.8: icmp_seq=$i ttl=118 time=4.2 ms"; done
echo "4 packets transmitted, 4 received, 0% packet loss""#,
    );
    let settings = settings_with(ToolPaths {
        ping,
        ..ToolPaths::default()
    });
    let chunk = settings.chunk_bytes;
    let dispatcher = ProbeDispatcher::new(settings);

    let mut lines: Vec<OutputLine> = Vec::new();
    let request = ProbeRequest::new("8.8.8.8", 0, ProbeKind::Ping);
    let status = dispatcher.run(&request, &mut lines).unwrap();

    assert_eq!(status, ProbeStatus::Completed);
    assert_eq!(lines.len(), 6, "arg echo + 4 replies + summary");
    assert!(
        raw_text(&lines[0]).contains("-I 198.51.100.14 -c 4 -w 15 8.8.8.8"),
        "link 0 source binding and termination flags: {}",
        raw_text(&lines[0])
    );
    for line in &lines {
        assert_eq!(line.display.len(), chunk);
    }
    assert!(lines[1].display.contains("64 bytes from 8.8.8.8"));
}

#[test]
fn test_traceroute_aborts_and_reaps() {
    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("pid");
    let childfile = dir.path().join("child");
    let traceroute = write_script(
        dir.path(),
        "traceroute",
        &format!(
            r#"echo $$ > {pid}
sleep 60 &
echo $! > {child}
echo "traceroute to 192.0.78.12 (192.0.78.12), 30 hops max"
echo " 1  gw (203.0.113.1)  0.3 ms"
echo " 2  * * *"
echo " 3  * * *"
echo " 4  * * *"
echo " 5  * * *"
while :; do sleep 1; done"#,
            pid = pidfile.display(),
            child = childfile.display()
        ),
    );
    let settings = settings_with(ToolPaths {
        traceroute,
        ..ToolPaths::default()
    });
    let dispatcher = ProbeDispatcher::new(settings);

    let mut lines: Vec<OutputLine> = Vec::new();
    let request = ProbeRequest::new("192.0.78.12", 0, ProbeKind::Traceroute);
    let status = dispatcher.run(&request, &mut lines).unwrap();

    assert_eq!(status, ProbeStatus::AbortedTimeouts);
    let last = &lines.last().unwrap().display;
    assert!(last.contains("-- Traceroute timed out --"));
    let notices = lines
        .iter()
        .filter(|l| l.display.contains("-- Traceroute timed out --"))
        .count();
    assert_eq!(notices, 1);

    // Neither the tool nor its forked worker survives the dispatch.
    let pid: i32 = fs::read_to_string(&pidfile).unwrap().trim().parse().unwrap();
    let child: i32 = fs::read_to_string(&childfile)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eventually_dead(pid);
    assert_eventually_dead(child);
}

#[test]
fn test_family_mismatch_rejected_mid_stream() {
    let dir = tempfile::tempdir().unwrap();
    let ping = write_script(
        dir.path(),
        "ping",
        r#"echo "ping: cannot resolve target: Name or service not known" >&2
exit 2"#,
    );
    let settings = settings_with(ToolPaths {
        ping,
        ..ToolPaths::default()
    });
    let dispatcher = ProbeDispatcher::new(settings);

    let mut lines: Vec<OutputLine> = Vec::new();
    let request = ProbeRequest::new("8.8.8.8", 0, ProbeKind::Ping);
    let status = dispatcher.run(&request, &mut lines).unwrap();

    assert_eq!(status, ProbeStatus::Rejected);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].display.contains("Unauthorized request"));
}

#[test]
fn test_spawn_failure_surfaces() {
    let settings = settings_with(ToolPaths {
        ping: "/nonexistent/ping".into(),
        ..ToolPaths::default()
    });
    let dispatcher = ProbeDispatcher::new(settings);

    let mut lines: Vec<OutputLine> = Vec::new();
    let request = ProbeRequest::new("8.8.8.8", 0, ProbeKind::Ping);
    let err = dispatcher.run(&request, &mut lines).unwrap_err();

    assert!(matches!(err, Error::Spawn { .. }));
    assert!(lines.is_empty(), "no partial output on spawn failure");
}

#[test]
fn test_invalid_target_never_spawns() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("spawned");
    let ping = write_script(
        dir.path(),
        "ping",
        &format!("touch {}", marker.display()),
    );
    let settings = settings_with(ToolPaths {
        ping,
        ..ToolPaths::default()
    });
    let dispatcher = ProbeDispatcher::new(settings);

    let mut lines: Vec<OutputLine> = Vec::new();
    // Private range: validator rejects before any process exists.
    let request = ProbeRequest::new("192.168.1.1", 0, ProbeKind::Ping);
    let err = dispatcher.run(&request, &mut lines).unwrap_err();

    assert!(matches!(err, Error::InvalidTarget(_)));
    assert!(!marker.exists(), "runner was invoked for a rejected target");
}

#[test]
fn test_v6_kind_with_v4_literal_never_spawns() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("spawned");
    let ping = write_script(
        dir.path(),
        "ping",
        &format!("touch {}", marker.display()),
    );
    let settings = settings_with(ToolPaths {
        ping,
        ..ToolPaths::default()
    });
    let dispatcher = ProbeDispatcher::new(settings);

    let mut lines: Vec<OutputLine> = Vec::new();
    let request = ProbeRequest::new("8.8.8.8", 0, ProbeKind::Ping6);
    let err = dispatcher.run(&request, &mut lines).unwrap_err();

    assert!(matches!(err, Error::InvalidTarget(_)));
    assert!(!marker.exists());
}

#[test]
fn test_kind_outside_allow_list_rejected() {
    let mut settings = settings_with(ToolPaths::default());
    settings.allowed = vec![ProbeKind::Ping];
    let dispatcher = ProbeDispatcher::new(settings);

    let mut lines: Vec<OutputLine> = Vec::new();
    let request = ProbeRequest::new("8.8.8.8", 0, ProbeKind::Mtr);
    let err = dispatcher.run(&request, &mut lines).unwrap_err();
    assert!(matches!(err, Error::KindNotAllowed(_)));
}

#[test]
fn test_unknown_link_rejected() {
    let settings = settings_with(ToolPaths::default());
    let dispatcher = ProbeDispatcher::new(settings);

    let mut lines: Vec<OutputLine> = Vec::new();
    let request = ProbeRequest::new("8.8.8.8", 5, ProbeKind::Ping);
    let err = dispatcher.run(&request, &mut lines).unwrap_err();
    assert!(matches!(err, Error::UnknownLink(5)));
}

#[test]
fn test_completed_run_leaves_nothing_running() {
    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("pid");
    let mtr = write_script(
        dir.path(),
        "mtr",
        &format!(
            r#"echo $$ > {pid}
echo "HOST: lg1              Loss%   Snt   Last   Avg  Best  Wrst StDev"
echo "1. gateway             0.0%    10    0.4   0.4   0.3   0.5   0.0"
echo "2. upstream            0.0%    10    1.1   1.2   1.0   1.6   0.2""#,
            pid = pidfile.display()
        ),
    );
    let settings = settings_with(ToolPaths {
        mtr,
        ..ToolPaths::default()
    });
    let dispatcher = ProbeDispatcher::new(settings);

    let mut lines: Vec<OutputLine> = Vec::new();
    let request = ProbeRequest::new("8.8.8.8", 0, ProbeKind::Mtr);
    let status = dispatcher.run(&request, &mut lines).unwrap();

    assert_eq!(status, ProbeStatus::Completed);
    assert!(lines[1].display.starts_with("&nbsp;&nbsp;1. "));
    let pid: i32 = fs::read_to_string(&pidfile).unwrap().trim().parse().unwrap();
    assert_eventually_dead(pid);
}
