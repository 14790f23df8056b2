#![cfg(unix)]

use std::{
	fs,
	path::{Path, PathBuf},
	time::{Duration, Instant},
};

use handover_supervisor::{
	generation::{Command, ProcessEnd, Slot},
	socket::{PreparedSockets, SocketSpec},
	supervisor::Supervisor,
	CriticalError,
};
use tempfile::TempDir;
use tokio::time::sleep;

fn sockets(n: usize) -> PreparedSockets {
	let specs: Vec<SocketSpec> = (0..n)
		.map(|_| SocketSpec {
			addr: "127.0.0.1:0".parse().unwrap(),
		})
		.collect();
	PreparedSockets::prepare(&specs).unwrap()
}

fn sh(script: String) -> Command {
	Command {
		prog: "sh".into(),
		args: vec!["-c".into(), script.into()],
	}
}

/// A child which logs `<pid> <fd>` and then waits for `stop.<pid>` to appear.
fn logged_waiter(dir: &Path) -> Command {
	sh(format!(
		"cd {dir} && echo $$ $HANDOVER_FD0 >> log && while [ ! -f stop.$$ ]; do sleep 0.1; done",
		dir = dir.display(),
	))
}

fn log_path(dir: &TempDir) -> PathBuf {
	dir.path().join("log")
}

fn release(dir: &TempDir, pid: &str) {
	fs::File::create(dir.path().join(format!("stop.{pid}"))).unwrap();
}

async fn wait_for_content(path: &Path, pred: impl Fn(&str) -> bool) -> String {
	let deadline = Instant::now() + Duration::from_secs(10);
	loop {
		let content = fs::read_to_string(path).unwrap_or_default();
		if pred(&content) {
			return content;
		}
		assert!(
			Instant::now() < deadline,
			"timed out waiting on {path:?}, last content: {content:?}"
		);
		sleep(Duration::from_millis(50)).await;
	}
}

async fn wait_for_lines(path: &Path, n: usize) -> Vec<(String, String)> {
	wait_for_content(path, |content| content.lines().count() >= n)
		.await
		.lines()
		.map(|line| {
			let mut words = line.split_whitespace();
			(
				words.next().unwrap_or_default().to_string(),
				words.next().unwrap_or_default().to_string(),
			)
		})
		.collect()
}

#[tokio::test]
async fn active_exit_is_fatal() {
	let sup = Supervisor::new(sh("exit 7".into()), sockets(1));

	match sup.run().await {
		Err(CriticalError::ActiveExit { slot, status }) => {
			assert_eq!(slot, Slot::A);
			assert_eq!(status, ProcessEnd::ExitError(7));
		}
		other => panic!("expected an active-exit error, got {other:?}"),
	}
}

#[tokio::test]
async fn spawn_failure_is_fatal() {
	let sup = Supervisor::new(
		Command {
			prog: "/does/not/exist".into(),
			args: Vec::new(),
		},
		sockets(1),
	);

	match sup.run().await {
		Err(CriticalError::Spawn { slot, .. }) => assert_eq!(slot, Slot::A),
		other => panic!("expected a spawn error, got {other:?}"),
	}
}

#[tokio::test]
async fn children_receive_descriptor_envs() {
	let dir = TempDir::new().unwrap();
	let log = log_path(&dir);
	let sup = Supervisor::new(
		sh(format!(
			"echo $HANDOVER_FD0 $HANDOVER_FD1 > {}",
			log.display(),
		)),
		sockets(2),
	);

	// both listen addresses are unused by the child, so its exit is an
	// unexpected active exit
	match sup.run().await {
		Err(CriticalError::ActiveExit { slot, status }) => {
			assert_eq!(slot, Slot::A);
			assert_eq!(status, ProcessEnd::Success);
		}
		other => panic!("expected an active-exit error, got {other:?}"),
	}

	let content = fs::read_to_string(&log).unwrap();
	let fds: Vec<i32> = content
		.split_whitespace()
		.map(|word| word.parse().unwrap())
		.collect();
	assert_eq!(fds.len(), 2, "child saw both descriptor variables");
	assert_ne!(fds[0], fds[1]);
}

#[tokio::test]
async fn descriptors_stable_across_generations() {
	let dir = TempDir::new().unwrap();
	let log = log_path(&dir);
	let sup = Supervisor::new(logged_waiter(dir.path()), sockets(1));
	let handle = sup.handle();
	let task = tokio::spawn(sup.run());

	let lines = wait_for_lines(&log, 1).await;
	let (pid1, fd1) = lines[0].clone();

	handle.reload().await;
	let lines = wait_for_lines(&log, 2).await;
	let (pid2, fd2) = lines[1].clone();

	// retire the first generation so the next reload is accepted
	release(&dir, &pid1);
	sleep(Duration::from_millis(500)).await;

	handle.reload().await;
	let lines = wait_for_lines(&log, 3).await;
	let (pid3, fd3) = lines[2].clone();

	assert_ne!(pid1, pid2);
	assert_ne!(pid2, pid3);
	assert_eq!(fd1, fd2, "generation 2 inherited the same descriptor");
	assert_eq!(fd2, fd3, "generation 3 inherited the same descriptor");

	release(&dir, &pid2);
	sleep(Duration::from_millis(300)).await;
	handle.terminate().await;
	task.await.unwrap().unwrap();
}

#[tokio::test]
async fn overlapping_reload_is_dropped() {
	let dir = TempDir::new().unwrap();
	let log = log_path(&dir);
	let sup = Supervisor::new(logged_waiter(dir.path()), sockets(1));
	let handle = sup.handle();
	let task = tokio::spawn(sup.run());

	let lines = wait_for_lines(&log, 1).await;
	let (pid1, _) = lines[0].clone();

	handle.reload().await;
	handle.reload().await;
	handle.reload().await;

	sleep(Duration::from_millis(700)).await;
	let lines = wait_for_lines(&log, 2).await;
	assert_eq!(
		lines.len(),
		2,
		"only one reload proceeded while the first was in flight"
	);

	release(&dir, &pid1);
	sleep(Duration::from_millis(300)).await;
	handle.terminate().await;
	task.await.unwrap().unwrap();
}

#[tokio::test]
async fn terminate_stops_active_generation() {
	let sup = Supervisor::new(sh("exec sleep 30".into()), sockets(1));
	let handle = sup.handle();
	let task = tokio::spawn(sup.run());

	sleep(Duration::from_millis(300)).await;
	let begun = Instant::now();
	handle.terminate().await;

	task.await.unwrap().unwrap();
	assert!(
		begun.elapsed() < Duration::from_secs(10),
		"active generation was stopped rather than waited out"
	);
}

#[tokio::test]
async fn kill_stops_active_without_terminating() {
	let sup = Supervisor::new(sh("exec sleep 30".into()), sockets(1));
	let handle = sup.handle();
	let task = tokio::spawn(sup.run());

	sleep(Duration::from_millis(300)).await;
	handle.kill().await;

	match task.await.unwrap() {
		Err(CriticalError::ActiveExit { slot, status }) => {
			assert_eq!(slot, Slot::A);
			assert_eq!(status, ProcessEnd::ExitSignal(15));
		}
		other => panic!("expected an active-exit error, got {other:?}"),
	}
}

#[tokio::test]
async fn outgoing_generation_stopped_only_after_overlap() {
	let dir = TempDir::new().unwrap();
	let log = log_path(&dir);
	let script = format!(
		"cd {dir} && echo start >> log && trap 'echo stopped >> log; exit 0' TERM && while :; do sleep 0.1; done",
		dir = dir.path().display(),
	);
	let sup = Supervisor::new(sh(script), sockets(1));
	let handle = sup.handle();
	let task = tokio::spawn(sup.run());

	wait_for_content(&log, |c| c.contains("start")).await;
	let reloaded = Instant::now();
	handle.reload().await;
	wait_for_content(&log, |c| c.lines().filter(|l| *l == "start").count() >= 2).await;

	// well within the overlap window: the outgoing generation is untouched
	sleep(Duration::from_secs(4).saturating_sub(reloaded.elapsed())).await;
	let content = fs::read_to_string(&log).unwrap();
	assert!(
		!content.contains("stopped"),
		"no stop before the overlap window elapsed: {content:?}"
	);

	// past the window: exactly one stop was delivered
	wait_for_content(&log, |c| c.contains("stopped")).await;
	assert!(
		reloaded.elapsed() >= Duration::from_secs(5),
		"stop arrived no earlier than the overlap window"
	);
	sleep(Duration::from_millis(500)).await;
	let content = fs::read_to_string(&log).unwrap();
	assert_eq!(
		content.lines().filter(|l| *l == "stopped").count(),
		1,
		"the outgoing generation was stopped exactly once"
	);

	handle.terminate().await;
	task.await.unwrap().unwrap();
}
