mod common;

use common::{address, credentials, test_config, TestNetwork};

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use hv_core::{
	messages::Notification,
	notify::{NotifyProcessContext, SendNotificationsStep},
	queue::USER_PROFILE_TASK_DOMAIN,
	Error,
};
use hv_p2p::PeerBehavior;
use hv_process::{IntoComponent, ProcessError, SequentialProcess};
use tokio::time::Instant;
use tracing_test::traced_test;

#[tokio::test(start_paused = true)]
#[traced_test]
async fn canceled_notifications_stop_retrying() {
	let mut config = test_config();
	config.network.max_message_send_attempts = 5;
	config.network.send_retry_backoff_ms = 1_000;
	let net = TestNetwork::with_config(config);
	let alice = credentials("alice");

	let laptop = net.device(1);
	let phone = net.device(2);
	laptop.register(&alice).await.unwrap();
	laptop.login(&alice).await.unwrap();
	phone.login(&alice).await.unwrap();

	net.network
		.set_behavior(address(2).peer_id, PeerBehavior::Unreachable);

	let context = NotifyProcessContext::new(net.services(9), laptop.session().unwrap());
	let handle = SequentialProcess::named("NotifyProcess")
		.with(SendNotificationsStep::new(
			Arc::clone(&context),
			Notification::ProfileChanged,
			["alice"],
		))
		.into_component()
		.start();

	// Between the first and the second retry
	tokio::time::sleep(Duration::from_millis(1_500)).await;

	let canceled_at = Instant::now();
	handle.cancel("user gave up");
	let res = handle.wait(Duration::from_secs(60)).await;

	assert!(matches!(res, Err(ProcessError::Canceled(_))), "{res:?}");
	assert!(canceled_at.elapsed() < Duration::from_millis(100));
	assert!(logs_contain("Canceled while notifying"));
}

#[tokio::test]
#[traced_test]
async fn failed_queue_drain_takes_the_login_back() {
	let net = TestNetwork::new();
	let alice = credentials("alice");

	let tasks = net.flaky_store(USER_PROFILE_TASK_DOMAIN);
	let laptop = net.device_with_store(1, Arc::clone(&tasks) as _);
	laptop.register(&alice).await.unwrap();

	// The only device is the master and drains the queue as part of its login
	tasks.set_failing(true);
	let res = laptop.login(&alice).await;

	assert!(matches!(res, Err(Error::RetriesExhausted { .. })), "{res:?}");
	assert!(!laptop.is_logged_in());
	assert!(net.locations("alice").await.is_empty());

	tasks.set_failing(false);
	laptop.login(&alice).await.unwrap();
	assert_eq!(net.locations("alice").await, BTreeSet::from([address(1)]));
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn timed_out_login_leaves_no_trace() {
	let mut config = test_config();
	config.process.wait_timeout_ms = 1_000;
	let net = TestNetwork::with_config(config);
	let alice = credentials("alice");

	let tasks = net.flaky_store(USER_PROFILE_TASK_DOMAIN);
	let laptop = net.device_with_store(1, Arc::clone(&tasks) as _);
	laptop.register(&alice).await.unwrap();

	// The queue drain outlives the wait, after the device already joined the locations
	tasks.set_stall(Some(Duration::from_secs(5)));
	let res = laptop.login(&alice).await;

	assert!(
		matches!(res, Err(Error::Process(ProcessError::Timeout { .. }))),
		"{res:?}"
	);
	assert!(!laptop.is_logged_in());
	assert!(net.locations("alice").await.is_empty());

	tokio::time::sleep(Duration::from_secs(10)).await;
	assert!(net.locations("alice").await.is_empty());
}

#[tokio::test]
#[traced_test]
async fn concurrent_logins_on_one_device_let_one_through() {
	let net = TestNetwork::new();
	let alice = credentials("alice");

	let laptop = net.device(1);
	laptop.register(&alice).await.unwrap();

	let (first, second) = tokio::join!(laptop.login(&alice), laptop.login(&alice));

	let outcomes = [first, second];
	assert_eq!(outcomes.iter().filter(|res| res.is_ok()).count(), 1);
	assert!(outcomes
		.iter()
		.any(|res| matches!(res, Err(Error::AlreadyLoggedIn(user)) if user == "alice")));
	assert_eq!(net.locations("alice").await, BTreeSet::from([address(1)]));
}
