mod common;

use common::{credentials, TestNetwork};

use std::{sync::Arc, time::Duration};

use hv_core::{
	messages::Notification, model::Permission, queue::USER_PROFILE_TASK_DOMAIN, Error, NodeEvent,
};
use tokio::{sync::broadcast, time::timeout};
use tracing_test::traced_test;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

async fn next_matching(
	events: &mut broadcast::Receiver<NodeEvent>,
	matches: impl Fn(&NodeEvent) -> bool,
) -> NodeEvent {
	timeout(EVENT_TIMEOUT, async {
		loop {
			let event = events.recv().await.unwrap();
			if matches(&event) {
				return event;
			}
		}
	})
	.await
	.unwrap()
}

#[tokio::test]
#[traced_test]
async fn shared_folder_reaches_the_friends_master() {
	let net = TestNetwork::new();
	let (alice, bob) = (credentials("alice"), credentials("bob"));

	let alice_laptop = net.device(1);
	let bob_laptop = net.device(2);
	alice_laptop.register(&alice).await.unwrap();
	bob_laptop.register(&bob).await.unwrap();
	alice_laptop.login(&alice).await.unwrap();
	bob_laptop.login(&bob).await.unwrap();
	assert!(bob_laptop.is_master());

	let mut bob_events = bob_laptop.subscribe();

	alice_laptop.add_folder("photos").await.unwrap();
	alice_laptop
		.share_folder("photos", "bob", Permission::Write)
		.await
		.unwrap();

	let notified = next_matching(&mut bob_events, |event| {
		matches!(event, NodeEvent::Notified { .. })
	})
	.await;
	assert_eq!(
		notified,
		NodeEvent::Notified {
			from_user: "alice".to_string(),
			notification: Notification::TaskQueued,
		}
	);

	let NodeEvent::TaskApplied(task) = next_matching(&mut bob_events, |event| {
		matches!(event, NodeEvent::TaskApplied(_))
	})
	.await
	else {
		unreachable!()
	};
	assert_eq!(task.sender, "alice");

	let shared = bob_laptop.profile().await.unwrap();
	let photos = shared.folder("photos").unwrap();
	assert_eq!(photos.shared_by.as_deref(), Some("alice"));

	let own = alice_laptop.profile().await.unwrap();
	let photos = own.folder("photos").unwrap();
	assert_eq!(photos.permissions.len(), 1);
	assert_eq!(photos.permissions[0].user_id, "bob");
	assert_eq!(photos.permissions[0].permission, Permission::Write);
}

#[tokio::test]
#[traced_test]
async fn tasks_wait_for_the_next_login() {
	let net = TestNetwork::new();
	let (alice, bob) = (credentials("alice"), credentials("bob"));

	let alice_laptop = net.device(1);
	let bob_laptop = net.device(2);
	alice_laptop.register(&alice).await.unwrap();
	bob_laptop.register(&bob).await.unwrap();
	alice_laptop.login(&alice).await.unwrap();

	alice_laptop.add_folder("music").await.unwrap();
	alice_laptop
		.share_folder("music", "bob", Permission::Read)
		.await
		.unwrap();
	assert!(logs_contain("it waits for their next login"));

	let mut bob_events = bob_laptop.subscribe();
	bob_laptop.login(&bob).await.unwrap();

	next_matching(&mut bob_events, |event| {
		matches!(event, NodeEvent::TaskApplied(_))
	})
	.await;

	let profile = bob_laptop.profile().await.unwrap();
	assert_eq!(
		profile.folder("music").unwrap().shared_by.as_deref(),
		Some("alice")
	);
}

#[tokio::test]
#[traced_test]
async fn sharing_with_an_unknown_user_takes_the_permission_back() {
	let net = TestNetwork::new();
	let alice = credentials("alice");

	let laptop = net.device(1);
	laptop.register(&alice).await.unwrap();
	laptop.login(&alice).await.unwrap();
	laptop.add_folder("photos").await.unwrap();

	let res = laptop
		.share_folder("photos", "nobody", Permission::Read)
		.await;
	assert!(matches!(res, Err(Error::NotFound(_))), "{res:?}");

	let profile = laptop.profile().await.unwrap();
	assert!(profile.folder("photos").unwrap().permissions.is_empty());
}

#[tokio::test]
#[traced_test]
async fn failed_reshare_keeps_the_earlier_permission() {
	let net = TestNetwork::new();
	let (alice, bob) = (credentials("alice"), credentials("bob"));

	let tasks = net.flaky_store(USER_PROFILE_TASK_DOMAIN);
	let laptop = net.device_with_store(1, Arc::clone(&tasks) as _);
	laptop.register(&alice).await.unwrap();
	net.device(2).register(&bob).await.unwrap();
	laptop.login(&alice).await.unwrap();
	laptop.add_folder("photos").await.unwrap();

	laptop
		.share_folder("photos", "bob", Permission::Read)
		.await
		.unwrap();

	// Upgrading fails to reach bob's queue
	tasks.set_failing(true);
	let res = laptop
		.share_folder("photos", "bob", Permission::Write)
		.await;
	assert!(matches!(res, Err(Error::RetriesExhausted { .. })), "{res:?}");

	let profile = laptop.profile().await.unwrap();
	let permissions = &profile.folder("photos").unwrap().permissions;
	assert_eq!(permissions.len(), 1);
	assert_eq!(permissions[0].user_id, "bob");
	assert_eq!(permissions[0].permission, Permission::Read);
}

#[tokio::test]
#[traced_test]
async fn shared_folder_keeps_clear_of_an_own_one() {
	let net = TestNetwork::new();
	let (alice, bob) = (credentials("alice"), credentials("bob"));

	let alice_laptop = net.device(1);
	let bob_laptop = net.device(2);
	alice_laptop.register(&alice).await.unwrap();
	bob_laptop.register(&bob).await.unwrap();
	alice_laptop.login(&alice).await.unwrap();
	bob_laptop.login(&bob).await.unwrap();

	bob_laptop.add_folder("photos").await.unwrap();
	bob_laptop.add_folder("photos/holidays").await.unwrap();

	let mut bob_events = bob_laptop.subscribe();

	alice_laptop.add_folder("photos").await.unwrap();
	alice_laptop
		.share_folder("photos", "bob", Permission::Read)
		.await
		.unwrap();

	next_matching(&mut bob_events, |event| {
		matches!(event, NodeEvent::TaskApplied(_))
	})
	.await;
	assert!(logs_contain("Shared folder name was taken"));

	let profile = bob_laptop.profile().await.unwrap();

	let own = profile.folder("photos").unwrap();
	assert_eq!(own.shared_by, None);
	assert!(profile.folder("photos/holidays").is_some());

	let shared = profile.folder("photos (alice)").unwrap();
	assert_eq!(shared.shared_by.as_deref(), Some("alice"));
	assert_eq!(shared.permissions[0].permission, Permission::Read);
}

#[tokio::test]
#[traced_test]
async fn other_devices_hear_about_profile_changes() {
	let net = TestNetwork::new();
	let alice = credentials("alice");

	let laptop = net.device(1);
	let phone = net.device(2);
	laptop.register(&alice).await.unwrap();
	laptop.login(&alice).await.unwrap();
	phone.login(&alice).await.unwrap();

	let mut phone_events = phone.subscribe();
	laptop.add_folder("notes").await.unwrap();

	let event = next_matching(&mut phone_events, |event| {
		matches!(event, NodeEvent::Notified { .. })
	})
	.await;
	assert_eq!(
		event,
		NodeEvent::Notified {
			from_user: "alice".to_string(),
			notification: Notification::ProfileChanged,
		}
	);

	assert!(phone.profile().await.unwrap().folder("notes").is_some());
}
