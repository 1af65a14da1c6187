mod common;

use common::{address, credentials, TestNetwork, CONTACT_WINDOW};

use std::{collections::BTreeSet, time::Duration};

use hv_core::Error;
use hv_p2p::PeerBehavior;
use tracing_test::traced_test;

#[tokio::test(start_paused = true)]
#[traced_test]
async fn probe_keeps_only_devices_that_answered() {
	let net = TestNetwork::new();
	let alice = credentials("alice");

	let devices = (1..=4).map(|n| net.device(n)).collect::<Vec<_>>();
	devices[0].register(&alice).await.unwrap();
	for device in &devices {
		device.login(&alice).await.unwrap();
	}
	assert_eq!(net.locations("alice").await.len(), 4);

	// Two devices never answer, one of them eventually does, two seconds too late
	net.network.set_behavior(address(3).peer_id, PeerBehavior::Silent);
	net.network.set_behavior(
		address(4).peer_id,
		PeerBehavior::Delayed(CONTACT_WINDOW + Duration::from_secs(2)),
	);

	let newcomer = net.device(5);
	newcomer.login(&alice).await.unwrap();

	let expected = BTreeSet::from([address(1), address(2), address(5)]);
	assert_eq!(net.locations("alice").await, expected);
	assert!(logs_contain("Not every device answered the liveness probe in time"));

	tokio::time::sleep(Duration::from_secs(3)).await;

	assert_eq!(net.locations("alice").await, expected);
	assert!(logs_contain("Discarding delayed response"));
}

#[tokio::test]
#[traced_test]
async fn lowest_live_address_is_master() {
	let net = TestNetwork::new();
	let alice = credentials("alice");

	let third = net.device(3);
	third.register(&alice).await.unwrap();
	third.login(&alice).await.unwrap();
	assert!(third.is_master());

	let first = net.device(1);
	first.login(&alice).await.unwrap();
	assert!(first.is_master());

	let second = net.device(2);
	second.login(&alice).await.unwrap();
	assert!(!second.is_master());

	// Once the master is gone, the next round elects somebody else
	first.logout().await.unwrap();
	second.logout().await.unwrap();
	second.login(&alice).await.unwrap();
	assert!(second.is_master());
	assert_eq!(
		net.locations("alice").await,
		BTreeSet::from([address(2), address(3)])
	);
}

#[tokio::test]
#[traced_test]
async fn logout_takes_the_device_out_of_the_locations() {
	let net = TestNetwork::new();
	let alice = credentials("alice");

	let laptop = net.device(1);
	let phone = net.device(2);
	laptop.register(&alice).await.unwrap();
	laptop.login(&alice).await.unwrap();
	phone.login(&alice).await.unwrap();

	phone.logout().await.unwrap();

	assert!(!phone.is_logged_in());
	assert_eq!(net.locations("alice").await, BTreeSet::from([address(1)]));
	assert!(matches!(phone.logout().await, Err(Error::NotLoggedIn)));
}

#[tokio::test]
#[traced_test]
async fn unreachable_devices_are_cleaned_up_after_notifying() {
	let net = TestNetwork::new();
	let alice = credentials("alice");

	let laptop = net.device(1);
	let phone = net.device(2);
	laptop.register(&alice).await.unwrap();
	phone.login(&alice).await.unwrap();
	laptop.login(&alice).await.unwrap();

	// The phone went away without logging out
	net.network
		.set_behavior(address(2).peer_id, PeerBehavior::Unreachable);

	laptop.add_folder("notes").await.unwrap();

	assert_eq!(net.locations("alice").await, BTreeSet::from([address(1)]));
	assert!(logs_contain("Notification not delivered"));
}
