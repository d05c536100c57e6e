// std
use std::{
	path::PathBuf,
	sync::Arc,
	time::{SystemTime, UNIX_EPOCH},
};
// crates.io
use time::{Duration, macros};
// self
use session_gateway::{
	auth::{Claims, TokenCodec, TokenType},
	clock::{Clock, ManualClock},
	credentials::{CredentialKeys, CredentialStore},
	store::{FileStore, KeyValueStore, MemoryStore},
};

fn scratch_path(label: &str) -> PathBuf {
	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System clock should be after the Unix epoch.")
		.as_nanos();

	std::env::temp_dir()
		.join(format!("session-gateway-{label}-{}-{nanos}", std::process::id()))
		.join("credentials.json")
}

fn clock() -> ManualClock {
	ManualClock::new(macros::datetime!(2025-04-10 09:00 UTC))
}

#[test]
fn pair_survives_a_restart_through_the_file_store() {
	let path = scratch_path("restart");
	let clock = clock();
	let refresh = TokenCodec.encode_unsigned(&Claims::new(
		"user-1",
		TokenType::Refresh,
		clock.now(),
		clock.now() + Duration::days(30),
	));

	{
		let backend = FileStore::open(&path).expect("Fresh file store should open.");
		let credentials = CredentialStore::new(Arc::new(backend), Arc::new(clock.clone()));

		credentials
			.set("opaque-access", refresh.clone(), 900)
			.expect("Writing the pair should succeed.");
	}

	let reopened = FileStore::open(&path).expect("Existing file store should reopen.");
	let credentials = CredentialStore::new(Arc::new(reopened), Arc::new(clock.clone()));
	let pair = credentials
		.load()
		.expect("Loading should succeed.")
		.expect("Pair should survive the restart.");

	assert_eq!(pair.access_token.expose(), "opaque-access");
	assert_eq!(pair.refresh_token.expose(), refresh);
	assert_eq!(pair.access_expires_at, clock.now() + Duration::minutes(15));
	assert!(!credentials.is_refresh_expired().expect("Refresh check should succeed."));

	clock.advance(Duration::minutes(12));

	assert!(!credentials.is_access_expired().expect("Expiry check should succeed."));
	assert!(credentials.is_access_expiring_soon(5).expect("Threshold check should succeed."));

	credentials.clear().expect("Clearing should succeed.");

	let reopened = FileStore::open(&path).expect("Cleared file store should reopen.");

	assert_eq!(reopened.get("access_token").expect("Read should succeed."), None);

	if let Some(dir) = path.parent() {
		let _ = std::fs::remove_dir_all(dir);
	}
}

#[test]
fn partial_pairs_are_treated_as_corruption_and_wiped() {
	let backend = MemoryStore::default();
	let credentials = CredentialStore::new(Arc::new(backend.clone()), Arc::new(clock()));

	backend
		.set(vec![("access_token".into(), "a".into()), ("token_expiry".into(), "1".into())])
		.expect("Seeding a partial pair should succeed.");

	assert!(credentials.load().expect("Loading should succeed.").is_none());
	assert!(backend.is_empty());

	backend
		.set(vec![
			("access_token".into(), "a".into()),
			("refresh_token".into(), "r".into()),
			("token_expiry".into(), "next tuesday".into()),
		])
		.expect("Seeding an unparseable expiry should succeed.");

	assert!(credentials.get_access().expect("Reading should succeed.").is_none());
	assert!(backend.is_empty());
	assert!(credentials.is_access_expired().expect("Empty store should read as expired."));
	assert!(credentials.is_refresh_expired().expect("Empty store should read as expired."));
}

#[test]
fn custom_keys_leave_unrelated_entries_alone() {
	let backend = MemoryStore::default();
	let keys = CredentialKeys {
		access_token: "app.access".into(),
		refresh_token: "app.refresh".into(),
		expiry: "app.expiry".into(),
	};
	let credentials =
		CredentialStore::new(Arc::new(backend.clone()), Arc::new(clock())).with_keys(keys);

	backend.set(vec![("theme".into(), "dark".into())]).expect("Seeding should succeed.");
	credentials.set("a", "r", 60).expect("Writing the pair should succeed.");

	assert_eq!(backend.len(), 4);
	assert_eq!(backend.get("app.access").expect("Read should succeed."), Some("a".into()));

	credentials.clear().expect("Clearing should succeed.");

	assert_eq!(backend.len(), 1);
	assert_eq!(backend.get("theme").expect("Read should succeed."), Some("dark".into()));
}

#[test]
fn invalid_lifetimes_are_rejected_before_writing() {
	let backend = MemoryStore::default();
	let credentials = CredentialStore::new(Arc::new(backend.clone()), Arc::new(clock()));

	credentials.set("a", "r", 0).expect_err("Zero lifetime should be rejected.");
	credentials.set("", "r", 60).expect_err("Empty access token should be rejected.");

	assert!(backend.is_empty());
}
