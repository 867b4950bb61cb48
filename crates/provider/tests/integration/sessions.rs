use std::time::Duration;

use pretty_assertions::assert_eq;
use rstest::rstest;
use xdsm_provider::{ConfigKey, Provider};
use xdsm_types::{EVENT_MAX, Error, EventKind, EventPayload, EventSet, Handle, MsgType, Region, RegionFlags, SessionId};

use crate::common::{FS, Fixture};

#[tokio::test]
async fn sessions_are_listed_in_id_order() {
	let fx = Fixture::new().await;
	let second = fx.provider.create_session(SessionId::NONE, "second").unwrap();
	assert!(second > fx.sid);

	assert_eq!(fx.provider.getall_sessions(2), Ok(vec![fx.sid, second]));
	assert_eq!(fx.provider.getall_sessions(1), Err(Error::BufferTooSmall { required: 2 }));

	fx.provider.destroy_session(second).unwrap();
	assert_eq!(fx.provider.getall_sessions(8), Ok(vec![fx.sid]));
	assert_eq!(fx.provider.destroy_session(second), Err(Error::InvalidSession));
}

#[rstest]
#[case(0, true)]
#[case(255, true)]
#[case(256, false)]
#[case(4096, false)]
fn session_info_must_fit(#[case] len: usize, #[case] accepted: bool) {
	let provider = Provider::default();
	let info = "x".repeat(len);
	let created = provider.create_session(SessionId::NONE, &info);
	assert_eq!(created.is_ok(), accepted, "{created:?}");
	if !accepted {
		assert_eq!(created, Err(Error::TooLarge));
		assert_eq!(provider.getall_sessions(4), Ok(vec![]));
	}
}

#[test]
fn query_session_needs_room_for_terminator() {
	let provider = Provider::default();
	let sid = provider.create_session(SessionId::NONE, "hsm-daemon").unwrap();

	assert_eq!(provider.query_session(sid, 11).as_deref(), Ok("hsm-daemon"));
	assert_eq!(provider.query_session(sid, 10), Err(Error::BufferTooSmall { required: 11 }));
	assert_eq!(provider.query_session(SessionId::NONE, 64), Err(Error::InvalidSession));
}

#[tokio::test]
async fn takeover_keeps_state_under_a_new_id() {
	let fx = Fixture::new().await;
	fx.provider.set_disposition(fx.sid, &fx.fs, EventSet::CREATE, EVENT_MAX).unwrap();
	let token = fx.provider.create_userevent(fx.sid, b"").unwrap();

	let heir = fx.provider.create_session(fx.sid, "restarted").unwrap();
	assert_ne!(heir, fx.sid);
	assert_eq!(fx.provider.query_session(fx.sid, 64), Err(Error::InvalidSession));
	assert_eq!(fx.provider.query_session(heir, 64).as_deref(), Ok("restarted"));
	assert_eq!(fx.provider.getall_dispositions(heir, 4), Ok(vec![(fx.fs, EventSet::CREATE)]));
	assert_eq!(fx.provider.getall_tokens(heir, 4), Ok(vec![token]));
	assert_eq!(fx.provider.create_session(SessionId(9999), "ghost"), Err(Error::InvalidSession));
}

#[tokio::test]
async fn takeover_fails_retrievals_waiting_under_the_old_id() {
	let fx = Fixture::new().await;
	let old = fx.sid;
	let waiting = fx.spawn(move |p| async move { p.get_events(old, 1, true).await });
	tokio::task::yield_now().await;

	let heir = fx.provider.create_session(old, "restarted").unwrap();
	fx.provider.send_msg(heir, MsgType::Async, b"for-heir").await.unwrap();

	let stale = tokio::time::timeout(Duration::from_secs(5), waiting).await.unwrap().unwrap();
	assert_eq!(stale, Err(Error::InvalidSession));
	assert_eq!(fx.next(heir).await.payload, EventPayload::User(b"for-heir".to_vec()));
	assert_eq!(fx.provider.get_events(old, 1, false).await, Err(Error::InvalidSession));
}

#[tokio::test]
async fn no_session_is_never_valid() {
	let fx = Fixture::new().await;
	let none = SessionId::NONE;
	assert_eq!(fx.provider.destroy_session(none), Err(Error::InvalidSession));
	assert_eq!(fx.provider.get_events(none, 1, false).await, Err(Error::InvalidSession));
	assert_eq!(fx.provider.set_disposition(none, &fx.fs, EventSet::CREATE, EVENT_MAX), Err(Error::InvalidSession));
	assert_eq!(fx.provider.getall_tokens(none, 1), Err(Error::InvalidSession));
}

#[tokio::test]
async fn disposition_targets_are_restricted() {
	let fx = Fixture::new().await;
	let file = fx.file("data").await;
	let invalid = |handle: &Handle, events| fx.provider.set_disposition(fx.sid, handle, events, EVENT_MAX);

	assert!(matches!(invalid(&Handle::Global, EventSet::CREATE), Err(Error::InvalidArgument(_))));
	assert!(matches!(invalid(&fx.fs, EventSet::MOUNT), Err(Error::InvalidArgument(_))));
	assert!(matches!(invalid(&file, EventSet::READ), Err(Error::InvalidArgument(_))));
	assert!(matches!(
		fx.provider.set_disposition(fx.sid, &fx.fs, EventSet::CREATE, EVENT_MAX + 1),
		Err(Error::InvalidArgument(_))
	));
	assert_eq!(fx.provider.getall_dispositions(fx.sid, 4), Ok(vec![]));
}

#[tokio::test]
async fn max_event_preserves_higher_events() {
	let fx = Fixture::new().await;
	fx.provider.set_disposition(fx.sid, &fx.fs, EventSet::CREATE | EventSet::DESTROY, EVENT_MAX).unwrap();
	fx.provider.set_disposition(fx.sid, &fx.fs, EventSet::REMOVE, EventKind::Read.number()).unwrap();
	fx.provider.set_disposition(fx.sid, &Handle::Global, EventSet::MOUNT, EVENT_MAX).unwrap();

	let expected = vec![(Handle::Global, EventSet::MOUNT), (fx.fs, EventSet::REMOVE | EventSet::DESTROY)];
	assert_eq!(fx.provider.getall_dispositions(fx.sid, 2), Ok(expected));
	assert_eq!(fx.provider.getall_dispositions(fx.sid, 1), Err(Error::BufferTooSmall { required: 2 }));
}

#[tokio::test]
async fn eventlist_reports_region_events() {
	let fx = Fixture::new().await;
	let file = fx.file("data").await;
	fx.provider.set_eventlist(fx.sid, &file, EventSet::ATTRIBUTE, EVENT_MAX).unwrap();
	fx.provider.set_region(fx.sid, &file, &[Region::new(0, 0, RegionFlags::READ | RegionFlags::WRITE)]).unwrap();

	let expected = EventSet::ATTRIBUTE | EventSet::READ | EventSet::WRITE;
	assert_eq!(fx.provider.get_eventlist(fx.sid, &file, EVENT_MAX as usize), Ok(expected));
	assert_eq!(
		fx.provider.get_eventlist(fx.sid, &file, 4),
		Err(Error::BufferTooSmall { required: EventKind::Attribute.number() as usize + 1 })
	);
	assert!(matches!(fx.provider.get_eventlist(fx.sid, &fx.root, 32), Err(Error::InvalidArgument(_))));
}

#[tokio::test]
async fn config_is_reported_for_live_handles() {
	let fx = Fixture::new().await;
	let file = fx.file("data").await;

	assert_eq!(fx.provider.get_config(&file, ConfigKey::MaxManagedRegions), Ok(64));
	assert_eq!(fx.provider.get_config(&fx.fs, ConfigKey::Legacy), Ok(0));
	assert_eq!(fx.provider.get_config(&Handle::Global, ConfigKey::ObjRef), Err(Error::BadHandleKind));

	let events = fx.provider.get_config_events(&fx.root, EVENT_MAX as usize).unwrap();
	assert!(events.contains_kind(EventKind::Mount) && events.contains_kind(EventKind::User));
	assert_eq!(fx.provider.get_config_events(&fx.root, 1), Err(Error::BufferTooSmall { required: EVENT_MAX as usize }));
}

#[tokio::test]
async fn region_lists_are_bounded() {
	let provider = Provider::from_toml("max_managed_regions = 2").unwrap();
	let sid = provider.create_session(SessionId::NONE, "hsm").unwrap();
	let (_, root) = provider.mount(FS, None, "/mnt", "/dev/vdc", 0).await.unwrap();
	let file = provider.create(&root, "f", xdsm_types::HandleKind::File, 0o600).await.unwrap();

	let three = [
		Region::new(0, 10, RegionFlags::READ),
		Region::new(10, 10, RegionFlags::WRITE),
		Region::new(20, 0, RegionFlags::TRUNCATE),
	];
	assert_eq!(provider.set_region(sid, &file, &three), Err(Error::TooLarge));
	assert_eq!(provider.set_region(sid, &file, &three[..2]), Ok(true));
	assert_eq!(provider.get_region(sid, &file, 2), Ok(three[..2].to_vec()));
	assert_eq!(provider.get_region(sid, &file, 1), Err(Error::BufferTooSmall { required: 2 }));
	assert!(matches!(provider.set_region(sid, &root, &three[..1]), Err(Error::InvalidArgument(_))));

	provider.set_region(sid, &file, &[]).unwrap();
	assert_eq!(provider.get_region(sid, &file, 0), Ok(vec![]));
}

#[test]
fn invalid_configuration_is_rejected() {
	assert!(Provider::from_toml("max_session_info = 0").is_err());
	assert!(Provider::from_toml("unknown_key = 1").is_err());
	assert_eq!(Provider::from_toml("").unwrap().config().max_message_data, 4096);
}
