use std::time::Duration;

use pretty_assertions::assert_eq;
use xdsm_types::{
	DataEvent, EVENT_MAX, Error, EventKind, EventPayload, EventSet, MsgType, Region, RegionFlags, Response, SessionId, Token,
};

use crate::common::Fixture;

const EIO: i32 = 5;
const ENOSPC: i32 = 28;

#[tokio::test]
async fn read_inside_region_fires_with_request_parameters() {
	let fx = Fixture::new().await;
	let file = fx.file("data").await;
	fx.provider.set_region(fx.sid, &file, &[Region::new(0, 1000, RegionFlags::READ)]).unwrap();

	let read = fx.spawn(move |p| async move { p.read(&file, 0, 10).await });
	let msg = fx.next(fx.sid).await;
	assert_eq!(msg.kind, EventKind::Read);
	assert_eq!(msg.payload, EventPayload::Data(DataEvent { handle: file, offset: 0, length: 10 }));
	assert!(!read.is_finished());

	fx.answer(fx.sid, &msg, Response::Continue, 0).unwrap();
	assert_eq!(read.await.unwrap(), Ok(()));
}

#[tokio::test]
async fn straddling_read_reports_unclipped_range() {
	let fx = Fixture::new().await;
	let file = fx.file("data").await;
	fx.provider.set_region(fx.sid, &file, &[Region::new(0, 1000, RegionFlags::READ)]).unwrap();

	let read = fx.spawn(move |p| async move { p.read(&file, 900, 4096).await });
	let msg = fx.next(fx.sid).await;
	assert_eq!(msg.payload, EventPayload::Data(DataEvent { handle: file, offset: 900, length: 4096 }));
	fx.answer(fx.sid, &msg, Response::Continue, 0).unwrap();
	read.await.unwrap().unwrap();
}

#[tokio::test]
async fn read_does_not_trip_write_region() {
	let fx = Fixture::new().await;
	let file = fx.file("data").await;
	fx.provider.set_region(fx.sid, &file, &[Region::new(0, 1000, RegionFlags::WRITE)]).unwrap();

	assert_eq!(fx.provider.read(&file, 0, 10).await, Ok(()));
	fx.assert_idle(fx.sid).await;
}

#[tokio::test]
async fn read_outside_region_is_silent() {
	let fx = Fixture::new().await;
	let file = fx.file("data").await;
	fx.provider.set_region(fx.sid, &file, &[Region::new(100, 50, RegionFlags::READ)]).unwrap();

	assert_eq!(fx.provider.read(&file, 150, 10).await, Ok(()));
	assert_eq!(fx.provider.read(&file, 0, 100).await, Ok(()));
	fx.assert_idle(fx.sid).await;
}

#[tokio::test]
async fn abort_fails_the_caller_with_its_errno() {
	let fx = Fixture::new().await;
	let file = fx.file("data").await;
	fx.provider.set_region(fx.sid, &file, &[Region::new(0, 0, RegionFlags::WRITE)]).unwrap();

	let write = fx.spawn(move |p| async move { p.write(&file, 8192, 512).await });
	let msg = fx.next(fx.sid).await;
	fx.answer(fx.sid, &msg, Response::Abort, ENOSPC).unwrap();

	let err = write.await.unwrap().unwrap_err();
	assert_eq!(err, Error::Aborted(ENOSPC));
	assert_eq!(err.errno(), ENOSPC);
}

#[tokio::test]
async fn truncate_reports_new_size() {
	let fx = Fixture::new().await;
	let file = fx.file("data").await;
	fx.provider.set_region(fx.sid, &file, &[Region::new(1000, 0, RegionFlags::TRUNCATE)]).unwrap();

	let shrink = fx.spawn(move |p| async move { p.truncate(&file, 2000, 500).await });
	let msg = fx.next(fx.sid).await;
	assert_eq!(msg.kind, EventKind::Truncate);
	assert_eq!(msg.payload, EventPayload::Data(DataEvent { handle: file, offset: 500, length: 0 }));
	fx.answer(fx.sid, &msg, Response::Continue, 0).unwrap();
	shrink.await.unwrap().unwrap();

	assert_eq!(fx.provider.truncate(&file, 0, 1000).await, Ok(()));
	assert_eq!(fx.provider.truncate(&file, 4000, 4000).await, Ok(()));
	fx.assert_idle(fx.sid).await;
}

#[tokio::test]
async fn destroy_session_releases_blocked_caller() {
	let fx = Fixture::new().await;
	let file = fx.file("data").await;
	fx.provider.set_region(fx.sid, &file, &[Region::new(0, 0, RegionFlags::READ)]).unwrap();

	let read = fx.spawn(move |p| async move { p.read(&file, 0, 1).await });
	let msg = fx.next(fx.sid).await;
	assert!(msg.token.is_some());

	fx.provider.destroy_session(fx.sid).unwrap();
	let outcome = tokio::time::timeout(Duration::from_secs(5), read).await.expect("caller still blocked");
	assert_eq!(outcome.unwrap(), Err(Error::InvalidSession));
}

#[tokio::test]
async fn destroy_session_refused_with_undelivered_messages() {
	let fx = Fixture::new().await;
	fx.provider.send_msg(fx.sid, MsgType::Async, b"ping").await.unwrap();

	assert_eq!(fx.provider.destroy_session(fx.sid), Err(Error::SessionBusy));
	fx.provider.get_events(fx.sid, 1, false).await.unwrap();
	assert_eq!(fx.provider.destroy_session(fx.sid), Ok(()));
}

#[tokio::test]
async fn respond_validates_arguments_and_retires_tokens() {
	let fx = Fixture::new().await;
	let file = fx.file("data").await;
	fx.provider.set_region(fx.sid, &file, &[Region::new(0, 0, RegionFlags::READ)]).unwrap();

	let read = fx.spawn(move |p| async move { p.read(&file, 0, 1).await });
	let msg = fx.next(fx.sid).await;
	let token = msg.token.unwrap();

	let invalid = |response, reterror| fx.provider.respond_event(fx.sid, token, response, reterror);
	assert!(matches!(invalid(Response::Continue, EIO), Err(Error::InvalidArgument(_))));
	assert!(matches!(invalid(Response::Abort, 0), Err(Error::InvalidArgument(_))));
	assert!(matches!(invalid(Response::DontCare, 0), Err(Error::InvalidArgument(_))));
	assert!(matches!(invalid(Response::Invalid, 0), Err(Error::InvalidArgument(_))));
	assert_eq!(fx.provider.respond_event(fx.sid, Token::NONE, Response::Continue, 0), Err(Error::InvalidToken));
	assert_eq!(fx.provider.respond_event(fx.sid, Token::INVALID, Response::Continue, 0), Err(Error::InvalidToken));
	assert_eq!(fx.provider.respond_event(SessionId::NONE, token, Response::Continue, 0), Err(Error::InvalidSession));

	assert_eq!(fx.provider.respond_event(fx.sid, token, Response::Continue, 0), Ok(()));
	let again = fx.provider.respond_event(fx.sid, token, Response::Continue, 0);
	assert_eq!(again, Err(Error::TokenRetired));
	assert_eq!(again.unwrap_err().errno(), 3);
	read.await.unwrap().unwrap();
}

#[tokio::test]
async fn get_events_batches_in_order() {
	let fx = Fixture::new().await;
	for byte in 0..5u8 {
		fx.provider.send_msg(fx.sid, MsgType::Async, &[byte]).await.unwrap();
	}

	assert_eq!(fx.provider.get_events(fx.sid, 0, false).await, Err(Error::BufferTooSmall { required: 1 }));
	let first = fx.provider.get_events(fx.sid, 3, false).await.unwrap();
	let rest = fx.provider.get_events(fx.sid, 10, true).await.unwrap();
	let payloads: Vec<_> = first.iter().chain(&rest).map(|m| m.payload.clone()).collect();
	assert_eq!(payloads, (0..5u8).map(|b| EventPayload::User(vec![b])).collect::<Vec<_>>());
	assert!(first.iter().chain(&rest).all(|m| m.token.is_none()));
	fx.assert_idle(fx.sid).await;
}

#[tokio::test]
async fn interrupted_get_events_keeps_messages() {
	let fx = Fixture::new().await;
	let interrupted = tokio::time::timeout(Duration::from_millis(20), fx.provider.get_events(fx.sid, 4, true)).await;
	assert!(interrupted.is_err());

	fx.provider.send_msg(fx.sid, MsgType::Async, b"a").await.unwrap();
	fx.provider.send_msg(fx.sid, MsgType::Async, b"b").await.unwrap();
	let batch = fx.provider.get_events(fx.sid, 4, true).await.unwrap();
	assert_eq!(batch.len(), 2);
	assert_eq!(batch[0].payload, EventPayload::User(b"a".to_vec()));
}

#[tokio::test]
async fn user_event_token_is_outstanding_without_a_message() {
	let fx = Fixture::new().await;
	let token = fx.provider.create_userevent(fx.sid, b"hsm").unwrap();

	fx.assert_idle(fx.sid).await;
	assert_eq!(fx.provider.getall_tokens(fx.sid, 4), Ok(vec![token]));
	assert_eq!(fx.provider.getall_tokens(fx.sid, 0), Err(Error::BufferTooSmall { required: 1 }));
	let msg = fx.provider.find_eventmsg(fx.sid, token).unwrap();
	assert_eq!(msg.payload, EventPayload::User(b"hsm".to_vec()));

	fx.provider.respond_event(fx.sid, token, Response::Continue, 0).unwrap();
	assert_eq!(fx.provider.getall_tokens(fx.sid, 4), Ok(vec![]));
	assert_eq!(fx.provider.find_eventmsg(fx.sid, token), Err(Error::InvalidToken));
}

#[tokio::test]
async fn oversized_user_data_is_rejected() {
	let fx = Fixture::new().await;
	let data = vec![0u8; fx.provider.config().max_message_data + 1];
	assert_eq!(fx.provider.create_userevent(fx.sid, &data), Err(Error::TooLarge));
	assert_eq!(fx.provider.send_msg(fx.sid, MsgType::Async, &data).await, Err(Error::TooLarge));
}

#[tokio::test]
async fn synchronous_message_waits_for_answer() {
	let fx = Fixture::new().await;
	let sid = fx.sid;
	let sender = fx.spawn(move |p| async move { p.send_msg(sid, MsgType::Sync, b"recall").await });

	let msg = fx.next(sid).await;
	assert_eq!(msg.kind, EventKind::User);
	assert!(!sender.is_finished());
	fx.answer(sid, &msg, Response::Abort, EIO).unwrap();
	assert_eq!(sender.await.unwrap(), Err(Error::Aborted(EIO)));
}

#[tokio::test]
async fn pending_accepts_outstanding_tokens() {
	let fx = Fixture::new().await;
	let token = fx.provider.create_userevent(fx.sid, b"").unwrap();
	assert_eq!(fx.provider.pending(fx.sid, token, Duration::from_secs(1)), Ok(()));
	assert_eq!(fx.provider.is_pending(fx.sid, token), Ok(true));
	assert_eq!(fx.provider.pending(fx.sid, Token(token.0 + 100), Duration::ZERO), Err(Error::InvalidToken));
}

#[tokio::test]
async fn pending_accepts_any_delay() {
	let fx = Fixture::new().await;
	let token = fx.provider.create_userevent(fx.sid, b"").unwrap();
	assert_eq!(fx.provider.pending(fx.sid, token, Duration::MAX), Ok(()));
	assert_eq!(fx.provider.pending(fx.sid, token, Duration::from_nanos(1)), Ok(()));
	assert_eq!(fx.provider.is_pending(fx.sid, token), Ok(true));
}

#[tokio::test]
async fn move_event_hands_caller_to_another_session() {
	let fx = Fixture::new().await;
	let other = fx.provider.create_session(SessionId::NONE, "helper").unwrap();
	let file = fx.file("data").await;
	fx.provider.set_region(fx.sid, &file, &[Region::new(0, 0, RegionFlags::READ)]).unwrap();

	let read = fx.spawn(move |p| async move { p.read(&file, 0, 1).await });
	let msg = fx.next(fx.sid).await;
	let token = msg.token.unwrap();

	assert_eq!(fx.provider.move_event(fx.sid, token, other), Ok(token));
	assert_eq!(fx.provider.move_event(fx.sid, token, other), Err(Error::TokenNotInSession));
	assert_eq!(fx.provider.respond_event(fx.sid, token, Response::Continue, 0), Err(Error::InvalidToken));
	assert_eq!(fx.provider.find_eventmsg(other, token), Ok(msg));

	fx.provider.respond_event(other, token, Response::Continue, 0).unwrap();
	read.await.unwrap().unwrap();
}

#[tokio::test]
async fn every_interested_session_answers_in_id_order() {
	let fx = Fixture::new().await;
	let second = fx.provider.create_session(SessionId::NONE, "second").unwrap();
	for sid in [fx.sid, second] {
		fx.provider.set_disposition(sid, &fx.fs, EventSet::REMOVE, EVENT_MAX).unwrap();
	}
	fx.file("doomed").await;
	fx.file("kept").await;

	let root = fx.root;
	let remove = fx.spawn(move |p| async move { p.remove(&root, "doomed", 0).await });
	let first = fx.next(fx.sid).await;
	fx.assert_idle(second).await;
	fx.answer(fx.sid, &first, Response::Continue, 0).unwrap();
	let then = fx.next(second).await;
	fx.answer(second, &then, Response::Continue, 0).unwrap();
	remove.await.unwrap().unwrap();

	let remove = fx.spawn(move |p| async move { p.remove(&root, "kept", 0).await });
	let first = fx.next(fx.sid).await;
	fx.answer(fx.sid, &first, Response::Abort, EIO).unwrap();
	assert_eq!(remove.await.unwrap(), Err(Error::Aborted(EIO)));
	fx.assert_idle(second).await;
	assert!(fx.provider.registry().lookup(&fx.root, "kept").is_ok());
}

#[tokio::test]
async fn close_and_attribute_are_notifications() {
	let fx = Fixture::new().await;
	let file = fx.file("data").await;
	fx.provider.set_eventlist(fx.sid, &file, EventSet::CLOSE | EventSet::ATTRIBUTE, EVENT_MAX).unwrap();

	fx.provider.attribute_changed(&file).await.unwrap();
	fx.provider.close(&file).await.unwrap();
	let batch = fx.provider.get_events(fx.sid, 4, false).await.unwrap();
	let kinds: Vec<_> = batch.iter().map(|m| (m.kind, m.token)).collect();
	assert_eq!(kinds, vec![(EventKind::Attribute, None), (EventKind::Close, None)]);
	assert!(batch.iter().all(|m| m.payload == EventPayload::Object(file)));

	assert_eq!(fx.provider.close(&xdsm_types::Handle::Global).await, Err(Error::BadHandleKind));
}
