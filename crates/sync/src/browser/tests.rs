use std::sync::Mutex;

use pretty_assertions::assert_eq;
use serde_json::json;
use switchboard_proto::Outbound;

use super::*;
use crate::channel::ResourceChannel;
use crate::kind::ResourceKind;
use crate::transport::{Endpoint, MemoryPeer, MemoryTransport, ServerConn};

type EventLog = Arc<Mutex<Vec<(Instant, BrowserEvent)>>>;

struct Harness {
	browser: FileBrowser,
	peer: MemoryPeer,
	conn: ServerConn,
	log: EventLog,
	_sub: Subscription,
}

async fn harness(session: serde_json::Value, config: SyncConfig) -> Harness {
	let (transport, mut peer) = MemoryTransport::pair();
	let channel = ResourceChannel::spawn(ResourceKind::Files, Arc::new(transport), &Endpoint::new("ws://t/", ""), config.clone());
	let session: Session = serde_json::from_value(session).unwrap();
	let browser = FileBrowser::spawn(channel, &session, &config, Some(SortSpec::ascending("name")));
	let conn = peer.accept().await.unwrap();

	let log: EventLog = Arc::default();
	let sub = {
		let log = log.clone();
		browser.subscribe(move |e| log.lock().unwrap().push((Instant::now(), e.clone())))
	};
	Harness {
		browser,
		peer,
		conn,
		log,
		_sub: sub,
	}
}

async fn push_session() -> Harness {
	harness(json!({"id": "s1"}), SyncConfig::default()).await
}

fn listing(req: &Outbound, path: &str, names: &[&str]) -> Inbound {
	let items: Vec<_> = names
		.iter()
		.map(|n| json!({"id": format!("{}/{n}", path.trim_end_matches('/')), "name": n}))
		.collect();
	let serde_json::Value::Object(payload) = json!({"path": path, "items": items}) else {
		unreachable!()
	};
	Inbound::new("listing", payload).with_req_id(req.req_id.clone())
}

fn path_of(req: &Outbound) -> &str {
	req.params.get("path").and_then(|v| v.as_str()).unwrap_or_default()
}

fn names(listing: &Listing) -> Vec<&str> {
	listing.entries.iter().map(|e| e.name.as_str()).collect()
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn committed_listing_is_sorted_and_published() {
	let mut h = push_session().await;
	h.browser.navigate("/home").unwrap();

	let req = h.conn.recv_request().await.unwrap();
	assert_eq!(req.action, "list");
	assert_eq!(path_of(&req), "/home");
	assert_eq!(req.params.get("session"), Some(&json!("s1")));
	h.conn.send(&listing(&req, "/home", &["zeta", "alpha"]));

	let mut rx = h.browser.watch_listing();
	rx.wait_for(|l| l.path.is_some()).await.unwrap();
	let current = h.browser.listing();
	assert_eq!(current.path.as_deref(), Some("/home"));
	assert_eq!(names(&current), vec!["alpha", "zeta"]);
	assert!(matches!(&h.log.lock().unwrap()[..], [(_, BrowserEvent::Listing(_))]));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn navigation_burst_sends_first_and_last_only() {
	let mut h = push_session().await;
	for path in ["/a", "/b", "/c", "/d"] {
		h.browser.navigate(path).unwrap();
	}

	let first = h.conn.recv_request().await.unwrap();
	assert_eq!(path_of(&first), "/a");
	assert!(h.conn.try_recv().is_none());

	h.conn.send(&listing(&first, "/a", &["x"]));
	let second = h.conn.recv_request().await.unwrap();
	assert_eq!(path_of(&second), "/d");

	h.conn.send(&listing(&second, "/d", &["y"]));
	h.browser.watch_listing().wait_for(|l| l.path.is_some()).await.unwrap();
	assert_eq!(h.browser.listing().path.as_deref(), Some("/d"));

	let committed: Vec<_> = h
		.log
		.lock()
		.unwrap()
		.iter()
		.filter_map(|(_, e)| match e {
			BrowserEvent::Listing(l) => l.path.clone(),
			_ => None,
		})
		.collect();
	assert_eq!(committed, vec!["/d".to_string()]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn late_reply_after_retry_is_stale() {
	let mut h = push_session().await;
	let t0 = Instant::now();
	h.browser.navigate("/slow").unwrap();

	let original = h.conn.recv_request().await.unwrap();
	let retry = h.conn.recv_request().await.unwrap();
	assert_eq!(t0.elapsed(), Duration::from_millis(4000));
	assert_eq!(path_of(&retry), "/slow");

	h.conn.send(&listing(&retry, "/slow", &["fresh"]));
	h.conn.send(&listing(&original, "/slow", &["old"]));

	let mut rx = h.browser.watch_listing();
	rx.wait_for(|l| l.path.is_some()).await.unwrap();
	tokio::time::sleep(Duration::from_millis(10)).await;

	assert_eq!(names(&h.browser.listing()), vec!["fresh"]);
	assert!(
		h.log
			.lock()
			.unwrap()
			.iter()
			.any(|(_, e)| *e == BrowserEvent::Stale { path: "/slow".into() })
	);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn mismatched_echo_is_discarded() {
	let mut h = push_session().await;
	h.browser.navigate("/a").unwrap();
	let req = h.conn.recv_request().await.unwrap();
	h.conn.send(&listing(&req, "/elsewhere", &["x"]));
	tokio::time::sleep(Duration::from_millis(10)).await;

	assert_eq!(h.browser.listing().path, None);
	assert!(matches!(&h.log.lock().unwrap()[..], [(_, BrowserEvent::Stale { path })] if path == "/elsewhere"));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn repeated_timeouts_escalate_then_fail() {
	let config = SyncConfig {
		max_consecutive_timeouts: 3,
		..SyncConfig::default()
	};
	let mut h = harness(json!({"id": "s1"}), config).await;
	let t0 = Instant::now();
	h.browser.navigate("/void").unwrap();

	for _ in 0..3 {
		assert_eq!(path_of(&h.conn.recv_request().await.unwrap()), "/void");
	}
	tokio::time::sleep(Duration::from_secs(30)).await;
	let late: Vec<_> = std::iter::from_fn(|| h.conn.try_recv()).filter(|o| o.action != "ping").collect();
	assert!(late.is_empty(), "no request after giving up: {late:?}");

	let events: Vec<_> = h.log.lock().unwrap().iter().map(|(at, e)| (at.duration_since(t0).as_millis(), e.clone())).collect();
	assert_eq!(events, vec![
		(8000, BrowserEvent::Retrying {
			path: "/void".into(),
			attempt: 2,
		}),
		(12_000, BrowserEvent::Failed {
			path: "/void".into(),
			error: Error::Timeout("/void".into()),
		}),
	]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn polled_session_waits_two_beacons_plus_grace() {
	let mut h = harness(json!({"id": "b1", "beacon_interval_ms": 5000}), SyncConfig::default()).await;
	let t0 = Instant::now();
	h.browser.navigate("C:\\").unwrap();

	h.conn.recv_request().await.unwrap();
	h.conn.recv_request().await.unwrap();
	assert_eq!(t0.elapsed(), Duration::from_millis(12_000));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn server_error_is_surfaced_and_view_kept() {
	let mut h = push_session().await;
	h.browser.navigate("/ok").unwrap();
	let req = h.conn.recv_request().await.unwrap();
	h.conn.send(&listing(&req, "/ok", &["file"]));
	h.browser.watch_listing().wait_for(|l| l.path.is_some()).await.unwrap();

	h.browser.navigate("/root").unwrap();
	let req = h.conn.recv_request().await.unwrap();
	let serde_json::Value::Object(payload) = json!({"error": "access denied"}) else {
		unreachable!()
	};
	h.conn.send(&Inbound::new("error", payload).with_req_id(req.req_id));
	tokio::time::sleep(Duration::from_millis(10)).await;

	assert_eq!(h.browser.listing().path.as_deref(), Some("/ok"));
	assert!(h.log.lock().unwrap().iter().any(|(_, e)| *e
		== BrowserEvent::ServerError {
			path: "/root".into(),
			message: "access denied".into(),
		}));

	// The view is idle again: the next navigation goes straight out.
	h.browser.navigate("/tmp").unwrap();
	assert_eq!(path_of(&h.conn.recv_request().await.unwrap()), "/tmp");
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn reconnect_relists_committed_directory() {
	let mut h = push_session().await;
	h.browser.navigate("/etc").unwrap();
	let req = h.conn.recv_request().await.unwrap();
	h.conn.send(&listing(&req, "/etc", &["hosts"]));
	h.browser.watch_listing().wait_for(|l| l.path.is_some()).await.unwrap();

	let Harness { mut peer, conn, browser, .. } = h;
	conn.close();

	let mut conn = peer.accept().await.unwrap();
	let req = conn.recv_request().await.unwrap();
	assert_eq!(path_of(&req), "/etc");
	conn.send(&listing(&req, "/etc", &["hosts", "passwd"]));
	browser.watch_listing().wait_for(|l| l.entries.len() == 2).await.unwrap();
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn cancelled_in_flight_listing_is_resent_after_reconnect() {
	let mut h = push_session().await;
	h.browser.navigate("/var").unwrap();
	h.conn.recv_request().await.unwrap();

	let Harness { mut peer, conn, browser, .. } = h;
	conn.fail("reset");

	let mut conn = peer.accept().await.unwrap();
	let req = conn.recv_request().await.unwrap();
	assert_eq!(path_of(&req), "/var");
	conn.send(&listing(&req, "/var", &["log"]));
	browser.watch_listing().wait_for(|l| l.path.as_deref() == Some("/var")).await.unwrap();
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn resort_republishes_listing() {
	let mut h = push_session().await;
	h.browser.navigate("/").unwrap();
	let req = h.conn.recv_request().await.unwrap();
	h.conn.send(&listing(&req, "/", &["a", "b"]));
	h.browser.watch_listing().wait_for(|l| l.path.is_some()).await.unwrap();

	h.browser.set_sort(Some(SortSpec::descending("name"))).unwrap();
	h.browser.watch_listing().wait_for(|l| l.entries.first().is_some_and(|e| e.name == "b")).await.unwrap();
	assert_eq!(names(&h.browser.listing()), vec!["b", "a"]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn polled_reply_inside_guard_outlives_request_timeout() {
	let mut h = harness(json!({"id": "b1", "beacon_interval_ms": 20_000}), SyncConfig::default()).await;
	h.browser.navigate("/slow").unwrap();
	let req = h.conn.recv_request().await.unwrap();

	// Past the 30 s request timeout but inside the 42 s busy guard.
	tokio::time::sleep(Duration::from_secs(35)).await;
	h.conn.send(&listing(&req, "/slow", &["late"]));
	h.browser.watch_listing().wait_for(|l| l.path.is_some()).await.unwrap();

	assert_eq!(h.browser.listing().path.as_deref(), Some("/slow"));
	assert_eq!(names(&h.browser.listing()), vec!["late"]);
	let retries: Vec<_> = std::iter::from_fn(|| h.conn.try_recv()).filter(|o| o.action != "ping").collect();
	assert!(retries.is_empty(), "reply arrived inside the guard: {retries:?}");
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn busy_guard_waits_for_the_link() {
	let (transport, mut peer) = MemoryTransport::pair();
	peer.set_refusing(true);
	let config = SyncConfig::default();
	let channel = ResourceChannel::spawn(ResourceKind::Files, Arc::new(transport), &Endpoint::new("ws://t/", ""), config.clone());
	let session: Session = serde_json::from_value(json!({"id": "s1"})).unwrap();
	let browser = FileBrowser::spawn(channel, &session, &config, None);
	let log: EventLog = Arc::default();
	let _sub = {
		let log = log.clone();
		browser.subscribe(move |e| log.lock().unwrap().push((Instant::now(), e.clone())))
	};

	browser.navigate("/x").unwrap();
	tokio::time::sleep(Duration::from_millis(12_500)).await;
	peer.set_refusing(false);

	let mut conn = peer.accept().await.unwrap();
	let connected_at = Instant::now();
	let req = conn.recv_request().await.unwrap();
	assert_eq!(path_of(&req), "/x");
	assert!(conn.try_recv().is_none(), "only one listing request after reconnect");
	assert!(log.lock().unwrap().is_empty(), "no retries while offline");

	// The guard restarts with the link.
	let retry = conn.recv_request().await.unwrap();
	assert_eq!(path_of(&retry), "/x");
	assert_eq!(connected_at.elapsed(), Duration::from_millis(4000));

	conn.send(&listing(&retry, "/x", &["a"]));
	browser.watch_listing().wait_for(|l| l.path.as_deref() == Some("/x")).await.unwrap();
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn cancellation_seen_after_reconnect_resends_immediately() {
	let (transport, mut peer) = MemoryTransport::pair();
	let config = SyncConfig::default();
	let channel = ResourceChannel::spawn(ResourceKind::Files, Arc::new(transport), &Endpoint::new("ws://t/", ""), config.clone());
	let mut conn = peer.accept().await.unwrap();
	channel.connected().await.unwrap();

	let (reply_tx, _reply_rx) = mpsc::unbounded_channel();
	let (listing_tx, _listing_rx) = watch::channel(Arc::new(Listing::default()));
	let mut task = BrowserTask {
		session: "s1".into(),
		state_rx: channel.watch_state(),
		channel,
		nav: NavigationController::new(Duration::from_secs(4), config.max_consecutive_timeouts),
		view: TableView::new(),
		resend_on_connect: false,
		sent: 0,
		request_lifetime: Duration::from_secs(24),
		reply_tx,
		listing_tx,
		events: EventBus::new(),
	};

	let now = Instant::now();
	task.on_command(BrowserCommand::Navigate("/var".into()), now);
	assert_eq!(path_of(&conn.recv_request().await.unwrap()), "/var");

	// An older attempt's cancellation is ignored.
	task.on_reply(
		ListReply {
			target: "/var".into(),
			sent: 0,
			outcome: Err(Error::Cancelled),
		},
		now,
	);
	tokio::time::sleep(Duration::from_millis(10)).await;
	assert!(conn.try_recv().is_none());

	// The channel reports Connected, so no transition will follow: re-send now.
	task.on_reply(
		ListReply {
			target: "/var".into(),
			sent: 1,
			outcome: Err(Error::Cancelled),
		},
		now,
	);
	let resent = conn.recv_request().await.unwrap();
	assert_eq!(path_of(&resent), "/var");
	assert!(!task.resend_on_connect);
	assert_eq!(task.nav.in_flight(), Some("/var"));
}
