//! Integration tests for the registry and the join handshake.

use std::net::SocketAddr;
use std::sync::Arc;

use theater_lobby::{
    IdentityPolicy, JoinConfig, JoinNotice, JoinOrchestrator, JoinState, LobbyConfig, LobbyError,
    LobbyRegistry, NoticeReceiver,
};
use theater_protocol::requests::{CreateGame, JoinGame, JoinResponse};
use theater_protocol::{AccountId, Command, Fields, Identity, LobbyId, Op, PlayerId};
use theater_store::{DurableStore, MemoryDurableStore, MemoryKv, StatEntry, StoreError};
use theater_transport::ConnectionId;
use tokio::sync::Notify;

// =========================================================================
// Helpers
// =========================================================================

struct Harness {
    durable: Arc<MemoryDurableStore>,
    registry: Arc<LobbyRegistry<MemoryDurableStore>>,
    orch: JoinOrchestrator<MemoryDurableStore>,
}

fn harness(config: JoinConfig) -> Harness {
    let durable = Arc::new(MemoryDurableStore::new());
    durable.insert_identity(AccountId(42), PlayerId(7001), "Alice");
    durable.insert_identity(AccountId(43), PlayerId(7002), "Bob");
    let registry = Arc::new(LobbyRegistry::new(
        Arc::new(MemoryKv::new()),
        durable.clone(),
        LobbyConfig::default(),
    ));
    let orch = JoinOrchestrator::new(registry.clone(), config);
    Harness {
        durable,
        registry,
        orch,
    }
}

fn cid(id: u64) -> ConnectionId {
    ConnectionId::new(id)
}

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

fn create(h: &Harness, server: ConnectionId) -> LobbyId {
    create_on(&h.registry, server)
}

fn create_on<D: DurableStore>(registry: &LobbyRegistry<D>, server: ConnectionId) -> LobbyId {
    let cmd = Command::new(Op::Cgam)
        .with("TID", "3")
        .with("NAME", "\"Test\"")
        .with("PORT", "18567")
        .with("INT-IP", "10.0.0.2")
        .with("INT-PORT", "18568")
        .with("MAX-PLAYERS", "16");
    let request = CreateGame::try_from(&cmd).unwrap();
    registry
        .create_lobby(server, addr("198.51.100.7:40000"), &request)
        .unwrap()
}

fn egam(account: u64, gid: Option<LobbyId>) -> JoinGame {
    let mut cmd = Command::new(Op::Egam)
        .with("TID", "5")
        .with("R-U-accid", account.to_string())
        .with("R-U-externalIp", "203.0.113.5")
        .with("PORT", "3659")
        .with("R-INT-IP", "192.168.1.5")
        .with("R-INT-PORT", "3660");
    if let Some(gid) = gid {
        cmd = cmd.with("GID", gid.to_string());
    }
    JoinGame::try_from(&cmd).unwrap()
}

fn egrs(gid: LobbyId, allowed: bool) -> JoinResponse {
    let cmd = Command::new(Op::Egrs)
        .with("TID", "6")
        .with("GID", gid.to_string())
        .with("ALLOWED", if allowed { "1" } else { "0" });
    JoinResponse::try_from(&cmd).unwrap()
}

fn drain(rx: &mut NoticeReceiver) -> Vec<JoinNotice> {
    let mut out = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        out.push(notice);
    }
    out
}

/// Runs the server side of one poll tick: issue and "send" the ticket.
fn server_poll(h: &Harness, server: ConnectionId, rx: &mut NoticeReceiver) -> Vec<theater_lobby::ServerJoinRequest> {
    let mut sent = Vec::new();
    for notice in drain(rx) {
        if let JoinNotice::JoinRequested { lobby_id } = notice {
            if let Some(req) = h.orch.issue_ticket(server, lobby_id) {
                h.orch.server_notified(lobby_id, req.ticket);
                sent.push(req);
            }
        }
    }
    sent
}

/// Runs the client side of one poll tick.
fn client_poll(h: &Harness, client: ConnectionId, rx: &mut NoticeReceiver) -> Vec<theater_lobby::ClientEnterGame> {
    drain(rx)
        .into_iter()
        .filter_map(|notice| match notice {
            JoinNotice::TicketIssued { lobby_id } => h.orch.deliver_ticket(client, lobby_id),
            _ => None,
        })
        .collect()
}

// =========================================================================
// Happy path
// =========================================================================

#[tokio::test]
async fn test_full_handshake_delivers_matching_ticket() {
    let h = harness(JoinConfig::default());
    let (server, client) = (cid(1), cid(2));
    let mut server_rx = h.orch.register(server);
    let mut client_rx = h.orch.register(client);
    let lobby = create(&h, server);
    assert_eq!(lobby, LobbyId(1));

    let admission = h
        .orch
        .request_join(client, addr("203.0.113.5:50000"), &egam(42, None))
        .await
        .unwrap();
    assert_eq!(admission.lobby_id, lobby);
    assert_eq!(admission.identity.player_id, PlayerId(7001));
    assert_eq!(h.orch.state(lobby, client), JoinState::JoinRequested);

    let requests = server_poll(&h, server, &mut server_rx);
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.client, client);
    assert_eq!(request.identity.account_id, AccountId(42));
    assert_eq!(request.identity.nickname, "Alice");
    assert_eq!(request.rendezvous.external_ip, "203.0.113.5");
    assert_eq!(request.rendezvous.external_port, Some(3659));
    assert_eq!(request.rendezvous.internal_ip.as_deref(), Some("192.168.1.5"));
    assert_eq!(h.orch.state(lobby, client), JoinState::AwaitingServerAck);

    let entered = client_poll(&h, client, &mut client_rx);
    assert_eq!(entered.len(), 1);
    assert_eq!(entered[0].ticket, request.ticket);
    assert_eq!(entered[0].player_id, PlayerId(7001));
    assert_eq!(entered[0].server.public_ip.as_deref(), Some("198.51.100.7"));
    assert_eq!(entered[0].server.public_port, Some(18567));
    assert_eq!(h.orch.state(lobby, client), JoinState::Joined);
}

#[tokio::test]
async fn test_enter_game_is_delivered_exactly_once() {
    let h = harness(JoinConfig::default());
    let (server, client) = (cid(1), cid(2));
    let mut server_rx = h.orch.register(server);
    let _client_rx = h.orch.register(client);
    let lobby = create(&h, server);

    h.orch
        .request_join(client, addr("203.0.113.5:50000"), &egam(42, None))
        .await
        .unwrap();
    server_poll(&h, server, &mut server_rx);

    assert!(h.orch.deliver_ticket(client, lobby).is_some());
    assert!(h.orch.deliver_ticket(client, lobby).is_none());
    assert!(h.orch.issue_ticket(server, lobby).is_none());
}

#[tokio::test]
async fn test_duplicate_join_request_is_idempotent() {
    let h = harness(JoinConfig::default());
    let (server, client) = (cid(1), cid(2));
    let mut server_rx = h.orch.register(server);
    create(&h, server);

    for _ in 0..3 {
        h.orch
            .request_join(client, addr("203.0.113.5:50000"), &egam(42, None))
            .await
            .unwrap();
    }
    let requests = server_poll(&h, server, &mut server_rx);
    assert_eq!(requests.len(), 1);
    assert!(server_poll(&h, server, &mut server_rx).is_empty());
}

#[tokio::test]
async fn test_server_poll_without_pending_join_sends_nothing() {
    let h = harness(JoinConfig::default());
    let server = cid(1);
    let mut server_rx = h.orch.register(server);
    let lobby = create(&h, server);

    assert!(server_poll(&h, server, &mut server_rx).is_empty());
    assert!(h.orch.issue_ticket(server, lobby).is_none());
}

#[tokio::test]
async fn test_issue_ticket_ignores_non_owner() {
    let h = harness(JoinConfig::default());
    let (server, client, other) = (cid(1), cid(2), cid(3));
    let lobby = create(&h, server);
    h.orch
        .request_join(client, addr("203.0.113.5:50000"), &egam(42, None))
        .await
        .unwrap();

    assert!(h.orch.issue_ticket(other, lobby).is_none());
    assert_eq!(h.orch.state(lobby, client), JoinState::JoinRequested);
}

// =========================================================================
// Serialization per lobby
// =========================================================================

#[tokio::test]
async fn test_concurrent_joins_are_serviced_one_at_a_time() {
    let h = harness(JoinConfig::default());
    let (server, alice, bob) = (cid(1), cid(2), cid(3));
    let mut server_rx = h.orch.register(server);
    let mut alice_rx = h.orch.register(alice);
    let mut bob_rx = h.orch.register(bob);
    let lobby = create(&h, server);

    h.orch
        .request_join(alice, addr("203.0.113.5:50000"), &egam(42, None))
        .await
        .unwrap();
    h.orch
        .request_join(bob, addr("203.0.113.6:50000"), &egam(43, None))
        .await
        .unwrap();

    let first = server_poll(&h, server, &mut server_rx);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].client, alice);
    assert_eq!(h.orch.state(lobby, bob), JoinState::JoinRequested);

    assert_eq!(client_poll(&h, alice, &mut alice_rx).len(), 1);

    let second = server_poll(&h, server, &mut server_rx);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].client, bob);
    assert_ne!(second[0].ticket, first[0].ticket);

    let bob_entered = client_poll(&h, bob, &mut bob_rx);
    assert_eq!(bob_entered[0].ticket, second[0].ticket);
}

#[tokio::test]
async fn test_handshakes_in_different_lobbies_are_independent() {
    let h = harness(JoinConfig::default());
    let (server_a, server_b, alice, bob) = (cid(1), cid(2), cid(3), cid(4));
    let mut rx_a = h.orch.register(server_a);
    let mut rx_b = h.orch.register(server_b);
    let lobby_a = create(&h, server_a);
    let lobby_b = create(&h, server_b);

    h.orch
        .request_join(alice, addr("203.0.113.5:50000"), &egam(42, Some(lobby_a)))
        .await
        .unwrap();
    h.orch
        .request_join(bob, addr("203.0.113.6:50000"), &egam(43, Some(lobby_b)))
        .await
        .unwrap();

    let a = server_poll(&h, server_a, &mut rx_a);
    let b = server_poll(&h, server_b, &mut rx_b);
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(a[0].client, alice);
    assert_eq!(b[0].client, bob);
}

// =========================================================================
// Strict acknowledgement
// =========================================================================

#[tokio::test]
async fn test_strict_mode_waits_for_server_ack() {
    let h = harness(JoinConfig::default().with_server_ack());
    let (server, client) = (cid(1), cid(2));
    let mut server_rx = h.orch.register(server);
    let mut client_rx = h.orch.register(client);
    let lobby = create(&h, server);

    h.orch
        .request_join(client, addr("203.0.113.5:50000"), &egam(42, None))
        .await
        .unwrap();
    let requests = server_poll(&h, server, &mut server_rx);
    assert_eq!(requests.len(), 1);

    assert!(client_poll(&h, client, &mut client_rx).is_empty());
    assert!(h.orch.deliver_ticket(client, lobby).is_none());
    assert_eq!(h.orch.state(lobby, client), JoinState::AwaitingServerAck);

    assert_eq!(h.orch.server_ack(server, &egrs(lobby, true)), Some((lobby, client)));
    let entered = client_poll(&h, client, &mut client_rx);
    assert_eq!(entered.len(), 1);
    assert_eq!(entered[0].ticket, requests[0].ticket);
}

#[tokio::test]
async fn test_server_refusal_aborts_join() {
    let h = harness(JoinConfig::default().with_server_ack());
    let (server, client) = (cid(1), cid(2));
    let mut server_rx = h.orch.register(server);
    let lobby = create(&h, server);

    h.orch
        .request_join(client, addr("203.0.113.5:50000"), &egam(42, None))
        .await
        .unwrap();
    server_poll(&h, server, &mut server_rx);

    h.orch.server_ack(server, &egrs(lobby, false));
    assert_eq!(h.orch.state(lobby, client), JoinState::Aborted);
    assert!(h.orch.deliver_ticket(client, lobby).is_none());
}

#[tokio::test]
async fn test_server_ack_from_stranger_is_ignored() {
    let h = harness(JoinConfig::default().with_server_ack());
    let (server, client) = (cid(1), cid(2));
    let mut server_rx = h.orch.register(server);
    let lobby = create(&h, server);
    h.orch
        .request_join(client, addr("203.0.113.5:50000"), &egam(42, None))
        .await
        .unwrap();
    server_poll(&h, server, &mut server_rx);

    assert!(h.orch.server_ack(cid(9), &egrs(lobby, false)).is_none());
    assert_eq!(h.orch.state(lobby, client), JoinState::AwaitingServerAck);
}

// =========================================================================
// Leave and cleanup
// =========================================================================

#[tokio::test]
async fn test_leave_aborts_and_notifies_owner() {
    let h = harness(JoinConfig::default());
    let (server, client) = (cid(1), cid(2));
    let mut server_rx = h.orch.register(server);
    let lobby = create(&h, server);

    h.orch
        .request_join(client, addr("203.0.113.5:50000"), &egam(42, None))
        .await
        .unwrap();
    server_poll(&h, server, &mut server_rx);

    assert_eq!(h.orch.leave(client, None), Some(lobby));
    assert_eq!(h.orch.state(lobby, client), JoinState::Aborted);
    assert_eq!(
        drain(&mut server_rx),
        vec![JoinNotice::LeaveRequested {
            lobby_id: lobby,
            player_id: PlayerId(7001),
        }]
    );
    assert!(h.orch.deliver_ticket(client, lobby).is_none());
}

#[tokio::test]
async fn test_leave_without_pending_join_does_nothing() {
    let h = harness(JoinConfig::default());
    let (server, client) = (cid(1), cid(2));
    let mut server_rx = h.orch.register(server);
    let lobby = create(&h, server);

    assert_eq!(h.orch.leave(client, Some(lobby)), None);
    assert_eq!(h.orch.leave(client, None), None);
    assert!(drain(&mut server_rx).is_empty());
}

#[tokio::test]
async fn test_leave_from_queue_keeps_active_join() {
    let h = harness(JoinConfig::default());
    let (server, alice, bob) = (cid(1), cid(2), cid(3));
    let mut server_rx = h.orch.register(server);
    let lobby = create(&h, server);
    h.orch
        .request_join(alice, addr("203.0.113.5:50000"), &egam(42, None))
        .await
        .unwrap();
    h.orch
        .request_join(bob, addr("203.0.113.6:50000"), &egam(43, None))
        .await
        .unwrap();
    drain(&mut server_rx);

    assert_eq!(h.orch.leave(bob, Some(lobby)), Some(lobby));
    assert_eq!(h.orch.state(lobby, bob), JoinState::Aborted);
    assert_eq!(h.orch.state(lobby, alice), JoinState::JoinRequested);
}

#[tokio::test]
async fn test_client_close_resets_and_promotes_next() {
    let h = harness(JoinConfig::default());
    let (server, alice, bob) = (cid(1), cid(2), cid(3));
    let mut server_rx = h.orch.register(server);
    let lobby = create(&h, server);
    h.orch
        .request_join(alice, addr("203.0.113.5:50000"), &egam(42, None))
        .await
        .unwrap();
    h.orch
        .request_join(bob, addr("203.0.113.6:50000"), &egam(43, None))
        .await
        .unwrap();
    server_poll(&h, server, &mut server_rx);

    h.orch.on_session_closed(alice);
    assert_eq!(h.orch.state(lobby, alice), JoinState::Idle);

    let next = server_poll(&h, server, &mut server_rx);
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].client, bob);
}

#[tokio::test]
async fn test_client_close_after_request_join_tells_server() {
    let h = harness(JoinConfig::default().with_server_ack());
    let (server, client) = (cid(1), cid(2));
    let mut server_rx = h.orch.register(server);
    let lobby = create(&h, server);
    h.orch
        .request_join(client, addr("203.0.113.5:50000"), &egam(42, None))
        .await
        .unwrap();
    assert_eq!(server_poll(&h, server, &mut server_rx).len(), 1);
    assert_eq!(h.orch.state(lobby, client), JoinState::AwaitingServerAck);

    h.orch.on_session_closed(client);

    assert_eq!(
        drain(&mut server_rx),
        vec![JoinNotice::LeaveRequested {
            lobby_id: lobby,
            player_id: PlayerId(7001),
        }]
    );
    assert_eq!(h.orch.state(lobby, client), JoinState::Idle);
}

#[tokio::test]
async fn test_queued_client_close_tells_server_and_keeps_active_join() {
    let h = harness(JoinConfig::default());
    let (server, alice, bob) = (cid(1), cid(2), cid(3));
    let mut server_rx = h.orch.register(server);
    let lobby = create(&h, server);
    h.orch
        .request_join(alice, addr("203.0.113.5:50000"), &egam(42, None))
        .await
        .unwrap();
    h.orch
        .request_join(bob, addr("203.0.113.6:50000"), &egam(43, None))
        .await
        .unwrap();
    drain(&mut server_rx);

    h.orch.on_session_closed(bob);

    assert_eq!(
        drain(&mut server_rx),
        vec![JoinNotice::LeaveRequested {
            lobby_id: lobby,
            player_id: PlayerId(7002),
        }]
    );
    assert_eq!(h.orch.state(lobby, alice), JoinState::JoinRequested);
}

#[tokio::test]
async fn test_server_close_resets_lobby_handshake() {
    let h = harness(JoinConfig::default());
    let (server, client) = (cid(1), cid(2));
    let mut server_rx = h.orch.register(server);
    let mut client_rx = h.orch.register(client);
    let lobby = create(&h, server);
    h.orch
        .request_join(client, addr("203.0.113.5:50000"), &egam(42, None))
        .await
        .unwrap();
    server_poll(&h, server, &mut server_rx);

    h.orch.on_session_closed(server);
    assert_eq!(h.orch.state(lobby, client), JoinState::Idle);
    assert!(h.registry.owner(lobby).is_none());
    assert!(client_poll(&h, client, &mut client_rx).is_empty());
    assert!(h.registry.query_lobby(lobby).is_ok(), "records are never deleted");
}

// =========================================================================
// Identity policy and targeting
// =========================================================================

#[tokio::test]
async fn test_unknown_identity_proceeds_partial_by_default() {
    let h = harness(JoinConfig::default());
    let (server, client) = (cid(1), cid(2));
    let mut server_rx = h.orch.register(server);
    create(&h, server);

    let admission = h
        .orch
        .request_join(client, addr("203.0.113.5:50000"), &egam(999, None))
        .await
        .unwrap();
    assert_eq!(admission.state, JoinState::JoinRequested);
    assert!(!admission.identity.is_resolved());

    let requests = server_poll(&h, server, &mut server_rx);
    assert_eq!(requests[0].identity.account_id, AccountId(999));
    assert_eq!(requests[0].identity.nickname, "");
}

#[tokio::test]
async fn test_fail_join_policy_never_contacts_server() {
    let h = harness(JoinConfig::default().with_identity_policy(IdentityPolicy::FailJoin));
    let (server, client) = (cid(1), cid(2));
    let mut server_rx = h.orch.register(server);
    let lobby = create(&h, server);

    let admission = h
        .orch
        .request_join(client, addr("203.0.113.5:50000"), &egam(999, None))
        .await
        .unwrap();
    assert_eq!(admission.state, JoinState::Aborted);
    assert_eq!(h.orch.state(lobby, client), JoinState::Aborted);
    assert!(drain(&mut server_rx).is_empty());
    assert!(h.orch.issue_ticket(server, lobby).is_none());
}

#[tokio::test]
async fn test_join_without_any_lobby_fails() {
    let h = harness(JoinConfig::default());
    let err = h
        .orch
        .request_join(cid(2), addr("203.0.113.5:50000"), &egam(42, None))
        .await
        .unwrap_err();
    assert!(matches!(err, LobbyError::NoLobbyAvailable));
}

#[tokio::test]
async fn test_join_unknown_gid_targets_default_lobby() {
    let h = harness(JoinConfig::default());
    let server = cid(1);
    let lobby = create(&h, server);

    let admission = h
        .orch
        .request_join(cid(2), addr("203.0.113.5:50000"), &egam(42, Some(LobbyId(5459))))
        .await
        .unwrap();
    assert_eq!(admission.lobby_id, lobby);
}

#[tokio::test]
async fn test_missing_external_ip_falls_back_to_observed_address() {
    let h = harness(JoinConfig::default());
    let (server, client) = (cid(1), cid(2));
    let mut server_rx = h.orch.register(server);
    create(&h, server);

    let cmd = Command::new(Op::Egam).with("TID", "5").with("R-U-accid", "42");
    let request = JoinGame::try_from(&cmd).unwrap();
    h.orch
        .request_join(client, addr("203.0.113.77:51000"), &request)
        .await
        .unwrap();

    let requests = server_poll(&h, server, &mut server_rx);
    assert_eq!(requests[0].rendezvous.external_ip, "203.0.113.77");
    assert_eq!(requests[0].rendezvous.external_port, Some(51000));
    assert!(h.durable.lobby_stats(LobbyId(1)).is_none());
}

// =========================================================================
// Owner lost during identity lookup
// =========================================================================

/// Holds every identity lookup until `gate` is notified.
struct GatedStore {
    inner: MemoryDurableStore,
    gate: Arc<Notify>,
}

impl DurableStore for GatedStore {
    async fn lookup_identity(&self, account_id: AccountId) -> Result<Option<Identity>, StoreError> {
        self.gate.notified().await;
        self.inner.lookup_identity(account_id).await
    }

    async fn record_lobby_stats(&self, lobby_id: LobbyId, stats: &Fields) -> Result<(), StoreError> {
        self.inner.record_lobby_stats(lobby_id, stats).await
    }

    async fn fetch_stats(
        &self,
        owner: &str,
        account_id: AccountId,
        keys: &[String],
    ) -> Result<Vec<StatEntry>, StoreError> {
        self.inner.fetch_stats(owner, account_id, keys).await
    }
}

fn gated() -> (
    Arc<LobbyRegistry<GatedStore>>,
    Arc<JoinOrchestrator<GatedStore>>,
    Arc<Notify>,
) {
    let gate = Arc::new(Notify::new());
    let store = GatedStore {
        inner: MemoryDurableStore::new(),
        gate: gate.clone(),
    };
    let registry = Arc::new(LobbyRegistry::new(
        Arc::new(MemoryKv::new()),
        Arc::new(store),
        LobbyConfig::default(),
    ));
    let orch = Arc::new(JoinOrchestrator::new(registry.clone(), JoinConfig::default()));
    (registry, orch, gate)
}

#[tokio::test]
async fn test_owner_gone_during_lookup_fails_join() {
    let (registry, orch, gate) = gated();
    let (server, client) = (cid(1), cid(2));
    let lobby = create_on(&registry, server);

    let pending = {
        let orch = orch.clone();
        tokio::spawn(async move {
            orch.request_join(client, addr("203.0.113.5:50000"), &egam(42, Some(lobby)))
                .await
        })
    };
    tokio::task::yield_now().await;

    orch.on_session_closed(server);
    gate.notify_one();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, LobbyError::NoLobbyAvailable));
    assert_eq!(orch.state(lobby, client), JoinState::Idle);
}

#[tokio::test]
async fn test_owner_gone_during_lookup_retargets_live_lobby() {
    let (registry, orch, gate) = gated();
    let (first, second, client) = (cid(1), cid(2), cid(3));
    let gone = create_on(&registry, first);
    let live = create_on(&registry, second);
    let mut second_rx = orch.register(second);

    let pending = {
        let orch = orch.clone();
        tokio::spawn(async move {
            orch.request_join(client, addr("203.0.113.5:50000"), &egam(42, Some(gone)))
                .await
        })
    };
    tokio::task::yield_now().await;

    orch.on_session_closed(first);
    gate.notify_one();

    let admission = pending.await.unwrap().unwrap();
    assert_eq!(admission.lobby_id, live);
    assert_eq!(orch.state(live, client), JoinState::JoinRequested);
    assert_eq!(orch.state(gone, client), JoinState::Idle);
    assert_eq!(
        drain(&mut second_rx),
        vec![JoinNotice::JoinRequested { lobby_id: live }]
    );
}
