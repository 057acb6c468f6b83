//! Mirror handshake tests against in-process mirrors
//!
//! Each test starts a small axum server on 127.0.0.1 that plays instance B,
//! honest or not, and drives the handshake from instance A.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{http::StatusCode, response::Redirect, routing::post, Json, Router};
use hoard_auth::{
    AuthorityConfig, HandshakeError, MirrorHandshake, MirrorRequest, RejectReason, TokenAuthority,
    SENTINEL,
};
use hoard_core::{AuthStore, KeyPair, MemoryStore, UserRecord, UserStatus};
use serde_json::{json, Value};

const HOME: &str = "https://home.example";

// =============================================================================
// Test Helpers
// =============================================================================

struct Home {
    authority: Arc<TokenAuthority>,
    store: Arc<MemoryStore>,
    handshake: MirrorHandshake,
}

fn home_with(config: AuthorityConfig, timeout: Duration) -> Home {
    let store = Arc::new(MemoryStore::new());
    store.insert_user(UserRecord::new("u1", "alice"));

    let keys = Arc::new(KeyPair::generate("home"));
    let authority = Arc::new(TokenAuthority::new(keys, store.clone(), config).unwrap());
    let handshake =
        MirrorHandshake::new(authority.clone(), store.clone(), HOME, timeout).unwrap();

    Home {
        authority,
        store,
        handshake,
    }
}

fn home() -> Home {
    home_with(AuthorityConfig::default(), Duration::from_secs(5))
}

async fn spawn_mirror(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Mirror answering with a fixed `res` and the echoed token
async fn mirror_answering(res: &'static str) -> String {
    spawn_mirror(Router::new().route(
        "/api/mirror/verify",
        post(move |Json(req): Json<MirrorRequest>| async move {
            Json(json!({"message": {"res": res, "token": req.token}}))
        }),
    ))
    .await
}

async fn honest_mirror() -> String {
    spawn_mirror(Router::new().route(
        "/api/mirror/verify",
        post(|Json(req): Json<MirrorRequest>| async move {
            Json(MirrorHandshake::acknowledge(req).unwrap())
        }),
    ))
    .await
}

fn reason(err: HandshakeError) -> RejectReason {
    match err {
        HandshakeError::Rejected(reason) => reason,
        other => panic!("expected a rejection, got {:?}", other),
    }
}

async fn trusted(home: &Home) -> Vec<String> {
    home.store.find_user("u1").await.unwrap().unwrap().trusted_mirrors
}

// =============================================================================
// SCENARIO C: Honest Mirror
// =============================================================================

#[tokio::test]
async fn honest_mirror_is_trusted() {
    let home = home();
    let mirror = honest_mirror().await;

    let recorded = home.handshake.request_trust("u1", &format!("{}/", mirror)).await.unwrap();
    assert_eq!(recorded, mirror);
    assert_eq!(trusted(&home).await, vec![mirror.clone()]);

    // a second handshake does not duplicate the entry
    home.handshake.request_trust("u1", &mirror).await.unwrap();
    assert_eq!(trusted(&home).await, vec![mirror.clone()]);

    assert!(home.handshake.forget_mirror("u1", &mirror).await.unwrap());
    assert!(home.handshake.trusted_mirrors("u1").await.unwrap().is_empty());
    assert!(!home.handshake.forget_mirror("u1", &mirror).await.unwrap());
}

#[tokio::test]
async fn mirror_receives_home_url_and_owner() {
    let home = home();
    let seen: Arc<Mutex<Option<MirrorRequest>>> = Arc::new(Mutex::new(None));
    let captured = seen.clone();

    let mirror = spawn_mirror(Router::new().route(
        "/api/mirror/verify",
        post(move |Json(req): Json<MirrorRequest>| {
            let captured = captured.clone();
            async move {
                *captured.lock().unwrap() = Some(req.clone());
                Json(MirrorHandshake::acknowledge(req).unwrap())
            }
        }),
    ))
    .await;

    home.handshake.request_trust("u1", &mirror).await.unwrap();

    let request = seen.lock().unwrap().clone().unwrap();
    assert_eq!(request.url, HOME);
    assert_eq!(request.owner, "u1");
}

// =============================================================================
// Expired and Replayed Challenges
// =============================================================================

#[tokio::test]
async fn expired_challenge_rejected_despite_sentinel() {
    let home = home_with(
        AuthorityConfig::default().with_challenge_ttl(Duration::from_secs(1)),
        Duration::from_secs(10),
    );

    // B is honest but slow: the echo arrives after the challenge expired
    let mirror = spawn_mirror(Router::new().route(
        "/api/mirror/verify",
        post(|Json(req): Json<MirrorRequest>| async move {
            tokio::time::sleep(Duration::from_millis(2100)).await;
            Json(MirrorHandshake::acknowledge(req).unwrap())
        }),
    ))
    .await;

    let err = home.handshake.request_trust("u1", &mirror).await.unwrap_err();
    assert_eq!(reason(err), RejectReason::Expired);
    assert!(trusted(&home).await.is_empty());
}

#[tokio::test]
async fn expired_challenge_rejected_by_authority() {
    let home = home_with(
        AuthorityConfig::default().with_challenge_ttl(Duration::from_secs(1)),
        Duration::from_secs(5),
    );
    let mirror = "https://mirror.example";

    let challenge = home.authority.mint_challenge(HOME, mirror).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2100)).await;

    let err = home
        .authority
        .verify_challenge(&challenge.token, HOME, mirror)
        .await
        .unwrap_err();
    assert_eq!(reason(err), RejectReason::Expired);
}

/// A mirror replaying a challenge captured from an earlier handshake
#[tokio::test]
async fn replayed_challenge_rejected() {
    let home = home();
    let captured: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let slot = captured.clone();

    let mirror = spawn_mirror(Router::new().route(
        "/api/mirror/verify",
        post(move |Json(req): Json<MirrorRequest>| {
            let slot = slot.clone();
            async move {
                let mut slot = slot.lock().unwrap();
                let token = slot.get_or_insert(req.token).clone();
                Json(json!({"message": {"res": SENTINEL, "token": token}}))
            }
        }),
    ))
    .await;

    home.handshake.request_trust("u1", &mirror).await.unwrap();

    // second run: the mirror echoes the first, already consumed, challenge
    let err = home.handshake.request_trust("u1", &mirror).await.unwrap_err();
    assert_eq!(reason(err), RejectReason::TokenMismatch);

    // presenting the consumed challenge directly is a replay
    let first = captured.lock().unwrap().clone().unwrap();
    let err = home
        .authority
        .verify_challenge(&first, HOME, &mirror)
        .await
        .unwrap_err();
    assert_eq!(reason(err), RejectReason::Replayed);
}

#[tokio::test]
async fn challenge_verified_with_foreign_key_fails() {
    let home = home();
    let mirror = "https://mirror.example";
    let challenge = home.authority.mint_challenge(HOME, mirror).await.unwrap();

    let foreign = TokenAuthority::new(
        Arc::new(KeyPair::generate("home")),
        Arc::new(MemoryStore::new()),
        AuthorityConfig::default(),
    )
    .unwrap();

    let err = foreign
        .verify_challenge(&challenge.token, HOME, mirror)
        .await
        .unwrap_err();
    assert_eq!(reason(err), RejectReason::BadSignature);
}

// =============================================================================
// Dishonest or Broken Mirrors
// =============================================================================

#[tokio::test]
async fn sentinel_must_match_exactly() {
    for res in [
        "mirror operational",
        "MIRROR OPERATIONAL",
        "Mirror Operational!",
        " Mirror Operational",
        "Status: Mirror Operational",
        "Mirror",
        "",
    ] {
        let home = home();
        let mirror = mirror_answering(res).await;

        let err = home.handshake.request_trust("u1", &mirror).await.unwrap_err();
        assert_eq!(reason(err), RejectReason::WrongSentinel, "res = {:?}", res);
        assert!(trusted(&home).await.is_empty());
    }
}

#[tokio::test]
async fn tampered_echo_rejected() {
    let home = home();
    let mirror = spawn_mirror(Router::new().route(
        "/api/mirror/verify",
        post(|Json(req): Json<MirrorRequest>| async move {
            let mut token = req.token;
            token.push('x');
            Json(json!({"message": {"res": SENTINEL, "token": token}}))
        }),
    ))
    .await;

    let err = home.handshake.request_trust("u1", &mirror).await.unwrap_err();
    assert_eq!(reason(err), RejectReason::TokenMismatch);
}

#[tokio::test]
async fn non_success_status_rejected() {
    let home = home();
    let mirror = spawn_mirror(Router::new().route(
        "/api/mirror/verify",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    ))
    .await;

    let err = home.handshake.request_trust("u1", &mirror).await.unwrap_err();
    assert_eq!(reason(err), RejectReason::HttpStatus(500));
}

#[tokio::test]
async fn missing_route_rejected() {
    let home = home();
    let mirror = spawn_mirror(Router::new()).await;

    let err = home.handshake.request_trust("u1", &mirror).await.unwrap_err();
    assert_eq!(reason(err), RejectReason::HttpStatus(404));
}

/// A mirror forwarding the challenge to a host that was never asked
#[tokio::test]
async fn redirecting_mirror_rejected() {
    let home = home();
    let target = honest_mirror().await;
    let forward = format!("{}/api/mirror/verify", target);

    let mirror = spawn_mirror(Router::new().route(
        "/api/mirror/verify",
        post(move || {
            let forward = forward.clone();
            async move { Redirect::temporary(&forward) }
        }),
    ))
    .await;

    let err = home.handshake.request_trust("u1", &mirror).await.unwrap_err();
    assert_eq!(reason(err), RejectReason::HttpStatus(307));
    assert!(trusted(&home).await.is_empty());
}

#[tokio::test]
async fn malformed_body_rejected() {
    let home = home();
    let mirror = spawn_mirror(Router::new().route(
        "/api/mirror/verify",
        post(|| async { Json::<Value>(json!({"res": SENTINEL})) }),
    ))
    .await;

    let err = home.handshake.request_trust("u1", &mirror).await.unwrap_err();
    assert!(matches!(reason(err), RejectReason::MalformedBody(_)));
}

#[tokio::test]
async fn slow_mirror_times_out() {
    let home = home_with(AuthorityConfig::default(), Duration::from_millis(200));
    let mirror = spawn_mirror(Router::new().route(
        "/api/mirror/verify",
        post(|Json(req): Json<MirrorRequest>| async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(MirrorHandshake::acknowledge(req).unwrap())
        }),
    ))
    .await;

    let err = home.handshake.request_trust("u1", &mirror).await.unwrap_err();
    assert!(matches!(reason(err), RejectReason::Transport(_)));
}

#[tokio::test]
async fn unreachable_mirror_rejected() {
    let home = home();

    // bind then drop to obtain a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = home
        .handshake
        .request_trust("u1", &format!("http://{}", addr))
        .await
        .unwrap_err();
    assert!(matches!(reason(err), RejectReason::Transport(_)));
}

// =============================================================================
// Request Validation
// =============================================================================

#[tokio::test]
async fn self_mirror_rejected() {
    let home = home();
    let err = home.handshake.request_trust("u1", "https://home.example/").await.unwrap_err();
    assert_eq!(reason(err), RejectReason::SelfMirror);
}

#[tokio::test]
async fn unknown_subject_rejected() {
    let home = home();
    let mirror = honest_mirror().await;

    let err = home.handshake.request_trust("ghost", &mirror).await.unwrap_err();
    assert_eq!(reason(err), RejectReason::UnknownSubject);
}

/// The owner is banned while the mirror is still answering
#[tokio::test]
async fn ban_during_handshake_sticks() {
    let home = home();
    let store = home.store.clone();

    let mirror = spawn_mirror(Router::new().route(
        "/api/mirror/verify",
        post(move |Json(req): Json<MirrorRequest>| {
            let store = store.clone();
            async move {
                store.set_user_status("u1", UserStatus::Banned).await.unwrap();
                Json(MirrorHandshake::acknowledge(req).unwrap())
            }
        }),
    ))
    .await;

    let err = home.handshake.request_trust("u1", &mirror).await.unwrap_err();
    assert_eq!(reason(err), RejectReason::UnknownSubject);

    let user = home.store.find_user("u1").await.unwrap().unwrap();
    assert_eq!(user.status, UserStatus::Banned);
    assert!(user.trusted_mirrors.is_empty());
}

#[tokio::test]
async fn invalid_url_rejected() {
    let home = home();
    let err = home.handshake.request_trust("u1", "javascript:alert(1)").await.unwrap_err();
    assert!(matches!(reason(err), RejectReason::InvalidUrl(_)));
}
