use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use sesame::{
    auth::{AuthError, Clock, ManualClock},
    email::{EmailMessage, EmailSender},
    sesame::{
        account::{LoginForm, RegisterForm},
        router, AppState, AuthConfig, Backends,
    },
    store::{CodeStore, MemoryCodeStore, StoreError},
    users::MemoryUserStore,
};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tower::ServiceExt;

const NOW: i64 = 1_700_000_000;

#[derive(Default)]
struct Outbox(Mutex<Vec<EmailMessage>>);

impl Outbox {
    fn last_code(&self, to: &str) -> Result<String> {
        let sent = self.0.lock().map_err(|_| anyhow!("outbox poisoned"))?;
        let message = sent
            .iter()
            .rev()
            .find(|message| message.to == to)
            .ok_or_else(|| anyhow!("no email sent to {to}"))?;
        let start = message
            .html
            .find("<strong>")
            .ok_or_else(|| anyhow!("no code in email"))?
            + "<strong>".len();
        let end = message.html[start..]
            .find("</strong>")
            .ok_or_else(|| anyhow!("no code in email"))?;
        Ok(message.html[start..start + end].to_string())
    }
}

#[async_trait]
impl EmailSender for Outbox {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        self.0
            .lock()
            .map_err(|_| anyhow!("outbox poisoned"))?
            .push(message.clone());
        Ok(())
    }
}

struct Harness {
    state: Arc<AppState>,
    clock: Arc<ManualClock>,
    outbox: Arc<Outbox>,
}

/// Memory store whose deletes always fail.
struct DeleteFails(MemoryCodeStore);

#[async_trait]
impl CodeStore for DeleteFails {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.0.set(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.0.get(key).await
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.0.take(key).await
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection reset".to_string()))
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        self.0.purge_expired().await
    }
}

fn harness(config: AuthConfig) -> Result<Harness> {
    harness_with(config, |clock| Arc::new(MemoryCodeStore::new(clock)))
}

fn harness_with(
    config: AuthConfig,
    codes: impl FnOnce(Arc<dyn Clock>) -> Arc<dyn CodeStore>,
) -> Result<Harness> {
    let clock = Arc::new(ManualClock::new(NOW));
    let outbox = Arc::new(Outbox::default());
    let shared: Arc<dyn Clock> = clock.clone();
    let state = AppState::new(
        config,
        Backends {
            users: Arc::new(MemoryUserStore::new(shared.clone())),
            codes: codes(shared.clone()),
            sender: outbox.clone(),
            clock: shared,
        },
    )?;
    Ok(Harness {
        state: Arc::new(state),
        clock,
        outbox,
    })
}

fn config() -> AuthConfig {
    AuthConfig::new(SecretString::from("integration-signing-key-0123456789"))
        .with_session_ttl_seconds(600)
}

async fn register_alice(h: &Harness) -> Result<i64> {
    let accounts = h.state.accounts();
    accounts.send_verification_email("alice@example.com").await?;
    let code = h.outbox.last_code("alice@example.com")?;
    let user = accounts
        .register(RegisterForm {
            name: "alice".to_string(),
            email: "alice@example.com".to_string(),
            code,
            password: "hunter22".to_string(),
        })
        .await?;
    Ok(user.user_id)
}

fn login_form(name: &str, password: &str) -> LoginForm {
    LoginForm {
        name: name.to_string(),
        password: password.to_string(),
    }
}

#[tokio::test]
async fn register_login_and_hand_off_a_session() -> Result<()> {
    let h = harness(config())?;
    let user_id = register_alice(&h).await?;
    let accounts = h.state.accounts();

    let by_email = accounts
        .login(login_form("alice@example.com", "hunter22"))
        .await?;
    assert_eq!(by_email.id, user_id);
    assert_eq!(by_email.username, "alice");

    let session = accounts.login(login_form("alice", "hunter22")).await?;
    let who = accounts.who_am_i(&session.token)?;
    assert_eq!(who.user_info.user_id, user_id);
    assert_eq!(who.user_info.email, "alice@example.com");

    let code = accounts.issue_exchange_code(&session.token).await?;
    let redeemed = accounts.redeem_exchange_code(&code).await?;
    assert_eq!(redeemed.token, session.token);
    assert_eq!(redeemed.user_id, user_id);
    assert_eq!(redeemed.expires_at, NOW + 600);

    assert!(matches!(
        accounts.redeem_exchange_code(&code).await,
        Err(AuthError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn registration_needs_the_mailed_code() -> Result<()> {
    let h = harness(config())?;
    let accounts = h.state.accounts();
    accounts.send_verification_email("bob@example.com").await?;
    let code = h.outbox.last_code("bob@example.com")?;
    let wrong = if code == "000000" { "111111" } else { "000000" };

    let form = RegisterForm {
        name: "bob".to_string(),
        email: "bob@example.com".to_string(),
        code: wrong.to_string(),
        password: "hunter22".to_string(),
    };
    assert!(matches!(
        accounts.register(form.clone()).await,
        Err(AuthError::CredentialMismatch(_))
    ));

    h.clock.advance(301);
    let late = RegisterForm { code, ..form };
    assert!(matches!(
        accounts.register(late).await,
        Err(AuthError::CredentialMismatch(_))
    ));
    Ok(())
}

#[tokio::test]
async fn duplicate_accounts_conflict() -> Result<()> {
    let h = harness(config())?;
    register_alice(&h).await?;
    let accounts = h.state.accounts();

    accounts.send_verification_email("alice@example.com").await?;
    let code = h.outbox.last_code("alice@example.com")?;
    let same_email = RegisterForm {
        name: "alice2".to_string(),
        email: "Alice@Example.com".to_string(),
        code,
        password: "hunter22".to_string(),
    };
    assert!(matches!(
        accounts.register(same_email).await,
        Err(AuthError::Conflict(_))
    ));

    accounts.send_verification_email("other@example.com").await?;
    let code = h.outbox.last_code("other@example.com")?;
    let same_name = RegisterForm {
        name: "alice".to_string(),
        email: "other@example.com".to_string(),
        code,
        password: "hunter22".to_string(),
    };
    assert!(matches!(
        accounts.register(same_name).await,
        Err(AuthError::Conflict(_))
    ));
    Ok(())
}

#[tokio::test]
async fn single_use_email_codes_are_consumed() -> Result<()> {
    let h = harness(config().with_email_code_single_use(true))?;
    register_alice(&h).await?;
    let code = h.outbox.last_code("alice@example.com")?;

    let reuse = RegisterForm {
        name: "mallory".to_string(),
        email: "alice@example.com".to_string(),
        code,
        password: "hunter22".to_string(),
    };
    assert!(matches!(
        h.state.accounts().register(reuse).await,
        Err(AuthError::CredentialMismatch(_))
    ));
    Ok(())
}

#[tokio::test]
async fn failed_code_cleanup_keeps_the_new_account() -> Result<()> {
    let h = harness_with(config().with_email_code_single_use(true), |clock| {
        Arc::new(DeleteFails(MemoryCodeStore::new(clock)))
    })?;
    let user_id = register_alice(&h).await?;
    let accounts = h.state.accounts();

    let session = accounts.login(login_form("alice", "hunter22")).await?;
    assert_eq!(session.id, user_id);

    // the code survived, but the account it would create already exists
    let code = h.outbox.last_code("alice@example.com")?;
    let retry = RegisterForm {
        name: "alice".to_string(),
        email: "alice@example.com".to_string(),
        code,
        password: "hunter22".to_string(),
    };
    assert!(matches!(
        accounts.register(retry).await,
        Err(AuthError::Conflict(_))
    ));
    Ok(())
}

#[tokio::test]
async fn login_failures_are_distinguished() -> Result<()> {
    let h = harness(config())?;
    register_alice(&h).await?;
    let accounts = h.state.accounts();

    assert!(matches!(
        accounts.login(login_form("nobody", "hunter22")).await,
        Err(AuthError::NotFound(_))
    ));
    assert!(matches!(
        accounts.login(login_form("alice", "wrong-password")).await,
        Err(AuthError::CredentialMismatch(_))
    ));
    assert!(matches!(
        accounts.login(login_form("alice", "123")).await,
        Err(AuthError::Validation(_))
    ));
    Ok(())
}

#[tokio::test]
async fn expired_sessions_can_be_refreshed() -> Result<()> {
    let h = harness(config())?;
    register_alice(&h).await?;
    let accounts = h.state.accounts();
    let session = accounts.login(login_form("alice", "hunter22")).await?;

    h.clock.advance(601);
    assert!(matches!(
        accounts.who_am_i(&session.token),
        Err(AuthError::TokenExpired)
    ));

    let refreshed = accounts.refresh(&session.token)?;
    let claims = accounts.tokens().parse_token(&refreshed.token)?;
    assert_eq!(claims.exp, NOW + 601 + 3600);
    assert_eq!(accounts.who_am_i(&refreshed.token)?.user_info.username, "alice");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redemption_has_one_winner() -> Result<()> {
    let h = harness(config())?;
    register_alice(&h).await?;
    let session = h
        .state
        .accounts()
        .login(login_form("alice", "hunter22"))
        .await?;
    let code = h.state.accounts().issue_exchange_code(&session.token).await?;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let state = h.state.clone();
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            state.accounts().redeem_exchange_code(&code).await.is_ok()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await? {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    Ok(())
}

async fn call(app: &Router, request: Request<Body>) -> Result<(StatusCode, Option<String>, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)?
    };
    Ok((status, cookie, json))
}

fn post_json(uri: &str, body: &Value) -> Result<Request<Body>> {
    Ok(Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body)?))?)
}

#[tokio::test]
async fn http_login_sets_cookie_and_cookie_authenticates() -> Result<()> {
    let h = harness(config())?;
    let user_id = register_alice(&h).await?;
    let app = router(h.state.clone())?;

    let (status, cookie, body) = call(
        &app,
        post_json(
            "/v1/account/login",
            &json!({"name": "alice", "password": "hunter22"}),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 200);
    assert_eq!(body["msg"], "success");
    assert_eq!(body["data"]["id"], user_id);
    let cookie = cookie.ok_or_else(|| anyhow!("no session cookie"))?;
    assert!(cookie.starts_with("token="));
    assert!(cookie.contains("HttpOnly"));
    let pair = cookie.split(';').next().unwrap_or_default().to_string();

    let (status, _, body) = call(
        &app,
        Request::get("/v1/account/user")
            .header(header::COOKIE, pair)
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["userInfo"]["userId"], user_id);
    assert_eq!(body["data"]["userInfo"]["username"], "alice");
    Ok(())
}

#[tokio::test]
async fn http_login_accepts_urlencoded_forms() -> Result<()> {
    let h = harness(config())?;
    register_alice(&h).await?;
    let app = router(h.state.clone())?;

    let (status, _, body) = call(
        &app,
        Request::post("/v1/account/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=alice%40example.com&password=hunter22"))?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "alice");
    Ok(())
}

#[tokio::test]
async fn http_distinguishes_expired_from_missing_tokens() -> Result<()> {
    let h = harness(config())?;
    register_alice(&h).await?;
    let session = h
        .state
        .accounts()
        .login(login_form("alice", "hunter22"))
        .await?;
    let app = router(h.state.clone())?;

    let (status, _, body) = call(
        &app,
        Request::get("/v1/account/user").body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["msg"], "not logged in");

    let (status, _, body) = call(
        &app,
        Request::get("/v1/account/user")
            .header(header::AUTHORIZATION, "Bearer not.a.token")
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["msg"], "not logged in");

    h.clock.advance(601);
    let bearer = format!("Bearer {}", session.token);
    let (status, _, body) = call(
        &app,
        Request::get("/v1/account/user")
            .header(header::AUTHORIZATION, bearer.as_str())
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["msg"], "token expired");

    let (status, _, body) = call(
        &app,
        Request::post("/v1/account/refresh_token")
            .header(header::AUTHORIZATION, bearer.as_str())
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["token"].is_string());
    Ok(())
}

#[tokio::test]
async fn http_code_exchange_is_single_use() -> Result<()> {
    let h = harness(config())?;
    let user_id = register_alice(&h).await?;
    let session = h
        .state
        .accounts()
        .login(login_form("alice", "hunter22"))
        .await?;
    let app = router(h.state.clone())?;

    let (status, _, body) = call(
        &app,
        Request::post("/v1/account/create_code")
            .header(header::AUTHORIZATION, format!("Bearer {}", session.token))
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let code = body["data"]
        .as_str()
        .ok_or_else(|| anyhow!("code is not a string"))?
        .to_string();

    let uri = format!("/v1/account/get_token_by_code?code={code}");
    let (status, _, body) = call(&app, Request::post(uri.as_str()).body(Body::empty())?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["userId"], user_id);
    assert_eq!(body["data"]["token"], session.token.as_str());
    assert_eq!(body["data"]["expirein_time"], NOW + 600);

    let (status, _, body) = call(&app, Request::post(uri.as_str()).body(Body::empty())?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);

    let (status, _, _) = call(
        &app,
        Request::post("/v1/account/get_token_by_code").body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn http_register_through_the_api() -> Result<()> {
    let h = harness(config())?;
    let app = router(h.state.clone())?;

    let (status, _, _) = call(
        &app,
        Request::post("/v1/account/send_email_code?email=carol%40example.com")
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let code = h.outbox.last_code("carol@example.com")?;

    let form = json!({
        "name": "carol",
        "email": "carol@example.com",
        "code": code,
        "password": "hunter22",
    });
    let (status, _, body) = call(&app, post_json("/v1/account/register", &form)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["user_id"].is_i64());

    let (status, _, body) = call(&app, post_json("/v1/account/register", &form)?).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 409);

    let (status, _, _) = call(
        &app,
        Request::post("/v1/account/send_email_code?email=not-an-email")
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn health_reports_the_build() -> Result<()> {
    let h = harness(config())?;
    let app = router(h.state.clone())?;
    let (status, _, body) = call(&app, Request::get("/health").body(Body::empty())?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
    Ok(())
}
