//! HTTP contract tests driving the router with `oneshot`.

use anyhow::{Result, anyhow};
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{Value, json};
use tessera::{
    api::{Database, app},
    auth::LOGIN_NOTICE_TITLE,
    config::CoreConfig,
    core::{Backends, Core, MemoryHandles},
    email::EmailTemplate,
    store::{NewUser, Role},
};
use tower::ServiceExt;
use uuid::Uuid;

const BOUNDARY: &str = "tessera-test-boundary";

fn setup() -> (Router, MemoryHandles) {
    let config = CoreConfig::new(
        SecretString::from("http-access-secret"),
        SecretString::from("http-refresh-secret"),
        SecretString::from("http-credential-key"),
    );
    let (backends, handles) = Backends::memory();
    let core = Core::new(&config, backends);
    (app(core, Database::InMemory, None), handles)
}

async fn seed(handles: &MemoryHandles, email: &str, role: Role) -> Uuid {
    let id = Uuid::new_v4();
    handles
        .store
        .seed_user(
            NewUser {
                id,
                name: "Ada Lovelace".to_string(),
                email: email.to_string(),
                password: String::new(),
                role,
                phone_number: "555-0100".to_string(),
                address: None,
                state: None,
            }
            .into_user(Utc::now()),
        )
        .await;
    id
}

async fn send(app: &Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}

fn post(uri: &str) -> Result<Request<Body>> {
    Ok(Request::post(uri).body(Body::empty())?)
}

fn post_json(uri: &str, body: &Value, token: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    Ok(builder.body(Body::from(serde_json::to_vec(body)?))?)
}

fn str_at<'a>(body: &'a Value, pointer: &str) -> Result<&'a str> {
    body.pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing {pointer} in {body}"))
}

async fn latest_otp(handles: &MemoryHandles, email: &str) -> Result<String> {
    handles
        .queue
        .pending_jobs()
        .await
        .into_iter()
        .rev()
        .find_map(|job| match job.template {
            EmailTemplate::OtpEmail { otp, .. } if job.to == email => Some(otp),
            _ => None,
        })
        .ok_or_else(|| anyhow!("no otp email queued for {email}"))
}

/// Log in through the OTP endpoints and return `(access, refresh)`.
async fn otp_login(app: &Router, handles: &MemoryHandles, email: &str) -> Result<(String, String)> {
    let (status, body) = send(app, post(&format!("/v1/auth/login/otp/{email}"))?).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    let session_token = str_at(&body, "/data/session_token")?.to_string();

    let (status, _) = send(
        app,
        post(&format!(
            "/v1/auth/login/otp/{email}/session/{session_token}"
        ))?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let otp = latest_otp(handles, email).await?;
    let (status, body) = send(
        app,
        post_json(
            &format!("/v1/auth/login/otp/{email}/verify/{session_token}"),
            &json!({ "otp": otp }),
            None,
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], json!(true));
    Ok((
        str_at(&body, "/data/access_token")?.to_string(),
        str_at(&body, "/data/refresh_token")?.to_string(),
    ))
}

fn vendor_form(email: &str) -> Result<Request<Body>> {
    let mut body = String::new();
    for (name, value) in [
        ("name", "Grace Hopper"),
        ("email", email),
        ("phone_number", "555-0199"),
        ("company_name", "Cobol Works"),
        ("designation", "Founder"),
        ("company_address", "1 Harbor Way"),
        ("state", "Lagos"),
    ] {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"trade_license\"; filename=\"licence.pdf\"\r\nContent-Type: application/pdf\r\n\r\n%PDF-1.7 test\r\n--{BOUNDARY}--\r\n"
    ));
    Ok(Request::post("/v1/vendors")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))?)
}

#[tokio::test]
async fn health_reports_memory_backends() -> Result<()> {
    let (app, _handles) = setup();
    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    Ok(())
}

#[tokio::test]
async fn request_id_is_propagated() -> Result<()> {
    let (app, _handles) = setup();
    let response = app
        .clone()
        .oneshot(
            Request::get("/health")
                .header("x-request-id", "req-123")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok()),
        Some("req-123")
    );
    Ok(())
}

#[tokio::test]
async fn otp_login_refresh_logout() -> Result<()> {
    let (app, handles) = setup();
    seed(&handles, "ada@example.com", Role::Consumer).await;

    let (access, _refresh) = otp_login(&app, &handles, "ada@example.com").await?;

    let refresh = Request::post("/v1/auth/refresh")
        .header(header::AUTHORIZATION, format!("Bearer {access}"))
        .body(Body::empty())?;
    let (status, body) = send(&app, refresh).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(!str_at(&body, "/data/access_token")?.is_empty());

    let logout = Request::post("/v1/auth/logout")
        .header(header::AUTHORIZATION, format!("Bearer {access}"))
        .body(Body::empty())?;
    let (status, _) = send(&app, logout).await?;
    assert_eq!(status, StatusCode::OK);

    let refresh = Request::post("/v1/auth/refresh")
        .header(header::AUTHORIZATION, format!("Bearer {access}"))
        .body(Body::empty())?;
    let (status, body) = send(&app, refresh).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["status_code"], json!(401));
    Ok(())
}

#[tokio::test]
async fn otp_errors_map_to_status_codes() -> Result<()> {
    let (app, handles) = setup();
    seed(&handles, "ada@example.com", Role::Consumer).await;

    let (status, _) = send(&app, post("/v1/auth/login/otp/not-an-email")?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, post("/v1/auth/login/otp/nobody@example.com")?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, post("/v1/auth/login/otp/ada@example.com")?).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, post("/v1/auth/login/otp/ada@example.com")?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        json!("OTP already sent, Please check your email")
    );

    let (status, body) = send(
        &app,
        post("/v1/auth/login/otp/ada@example.com/session/garbage")?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], json!("Invalid Session"));
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_bearer() -> Result<()> {
    let (app, _handles) = setup();

    let (status, _) = send(
        &app,
        Request::get("/v1/notifications").body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, post("/v1/auth/logout")?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        Request::get("/v1/notifications")
            .header(header::AUTHORIZATION, "Bearer not.a.token")
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn vendor_onboarding_over_http() -> Result<()> {
    let (app, handles) = setup();
    seed(&handles, "admin@tessera.dev", Role::Admin).await;
    seed(&handles, "ada@example.com", Role::Consumer).await;

    let (status, body) = send(&app, vendor_form("grace@vendor.example")?).await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let vendor_id = str_at(&body, "/data/vendor_id")?.to_string();
    assert_eq!(handles.blobs.len().await, 1);

    // Same email again conflicts.
    let (status, _) = send(&app, vendor_form("grace@vendor.example")?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let credential = json!({ "email": "grace@vendor.example", "password": "s3cret-pass" });
    let (status, _) = send(
        &app,
        post_json("/v1/auth/login/credential", &credential, None)?,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A consumer cannot verify vendors.
    let (consumer, _) = otp_login(&app, &handles, "ada@example.com").await?;
    let (status, _) = send(
        &app,
        post_json(
            &format!("/v1/vendors/{vendor_id}/verify"),
            &json!({ "password": "s3cret-pass" }),
            Some(&consumer),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (admin, _) = otp_login(&app, &handles, "admin@tessera.dev").await?;
    let (status, body) = send(
        &app,
        post_json(
            &format!("/v1/vendors/{vendor_id}/verify"),
            &json!({ "password": "s3cret-pass" }),
            Some(&admin),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = send(
        &app,
        post_json("/v1/auth/login/credential", &credential, None)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(str_at(&body, "/data/user/role")?, "vendor");
    let vendor_access = str_at(&body, "/data/access_token")?.to_string();

    let (status, body) = send(
        &app,
        Request::get("/v1/notifications?page=1&limit=10")
            .header(header::AUTHORIZATION, format!("Bearer {vendor_access}"))
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["total"], json!(1));
    assert_eq!(body["data"]["items"][0]["type"], json!("info"));
    Ok(())
}

#[tokio::test]
async fn vendor_form_without_license_is_rejected() -> Result<()> {
    let (app, handles) = setup();
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"email\"\r\n\r\ngrace@vendor.example\r\n--{BOUNDARY}--\r\n"
    );
    let request = Request::post("/v1/vendors")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))?;
    let (status, _) = send(&app, request).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(handles.store.user_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn admins_create_admins() -> Result<()> {
    let (app, handles) = setup();
    seed(&handles, "admin@tessera.dev", Role::Admin).await;
    let (admin, _) = otp_login(&app, &handles, "admin@tessera.dev").await?;

    let payload = json!({
        "name": "Second Admin",
        "email": "second@tessera.dev",
        "phone_number": "555-0123",
        "password": "another-pass",
        "address": "2 Main St",
    });
    let (status, body) = send(&app, post_json("/v1/admins", &payload, Some(&admin))?).await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, _) = send(&app, post_json("/v1/admins", &payload, Some(&admin))?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        post_json(
            "/v1/auth/login/credential",
            &json!({ "email": "second@tessera.dev", "password": "another-pass" }),
            None,
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(str_at(&body, "/data/user/role")?, "admin");
    Ok(())
}

#[tokio::test]
async fn notification_paging_is_validated() -> Result<()> {
    let (app, handles) = setup();
    seed(&handles, "ada@example.com", Role::Consumer).await;
    let (access, _) = otp_login(&app, &handles, "ada@example.com").await?;

    let (status, _) = send(
        &app,
        Request::get("/v1/notifications?page=0")
            .header(header::AUTHORIZATION, format!("Bearer {access}"))
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Request::get("/v1/notifications")
            .header(header::AUTHORIZATION, format!("Bearer {access}"))
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    // The OTP login itself left a notice.
    assert_eq!(body["data"]["total"], json!(1));
    assert_eq!(str_at(&body, "/data/items/0/title")?, LOGIN_NOTICE_TITLE);
    assert_eq!(body["data"]["page"], json!(1));
    assert_eq!(body["data"]["limit"], json!(10));
    Ok(())
}

#[tokio::test]
async fn consumer_sign_up_then_otp_login() -> Result<()> {
    let (app, handles) = setup();
    let payload = json!({
        "name": "Ada Lovelace",
        "email": "Ada@Example.com",
        "phone_number": "555-0100",
    });

    let (status, body) = send(&app, post_json("/v1/users", &payload, None)?).await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let user_id = str_at(&body, "/data/user_id")?.to_string();

    let (status, body) = send(&app, post_json("/v1/users", &payload, None)?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], json!("User already exists"));

    let (status, _) = send(
        &app,
        post_json("/v1/users", &json!({ "name": "", "email": "x@example.com" }), None)?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (access, _) = otp_login(&app, &handles, "ada@example.com").await?;
    let (status, body) = send(
        &app,
        Request::get("/v1/notifications")
            .header(header::AUTHORIZATION, format!("Bearer {access}"))
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(str_at(&body, "/data/items/0/user_name")?, "Ada Lovelace");
    assert_eq!(handles.store.user_count().await, 1);
    assert_eq!(handles.store.vendor_count().await, 0);
    assert!(Uuid::parse_str(&user_id).is_ok());
    Ok(())
}
