use std::collections::VecDeque;
use std::env;
use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

use studybuddy_backend::ai::{ChatModel, ChatRole, ChatTurn};
use studybuddy_backend::billing::{BillingProvider, CheckoutSession, CheckoutStatus};
use studybuddy_backend::config::AppConfig;
use studybuddy_backend::db::{self, PgPool};
use studybuddy_backend::error::AppError;
use studybuddy_backend::models::User;
use studybuddy_backend::routes;
use studybuddy_backend::state::AppState;

#[allow(dead_code)]
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// One recorded model invocation: the system prompt plus the
/// conversation turns, roles lowered to plain strings.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct RecordedChatCall {
    pub system_prompt: String,
    pub turns: Vec<(String, String)>,
}

/// Scripted stand-in for the chat model: replies are queued up front and
/// handed out in order; running dry surfaces an upstream error exactly
/// like a dead OpenAI connection would.
#[derive(Default)]
pub struct FakeChatModel {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<RecordedChatCall>>,
}

impl FakeChatModel {
    pub async fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().await.push_back(reply.into());
    }

    #[allow(dead_code)]
    pub async fn calls(&self) -> Vec<RecordedChatCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ChatModel for FakeChatModel {
    async fn converse(&self, system_prompt: &str, turns: &[ChatTurn]) -> Result<String, AppError> {
        let recorded = RecordedChatCall {
            system_prompt: system_prompt.to_string(),
            turns: turns
                .iter()
                .map(|turn| {
                    let role = match turn.role {
                        ChatRole::User => "user",
                        ChatRole::Assistant => "assistant",
                    };
                    (role.to_string(), turn.content.clone())
                })
                .collect(),
        };
        self.calls.lock().await.push(recorded);
        self.replies
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| AppError::upstream("no scripted model reply"))
    }
}

/// Billing fake that hands out canned sessions and records cancellations.
#[derive(Default)]
pub struct FakeBilling {
    canceled: Mutex<Vec<String>>,
}

impl FakeBilling {
    #[allow(dead_code)]
    pub async fn canceled_subscriptions(&self) -> Vec<String> {
        self.canceled.lock().await.clone()
    }
}

#[async_trait]
impl BillingProvider for FakeBilling {
    async fn create_checkout_session(
        &self,
        user_id: Uuid,
        email: &str,
        _plan: &str,
    ) -> Result<CheckoutSession, AppError> {
        Ok(CheckoutSession {
            id: format!("cs_test_{user_id}"),
            client_secret: format!("cs_secret_{email}"),
        })
    }

    async fn checkout_session_status(&self, _session_id: &str) -> Result<CheckoutStatus, AppError> {
        Ok(CheckoutStatus {
            status: "complete".to_string(),
            customer_email: None,
        })
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), AppError> {
        self.canceled.lock().await.push(subscription_id.to_string());
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    ai: Arc<FakeChatModel>,
    billing: Arc<FakeBilling>,
}

impl TestApp {
    /// Returns `None` (after logging) when `TEST_DATABASE_URL` is unset,
    /// so the suite passes on machines without a Postgres.
    pub async fn new() -> Result<Option<Self>> {
        Self::build(true, false).await
    }

    /// Same app without AI or billing wired up, for exercising the
    /// missing-credential degradation paths.
    #[allow(dead_code)]
    pub async fn new_without_providers() -> Result<Option<Self>> {
        Self::build(false, false).await
    }

    /// App with Notion OAuth credentials present, so the OAuth endpoints
    /// get past the configuration gate.
    #[allow(dead_code)]
    pub async fn new_with_notion() -> Result<Option<Self>> {
        Self::build(true, true).await
    }

    async fn build(with_providers: bool, with_notion: bool) -> Result<Option<Self>> {
        let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL is not set; skipping integration test");
            return Ok(None);
        };

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_days: 7,
            cors_allowed_origin: None,
            client_url: Some("http://localhost:5173".to_string()),
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            stripe_secret_key: None,
            stripe_webhook_secret: Some(TEST_WEBHOOK_SECRET.to_string()),
            stripe_price_paid: None,
            notion_client_id: with_notion.then(|| "notion-client-test".to_string()),
            notion_client_secret: with_notion.then(|| "notion-secret-test".to_string()),
            notion_redirect_uri: with_notion
                .then(|| "http://localhost:5173/notion/callback".to_string()),
            public_session_ttl_hours: 24,
            public_session_capacity: 100,
            public_daily_limit: 2,
        };

        let pool = db::init_pool(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let ai = Arc::new(FakeChatModel::default());
        let billing = Arc::new(FakeBilling::default());
        let ai_for_state = with_providers.then(|| ai.clone() as Arc<dyn ChatModel>);
        let billing_for_state = with_providers.then(|| billing.clone() as Arc<dyn BillingProvider>);

        let state = AppState::new(pool, config, ai_for_state, billing_for_state);
        let router = routes::create_router(state.clone());

        Ok(Some(Self {
            state,
            router,
            ai,
            billing,
        }))
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    #[allow(dead_code)]
    pub fn ai(&self) -> Arc<FakeChatModel> {
        self.ai.clone()
    }

    #[allow(dead_code)]
    pub fn billing(&self) -> Arc<FakeBilling> {
        self.billing.clone()
    }

    /// Registers through the API and returns the new user's id and token.
    pub async fn register(&self, email: &str, password: &str) -> Result<(Uuid, String)> {
        #[derive(Serialize)]
        struct RegisterPayload<'a> {
            email: &'a str,
            password: &'a str,
            first_name: &'a str,
            last_name: &'a str,
        }

        let response = self
            .post_json(
                "/api/auth/register",
                &RegisterPayload {
                    email,
                    password,
                    first_name: "Test",
                    last_name: "Student",
                },
                None,
            )
            .await?;
        ensure!(
            response.status() == StatusCode::CREATED,
            "registration failed with status {}",
            response.status()
        );

        let body = body_to_vec(response.into_body()).await?;
        #[derive(serde::Deserialize)]
        struct RegisteredUser {
            id: Uuid,
        }
        #[derive(serde::Deserialize)]
        struct RegisterResponse {
            access_token: String,
            user: RegisteredUser,
        }
        let parsed: RegisterResponse = serde_json::from_slice(&body)?;
        Ok((parsed.user.id, parsed.access_token))
    }

    #[allow(dead_code)]
    pub async fn login_token(&self, email: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            email: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json("/api/auth/login", &LoginPayload { email, password }, None)
            .await?;
        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = body_to_vec(response.into_body()).await?;
        #[derive(serde::Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = serde_json::from_slice(&body)?;
        Ok(parsed.access_token)
    }

    #[allow(dead_code)]
    pub async fn user_row(&self, user_id: Uuid) -> Result<User> {
        self.with_conn(move |conn| {
            use studybuddy_backend::schema::users::dsl;
            dsl::users
                .filter(dsl::id.eq(user_id))
                .first::<User>(conn)
                .context("failed to load user row")
        })
        .await
    }

    /// Plants a Notion authorization row the way a completed OAuth
    /// callback would.
    #[allow(dead_code)]
    pub async fn connect_notion(&self, user_id: Uuid, workspace: &str) -> Result<()> {
        let workspace = workspace.to_string();
        self.with_conn(move |conn| {
            use studybuddy_backend::schema::notion_authorizations::dsl;
            diesel::insert_into(dsl::notion_authorizations)
                .values((
                    dsl::id.eq(Uuid::new_v4()),
                    dsl::user_id.eq(user_id),
                    dsl::access_token.eq("secret_test_token"),
                    dsl::workspace_id.eq("ws_test"),
                    dsl::workspace_name.eq(&workspace),
                ))
                .execute(conn)
                .context("failed to insert notion authorization")?;
            Ok(())
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn set_stripe_fields(
        &self,
        user_id: Uuid,
        customer: &str,
        subscription: Option<&str>,
    ) -> Result<()> {
        let customer = customer.to_string();
        let subscription = subscription.map(str::to_string);
        self.with_conn(move |conn| {
            use studybuddy_backend::schema::users::dsl;
            diesel::update(dsl::users.filter(dsl::id.eq(user_id)))
                .set((
                    dsl::stripe_customer_id.eq(&customer),
                    dsl::subscription_id.eq(subscription.as_deref()),
                ))
                .execute(conn)
                .context("failed to set stripe fields")?;
            Ok(())
        })
        .await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::PATCH)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let builder = Request::builder().method(Method::DELETE).uri(path);
        let builder = if let Some(token) = token {
            builder.header("authorization", format!("Bearer {token}"))
        } else {
            builder
        };
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    /// Posts raw bytes with caller-supplied headers; used for webhook
    /// payloads where the body must stay byte-exact.
    #[allow(dead_code)]
    pub async fn post_raw(
        &self,
        path: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::POST).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn upload_file(
        &self,
        path: &str,
        filename: &str,
        content_type: &str,
        data: &[u8],
        title: Option<&str>,
        folder_id: Option<Uuid>,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend(data);
        body.extend(b"\r\n");

        if let Some(title) = title {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(b"Content-Disposition: form-data; name=\"title\"\r\n\r\n");
            body.extend(title.as_bytes());
            body.extend(b"\r\n");
        }

        if let Some(folder) = folder_id {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(b"Content-Disposition: form-data; name=\"folder_id\"\r\n\r\n");
            body.extend(folder.to_string().as_bytes());
            body.extend(b"\r\n");
        }

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            );
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }

        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn body_to_json(body: Body) -> Result<serde_json::Value> {
    let bytes = body_to_vec(body).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Builds a valid `stripe-signature` header for `payload`.
#[allow(dead_code)]
pub fn stripe_signature(payload: &[u8], secret: &str, timestamp: i64) -> String {
    use hmac::Mac;

    let mut mac = hmac::Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes())
        .expect("hmac accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(db::MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE notion_authorizations, ai_chats, summaries, multiple_choice_quizzes, \
         flashcard_sessions, uploads, folders, users RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
