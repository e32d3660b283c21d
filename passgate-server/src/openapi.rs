//! OpenAPI documentation configuration
//!
//! Generates OpenAPI 3.0 specification for the Passgate wallet API.

use utoipa::OpenApi;

use crate::handlers::{
    BalanceResponse, DepositBeginRequest, HealthResponse, LoginBeginRequest,
    LoginCompleteResponse, MutationResponse, RegisterBeginRequest, RegisterCompleteResponse,
    StepUpBeginResponse, TransferBeginRequest,
};

/// Passgate Wallet API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Passgate Wallet API",
        version = "0.1.0",
        description = r#"
## Passkey-Gated Wallet API

Passgate is a demonstration wallet where every account action is proven with
a **passkey** (WebAuthn/FIDO2):

- **Registration and login** run full WebAuthn ceremonies with single-use,
  five-minute challenges
- **Deposits and transfers** are step-up gated: the operation is parked
  server-side and only executes after a fresh assertion over its own
  challenge
- **Sign counters** are tracked to detect cloned authenticators

### How It Works

1. `POST /auth/register/begin` then `complete` to enroll a passkey
2. `POST /auth/login/begin` then `complete` to authenticate
3. For money movement, `begin` parks the operation and returns assertion
   options; `complete` carries the signed assertion and the operation id
4. Each parked operation resolves **at most once**, regardless of
   concurrent attempts
"#,
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    tags(
        (name = "Passkeys", description = "WebAuthn registration and authentication ceremonies"),
        (name = "Wallet", description = "Step-up gated deposits and transfers, balance and history"),
        (name = "Health", description = "Service health endpoint")
    ),
    paths(
        crate::handlers::auth::register_begin,
        crate::handlers::auth::register_complete,
        crate::handlers::auth::login_begin,
        crate::handlers::auth::login_complete,
        crate::handlers::wallet::deposit_begin,
        crate::handlers::wallet::deposit_complete,
        crate::handlers::wallet::transfer_begin,
        crate::handlers::wallet::transfer_complete,
        crate::handlers::wallet::balance,
        crate::handlers::wallet::transactions,
        crate::handlers::health::health,
    ),
    components(
        schemas(
            RegisterBeginRequest,
            RegisterCompleteResponse,
            LoginBeginRequest,
            LoginCompleteResponse,
            DepositBeginRequest,
            TransferBeginRequest,
            StepUpBeginResponse,
            MutationResponse,
            BalanceResponse,
            HealthResponse,
        )
    )
)]
pub struct ApiDoc;
