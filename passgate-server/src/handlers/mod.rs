//! HTTP request handlers
//!
//! Organized by API surface: passkey ceremonies, wallet operations, health.

pub mod auth;
pub mod health;
pub mod wallet;

pub use auth::{
    LoginBeginRequest, LoginCompleteResponse, RegisterBeginRequest, RegisterCompleteResponse,
};
pub use health::HealthResponse;
pub use wallet::{
    BalanceResponse, DepositBeginRequest, MutationResponse, StepUpBeginResponse,
    StepUpCompleteRequest, TransferBeginRequest,
};
