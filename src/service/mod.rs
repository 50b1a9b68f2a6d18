//! Bank service
//!
//! Protocol-agnostic request handling: validation, authentication and
//! ownership checks in front of the store orchestrators. A transport
//! (gRPC, HTTP) maps requests onto these methods and `ServiceError` onto
//! its status codes.

pub mod error;
pub mod types;
pub mod validation;

pub use error::ServiceError;
pub use types::{
    CreateAccountRequest, CreateUserRequest, LoginUserRequest, LoginUserResponse,
    TransferRequest, UserView, VerifyEmailRequest, VerifyEmailResponse,
};
pub use validation::ValidationError;

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db::{
    Account, CreateAccountParams, CreateUserParams, CreateUserTxParams, CreateVerifyEmailParams,
    Store, StoreError, TransferTxParams, TransferTxResult, TxBackend, VerifyEmail,
    VerifyEmailTxParams,
};
use crate::token::{JwtMaker, Maker, Payload, TokenError};
use crate::util::{Currency, check_password, hash_password, random_secret_code};
use crate::worker::{SendVerifyEmail, TaskDistributor, TaskOptions};
use validation::{
    validate_email, validate_full_name, validate_password, validate_positive,
    validate_secret_code, validate_username, violations,
};

pub struct BankService<B: TxBackend> {
    config: AppConfig,
    store: Arc<Store<B>>,
    token_maker: Arc<dyn Maker>,
    distributor: Arc<dyn TaskDistributor>,
}

impl<B: TxBackend> BankService<B> {
    pub fn new(
        config: AppConfig,
        store: Arc<Store<B>>,
        distributor: Arc<dyn TaskDistributor>,
    ) -> Result<Self, TokenError> {
        let token_maker = Arc::new(JwtMaker::new(&config.token_symmetric_key)?);
        Ok(Self {
            config,
            store,
            token_maker,
            distributor,
        })
    }

    pub fn store(&self) -> &Arc<Store<B>> {
        &self.store
    }

    pub fn token_maker(&self) -> &Arc<dyn Maker> {
        &self.token_maker
    }

    fn authorize(&self, access_token: &str) -> Result<Payload, ServiceError> {
        self.token_maker
            .verify_token(access_token)
            .map_err(|e| ServiceError::Unauthenticated(e.to_string()))
    }

    pub async fn create_user(&self, req: CreateUserRequest) -> Result<UserView, ServiceError> {
        let errs = violations([
            validate_username(&req.username),
            validate_password(&req.password),
            validate_full_name(&req.full_name),
            validate_email(&req.email),
        ]);
        if !errs.is_empty() {
            return Err(ServiceError::InvalidArgument(errs));
        }

        let hashed_password =
            hash_password(&req.password).map_err(|e| ServiceError::Internal(e.to_string()))?;

        let hook = SendVerifyEmail::new(
            self.distributor.clone(),
            TaskOptions::from(&self.config.task),
        );
        let result = self
            .store
            .create_user_tx(CreateUserTxParams {
                user: CreateUserParams {
                    username: req.username,
                    hashed_password,
                    full_name: req.full_name,
                    email: req.email,
                },
                after_create: Arc::new(hook),
            })
            .await?;

        Ok(UserView::from(&result.user))
    }

    pub async fn login_user(&self, req: LoginUserRequest) -> Result<LoginUserResponse, ServiceError> {
        const BAD_CREDENTIALS: &str = "incorrect username or password";

        let user = match self.store.get_user(&req.username).await {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => {
                return Err(ServiceError::Unauthenticated(BAD_CREDENTIALS.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if check_password(&req.password, &user.hashed_password).is_err() {
            warn!(username = %req.username, "Login rejected");
            return Err(ServiceError::Unauthenticated(BAD_CREDENTIALS.to_string()));
        }

        let (access_token, payload) = self
            .token_maker
            .create_token(&user.username, self.config.access_token_duration())
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        info!(username = %user.username, token_id = %payload.id, "User logged in");
        Ok(LoginUserResponse {
            access_token,
            access_token_expires_at: payload.expired_at,
            user: UserView::from(&user),
        })
    }

    pub async fn create_account(
        &self,
        access_token: &str,
        req: CreateAccountRequest,
    ) -> Result<Account, ServiceError> {
        let payload = self.authorize(access_token)?;
        let currency: Currency = req.currency.parse().map_err(|_| {
            ServiceError::InvalidArgument(vec![ValidationError::InvalidFormat {
                field: "currency",
                value: req.currency.clone(),
                expected: "USD, EUR or CAD",
            }])
        })?;

        let arg = CreateAccountParams {
            owner: payload.username,
            balance: 0,
            currency: currency.to_string(),
        };
        let account = self
            .store
            .exec_tx(move |q| q.create_account(arg))
            .await?;

        info!(account_id = account.id, owner = %account.owner, currency = %account.currency, "Account created");
        Ok(account)
    }

    pub async fn create_transfer(
        &self,
        access_token: &str,
        req: TransferRequest,
    ) -> Result<TransferTxResult, ServiceError> {
        let payload = self.authorize(access_token)?;

        let mut errs = violations([
            validate_positive("from_account_id", req.from_account_id),
            validate_positive("to_account_id", req.to_account_id),
            validate_positive("amount", req.amount),
        ]);
        if req.currency.parse::<Currency>().is_err() {
            errs.push(ValidationError::InvalidFormat {
                field: "currency",
                value: req.currency.clone(),
                expected: "USD, EUR or CAD",
            });
        }
        if !errs.is_empty() {
            return Err(ServiceError::InvalidArgument(errs));
        }

        let from_account = self.valid_account(req.from_account_id, &req.currency).await?;
        if from_account.owner != payload.username {
            return Err(ServiceError::PermissionDenied(
                "from account doesn't belong to the authenticated user".to_string(),
            ));
        }
        self.valid_account(req.to_account_id, &req.currency).await?;

        let result = self
            .store
            .transfer_tx(TransferTxParams {
                from_account_id: req.from_account_id,
                to_account_id: req.to_account_id,
                amount: req.amount,
            })
            .await?;
        Ok(result)
    }

    async fn valid_account(&self, account_id: i64, currency: &str) -> Result<Account, ServiceError> {
        let account = self.store.get_account(account_id).await?;
        if account.currency != currency {
            return Err(ServiceError::CurrencyMismatch {
                account_id,
                expected: currency.to_string(),
                actual: account.currency,
            });
        }
        Ok(account)
    }

    /// Create a verification record for `username` with a fresh secret code
    ///
    /// Runs when the send-verify-email task is processed, before the link is
    /// mailed.
    pub async fn issue_verify_email(&self, username: &str) -> Result<VerifyEmail, ServiceError> {
        let ttl = chrono::Duration::from_std(self.config.verify_email_ttl())
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        let username = username.to_string();

        let record = self
            .store
            .exec_tx(move |q| {
                Box::pin(async move {
                    let user = q.get_user(&username).await?;
                    q.create_verify_email(CreateVerifyEmailParams {
                        username: user.username,
                        email: user.email,
                        secret_code: random_secret_code(),
                        expired_at: Utc::now() + ttl,
                    })
                    .await
                })
            })
            .await?;

        info!(email_id = record.id, username = %record.username, "Verify email issued");
        Ok(record)
    }

    pub async fn verify_email(
        &self,
        req: VerifyEmailRequest,
    ) -> Result<VerifyEmailResponse, ServiceError> {
        let errs = violations([
            validate_positive("email_id", req.email_id),
            validate_secret_code(&req.secret_code),
        ]);
        if !errs.is_empty() {
            return Err(ServiceError::InvalidArgument(errs));
        }

        let result = self
            .store
            .verify_email_tx(VerifyEmailTxParams {
                email_id: req.email_id,
                secret_code: req.secret_code,
            })
            .await?;

        Ok(VerifyEmailResponse {
            is_verified: result.user.is_email_verified,
        })
    }
}
