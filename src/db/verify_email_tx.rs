//! Exactly-once email verification
//!
//! The verify record is consumed by a conditional update (matching code,
//! unused, unexpired). Only the scope that flips `is_used` goes on to mark the
//! user verified; a replayed or expired code matches zero rows.

use tracing::{info, warn};

use super::error::StoreError;
use super::models::{UpdateUserParams, UpdateVerifyEmailParams, User, VerifyEmail};
use super::store::{Store, TxBackend};

#[derive(Debug, Clone)]
pub struct VerifyEmailTxParams {
    pub email_id: i64,
    pub secret_code: String,
}

#[derive(Debug, Clone)]
pub struct VerifyEmailTxResult {
    pub user: User,
    pub verify_email: VerifyEmail,
}

impl<B: TxBackend> Store<B> {
    pub async fn verify_email_tx(
        &self,
        arg: VerifyEmailTxParams,
    ) -> Result<VerifyEmailTxResult, StoreError> {
        let email_id = arg.email_id;

        let result = self
            .exec_tx(move |q| {
                Box::pin(async move {
                    let verify_email = q
                        .update_verify_email(UpdateVerifyEmailParams {
                            id: arg.email_id,
                            secret_code: arg.secret_code,
                        })
                        .await?
                        .ok_or(StoreError::InvalidOrExpiredCode)?;

                    let user = q
                        .update_user(UpdateUserParams {
                            username: verify_email.username.clone(),
                            is_email_verified: Some(true),
                            ..Default::default()
                        })
                        .await?;

                    Ok(VerifyEmailTxResult { user, verify_email })
                })
            })
            .await;

        match &result {
            Ok(r) => info!(email_id, username = %r.user.username, "Email verified"),
            Err(e) => warn!(email_id, error = %e, "Email verification rejected"),
        }
        result
    }
}
