//! UseCase: ハンドシェイク認証
//!
//! ### 何をテストしているか
//! - ロック中のキーは認証ポートに到達する前に拒否される
//! - 同時に検証中の試行も上限に数えられる
//! - 失敗・成功がレートリミッタに記録される
//!
//! ### どのような状況を想定しているか
//! - 正常系：有効なトークン
//! - 異常系：無効なトークン、不正なハンドシェイクフレーム、ロックアウト

use std::sync::Arc;

use crate::{
    domain::{AuthToken, RateLimitKey, TokenVerifier, UserId},
    infrastructure::rate_limiter::{AttemptPermit, FailureOutcome, RateLimitError, RateLimiter},
};

use super::error::HandshakeError;

/// ハンドシェイク認証のユースケース
pub struct AuthenticateUseCase {
    verifier: Arc<dyn TokenVerifier>,
    rate_limiter: Arc<RateLimiter>,
}

impl AuthenticateUseCase {
    /// 新しい AuthenticateUseCase を作成
    pub fn new(verifier: Arc<dyn TokenVerifier>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            verifier,
            rate_limiter,
        }
    }

    /// トークンを検証してユーザー ID を返す
    ///
    /// # Arguments
    ///
    /// * `key` - レート制限キー（クライアントアドレス由来）
    /// * `token` - ハンドシェイクで提示されたトークン
    ///
    /// # Returns
    ///
    /// * `Ok(UserId)` - 認証成功
    /// * `Err(HandshakeError)` - 認証失敗またはロック中
    pub async fn execute(
        &self,
        key: &RateLimitKey,
        token: &AuthToken,
    ) -> Result<UserId, HandshakeError> {
        // 1. ロック中、または残り回数分の試行が検証中なら認証ポートを呼ばない
        let permit = self.admit(key)?;

        // 2. 認証ポートで検証
        match self.verifier.verify(token).await {
            Ok(user) => {
                permit.succeed();
                Ok(user)
            }
            Err(_) => Err(Self::fail(key, permit)),
        }
    }

    /// 不正なハンドシェイクフレームを失敗として記録する
    pub fn reject_malformed(&self, key: &RateLimitKey) -> HandshakeError {
        match self.admit(key) {
            Ok(permit) => Self::fail(key, permit),
            Err(e) => e,
        }
    }

    fn admit(&self, key: &RateLimitKey) -> Result<AttemptPermit<'_>, HandshakeError> {
        self.rate_limiter.acquire(key).map_err(|e| match e {
            RateLimitError::LockedOut { retry_after } => HandshakeError::LockedOut { retry_after },
            RateLimitError::Saturated => {
                tracing::debug!(key = %key, "Handshake rejected, attempts in flight");
                HandshakeError::Rejected
            }
        })
    }

    fn fail(key: &RateLimitKey, permit: AttemptPermit<'_>) -> HandshakeError {
        match permit.fail() {
            FailureOutcome::Counted { remaining } => {
                tracing::debug!(key = %key, remaining, "Handshake rejected");
            }
            FailureOutcome::LockedOut { .. } => {
                tracing::info!(key = %key, "Handshake rejected, key locked out");
            }
        }
        HandshakeError::Rejected
    }
}
