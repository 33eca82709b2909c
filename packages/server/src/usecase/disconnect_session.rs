//! UseCase: セッションの登録解除

use std::sync::Arc;

use crate::{
    domain::UserId,
    infrastructure::registry::{ConnectionRegistry, Mailbox},
};

/// セッション切断のユースケース
pub struct DisconnectSessionUseCase {
    registry: Arc<ConnectionRegistry>,
}

impl DisconnectSessionUseCase {
    /// 新しい DisconnectSessionUseCase を作成
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// セッションの登録を解除し、mailbox を閉じる
    ///
    /// 既に新しいセッションに置き換えられている場合、そのエントリは残す。
    ///
    /// # Returns
    ///
    /// `true` if this session's entry was removed
    pub async fn execute(&self, user: UserId, mailbox: &Mailbox) -> bool {
        let removed = self.registry.unregister(user, mailbox).await;
        mailbox.close();
        if removed {
            tracing::info!(user_id = %user, "Session disconnected");
        } else {
            tracing::debug!(user_id = %user, "Session already replaced or evicted");
        }
        removed
    }
}
