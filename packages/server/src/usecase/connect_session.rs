//! UseCase: 認証済みセッションの登録
//!
//! ### 何をテストしているか
//! - 登録後に未読バックログが古い順に mailbox へ投入される
//! - バックログが mailbox 容量を超えても、消費に合わせて全件届く
//! - 同一ユーザーの再接続で古いセッションが閉じられる
//! - バックログ取得の失敗は接続を妨げない

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    domain::{MessageRepository, UserId},
    infrastructure::{
        dto::websocket::ServerEnvelope,
        registry::{ConnectionRegistry, Frame, Mailbox, Offer},
    },
};

/// Result of registering a session
#[derive(Debug)]
pub struct Connected {
    /// An older session of the same user was closed
    pub evicted_previous: bool,
    /// Backlog delivery running alongside the session; yields the number of
    /// frames queued
    pub backlog: JoinHandle<usize>,
}

/// セッション登録のユースケース
pub struct ConnectSessionUseCase {
    registry: Arc<ConnectionRegistry>,
    repository: Arc<dyn MessageRepository>,
}

impl ConnectSessionUseCase {
    /// 新しい ConnectSessionUseCase を作成
    pub fn new(registry: Arc<ConnectionRegistry>, repository: Arc<dyn MessageRepository>) -> Self {
        Self {
            registry,
            repository,
        }
    }

    /// セッションを登録し、未読バックログの配送を開始する
    ///
    /// バックログは別タスクで配送される。mailbox の消費側（送信ワーカー）が
    /// 動いている前提で、空きを待ちながら投入する。
    ///
    /// # Arguments
    ///
    /// * `user` - 認証済みユーザー
    /// * `mailbox` - セッションの送信キュー
    pub async fn execute(&self, user: UserId, mailbox: Mailbox) -> Connected {
        let evicted_previous = self.registry.register(user, mailbox.clone()).await;
        tracing::info!(user_id = %user, evicted_previous, "Session connected");

        let backlog = tokio::spawn(deliver_backlog(self.repository.clone(), user, mailbox));
        Connected {
            evicted_previous,
            backlog,
        }
    }
}

async fn deliver_backlog(
    repository: Arc<dyn MessageRepository>,
    user: UserId,
    mailbox: Mailbox,
) -> usize {
    let messages = match repository.unread_backlog(user).await {
        Ok(messages) => messages,
        Err(e) => {
            tracing::warn!(user_id = %user, "Failed to load unread backlog: {}", e);
            return 0;
        }
    };

    let mut queued = 0;
    for message in &messages {
        let frame: Frame = match ServerEnvelope::text(message).encode() {
            Ok(text) => Arc::from(text),
            Err(e) => {
                tracing::warn!(message_id = %message.id, "Failed to encode backlog message: {}", e);
                continue;
            }
        };
        // a stalled writer is dropped by its own write deadline, which closes the mailbox
        if mailbox.send(frame).await != Offer::Accepted {
            break;
        }
        queued += 1;
    }
    tracing::debug!(user_id = %user, queued, total = messages.len(), "Backlog delivered");
    queued
}
