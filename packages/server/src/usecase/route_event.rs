//! UseCase: 受信イベントのルーティング
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - RouteEventUseCase::execute() メソッド
//! - メンバー判定、永続化、ファンアウト（ローカル配送とブリッジ発行）
//!
//! ### どのような状況を想定しているか
//! - 正常系：チャットへのテキスト送信（送信者以外の N-1 人に配送）
//! - 正常系：オフラインの宛先はブリッジ経由で発行
//! - 異常系：非メンバーからの送信、永続化の失敗
//! - エッジケース：既読通知の宛先判定

use std::sync::Arc;

use crate::{
    domain::{
        ChatId, ClientEvent, Conversation, MessageId, MessageKind, MessageRepository, UserId,
    },
    infrastructure::{
        bridge::Bridge,
        dto::websocket::{IceCandidateRelay, ReadNotice, SdpRelay, ServerEnvelope, TypingNotice},
        registry::{ConnectionRegistry, Delivery, Frame},
    },
};

use super::error::RouteError;

/// Per-recipient outcome counts of one fanout
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanoutReport {
    /// Queued to a local session
    pub delivered: usize,
    /// Local session evicted because its mailbox was full
    pub evicted: usize,
    /// Handed to the bridge for other instances
    pub published: usize,
    /// Not connected locally and the bridge publish failed
    pub dropped: usize,
}

/// イベントルーティングのユースケース
pub struct RouteEventUseCase {
    repository: Arc<dyn MessageRepository>,
    registry: Arc<ConnectionRegistry>,
    bridge: Arc<Bridge>,
}

impl RouteEventUseCase {
    /// 新しい RouteEventUseCase を作成
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        registry: Arc<ConnectionRegistry>,
        bridge: Arc<Bridge>,
    ) -> Self {
        Self {
            repository,
            registry,
            bridge,
        }
    }

    /// イベントを検証・永続化し、宛先へ配送する
    ///
    /// # Arguments
    ///
    /// * `sender` - 認証済みの送信者
    /// * `event` - 検証済みの受信イベント
    ///
    /// # Returns
    ///
    /// * `Ok(FanoutReport)` - 宛先ごとの配送結果
    /// * `Err(RouteError)` - 何も配送されていない
    pub async fn execute(
        &self,
        sender: UserId,
        event: ClientEvent,
    ) -> Result<FanoutReport, RouteError> {
        match event {
            ClientEvent::Text { target, content } => {
                if let Conversation::Chat(chat) = target {
                    self.ensure_member(sender, chat).await?;
                }

                // 永続化が成功してから配送する
                let message = self
                    .repository
                    .create_message(sender, target, content, MessageKind::Text)
                    .await?;
                let recipients = self.recipients(sender, target).await?;
                self.fanout(&recipients, &ServerEnvelope::text(&message))
                    .await
            }
            ClientEvent::Typing { chat, status } => {
                self.ensure_member(sender, chat).await?;
                let recipients = self.recipients(sender, Conversation::Chat(chat)).await?;
                let notice = ServerEnvelope::Typing(TypingNotice {
                    chat_id: chat,
                    user_id: sender,
                    status,
                });
                self.fanout(&recipients, &notice).await
            }
            ClientEvent::Read { message } => self.route_read(sender, message).await,
            ClientEvent::CallOffer { recipient, sdp } => {
                let relay = ServerEnvelope::CallOffer(SdpRelay {
                    sender_id: sender,
                    recipient_id: recipient,
                    sdp,
                });
                self.fanout(&[recipient], &relay).await
            }
            ClientEvent::CallAnswer { recipient, sdp } => {
                let relay = ServerEnvelope::CallAnswer(SdpRelay {
                    sender_id: sender,
                    recipient_id: recipient,
                    sdp,
                });
                self.fanout(&[recipient], &relay).await
            }
            ClientEvent::IceCandidate {
                recipient,
                candidate,
            } => {
                let relay = ServerEnvelope::IceCandidate(IceCandidateRelay {
                    sender_id: sender,
                    recipient_id: recipient,
                    candidate,
                });
                self.fanout(&[recipient], &relay).await
            }
        }
    }

    async fn route_read(
        &self,
        reader: UserId,
        message_id: MessageId,
    ) -> Result<FanoutReport, RouteError> {
        let message = self.repository.find_message(message_id).await?;

        let (chat_id, recipients) = match message.conversation {
            Conversation::Chat(chat) => {
                if !self.repository.is_member(reader, chat).await? {
                    return Err(RouteError::NotParticipant(message_id));
                }
                (
                    Some(chat),
                    self.recipients(reader, Conversation::Chat(chat)).await?,
                )
            }
            Conversation::Direct(_) => {
                if !message.is_direct_recipient(reader) {
                    return Err(RouteError::NotParticipant(message_id));
                }
                (None, vec![message.sender])
            }
        };

        self.repository.mark_read(message_id, reader).await?;
        let notice = ServerEnvelope::Read(ReadNotice {
            message_id,
            user_id: reader,
            chat_id,
        });
        self.fanout(&recipients, &notice).await
    }

    async fn ensure_member(&self, user: UserId, chat: ChatId) -> Result<(), RouteError> {
        if self.repository.is_member(user, chat).await? {
            Ok(())
        } else {
            Err(RouteError::NotMember(chat))
        }
    }

    /// 宛先一覧（チャットの場合は送信者を除くメンバー）
    async fn recipients(
        &self,
        sender: UserId,
        target: Conversation,
    ) -> Result<Vec<UserId>, RouteError> {
        match target {
            Conversation::Chat(chat) => Ok(self
                .repository
                .chat_members(chat)
                .await?
                .into_iter()
                .filter(|member| *member != sender)
                .collect()),
            Conversation::Direct(recipient) => Ok(vec![recipient]),
        }
    }

    async fn fanout(
        &self,
        recipients: &[UserId],
        envelope: &ServerEnvelope,
    ) -> Result<FanoutReport, RouteError> {
        let text = envelope
            .encode()
            .map_err(|e| RouteError::Encode(e.to_string()))?;
        let frame: Frame = Arc::from(text);

        let mut report = FanoutReport::default();
        let mut remote = Vec::new();
        for &recipient in recipients {
            match self.registry.deliver(recipient, frame.clone()).await {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Evicted => report.evicted += 1,
                Delivery::Offline => remote.push(recipient),
            }
        }

        // every local session has its frame before the bus is touched
        if !remote.is_empty() {
            report.published = self.bridge.publish_all(&remote, &frame).await;
            report.dropped = remote.len() - report.published;
        }

        tracing::debug!(
            delivered = report.delivered,
            evicted = report.evicted,
            published = report.published,
            dropped = report.dropped,
            "Fanout complete"
        );
        Ok(report)
    }
}
