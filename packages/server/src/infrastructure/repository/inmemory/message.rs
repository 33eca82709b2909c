//! InMemory Message Repository 実装
//!
//! ドメイン層が定義する MessageRepository trait の具体的な実装。
//! HashMap / Vec をインメモリ DB として使用します。
//! チャットのメンバー構成は `create_chat` で事前に投入します。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    ChatId, Conversation, Message, MessageContent, MessageId, MessageKind, MessageRepository,
    RepositoryError, Timestamp, UserId,
};

#[derive(Debug, Default)]
struct Store {
    /// チャット ID → メンバー（登録順）
    chats: HashMap<ChatId, Vec<UserId>>,
    /// ID 昇順で保持するメッセージ
    messages: Vec<Message>,
    /// 既読 (message, reader)
    reads: HashSet<(MessageId, UserId)>,
    last_id: u64,
}

impl Store {
    fn is_member(&self, user: UserId, chat: ChatId) -> bool {
        self.chats
            .get(&chat)
            .is_some_and(|members| members.contains(&user))
    }

    fn is_addressed_to(&self, message: &Message, user: UserId) -> bool {
        if message.sender == user {
            return false;
        }
        match message.conversation {
            Conversation::Direct(recipient) => recipient == user,
            Conversation::Chat(chat) => self.is_member(user, chat),
        }
    }
}

/// インメモリ Message Repository 実装
#[derive(Debug, Default)]
pub struct InMemoryMessageRepository {
    store: Mutex<Store>,
}

impl InMemoryMessageRepository {
    /// 新しい InMemoryMessageRepository を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// チャットを登録する（既存のチャットはメンバーを置き換える）
    pub async fn create_chat(&self, chat: ChatId, members: impl IntoIterator<Item = UserId>) {
        let mut store = self.store.lock().await;
        let mut unique = Vec::new();
        for member in members {
            if !unique.contains(&member) {
                unique.push(member);
            }
        }
        store.chats.insert(chat, unique);
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn create_message(
        &self,
        sender: UserId,
        target: Conversation,
        content: MessageContent,
        kind: MessageKind,
    ) -> Result<Message, RepositoryError> {
        let mut store = self.store.lock().await;
        if let Conversation::Chat(chat) = target
            && !store.chats.contains_key(&chat)
        {
            return Err(RepositoryError::ChatNotFound(chat));
        }

        store.last_id += 1;
        let message = Message::new(
            MessageId::new(store.last_id),
            sender,
            target,
            content,
            kind,
            Timestamp::now(),
        );
        store.messages.push(message.clone());
        Ok(message)
    }

    async fn is_member(&self, user: UserId, chat: ChatId) -> Result<bool, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store.is_member(user, chat))
    }

    async fn chat_members(&self, chat: ChatId) -> Result<Vec<UserId>, RepositoryError> {
        let store = self.store.lock().await;
        store
            .chats
            .get(&chat)
            .cloned()
            .ok_or(RepositoryError::ChatNotFound(chat))
    }

    async fn mark_read(&self, message: MessageId, user: UserId) -> Result<(), RepositoryError> {
        let mut store = self.store.lock().await;
        if !store.messages.iter().any(|m| m.id == message) {
            return Err(RepositoryError::MessageNotFound(message));
        }
        store.reads.insert((message, user));
        Ok(())
    }

    async fn unread_backlog(&self, user: UserId) -> Result<Vec<Message>, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store
            .messages
            .iter()
            .filter(|m| store.is_addressed_to(m, user) && !store.reads.contains(&(m.id, user)))
            .cloned()
            .collect())
    }

    async fn find_message(&self, message: MessageId) -> Result<Message, RepositoryError> {
        let store = self.store.lock().await;
        store
            .messages
            .iter()
            .find(|m| m.id == message)
            .cloned()
            .ok_or(RepositoryError::MessageNotFound(message))
    }
}
