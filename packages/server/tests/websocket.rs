//! WebSocket integration tests.
//!
//! Handshake, routing, eviction and the cross-instance bridge, exercised
//! through real sockets.

mod fixtures;

use std::{sync::Arc, time::Duration};

use dengon_server::infrastructure::bridge::InMemoryEventBus;
use fixtures::{TestServer, assert_silent, recv_close, recv_json, send_json};
use futures_util::SinkExt;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;

fn direct_text(recipient: u64, content: &str) -> serde_json::Value {
    json!({"type": "text", "payload": {"recipient_id": recipient, "content": content}})
}

fn chat_text(chat: u64, content: &str) -> serde_json::Value {
    json!({"type": "text", "payload": {"chat_id": chat, "content": content}})
}

#[tokio::test]
async fn test_direct_message_crosses_instances() {
    // テスト項目: インスタンス A のユーザー 7 から B のユーザー 9 へのメッセージがブリッジ経由で届く
    // given (前提条件):
    let bus = Arc::new(InMemoryEventBus::default());
    let server_a = TestServer::start_on_bus(bus.clone(), &[]).await;
    let server_b = TestServer::start_on_bus(bus.clone(), &[]).await;
    let mut user_7 = server_a.login(7).await;
    let mut user_9 = server_b.login(9).await;

    // when (操作):
    send_json(&mut user_7, direct_text(9, "hi")).await;

    // then (期待する結果):
    let frame = recv_json(&mut user_9).await;
    assert_eq!(frame["type"], "text");
    assert_eq!(frame["payload"]["sender_id"], 7);
    assert_eq!(frame["payload"]["recipient_id"], 9);
    assert_eq!(frame["payload"]["content"], "hi");
    assert!(frame["payload"]["message_id"].is_u64());
}

#[tokio::test]
async fn test_chat_message_reaches_other_members_only() {
    // テスト項目: チャットへのメッセージは送信者以外のメンバーにだけ届く
    // given (前提条件):
    let server = TestServer::start(&["--chat", "1=7,8,9"]).await;
    let mut user_7 = server.login(7).await;
    let mut user_8 = server.login(8).await;
    let mut user_9 = server.login(9).await;

    // when (操作):
    send_json(&mut user_7, chat_text(1, "hello chat")).await;

    // then (期待する結果):
    for ws in [&mut user_8, &mut user_9] {
        let frame = recv_json(ws).await;
        assert_eq!(frame["type"], "text");
        assert_eq!(frame["payload"]["chat_id"], 1);
        assert_eq!(frame["payload"]["content"], "hello chat");
    }
    assert_silent(&mut user_7, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_duplicate_login_closes_previous_connection() {
    // テスト項目: 同じユーザーが再接続すると古い接続はサーバーから close される
    // given (前提条件):
    let server = TestServer::start(&[]).await;
    let mut first = server.login(7).await;

    // when (操作):
    let mut second = server.login(7).await;

    // then (期待する結果):
    let close = recv_close(&mut first).await;
    assert!(close.is_some(), "expected a close frame");

    // 新しい接続は引き続き利用できる
    let mut peer = server.login(9).await;
    send_json(&mut peer, direct_text(7, "still there?")).await;
    let frame = recv_json(&mut second).await;
    assert_eq!(frame["payload"]["content"], "still there?");
}

#[tokio::test]
async fn test_first_frame_must_be_handshake() {
    // テスト項目: 最初のフレームがハンドシェイクでなければエラーを返して切断する
    // given (前提条件):
    let server = TestServer::start(&[]).await;
    let mut ws = server.connect().await;

    // when (操作):
    send_json(&mut ws, direct_text(9, "too early")).await;

    // then (期待する結果):
    let frame = recv_json(&mut ws).await;
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["payload"]["message"], "authentication failed");
    assert!(recv_close(&mut ws).await.is_some());
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    // テスト項目: 不正なトークンではハンドシェイクが失敗し切断される
    // given (前提条件):
    let server = TestServer::start(&[]).await;
    let mut ws = server.connect().await;

    // when (操作):
    send_json(
        &mut ws,
        json!({"type": "handshake", "payload": {"token": "forged"}}),
    )
    .await;

    // then (期待する結果):
    let frame = recv_json(&mut ws).await;
    assert_eq!(frame["type"], "error");
    assert!(recv_close(&mut ws).await.is_some());
}

#[tokio::test]
async fn test_repeated_failures_lock_out_client() {
    // テスト項目: 5 回失敗した後は正しいトークンでも拒否され、理由は汎用メッセージのみ
    // given (前提条件):
    let server = TestServer::start(&[]).await;
    for _ in 0..5 {
        let mut ws = server.connect().await;
        send_json(
            &mut ws,
            json!({"type": "handshake", "payload": {"token": "forged"}}),
        )
        .await;
        let frame = recv_json(&mut ws).await;
        assert_eq!(frame["payload"]["message"], "authentication failed");
        recv_close(&mut ws).await;
    }

    // when (操作):
    let mut ws = server.connect().await;
    send_json(
        &mut ws,
        json!({"type": "handshake", "payload": {"token": server.token(7)}}),
    )
    .await;

    // then (期待する結果):
    let frame = recv_json(&mut ws).await;
    assert_eq!(frame["type"], "error");
    // ロックアウト中であることはクライアントに明かさない
    assert_eq!(frame["payload"]["message"], "authentication failed");
    assert!(recv_close(&mut ws).await.is_some());
}

#[tokio::test]
async fn test_malformed_frame_after_login_keeps_connection() {
    // テスト項目: 認証後の不正フレームはエラー応答のみで接続は維持される
    // given (前提条件):
    let server = TestServer::start(&[]).await;
    let mut user_7 = server.login(7).await;
    let mut user_9 = server.login(9).await;

    // when (操作):
    user_7
        .send(Message::Text("{not json".into()))
        .await
        .unwrap();
    let error = recv_json(&mut user_7).await;
    send_json(&mut user_7, direct_text(9, "after error")).await;

    // then (期待する結果):
    assert_eq!(error["type"], "error");
    let frame = recv_json(&mut user_9).await;
    assert_eq!(frame["payload"]["content"], "after error");
}

#[tokio::test]
async fn test_ambiguous_text_target_is_rejected() {
    // テスト項目: chat_id と recipient_id の両方を指定したテキストはエラーになる
    // given (前提条件):
    let server = TestServer::start(&["--chat", "1=7,9"]).await;
    let mut user_7 = server.login(7).await;

    // when (操作):
    send_json(
        &mut user_7,
        json!({"type": "text", "payload": {"chat_id": 1, "recipient_id": 9, "content": "?"}}),
    )
    .await;

    // then (期待する結果):
    let frame = recv_json(&mut user_7).await;
    assert_eq!(frame["type"], "error");
    assert_eq!(
        frame["payload"]["message"],
        "text requires exactly one of chat_id or recipient_id"
    );
}

#[tokio::test]
async fn test_binary_frame_is_answered_with_error() {
    // テスト項目: バイナリフレームにはエラーが返るが接続は維持される
    // given (前提条件):
    let server = TestServer::start(&[]).await;
    let mut user_7 = server.login(7).await;

    // when (操作):
    user_7
        .send(Message::Binary(vec![1u8, 2, 3].into()))
        .await
        .unwrap();

    // then (期待する結果):
    let frame = recv_json(&mut user_7).await;
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["payload"]["message"], "binary frames are not supported");
}

#[tokio::test]
async fn test_non_member_cannot_post_to_chat() {
    // テスト項目: メンバーでないチャットへの送信はエラーとなり、メンバーには届かない
    // given (前提条件):
    let server = TestServer::start(&["--chat", "1=8,9"]).await;
    let mut outsider = server.login(7).await;
    let mut member = server.login(8).await;

    // when (操作):
    send_json(&mut outsider, chat_text(1, "let me in")).await;

    // then (期待する結果):
    let frame = recv_json(&mut outsider).await;
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["payload"]["message"], "not a member of chat 1");
    assert_silent(&mut member, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_unread_backlog_delivered_on_login() {
    // テスト項目: オフライン中に届いたメッセージはログイン時に配送される
    // given (前提条件):
    let server = TestServer::start(&[]).await;
    let mut user_7 = server.login(7).await;
    send_json(&mut user_7, direct_text(9, "while you were away")).await;
    // 送信の処理完了を待つため、自分宛てに 1 通送って受信する
    send_json(&mut user_7, direct_text(7, "sync")).await;
    recv_json(&mut user_7).await;

    // when (操作):
    let mut user_9 = server.login(9).await;

    // then (期待する結果):
    let frame = recv_json(&mut user_9).await;
    assert_eq!(frame["type"], "text");
    assert_eq!(frame["payload"]["sender_id"], 7);
    assert_eq!(frame["payload"]["content"], "while you were away");
}

#[tokio::test]
async fn test_backlog_larger_than_mailbox_keeps_session() {
    // テスト項目: mailbox 容量を超える未読があってもログインしたセッションは維持され、全件が順番通り届く
    // given (前提条件): mailbox 容量 4 に対して未読 10 通
    let server = TestServer::start(&["--mailbox-capacity", "4"]).await;
    let mut user_7 = server.login(7).await;
    for i in 0..10 {
        send_json(&mut user_7, direct_text(9, &format!("backlog {i}"))).await;
    }
    // 送信の処理完了を待つため、不正フレームへのエラー応答を受け取る
    user_7
        .send(Message::Text("{not json".into()))
        .await
        .unwrap();
    assert_eq!(recv_json(&mut user_7).await["type"], "error");

    // when (操作):
    let mut user_9 = server.login(9).await;

    // then (期待する結果):
    for i in 0..10 {
        let frame = recv_json(&mut user_9).await;
        assert_eq!(frame["type"], "text");
        assert_eq!(frame["payload"]["content"], format!("backlog {i}"));
    }
    send_json(&mut user_7, direct_text(9, "live")).await;
    let frame = recv_json(&mut user_9).await;
    assert_eq!(frame["payload"]["content"], "live");
}

#[tokio::test]
async fn test_read_receipt_is_sent_to_author() {
    // テスト項目: ダイレクトメッセージの既読通知が送信者に届く
    // given (前提条件):
    let server = TestServer::start(&[]).await;
    let mut user_7 = server.login(7).await;
    let mut user_9 = server.login(9).await;
    send_json(&mut user_7, direct_text(9, "read me")).await;
    let delivered = recv_json(&mut user_9).await;
    let message_id = delivered["payload"]["message_id"].as_u64().unwrap();

    // when (操作):
    send_json(
        &mut user_9,
        json!({"type": "read", "payload": {"message_id": message_id}}),
    )
    .await;

    // then (期待する結果):
    let receipt = recv_json(&mut user_7).await;
    assert_eq!(receipt["type"], "read");
    assert_eq!(receipt["payload"]["message_id"], message_id);
    assert_eq!(receipt["payload"]["user_id"], 9);
}

#[tokio::test]
async fn test_call_signaling_is_relayed() {
    // テスト項目: 通話シグナリング（offer / ice-candidate）が相手に中継される
    // given (前提条件):
    let server = TestServer::start(&[]).await;
    let mut caller = server.login(7).await;
    let mut callee = server.login(9).await;

    // when (操作):
    send_json(
        &mut caller,
        json!({"type": "call-offer", "payload": {"recipient_id": 9, "sdp": "v=0"}}),
    )
    .await;
    send_json(
        &mut caller,
        json!({"type": "ice-candidate", "payload": {"recipient_id": 9, "candidate": "candidate:1"}}),
    )
    .await;

    // then (期待する結果):
    let offer = recv_json(&mut callee).await;
    assert_eq!(offer["type"], "call-offer");
    assert_eq!(offer["payload"]["sender_id"], 7);
    assert_eq!(offer["payload"]["sdp"], "v=0");
    let candidate = recv_json(&mut callee).await;
    assert_eq!(candidate["type"], "ice-candidate");
    assert_eq!(candidate["payload"]["candidate"], "candidate:1");
}

#[tokio::test]
async fn test_unresponsive_client_is_disconnected() {
    // テスト項目: ping に応答しないクライアントは pong 待ち時間の経過後に切断される
    // given (前提条件): pong 待ち 1 秒（ping 間隔 0.9 秒）
    let server = TestServer::start(&["--pong-wait-secs", "1"]).await;
    let mut idle = server.login(7).await;

    // when (操作): 受信しない（= pong を返さない）まま待つ
    tokio::time::sleep(Duration::from_millis(1500)).await;

    // then (期待する結果):
    assert!(recv_close(&mut idle).await.is_some());
}

#[tokio::test]
async fn test_responsive_client_survives_keepalive() {
    // テスト項目: ping に応答し続けるクライアントは pong 待ち時間を過ぎても接続が維持される
    // given (前提条件):
    let server = TestServer::start(&["--pong-wait-secs", "1"]).await;
    let mut user_7 = server.login(7).await;
    let mut user_9 = server.login(9).await;

    // when (操作): 両者とも受信を続け、ping に自動応答させる
    assert_silent(&mut user_7, Duration::from_millis(1500)).await;
    assert_silent(&mut user_9, Duration::from_millis(100)).await;
    send_json(&mut user_7, direct_text(9, "still alive")).await;

    // then (期待する結果):
    let frame = recv_json(&mut user_9).await;
    assert_eq!(frame["payload"]["content"], "still alive");
}
