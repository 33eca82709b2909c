//! UseCase 層
//!
//! ビジネスロジックを実装するレイヤー。
//! UI 層から呼び出され、Domain 層のポートとインフラ層の配送機構を操作します。

pub mod authenticate;
pub mod connect_session;
pub mod disconnect_session;
pub mod error;
pub mod route_event;

pub use authenticate::AuthenticateUseCase;
pub use connect_session::{ConnectSessionUseCase, Connected};
pub use disconnect_session::DisconnectSessionUseCase;
pub use error::{HandshakeError, RouteError};
pub use route_event::{FanoutReport, RouteEventUseCase};
