//! AMS Control Plane
//!
//! デプロイタスクのリコンサイル。[`Scheduler`] が一定間隔で3つのコホートを
//! 問い合わせ、選ばれたタスクを [`TransitionExecutor`] に振り分ける。
//! エグゼキュータは1ユニットにつき状態遷移を1回だけ行う。
//! [`ConsumerGroup`] はタイマーとは独立に、アプリ操作イベントと承認イベントを
//! 同じ実行経路へ流す。
//!
//! ```text
//!  timer ─▶ Scheduler ──cohorts──▶ TaskStore
//!              │ fan-out (semaphore)
//!              ▼
//!        TransitionExecutor ─▶ VendorController / WorkloadApplier
//!              ▲
//!  bus ─▶ ConsumerGroup ─▶ AppOpHandler / ApprovalHandler
//! ```
//!
//! コラボレータはすべて起動時に作る [`Services`] にまとめて渡す。

pub mod bus;
pub mod consumer;
pub mod error;
pub mod events;
pub mod executor;
pub mod handlers;
pub mod locks;
pub mod retry;
pub mod scheduler;
pub mod services;
pub mod vendors;
pub mod workload;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// 再エクスポート
pub use bus::{BusEventPublisher, InProcessBus};
pub use consumer::{ConsumerGroup, Message, MessageHandler, MessageSource, PartitionClaim};
pub use error::{ConsumerError, ControlPlaneError, Result};
pub use events::{AppOpEvent, EventPublisher};
pub use executor::{ExecutorPolicy, TransitionExecutor, TransitionOutcome};
pub use handlers::{AppOpHandler, ApprovalCallback, ApprovalHandler};
pub use locks::{TaskLockGuard, TaskLocks};
pub use retry::RetryStrategy;
pub use scheduler::{Scheduler, SchedulerSettings, SchedulerStats, TickReport};
pub use services::Services;
pub use vendors::VendorRegistry;
pub use workload::{ApplyError, DryRunApplier, WorkloadApplier};
