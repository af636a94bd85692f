//! drover-core
//!
//! Coordination kernel for device-control agents: a dependency graph of
//! atomic tasks, priority leases over device resources, a bounded message
//! bus, a safety governor and the per-task retry loop that ties them together.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, resource, message, state, recovery, errors）
//! - **ports**: 抽象化レイヤー（Brain, Tool, StateStore, Clock, ResourcePolicy, TaskPolicy など）
//! - **coord**: 状態を持つカーネル部品（TaskGraph, ResourceManager, MessageBus）
//! - **safety**: SafetyGovernor とループ検出
//! - **app**: アプリケーションロジック（builder, retry, scheduler, status）
//! - **typed**: 型付き Tool API（ToolParams trait, ToolHandler trait, ToolRegistry）
//! - **impls**: 実装（InMemoryStateStore, KeywordBrain, 既定ポリシー）

pub mod domain;
pub mod ports;
pub mod coord;
pub mod safety;
pub mod app;
pub mod typed;
pub mod impls;
