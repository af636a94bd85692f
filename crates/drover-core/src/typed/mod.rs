//! Typed - 型付き Tool API
//!
//! Tool 名の typo を型で排除し、パラメータのデコードを 1 か所にまとめます。
//!
//! # 二層構造
//! - **表層（Typed）**: `ToolParams` trait, `ToolHandler<P>` trait - 型安全
//! - **内部（Dyn）**: `ports::Tool` trait - object-safe, type erasure

pub mod handler;
pub mod params;
pub mod registry;

pub use self::handler::{ToolHandler, TypedTool};
pub use self::params::{ToolParams, parse_params};
pub use self::registry::{RegistryError, ToolRegistry};
