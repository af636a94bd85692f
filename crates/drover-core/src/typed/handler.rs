//! ToolHandler trait - 型付きパラメータを受け取る Tool 実装
//!
//! # 二層構造
//! - **表層（Typed）**: `ToolHandler<P>` - パラメータは型 P で届く
//! - **内部（Dyn）**: `ports::Tool` - 文字列パラメータ、object-safe
//!
//! `TypedTool<P, H>` がパラメータのデコードを担い、`ToolHandler<P>` を
//! `Arc<dyn Tool>` として登録できる形に変換します（type erasure）。

use std::marker::PhantomData;

use async_trait::async_trait;

use super::params::{ToolParams, parse_params};
use crate::ports::{Tool, ToolResult};

#[async_trait]
pub trait ToolHandler<P: ToolParams>: Send + Sync {
    async fn handle(&self, params: P) -> ToolResult;

    fn description(&self) -> &str {
        ""
    }
}

pub struct TypedTool<P: ToolParams, H: ToolHandler<P>> {
    handler: H,
    _marker: PhantomData<P>,
}

impl<P: ToolParams, H: ToolHandler<P>> TypedTool<P, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<P: ToolParams, H: ToolHandler<P>> Tool for TypedTool<P, H> {
    fn name(&self) -> &str {
        P::TOOL
    }

    fn description(&self) -> &str {
        self.handler.description()
    }

    async fn execute(&self, params: &str) -> ToolResult {
        match parse_params::<P>(params) {
            Ok(params) => self.handler.handle(params).await,
            Err(e) => ToolResult::failed(format!("invalid params for {}: {e}", P::TOOL)),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::LaunchAppHandler;
    use super::*;
    use crate::typed::params::fixtures::LaunchApp;

    #[tokio::test]
    async fn typed_tool_decodes_params() {
        let tool = TypedTool::<LaunchApp, _>::new(LaunchAppHandler);
        assert_eq!(tool.name(), "launch_app");

        let result = tool.execute(r#"{"package":"com.whatsapp"}"#).await;
        assert_eq!(result, ToolResult::ok("launched com.whatsapp"));
    }

    #[tokio::test]
    async fn undecodable_params_fail_the_tool() {
        let tool = TypedTool::<LaunchApp, _>::new(LaunchAppHandler);
        let result = tool.execute("not json").await;
        assert!(!result.success);
        assert!(result.output.starts_with("invalid params for launch_app"));
    }
}
