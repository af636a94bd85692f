//! Tool port - デバイス操作の抽象化
//!
//! Tool は 1 つのデバイス操作（画面読み取り、スクロール、アプリ起動など）です。
//! パラメータは文字列で受け取り、解釈は各 Tool に任せます。
//! 型付きパラメータが欲しい場合は `typed::TypedTool` を使います。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Well-known tool names the retry loop relies on.
pub mod names {
    pub const READ_SCREEN: &str = "read_screen";
    pub const TAKE_SCREENSHOT: &str = "take_screenshot";
    pub const SCROLL: &str = "scroll";
    pub const GO_BACK: &str = "go_back";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    #[serde(default)]
    pub needs_screenshot: bool,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            needs_screenshot: false,
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            needs_screenshot: false,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    async fn execute(&self, params: &str) -> ToolResult;
}
