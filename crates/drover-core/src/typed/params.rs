//! ToolParams trait - 型付きパラメータと Tool 名の対応付け
//!
//! # 使用例
//! ```ignore
//! #[derive(Deserialize)]
//! struct LaunchApp {
//!     package: String,
//! }
//!
//! impl ToolParams for LaunchApp {
//!     const TOOL: &'static str = "launch_app";
//! }
//! ```
//!
//! # Trait Bounds
//! - `DeserializeOwned`: Brain が出した文字列パラメータから復元するため
//! - `Send + Sync + 'static`: Arc<dyn Tool> に格納できるため

use serde::de::DeserializeOwned;

pub trait ToolParams: DeserializeOwned + Send + Sync + 'static {
    const TOOL: &'static str;
}

/// Parse raw tool params as JSON, falling back to treating the raw text as
/// a JSON string (so `"down"` and `down` both decode into a `String` newtype).
pub fn parse_params<P: ToolParams>(raw: &str) -> Result<P, serde_json::Error> {
    match serde_json::from_str::<P>(raw) {
        Ok(params) => Ok(params),
        Err(err) => serde_json::from_value(serde_json::Value::String(raw.to_string())).map_err(|_| err),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::ToolParams;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct LaunchApp {
        pub package: String,
    }

    impl ToolParams for LaunchApp {
        const TOOL: &'static str = "launch_app";
    }

    #[derive(Debug, Deserialize)]
    #[serde(transparent)]
    pub struct InputText(pub String);

    impl ToolParams for InputText {
        const TOOL: &'static str = "input_text";
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{InputText, LaunchApp};
    use super::*;

    #[test]
    fn json_params_decode() {
        let params: LaunchApp = parse_params(r#"{"package":"com.whatsapp"}"#).unwrap();
        assert_eq!(params.package, "com.whatsapp");
    }

    #[test]
    fn bare_text_decodes_into_string_newtype() {
        let params: InputText = parse_params("hello world").unwrap();
        assert_eq!(params.0, "hello world");
    }

    #[test]
    fn bare_text_is_rejected_for_struct_params() {
        assert!(parse_params::<LaunchApp>("whatsapp").is_err());
    }
}
