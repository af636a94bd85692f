//! A text-only phone for running missions without hardware.
//!
//! The screen is a handful of lines. Navigation pushes the previous screen
//! onto a back stack, so `go_back` behaves like the real button.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use drover_core::app::MissionBuilder;
use drover_core::ports::tool::names;
use drover_core::ports::{Tool, ToolResult};
use drover_core::typed::{RegistryError, ToolHandler, ToolParams};
use serde::Deserialize;
use tracing::debug;

const HOME: &str = "Home\n- Chrome\n- WhatsApp\n- YouTube\n- Settings";

#[derive(Debug)]
struct Screen {
    current: String,
    back_stack: Vec<String>,
}

#[derive(Debug)]
pub struct Device {
    screen: Mutex<Screen>,
}

impl Device {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            screen: Mutex::new(Screen {
                current: HOME.to_string(),
                back_stack: Vec::new(),
            }),
        })
    }

    fn screen(&self) -> MutexGuard<'_, Screen> {
        self.screen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current(&self) -> String {
        self.screen().current.clone()
    }

    fn navigate(&self, next: String) {
        let mut screen = self.screen();
        let previous = std::mem::replace(&mut screen.current, next);
        screen.back_stack.push(previous);
        debug!(screen = %screen.current.lines().next().unwrap_or_default(), "navigated");
    }

    fn back(&self) -> bool {
        let mut screen = self.screen();
        match screen.back_stack.pop() {
            Some(previous) => {
                screen.current = previous;
                true
            }
            None => false,
        }
    }

    fn home(&self) {
        let mut screen = self.screen();
        screen.back_stack.clear();
        screen.current = HOME.to_string();
    }

    fn append(&self, line: String) {
        let mut screen = self.screen();
        screen.current.push('\n');
        screen.current.push_str(&line);
    }
}

/// Parameterless device actions.
#[derive(Debug, Clone, Copy)]
enum Action {
    ReadScreen,
    TakeScreenshot,
    GoBack,
    GoHome,
    OpenSettings,
}

struct DeviceTool {
    action: Action,
    device: Arc<Device>,
}

#[async_trait]
impl Tool for DeviceTool {
    fn name(&self) -> &str {
        match self.action {
            Action::ReadScreen => names::READ_SCREEN,
            Action::TakeScreenshot => names::TAKE_SCREENSHOT,
            Action::GoBack => names::GO_BACK,
            Action::GoHome => "go_home",
            Action::OpenSettings => "open_settings",
        }
    }

    async fn execute(&self, _params: &str) -> ToolResult {
        let device = &self.device;
        match self.action {
            Action::ReadScreen => ToolResult::ok(device.current()),
            Action::TakeScreenshot => {
                ToolResult::ok(format!("screenshot:{}", device.current().len()))
            }
            Action::GoBack => {
                if device.back() {
                    ToolResult::ok("Went back")
                } else {
                    ToolResult::failed("Nothing to go back to")
                }
            }
            Action::GoHome => {
                device.home();
                ToolResult::ok("Went home")
            }
            Action::OpenSettings => {
                device.navigate("Settings\n- Network & internet\n- Battery\n- Display".to_string());
                ToolResult::ok("Opened settings")
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct LaunchApp(String);

impl ToolParams for LaunchApp {
    const TOOL: &'static str = "launch_app";
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct InputText(String);

impl ToolParams for InputText {
    const TOOL: &'static str = "input_text";
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct ClickElement(String);

impl ToolParams for ClickElement {
    const TOOL: &'static str = "click_element";
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct Scroll(String);

impl ToolParams for Scroll {
    const TOOL: &'static str = names::SCROLL;
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct OpenChrome(String);

impl ToolParams for OpenChrome {
    const TOOL: &'static str = "open_chrome";
}

#[derive(Clone)]
pub struct Handlers(Arc<Device>);

#[async_trait]
impl ToolHandler<LaunchApp> for Handlers {
    async fn handle(&self, LaunchApp(app): LaunchApp) -> ToolResult {
        self.0.navigate(format!("{app}\n- Search\n- Chats"));
        ToolResult::ok(format!("Launched {app}"))
    }
}

#[async_trait]
impl ToolHandler<InputText> for Handlers {
    async fn handle(&self, InputText(text): InputText) -> ToolResult {
        self.0.append(format!("Text field: {text}"));
        ToolResult::ok(format!("Typed '{text}'"))
    }
}

#[async_trait]
impl ToolHandler<ClickElement> for Handlers {
    async fn handle(&self, ClickElement(target): ClickElement) -> ToolResult {
        let visible = self.0.current().to_lowercase().contains(&target.to_lowercase());
        if visible {
            self.0.navigate(format!("{target}\n- Details"));
            ToolResult::ok(format!("Clicked '{target}'"))
        } else {
            ToolResult::failed(format!("'{target}' is not on screen"))
        }
    }
}

#[async_trait]
impl ToolHandler<Scroll> for Handlers {
    async fn handle(&self, Scroll(direction): Scroll) -> ToolResult {
        self.0.append(format!("(scrolled {direction})"));
        ToolResult::ok(format!("Scrolled {direction}"))
    }
}

#[async_trait]
impl ToolHandler<OpenChrome> for Handlers {
    async fn handle(&self, OpenChrome(query): OpenChrome) -> ToolResult {
        self.0.navigate(format!(
            "Chrome\nAddress: google.com/search?q={query}\n- Google Search results for {query}"
        ));
        ToolResult::ok(format!("Searched for '{query}'"))
    }
}

/// Tool names every simulated mission relies on.
pub const REQUIRED_TOOLS: [&str; 4] = [
    names::READ_SCREEN,
    names::SCROLL,
    names::GO_BACK,
    "open_settings",
];

/// Register every device tool on `builder`.
pub fn install(builder: MissionBuilder, device: &Arc<Device>) -> Result<MissionBuilder, RegistryError> {
    let mut builder = builder;
    for action in [
        Action::ReadScreen,
        Action::TakeScreenshot,
        Action::GoBack,
        Action::GoHome,
        Action::OpenSettings,
    ] {
        builder = builder.tool(Arc::new(DeviceTool {
            action,
            device: device.clone(),
        }))?;
    }
    let handlers = Handlers(device.clone());
    builder
        .register::<LaunchApp, _>(handlers.clone())?
        .register::<InputText, _>(handlers.clone())?
        .register::<ClickElement, _>(handlers.clone())?
        .register::<Scroll, _>(handlers.clone())?
        .register::<OpenChrome, _>(handlers)
}
