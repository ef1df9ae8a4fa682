mod browser_config;
mod profile_dir;

use anyhow::{Context, Result, anyhow};
use browser_config::BrowserConfig;
use profile_dir::ProfileDir;
use regex::Regex;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};

use crate::tab::Tab;
use crate::transport::Transport;

/// Holds the browser process and its profile directory.
#[derive(Debug)]
struct Process {
    child: Child,
    _profile: ProfileDir,
}

impl Drop for Process {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        // `_profile` is dropped afterwards, removing the directory.
    }
}

/// A browser instance driven over CDP.
#[derive(Debug)]
pub struct Browser {
    transport: Arc<Transport>,
    process: Mutex<Option<Process>>,
}

impl Browser {
    /// Launches a headless browser with default configuration.
    pub async fn new() -> Result<Self> {
        BrowserBuilder::new().build().await
    }

    /// Launches a browser with a visible window.
    pub async fn new_with_head() -> Result<Self> {
        BrowserBuilder::new().headless(false).build().await
    }

    pub fn builder() -> BrowserBuilder {
        BrowserBuilder::new()
    }

    async fn launch(config: BrowserConfig) -> Result<Self> {
        log::debug!(
            "launching {} (headless: {})",
            config.executable_path.display(),
            config.headless
        );

        #[cfg(windows)]
        let mut cmd = {
            use std::os::windows::process::CommandExt;
            let mut c = Command::new(&config.executable_path);
            c.creation_flags(0x08000000); // CREATE_NO_WINDOW
            c
        };
        #[cfg(not(windows))]
        let mut cmd = Command::new(&config.executable_path);

        let mut child = cmd
            .args(config.browser_args())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn browser process")?;
        let stderr = child
            .stderr
            .take()
            .context("Failed to get stderr from browser process")?;

        let ws_url = wait_for_ws(stderr).await?;

        Ok(Self {
            transport: Arc::new(Transport::new(&ws_url).await?),
            process: Mutex::new(Some(Process {
                child,
                _profile: config.profile,
            })),
        })
    }

    /// Opens a new blank tab.
    pub async fn new_tab(&self) -> Result<Tab> {
        Tab::new(self.transport.clone()).await
    }

    /// Closes the browser and removes its profile directory.
    pub async fn close_async(&self) -> Result<()> {
        self.transport.shutdown().await;
        let process = self
            .process
            .lock()
            .map_err(|_| anyhow!("Failed to lock browser process"))?
            .take();
        drop(process);
        Ok(())
    }
}

/// Reads browser stderr lines to extract the WebSocket debugging URL.
async fn wait_for_ws(stderr: std::process::ChildStderr) -> Result<String> {
    let reader = BufReader::new(stderr);
    let re = Regex::new(r"listening on (.*/devtools/browser/.*)$")?;
    tokio::task::spawn_blocking(move || {
        for line in reader.lines() {
            let l = line?;
            if let Some(cap) = re.captures(&l) {
                return Ok(cap[1].to_string());
            }
        }
        Err(anyhow!("WS URL not found in stderr"))
    })
    .await?
}

/// Builder for launching a [`Browser`].
#[derive(Debug, Clone)]
pub struct BrowserBuilder {
    headless: bool,
    executable_path: Option<PathBuf>,
    profile_root: Option<PathBuf>,
    window_size: Option<(u32, u32)>,
    extra_args: Vec<String>,
}

impl Default for BrowserBuilder {
    fn default() -> Self {
        Self {
            headless: true,
            executable_path: None,
            profile_root: None,
            window_size: None,
            extra_args: Vec::new(),
        }
    }
}

impl BrowserBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Uses this executable instead of auto-detecting Chrome/Edge.
    pub fn executable_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable_path = Some(path.into());
        self
    }

    /// Directory under which the throwaway browser profile is created.
    pub fn profile_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.profile_root = Some(path.into());
        self
    }

    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = Some((width, height));
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    pub async fn build(self) -> Result<Browser> {
        let mut config = BrowserConfig::new(self.executable_path, self.profile_root)?;
        config.headless = self.headless;
        if let Some(size) = self.window_size {
            config.window_size = size;
        }
        config.extra_args = self.extra_args;
        Browser::launch(config).await
    }
}
