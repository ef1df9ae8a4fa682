use anyhow::{Context, Result, anyhow};
use rand::prelude::SliceRandom;
use std::net::TcpListener;
use std::ops::Range;
use std::path::{Path, PathBuf};

#[cfg(windows)]
use winreg::{RegKey, enums::HKEY_LOCAL_MACHINE};

use crate::browser::profile_dir::ProfileDir;

/// Environment variable overriding executable discovery.
pub(crate) const CHROME_ENV: &str = "CHROME";

const DEBUG_PORTS: Range<u16> = 8000..9000;

static DEFAULT_ARGS: [&str; 19] = [
    "--no-sandbox",
    "--no-zygote",
    "--in-process-gpu",
    "--disable-dev-shm-usage",
    "--disable-background-networking",
    "--disable-component-update",
    "--disable-domain-reliability",
    "--disable-default-apps",
    "--disable-extensions",
    "--disable-sync",
    "--disable-translate",
    // animation frames must keep firing in hidden tabs
    "--disable-background-timer-throttling",
    "--disable-renderer-backgrounding",
    "--disable-backgrounding-occluded-windows",
    "--force-color-profile=srgb",
    "--hide-scrollbars",
    "--mute-audio",
    "--no-first-run",
    "--no-default-browser-check",
];

/// Executables looked up on `PATH`, most preferred first.
const PATH_CANDIDATES: [&str; 8] = [
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
    "microsoft-edge-stable",
    "microsoft-edge",
    "chrome",
    "msedge",
];

#[cfg(target_os = "macos")]
const INSTALL_CANDIDATES: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
];

#[cfg(windows)]
const INSTALL_CANDIDATES: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
];

#[cfg(not(any(target_os = "macos", windows)))]
const INSTALL_CANDIDATES: &[&str] = &[];

/// Launch configuration for the browser process.
pub(crate) struct BrowserConfig {
    debug_port: u16,
    pub(crate) headless: bool,
    pub(crate) profile: ProfileDir,
    pub(crate) executable_path: PathBuf,
    pub(crate) window_size: (u32, u32),
    pub(crate) extra_args: Vec<String>,
}

impl BrowserConfig {
    pub(crate) fn new(
        executable_path: Option<PathBuf>,
        profile_root: Option<PathBuf>,
    ) -> Result<Self> {
        let profile_root = match profile_root {
            Some(path) => path,
            None => std::env::temp_dir(),
        };
        let executable_path = match executable_path {
            Some(path) => path,
            None => find_executable()?,
        };

        Ok(Self {
            debug_port: pick_debug_port().context("No free remote debugging port")?,
            headless: true,
            profile: ProfileDir::create_in(&profile_root)?,
            executable_path,
            window_size: (1200, 1600),
            extra_args: Vec::new(),
        })
    }

    pub(crate) fn browser_args(&self) -> Vec<String> {
        let (width, height) = self.window_size;
        let mut args = vec![
            format!("--remote-debugging-port={}", self.debug_port),
            format!("--user-data-dir={}", self.profile.path().display()),
            format!("--window-size={width},{height}"),
        ];
        args.extend(DEFAULT_ARGS.iter().map(|s| s.to_string()));
        if self.headless {
            args.push("--headless=new".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// `$CHROME`, then `PATH`, then well-known install locations.
fn find_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CHROME_ENV)
        && Path::new(&path).exists()
    {
        return Ok(path.into());
    }

    if let Some(path) = PATH_CANDIDATES
        .iter()
        .find_map(|app| which::which(app).ok())
    {
        return Ok(path);
    }

    #[cfg(windows)]
    if let Some(path) = registry_chrome_path().filter(|p| p.exists()) {
        return Ok(path);
    }

    INSTALL_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| anyhow!("Chrome/Edge not found. Set the {CHROME_ENV} env var."))
}

#[cfg(windows)]
fn registry_chrome_path() -> Option<PathBuf> {
    RegKey::predef(HKEY_LOCAL_MACHINE)
        .open_subkey("SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\App Paths\\chrome.exe")
        .and_then(|key| key.get_value::<String, _>(""))
        .map(PathBuf::from)
        .ok()
}

/// A random free port, so concurrent browsers do not collide.
fn pick_debug_port() -> Option<u16> {
    let mut ports: Vec<u16> = DEBUG_PORTS.collect();
    ports.shuffle(&mut rand::thread_rng());
    ports
        .into_iter()
        .find(|port| TcpListener::bind(("127.0.0.1", *port)).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_include_profile_and_headless_mode() {
        let root = tempfile::tempdir().unwrap();
        let mut config =
            BrowserConfig::new(Some(PathBuf::from("/bin/true")), Some(root.path().into()))
                .unwrap();
        config.window_size = (800, 600);
        config.extra_args.push("--lang=en-US".into());

        let args = config.browser_args();
        assert!(args[0].starts_with("--remote-debugging-port="));
        assert!(args[1].contains(&*root.path().to_string_lossy()));
        assert!(args.contains(&"--window-size=800,600".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--lang=en-US"));

        config.headless = false;
        assert!(!config.browser_args().contains(&"--headless=new".to_string()));
    }

    #[test]
    fn debug_port_is_in_range() {
        let port = pick_debug_port().unwrap();
        assert!(DEBUG_PORTS.contains(&port));
    }
}
