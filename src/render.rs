//! Rendering collaborator: DOM extraction and screenshot capture.
//!
//! The pipeline consumes the [`Renderer`] trait; the shipped
//! implementation drives a Node/Playwright helper as a subprocess and
//! parses a JSON envelope from its stdout. Render and screenshot failures
//! surface as extraction errors — this layer is not retried by the core.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{CloneError, Result};
use crate::progress::ProgressCallback;
use crate::types::{DomSnapshot, Viewport};

/// Default timeout for page navigation.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for the entire helper process.
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(60);

const NODE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for one DOM extraction call.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    pub wait_for_load: bool,
    pub include_styles: bool,
    pub max_depth: u32,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            wait_for_load: true,
            include_styles: true,
            max_depth: 6,
        }
    }
}

/// What to point the browser at for a screenshot.
#[derive(Debug, Clone)]
pub enum ScreenshotTarget {
    Url(String),
    /// Raw HTML, rendered from a temp file.
    Html(String),
}

/// The rendering collaborator contract.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `url` and return a structural snapshot of the page.
    async fn extract(&self, url: &str, options: ExtractOptions) -> Result<DomSnapshot>;

    /// Capture a PNG screenshot of a URL or of raw HTML content.
    async fn screenshot(&self, target: ScreenshotTarget, viewport: Viewport) -> Result<Vec<u8>>;
}

/// Configuration for the Playwright-backed renderer.
#[derive(Debug, Clone)]
pub struct RendererOptions {
    pub node_command: String,
    pub headless: bool,
    pub navigation_timeout: Duration,
    pub process_timeout: Duration,
    /// Cap on simultaneous helper processes.
    pub max_concurrent: usize,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            node_command: "node".to_string(),
            headless: true,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            process_timeout: DEFAULT_PROCESS_TIMEOUT,
            max_concurrent: 2,
        }
    }
}

/// Renders pages through a Node/Playwright helper subprocess.
pub struct PlaywrightRenderer {
    options: RendererOptions,
    semaphore: Arc<Semaphore>,
    scratch_counter: AtomicU64,
    progress: Option<ProgressCallback>,
}

impl PlaywrightRenderer {
    pub fn new(options: RendererOptions) -> Self {
        let permits = options.max_concurrent.max(1);
        Self {
            options,
            semaphore: Arc::new(Semaphore::new(permits)),
            scratch_counter: AtomicU64::new(0),
            progress: None,
        }
    }

    /// Attach a callback for human-facing progress lines.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    fn log_progress(&self, message: &str) {
        if let Some(cb) = &self.progress {
            cb(message);
        }
    }

    async fn run_helper(&self, script: &str, args: &[String]) -> Result<String> {
        ensure_node_available(&self.options.node_command).await?;

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| CloneError::extraction("renderer unavailable"))?;

        let mut cmd = Command::new(&self.options.node_command);
        cmd.arg("-e").arg(script);
        for arg in args {
            cmd.arg(arg);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|err| map_spawn_error(err, &self.options.node_command))?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut out) = stdout_pipe {
                let _ = out.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut err) = stderr_pipe {
                let _ = err.read_to_end(&mut buf).await;
            }
            buf
        });

        let status = match timeout(self.options.process_timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => return Err(CloneError::Io(err)),
            Err(_) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                return Err(CloneError::extraction(format!(
                    "render helper timed out after {:?}",
                    self.options.process_timeout
                )));
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            status = %status,
            "render helper finished"
        );

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(map_helper_error(status.to_string(), &stderr));
        }

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    fn scratch_path(&self, extension: &str) -> PathBuf {
        let counter = self.scratch_counter.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "siteclone-{}-{counter}.{extension}",
            std::process::id()
        ))
    }
}

#[async_trait]
impl Renderer for PlaywrightRenderer {
    async fn extract(&self, url: &str, options: ExtractOptions) -> Result<DomSnapshot> {
        self.log_progress(&format!(
            "Extracting DOM structure from {url} (depth {})…",
            options.max_depth
        ));
        let args = vec![
            url.to_string(),
            options.max_depth.to_string(),
            flag(options.include_styles),
            flag(options.wait_for_load),
            self.options.navigation_timeout.as_millis().to_string(),
            flag(self.options.headless),
        ];

        let stdout = self.run_helper(EXTRACT_SCRIPT, &args).await?;
        let envelope: ExtractEnvelope = serde_json::from_str(&stdout).map_err(|e| {
            CloneError::extraction(format!(
                "failed to parse render helper output: {e} - raw: {}",
                stdout.trim()
            ))
        })?;

        if envelope.status != "ok" {
            return Err(map_helper_status_error(
                &envelope.status,
                envelope.message.unwrap_or_default(),
            ));
        }

        envelope
            .snapshot
            .ok_or_else(|| CloneError::extraction("render helper returned ok but no snapshot"))
    }

    async fn screenshot(&self, target: ScreenshotTarget, viewport: Viewport) -> Result<Vec<u8>> {
        self.log_progress(&format!("Capturing {viewport} screenshot…"));
        let mut scratch_html: Option<PathBuf> = None;
        let url = match target {
            ScreenshotTarget::Url(url) => url,
            ScreenshotTarget::Html(html) => {
                let path = self.scratch_path("html");
                tokio::fs::write(&path, html).await?;
                let url = format!("file://{}", path.display());
                scratch_html = Some(path);
                url
            }
        };

        let out_path = self.scratch_path("png");
        let args = vec![
            url,
            viewport.width.to_string(),
            viewport.height.to_string(),
            self.options.navigation_timeout.as_millis().to_string(),
            out_path.display().to_string(),
            flag(self.options.headless),
        ];

        let result = self.run_helper(SCREENSHOT_SCRIPT, &args).await;
        if let Some(path) = scratch_html {
            let _ = tokio::fs::remove_file(path).await;
        }
        let stdout = result?;

        let envelope: StatusEnvelope = serde_json::from_str(&stdout).map_err(|e| {
            CloneError::extraction(format!("failed to parse screenshot output: {e}"))
        })?;
        if envelope.status != "ok" {
            let _ = tokio::fs::remove_file(&out_path).await;
            return Err(map_helper_status_error(
                &envelope.status,
                envelope.message.unwrap_or_default(),
            ));
        }

        let bytes = tokio::fs::read(&out_path).await?;
        let _ = tokio::fs::remove_file(&out_path).await;
        Ok(bytes)
    }
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    status: String,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractEnvelope {
    status: String,
    message: Option<String>,
    snapshot: Option<DomSnapshot>,
}

fn flag(value: bool) -> String {
    String::from(if value { "1" } else { "0" })
}

fn map_spawn_error(err: std::io::Error, command: &str) -> CloneError {
    if err.kind() == std::io::ErrorKind::NotFound {
        CloneError::extraction(format!(
            "Unable to spawn render helper; '{}' was not found on PATH",
            command
        ))
    } else {
        CloneError::Io(err)
    }
}

fn map_helper_error(status_text: impl Into<String>, stderr: &str) -> CloneError {
    if let Ok(envelope) = serde_json::from_str::<StatusEnvelope>(stderr) {
        return map_helper_status_error(&envelope.status, envelope.message.unwrap_or_default());
    }

    let lower = stderr.to_ascii_lowercase();
    if lower.contains("cannot find module 'playwright'") {
        return CloneError::extraction(
            "Playwright npm package is missing; install with `npm install playwright`.",
        );
    }
    if lower.contains("timeout") {
        return CloneError::extraction(
            "Render helper timed out; increase the render timeout and ensure the page finishes loading.",
        );
    }

    CloneError::extraction(format!(
        "Render helper exited with status {}: {}",
        status_text.into(),
        stderr.trim()
    ))
}

fn map_helper_status_error(status: &str, message: String) -> CloneError {
    if message
        .to_ascii_lowercase()
        .contains("cannot find module 'playwright'")
    {
        CloneError::extraction(
            "Playwright npm package is missing; install with `npm install playwright`.",
        )
    } else {
        CloneError::extraction(format!("Render helper error (status {}): {}", status, message))
    }
}

/// Checks that the configured Node binary runs.
async fn ensure_node_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let status = timeout(NODE_CHECK_TIMEOUT, cmd.status())
        .await
        .map_err(|_| {
            CloneError::extraction(format!(
                "Timed out checking node availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !status.success() {
        return Err(CloneError::extraction(format!(
            "Node command {:?} is not available (exit {})",
            node_command, status
        )));
    }

    Ok(())
}

/// Helper script: render a page and emit a structural snapshot.
///
/// Element fields mirror the serde shape of [`DomSnapshot`] so the
/// envelope deserializes directly.
const EXTRACT_SCRIPT: &str = r#"
const [, url, maxDepth, includeStyles, waitForLoad, navTimeout, headlessFlag] = process.argv;

const STYLE_PROPS = [
  'display', 'flex-direction', 'float', 'position',
  'background-color', 'color', 'font-family', 'font-size',
  'padding', 'margin', 'border-width', 'box-shadow'
];

async function run() {
  let browser;
  try {
    const { chromium } = require('playwright');
    browser = await chromium.launch({ headless: headlessFlag !== '0' });
    const page = await browser.newPage();
    const navMs = parseInt(navTimeout, 10);

    const waitUntil = waitForLoad === '1' ? 'networkidle' : 'domcontentloaded';
    await page.goto(url, { waitUntil, timeout: navMs });

    const snapshot = await page.evaluate(([depthLimit, withStyles, styleProps]) => {
      const elements = [];
      const assets = [];
      const seenAssets = new Set();

      function pushAsset(assetUrl, kind, context) {
        if (!assetUrl || seenAssets.has(assetUrl)) return;
        seenAssets.add(assetUrl);
        assets.push({ url: assetUrl, kind, usageContext: context ? [context] : [] });
      }

      function sparseStyles(el) {
        if (!withStyles) return {};
        const computed = window.getComputedStyle(el);
        const styles = {};
        for (const prop of styleProps) {
          const value = computed.getPropertyValue(prop);
          if (value && value !== 'none' && value !== 'normal' && value !== 'auto') {
            styles[prop] = value;
          }
        }
        return styles;
      }

      function traverse(el, path, depth) {
        if (depth > depthLimit) return;
        const rect = el.getBoundingClientRect();
        const visible = rect.width > 0 || rect.height > 0;

        const attributes = {};
        for (const attr of el.attributes) {
          attributes[attr.name] = attr.value;
        }

        let text = null;
        for (const child of el.childNodes) {
          if (child.nodeType === Node.TEXT_NODE) {
            const trimmed = child.textContent.trim();
            if (trimmed) text = text ? text + ' ' + trimmed : trimmed;
          }
        }

        const tag = el.tagName.toLowerCase();
        if (tag === 'img' && el.src) pushAsset(el.src, 'image', 'img');
        if (tag === 'svg') pushAsset('inline-svg:' + path, 'svg', 'inline');
        const bg = window.getComputedStyle(el).getPropertyValue('background-image');
        const bgMatch = bg && bg.match(/url\(["']?([^"')]+)["']?\)/);
        if (bgMatch) pushAsset(bgMatch[1], 'background', 'css-background');

        elements.push({
          tagName: tag,
          elementId: el.id || null,
          classNames: Array.from(el.classList),
          computedStyles: sparseStyles(el),
          attributes,
          textContent: text,
          childrenCount: el.children.length,
          path,
          boundingBox: visible
            ? { x: rect.x, y: rect.y, width: rect.width, height: rect.height }
            : null,
          isVisible: visible
        });

        const tagCounts = {};
        for (const child of el.children) {
          const childTag = child.tagName.toLowerCase();
          tagCounts[childTag] = (tagCounts[childTag] || 0) + 1;
          traverse(child, path + '/' + childTag + '[' + tagCounts[childTag] + ']', depth + 1);
        }
      }

      traverse(document.documentElement, '/html', 1);

      const metaDescription = document.querySelector('meta[name="description"]');
      const metaViewport = document.querySelector('meta[name="viewport"]');

      return {
        url: window.location.href,
        meta: {
          title: document.title || null,
          description: metaDescription ? metaDescription.content : null,
          language: document.documentElement.lang || null,
          viewport: metaViewport ? metaViewport.content : null
        },
        elements,
        assets
      };
    }, [parseInt(maxDepth, 10), includeStyles === '1', STYLE_PROPS]);

    console.log(JSON.stringify({ status: 'ok', snapshot }));
  } catch (err) {
    const message = err && err.message ? err.message : String(err);
    console.error(JSON.stringify({ status: 'error', message }));
    process.exitCode = 1;
  } finally {
    if (browser) {
      await browser.close();
    }
  }
}

run();
"#;

/// Helper script: navigate and write a full-page PNG to the given path.
const SCREENSHOT_SCRIPT: &str = r#"
const [, url, width, height, navTimeout, outPath, headlessFlag] = process.argv;

async function run() {
  let browser;
  try {
    const { chromium } = require('playwright');
    browser = await chromium.launch({ headless: headlessFlag !== '0' });
    const context = await browser.newContext({
      viewport: { width: parseInt(width, 10), height: parseInt(height, 10) }
    });
    const page = await context.newPage();
    await page.goto(url, { waitUntil: 'networkidle', timeout: parseInt(navTimeout, 10) });
    await page.screenshot({ path: outPath, fullPage: true });
    console.log(JSON.stringify({ status: 'ok' }));
  } catch (err) {
    const message = err && err.message ? err.message : String(err);
    console.error(JSON.stringify({ status: 'error', message }));
    process.exitCode = 1;
  } finally {
    if (browser) {
      await browser.close();
    }
  }
}

run();
"#;
