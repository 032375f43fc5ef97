//! Replay engine seam. The server hands a stored event log to a
//! [`ReplayEngine`] and embeds whatever markup it produces in the replay page.

use minijinja::{context, Environment};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Markup that mounts a player on the element with id `target`.
#[derive(Debug, Clone)]
pub struct ReplayHandle {
    pub target: String,
    pub markup: String,
}

pub trait ReplayEngine: Send + Sync {
    fn render(
        &self,
        target: &str,
        events: &[serde_json::Value],
        dimensions: Dimensions,
    ) -> Result<ReplayHandle, minijinja::Error>;

    /// Script and stylesheet URLs the page must load before the markup runs.
    fn scripts(&self) -> Vec<String>;
    fn stylesheets(&self) -> Vec<String>;
}

const PLAYER_TEMPLATE: &str = r#"<div id="{{ target }}"></div>
<script>
  (function () {
    var events = {{ events|tojson }};
    var mount = document.getElementById({{ target|tojson }});
    if (!Array.isArray(events) || events.length === 0) {
      mount.innerHTML = '<div class="error">No recording data available.</div>';
      return;
    }
    new rrwebPlayer({
      target: mount,
      props: {
        events: events,
        width: {{ dimensions.width }},
        height: {{ dimensions.height }},
        autoPlay: false,
        showController: true,
        skipInactive: true
      }
    });
  })();
</script>"#;

/// rrweb-player backed replay.
#[derive(Debug, Clone)]
pub struct RrwebPlayer {
    capture_script: String,
    player_script: String,
    player_css: String,
}

impl RrwebPlayer {
    pub fn new(
        capture_script: impl Into<String>,
        player_script: impl Into<String>,
        player_css: impl Into<String>,
    ) -> Self {
        Self {
            capture_script: capture_script.into(),
            player_script: player_script.into(),
            player_css: player_css.into(),
        }
    }
}

impl ReplayEngine for RrwebPlayer {
    fn render(
        &self,
        target: &str,
        events: &[serde_json::Value],
        dimensions: Dimensions,
    ) -> Result<ReplayHandle, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("player.html", PLAYER_TEMPLATE)?;
        let markup = env.get_template("player.html")?.render(context! {
            target,
            events,
            dimensions,
        })?;

        Ok(ReplayHandle {
            target: target.to_string(),
            markup,
        })
    }

    fn scripts(&self) -> Vec<String> {
        vec![
            format!("/{}", self.capture_script),
            format!("/{}", self.player_script),
        ]
    }

    fn stylesheets(&self) -> Vec<String> {
        vec![format!("/{}", self.player_css)]
    }
}
