//! Admin HTML: the session list landing page and the replay view.

use minijinja::{context, Environment};
use reel_core::models::SessionDetail;

use crate::replay::{Dimensions, ReplayEngine};

const ADMIN_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Session Recorder Admin</title>
  <style>
    body { font-family: Arial, sans-serif; margin: 20px; background: #f5f5f5; }
    .container { max-width: 1200px; margin: 0 auto; background: white; padding: 20px; border-radius: 8px; }
    table { width: 100%; border-collapse: collapse; margin-top: 20px; }
    th, td { padding: 12px; text-align: left; border-bottom: 1px solid #ddd; }
    th { background-color: #007cba; color: white; }
    .pagination { margin: 20px 0; text-align: center; }
    .pagination a, .pagination span { margin: 0 5px; padding: 8px 12px; border: 1px solid #ddd; }
    .stats { background: #e3f2fd; padding: 15px; border-radius: 4px; }
  </style>
</head>
<body>
  <div class="container">
    <h1>Session Recorder Admin</h1>
    <div id="stats" class="stats"></div>
    <div id="content">Loading sessions...</div>
  </div>
  <script>
    var currentPage = 1;
    function text(value) {
      var span = document.createElement('span');
      span.textContent = value;
      return span.innerHTML;
    }
    async function loadSessions(page) {
      var response = await fetch('/api/sessions?page=' + page);
      var data = await response.json();
      currentPage = data.page;
      document.getElementById('stats').textContent =
        data.total + ' sessions | page ' + data.page + ' of ' + data.pages;
      if (data.sessions.length === 0) {
        document.getElementById('content').textContent = 'No sessions found.';
        return;
      }
      var html = '<table><thead><tr><th>Session</th><th>URL</th><th>Title</th><th>Updated</th><th>Browser</th><th></th></tr></thead><tbody>';
      data.sessions.forEach(function (s) {
        html += '<tr><td>' + text(s.sessionId) + '</td><td>' + text(s.url) + '</td><td>' + text(s.title) +
          '</td><td>' + new Date(s.updatedAt).toLocaleString() + '</td><td>' + text(s.userAgent) +
          '</td><td><a href="/session/' + encodeURIComponent(s.sessionId) + '" target="_blank">Replay</a></td></tr>';
      });
      html += '</tbody></table><div class="pagination">';
      for (var i = Math.max(1, data.page - 2); i <= Math.min(data.pages, data.page + 2); i++) {
        html += i === data.page ? '<span>' + i + '</span>' : '<a href="#" onclick="loadSessions(' + i + ')">' + i + '</a>';
      }
      document.getElementById('content').innerHTML = html + '</div>';
    }
    loadSessions(1);
    setInterval(function () { loadSessions(currentPage); }, {{ refresh_ms }});
  </script>
</body>
</html>"##;

const REPLAY_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Session Replay: {{ session.title }}</title>
  {% for href in stylesheets %}<link rel="stylesheet" href="{{ href }}">
  {% endfor %}{% for src in scripts %}<script src="{{ src }}"></script>
  {% endfor %}<style>
    body { font-family: Arial, sans-serif; margin: 0; background: #1a1a1a; color: white; }
    .info { background: #222; padding: 10px 15px; font-size: 14px; }
    .info span { margin-right: 20px; }
    .error { color: #f44336; text-align: center; padding: 20px; }
  </style>
</head>
<body>
  <div class="info">
    <span><strong>URL:</strong> <a href="{{ session.url }}" target="_blank">{{ session.url }}</a></span>
    <span><strong>Title:</strong> {{ session.title }}</span>
    <span><strong>Recorded:</strong> {{ created }}</span>
    <span><strong>Events:</strong> {{ event_count }}</span>
  </div>
  {{ player|safe }}
</body>
</html>"#;

/// How often the landing page reloads the current listing page.
const ADMIN_REFRESH_MS: u64 = 30_000;

pub fn admin_page() -> Result<String, minijinja::Error> {
    let mut env = Environment::new();
    env.add_template("admin.html", ADMIN_TEMPLATE)?;
    env.get_template("admin.html")?
        .render(context! { refresh_ms => ADMIN_REFRESH_MS })
}

/// Replay view sized from the recorded viewport (falling back to 1024x768
/// when the recorder did not report one).
pub fn replay_page(
    engine: &dyn ReplayEngine,
    session: &SessionDetail,
) -> Result<String, minijinja::Error> {
    let viewport = session.summary.viewport;
    let dimensions = if viewport.width == 0 || viewport.height == 0 {
        Dimensions {
            width: 1024,
            height: 768,
        }
    } else {
        Dimensions {
            width: viewport.width,
            height: viewport.height,
        }
    };

    let handle = engine.render("player", &session.events, dimensions)?;

    let mut env = Environment::new();
    env.add_template("replay.html", REPLAY_TEMPLATE)?;
    env.get_template("replay.html")?.render(context! {
        session => &session.summary,
        created => session.summary.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        event_count => session.events.len(),
        scripts => engine.scripts(),
        stylesheets => engine.stylesheets(),
        player => handle.markup,
    })
}
